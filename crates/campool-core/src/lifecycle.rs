//! Lifecycle state machine for a dispatch run.
//!
//! The phase advances in strict forward order:
//!
//! ```text
//! idle --seed--> seeded --create_pools--> pooled --assign_drivers--> assigned
//!      --verify_otp (all pools)--> verified --start_trips--> moving
//!      --complete_trips--> completed
//! ```
//!
//! `reset` is accepted from every phase and returns to `idle`. Any other
//! operation invoked from a phase that does not immediately precede it is
//! rejected with a [`PhaseError`] before the store is touched.

use campool_types::{Operation, Phase};

/// An operation was invoked from a phase that does not permit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{operation} is not allowed in phase {phase}")]
pub struct PhaseError {
    /// The rejected operation.
    pub operation: Operation,
    /// The phase the store was in.
    pub phase: Phase,
}

/// Phases from which `operation` may be invoked.
pub const fn allowed_phases(operation: Operation) -> &'static [Phase] {
    match operation {
        Operation::Seed => &[Phase::Idle],
        Operation::CreatePools => &[Phase::Seeded],
        Operation::AssignDrivers => &[Phase::Pooled],
        // Repeating a correct code after every pool is verified is a no-op.
        Operation::VerifyOtp => &[Phase::Assigned, Phase::Verified],
        Operation::StartTrips => &[Phase::Verified],
        Operation::UpdateTripProgress | Operation::CompleteTrips => &[Phase::Moving],
        Operation::Reset => &[
            Phase::Idle,
            Phase::Seeded,
            Phase::Pooled,
            Phase::Assigned,
            Phase::Verified,
            Phase::Moving,
            Phase::Completed,
        ],
    }
}

/// Whether `operation` may be invoked from `phase`.
pub fn is_allowed(operation: Operation, phase: Phase) -> bool {
    allowed_phases(operation).contains(&phase)
}

/// Check that `operation` may be invoked from `phase`.
///
/// # Errors
///
/// Returns [`PhaseError`] when the transition is not permitted.
pub fn ensure(operation: Operation, phase: Phase) -> Result<(), PhaseError> {
    if is_allowed(operation, phase) {
        Ok(())
    } else {
        Err(PhaseError { operation, phase })
    }
}

/// The phase an operation lands in when it succeeds, or `None` when the
/// outcome depends on store contents (`verify_otp`) or the phase is kept
/// (`update_trip_progress`).
pub const fn target_phase(operation: Operation) -> Option<Phase> {
    match operation {
        Operation::Seed => Some(Phase::Seeded),
        Operation::CreatePools => Some(Phase::Pooled),
        Operation::AssignDrivers => Some(Phase::Assigned),
        Operation::StartTrips => Some(Phase::Moving),
        Operation::CompleteTrips => Some(Phase::Completed),
        Operation::Reset => Some(Phase::Idle),
        Operation::VerifyOtp | Operation::UpdateTripProgress => None,
    }
}
