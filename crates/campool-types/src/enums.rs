//! Enumeration types for the Campool simulation.
//!
//! Entity statuses advance with the lifecycle [`Phase`]; the transition
//! rules themselves live in `campool-core`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Entity statuses
// ---------------------------------------------------------------------------

/// Where a rider is in the ride lifecycle. Advances monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RiderStatus {
    /// Requested a ride, not yet grouped.
    Waiting,
    /// Grouped into a pool.
    Pooled,
    /// The rider's pool has a driver.
    Assigned,
    /// The rider's trip is under way.
    Enroute,
    /// Dropped off.
    Completed,
}

/// Driver availability. Cycles `idle -> assigned -> enroute -> idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum DriverStatus {
    /// Free to take a pool.
    Idle,
    /// Bound to a pool, waiting for code verification.
    Assigned,
    /// Driving the pool's trip.
    Enroute,
}

/// Pool progress from creation to drop-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum PoolStatus {
    /// Created, no driver yet.
    Pending,
    /// A driver has been assigned.
    Assigned,
    /// The driver entered the pool's verification code.
    Verified,
    /// The trip has started.
    Started,
    /// The trip has finished.
    Completed,
}

/// Trip execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TripStatus {
    /// Materialized at assignment, not yet moving.
    Pending,
    /// Moving along its route.
    Started,
    /// Reached the end of its route.
    Completed,
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// The process-wide lifecycle cursor. Variants are declared in strict
/// forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Phase {
    /// Empty store; only `seed` is accepted.
    Idle,
    /// Riders and drivers are loaded.
    Seeded,
    /// Waiting riders have been grouped into pools.
    Pooled,
    /// Every pool has a driver and a trip.
    Assigned,
    /// Every pool's verification code has been confirmed.
    Verified,
    /// Trips are moving.
    Moving,
    /// Every trip has finished.
    Completed,
}

impl Phase {
    /// Lowercase name used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Seeded => "seeded",
            Self::Pooled => "pooled",
            Self::Assigned => "assigned",
            Self::Verified => "verified",
            Self::Moving => "moving",
            Self::Completed => "completed",
        }
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation entry point of the dispatch store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Operation {
    /// Load riders and drivers from the fixture.
    Seed,
    /// Group waiting riders into pools.
    CreatePools,
    /// Pair each pool with an idle driver and build its trip.
    AssignDrivers,
    /// Check a pool's verification code.
    VerifyOtp,
    /// Start every trip.
    StartTrips,
    /// Record a trip's progress and position.
    UpdateTripProgress,
    /// Finish every trip.
    CompleteTrips,
    /// Clear everything and return to idle.
    Reset,
}

impl Operation {
    /// Name used in logs and error messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::CreatePools => "create_pools",
            Self::AssignDrivers => "assign_drivers",
            Self::VerifyOtp => "verify_otp",
            Self::StartTrips => "start_trips",
            Self::UpdateTripProgress => "update_trip_progress",
            Self::CompleteTrips => "complete_trips",
            Self::Reset => "reset",
        }
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_are_ordered_forward() {
        assert!(Phase::Idle < Phase::Seeded);
        assert!(Phase::Verified < Phase::Moving);
        assert!(Phase::Moving < Phase::Completed);
    }

    #[test]
    fn statuses_serialize_snake_case() {
        let json = serde_json::to_string(&RiderStatus::Enroute).ok();
        assert_eq!(json.as_deref(), Some("\"enroute\""));
        let json = serde_json::to_string(&Operation::VerifyOtp).ok();
        assert_eq!(json.as_deref(), Some("\"verify_otp\""));
    }

    #[test]
    fn display_matches_serialized_name() {
        assert_eq!(Phase::Moving.to_string(), "moving");
        assert_eq!(Operation::AssignDrivers.to_string(), "assign_drivers");
    }
}
