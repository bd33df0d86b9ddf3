//! Trip progress driver.
//!
//! While the lifecycle is `moving`, [`run_motion`] wakes on a fixed tick,
//! advances every started trip by `progress_per_tick`, interpolates each
//! trip's position along its route, and writes the whole tick back to the
//! store in one batch. Once no trip has distance left, it holds for
//! `completion_hold_ms`, counted from the tick that finished the last trip,
//! and then completes the trips.
//!
//! # Cancellation
//!
//! The driver stops at the next tick boundary when:
//!
//! - [`MotionControl::request_stop`] is called, or
//! - the store leaves `moving` or is re-seeded (a `reset`).
//!
//! A tick computed against a run that was reset in the meantime is rejected
//! by the store as stale and dropped, so a cancelled driver never writes
//! into the next run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use campool_types::{Operation, Phase};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::MotionConfig;
use crate::dispatch::{Dispatch, DispatchError, ProgressUpdate, Snapshot};
use crate::route::{clamp_progress, position_along};

/// Errors that end the motion driver abnormally.
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    /// `progress_per_tick` must be a positive finite number.
    #[error("progress increment must be positive, got {increment}")]
    NonPositiveIncrement {
        /// The configured increment.
        increment: f64,
    },

    /// The store rejected an operation for a reason other than a reset.
    #[error("dispatch error: {source}")]
    Dispatch {
        /// The underlying dispatch error.
        #[from]
        source: DispatchError,
    },
}

/// Why the driver stopped before completing the trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// [`MotionControl::request_stop`] was called.
    StopRequested,
    /// The store was reset or left `moving`.
    LifecycleReset,
}

/// How a driver run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotionOutcome {
    /// Every trip reached the end of its route and `complete_trips` ran.
    Completed {
        /// Progress ticks written.
        ticks: u64,
    },
    /// The driver stopped early; trips keep their last written progress.
    Cancelled {
        /// Progress ticks written before stopping.
        ticks: u64,
        /// Why it stopped.
        reason: CancelReason,
    },
}

/// Stop signal shared between the driver task and its owner.
#[derive(Debug, Default)]
pub struct MotionControl {
    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Wakes a driver sleeping between ticks.
    stop_notify: Notify,
}

impl MotionControl {
    /// Create a control with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the driver stop at the next tick boundary.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Resolve once a stop has been requested.
    pub async fn stopped(&self) {
        loop {
            // Register before checking the flag so a concurrent
            // `request_stop` cannot slip between the two.
            let notified = self.stop_notify.notified();
            if self.is_stop_requested() {
                return;
            }
            notified.await;
        }
    }
}

/// Compute one tick of progress for every trip still moving.
///
/// Each started trip with progress below 1 advances by `increment`,
/// clamped to 1, and gets the interpolated position for its new progress.
pub fn plan_tick(snapshot: &Snapshot, increment: f64) -> Vec<ProgressUpdate> {
    snapshot
        .active_trips()
        .map(|trip| {
            let progress = clamp_progress(trip.progress + increment);
            ProgressUpdate {
                trip_id: trip.id.clone(),
                progress,
                position: position_along(&trip.route, progress),
            }
        })
        .collect()
}

/// Drive every started trip to completion.
///
/// # Errors
///
/// - [`MotionError::NonPositiveIncrement`] for a bad increment.
/// - [`MotionError::Dispatch`] if the store is not `moving` at start, or
///   rejects a write for a reason other than a reset.
pub async fn run_motion(
    dispatch: &Dispatch,
    control: &MotionControl,
    config: &MotionConfig,
) -> Result<MotionOutcome, MotionError> {
    let increment = config.progress_per_tick;
    if !increment.is_finite() || increment <= 0.0 {
        return Err(MotionError::NonPositiveIncrement { increment });
    }

    let start = dispatch.snapshot();
    if start.phase != Phase::Moving {
        return Err(DispatchError::InvalidPhase {
            operation: Operation::UpdateTripProgress,
            phase: start.phase,
        }
        .into());
    }
    let run = start.run;
    let simulation_id = dispatch.id();

    info!(
        simulation_id = %simulation_id,
        run,
        trips = start.trips.len(),
        tick_interval_ms = config.tick_interval_ms,
        progress_per_tick = increment,
        "Motion driver started"
    );

    let mut ticks: u64 = 0;
    let cancelled = |ticks: u64, reason: CancelReason| -> Result<MotionOutcome, MotionError> {
        info!(
            simulation_id = %simulation_id,
            run,
            ticks,
            reason = ?reason,
            "Motion driver cancelled"
        );
        Ok(MotionOutcome::Cancelled { ticks, reason })
    };

    loop {
        if control.is_stop_requested() {
            return cancelled(ticks, CancelReason::StopRequested);
        }

        let snapshot = dispatch.snapshot();
        if snapshot.run != run || snapshot.phase != Phase::Moving {
            return cancelled(ticks, CancelReason::LifecycleReset);
        }

        let updates = plan_tick(&snapshot, increment);
        if updates.is_empty() {
            // Every trip is at the end of its route.
            if !pause(control, config.completion_hold()).await {
                return cancelled(ticks, CancelReason::StopRequested);
            }
            return match dispatch.complete_trips_in_run(run) {
                Ok(()) => {
                    info!(
                        simulation_id = %simulation_id,
                        run,
                        ticks,
                        "Motion driver completed"
                    );
                    Ok(MotionOutcome::Completed { ticks })
                }
                Err(err) if is_reset(&err) => cancelled(ticks, CancelReason::LifecycleReset),
                Err(err) => Err(err.into()),
            };
        }

        match dispatch.record_progress(run, &updates) {
            Ok(advanced) => {
                ticks = ticks.saturating_add(1);
                debug!(
                    simulation_id = %simulation_id,
                    run,
                    tick = ticks,
                    advanced,
                    "Motion tick applied"
                );
            }
            Err(err) if is_reset(&err) => {
                return cancelled(ticks, CancelReason::LifecycleReset);
            }
            Err(err) => return Err(err.into()),
        }

        // The completion hold starts right after the last tick.
        if dispatch.snapshot().active_trips().next().is_none() {
            continue;
        }
        if !pause(control, config.tick_interval()).await {
            return cancelled(ticks, CancelReason::StopRequested);
        }
    }
}

/// Run [`run_motion`] on a new tokio task.
pub fn spawn_motion(
    dispatch: Arc<Dispatch>,
    control: Arc<MotionControl>,
    config: MotionConfig,
) -> JoinHandle<Result<MotionOutcome, MotionError>> {
    tokio::spawn(async move { run_motion(&dispatch, &control, &config).await })
}

/// Sleep for `duration` unless a stop arrives first. Returns `false` when
/// stopped.
async fn pause(control: &MotionControl, duration: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = control.stopped() => false,
    }
}

/// Errors that mean the run the driver was serving is gone.
const fn is_reset(err: &DispatchError) -> bool {
    matches!(
        err,
        DispatchError::StaleRun { .. } | DispatchError::InvalidPhase { .. }
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use campool_types::{PoolId, Position, TripStatus};

    use super::*;
    use crate::campus;
    use crate::grouping::RouteAffinity;

    fn quick() -> MotionConfig {
        MotionConfig {
            tick_interval_ms: 200,
            progress_per_tick: 0.25,
            completion_hold_ms: 200,
        }
    }

    fn moving(fixture: crate::fixture::Fixture) -> Arc<Dispatch> {
        let dispatch = Arc::new(Dispatch::new(fixture, Box::new(RouteAffinity), 4, 42));
        dispatch.seed().unwrap();
        dispatch.create_pools().unwrap();
        dispatch.assign_drivers().unwrap();
        let snapshot = dispatch.snapshot();
        for pool in snapshot.pools.iter() {
            assert!(dispatch.verify_otp(&pool.id, &pool.code).unwrap());
        }
        dispatch.start_trips().unwrap();
        dispatch
    }

    #[test]
    fn plan_tick_advances_and_interpolates() {
        let dispatch = moving(campus::single_pool());
        let snapshot = dispatch.snapshot();
        let updates = plan_tick(&snapshot, 0.5);
        assert_eq!(updates.len(), 1);
        let update = updates.first().unwrap();
        let trip = snapshot.trip(&update.trip_id).unwrap();
        assert!((update.progress - 0.5).abs() < f64::EPSILON);
        assert_eq!(update.position, position_along(&trip.route, 0.5));
    }

    #[test]
    fn plan_tick_clamps_at_route_end() {
        let dispatch = moving(campus::single_pool());
        let trip_id = dispatch.snapshot().trips.first().unwrap().id.clone();
        dispatch
            .update_trip_progress(&trip_id, 0.9, Position::new(0.0, 0.0))
            .unwrap();
        let snapshot = dispatch.snapshot();
        let updates = plan_tick(&snapshot, 0.25);
        let update = updates.first().unwrap();
        assert!((update.progress - 1.0).abs() < f64::EPSILON);
        let trip = snapshot.trip(&trip_id).unwrap();
        assert_eq!(update.position, trip.route.end());
    }

    #[test]
    fn plan_tick_skips_finished_trips() {
        let dispatch = moving(campus::single_pool());
        let trip_id = dispatch.snapshot().trips.first().unwrap().id.clone();
        dispatch
            .update_trip_progress(&trip_id, 1.0, Position::new(0.0, 0.0))
            .unwrap();
        assert!(plan_tick(&dispatch.snapshot(), 0.25).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drives_every_trip_to_completion() {
        let dispatch = moving(campus::evening_rush());
        let control = MotionControl::new();

        let outcome = run_motion(&dispatch, &control, &quick()).await.unwrap();
        assert_eq!(outcome, MotionOutcome::Completed { ticks: 4 });

        let snapshot = dispatch.snapshot();
        assert_eq!(snapshot.phase, Phase::Completed);
        assert!(snapshot.trips.iter().all(|t| t.status == TripStatus::Completed));
        assert!(snapshot.drivers.iter().all(|d| d.assigned_pool_id.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn completion_hold_follows_the_last_tick() {
        let dispatch = moving(campus::single_pool());
        let control = MotionControl::new();
        let started = tokio::time::Instant::now();

        let outcome = run_motion(&dispatch, &control, &quick()).await.unwrap();
        assert_eq!(outcome, MotionOutcome::Completed { ticks: 4 });
        // Ticks at 0, 200, 400 and 600 ms, then the 200 ms hold.
        assert_eq!(started.elapsed(), Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_never_moves_backward_while_driving() {
        let dispatch = moving(campus::evening_rush());
        let control = Arc::new(MotionControl::new());
        let mut updates = dispatch.subscribe();
        let handle = spawn_motion(Arc::clone(&dispatch), control, quick());

        let red = PoolId::from("pool-red");
        let mut last = 0.0_f64;
        while updates.changed().await.is_ok() {
            let snapshot = Arc::clone(&updates.borrow_and_update());
            if let Some(trip) = snapshot.trip_for_pool(&red) {
                assert!(trip.progress >= last);
                last = trip.progress;
            }
            if snapshot.phase == Phase::Completed {
                break;
            }
        }
        assert!((last - 1.0).abs() < f64::EPSILON);
        assert!(matches!(
            handle.await.unwrap().unwrap(),
            MotionOutcome::Completed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_request_cancels_at_tick_boundary() {
        let dispatch = moving(campus::evening_rush());
        let control = Arc::new(MotionControl::new());
        let handle = spawn_motion(Arc::clone(&dispatch), Arc::clone(&control), quick());

        tokio::time::sleep(Duration::from_millis(300)).await;
        control.request_stop();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            MotionOutcome::Cancelled {
                ticks: 2,
                reason: CancelReason::StopRequested,
            }
        );
        // Trips keep their progress and the lifecycle stays in motion.
        let snapshot = dispatch.snapshot();
        assert_eq!(snapshot.phase, Phase::Moving);
        assert!(snapshot.trips.iter().all(|t| (t.progress - 0.5).abs() < f64::EPSILON));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_mid_motion_cancels_without_writes() {
        let dispatch = moving(campus::evening_rush());
        let control = Arc::new(MotionControl::new());
        let handle = spawn_motion(Arc::clone(&dispatch), control, quick());

        tokio::time::sleep(Duration::from_millis(300)).await;
        dispatch.reset().unwrap();
        let version = dispatch.snapshot().version;

        let outcome = handle.await.unwrap().unwrap();
        assert!(matches!(
            outcome,
            MotionOutcome::Cancelled {
                reason: CancelReason::LifecycleReset,
                ..
            }
        ));
        let snapshot = dispatch.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert!(snapshot.trips.is_empty());
        assert_eq!(snapshot.version, version);
    }

    #[tokio::test(start_paused = true)]
    async fn reseed_during_hold_is_detected() {
        let dispatch = moving(campus::single_pool());
        let config = MotionConfig {
            progress_per_tick: 1.0,
            completion_hold_ms: 1_000,
            ..quick()
        };
        let handle = spawn_motion(Arc::clone(&dispatch), Arc::new(MotionControl::new()), config);

        // One tick finishes the trip; the driver is now holding.
        tokio::time::sleep(Duration::from_millis(500)).await;
        dispatch.reset().unwrap();
        dispatch.seed().unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            MotionOutcome::Cancelled {
                ticks: 1,
                reason: CancelReason::LifecycleReset,
            }
        );
        assert_eq!(dispatch.phase(), Phase::Seeded);
    }

    #[tokio::test]
    async fn rejects_non_positive_increment() {
        let dispatch = moving(campus::single_pool());
        let control = MotionControl::new();
        for increment in [0.0, -0.1, f64::NAN] {
            let config = MotionConfig {
                progress_per_tick: increment,
                ..quick()
            };
            let result = run_motion(&dispatch, &control, &config).await;
            assert!(matches!(
                result,
                Err(MotionError::NonPositiveIncrement { .. })
            ));
        }
    }

    #[tokio::test]
    async fn refuses_to_start_outside_moving() {
        let dispatch = Dispatch::new(campus::single_pool(), Box::new(RouteAffinity), 4, 42);
        let control = MotionControl::new();
        let result = run_motion(&dispatch, &control, &quick()).await;
        assert!(matches!(
            result,
            Err(MotionError::Dispatch {
                source: DispatchError::InvalidPhase {
                    phase: Phase::Idle,
                    ..
                }
            })
        ));
    }
}
