//! End-to-end lifecycle scenarios against the built-in campus fixtures.
//!
//! Each test drives a [`Dispatch`] through the public operations only, the
//! way the engine binary does, and checks the snapshot at the end.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use campool_core::campus;
use campool_core::config::MotionConfig;
use campool_core::grouping::RouteAffinity;
use campool_core::{
    CancelReason, Dispatch, DispatchError, MotionControl, MotionOutcome, position_along,
    spawn_motion,
};
use campool_types::{
    DriverStatus, Operation, Phase, PoolStatus, RiderStatus, TripStatus,
};

/// Evening rush trimmed to its first eight riders: two full pools, one
/// spare driver.
fn eight_riders() -> Dispatch {
    let mut fixture = campus::evening_rush();
    fixture.riders.truncate(8);
    Dispatch::new(fixture, Box::new(RouteAffinity), 4, 42)
}

fn verify_all(dispatch: &Dispatch) {
    let snapshot = dispatch.snapshot();
    for pool in snapshot.pools.iter() {
        assert!(dispatch.verify_otp(&pool.id, &pool.code).unwrap());
    }
}

#[test]
fn eight_riders_three_drivers_full_run() {
    let dispatch = eight_riders();

    dispatch.seed().unwrap();
    assert_eq!(dispatch.create_pools().unwrap(), 2);
    assert_eq!(dispatch.assign_drivers().unwrap(), 2);

    let assigned = dispatch.snapshot();
    assert_eq!(assigned.phase, Phase::Assigned);
    let idle: Vec<_> = assigned
        .drivers
        .iter()
        .filter(|d| d.status == DriverStatus::Idle)
        .collect();
    assert_eq!(idle.len(), 1);
    assert!(idle.iter().all(|d| d.assigned_pool_id.is_none()));

    // A wrong code changes nothing.
    let first = assigned.pools.first().unwrap();
    assert!(!dispatch.verify_otp(&first.id, "000000").unwrap());
    assert_eq!(dispatch.snapshot().version, assigned.version);

    verify_all(&dispatch);
    assert_eq!(dispatch.phase(), Phase::Verified);

    dispatch.start_trips().unwrap();
    let moving = dispatch.snapshot();
    assert_eq!(moving.phase, Phase::Moving);
    assert_eq!(moving.trips.len(), 2);
    assert!(moving
        .riders
        .iter()
        .all(|r| r.status == RiderStatus::Enroute));

    for trip in moving.trips.iter() {
        let half = position_along(&trip.route, 0.5);
        assert!((dispatch.update_trip_progress(&trip.id, 0.5, half).unwrap() - 0.5).abs() < 1e-12);
        // Regressions are ignored.
        let back = position_along(&trip.route, 0.2);
        assert!((dispatch.update_trip_progress(&trip.id, 0.2, back).unwrap() - 0.5).abs() < 1e-12);
        let end = trip.route.end();
        assert!((dispatch.update_trip_progress(&trip.id, 1.0, end).unwrap() - 1.0).abs() < 1e-12);
    }
    assert!(dispatch.snapshot().all_trips_finished());

    dispatch.complete_trips().unwrap();
    let done = dispatch.snapshot();
    assert_eq!(done.phase, Phase::Completed);
    assert!(done.trips.iter().all(|t| t.status == TripStatus::Completed));
    assert!(done.pools.iter().all(|p| p.status == PoolStatus::Completed));
    assert!(done
        .riders
        .iter()
        .all(|r| r.status == RiderStatus::Completed));
    assert!(done
        .drivers
        .iter()
        .all(|d| d.status == DriverStatus::Idle && d.assigned_pool_id.is_none()));
    for trip in done.trips.iter() {
        assert_eq!(trip.current_position, Some(trip.route.end()));
    }
}

#[test]
fn reset_mid_trip_returns_to_idle_and_allows_reseed() {
    let dispatch = eight_riders();
    dispatch.seed().unwrap();
    dispatch.create_pools().unwrap();
    dispatch.assign_drivers().unwrap();
    verify_all(&dispatch);
    dispatch.start_trips().unwrap();

    let trip = dispatch.snapshot().trips.first().cloned().unwrap();
    dispatch
        .update_trip_progress(&trip.id, 0.3, position_along(&trip.route, 0.3))
        .unwrap();

    dispatch.reset().unwrap();
    let idle = dispatch.snapshot();
    assert_eq!(idle.phase, Phase::Idle);
    assert!(idle.riders.is_empty());
    assert!(idle.drivers.is_empty());
    assert!(idle.pools.is_empty());
    assert!(idle.trips.is_empty());
    assert_eq!(idle.hotspots.len(), 12);

    // The old trip is gone, and progress writes are refused outside `moving`.
    let err = dispatch
        .update_trip_progress(&trip.id, 0.9, trip.route.end())
        .unwrap_err();
    assert_eq!(
        err,
        DispatchError::InvalidPhase {
            operation: Operation::UpdateTripProgress,
            phase: Phase::Idle,
        }
    );

    dispatch.seed().unwrap();
    assert_eq!(dispatch.snapshot().run, 2);
    assert_eq!(dispatch.create_pools().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn single_pool_drives_to_completion() {
    let dispatch = Arc::new(Dispatch::new(
        campus::single_pool(),
        Box::new(RouteAffinity),
        4,
        7,
    ));
    dispatch.seed().unwrap();
    assert_eq!(dispatch.create_pools().unwrap(), 1);
    dispatch.assign_drivers().unwrap();

    let pool = dispatch.snapshot().pools.first().cloned().unwrap();
    assert_eq!(pool.code, "823614");
    assert!(dispatch.verify_otp(&pool.id, "823614").unwrap());
    dispatch.start_trips().unwrap();

    let mut events = dispatch.subscribe_events();
    let config = MotionConfig {
        tick_interval_ms: 200,
        progress_per_tick: 0.1,
        completion_hold_ms: 200,
    };
    let handle = spawn_motion(
        Arc::clone(&dispatch),
        Arc::new(MotionControl::new()),
        config,
    );

    let outcome = handle.await.unwrap().unwrap();
    assert!(matches!(outcome, MotionOutcome::Completed { ticks } if ticks >= 10));

    let done = dispatch.snapshot();
    assert_eq!(done.phase, Phase::Completed);
    let trip = done.trips.first().unwrap();
    assert!((trip.progress - 1.0).abs() < f64::EPSILON);
    assert_eq!(trip.current_position, Some(trip.route.end()));

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    let last = last.unwrap();
    assert_eq!(last.operation, Operation::CompleteTrips);
    assert_eq!(last.phase, Phase::Completed);
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_spawned_motion() {
    let dispatch = Arc::new(eight_riders());
    dispatch.seed().unwrap();
    dispatch.create_pools().unwrap();
    dispatch.assign_drivers().unwrap();
    verify_all(&dispatch);
    dispatch.start_trips().unwrap();

    let handle = spawn_motion(
        Arc::clone(&dispatch),
        Arc::new(MotionControl::new()),
        MotionConfig::default(),
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    dispatch.reset().unwrap();

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
}
