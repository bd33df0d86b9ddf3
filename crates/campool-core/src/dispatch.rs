//! The dispatch context: entity store plus lifecycle operations.
//!
//! [`Dispatch`] owns every collection (hotspots, riders, drivers, pools,
//! trips) and the lifecycle [`Phase`]. State lives in an immutable
//! [`Snapshot`] behind a `tokio::sync::watch` channel. Each operation:
//!
//! 1. checks the phase against the lifecycle table,
//! 2. builds a complete replacement snapshot from the current one,
//! 3. swaps it in under the channel's write lock, bumping `version`.
//!
//! Readers see either the old or the new snapshot, never a mix. A failed
//! operation leaves the current snapshot untouched. Collections are
//! `Arc<[T]>` so an operation that does not touch a collection shares it
//! with the previous snapshot instead of copying it.
//!
//! Successful operations are also published as [`DispatchEvent`]s on a
//! broadcast channel for notification consumers.

use std::sync::Arc;

use campool_types::{
    Driver, DriverId, DriverStatus, Hotspot, HotspotId, Operation, Phase, Pool, PoolId,
    PoolStatus, Position, Rider, RiderId, RiderStatus, SimulationId, Trip, TripId, TripStatus,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::config::{CampoolConfig, ConfigError};
use crate::fixture::Fixture;
use crate::grouping::{GroupingError, GroupingRule, PoolDraft};
use crate::itinerary::{self, ItineraryError};
use crate::lifecycle::{self, PhaseError};
use crate::route::{RouteError, clamp_progress};

/// Capacity of the broadcast channel for dispatch events.
///
/// A subscriber that falls behind by more than this many events receives
/// [`broadcast::error::RecvError::Lagged`] and skips ahead.
const EVENT_CAPACITY: usize = 256;

/// Colors cycled through when the fixture palette runs out.
const FALLBACK_COLORS: [&str; 6] = [
    "#ef4444", "#3b82f6", "#22c55e", "#f59e0b", "#a855f7", "#14b8a6",
];

/// Errors returned by dispatch operations. The store is unchanged whenever
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The operation is not legal in the current phase.
    #[error("{operation} is not allowed in phase {phase}")]
    InvalidPhase {
        /// The rejected operation.
        operation: Operation,
        /// The phase the store was in.
        phase: Phase,
    },

    /// A rider or pool stop references a hotspot that does not exist.
    #[error("unknown hotspot {hotspot}")]
    UnknownHotspot {
        /// The unresolved hotspot id.
        hotspot: HotspotId,
    },

    /// Grouping produced no pools from the waiting riders.
    #[error("no pool could be formed from {waiting} waiting riders at capacity {capacity}")]
    NoPoolsFormed {
        /// Riders that were waiting.
        waiting: usize,
        /// Configured pool capacity.
        capacity: usize,
    },

    /// Fewer idle drivers than pools.
    #[error("{pools} pools need drivers but only {idle} are idle")]
    InsufficientDrivers {
        /// Pools awaiting a driver.
        pools: usize,
        /// Idle drivers available.
        idle: usize,
    },

    /// No pool has the given id.
    #[error("pool not found: {0}")]
    PoolNotFound(PoolId),

    /// No trip has the given id.
    #[error("trip not found: {0}")]
    TripNotFound(TripId),

    /// The trip exists but is not moving.
    #[error("trip {0} is not started")]
    TripNotStarted(TripId),

    /// A write was issued against a run that has since been reset.
    #[error("update for run {expected} arrived during run {current}")]
    StaleRun {
        /// The run the caller was driving.
        expected: u64,
        /// The store's current run.
        current: u64,
    },

    /// A trip route could not be built.
    #[error("route error: {source}")]
    Route {
        /// The underlying route error.
        #[from]
        source: RouteError,
    },

    /// The grouping rule rejected its input.
    #[error("grouping error: {source}")]
    Grouping {
        /// The underlying grouping error.
        #[from]
        source: GroupingError,
    },

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<PhaseError> for DispatchError {
    fn from(err: PhaseError) -> Self {
        Self::InvalidPhase {
            operation: err.operation,
            phase: err.phase,
        }
    }
}

impl From<ItineraryError> for DispatchError {
    fn from(err: ItineraryError) -> Self {
        match err {
            ItineraryError::UnknownHotspot(hotspot) => Self::UnknownHotspot { hotspot },
            ItineraryError::Route { source } => Self::Route { source },
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable, internally consistent view of the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// The dispatch context this snapshot belongs to.
    pub simulation_id: SimulationId,
    /// Incremented by every successful operation.
    pub version: u64,
    /// Incremented by every `seed`; identifies one lifecycle run.
    pub run: u64,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Pickup and drop points. Survive `reset`.
    pub hotspots: Arc<[Hotspot]>,
    /// Riders in seed order.
    pub riders: Arc<[Rider]>,
    /// Drivers in seed order.
    pub drivers: Arc<[Driver]>,
    /// Pools in creation order.
    pub pools: Arc<[Pool]>,
    /// Trips, one per pool, in pool order.
    pub trips: Arc<[Trip]>,
}

fn empty<T>() -> Arc<[T]> {
    Arc::from(Vec::new())
}

impl Snapshot {
    fn initial(simulation_id: SimulationId, hotspots: Arc<[Hotspot]>) -> Self {
        Self {
            simulation_id,
            version: 0,
            run: 0,
            phase: Phase::Idle,
            hotspots,
            riders: empty(),
            drivers: empty(),
            pools: empty(),
            trips: empty(),
        }
    }

    /// Look up a rider.
    pub fn rider(&self, id: &RiderId) -> Option<&Rider> {
        self.riders.iter().find(|r| r.id == *id)
    }

    /// Look up a driver.
    pub fn driver(&self, id: &DriverId) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == *id)
    }

    /// Look up a pool.
    pub fn pool(&self, id: &PoolId) -> Option<&Pool> {
        self.pools.iter().find(|p| p.id == *id)
    }

    /// Look up a trip.
    pub fn trip(&self, id: &TripId) -> Option<&Trip> {
        self.trips.iter().find(|t| t.id == *id)
    }

    /// Look up a hotspot.
    pub fn hotspot(&self, id: &HotspotId) -> Option<&Hotspot> {
        self.hotspots.iter().find(|h| h.id == *id)
    }

    /// The pool a driver currently serves (the driver's dashboard view).
    pub fn pool_for_driver(&self, id: &DriverId) -> Option<&Pool> {
        self.pools
            .iter()
            .find(|p| p.driver_id.as_ref() == Some(id))
    }

    /// A pool's riders in boarding order.
    pub fn pool_members(&self, id: &PoolId) -> Vec<&Rider> {
        self.pool(id)
            .map(|pool| pool.rider_ids.iter().filter_map(|r| self.rider(r)).collect())
            .unwrap_or_default()
    }

    /// The trip driving a pool.
    pub fn trip_for_pool(&self, id: &PoolId) -> Option<&Trip> {
        self.trips.iter().find(|t| t.pool_id == *id)
    }

    /// Trips that are started and have not reached the end of their route.
    pub fn active_trips(&self) -> impl Iterator<Item = &Trip> {
        self.trips
            .iter()
            .filter(|t| t.status == TripStatus::Started && t.progress < 1.0)
    }

    /// Whether there is at least one trip and every trip is at full progress.
    pub fn all_trips_finished(&self) -> bool {
        !self.trips.is_empty() && self.trips.iter().all(|t| t.progress >= 1.0)
    }

    /// Collection sizes, for logs and events.
    pub fn counts(&self) -> SnapshotCounts {
        SnapshotCounts {
            riders: self.riders.len(),
            pooled_riders: self.riders.iter().filter(|r| r.pool_id.is_some()).count(),
            drivers: self.drivers.len(),
            pools: self.pools.len(),
            verified_pools: self.pools.iter().filter(|p| p.verified).count(),
            trips: self.trips.len(),
        }
    }
}

/// Collection sizes of a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCounts {
    /// All riders.
    pub riders: usize,
    /// Riders that belong to a pool.
    pub pooled_riders: usize,
    /// All drivers.
    pub drivers: usize,
    /// All pools.
    pub pools: usize,
    /// Pools whose code has been confirmed.
    pub verified_pools: usize,
    /// All trips.
    pub trips: usize,
}

/// Published after every operation that changed the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEvent {
    /// The dispatch context that emitted the event.
    pub simulation_id: SimulationId,
    /// The lifecycle run the change belongs to.
    pub run: u64,
    /// The operation that was applied.
    pub operation: Operation,
    /// Phase after the operation.
    pub phase: Phase,
    /// Snapshot version after the operation.
    pub version: u64,
    /// Collection sizes after the operation.
    pub counts: SnapshotCounts,
    /// Wall-clock time the change was applied.
    pub occurred_at: DateTime<Utc>,
}

/// One trip's progress write, as computed by the motion driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// The trip to update.
    pub trip_id: TripId,
    /// New progress; clamped and never lowers the stored value.
    pub progress: f64,
    /// Interpolated position at that progress.
    pub position: Position,
}

/// What an operation decided to do with the current snapshot.
enum Change<T> {
    /// Swap in a new snapshot and return a value.
    Replace(Snapshot, T),
    /// Leave the store untouched and return a value.
    Keep(T),
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// A self-contained simulation instance.
///
/// Construct one per scenario and share it by reference or `Arc`; there is
/// no process-wide store. All operations take `&self` and are serialized
/// internally.
#[derive(Debug)]
pub struct Dispatch {
    id: SimulationId,
    fixture: Fixture,
    rule: Box<dyn GroupingRule>,
    capacity: usize,
    code_seed: u64,
    state: watch::Sender<Arc<Snapshot>>,
    events: broadcast::Sender<DispatchEvent>,
}

impl Dispatch {
    /// Create a dispatch context in the `idle` phase.
    ///
    /// Hotspots are loaded from the fixture immediately; riders and drivers
    /// wait for [`seed`](Self::seed). `code_seed` seeds the generator for
    /// pools whose palette entry has no fixed code.
    pub fn new(
        fixture: Fixture,
        rule: Box<dyn GroupingRule>,
        capacity: usize,
        code_seed: u64,
    ) -> Self {
        let id = SimulationId::new();
        let hotspots: Arc<[Hotspot]> = Arc::from(fixture.hotspots.clone());
        let (state, _) = watch::channel(Arc::new(Snapshot::initial(id, hotspots)));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            simulation_id = %id,
            fixture = %fixture.name,
            rule = rule.name(),
            capacity,
            "Dispatch context created"
        );

        Self {
            id,
            fixture,
            rule,
            capacity,
            code_seed,
            state,
            events,
        }
    }

    /// Create a dispatch context from configuration, loading its fixture.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Fixture`] if the fixture cannot be loaded.
    pub fn from_config(config: &CampoolConfig) -> Result<Self, ConfigError> {
        let fixture = config.load_fixture()?;
        Ok(Self::new(
            fixture,
            config.pooling.rule.build(),
            config.pooling.capacity,
            config.simulation.seed,
        ))
    }

    /// This context's identifier.
    pub const fn id(&self) -> SimulationId {
        self.id
    }

    /// The fixture this context seeds from.
    pub const fn fixture(&self) -> &Fixture {
        &self.fixture
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.state.borrow())
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    /// Subscribe to snapshot changes. The receiver always yields the
    /// latest snapshot; intermediate ones may be skipped.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.state.subscribe()
    }

    /// Subscribe to the event stream of applied operations.
    pub fn subscribe_events(&self) -> broadcast::Receiver<DispatchEvent> {
        self.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Load riders (`waiting`) and drivers (`idle`) from the fixture and
    /// start a new run.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidPhase`] unless the phase is `idle`.
    pub fn seed(&self) -> Result<(), DispatchError> {
        self.apply(Operation::Seed, |current| {
            let riders: Arc<[Rider]> = self
                .fixture
                .riders
                .iter()
                .map(|seed| Rider {
                    id: seed.id.clone(),
                    name: seed.name.clone(),
                    roll: seed.roll.clone(),
                    hostel: seed.hostel.clone(),
                    pickup: seed.pickup.clone(),
                    drop: seed.drop.clone(),
                    pool_id: None,
                    status: RiderStatus::Waiting,
                    color: None,
                })
                .collect();
            let drivers: Arc<[Driver]> = self
                .fixture
                .drivers
                .iter()
                .map(|seed| Driver {
                    id: seed.id.clone(),
                    name: seed.name.clone(),
                    plate: seed.plate.clone(),
                    position: seed.position,
                    status: DriverStatus::Idle,
                    assigned_pool_id: None,
                })
                .collect();

            Ok(Change::Replace(
                Snapshot {
                    run: current.run.saturating_add(1),
                    riders,
                    drivers,
                    pools: empty(),
                    trips: empty(),
                    ..current.clone()
                },
                (),
            ))
        })
    }

    /// Group waiting riders into pools with the configured rule.
    ///
    /// Pooled riders get the pool's id and color and become `pooled`.
    /// Riders left over from a short final group stay `waiting`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidPhase`] unless the phase is `seeded`.
    /// - [`DispatchError::UnknownHotspot`] if a waiting rider's pickup or
    ///   drop does not resolve.
    /// - [`DispatchError::Grouping`] if the rule rejects the capacity.
    /// - [`DispatchError::NoPoolsFormed`] if not a single pool fills.
    pub fn create_pools(&self) -> Result<usize, DispatchError> {
        self.apply(Operation::CreatePools, |current| {
            let waiting: Vec<Rider> = current
                .riders
                .iter()
                .filter(|r| r.status == RiderStatus::Waiting)
                .cloned()
                .collect();
            for rider in &waiting {
                for hotspot in [&rider.pickup, &rider.drop] {
                    if current.hotspot(hotspot).is_none() {
                        return Err(DispatchError::UnknownHotspot {
                            hotspot: hotspot.clone(),
                        });
                    }
                }
            }

            let drafts = self.rule.group(&waiting, self.capacity)?;
            if drafts.is_empty() {
                return Err(DispatchError::NoPoolsFormed {
                    waiting: waiting.len(),
                    capacity: self.capacity,
                });
            }

            let mut rng = StdRng::seed_from_u64(self.code_seed ^ current.run);
            let mut pools: Vec<Pool> = Vec::with_capacity(drafts.len());
            for (index, draft) in drafts.into_iter().enumerate() {
                let pool = self.materialize_pool(index, draft, &pools, &mut rng);
                pools.push(pool);
            }

            let riders: Arc<[Rider]> = current
                .riders
                .iter()
                .map(|rider| {
                    pools
                        .iter()
                        .find(|p| p.rider_ids.contains(&rider.id))
                        .map_or_else(
                            || rider.clone(),
                            |pool| Rider {
                                pool_id: Some(pool.id.clone()),
                                status: RiderStatus::Pooled,
                                color: Some(pool.color.clone()),
                                ..rider.clone()
                            },
                        )
                })
                .collect();

            let created = pools.len();
            Ok(Change::Replace(
                Snapshot {
                    riders,
                    pools: Arc::from(pools),
                    ..current.clone()
                },
                created,
            ))
        })
    }

    /// Give the `index`-th draft its palette identity, or a generated one.
    fn materialize_pool(
        &self,
        index: usize,
        draft: PoolDraft,
        existing: &[Pool],
        rng: &mut StdRng,
    ) -> Pool {
        let entry = self.fixture.palette.get(index);

        let id = entry.map_or_else(
            || {
                let mut n = index.saturating_add(1);
                loop {
                    let candidate = PoolId::new(format!("pool-{n}"));
                    let taken = existing.iter().any(|p| p.id == candidate)
                        || self.fixture.palette.iter().any(|e| e.id == candidate);
                    if !taken {
                        break candidate;
                    }
                    n = n.saturating_add(1);
                }
            },
            |e| e.id.clone(),
        );

        let color = entry.map_or_else(
            || {
                let palette: Vec<&str> = self.fixture.palette.iter().map(|e| e.color.as_str()).collect();
                let colors: &[&str] = if palette.is_empty() {
                    &FALLBACK_COLORS
                } else {
                    &palette
                };
                colors
                    .iter()
                    .cycle()
                    .nth(index)
                    .map_or_else(String::new, |c| (*c).to_owned())
            },
            |e| e.color.clone(),
        );

        let code = entry.and_then(|e| e.code.clone()).unwrap_or_else(|| {
            let n = rng.random_range(0..1_000_000_u32);
            format!("{n:06}")
        });

        Pool {
            id,
            rider_ids: draft.rider_ids,
            pickup: draft.pickup,
            drop: draft.drop,
            extra_pickups: draft.extra_pickups,
            color,
            code,
            verified: false,
            driver_id: None,
            status: PoolStatus::Pending,
        }
    }

    /// Pair each pool with an idle driver, in order, and build its trip.
    ///
    /// Either every pool gets a driver or nothing changes.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidPhase`] unless the phase is `pooled`.
    /// - [`DispatchError::InsufficientDrivers`] if idle drivers run short.
    /// - [`DispatchError::UnknownHotspot`] if a stop cannot be routed.
    pub fn assign_drivers(&self) -> Result<usize, DispatchError> {
        self.apply(Operation::AssignDrivers, |current| {
            let idle: Vec<&Driver> = current
                .drivers
                .iter()
                .filter(|d| d.status == DriverStatus::Idle)
                .collect();
            if idle.len() < current.pools.len() {
                return Err(DispatchError::InsufficientDrivers {
                    pools: current.pools.len(),
                    idle: idle.len(),
                });
            }

            let mut pools: Vec<Pool> = Vec::with_capacity(current.pools.len());
            let mut trips: Vec<Trip> = Vec::with_capacity(current.pools.len());
            for (pool, &driver) in current.pools.iter().zip(&idle) {
                let route =
                    itinerary::plan_route(driver, &itinerary::pool_stops(pool), &self.fixture)?;
                trips.push(Trip {
                    id: TripId::for_pool(&pool.id),
                    pool_id: pool.id.clone(),
                    driver_id: driver.id.clone(),
                    route,
                    current_position: None,
                    progress: 0.0,
                    status: TripStatus::Pending,
                });
                pools.push(Pool {
                    driver_id: Some(driver.id.clone()),
                    status: PoolStatus::Assigned,
                    ..pool.clone()
                });
            }

            let drivers: Arc<[Driver]> = current
                .drivers
                .iter()
                .map(|driver| {
                    pools
                        .iter()
                        .find(|p| p.driver_id.as_ref() == Some(&driver.id))
                        .map_or_else(
                            || driver.clone(),
                            |pool| Driver {
                                status: DriverStatus::Assigned,
                                assigned_pool_id: Some(pool.id.clone()),
                                ..driver.clone()
                            },
                        )
                })
                .collect();
            let riders = map_pooled_riders(&current.riders, RiderStatus::Assigned);

            let assigned = trips.len();
            Ok(Change::Replace(
                Snapshot {
                    riders,
                    drivers,
                    pools: Arc::from(pools),
                    trips: Arc::from(trips),
                    ..current.clone()
                },
                assigned,
            ))
        })
    }

    /// Check a pool's verification code.
    ///
    /// Returns `true` iff `code` equals the pool's code exactly. The first
    /// match marks the pool `verified`; once every pool is verified the
    /// phase advances to `verified`. Repeating a correct code changes
    /// nothing. A mismatch changes nothing.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidPhase`] unless the phase is `assigned` or
    ///   `verified`.
    /// - [`DispatchError::PoolNotFound`] for an unknown pool.
    pub fn verify_otp(&self, pool_id: &PoolId, code: &str) -> Result<bool, DispatchError> {
        let verified = self.apply(Operation::VerifyOtp, |current| {
            let pool = current
                .pool(pool_id)
                .ok_or_else(|| DispatchError::PoolNotFound(pool_id.clone()))?;
            if pool.code != code {
                return Ok(Change::Keep(false));
            }
            if pool.verified {
                return Ok(Change::Keep(true));
            }

            let pools: Arc<[Pool]> = current
                .pools
                .iter()
                .map(|p| {
                    if p.id == *pool_id {
                        Pool {
                            verified: true,
                            status: PoolStatus::Verified,
                            ..p.clone()
                        }
                    } else {
                        p.clone()
                    }
                })
                .collect();
            let phase = if pools.iter().all(|p| p.verified) {
                Phase::Verified
            } else {
                current.phase
            };

            Ok(Change::Replace(
                Snapshot {
                    phase,
                    pools,
                    ..current.clone()
                },
                true,
            ))
        })?;

        if !verified {
            info!(simulation_id = %self.id, pool_id = %pool_id, "Verification code mismatch");
        }
        Ok(verified)
    }

    /// Start every trip at the first point of its route.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidPhase`] unless the phase is `verified`.
    pub fn start_trips(&self) -> Result<(), DispatchError> {
        self.apply(Operation::StartTrips, |current| {
            let trips: Arc<[Trip]> = current
                .trips
                .iter()
                .map(|t| Trip {
                    status: TripStatus::Started,
                    current_position: Some(t.route.start()),
                    progress: 0.0,
                    ..t.clone()
                })
                .collect();
            let pools: Arc<[Pool]> = current
                .pools
                .iter()
                .map(|p| Pool {
                    status: PoolStatus::Started,
                    ..p.clone()
                })
                .collect();
            let drivers: Arc<[Driver]> = current
                .drivers
                .iter()
                .map(|d| {
                    if d.assigned_pool_id.is_some() {
                        Driver {
                            status: DriverStatus::Enroute,
                            ..d.clone()
                        }
                    } else {
                        d.clone()
                    }
                })
                .collect();
            let riders = map_pooled_riders(&current.riders, RiderStatus::Enroute);

            Ok(Change::Replace(
                Snapshot {
                    riders,
                    drivers,
                    pools,
                    trips,
                    ..current.clone()
                },
                (),
            ))
        })
    }

    /// Record a trip's progress and position.
    ///
    /// Progress is clamped to `[0, 1]` (NaN counts as 0) and never lowers
    /// the stored value; a write that would not raise it is ignored. The
    /// phase does not change. Returns the trip's progress afterwards.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidPhase`] unless the phase is `moving`.
    /// - [`DispatchError::TripNotFound`] / [`DispatchError::TripNotStarted`].
    pub fn update_trip_progress(
        &self,
        trip_id: &TripId,
        progress: f64,
        position: Position,
    ) -> Result<f64, DispatchError> {
        let update = ProgressUpdate {
            trip_id: trip_id.clone(),
            progress,
            position,
        };
        self.apply(Operation::UpdateTripProgress, |current| {
            let trip = started_trip(current, trip_id)?;
            let stored = trip.progress;
            match merge_progress(&current.trips, core::slice::from_ref(&update)) {
                Some(trips) => {
                    let merged = trips
                        .iter()
                        .find(|t| t.id == *trip_id)
                        .map_or(stored, |t| t.progress);
                    Ok(Change::Replace(
                        Snapshot {
                            trips,
                            ..current.clone()
                        },
                        merged,
                    ))
                }
                None => Ok(Change::Keep(stored)),
            }
        })
    }

    /// Apply a batch of progress writes atomically on behalf of `run`.
    ///
    /// Same merge rules as [`update_trip_progress`](Self::update_trip_progress).
    /// Returns how many trips advanced.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::InvalidPhase`] unless the phase is `moving`.
    /// - [`DispatchError::StaleRun`] if the store was re-seeded since `run`.
    /// - [`DispatchError::TripNotFound`] / [`DispatchError::TripNotStarted`].
    pub fn record_progress(
        &self,
        run: u64,
        updates: &[ProgressUpdate],
    ) -> Result<usize, DispatchError> {
        self.apply(Operation::UpdateTripProgress, |current| {
            ensure_run(current, run)?;
            for update in updates {
                started_trip(current, &update.trip_id)?;
            }
            match merge_progress(&current.trips, updates) {
                Some(trips) => {
                    let advanced = trips
                        .iter()
                        .zip(current.trips.iter())
                        .filter(|(new, old)| new.progress > old.progress)
                        .count();
                    Ok(Change::Replace(
                        Snapshot {
                            trips,
                            ..current.clone()
                        },
                        advanced,
                    ))
                }
                None => Ok(Change::Keep(0)),
            }
        })
    }

    /// Finish every trip: trips at full progress and parked at their route's
    /// end, pools and riders `completed`, every driver `idle` and unassigned.
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidPhase`] unless the phase is `moving`.
    pub fn complete_trips(&self) -> Result<(), DispatchError> {
        self.apply(Operation::CompleteTrips, |current| Ok(complete(current)))
    }

    /// [`complete_trips`](Self::complete_trips), but only if the store is
    /// still on `run`.
    ///
    /// # Errors
    ///
    /// As `complete_trips`, plus [`DispatchError::StaleRun`].
    pub fn complete_trips_in_run(&self, run: u64) -> Result<(), DispatchError> {
        self.apply(Operation::CompleteTrips, |current| {
            ensure_run(current, run)?;
            Ok(complete(current))
        })
    }

    /// Clear riders, drivers, pools, and trips and return to `idle`.
    /// Hotspots are kept. Legal from every phase.
    pub fn reset(&self) -> Result<(), DispatchError> {
        self.apply(Operation::Reset, |current| {
            Ok(Change::Replace(
                Snapshot {
                    riders: empty(),
                    drivers: empty(),
                    pools: empty(),
                    trips: empty(),
                    ..current.clone()
                },
                (),
            ))
        })
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    /// Run `build` against the current snapshot under the write lock and
    /// swap in its result. The phase of a replaced snapshot is set from
    /// [`lifecycle::target_phase`]; only `verify_otp` picks its own.
    fn apply<T>(
        &self,
        operation: Operation,
        build: impl FnOnce(&Snapshot) -> Result<Change<T>, DispatchError>,
    ) -> Result<T, DispatchError> {
        let mut outcome: Option<(Phase, Result<(T, Option<Arc<Snapshot>>), DispatchError>)> =
            None;

        self.state.send_if_modified(|current| {
            let before = current.phase;
            let result = match lifecycle::ensure(operation, before) {
                Ok(()) => build(current),
                Err(err) => Err(err.into()),
            };
            let (modified, result) = match result {
                Ok(Change::Replace(mut next, value)) => {
                    if let Some(target) = lifecycle::target_phase(operation) {
                        next.phase = target;
                    }
                    next.version = current.version.saturating_add(1);
                    let next = Arc::new(next);
                    *current = Arc::clone(&next);
                    (true, Ok((value, Some(next))))
                }
                Ok(Change::Keep(value)) => (false, Ok((value, None))),
                Err(err) => (false, Err(err)),
            };
            outcome = Some((before, result));
            modified
        });

        match outcome {
            Some((before, Ok((value, next)))) => {
                if let Some(next) = next {
                    self.publish(operation, before, &next);
                }
                Ok(value)
            }
            Some((before, Err(err))) => {
                warn!(
                    simulation_id = %self.id,
                    operation = %operation,
                    phase = %before,
                    error = %err,
                    "Dispatch operation rejected"
                );
                Err(err)
            }
            None => Err(DispatchError::Internal("snapshot update did not run")),
        }
    }

    /// Log an applied change and broadcast its event.
    fn publish(&self, operation: Operation, before: Phase, next: &Snapshot) {
        let counts = next.counts();
        let event = DispatchEvent {
            simulation_id: self.id,
            run: next.run,
            operation,
            phase: next.phase,
            version: next.version,
            counts,
            occurred_at: Utc::now(),
        };
        // send returns Err only when nobody is subscribed.
        let subscribers = self.events.send(event).unwrap_or(0);

        if operation == Operation::UpdateTripProgress {
            debug!(
                simulation_id = %self.id,
                run = next.run,
                version = next.version,
                subscribers,
                "Trip progress recorded"
            );
        } else {
            info!(
                simulation_id = %self.id,
                operation = %operation,
                from = %before,
                to = %next.phase,
                run = next.run,
                version = next.version,
                riders = counts.riders,
                pooled_riders = counts.pooled_riders,
                pools = counts.pools,
                trips = counts.trips,
                subscribers,
                "Dispatch operation applied"
            );
        }
    }
}

/// Set every pooled rider's status; riders outside pools are untouched.
fn map_pooled_riders(riders: &[Rider], status: RiderStatus) -> Arc<[Rider]> {
    riders
        .iter()
        .map(|r| {
            if r.pool_id.is_some() {
                Rider {
                    status,
                    ..r.clone()
                }
            } else {
                r.clone()
            }
        })
        .collect()
}

const fn ensure_run(current: &Snapshot, run: u64) -> Result<(), DispatchError> {
    if current.run == run {
        Ok(())
    } else {
        Err(DispatchError::StaleRun {
            expected: run,
            current: current.run,
        })
    }
}

fn started_trip<'a>(current: &'a Snapshot, trip_id: &TripId) -> Result<&'a Trip, DispatchError> {
    let trip = current
        .trip(trip_id)
        .ok_or_else(|| DispatchError::TripNotFound(trip_id.clone()))?;
    if trip.status == TripStatus::Started {
        Ok(trip)
    } else {
        Err(DispatchError::TripNotStarted(trip_id.clone()))
    }
}

/// Merge progress writes into a new trip list, or `None` if no trip moves
/// forward.
fn merge_progress(trips: &[Trip], updates: &[ProgressUpdate]) -> Option<Arc<[Trip]>> {
    let mut changed = false;
    let merged: Arc<[Trip]> = trips
        .iter()
        .map(|trip| {
            let mut next = trip.clone();
            for update in updates.iter().filter(|u| u.trip_id == trip.id) {
                let progress = clamp_progress(update.progress);
                if progress > next.progress {
                    next.progress = progress;
                    next.current_position = Some(update.position);
                    changed = true;
                }
            }
            next
        })
        .collect();
    changed.then_some(merged)
}

fn complete(current: &Snapshot) -> Change<()> {
    let trips: Arc<[Trip]> = current
        .trips
        .iter()
        .map(|t| Trip {
            status: TripStatus::Completed,
            progress: 1.0,
            current_position: Some(t.route.end()),
            ..t.clone()
        })
        .collect();
    let pools: Arc<[Pool]> = current
        .pools
        .iter()
        .map(|p| Pool {
            status: PoolStatus::Completed,
            ..p.clone()
        })
        .collect();
    let drivers: Arc<[Driver]> = current
        .drivers
        .iter()
        .map(|d| Driver {
            status: DriverStatus::Idle,
            assigned_pool_id: None,
            ..d.clone()
        })
        .collect();
    let riders = map_pooled_riders(&current.riders, RiderStatus::Completed);

    Change::Replace(
        Snapshot {
            riders,
            drivers,
            pools,
            trips,
            ..current.clone()
        },
        (),
    )
}
