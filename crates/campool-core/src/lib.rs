//! Dispatch lifecycle, route interpolation, and trip motion for Campool.
//!
//! This crate owns the ride-pooling lifecycle:
//! seed, pool, assign, verify, move, complete, and reset.
//!
//! # Modules
//!
//! - [`route`] -- Arc-length interpolation along a route polyline.
//! - [`lifecycle`] -- Which operation is legal in which [`Phase`].
//! - [`grouping`] -- Pluggable [`GroupingRule`]s that partition riders.
//! - [`itinerary`] -- Route planning from a driver through a pool's stops.
//! - [`fixture`] -- The reference data a scenario is seeded from.
//! - [`campus`] -- Built-in campus fixtures.
//! - [`dispatch`] -- The [`Dispatch`] context: entity store and operations.
//! - [`motion`] -- The tick-driven trip progress driver.
//! - [`config`] -- Configuration loading from `campool-config.yaml`.
//!
//! [`Phase`]: campool_types::Phase
//! [`GroupingRule`]: grouping::GroupingRule
//! [`Dispatch`]: dispatch::Dispatch

pub mod campus;
pub mod config;
pub mod dispatch;
pub mod fixture;
pub mod grouping;
pub mod itinerary;
pub mod lifecycle;
pub mod motion;
pub mod route;

pub use dispatch::{Dispatch, DispatchError, DispatchEvent, ProgressUpdate, Snapshot};
pub use motion::{CancelReason, MotionControl, MotionError, MotionOutcome, run_motion, spawn_motion};
pub use route::position_along;
