//! Shared type definitions for the Campool ride-pooling simulation.
//!
//! This crate is the single source of truth for the data model used across
//! the Campool workspace. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the map renderer.
//!
//! # Modules
//!
//! - [`ids`] -- Typed identifiers for hotspots, riders, drivers, pools, trips
//! - [`enums`] -- Entity statuses, the lifecycle [`Phase`], and [`Operation`]
//! - [`structs`] -- Entity structs and the non-empty [`Route`] polyline

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{DriverStatus, Operation, Phase, PoolStatus, RiderStatus, TripStatus};
pub use ids::{DriverId, HotspotId, PoolId, RiderId, SimulationId, TripId};
pub use structs::{Driver, Hotspot, Pool, Position, Rider, Route, Trip};

#[cfg(test)]
mod tests {
    //! Binding generation for the renderer.

    #[test]
    fn export_bindings() {
        // ts-rs writes TypeScript bindings for every #[ts(export)] type into
        // `bindings/` relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::HotspotId::export_all();
        let _ = crate::ids::RiderId::export_all();
        let _ = crate::ids::DriverId::export_all();
        let _ = crate::ids::PoolId::export_all();
        let _ = crate::ids::TripId::export_all();
        let _ = crate::ids::SimulationId::export_all();

        // Enums
        let _ = crate::enums::RiderStatus::export_all();
        let _ = crate::enums::DriverStatus::export_all();
        let _ = crate::enums::PoolStatus::export_all();
        let _ = crate::enums::TripStatus::export_all();
        let _ = crate::enums::Phase::export_all();
        let _ = crate::enums::Operation::export_all();

        // Structs
        let _ = crate::structs::Position::export_all();
        let _ = crate::structs::Hotspot::export_all();
        let _ = crate::structs::Rider::export_all();
        let _ = crate::structs::Driver::export_all();
        let _ = crate::structs::Pool::export_all();
        let _ = crate::structs::Trip::export_all();
    }
}
