//! Type-safe identifier wrappers.
//!
//! Every entity in the simulation has a strongly-typed ID to prevent
//! accidental mixing of identifiers at compile time. Entity IDs are short
//! human-readable strings (`s1`, `d2`, `pool-red`) because fixtures name
//! them explicitly and the renderer displays them. Entities reference each
//! other by these IDs only, never by pointer.
//!
//! [`SimulationId`] is the exception: it is generated per dispatch context
//! using UUID v7 (time-ordered) and only exists to tell concurrent
//! simulation instances apart in logs and events.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`String`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a hotspot (named pickup or drop point).
    HotspotId
}

define_id! {
    /// Unique identifier for a rider requesting a pooled ride.
    RiderId
}

define_id! {
    /// Unique identifier for a driver.
    DriverId
}

define_id! {
    /// Unique identifier for a pool of riders.
    PoolId
}

define_id! {
    /// Unique identifier for a trip (one pool driven by one driver).
    TripId
}

impl TripId {
    /// Derive the trip identifier for a pool (`trip-<pool>`).
    pub fn for_pool(pool: &PoolId) -> Self {
        Self(format!("trip-{pool}"))
    }
}

/// Unique identifier for one dispatch context (simulation instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationId(pub Uuid);

impl SimulationId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for SimulationId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for SimulationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_id_is_derived_from_pool() {
        let pool = PoolId::from("pool-red");
        assert_eq!(TripId::for_pool(&pool).as_str(), "trip-pool-red");
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&RiderId::from("s1")).ok();
        assert_eq!(json.as_deref(), Some("\"s1\""));
        let restored: Result<RiderId, _> = serde_json::from_str("\"s9\"");
        assert_eq!(restored.ok(), Some(RiderId::from("s9")));
    }

    #[test]
    fn simulation_ids_are_unique() {
        let a = SimulationId::new();
        let b = SimulationId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }
}
