//! Core entity structs for the Campool simulation.
//!
//! Riders, drivers, pools, and trips reference each other by ID only. The
//! dispatch store in `campool-core` owns every collection and is the only
//! place these values are mutated.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{DriverStatus, PoolStatus, RiderStatus, TripStatus};
use crate::ids::{DriverId, HotspotId, PoolId, RiderId, TripId};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A 2-D map position in degrees.
///
/// Distances between positions are planar (Euclidean in degree space).
/// This is adequate for campus-scale routes and matches how the renderer
/// draws polylines.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Position {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Position {
    /// Create a position from latitude and longitude.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Planar distance to another position.
    pub fn distance_to(self, other: Self) -> f64 {
        (other.lat - self.lat).hypot(other.lng - self.lng)
    }

    /// Linear interpolation toward `other`; `t = 0` is `self`, `t = 1` is `other`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        Self {
            lat: (other.lat - self.lat).mul_add(t, self.lat),
            lng: (other.lng - self.lng).mul_add(t, self.lng),
        }
    }

    /// Whether both coordinates are finite numbers.
    pub fn is_finite(self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// An ordered polyline with at least one point.
///
/// Construction rejects empty point lists, so holders of a `Route` never
/// need to handle the empty case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Position>", into = "Vec<Position>")]
pub struct Route {
    points: Vec<Position>,
}

impl Route {
    /// Build a route, returning `None` when `points` is empty.
    pub fn new(points: Vec<Position>) -> Option<Self> {
        if points.is_empty() {
            None
        } else {
            Some(Self { points })
        }
    }

    /// The route's points in travel order.
    pub fn points(&self) -> &[Position] {
        &self.points
    }

    /// The first point of the route.
    pub fn start(&self) -> Position {
        // Non-empty by construction.
        match self.points.as_slice() {
            [first, ..] => *first,
            [] => Position::new(0.0, 0.0),
        }
    }

    /// The last point of the route.
    pub fn end(&self) -> Position {
        match self.points.as_slice() {
            [.., last] => *last,
            [] => Position::new(0.0, 0.0),
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`; present for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl TryFrom<Vec<Position>> for Route {
    type Error = &'static str;

    fn try_from(points: Vec<Position>) -> Result<Self, Self::Error> {
        Self::new(points).ok_or("route must contain at least one point")
    }
}

impl From<Route> for Vec<Position> {
    fn from(route: Route) -> Self {
        route.points
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A named pickup or drop point. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Hotspot {
    /// Hotspot identifier.
    pub id: HotspotId,
    /// Display name.
    pub name: String,
    /// Map position.
    pub position: Position,
}

/// A student wanting a ride.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Rider {
    /// Rider identifier.
    pub id: RiderId,
    /// Display name.
    pub name: String,
    /// External roll number.
    pub roll: String,
    /// Hostel (origin group) the rider lives in.
    pub hostel: String,
    /// Where the rider wants to be picked up.
    pub pickup: HotspotId,
    /// Where the rider wants to be dropped.
    pub drop: HotspotId,
    /// The pool the rider was grouped into.
    pub pool_id: Option<PoolId>,
    /// Current lifecycle status.
    pub status: RiderStatus,
    /// Color tag of the rider's pool, set when grouped.
    pub color: Option<String>,
}

/// A driver who can serve one pool at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Driver {
    /// Driver identifier.
    pub id: DriverId,
    /// Display name.
    pub name: String,
    /// Vehicle plate.
    pub plate: String,
    /// Current map position.
    pub position: Position,
    /// Current availability.
    pub status: DriverStatus,
    /// The pool this driver serves, if any.
    pub assigned_pool_id: Option<PoolId>,
}

/// A fixed-capacity group of riders sharing one pickup/drop assignment
/// and one verification code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Pool {
    /// Pool identifier.
    pub id: PoolId,
    /// Members in boarding order. Length is fixed at creation.
    pub rider_ids: Vec<RiderId>,
    /// Nominal pickup hotspot.
    pub pickup: HotspotId,
    /// Nominal drop hotspot.
    pub drop: HotspotId,
    /// Additional pickup stops for members boarding elsewhere, in order.
    pub extra_pickups: Vec<HotspotId>,
    /// Color tag shared by the pool's riders.
    pub color: String,
    /// One-time code the riders disclose to the driver.
    pub code: String,
    /// Whether the driver has confirmed the code.
    pub verified: bool,
    /// The assigned driver.
    pub driver_id: Option<DriverId>,
    /// Current status.
    pub status: PoolStatus,
}

impl Pool {
    /// Every pickup stop in visiting order: the nominal pickup first.
    pub fn pickup_stops(&self) -> impl Iterator<Item = &HotspotId> {
        core::iter::once(&self.pickup).chain(self.extra_pickups.iter())
    }
}

/// The execution of a pool's ride by its assigned driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Trip {
    /// Trip identifier.
    pub id: TripId,
    /// The pool being driven.
    pub pool_id: PoolId,
    /// The driver driving it.
    pub driver_id: DriverId,
    /// Fixed route from the driver's start through every stop.
    #[ts(as = "Vec<Position>")]
    pub route: Route,
    /// Latest interpolated position, set once the trip starts.
    pub current_position: Option<Position>,
    /// Fraction of the route covered, in `[0, 1]`.
    pub progress: f64,
    /// Current status.
    pub status: TripStatus,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn empty_route_is_rejected() {
        assert!(Route::new(Vec::new()).is_none());
        let from_json: Result<Route, _> = serde_json::from_str("[]");
        assert!(from_json.is_err());
    }

    #[test]
    fn route_endpoints() {
        let route = Route::new(vec![
            Position::new(0.0, 0.0),
            Position::new(1.0, 0.0),
            Position::new(1.0, 2.0),
        ])
        .unwrap();
        assert_eq!(route.start(), Position::new(0.0, 0.0));
        assert_eq!(route.end(), Position::new(1.0, 2.0));
        assert_eq!(route.len(), 3);
    }

    #[test]
    fn lerp_hits_both_ends_and_middle() {
        let a = Position::new(30.0, 76.0);
        let b = Position::new(31.0, 78.0);
        assert_eq!(a.lerp(b, 0.0), a);
        let mid = a.lerp(b, 0.5);
        assert!(close(mid.lat, 30.5));
        assert!(close(mid.lng, 77.0));
        assert!(close(a.distance_to(b), 5.0_f64.sqrt()));
    }

    #[test]
    fn route_serializes_as_point_list() {
        let route = Route::new(vec![Position::new(1.5, 2.5)]);
        let json = route.and_then(|r| serde_json::to_string(&r).ok());
        assert_eq!(json.as_deref(), Some(r#"[{"lat":1.5,"lng":2.5}]"#));
    }
}
