//! Trip route planning.
//!
//! A trip's route starts at the driver's position and visits the pool's
//! stops in order: nominal pickup, extra pickups, then the drop. Each leg
//! is shaped by the fixture's corridor for that leg when one exists.

use campool_types::{Driver, HotspotId, Pool, Position, Route};

use crate::fixture::Fixture;
use crate::route::{RouteError, build_route};

/// Errors raised while planning a route.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItineraryError {
    /// A stop names a hotspot the fixture does not define.
    #[error("unknown hotspot {0}")]
    UnknownHotspot(HotspotId),

    /// The assembled points do not form a valid route.
    #[error("invalid route: {source}")]
    Route {
        /// The underlying route error.
        #[from]
        source: RouteError,
    },
}

/// Ordered stops a pool's trip must visit.
pub fn pool_stops(pool: &Pool) -> Vec<&HotspotId> {
    pool.pickup_stops()
        .chain(core::iter::once(&pool.drop))
        .collect()
}

/// Build the route from `driver` through `stops`.
///
/// # Errors
///
/// Returns [`ItineraryError::UnknownHotspot`] if a stop cannot be resolved,
/// or [`ItineraryError::Route`] if the result contains a non-finite point.
pub fn plan_route(
    driver: &Driver,
    stops: &[&HotspotId],
    fixture: &Fixture,
) -> Result<Route, ItineraryError> {
    let mut points: Vec<Position> = vec![driver.position];
    let mut leg_start = driver.id.as_str();

    for &stop in stops {
        let hotspot = fixture
            .hotspot(stop)
            .ok_or_else(|| ItineraryError::UnknownHotspot(stop.clone()))?;
        points.extend_from_slice(fixture.corridor(leg_start, stop));
        points.push(hotspot.position);
        leg_start = stop.as_str();
    }

    build_route(points).map_err(ItineraryError::from)
}
