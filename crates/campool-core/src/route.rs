//! Arc-length interpolation along a route polyline.
//!
//! Given an ordered polyline and a fractional progress value, the
//! interpolator returns the point reached after travelling that fraction of
//! the polyline's total length. Progress is mapped by distance, not by
//! waypoint index, so a vehicle crosses a long segment and a short segment
//! at the same speed.
//!
//! # Guarantees
//!
//! - Pure and deterministic.
//! - Progress outside `[0, 1]` is clamped, never rejected.
//! - Monotonic: for `p1 < p2` the returned point is never behind the point
//!   returned for `p1` when measured by arc length.
//! - `progress = 0` yields the first point, `progress = 1` the last.

use campool_types::{Position, Route};

/// Errors raised by route construction and interpolation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Interpolation was requested on an empty point list.
    #[error("route must contain at least one point")]
    EmptyRoute,

    /// A point has a NaN or infinite coordinate.
    #[error("route point {index} has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// Index of the offending point.
        index: usize,
    },
}

/// Build a [`Route`] from raw points, rejecting empty or non-finite input.
///
/// # Errors
///
/// Returns [`RouteError::EmptyRoute`] or [`RouteError::NonFiniteCoordinate`].
pub fn build_route(points: Vec<Position>) -> Result<Route, RouteError> {
    if let Some(index) = points.iter().position(|p| !p.is_finite()) {
        return Err(RouteError::NonFiniteCoordinate { index });
    }
    Route::new(points).ok_or(RouteError::EmptyRoute)
}

/// Clamp a progress value to `[0, 1]`. NaN maps to `0`.
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// Total planar length of a polyline.
pub fn polyline_length(points: &[Position]) -> f64 {
    points
        .windows(2)
        .map(|pair| match pair {
            [a, b] => a.distance_to(*b),
            _ => 0.0,
        })
        .sum()
}

/// Position reached after covering `progress` of the route's length.
pub fn position_along(route: &Route, progress: f64) -> Position {
    interpolate(route.points(), progress).unwrap_or_else(|| route.start())
}

/// Shared implementation; `None` only for an empty slice.
fn interpolate(points: &[Position], progress: f64) -> Option<Position> {
    let (&first, _) = points.split_first()?;
    let last = points.last().copied().unwrap_or(first);
    if points.len() == 1 {
        return Some(first);
    }

    let progress = clamp_progress(progress);
    let total = polyline_length(points);
    if !total.is_finite() || total <= 0.0 {
        // Every point coincides.
        return Some(first);
    }
    if progress >= 1.0 {
        return Some(last);
    }

    let target = progress * total;
    let mut covered = 0.0_f64;
    for pair in points.windows(2) {
        let [a, b] = pair else { continue };
        let length = a.distance_to(*b);
        let reach = covered + length;
        if target <= reach {
            let local_t = if length > 0.0 {
                ((target - covered) / length).clamp(0.0, 1.0)
            } else {
                0.0
            };
            return Some(a.lerp(*b, local_t));
        }
        covered = reach;
    }
    Some(last)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: Position, b: Position) -> bool {
        (a.lat - b.lat).abs() < EPS && (a.lng - b.lng).abs() < EPS
    }

    fn route(points: &[(f64, f64)]) -> Route {
        build_route(points.iter().map(|&(lat, lng)| Position::new(lat, lng)).collect()).unwrap()
    }

    /// Arc length from the route start to `p`, matched against `target`.
    ///
    /// A route that revisits a point contains it on several segments; the
    /// candidate closest to `target` is returned. `None` when `p` is on no
    /// segment.
    fn arc_length_near(route: &Route, p: Position, target: f64) -> Option<f64> {
        let points = route.points();
        if points.len() == 1 {
            return points.first().filter(|&&only| only == p).map(|_| 0.0);
        }
        let mut covered = 0.0;
        let mut best: Option<f64> = None;
        for pair in points.windows(2) {
            let [a, b] = pair else { continue };
            let seg = a.distance_to(*b);
            let to_p = a.distance_to(p);
            if (to_p + p.distance_to(*b) - seg).abs() < 1e-9 {
                let candidate = covered + to_p;
                if best.is_none_or(|known| (candidate - target).abs() < (known - target).abs()) {
                    best = Some(candidate);
                }
            }
            covered += seg;
        }
        best
    }

    #[test]
    fn endpoints_match_route_ends() {
        let r = route(&[(0.0, 0.0), (3.0, 0.0), (3.0, 4.0)]);
        assert!(close(position_along(&r, 0.0), Position::new(0.0, 0.0)));
        assert!(close(position_along(&r, 1.0), Position::new(3.0, 4.0)));
    }

    #[test]
    fn progress_maps_by_distance_not_index() {
        // Segment lengths 3 and 4: halfway (3.5) lies 0.5 into the second segment.
        let r = route(&[(0.0, 0.0), (3.0, 0.0), (3.0, 4.0)]);
        assert!(close(position_along(&r, 0.5), Position::new(3.0, 0.5)));
        // 3/7 lands exactly on the middle vertex.
        assert!(close(position_along(&r, 3.0 / 7.0), Position::new(3.0, 0.0)));
    }

    #[test]
    fn single_point_route_ignores_progress() {
        let r = route(&[(30.35, 76.36)]);
        for p in [-1.0, 0.0, 0.3, 1.0, 7.0] {
            assert_eq!(position_along(&r, p), Position::new(30.35, 76.36));
        }
    }

    #[test]
    fn coincident_points_return_first() {
        let r = route(&[(1.0, 1.0), (1.0, 1.0), (1.0, 1.0)]);
        assert_eq!(position_along(&r, 0.7), Position::new(1.0, 1.0));
    }

    #[test]
    fn zero_length_segment_is_skipped() {
        let r = route(&[(0.0, 0.0), (0.0, 0.0), (0.0, 2.0)]);
        assert!(close(position_along(&r, 0.25), Position::new(0.0, 0.5)));
    }

    #[test]
    fn out_of_range_progress_is_clamped() {
        let r = route(&[(0.0, 0.0), (0.0, 2.0)]);
        assert!(close(position_along(&r, -0.5), Position::new(0.0, 0.0)));
        assert!(close(position_along(&r, 1.5), Position::new(0.0, 2.0)));
        assert!(close(position_along(&r, f64::NAN), Position::new(0.0, 0.0)));
    }

    #[test]
    fn self_crossing_route_is_traversed_in_order() {
        // A figure eight passes (1, 1) twice.
        let r = route(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)]);
        let total = polyline_length(r.points());
        let mut previous = 0.0;
        for step in 0..=400_u32 {
            let p = f64::from(step) / 400.0;
            let target = p * total;
            let here = arc_length_near(&r, position_along(&r, p), target).unwrap();
            assert!((here - target).abs() < 1e-9, "off route at progress {p}");
            assert!(here + 1e-9 >= previous, "moved backward at progress {p}");
            previous = here;
        }
    }

    #[test]
    fn empty_route_is_rejected() {
        assert_eq!(build_route(Vec::new()).err(), Some(RouteError::EmptyRoute));
    }

    #[test]
    fn non_finite_points_are_rejected() {
        let err = build_route(vec![Position::new(0.0, 0.0), Position::new(f64::NAN, 1.0)]);
        assert_eq!(err.err(), Some(RouteError::NonFiniteCoordinate { index: 1 }));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        /// Routes of 1 to 8 points on a coarse grid, so repeated points,
        /// zero-length segments and self-crossings are common.
        fn route_strategy() -> impl Strategy<Value = Route> {
            prop::collection::vec((0_i8..5, 0_i8..5), 1..=8).prop_map(|cells| {
                let points = cells
                    .into_iter()
                    .map(|(lat, lng)| Position::new(f64::from(lat), f64::from(lng)))
                    .collect();
                build_route(points).unwrap()
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

            #[test]
            fn endpoints_are_exact(r in route_strategy()) {
                let total = polyline_length(r.points());
                prop_assert_eq!(position_along(&r, 0.0), r.start());
                if total > 0.0 {
                    prop_assert_eq!(position_along(&r, 1.0), r.end());
                } else {
                    prop_assert_eq!(position_along(&r, 1.0), r.start());
                }
            }

            #[test]
            fn progress_stays_on_route_and_moves_forward(r in route_strategy()) {
                let total = polyline_length(r.points());
                let mut previous = 0.0_f64;
                for step in 0..=200_u32 {
                    let p = f64::from(step) / 200.0;
                    let target = p * total;
                    let here = arc_length_near(&r, position_along(&r, p), target);
                    prop_assert!(here.is_some(), "off route at progress {}", p);
                    let here = here.unwrap_or_default();
                    prop_assert!((here - target).abs() < 1e-9, "arc {} != {} at progress {}", here, target, p);
                    prop_assert!(here + 1e-9 >= previous, "moved backward at progress {}", p);
                    previous = here;
                }
            }
        }
    }
}
