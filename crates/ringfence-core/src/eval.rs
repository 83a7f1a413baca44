//! Position-versus-fence evaluation: altitude gate, bounding-box fast
//! rejection, per-shape model selection, and the pessimist/optimist algebra
//! that turns uncertainty into a position state.

use tracing::warn;

use crate::fence::Fence;
use crate::geodesic;
use crate::shape::{GeoModel, SquareExtent};
use crate::sphere;
use crate::{
    GeofenceError, Position, PositionState, TestType, Vertex,
    SQUARE_EXTENT_UNCERTAINTY_MARGIN_METRES, WGS84_THRESHOLD_METRES,
};

pub(crate) const WGS84_THRESHOLD_MM: i64 = WGS84_THRESHOLD_METRES * 1_000;
pub(crate) const SQUARE_EXTENT_MARGIN_MM: i64 = SQUARE_EXTENT_UNCERTAINTY_MARGIN_METRES * 1_000;

/// Outcome of evaluating one position against one fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: PositionState,
    pub transit: bool,
    /// Signed distance to the nearest shape edge, when the full test ran.
    pub distance_mm: Option<i64>,
}

impl Evaluation {
    fn inapplicable() -> Self {
        Self { state: PositionState::None, transit: false, distance_mm: None }
    }
}

// Which numerical model to run a shape test under, per query.
fn select_model(extent: &SquareExtent, point: &Vertex, radius_h_mm: i64) -> GeoModel {
    if !extent.near_pole && extent.max_side_mm <= WGS84_THRESHOLD_MM {
        if let Ok(rough_mm) = sphere::haversine_mm(point, &extent.centre()) {
            if rough_mm <= WGS84_THRESHOLD_MM + SQUARE_EXTENT_MARGIN_MM + radius_h_mm {
                return GeoModel::Planar;
            }
        }
    }
    if extent.max_side_mm > WGS84_THRESHOLD_MM && geodesic::installed() {
        return GeoModel::Geodesic;
    }
    GeoModel::Spherical
}

// State resolution. "Certainly" means the whole uncertainty disc is inside;
// "possibly" means some of it is. Inside/Outside tests report their condition
// eagerly (pessimist) or only when certain (optimist). Transit tests flip
// away from the prior state eagerly under pessimism, so the state flip-flops
// while the uncertainty disc straddles a boundary.
fn resolve_state(
    test_type: TestType,
    pessimist: bool,
    prior: PositionState,
    possibly: bool,
    certainly: bool,
) -> PositionState {
    let inside = |yes: bool| if yes { PositionState::Inside } else { PositionState::Outside };
    match test_type {
        TestType::Inside => inside(if pessimist { possibly } else { certainly }),
        TestType::Outside => inside(if pessimist { certainly } else { possibly }),
        TestType::Transit | TestType::None => match prior {
            PositionState::Inside => inside(if pessimist { certainly } else { possibly }),
            PositionState::Outside | PositionState::None => {
                inside(if pessimist { possibly } else { certainly })
            }
        },
    }
}

/// Evaluates `position` against `fence`. `prior` is the stored state for the
/// (context, fence) pair, or the fence's own state for standalone tests.
///
/// Never fails on geometry: any internal numeric problem yields
/// `PositionState::None`, to be treated as "position not received". The only
/// error is `InvalidArg` for an out-of-range position.
pub fn evaluate_fence(
    fence: &Fence,
    test_type: TestType,
    pessimist: bool,
    prior: PositionState,
    position: &Position,
) -> Result<Evaluation, GeofenceError> {
    if !fence.is_valid() {
        return Ok(Evaluation::inapplicable());
    }
    let point = Vertex::new(position.lat_e9, position.lon_e9)?;

    // altitude gate
    let mut possibly_v = true;
    let mut certainly_v = true;
    if fence.alt_min_mm().is_some() || fence.alt_max_mm().is_some() {
        let Some(alt) = position.alt_mm else {
            // a banded fence cannot judge a 2D fix
            return Ok(Evaluation::inapplicable());
        };
        let alt = i64::from(alt);
        let radius_v = position.radius_v_mm.map_or(0, |r| i64::from(r.max(0)));
        if let Some(min) = fence.alt_min_mm() {
            let min = i64::from(min);
            possibly_v &= alt + radius_v >= min;
            certainly_v &= alt - radius_v >= min;
        }
        if let Some(max) = fence.alt_max_mm() {
            let max = i64::from(max);
            possibly_v &= alt - radius_v <= max;
            certainly_v &= alt + radius_v <= max;
        }
    }

    let mut possibly_h = false;
    let mut certainly_h = false;
    let mut distance_mm: Option<i64> = None;

    // horizontal test, skipped entirely when the altitude band already rules
    // the position out
    if possibly_v {
        let radius_h = position.radius_h_mm.map_or(0, |r| i64::from(r.max(0)));
        for entry in fence.shapes() {
            if !entry.shape.is_valid() {
                continue;
            }
            if radius_h < SQUARE_EXTENT_MARGIN_MM
                && !entry.extent.contains_with_margin_mm(&point, SQUARE_EXTENT_MARGIN_MM)
            {
                continue;
            }
            let model = select_model(&entry.extent, &point, radius_h);
            let signed = match entry.shape.signed_distance_mm(&point, model) {
                Ok(signed) => signed,
                Err(GeofenceError::Numeric) => {
                    warn!("numeric fallback evaluating fence {:?}, position dropped", fence.name());
                    return Ok(Evaluation::inapplicable());
                }
                Err(e) => return Err(e),
            };
            if signed <= radius_h {
                possibly_h = true;
            }
            if signed <= -radius_h {
                certainly_h = true;
            }
            distance_mm = Some(match distance_mm {
                Some(best) if best.abs() <= signed.abs() => best,
                _ => signed,
            });
        }
    }

    let possibly = possibly_h && possibly_v;
    let certainly = certainly_h && certainly_v;
    let state = resolve_state(test_type, pessimist, prior, possibly, certainly);
    let transit = test_type == TestType::Transit
        && prior != PositionState::None
        && state != prior;
    Ok(Evaluation { state, transit, distance_mm })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(lat_e9: i64, lon_e9: i64) -> Vertex {
        Vertex::new(lat_e9, lon_e9).unwrap()
    }

    fn pos(lat_e9: i64, lon_e9: i64) -> Position {
        Position::new(lat_e9, lon_e9, 0)
    }

    // a 10 km circle at the origin
    fn circle_fence() -> Fence {
        let mut fence = Fence::new(Some("disc"));
        fence.add_circle(v(0, 0), 10_000_000).unwrap();
        fence
    }

    fn eval(fence: &Fence, test_type: TestType, pessimist: bool, p: &Position) -> Evaluation {
        evaluate_fence(fence, test_type, pessimist, PositionState::None, p).unwrap()
    }

    #[test]
    fn empty_fence_evaluates_to_none() {
        let fence = Fence::new(None);
        let outcome = eval(&fence, TestType::Inside, true, &pos(0, 0));
        assert_eq!(outcome.state, PositionState::None);
        assert_eq!(outcome.distance_mm, None);
    }

    #[test]
    fn zero_uncertainty_matches_the_strict_predicate() {
        let fence = circle_fence();
        // ~5.6 km north: inside under both modes
        let inside = pos(50_000_000, 0);
        // ~111 km north: outside under both modes
        let outside = pos(1_000_000_000, 0);
        for pessimist in [false, true] {
            assert_eq!(eval(&fence, TestType::Inside, pessimist, &inside).state, PositionState::Inside);
            assert_eq!(eval(&fence, TestType::Inside, pessimist, &outside).state, PositionState::Outside);
            // outside-pessimist with zero radius is the exact negation
            assert_eq!(eval(&fence, TestType::Outside, pessimist, &inside).state, PositionState::Inside);
            assert_eq!(eval(&fence, TestType::Outside, pessimist, &outside).state, PositionState::Outside);
        }
    }

    #[test]
    fn optimist_inside_implies_pessimist_inside() {
        let fence = circle_fence();
        // straddling the edge: ~10 km out with 1 km of uncertainty
        let mut straddle = pos(89_932_000, 0);
        straddle.radius_h_mm = Some(1_000_000);
        let optimist = eval(&fence, TestType::Inside, false, &straddle);
        let pessimist = eval(&fence, TestType::Inside, true, &straddle);
        if optimist.state == PositionState::Inside {
            assert_eq!(pessimist.state, PositionState::Inside);
        }
        // at the edge the two modes disagree by design
        assert_eq!(optimist.state, PositionState::Outside);
        assert_eq!(pessimist.state, PositionState::Inside);
    }

    #[test]
    fn fast_rejection_returns_outside_with_no_distance() {
        let fence = circle_fence();
        // the far side of the planet
        let outcome = eval(&fence, TestType::Inside, true, &pos(0, 170_000_000_000));
        assert_eq!(outcome.state, PositionState::Outside);
        assert_eq!(outcome.distance_mm, None);
    }

    #[test]
    fn large_uncertainty_disables_fast_rejection() {
        let fence = circle_fence();
        // 200 km north with 250 km of claimed uncertainty: the box test is
        // bypassed and the full test must run
        let mut p = pos(1_800_000_000, 0);
        p.radius_h_mm = Some(250_000_000);
        let outcome = eval(&fence, TestType::Inside, true, &p);
        assert_eq!(outcome.state, PositionState::Inside);
        assert!(outcome.distance_mm.is_some());
    }

    #[test]
    fn union_over_shapes() {
        let mut fence = Fence::new(Some("pair"));
        fence.add_circle(v(0, 0), 10_000_000).unwrap();
        fence.add_circle(v(0, 2_000_000_000), 10_000_000).unwrap();
        assert_eq!(eval(&fence, TestType::Inside, true, &pos(0, 2_000_000_000)).state, PositionState::Inside);
        assert_eq!(eval(&fence, TestType::Inside, true, &pos(0, 0)).state, PositionState::Inside);
        assert_eq!(eval(&fence, TestType::Inside, true, &pos(0, 1_000_000_000)).state, PositionState::Outside);
    }

    #[test]
    fn altitude_band_skips_2d_fixes() {
        let mut fence = circle_fence();
        fence.set_altitude_min(Some(276_000)).unwrap();
        let outcome = eval(&fence, TestType::Inside, true, &pos(0, 0));
        assert_eq!(outcome.state, PositionState::None);
    }

    #[test]
    fn altitude_band_gates_the_horizontal_result() {
        let mut fence = circle_fence();
        fence.set_altitude_min(Some(276_000)).unwrap();

        let mut ground = pos(0, 0);
        ground.alt_mm = Some(0);
        assert_eq!(eval(&fence, TestType::Inside, true, &ground).state, PositionState::Outside);

        let mut high = pos(0, 0);
        high.alt_mm = Some(276_000);
        assert_eq!(eval(&fence, TestType::Inside, false, &high).state, PositionState::Inside);

        // straddling the floor by 1 mm of vertical uncertainty
        let mut straddling = pos(0, 0);
        straddling.alt_mm = Some(276_000);
        straddling.radius_v_mm = Some(1);
        assert_eq!(eval(&fence, TestType::Inside, true, &straddling).state, PositionState::Inside);
        assert_eq!(eval(&fence, TestType::Inside, false, &straddling).state, PositionState::Outside);
    }

    #[test]
    fn transit_requires_two_known_states() {
        let fence = circle_fence();
        let inside = pos(0, 0);
        let outside = pos(1_000_000_000, 0);

        let first = evaluate_fence(&fence, TestType::Transit, true, PositionState::None, &inside).unwrap();
        assert_eq!(first.state, PositionState::Inside);
        assert!(!first.transit);

        let out = evaluate_fence(&fence, TestType::Transit, true, first.state, &outside).unwrap();
        assert_eq!(out.state, PositionState::Outside);
        assert!(out.transit);

        let same = evaluate_fence(&fence, TestType::Transit, true, out.state, &outside).unwrap();
        assert!(!same.transit);
    }

    #[test]
    fn pessimist_transit_flips_eagerly_in_the_uncertainty_band() {
        let fence = circle_fence();
        // dead on the edge with 1 km of uncertainty: neither certainly inside
        // nor certainly outside
        let mut edge = pos(89_900_000, 0);
        edge.radius_h_mm = Some(1_000_000);

        let from_inside =
            evaluate_fence(&fence, TestType::Transit, true, PositionState::Inside, &edge).unwrap();
        assert_eq!(from_inside.state, PositionState::Outside);
        assert!(from_inside.transit);

        let from_outside =
            evaluate_fence(&fence, TestType::Transit, true, PositionState::Outside, &edge).unwrap();
        assert_eq!(from_outside.state, PositionState::Inside);
        assert!(from_outside.transit);

        // the optimist holds its prior state in the same band
        let optimist =
            evaluate_fence(&fence, TestType::Transit, false, PositionState::Inside, &edge).unwrap();
        assert_eq!(optimist.state, PositionState::Inside);
        assert!(!optimist.transit);
    }

    #[test]
    fn out_of_range_position_is_an_argument_error() {
        let fence = circle_fence();
        let junk = Position::new(91_000_000_000, 0, 0);
        assert_eq!(
            evaluate_fence(&fence, TestType::Inside, true, PositionState::None, &junk),
            Err(GeofenceError::InvalidArg("latitude out of range"))
        );
    }

    #[test]
    fn unknown_radius_behaves_as_zero() {
        let fence = circle_fence();
        let mut p = pos(0, 0);
        p.radius_h_mm = None;
        assert_eq!(eval(&fence, TestType::Inside, false, &p).state, PositionState::Inside);
        p.radius_h_mm = Some(-1);
        assert_eq!(eval(&fence, TestType::Inside, false, &p).state, PositionState::Inside);
    }
}
