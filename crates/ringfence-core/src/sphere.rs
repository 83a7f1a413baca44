//! Great-circle math on the mean-radius sphere, plus the local tangent-plane
//! shortcuts used for small shapes away from the poles.
//!
//! Inputs are fixed-point vertices; outputs are millimetres. Anything that
//! feeds a trigonometric domain boundary reports `Numeric` instead of
//! producing garbage.

use std::f64::consts::PI;

use crate::units::{e9_to_radians, degrees_to_e9, normalize_lon_e9, wrap_lon_diff_e9, LAT_MAX_E9};
use crate::{GeofenceError, Vertex, WGS84_POLE_BAND_DEGREES};

pub(crate) const EARTH_MEAN_RADIUS_MM: f64 = 6_371_008_800.0;

// Tolerated floating-point excursion past a trig domain boundary. Anything
// further out is a real numeric failure, not rounding.
const TRIG_SLACK: f64 = 1e-9;

/// Which side of the great circle through an arc a point lies on, looking
/// along the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    On,
}

/// True within `WGS84_POLE_BAND_DEGREES` of either pole.
pub fn near_pole(lat_e9: i64) -> bool {
    LAT_MAX_E9 - lat_e9.abs() <= WGS84_POLE_BAND_DEGREES * 1_000_000_000
}

fn half_chord(p: &Vertex, q: &Vertex) -> Result<f64, GeofenceError> {
    let lat_p = e9_to_radians(p.lat_e9);
    let lat_q = e9_to_radians(q.lat_e9);
    let dlat = e9_to_radians(q.lat_e9 - p.lat_e9);
    let dlon = e9_to_radians(wrap_lon_diff_e9(q.lon_e9, p.lon_e9));

    let sin_lat = (dlat / 2.0).sin();
    let sin_lon = (dlon / 2.0).sin();
    let a = sin_lat * sin_lat + lat_p.cos() * lat_q.cos() * sin_lon * sin_lon;
    if a.is_nan() || a < -TRIG_SLACK || a > 1.0 + TRIG_SLACK {
        return Err(GeofenceError::Numeric);
    }
    Ok(a.clamp(0.0, 1.0))
}

/// Central angle between two vertices, radians.
pub fn central_angle_rad(p: &Vertex, q: &Vertex) -> Result<f64, GeofenceError> {
    let a = half_chord(p, q)?;
    Ok(2.0 * a.sqrt().atan2((1.0 - a).sqrt()))
}

/// Great-circle distance in millimetres.
pub fn haversine_mm(p: &Vertex, q: &Vertex) -> Result<i64, GeofenceError> {
    Ok((central_angle_rad(p, q)? * EARTH_MEAN_RADIUS_MM).round() as i64)
}

/// Initial bearing p -> q, radians in (-pi, pi], clockwise from north.
pub fn bearing_rad(p: &Vertex, q: &Vertex) -> f64 {
    let lat_p = e9_to_radians(p.lat_e9);
    let lat_q = e9_to_radians(q.lat_e9);
    let dlon = e9_to_radians(wrap_lon_diff_e9(q.lon_e9, p.lon_e9));
    let y = dlon.sin() * lat_q.cos();
    let x = lat_p.cos() * lat_q.sin() - lat_p.sin() * lat_q.cos() * dlon.cos();
    y.atan2(x)
}

/// Spherical direct problem: the vertex reached by travelling `distance_mm`
/// from `start` on the given azimuth (degrees clockwise from north).
pub fn destination(start: &Vertex, azimuth_deg: f64, distance_mm: i64) -> Result<Vertex, GeofenceError> {
    let delta = distance_mm as f64 / EARTH_MEAN_RADIUS_MM;
    let theta = azimuth_deg.to_radians();
    let lat1 = e9_to_radians(start.lat_e9);
    let lon1 = e9_to_radians(start.lon_e9);

    let sin_lat2 = lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos();
    if sin_lat2.is_nan() || sin_lat2.abs() > 1.0 + TRIG_SLACK {
        return Err(GeofenceError::Numeric);
    }
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
    let y = theta.sin() * delta.sin() * lat1.cos();
    let x = delta.cos() - lat1.sin() * sin_lat2;
    let lon2 = lon1 + y.atan2(x);

    Ok(Vertex {
        lat_e9: degrees_to_e9(lat2.to_degrees()).clamp(-LAT_MAX_E9, LAT_MAX_E9),
        lon_e9: normalize_lon_e9(degrees_to_e9(lon2.to_degrees())),
    })
}

fn inner_angle(reference: f64, other: f64) -> f64 {
    let mut d = (reference - other).abs();
    if d > PI {
        d = 2.0 * PI - d;
    }
    d
}

/// Shortest spherical distance from `p` to the minor arc `a -> b`, and which
/// side of the great circle `p` lies on. Falls back to the nearer endpoint
/// when the perpendicular foot lands outside the arc.
pub fn point_to_arc_mm(p: &Vertex, a: &Vertex, b: &Vertex) -> Result<(i64, Side), GeofenceError> {
    let d_ap = central_angle_rad(a, p)?;
    if d_ap == 0.0 {
        return Ok((0, Side::On));
    }
    let d_ab = central_angle_rad(a, b)?;
    if d_ab == 0.0 {
        // degenerate arc
        return Ok((haversine_mm(a, p)?, Side::On));
    }

    let bearing_ap = bearing_rad(a, p);
    let bearing_ab = bearing_rad(a, b);
    let sin_cross = d_ap.sin() * (bearing_ap - bearing_ab).sin();
    if sin_cross.is_nan() {
        return Err(GeofenceError::Numeric);
    }
    let side = if sin_cross < 0.0 {
        Side::Left
    } else if sin_cross > 0.0 {
        Side::Right
    } else {
        Side::On
    };

    if inner_angle(bearing_ap, bearing_ab) > PI / 2.0 {
        return Ok((haversine_mm(a, p)?, side));
    }
    let bearing_ba = bearing_rad(b, a);
    let bearing_bp = bearing_rad(b, p);
    if inner_angle(bearing_bp, bearing_ba) > PI / 2.0 {
        return Ok((haversine_mm(b, p)?, side));
    }

    let cross = sin_cross.clamp(-1.0, 1.0).asin().abs();
    Ok(((cross * EARTH_MEAN_RADIUS_MM).round() as i64, side))
}

/// Latitude of the great circle through `a` and `b` at the given longitude.
/// Reports `Numeric` for meridian arcs, where the intersection is not a
/// function of longitude.
pub fn latitude_on_great_circle_e9(a: &Vertex, b: &Vertex, lon_e9: i64) -> Result<i64, GeofenceError> {
    let span = e9_to_radians(wrap_lon_diff_e9(b.lon_e9, a.lon_e9));
    if span.sin().abs() < 1e-12 {
        return Err(GeofenceError::Numeric);
    }
    let from_a = e9_to_radians(wrap_lon_diff_e9(lon_e9, a.lon_e9));
    let to_b = e9_to_radians(wrap_lon_diff_e9(b.lon_e9, lon_e9));
    let lat_a = e9_to_radians(a.lat_e9);
    let lat_b = e9_to_radians(b.lat_e9);

    let t = (lat_a.tan() * to_b.sin() + lat_b.tan() * from_a.sin()) / span.sin();
    if !t.is_finite() {
        return Err(GeofenceError::Numeric);
    }
    Ok(degrees_to_e9(t.atan().to_degrees()))
}

fn midpoint(a: &Vertex, b: &Vertex) -> Vertex {
    Vertex {
        lat_e9: (a.lat_e9 + b.lat_e9) / 2,
        lon_e9: normalize_lon_e9(a.lon_e9 + wrap_lon_diff_e9(b.lon_e9, a.lon_e9) / 2),
    }
}

// Equirectangular projection onto the tangent plane at `origin`, in mm.
fn to_xy_mm(p: &Vertex, origin: &Vertex, cos_lat0: f64) -> (f64, f64) {
    let x = e9_to_radians(wrap_lon_diff_e9(p.lon_e9, origin.lon_e9)) * EARTH_MEAN_RADIUS_MM * cos_lat0;
    let y = e9_to_radians(p.lat_e9 - origin.lat_e9) * EARTH_MEAN_RADIUS_MM;
    (x, y)
}

/// Flat-earth distance between two nearby vertices (tangent plane at their
/// midpoint). Only valid for small separations away from the poles; the model
/// selection policy enforces that.
pub fn planar_distance_mm(p: &Vertex, q: &Vertex) -> i64 {
    let origin = midpoint(p, q);
    let cos_lat0 = e9_to_radians(origin.lat_e9).cos();
    let (px, py) = to_xy_mm(p, &origin, cos_lat0);
    let (qx, qy) = to_xy_mm(q, &origin, cos_lat0);
    ((qx - px).powi(2) + (qy - py).powi(2)).sqrt().round() as i64
}

/// Flat-earth distance from `p` to the segment `a -> b` (tangent plane at the
/// segment midpoint).
pub fn planar_point_to_segment_mm(p: &Vertex, a: &Vertex, b: &Vertex) -> i64 {
    let origin = midpoint(a, b);
    let cos_lat0 = e9_to_radians(origin.lat_e9).cos();
    let (px, py) = to_xy_mm(p, &origin, cos_lat0);
    let (ax, ay) = to_xy_mm(a, &origin, cos_lat0);
    let (bx, by) = to_xy_mm(b, &origin, cos_lat0);

    let vx = bx - ax;
    let vy = by - ay;
    let wx = px - ax;
    let wy = py - ay;

    let c1 = wx * vx + wy * vy;
    if c1 <= 0.0 {
        return (wx * wx + wy * wy).sqrt().round() as i64;
    }
    let c2 = vx * vx + vy * vy;
    if c2 <= c1 {
        return ((px - bx).powi(2) + (py - by).powi(2)).sqrt().round() as i64;
    }
    let t = c1 / c2;
    let foot_x = ax + t * vx;
    let foot_y = ay + t * vy;
    ((px - foot_x).powi(2) + (py - foot_y).powi(2)).sqrt().round() as i64
}
