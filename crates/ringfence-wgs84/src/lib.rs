//! WGS-84 ellipsoid provider for the geofence engine, on top of the Karney
//! solvers in `geographiclib-rs`. Install it once at start-up and every
//! shape above the flat-earth ceiling is evaluated on the true ellipsoid.

use geographiclib_rs::{DirectGeodesic, Geodesic, InverseGeodesic};

use ringfence_core::geodesic::{self, GeodesicSolver};
use ringfence_core::units::{degrees_to_e9, e9_to_degrees, normalize_lon_e9, wrap_lon_diff_e9, LAT_MAX_E9};
use ringfence_core::{GeofenceError, Vertex};

pub struct Wgs84Solver {
    geod: Geodesic,
}

impl Wgs84Solver {
    pub fn new() -> Self {
        Self { geod: Geodesic::wgs84() }
    }

    /// Binds this solver as the process-wide geodesic provider.
    pub fn install() -> Result<(), GeofenceError> {
        geodesic::install(Box::new(Self::new()))
    }

    fn vertex_from_degrees(lat_deg: f64, lon_deg: f64) -> Result<Vertex, GeofenceError> {
        if !lat_deg.is_finite() || !lon_deg.is_finite() {
            return Err(GeofenceError::Numeric);
        }
        Ok(Vertex {
            lat_e9: degrees_to_e9(lat_deg).clamp(-LAT_MAX_E9, LAT_MAX_E9),
            lon_e9: normalize_lon_e9(degrees_to_e9(lon_deg)),
        })
    }
}

impl Default for Wgs84Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl GeodesicSolver for Wgs84Solver {
    fn inverse_mm(&self, a: &Vertex, b: &Vertex) -> Result<i64, GeofenceError> {
        let meters: f64 = self.geod.inverse(
            e9_to_degrees(a.lat_e9),
            e9_to_degrees(a.lon_e9),
            e9_to_degrees(b.lat_e9),
            e9_to_degrees(b.lon_e9),
        );
        if !meters.is_finite() {
            return Err(GeofenceError::Numeric);
        }
        Ok((meters * 1_000.0).round() as i64)
    }

    fn direct(&self, start: &Vertex, azimuth_deg: f64, distance_mm: i64) -> Result<Vertex, GeofenceError> {
        let (lat2, lon2) = self.geod.direct(
            e9_to_degrees(start.lat_e9),
            e9_to_degrees(start.lon_e9),
            azimuth_deg,
            distance_mm as f64 / 1_000.0,
        );
        Self::vertex_from_degrees(lat2, lon2)
    }

    fn latitude_at_longitude_e9(&self, a: &Vertex, b: &Vertex, lon_e9: i64) -> Result<i64, GeofenceError> {
        let span = wrap_lon_diff_e9(b.lon_e9, a.lon_e9);
        if span == 0 {
            // a meridian segment does not cross longitudes
            return Err(GeofenceError::Numeric);
        }
        let target = wrap_lon_diff_e9(lon_e9, a.lon_e9);

        let lat_a = e9_to_degrees(a.lat_e9);
        let lon_a = e9_to_degrees(a.lon_e9);
        let (arc_m, azi1, _azi2, _a12) = self.geod.inverse(
            lat_a,
            lon_a,
            e9_to_degrees(b.lat_e9),
            e9_to_degrees(b.lon_e9),
        );

        // longitude moves monotonically along a sub-hemispheric geodesic, so
        // bisect the arc length until the crossing longitude is pinned down
        let mut lo = 0.0_f64;
        let mut hi = arc_m;
        let mut lat_at_mid = lat_a;
        for _ in 0..48 {
            let mid = (lo + hi) / 2.0;
            let (lat2, lon2) = self.geod.direct(lat_a, lon_a, azi1, mid);
            if !lat2.is_finite() || !lon2.is_finite() {
                return Err(GeofenceError::Numeric);
            }
            lat_at_mid = lat2;
            let offset = wrap_lon_diff_e9(degrees_to_e9(lon2), a.lon_e9);
            if (offset < target) == (span > 0) {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(degrees_to_e9(lat_at_mid))
    }

    fn distance_to_segment_mm(&self, p: &Vertex, a: &Vertex, b: &Vertex) -> Result<i64, GeofenceError> {
        let lat_a = e9_to_degrees(a.lat_e9);
        let lon_a = e9_to_degrees(a.lon_e9);
        let (arc_m, azi1, _azi2, _a12) = self.geod.inverse(
            lat_a,
            lon_a,
            e9_to_degrees(b.lat_e9),
            e9_to_degrees(b.lon_e9),
        );
        if !(arc_m > 0.0) {
            return self.inverse_mm(p, a);
        }

        let lat_p = e9_to_degrees(p.lat_e9);
        let lon_p = e9_to_degrees(p.lon_e9);
        let distance_at = |s: f64| -> f64 {
            let (lat2, lon2) = self.geod.direct(lat_a, lon_a, azi1, s);
            let d: f64 = self.geod.inverse(lat_p, lon_p, lat2, lon2);
            d
        };

        // the distance to a point sliding along the segment is unimodal, so
        // ternary search converges on the foot
        let mut lo = 0.0_f64;
        let mut hi = arc_m;
        for _ in 0..60 {
            let third = (hi - lo) / 3.0;
            if distance_at(lo + third) <= distance_at(hi - third) {
                hi -= third;
            } else {
                lo += third;
            }
        }
        let best = distance_at((lo + hi) / 2.0)
            .min(distance_at(0.0))
            .min(distance_at(arc_m));
        if !best.is_finite() {
            return Err(GeofenceError::Numeric);
        }
        Ok((best * 1_000.0).round() as i64)
    }
}
