//! Seam for an optional WGS-84 geodesic solver. When none is installed every
//! capability falls back to the spherical model, so callers never see an
//! absent provider.

use once_cell::sync::OnceCell;

use crate::sphere;
use crate::{GeofenceError, Vertex};

/// Capability set an ellipsoid solver may provide. All distances are
/// millimetres, azimuths degrees clockwise from north.
pub trait GeodesicSolver: Send + Sync {
    /// Inverse problem: distance between two vertices.
    fn inverse_mm(&self, a: &Vertex, b: &Vertex) -> Result<i64, GeofenceError>;

    /// Direct problem: destination after `distance_mm` on `azimuth_deg`.
    fn direct(&self, start: &Vertex, azimuth_deg: f64, distance_mm: i64) -> Result<Vertex, GeofenceError>;

    /// Latitude at which the segment `a -> b` crosses the given longitude.
    fn latitude_at_longitude_e9(&self, a: &Vertex, b: &Vertex, lon_e9: i64) -> Result<i64, GeofenceError>;

    /// Shortest distance from `p` to the segment `a -> b`.
    fn distance_to_segment_mm(&self, p: &Vertex, a: &Vertex, b: &Vertex) -> Result<i64, GeofenceError>;
}

/// Total fallback on the mean-radius sphere.
pub struct SphericalSolver;

impl GeodesicSolver for SphericalSolver {
    fn inverse_mm(&self, a: &Vertex, b: &Vertex) -> Result<i64, GeofenceError> {
        sphere::haversine_mm(a, b)
    }

    fn direct(&self, start: &Vertex, azimuth_deg: f64, distance_mm: i64) -> Result<Vertex, GeofenceError> {
        sphere::destination(start, azimuth_deg, distance_mm)
    }

    fn latitude_at_longitude_e9(&self, a: &Vertex, b: &Vertex, lon_e9: i64) -> Result<i64, GeofenceError> {
        sphere::latitude_on_great_circle_e9(a, b, lon_e9)
    }

    fn distance_to_segment_mm(&self, p: &Vertex, a: &Vertex, b: &Vertex) -> Result<i64, GeofenceError> {
        Ok(sphere::point_to_arc_mm(p, a, b)?.0)
    }
}

static INSTALLED: OnceCell<Box<dyn GeodesicSolver>> = OnceCell::new();
static SPHERICAL: SphericalSolver = SphericalSolver;

/// Binds an ellipsoid solver for the lifetime of the process. May only
/// happen once, before or between evaluations.
pub fn install(solver: Box<dyn GeodesicSolver>) -> Result<(), GeofenceError> {
    INSTALLED
        .set(solver)
        .map_err(|_| GeofenceError::InvalidArg("geodesic solver already installed"))
}

/// Whether a real ellipsoid solver is bound. Model selection prefers it for
/// shapes above the flat-earth ceiling.
pub fn installed() -> bool {
    INSTALLED.get().is_some()
}

/// The solver to use: the installed one, or the spherical fallback.
pub fn active() -> &'static dyn GeodesicSolver {
    match INSTALLED.get() {
        Some(solver) => solver.as_ref(),
        None => &SPHERICAL,
    }
}
