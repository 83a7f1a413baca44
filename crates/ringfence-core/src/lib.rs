//! Geofence evaluation engine for embedded trackers: fixed-point positions in,
//! per-fence inside/outside/transit decisions and callbacks out.

pub mod config;
pub mod context;
pub mod engine;
pub mod eval;
pub mod fence;
pub mod geodesic;
pub mod shape;
pub mod sphere;
pub mod units;

pub use config::FenceConfig;
pub use context::{GeofenceCallback, GeofenceEvent};
pub use engine::{ContextHandle, FenceHandle};
pub use eval::Evaluation;
pub use fence::Fence;
pub use shape::{Circle, Polygon, Shape, SquareExtent};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{normalize_lon_e9, LAT_MAX_E9};

/// Mean Earth radius (WGS-84), metres. All spherical math runs on this.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Flat-earth ceiling: shapes larger than this use a geodesic or spherical
/// model, never the local tangent plane.
pub const WGS84_THRESHOLD_METRES: i64 = 1_000;

/// Latitude band around either pole where flat-earth math is forbidden
/// regardless of shape size.
pub const WGS84_POLE_BAND_DEGREES: i64 = 10;

/// Padding added to a shape's bounding box during fast rejection.
pub const SQUARE_EXTENT_UNCERTAINTY_MARGIN_METRES: i64 = 100;

/// Default ceiling for the per-context horizontal speed sanity check.
pub const HORIZONTAL_SPEED_MM_PER_S_MAX: i64 = 500_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeofenceError {
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),
    #[error("fence is attached and cannot be modified or freed")]
    Busy,
    #[error("allocation failed")]
    NoMemory,
    #[error("numeric domain error")]
    Numeric,
    #[error("not found")]
    NotFound,
}

/// Evaluated relationship of a position to a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    None,
    Inside,
    Outside,
}

/// What a context (or a standalone fence test) is watching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    None,
    Inside,
    Outside,
    Transit,
}

/// A point on the Earth in units of 1e-9 degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub lat_e9: i64,
    pub lon_e9: i64,
}

impl Vertex {
    /// Validates latitude and normalises longitude into (-180e9, 180e9].
    pub fn new(lat_e9: i64, lon_e9: i64) -> Result<Self, GeofenceError> {
        if lat_e9.abs() > LAT_MAX_E9 {
            return Err(GeofenceError::InvalidArg("latitude out of range"));
        }
        Ok(Self { lat_e9, lon_e9: normalize_lon_e9(lon_e9) })
    }
}

/// A position report. `None` radii mean the uncertainty is unknown and is
/// treated as zero; `None` altitude means a 2D-only fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub lat_e9: i64,
    pub lon_e9: i64,
    pub alt_mm: Option<i32>,
    pub radius_h_mm: Option<i32>,
    pub radius_v_mm: Option<i32>,
    pub ts_unix_ms: i64,
}

impl Position {
    pub fn new(lat_e9: i64, lon_e9: i64, ts_unix_ms: i64) -> Self {
        Self {
            lat_e9,
            lon_e9,
            alt_mm: None,
            radius_h_mm: None,
            radius_v_mm: None,
            ts_unix_ms,
        }
    }
}
