//! Circle and polygon value types, their cached bounding boxes, and the
//! point tests and edge distances behind every fence decision.

use crate::geodesic;
use crate::sphere;
use crate::units::{
    e9_span_to_mm, e9_to_radians, mm_to_lat_span_e9, normalize_lon_e9, wrap_lon_diff_e9,
    LAT_MAX_E9, LON_FULL_TURN_E9, LON_HALF_TURN_E9, MM_PER_DEGREE,
};
use crate::{GeofenceError, Vertex};

/// Numerical model chosen per shape, per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeoModel {
    Planar,
    Spherical,
    Geodesic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Circle {
    pub center: Vertex,
    pub radius_mm: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub vertices: Vec<Vertex>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Circle(Circle),
    Polygon(Polygon),
}

impl Shape {
    /// A circle is always testable; a polygon needs three vertices.
    pub fn is_valid(&self) -> bool {
        match self {
            Shape::Circle(_) => true,
            Shape::Polygon(poly) => poly.vertices.len() >= 3,
        }
    }

    /// Signed distance to the shape edge: negative inside, positive outside,
    /// zero on the boundary.
    pub(crate) fn signed_distance_mm(&self, p: &Vertex, model: GeoModel) -> Result<i64, GeofenceError> {
        match self {
            Shape::Circle(circle) => circle_signed_distance_mm(circle, p, model),
            Shape::Polygon(poly) => polygon_signed_distance_mm(poly, p, model),
        }
    }
}

/// Rectangular lat/lon bounding box of a shape. When `crosses_antimeridian`
/// is set the longitude window wraps, i.e. `lon_min_e9 > lon_max_e9`.
/// `near_pole` disables fast rejection and flat-earth math for the shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SquareExtent {
    pub lat_min_e9: i64,
    pub lat_max_e9: i64,
    pub lon_min_e9: i64,
    pub lon_max_e9: i64,
    pub crosses_antimeridian: bool,
    pub near_pole: bool,
    pub max_side_mm: i64,
}

impl SquareExtent {
    fn lon_width_e9(&self) -> i64 {
        if self.crosses_antimeridian {
            self.lon_max_e9 - self.lon_min_e9 + LON_FULL_TURN_E9
        } else {
            self.lon_max_e9 - self.lon_min_e9
        }
    }

    // cos(latitude) at the widest circle of latitude the box touches
    fn widest_cos_lat(&self) -> f64 {
        if self.lat_min_e9 <= 0 && self.lat_max_e9 >= 0 {
            1.0
        } else {
            let closest = self.lat_min_e9.abs().min(self.lat_max_e9.abs());
            e9_to_radians(closest).cos()
        }
    }

    pub(crate) fn centre(&self) -> Vertex {
        Vertex {
            lat_e9: (self.lat_min_e9 + self.lat_max_e9) / 2,
            lon_e9: normalize_lon_e9(self.lon_min_e9 + self.lon_width_e9() / 2),
        }
    }

    /// Whether `p` lies within the box padded by `margin_mm` on every side.
    /// Near-pole boxes always contain: longitude lines converge there and the
    /// box stops being a useful rejection test.
    pub fn contains_with_margin_mm(&self, p: &Vertex, margin_mm: i64) -> bool {
        if self.near_pole {
            return true;
        }
        let margin_lat = mm_to_lat_span_e9(margin_mm);
        if p.lat_e9 < self.lat_min_e9 - margin_lat || p.lat_e9 > self.lat_max_e9 + margin_lat {
            return false;
        }

        // not near a pole, so the narrowest cos(lat) in the box is bounded
        // away from zero by the pole band
        let narrow = self.lat_min_e9.abs().max(self.lat_max_e9.abs());
        let cos_lat = e9_to_radians(narrow).cos().max(1e-3);
        let margin_lon = ((margin_mm as f64) / (MM_PER_DEGREE * cos_lat) * 1e9).ceil() as i64;

        let width = self.lon_width_e9();
        if width + 2 * margin_lon >= LON_FULL_TURN_E9 {
            return true;
        }
        let mut east_of_min = wrap_lon_diff_e9(p.lon_e9, self.lon_min_e9);
        if east_of_min < 0 {
            east_of_min += LON_FULL_TURN_E9;
        }
        east_of_min <= width + margin_lon || east_of_min >= LON_FULL_TURN_E9 - margin_lon
    }
}

fn extent_sides(
    lat_min_e9: i64,
    lat_max_e9: i64,
    lon_width_e9: i64,
    widest_cos_lat: f64,
) -> i64 {
    let lat_span_mm = e9_span_to_mm(lat_max_e9 - lat_min_e9, 1.0);
    let lon_span_mm = e9_span_to_mm(lon_width_e9, widest_cos_lat);
    lat_span_mm.max(lon_span_mm)
}

/// Bounding box of a circle, walked radius-out due N/S/E/W from the centre.
///
/// A numeric failure while walking never escapes: the fallback is a box that
/// is never fast-rejected and never eligible for flat-earth math, so the
/// full test still decides. Other solver errors do surface.
pub(crate) fn circle_extent(circle: &Circle) -> Result<SquareExtent, GeofenceError> {
    match walked_circle_extent(circle) {
        Ok(extent) => Ok(extent),
        Err(GeofenceError::Numeric) => Ok(SquareExtent {
            lat_min_e9: circle.center.lat_e9,
            lat_max_e9: circle.center.lat_e9,
            lon_min_e9: circle.center.lon_e9,
            lon_max_e9: circle.center.lon_e9,
            crosses_antimeridian: false,
            near_pole: true,
            max_side_mm: circle.radius_mm.saturating_mul(2),
        }),
        Err(e) => Err(e),
    }
}

fn walked_circle_extent(circle: &Circle) -> Result<SquareExtent, GeofenceError> {
    let solver = geodesic::active();
    let center = &circle.center;

    let north_pole = Vertex { lat_e9: LAT_MAX_E9, lon_e9: center.lon_e9 };
    let south_pole = Vertex { lat_e9: -LAT_MAX_E9, lon_e9: center.lon_e9 };
    let covers_north = circle.radius_mm >= solver.inverse_mm(center, &north_pole)?;
    let covers_south = circle.radius_mm >= solver.inverse_mm(center, &south_pole)?;

    let lat_max_e9 = if covers_north {
        LAT_MAX_E9
    } else {
        solver.direct(center, 0.0, circle.radius_mm)?.lat_e9
    };
    let lat_min_e9 = if covers_south {
        -LAT_MAX_E9
    } else {
        solver.direct(center, 180.0, circle.radius_mm)?.lat_e9
    };

    let (lon_min_e9, lon_max_e9, crosses_antimeridian) = if covers_north || covers_south {
        // the circle wraps a pole: every longitude is in range, and the
        // near-pole flag below makes the box values moot
        (center.lon_e9, center.lon_e9, false)
    } else {
        let east = solver.direct(center, 90.0, circle.radius_mm)?;
        let west = solver.direct(center, 270.0, circle.radius_mm)?;
        let crosses = east.lon_e9 < center.lon_e9 || west.lon_e9 > center.lon_e9;
        (west.lon_e9, east.lon_e9, crosses)
    };

    let near_pole = covers_north
        || covers_south
        || sphere::near_pole(lat_min_e9)
        || sphere::near_pole(lat_max_e9);

    let extent = SquareExtent {
        lat_min_e9,
        lat_max_e9,
        lon_min_e9,
        lon_max_e9,
        crosses_antimeridian,
        near_pole,
        max_side_mm: 0,
    };
    let max_side_mm = extent_sides(
        lat_min_e9,
        lat_max_e9,
        if covers_north || covers_south { LON_FULL_TURN_E9 } else { extent.lon_width_e9() },
        extent.widest_cos_lat(),
    );
    Ok(SquareExtent { max_side_mm, ..extent })
}

/// Bounding box of a polygon from its vertex list, antimeridian-aware.
/// Total for any vertex count, including polygons still under construction.
pub(crate) fn polygon_extent(poly: &Polygon) -> SquareExtent {
    let first = poly.vertices[0];
    let mut lat_min_e9 = first.lat_e9;
    let mut lat_max_e9 = first.lat_e9;

    // accumulate longitudes in an unwrapped frame anchored at the first
    // vertex so a box spanning the antimeridian stays contiguous
    let mut unwrapped = first.lon_e9;
    let mut lon_min_u = unwrapped;
    let mut lon_max_u = unwrapped;
    for pair in poly.vertices.windows(2) {
        lat_min_e9 = lat_min_e9.min(pair[1].lat_e9);
        lat_max_e9 = lat_max_e9.max(pair[1].lat_e9);
        unwrapped += wrap_lon_diff_e9(pair[1].lon_e9, pair[0].lon_e9);
        lon_min_u = lon_min_u.min(unwrapped);
        lon_max_u = lon_max_u.max(unwrapped);
    }

    let full_wrap = lon_max_u - lon_min_u >= LON_FULL_TURN_E9;
    let crosses_antimeridian =
        !full_wrap && (lon_min_u <= -LON_HALF_TURN_E9 || lon_max_u > LON_HALF_TURN_E9);
    let (lon_min_e9, lon_max_e9) = if full_wrap {
        (first.lon_e9, first.lon_e9)
    } else {
        (normalize_lon_e9(lon_min_u), normalize_lon_e9(lon_max_u))
    };

    // a ring wider than a full turn is circumpolar; treat it as near-pole so
    // it is never fast-rejected
    let near_pole = full_wrap || sphere::near_pole(lat_min_e9) || sphere::near_pole(lat_max_e9);

    let extent = SquareExtent {
        lat_min_e9,
        lat_max_e9,
        lon_min_e9,
        lon_max_e9,
        crosses_antimeridian,
        near_pole,
        max_side_mm: 0,
    };
    let max_side_mm = extent_sides(
        lat_min_e9,
        lat_max_e9,
        if full_wrap { LON_FULL_TURN_E9 } else { extent.lon_width_e9() },
        extent.widest_cos_lat(),
    );
    SquareExtent { max_side_mm, ..extent }
}

fn circle_signed_distance_mm(circle: &Circle, p: &Vertex, model: GeoModel) -> Result<i64, GeofenceError> {
    let d = match model {
        GeoModel::Planar => sphere::planar_distance_mm(&circle.center, p),
        GeoModel::Spherical => sphere::haversine_mm(&circle.center, p)?,
        GeoModel::Geodesic => geodesic::active().inverse_mm(&circle.center, p)?,
    };
    Ok(d - circle.radius_mm)
}

// Longitude offset from `a` (within the edge's own wrap frame) at which the
// edge a -> b reaches the given latitude. The caller guarantees the edge
// spans that latitude strictly.
fn edge_crossing_offset_e9(
    a: &Vertex,
    b: &Vertex,
    lat_e9: i64,
    model: GeoModel,
) -> Result<i64, GeofenceError> {
    let dlon = wrap_lon_diff_e9(b.lon_e9, a.lon_e9);
    if dlon == 0 {
        // meridian edge
        return Ok(0);
    }
    let linear = || {
        let t = (lat_e9 - a.lat_e9) as f64 / (b.lat_e9 - a.lat_e9) as f64;
        (dlon as f64 * t).round() as i64
    };
    if model == GeoModel::Planar {
        return Ok(linear());
    }

    // bisect the longitude offset from a until the edge latitude matches,
    // on the same curve the rest of the model uses: the great circle for the
    // spherical model, the installed solver's line for the geodesic one. The
    // endpoints bracket the target by precondition.
    let mut lo = 0.0f64;
    let mut hi = dlon as f64;
    let below_at_a = a.lat_e9 < lat_e9;
    for _ in 0..32 {
        let mid = (lo + hi) / 2.0;
        let lon = normalize_lon_e9(a.lon_e9 + mid.round() as i64);
        let lat = match model {
            GeoModel::Spherical => sphere::latitude_on_great_circle_e9(a, b, lon),
            _ => geodesic::active().latitude_at_longitude_e9(a, b, lon),
        };
        let lat = match lat {
            Ok(lat) => lat,
            Err(_) => return Ok(linear()),
        };
        if (lat < lat_e9) == below_at_a {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(((lo + hi) / 2.0).round() as i64)
}

/// Eastward ray cast along the parallel of latitude: odd crossing count means
/// inside. Winding-independent; a crossing exactly at the ray origin counts
/// as inside.
///
/// Longitudes are unwrapped into a contiguous frame anchored at the first
/// vertex before casting, so polygons spanning the antimeridian behave like
/// any other. Polygons must span less than half a turn of longitude.
pub(crate) fn polygon_contains(poly: &Polygon, p: &Vertex, model: GeoModel) -> Result<bool, GeofenceError> {
    let n = poly.vertices.len();
    if n < 3 {
        return Err(GeofenceError::InvalidArg("polygon needs at least three vertices"));
    }
    let anchor = poly.vertices[0].lon_e9;
    let p_x = wrap_lon_diff_e9(p.lon_e9, anchor);

    let mut inside = false;
    let mut a_x = 0i64;
    for i in 0..n {
        let a = &poly.vertices[i];
        let b = &poly.vertices[(i + 1) % n];
        let b_x = a_x + wrap_lon_diff_e9(b.lon_e9, a.lon_e9);
        if (a.lat_e9 < p.lat_e9) != (b.lat_e9 < p.lat_e9) {
            let cross_x = a_x + edge_crossing_offset_e9(a, b, p.lat_e9, model)?;
            if cross_x == p_x {
                return Ok(true);
            }
            if cross_x > p_x {
                inside = !inside;
            }
        }
        a_x = b_x;
    }
    Ok(inside)
}

/// Minimum distance from `p` to the polygon perimeter, closing edge included.
pub(crate) fn polygon_perimeter_distance_mm(
    poly: &Polygon,
    p: &Vertex,
    model: GeoModel,
) -> Result<i64, GeofenceError> {
    let n = poly.vertices.len();
    if n < 3 {
        return Err(GeofenceError::InvalidArg("polygon needs at least three vertices"));
    }
    let mut best = i64::MAX;
    for i in 0..n {
        let a = &poly.vertices[i];
        let b = &poly.vertices[(i + 1) % n];
        let d = match model {
            GeoModel::Planar => sphere::planar_point_to_segment_mm(p, a, b),
            GeoModel::Spherical => sphere::point_to_arc_mm(p, a, b)?.0,
            GeoModel::Geodesic => geodesic::active().distance_to_segment_mm(p, a, b)?,
        };
        best = best.min(d);
    }
    Ok(best)
}

fn polygon_signed_distance_mm(poly: &Polygon, p: &Vertex, model: GeoModel) -> Result<i64, GeofenceError> {
    let perimeter = polygon_perimeter_distance_mm(poly, p, model)?;
    if perimeter == 0 {
        // on the edge counts as inside
        return Ok(0);
    }
    if polygon_contains(poly, p, model)? {
        Ok(-perimeter)
    } else {
        Ok(perimeter)
    }
}
