//! Fixed-point coordinate arithmetic. Latitudes and longitudes travel as
//! signed integers in units of 1e-9 degree; distances as millimetres.

pub const LAT_MAX_E9: i64 = 90_000_000_000;
pub const LON_HALF_TURN_E9: i64 = 180_000_000_000;
pub const LON_FULL_TURN_E9: i64 = 360_000_000_000;

/// Millimetres per degree of latitude on the mean-radius sphere
/// (EARTH_MEAN_RADIUS_M * pi / 180, expressed in mm).
pub const MM_PER_DEGREE: f64 = 111_194_926.6;

pub fn e9_to_degrees(v: i64) -> f64 {
    v as f64 * 1e-9
}

pub fn degrees_to_e9(deg: f64) -> i64 {
    (deg * 1e9).round() as i64
}

pub fn e9_to_radians(v: i64) -> f64 {
    (v as f64 * 1e-9).to_radians()
}

/// Brings any longitude into (-180e9, 180e9].
pub fn normalize_lon_e9(lon_e9: i64) -> i64 {
    let mut lon = lon_e9 % LON_FULL_TURN_E9;
    if lon > LON_HALF_TURN_E9 {
        lon -= LON_FULL_TURN_E9;
    } else if lon <= -LON_HALF_TURN_E9 {
        lon += LON_FULL_TURN_E9;
    }
    lon
}

/// Minimal signed longitudinal difference `a - b`, antimeridian-safe.
pub fn wrap_lon_diff_e9(a_e9: i64, b_e9: i64) -> i64 {
    normalize_lon_e9(a_e9 - b_e9)
}

/// Latitude span covered by `mm` millimetres, rounded up.
pub fn mm_to_lat_span_e9(mm: i64) -> i64 {
    ((mm as f64) / MM_PER_DEGREE * 1e9).ceil() as i64
}

/// Millimetres covered by an angular span at the given circle-of-latitude
/// scale factor (1.0 at the equator, cos(lat) elsewhere).
pub fn e9_span_to_mm(span_e9: i64, cos_lat: f64) -> i64 {
    (span_e9 as f64 * 1e-9 * MM_PER_DEGREE * cos_lat).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_wraps_into_half_open_range() {
        assert_eq!(normalize_lon_e9(LON_HALF_TURN_E9), LON_HALF_TURN_E9);
        assert_eq!(normalize_lon_e9(-LON_HALF_TURN_E9), LON_HALF_TURN_E9);
        assert_eq!(normalize_lon_e9(LON_HALF_TURN_E9 + 1), -LON_HALF_TURN_E9 + 1);
        assert_eq!(normalize_lon_e9(LON_FULL_TURN_E9), 0);
        assert_eq!(normalize_lon_e9(-LON_FULL_TURN_E9 - 5), -5);
    }

    #[test]
    fn wrap_diff_takes_the_short_way_round() {
        let east = 179_999_999_999;
        let west = -179_999_999_999;
        assert_eq!(wrap_lon_diff_e9(west, east), 2);
        assert_eq!(wrap_lon_diff_e9(east, west), -2);
        assert_eq!(wrap_lon_diff_e9(10, -10), 20);
    }

    #[test]
    fn degree_round_trip_loses_at_most_one_unit() {
        for &v in &[
            0i64,
            1,
            -1,
            48_858_400_000,
            -179_999_999_999,
            LON_HALF_TURN_E9,
            LAT_MAX_E9,
            -LAT_MAX_E9,
        ] {
            let back = degrees_to_e9(e9_to_degrees(v));
            assert!((back - v).abs() <= 1, "{} -> {}", v, back);
        }
    }

    #[test]
    fn one_degree_of_latitude_in_mm() {
        let mm = e9_span_to_mm(1_000_000_000, 1.0);
        assert!((mm - 111_194_927).abs() <= 1);
    }
}
