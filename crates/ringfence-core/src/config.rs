//! Declarative fence description, deserializable from the device
//! configuration file and buildable into a live fence.

use serde::Deserialize;

use crate::{Fence, GeofenceError, Vertex};

#[derive(Debug, Clone, Deserialize)]
pub struct CircleConfig {
    pub lat_e9: i64,
    pub lon_e9: i64,
    pub radius_mm: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VertexConfig {
    pub lat_e9: i64,
    pub lon_e9: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FenceConfig {
    pub name: Option<String>,

    /// Altitude band in millimetres; omit either bound to leave it open.
    pub alt_min_mm: Option<i32>,
    pub alt_max_mm: Option<i32>,

    #[serde(default)]
    pub circles: Vec<CircleConfig>,

    /// Each entry is one closed polygon of at least three vertices.
    #[serde(default)]
    pub polygons: Vec<Vec<VertexConfig>>,
}

impl FenceConfig {
    /// Validates the description and assembles a fence from it.
    pub fn build(&self) -> Result<Fence, GeofenceError> {
        let mut fence = Fence::new(self.name.as_deref());
        for circle in &self.circles {
            let center = Vertex::new(circle.lat_e9, circle.lon_e9)?;
            fence.add_circle(center, circle.radius_mm)?;
        }
        for polygon in &self.polygons {
            if polygon.len() < 3 {
                return Err(GeofenceError::InvalidArg("polygon needs at least three vertices"));
            }
            for (at, vertex) in polygon.iter().enumerate() {
                let v = Vertex::new(vertex.lat_e9, vertex.lon_e9)?;
                fence.add_vertex(v, at == 0)?;
            }
        }
        fence.set_altitude_min(self.alt_min_mm)?;
        fence.set_altitude_max(self.alt_max_mm)?;
        Ok(fence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_toml() {
        let cfg: FenceConfig = toml::from_str(
            r#"
            name = "depot"
            alt_max_mm = 500000
            polygons = [[
                { lat_e9 = 1000000000, lon_e9 = 1000000000 },
                { lat_e9 = 1000000000, lon_e9 = -1000000000 },
                { lat_e9 = -1000000000, lon_e9 = 0 },
            ]]

            [[circles]]
            lat_e9 = 48858400000
            lon_e9 = 2294500000
            radius_mm = 90000
            "#,
        )
        .unwrap();

        let fence = cfg.build().unwrap();
        assert_eq!(fence.name(), Some("depot"));
        assert_eq!(fence.shape_count(), 2);
        assert!(fence.is_valid());
        assert_eq!(fence.alt_max_mm(), Some(500_000));
    }

    #[test]
    fn short_polygon_is_rejected() {
        let cfg = FenceConfig {
            name: None,
            alt_min_mm: None,
            alt_max_mm: None,
            circles: vec![],
            polygons: vec![vec![
                VertexConfig { lat_e9: 0, lon_e9: 0 },
                VertexConfig { lat_e9: 1, lon_e9: 1 },
            ]],
        };
        assert_eq!(
            cfg.build().unwrap_err(),
            GeofenceError::InvalidArg("polygon needs at least three vertices")
        );
    }

    #[test]
    fn bad_coordinates_are_rejected() {
        let cfg = FenceConfig {
            name: None,
            alt_min_mm: None,
            alt_max_mm: None,
            circles: vec![CircleConfig { lat_e9: 95_000_000_000, lon_e9: 0, radius_mm: 1 }],
            polygons: vec![],
        };
        assert!(cfg.build().is_err());
    }
}
