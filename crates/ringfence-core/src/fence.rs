//! A fence: an ordered union of shapes with an optional altitude band,
//! shareable across device contexts but frozen while shared.

use crate::eval;
use crate::shape::{polygon_extent, Circle, Polygon, Shape, SquareExtent};
use crate::{GeofenceError, Position, PositionState, TestType, Vertex};

#[derive(Debug)]
pub(crate) struct ShapeEntry {
    pub shape: Shape,
    pub extent: SquareExtent,
}

#[derive(Debug)]
pub struct Fence {
    name: Option<String>,
    shapes: Vec<ShapeEntry>,
    alt_min_mm: Option<i32>,
    alt_max_mm: Option<i32>,
    ref_count: u32,
    // state for tests run outside any device context
    last_state: PositionState,
}

impl Fence {
    pub fn new(name: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_owned),
            shapes: Vec::new(),
            alt_min_mm: None,
            alt_max_mm: None,
            ref_count: 0,
            last_state: PositionState::None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn alt_min_mm(&self) -> Option<i32> {
        self.alt_min_mm
    }

    pub fn alt_max_mm(&self) -> Option<i32> {
        self.alt_max_mm
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    /// Evaluatable at all: at least one circle, or one polygon with three
    /// or more vertices.
    pub fn is_valid(&self) -> bool {
        self.shapes.iter().any(|entry| entry.shape.is_valid())
    }

    pub(crate) fn shapes(&self) -> &[ShapeEntry] {
        &self.shapes
    }

    pub(crate) fn retain(&mut self) {
        self.ref_count += 1;
    }

    pub(crate) fn release(&mut self) {
        self.ref_count = self.ref_count.saturating_sub(1);
    }

    fn ensure_unfrozen(&self) -> Result<(), GeofenceError> {
        if self.ref_count > 0 {
            Err(GeofenceError::Busy)
        } else {
            Ok(())
        }
    }

    /// Appends a circle. Fails `Busy` while the fence is attached anywhere
    /// and `InvalidArg` on a negative radius.
    pub fn add_circle(&mut self, center: Vertex, radius_mm: i64) -> Result<(), GeofenceError> {
        self.ensure_unfrozen()?;
        if radius_mm < 0 {
            return Err(GeofenceError::InvalidArg("negative circle radius"));
        }
        let circle = Circle { center, radius_mm };
        let extent = crate::shape::circle_extent(&circle)?;
        self.shapes.try_reserve(1).map_err(|_| GeofenceError::NoMemory)?;
        self.shapes.push(ShapeEntry { shape: Shape::Circle(circle), extent });
        Ok(())
    }

    /// Appends a vertex to the polygon under construction, or starts a new
    /// polygon when asked to or when the last shape added was a circle.
    pub fn add_vertex(&mut self, vertex: Vertex, new_polygon: bool) -> Result<(), GeofenceError> {
        self.ensure_unfrozen()?;
        if !new_polygon {
            if let Some(entry) = self.shapes.last_mut() {
                if let Shape::Polygon(poly) = &mut entry.shape {
                    poly.vertices.try_reserve(1).map_err(|_| GeofenceError::NoMemory)?;
                    poly.vertices.push(vertex);
                    entry.extent = polygon_extent(poly);
                    return Ok(());
                }
            }
        }
        self.shapes.try_reserve(1).map_err(|_| GeofenceError::NoMemory)?;
        let mut vertices = Vec::new();
        vertices.try_reserve(1).map_err(|_| GeofenceError::NoMemory)?;
        vertices.push(vertex);
        let poly = Polygon { vertices };
        let extent = polygon_extent(&poly);
        self.shapes.push(ShapeEntry { shape: Shape::Polygon(poly), extent });
        Ok(())
    }

    /// Lower altitude bound in millimetres; `None` clears it.
    pub fn set_altitude_min(&mut self, mm: Option<i32>) -> Result<(), GeofenceError> {
        self.ensure_unfrozen()?;
        self.alt_min_mm = mm;
        Ok(())
    }

    /// Upper altitude bound in millimetres; `None` clears it.
    pub fn set_altitude_max(&mut self, mm: Option<i32>) -> Result<(), GeofenceError> {
        self.ensure_unfrozen()?;
        self.alt_max_mm = mm;
        Ok(())
    }

    /// Drops every shape and both altitude bounds.
    pub fn clear(&mut self) -> Result<(), GeofenceError> {
        self.ensure_unfrozen()?;
        self.shapes.clear();
        self.alt_min_mm = None;
        self.alt_max_mm = None;
        self.last_state = PositionState::None;
        Ok(())
    }

    /// Standalone test against a position, tracking transit state inside the
    /// fence itself. Returns whether the requested condition holds.
    pub fn test(
        &mut self,
        test_type: TestType,
        pessimist: bool,
        position: &Position,
    ) -> Result<bool, GeofenceError> {
        let outcome = eval::evaluate_fence(self, test_type, pessimist, self.last_state, position)?;
        if outcome.state != PositionState::None {
            self.last_state = outcome.state;
        }
        Ok(match test_type {
            TestType::Inside => outcome.state == PositionState::Inside,
            TestType::Outside => outcome.state == PositionState::Outside,
            TestType::Transit => outcome.transit,
            TestType::None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(lat_e9: i64, lon_e9: i64) -> Vertex {
        Vertex::new(lat_e9, lon_e9).unwrap()
    }

    #[test]
    fn empty_fence_is_not_evaluatable() {
        let fence = Fence::new(Some("empty"));
        assert!(!fence.is_valid());
    }

    #[test]
    fn negative_radius_is_rejected() {
        let mut fence = Fence::new(None);
        assert_eq!(
            fence.add_circle(v(0, 0), -1),
            Err(GeofenceError::InvalidArg("negative circle radius"))
        );
        assert_eq!(fence.shape_count(), 0);
    }

    #[test]
    fn vertices_accumulate_into_one_polygon() {
        let mut fence = Fence::new(None);
        fence.add_vertex(v(0, 0), false).unwrap();
        fence.add_vertex(v(1_000_000_000, 0), false).unwrap();
        assert_eq!(fence.shape_count(), 1);
        assert!(!fence.is_valid());
        fence.add_vertex(v(0, 1_000_000_000), false).unwrap();
        assert!(fence.is_valid());
    }

    #[test]
    fn a_circle_interrupts_the_polygon_under_construction() {
        let mut fence = Fence::new(None);
        fence.add_vertex(v(0, 0), false).unwrap();
        fence.add_circle(v(0, 0), 1_000).unwrap();
        fence.add_vertex(v(1_000_000_000, 0), false).unwrap();
        // vertex after a circle opens a fresh polygon
        assert_eq!(fence.shape_count(), 3);
    }

    #[test]
    fn new_polygon_flag_opens_a_fresh_polygon() {
        let mut fence = Fence::new(None);
        for _ in 0..3 {
            fence.add_vertex(v(0, 0), false).unwrap();
        }
        fence.add_vertex(v(0, 0), true).unwrap();
        assert_eq!(fence.shape_count(), 2);
    }

    #[test]
    fn frozen_fence_refuses_every_mutation() {
        let mut fence = Fence::new(Some("shared"));
        fence.add_circle(v(0, 0), 1_000).unwrap();
        fence.retain();
        assert_eq!(fence.add_circle(v(0, 0), 1_000), Err(GeofenceError::Busy));
        assert_eq!(fence.add_vertex(v(0, 0), true), Err(GeofenceError::Busy));
        assert_eq!(fence.set_altitude_min(Some(0)), Err(GeofenceError::Busy));
        assert_eq!(fence.set_altitude_max(Some(0)), Err(GeofenceError::Busy));
        assert_eq!(fence.clear(), Err(GeofenceError::Busy));
        fence.release();
        assert!(fence.add_circle(v(0, 0), 1_000).is_ok());
    }

    #[test]
    fn clear_drops_shapes_and_altitude() {
        let mut fence = Fence::new(None);
        for _ in 0..4 {
            fence.add_circle(v(0, 0), 1_000).unwrap();
        }
        fence.set_altitude_max(Some(100_000)).unwrap();
        fence.clear().unwrap();
        assert_eq!(fence.shape_count(), 0);
        assert_eq!(fence.alt_max_mm(), None);
        assert!(!fence.is_valid());
    }
}
