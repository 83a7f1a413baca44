//! Per-device binding: the fences a device watches, the last state seen for
//! each, the callback wiring, and the horizontal-speed sanity check.

use tracing::warn;

use crate::engine::FenceHandle;
use crate::sphere;
use crate::{GeofenceError, Position, PositionState, TestType, Vertex, HORIZONTAL_SPEED_MM_PER_S_MAX};

/// What a callback receives for one (device, fence) evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GeofenceEvent<'a> {
    pub device_id: u64,
    pub fence: FenceHandle,
    pub fence_name: Option<&'a str>,
    pub state: PositionState,
    pub position: Position,
    /// Signed distance to the nearest shape edge, when the full test
    /// computed one.
    pub distance_mm: Option<i64>,
    /// The position moved implausibly fast from the previous one. The event
    /// still fires; discarding it is caller policy.
    pub speed_suspect: bool,
}

/// Invoked synchronously on the evaluating thread, with the engine lock held.
/// Must not call back into the engine and should not block.
pub type GeofenceCallback = Box<dyn FnMut(&GeofenceEvent<'_>) + Send>;

pub(crate) struct AttachedFence {
    pub fence: FenceHandle,
    pub last_state: PositionState,
}

pub struct Context {
    pub(crate) device_id: u64,
    pub(crate) attached: Vec<AttachedFence>,
    pub(crate) callback: Option<GeofenceCallback>,
    pub(crate) test_type: TestType,
    pub(crate) pessimist: bool,
    pub(crate) max_speed_mm_s: i64,
    pub(crate) last_fix: Option<(Vertex, i64)>,
}

impl Context {
    pub(crate) fn new(device_id: u64) -> Self {
        Self {
            device_id,
            attached: Vec::new(),
            callback: None,
            test_type: TestType::None,
            pessimist: false,
            max_speed_mm_s: HORIZONTAL_SPEED_MM_PER_S_MAX,
            last_fix: None,
        }
    }

    pub(crate) fn set_callback(
        &mut self,
        test_type: TestType,
        pessimist: bool,
        callback: Option<GeofenceCallback>,
    ) {
        if test_type == TestType::None {
            self.callback = None;
            self.test_type = TestType::None;
            return;
        }
        self.test_type = test_type;
        self.pessimist = pessimist;
        self.callback = callback;
    }

    pub(crate) fn attach(&mut self, fence: FenceHandle) -> Result<(), GeofenceError> {
        if self.attached.iter().any(|a| a.fence == fence) {
            return Err(GeofenceError::InvalidArg("fence already attached to this context"));
        }
        self.attached.try_reserve(1).map_err(|_| GeofenceError::NoMemory)?;
        self.attached.push(AttachedFence { fence, last_state: PositionState::None });
        Ok(())
    }

    pub(crate) fn detach(&mut self, fence: FenceHandle) -> Result<(), GeofenceError> {
        let at = self
            .attached
            .iter()
            .position(|a| a.fence == fence)
            .ok_or(GeofenceError::NotFound)?;
        self.attached.remove(at);
        Ok(())
    }

    /// Records the fix and reports whether it implies an implausible speed
    /// from the previous one. Never blocks evaluation.
    pub(crate) fn flag_suspect_speed(&mut self, point: &Vertex, ts_unix_ms: i64) -> bool {
        let mut suspect = false;
        if let Some((prev, prev_ts)) = self.last_fix {
            let elapsed_ms = ts_unix_ms - prev_ts;
            if elapsed_ms > 0 {
                if let Ok(dist_mm) = sphere::haversine_mm(&prev, point) {
                    let speed_mm_s = dist_mm.saturating_mul(1_000) / elapsed_ms;
                    if speed_mm_s > self.max_speed_mm_s {
                        warn!(
                            "device {}: {} mm/s exceeds the {} mm/s ceiling, position flagged",
                            self.device_id, speed_mm_s, self.max_speed_mm_s
                        );
                        suspect = true;
                    }
                }
            }
        }
        self.last_fix = Some((*point, ts_unix_ms));
        suspect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_gate_flags_a_teleport() {
        let mut ctx = Context::new(7);
        ctx.max_speed_mm_s = 139_000; // ~500 km/h
        let origin = Vertex::new(0, 0).unwrap();
        let far = Vertex::new(1_000_000_000, 0).unwrap(); // ~111 km
        assert!(!ctx.flag_suspect_speed(&origin, 1_000));
        // 111 km in one second
        assert!(ctx.flag_suspect_speed(&far, 2_000));
        // and a plausible hop afterwards is clean again
        assert!(!ctx.flag_suspect_speed(&far, 10_000_000));
    }

    #[test]
    fn speed_gate_ignores_non_monotonic_timestamps() {
        let mut ctx = Context::new(7);
        ctx.max_speed_mm_s = 1;
        let origin = Vertex::new(0, 0).unwrap();
        let far = Vertex::new(1_000_000_000, 0).unwrap();
        assert!(!ctx.flag_suspect_speed(&origin, 5_000));
        assert!(!ctx.flag_suspect_speed(&far, 5_000));
    }

    #[test]
    fn clearing_the_callback_resets_the_test_type() {
        let mut ctx = Context::new(1);
        ctx.set_callback(TestType::Transit, true, Some(Box::new(|_| {})));
        assert_eq!(ctx.test_type, TestType::Transit);
        ctx.set_callback(TestType::None, false, None);
        assert_eq!(ctx.test_type, TestType::None);
        assert!(ctx.callback.is_none());
    }
}
