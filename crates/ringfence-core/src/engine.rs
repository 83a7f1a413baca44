//! The in-process surface: handles into a single registry of fences and
//! contexts, serialised by one process-wide mutex created on first use.
//!
//! Callbacks run synchronously on the evaluating thread with that mutex
//! held, so they must not re-enter this module and must not panic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::context::{Context, GeofenceCallback, GeofenceEvent};
use crate::eval;
use crate::fence::Fence;
use crate::{GeofenceError, Position, PositionState, TestType, Vertex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FenceHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextHandle(u64);

#[derive(Default)]
struct Engine {
    fences: HashMap<u64, Fence>,
    contexts: HashMap<u64, Context>,
    next_id: u64,
}

impl Engine {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

static ENGINE: Lazy<Mutex<Engine>> = Lazy::new(|| Mutex::new(Engine::default()));

fn lock() -> MutexGuard<'static, Engine> {
    ENGINE.lock().unwrap()
}

fn with_fence<R>(
    handle: FenceHandle,
    op: impl FnOnce(&mut Fence) -> Result<R, GeofenceError>,
) -> Result<R, GeofenceError> {
    let mut engine = lock();
    let fence = engine
        .fences
        .get_mut(&handle.0)
        .ok_or(GeofenceError::InvalidArg("unknown fence handle"))?;
    op(fence)
}

fn with_context<R>(
    handle: ContextHandle,
    op: impl FnOnce(&mut Context) -> Result<R, GeofenceError>,
) -> Result<R, GeofenceError> {
    let mut engine = lock();
    let context = engine
        .contexts
        .get_mut(&handle.0)
        .ok_or(GeofenceError::InvalidArg("unknown context handle"))?;
    op(context)
}

/// Creates an empty fence.
pub fn fence_create(name: Option<&str>) -> Result<FenceHandle, GeofenceError> {
    let mut engine = lock();
    let id = engine.alloc_id();
    engine.fences.insert(id, Fence::new(name));
    Ok(FenceHandle(id))
}

pub fn fence_add_circle(
    handle: FenceHandle,
    center: Vertex,
    radius_mm: i64,
) -> Result<(), GeofenceError> {
    with_fence(handle, |fence| fence.add_circle(center, radius_mm))
}

pub fn fence_add_vertex(
    handle: FenceHandle,
    vertex: Vertex,
    new_polygon: bool,
) -> Result<(), GeofenceError> {
    with_fence(handle, |fence| fence.add_vertex(vertex, new_polygon))
}

pub fn fence_set_altitude_min(handle: FenceHandle, mm: Option<i32>) -> Result<(), GeofenceError> {
    with_fence(handle, |fence| fence.set_altitude_min(mm))
}

pub fn fence_set_altitude_max(handle: FenceHandle, mm: Option<i32>) -> Result<(), GeofenceError> {
    with_fence(handle, |fence| fence.set_altitude_max(mm))
}

pub fn fence_clear(handle: FenceHandle) -> Result<(), GeofenceError> {
    with_fence(handle, |fence| fence.clear())
}

/// Frees a fence. Fails `Busy` while any context still holds it.
pub fn fence_free(handle: FenceHandle) -> Result<(), GeofenceError> {
    let mut engine = lock();
    let fence = engine
        .fences
        .get(&handle.0)
        .ok_or(GeofenceError::InvalidArg("unknown fence handle"))?;
    if fence.ref_count() > 0 {
        return Err(GeofenceError::Busy);
    }
    engine.fences.remove(&handle.0);
    Ok(())
}

/// Standalone test of a position against one fence, outside any context.
pub fn fence_test(
    handle: FenceHandle,
    test_type: TestType,
    pessimist: bool,
    position: &Position,
) -> Result<bool, GeofenceError> {
    with_fence(handle, |fence| fence.test(test_type, pessimist, position))
}

/// Creates the evaluation context for one device binding.
pub fn context_create(device_id: u64) -> Result<ContextHandle, GeofenceError> {
    let mut engine = lock();
    let id = engine.alloc_id();
    engine.contexts.insert(id, Context::new(device_id));
    Ok(ContextHandle(id))
}

/// Replaces the context's callback. A `TestType::None` clears it.
pub fn context_set_callback(
    handle: ContextHandle,
    test_type: TestType,
    pessimist: bool,
    callback: Option<GeofenceCallback>,
) -> Result<(), GeofenceError> {
    with_context(handle, |context| {
        context.set_callback(test_type, pessimist, callback);
        Ok(())
    })
}

/// Overrides the horizontal-speed sanity ceiling for this device.
pub fn context_set_max_speed(handle: ContextHandle, mm_per_s: i64) -> Result<(), GeofenceError> {
    with_context(handle, |context| {
        if mm_per_s <= 0 {
            return Err(GeofenceError::InvalidArg("speed ceiling must be positive"));
        }
        context.max_speed_mm_s = mm_per_s;
        Ok(())
    })
}

/// Attaches a fence to a context, freezing the fence while attached.
pub fn context_attach(context: ContextHandle, fence: FenceHandle) -> Result<(), GeofenceError> {
    let mut engine = lock();
    let engine = &mut *engine;
    let ctx = engine
        .contexts
        .get_mut(&context.0)
        .ok_or(GeofenceError::InvalidArg("unknown context handle"))?;
    let fenced = engine
        .fences
        .get_mut(&fence.0)
        .ok_or(GeofenceError::InvalidArg("unknown fence handle"))?;
    ctx.attach(fence)?;
    fenced.retain();
    debug!("device {}: attached fence {:?}", ctx.device_id, fenced.name());
    Ok(())
}

/// Detaches one fence. `NotFound` when it is not attached.
pub fn context_detach(context: ContextHandle, fence: FenceHandle) -> Result<(), GeofenceError> {
    let mut engine = lock();
    let engine = &mut *engine;
    let ctx = engine
        .contexts
        .get_mut(&context.0)
        .ok_or(GeofenceError::InvalidArg("unknown context handle"))?;
    ctx.detach(fence)?;
    if let Some(fenced) = engine.fences.get_mut(&fence.0) {
        fenced.release();
        debug!("device {}: detached fence {:?}", ctx.device_id, fenced.name());
    }
    Ok(())
}

/// Detaches everything the context holds.
pub fn context_detach_all(context: ContextHandle) -> Result<(), GeofenceError> {
    let mut engine = lock();
    let engine = &mut *engine;
    let ctx = engine
        .contexts
        .get_mut(&context.0)
        .ok_or(GeofenceError::InvalidArg("unknown context handle"))?;
    for attached in ctx.attached.drain(..) {
        if let Some(fenced) = engine.fences.get_mut(&attached.fence.0) {
            fenced.release();
        }
    }
    Ok(())
}

/// Destroys a context, detaching all its fences first.
pub fn context_free(handle: ContextHandle) -> Result<(), GeofenceError> {
    context_detach_all(handle)?;
    let mut engine = lock();
    engine.contexts.remove(&handle.0);
    Ok(())
}

/// Evaluates a position against every fence attached to the context, updates
/// the per-fence states, and dispatches the callback for each fence whose
/// configured test is satisfied.
pub fn context_evaluate(handle: ContextHandle, position: &Position) -> Result<(), GeofenceError> {
    let point = Vertex::new(position.lat_e9, position.lon_e9)?;
    let mut engine = lock();
    let engine = &mut *engine;
    let ctx = engine
        .contexts
        .get_mut(&handle.0)
        .ok_or(GeofenceError::InvalidArg("unknown context handle"))?;
    let speed_suspect = ctx.flag_suspect_speed(&point, position.ts_unix_ms);

    let Context { device_id, attached, callback, test_type, pessimist, .. } = ctx;
    for entry in attached.iter_mut() {
        let Some(fence) = engine.fences.get(&entry.fence.0) else {
            continue;
        };
        let outcome =
            eval::evaluate_fence(fence, *test_type, *pessimist, entry.last_state, position)?;
        if outcome.state == PositionState::None {
            // inapplicable or dropped sample: the stored state survives
            continue;
        }
        if entry.last_state != outcome.state {
            debug!(
                "device {}: fence {:?} {:?} -> {:?}",
                device_id,
                fence.name(),
                entry.last_state,
                outcome.state
            );
        }
        let fire = match test_type {
            TestType::Inside => outcome.state == PositionState::Inside,
            TestType::Outside => outcome.state == PositionState::Outside,
            TestType::Transit => outcome.transit,
            TestType::None => false,
        };
        entry.last_state = outcome.state;
        if fire {
            if let Some(cb) = callback.as_mut() {
                cb(&GeofenceEvent {
                    device_id: *device_id,
                    fence: entry.fence,
                    fence_name: fence.name(),
                    state: outcome.state,
                    position: *position,
                    distance_mm: outcome.distance_mm,
                    speed_suspect,
                });
            }
        }
    }
    Ok(())
}

/// Drops the whole registry. Fails `Busy` while any context remains; fences
/// alone do not keep the engine alive.
pub fn cleanup() -> Result<(), GeofenceError> {
    let mut engine = lock();
    if !engine.contexts.is_empty() {
        return Err(GeofenceError::Busy);
    }
    engine.fences.clear();
    Ok(())
}
