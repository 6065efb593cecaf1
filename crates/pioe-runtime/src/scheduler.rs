//! Frame dispatch.
//!
//! Each tick hands the current frame to every engine in registration order.
//! An engine still busy with an earlier frame is skipped for the tick; busy
//! ticks are dropped, never queued. Frame bodies run on the blocking pool, so
//! distinct engines execute in parallel while each engine sees at most one
//! frame at a time.

use crate::error::{HostError, HostResult};
use crate::registry::{EngineHandle, EngineRegistry};
use pioe_abi::Frame;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

/// What happened to one engine during a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A frame task was started.
    Spawned,
    /// The previous frame task still holds the engine.
    Busy,
    /// The engine was unloaded and no longer receives frames.
    Unloaded,
}

/// Dispatch `frame` to every engine, in registration order.
pub async fn tick(registry: &mut EngineRegistry, frame: Frame) -> HostResult<Vec<Dispatch>> {
    let mut outcomes = Vec::with_capacity(registry.len());
    for handle in registry.iter_mut() {
        outcomes.push(dispatch(handle, frame).await?);
    }
    Ok(outcomes)
}

/// Dispatch `frame` to a single engine.
pub(crate) async fn dispatch(handle: &mut EngineHandle, frame: Frame) -> HostResult<Dispatch> {
    if handle.unloaded {
        return Ok(Dispatch::Unloaded);
    }

    let Ok(guard) = Arc::clone(&handle.lock).try_lock_owned() else {
        trace!(engine = %handle.descriptor.name, frame = frame.id, "Engine busy, skipping frame");
        return Ok(Dispatch::Busy);
    };

    // The lock is free, so the previous task has finished its frame body.
    if let Some(previous) = handle.task.take() {
        join(&handle.descriptor.name, previous).await;
    }

    let runtime = Handle::try_current()
        .map_err(|e| HostError::Thread(format!("could not create frame task: {}", e)))?;

    handle.frame = frame;
    let api = Arc::clone(&handle.api);
    let name = handle.descriptor.name.clone();

    handle.task = Some(runtime.spawn_blocking(move || {
        let _guard = guard;
        let status = api.frame(frame);
        if !status.is_ok() {
            error!(engine = %name, frame = frame.id, status = status.code(), "frame failed");
        }
    }));

    Ok(Dispatch::Spawned)
}

/// Wait for every engine's last frame task.
pub async fn settle(registry: &mut EngineRegistry) {
    for handle in registry.iter_mut() {
        if let Some(task) = handle.task.take() {
            join(&handle.descriptor.name, task).await;
        }
    }
}

/// Abort every outstanding frame task.
///
/// Tasks that have not started never run. A frame body already executing
/// cannot be preempted and is detached.
pub fn cancel(registry: &mut EngineRegistry) -> usize {
    let mut cancelled = 0;
    for handle in registry.iter_mut() {
        if let Some(task) = handle.task.take() {
            if !task.is_finished() {
                debug!(engine = %handle.descriptor.name, "Cancelling frame task");
                cancelled += 1;
            }
            task.abort();
        }
    }
    cancelled
}

async fn join(engine: &str, task: JoinHandle<()>) {
    match task.await {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(engine = %engine, "frame panicked"),
        Err(e) => debug!(engine = %engine, "frame task ended: {}", e),
    }
}
