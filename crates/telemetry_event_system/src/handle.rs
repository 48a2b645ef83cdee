//! # Handle
//!
//! The emission helper instrumentation modules use. It marks the event type
//! as buffering before emitting, so a producer never has to know whether the
//! consumer for its events has loaded yet. Both steps are cheap and safe to
//! repeat: once the group has drained, `buffer` is a no-op and the emission
//! goes straight to the live listeners.

use crate::emitter::EventEmitter;
use crate::events::{EventArgs, EventContext};
use std::sync::Arc;

/// Scope id of the shared emitter used when a producer names no target.
pub const HANDLE_SCOPE: &str = "handle";

/// Buffers `event_type` under `group` on `target`, then emits it there.
///
/// Returns the context the event was emitted with (`None` if the target is
/// aborted).
pub fn handle(
    event_type: &str,
    args: Arc<EventArgs>,
    ctx: Option<Arc<EventContext>>,
    group: Option<&str>,
    target: &Arc<EventEmitter>,
) -> Option<Arc<EventContext>> {
    target.buffer(&[event_type], group);
    target.emit(event_type, args, ctx)
}
