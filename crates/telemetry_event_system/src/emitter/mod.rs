/// Contextual event emitter - scoped pub/sub with backlog buffering
mod backlog;
mod core;

pub use self::backlog::{Backlog, EventRecord, GroupState};
pub use self::core::{listener, EmitOptions, EventEmitter, Listener};
