//! # Telemetry Event System
//!
//! The dispatch core of the telemetry agent: instrumentation emits events
//! before anything is ready to consume them, and nothing may be lost on the
//! way to the harvest.
//!
//! ## Core Features
//!
//! - **Scoped emitters**: an [`EventEmitter`] tree with memoized children,
//!   shared or isolated backlogs and permanent abort
//! - **Buffer-then-drain**: events of a buffering type are recorded per group
//!   and replayed, in order and with the same payload allocation, once the
//!   group drains
//! - **Priority gate**: the [`DrainCoordinator`] holds every group of an agent
//!   until all of them are ready, then flushes them in [`FeaturePriority`]
//!   order
//! - **Deferred decisions**: [`HandlerCache`] queues work until a yes/no
//!   decision arrives, with a timeout that defaults to no
//! - **Harvest batching**: size-capped [`EventBuffer`]s with retry backup and
//!   a payload chunker
//!
//! ## Data Flow
//!
//! ```text
//! instrumentation -> handle() -> EventEmitter (buffered)
//!     -> [feature loads] -> HandlerRegistry + DrainCoordinator -> replay
//!     -> EventBuffer -> get_payload() -> harvest transport
//! ```
//!
//! ## Quick Start Example
//!
//! ```rust
//! use telemetry_event_system::*;
//! use std::sync::{Arc, Mutex};
//!
//! let runtime = EventRuntime::default();
//! let agent = runtime.agent_scope("a1b2c3d4e5f60718", false);
//!
//! // Instrumentation fires before the aggregator exists.
//! let error = EventArgs::Error {
//!     message: "boom".to_string(),
//!     stack: None,
//!     timestamp: 0,
//! };
//! runtime.handle("err", error.shared(), None, Some(features::JSERRORS), Some(&agent));
//!
//! // The aggregator loads, subscribes and signals readiness.
//! let seen = Arc::new(Mutex::new(0));
//! let sink = seen.clone();
//! runtime.register_handler(
//!     "err",
//!     listener(move |_, _| *sink.lock().unwrap() += 1),
//!     Some(features::JSERRORS),
//!     Some(&agent),
//! );
//! runtime.register_drain("a1b2c3d4e5f60718", features::JSERRORS).unwrap();
//! runtime.drain("a1b2c3d4e5f60718", features::JSERRORS, false).unwrap();
//!
//! assert_eq!(*seen.lock().unwrap(), 1);
//! ```

pub mod decision;
pub mod drain;
pub mod emitter;
pub mod error;
pub mod events;
pub mod handle;
pub mod harvest;
pub mod registry;
pub mod runtime;

pub use decision::{HandlerCache, DECISION_TIMEOUT};
pub use drain::{features, DrainCoordinator, FeaturePriority};
pub use emitter::{listener, Backlog, EmitOptions, EventEmitter, EventRecord, GroupState, Listener};
pub use error::{DrainError, EventSystemError, HarvestError};
pub use events::{
    context_key, ContextCarrier, EventArgs, EventContext, EventType, GroupName, CONTEXT_PREFIX,
    DEFAULT_GROUP,
};
pub use handle::{handle, HANDLE_SCOPE};
pub use harvest::{
    estimate_size, get_payload, Chunk, ChunkedPayload, EventBuffer, HarvestPayload,
    MAX_PAYLOAD_SIZE,
};
pub use registry::{HandlerRegistration, HandlerRegistry};
pub use runtime::EventRuntime;
