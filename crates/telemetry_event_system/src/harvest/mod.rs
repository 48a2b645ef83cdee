//! # Harvest batching
//!
//! Where replayed events end up before transport: a size-capped
//! [`EventBuffer`] per destination, a [`get_payload`] chunker for batches
//! that might exceed the transport limit, and the structural
//! [`estimate_size`] both rely on.

pub mod buffer;
pub mod chunker;
pub mod size;

pub use self::buffer::{EventBuffer, HarvestPayload, PayloadSerializer, MAX_PAYLOAD_SIZE};
pub use self::chunker::{chunk_events, get_payload, Chunk, ChunkedPayload};
pub use self::size::estimate_size;
