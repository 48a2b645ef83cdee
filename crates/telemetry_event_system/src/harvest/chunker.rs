//! Splits a batch into pieces that each serialize under a size limit.
//!
//! The split is by count, not bin packing: the batch is cut into
//! `chunk_count` equal slices, and if any slice with more than one event
//! serializes too large the whole batch is cut again one slice finer. A
//! single event that is too large on its own cannot be split and is dropped.

use crate::error::HarvestError;
use serde::Serialize;
use tracing::{debug, warn};

/// A slice of a batch together with its serialized form.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    pub events: Vec<T>,
    pub serialized_payload: String,
}

impl<T> Chunk<T> {
    /// Size of the serialized payload in bytes.
    pub fn raw_byte_estimate(&self) -> usize {
        self.serialized_payload.len()
    }

    pub fn too_big(&self, max_payload_size: usize) -> bool {
        self.raw_byte_estimate() > max_payload_size
    }
}

/// Result of [`get_payload`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkedPayload<T> {
    /// Chunks that fit, in batch order.
    pub chunks: Vec<Chunk<T>>,
    /// Single events that were too large to send.
    pub dropped: usize,
}

impl<T> ChunkedPayload<T> {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Splits `events` into chunks of at most `max_payload_size` serialized bytes.
pub fn get_payload<T>(events: &[T], max_payload_size: usize) -> Result<ChunkedPayload<T>, HarvestError>
where
    T: Serialize + Clone,
{
    let mut chunk_count = 1;
    loop {
        match chunk_events(events, chunk_count, max_payload_size)? {
            Some(payload) => {
                if chunk_count > 1 {
                    debug!("✂️ Split {} events into {} chunks", events.len(), payload.chunks.len());
                }
                return Ok(payload);
            }
            None => chunk_count += 1,
        }
    }
}

/// One attempt at `chunk_count` slices.
///
/// Returns `None` when a multi-event slice is too large and a finer split is
/// needed. Once `chunk_count` reaches the batch length every slice holds a
/// single event, so the retry loop always ends.
pub fn chunk_events<T>(
    events: &[T],
    chunk_count: usize,
    max_payload_size: usize,
) -> Result<Option<ChunkedPayload<T>>, HarvestError>
where
    T: Serialize + Clone,
{
    let mut payload = ChunkedPayload {
        chunks: Vec::new(),
        dropped: 0,
    };
    if events.is_empty() {
        return Ok(Some(payload));
    }

    let chunk_size = events.len().div_ceil(chunk_count.max(1));
    for slice in events.chunks(chunk_size) {
        let chunk = Chunk {
            events: slice.to_vec(),
            serialized_payload: serde_json::to_string(slice)?,
        };

        if !chunk.too_big(max_payload_size) {
            payload.chunks.push(chunk);
        } else if slice.len() > 1 {
            return Ok(None);
        } else {
            warn!(
                "🗑️ Dropping event of {} bytes; larger than the {} byte payload limit",
                chunk.raw_byte_estimate(),
                max_payload_size
            );
            payload.dropped += 1;
        }
    }
    Ok(Some(payload))
}
