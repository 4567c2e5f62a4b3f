//! Stream decoding layer
//!
//! Turns the raw byte stream of a reply into typed events:
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌────────────────┐
//! │  ByteStream  │ ──► │ FrameStream  │ ──► │ decode_record  │ ──► Event
//! │ (transport)  │     │ (NDJSON)     │     │ (class → enum) │
//! └──────────────┘     └──────────────┘     └────────────────┘
//! ```
//!
//! Everything here is lazy: a chunk is only pulled from the transport when
//! the consumer asks for the next event.

mod frame;
mod record;

pub use frame::{FrameDecoder, FrameStream};
pub use record::{
    decode_record, dispatch, DocumentEvent, Event, ItemDelta, RecordClass, RecordEnvelope,
};

use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::Result;

/// Incremental response body as handed over by a transport.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Typed events decoded from a [`ByteStream`].
pub type EventStream = Pin<Box<dyn Stream<Item = Result<Event>> + Send>>;

/// Frame and decode a byte stream into events.
pub fn events<S>(bytes: S) -> impl Stream<Item = Result<Event>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    FrameStream::new(bytes).map(|record| record.and_then(|line| decode_record(&line)))
}

/// Boxed variant of [`events`] for transports.
pub fn event_stream(bytes: ByteStream) -> EventStream {
    Box::pin(events(bytes))
}

/// Split a complete capture into `chunk_size`-byte chunks, simulating
/// incremental delivery.
pub fn chunked(data: Vec<u8>, chunk_size: usize) -> ByteStream {
    let size = chunk_size.max(1);
    let chunks: Vec<Result<Bytes>> = data
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    Box::pin(futures_util::stream::iter(chunks))
}
