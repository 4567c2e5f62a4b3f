//! Newline framing for incrementally delivered byte streams.
//!
//! Records are split on `\n` at the byte level, so a multi-byte UTF-8
//! character split across two chunks is reassembled before it is decoded.
//! The buffer never holds more than the unconsumed tail of the latest chunk
//! plus whatever precedes the next newline.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::error::{Error, Result};

/// Push-style newline framer.
///
/// Feed chunks with [`push`](Self::push), drain complete records with
/// [`next_record`](Self::next_record), and call [`finish`](Self::finish)
/// once the source is exhausted to flush an unterminated last record.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk to the accumulation buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Slice off the next complete, non-empty record.
    ///
    /// Returns `None` when the buffer holds no further newline.
    pub fn next_record(&mut self) -> Option<Result<String>> {
        loop {
            let pos = self.buffer.iter().position(|b| *b == b'\n')?;
            let line: Vec<u8> = self.buffer.drain(..=pos).take(pos).collect();
            if line.is_empty() {
                continue;
            }
            return Some(into_record(line));
        }
    }

    /// Flush the unterminated remainder, if any, as the final record.
    pub fn finish(&mut self) -> Option<Result<String>> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        Some(into_record(line))
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Frame a complete buffer in one go.
    pub fn decode_all(input: &[u8]) -> Result<Vec<String>> {
        let mut decoder = Self::new();
        decoder.push(input);
        let mut records = Vec::new();
        while let Some(record) = decoder.next_record() {
            records.push(record?);
        }
        if let Some(record) = decoder.finish() {
            records.push(record?);
        }
        Ok(records)
    }
}

fn into_record(line: Vec<u8>) -> Result<String> {
    String::from_utf8(line)
        .map_err(|e| Error::MalformedRecord(format!("record is not valid UTF-8: {}", e)))
}

/// [`Stream`] adapter that frames a byte-chunk stream into records.
///
/// Errors from the chunk source are passed through unchanged and end the
/// stream; nothing is read after an error.
#[derive(Debug)]
pub struct FrameStream<S> {
    inner: S,
    decoder: FrameDecoder,
    done: bool,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            done: false,
        }
    }
}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if self.done {
                return Poll::Ready(None);
            }

            if let Some(record) = self.decoder.next_record() {
                if record.is_err() {
                    self.done = true;
                }
                return Poll::Ready(Some(record));
            }

            let inner = Pin::new(&mut self.inner);
            match inner.poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    self.decoder.push(&bytes);
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    return Poll::Ready(self.decoder.finish());
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
