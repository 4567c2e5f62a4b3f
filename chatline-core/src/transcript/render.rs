//! Rendering seam between the assembler and a display.
//!
//! The assembler never formats anything itself. It hands every changed item
//! to a [`Renderer`] (content → display string) and pushes the result to a
//! [`RenderSink`]. A terminal printer, a TUI, or a test recorder all plug in
//! here.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::types::{Exchange, ExchangeId, Item, ItemId};

type RenderFn = dyn Fn(&Item) -> String + Send + Sync;

/// Pure function turning an item's accumulated content into display form
/// (e.g. markdown → markup).
///
/// `Renderer::default()` returns the content unchanged.
#[derive(Clone)]
pub struct Renderer {
    func: Arc<RenderFn>,
}

impl Renderer {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Item) -> String + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    pub fn render(&self, item: &Item) -> String {
        (self.func)(item)
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(|item: &Item| item.content.clone())
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Renderer")
    }
}

/// Receiver of transcript changes.
///
/// Every method has an empty default, so a sink implements only what it
/// displays.
pub trait RenderSink: Send {
    /// A new exchange was appended to the transcript.
    fn exchange_started(&mut self, _exchange: &Exchange) {}

    /// An item was created or its content grew. `rendered` is the full
    /// rendered buffer, not the delta.
    fn item_updated(&mut self, _exchange_id: ExchangeId, _item: &Item, _rendered: &str) {}

    fn item_removed(&mut self, _exchange_id: ExchangeId, _item_id: ItemId) {}

    fn item_hidden(&mut self, _exchange_id: ExchangeId, _item: &Item) {}

    /// The exchange reached a terminal state; no item is active anymore.
    fn exchange_finalized(&mut self, _exchange: &Exchange) {}

    /// Bring the newest content into view.
    fn scroll_to_bottom(&mut self) {}
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl RenderSink for NullSink {}

/// A sink notification, as captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Started(ExchangeId),
    Updated {
        exchange_id: ExchangeId,
        item_id: ItemId,
        rendered: String,
    },
    Removed {
        exchange_id: ExchangeId,
        item_id: ItemId,
    },
    Hidden {
        exchange_id: ExchangeId,
        item_id: ItemId,
    },
    Finalized(ExchangeId),
    Scrolled,
}

/// Sink that records every notification. Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the notifications so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn scroll_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Scrolled))
            .count()
    }

    fn record(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl RenderSink for RecordingSink {
    fn exchange_started(&mut self, exchange: &Exchange) {
        self.record(SinkEvent::Started(exchange.id));
    }

    fn item_updated(&mut self, exchange_id: ExchangeId, item: &Item, rendered: &str) {
        self.record(SinkEvent::Updated {
            exchange_id,
            item_id: item.id,
            rendered: rendered.to_string(),
        });
    }

    fn item_removed(&mut self, exchange_id: ExchangeId, item_id: ItemId) {
        self.record(SinkEvent::Removed {
            exchange_id,
            item_id,
        });
    }

    fn item_hidden(&mut self, exchange_id: ExchangeId, item: &Item) {
        self.record(SinkEvent::Hidden {
            exchange_id,
            item_id: item.id,
        });
    }

    fn exchange_finalized(&mut self, exchange: &Exchange) {
        self.record(SinkEvent::Finalized(exchange.id));
    }

    fn scroll_to_bottom(&mut self) {
        self.record(SinkEvent::Scrolled);
    }
}
