//! Incremental transcript assembly.
//!
//! A [`TranscriptAssembler`] owns one assistant [`Exchange`] for the
//! duration of a reply and folds decoded [`Event`]s into it:
//!
//! ```text
//!            start()                  end of stream
//!   Idle ─────────────► Streaming ─────────────────► Finalized
//!                           │
//!                           ├── decode / source / duplicate error ──► Failed
//!                           │     (synthetic error item appended)
//!                           │
//!                           └── cancellation token fired ──────────► Cancelled
//! ```
//!
//! Every terminal transition finalizes the exchange: no item stays active.
//!
//! Side effects go out through three seams: the [`Renderer`] formats item
//! content, the [`RenderSink`] receives changes and scroll requests, and the
//! document [`CallbackRegistry`] receives attached documents.

mod render;
mod scroll;

pub use render::{NullSink, RecordingSink, RenderSink, Renderer, SinkEvent};
pub use scroll::ScrollThrottle;

use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::callback::CallbackRegistry;
use crate::config::TranscriptConfig;
use crate::error::{Error, Result};
use crate::stream::{DocumentEvent, Event, ItemDelta};
use crate::types::{Document, Exchange, ExchangeId, Item, ItemId, ItemKind, Role};

/// Lifecycle of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerState {
    Idle,
    Streaming,
    Finalized,
    Failed,
    Cancelled,
}

impl AssemblerState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssemblerState::Finalized | AssemblerState::Failed | AssemblerState::Cancelled
        )
    }
}

/// State machine building one assistant exchange from an event stream.
pub struct TranscriptAssembler<'a> {
    exchange: Exchange,
    state: AssemblerState,
    renderer: Renderer,
    sink: &'a mut dyn RenderSink,
    documents: &'a CallbackRegistry<Document>,
    scroll: ScrollThrottle,
    error_text: String,
}

impl<'a> TranscriptAssembler<'a> {
    pub fn new(
        exchange_id: ExchangeId,
        config: &TranscriptConfig,
        sink: &'a mut dyn RenderSink,
        documents: &'a CallbackRegistry<Document>,
    ) -> Self {
        Self {
            exchange: Exchange::new(exchange_id, Role::Assistant),
            state: AssemblerState::Idle,
            renderer: Renderer::default(),
            sink,
            documents,
            scroll: ScrollThrottle::new(config.scroll_throttle()),
            error_text: config.error_text.clone(),
        }
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn state(&self) -> AssemblerState {
        self.state
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    pub fn into_exchange(self) -> Exchange {
        self.exchange
    }

    /// Announce the exchange and start accepting events.
    pub fn start(&mut self) {
        if self.state != AssemblerState::Idle {
            return;
        }
        self.state = AssemblerState::Streaming;
        tracing::debug!(exchange_id = self.exchange.id, "Exchange started");
        self.sink.exchange_started(&self.exchange);
        self.request_scroll();
    }

    /// Fold one event into the exchange.
    ///
    /// An error leaves the exchange untouched; the caller decides whether to
    /// [`fail`](Self::fail) it.
    pub fn apply(&mut self, event: Event) -> Result<()> {
        if self.state == AssemblerState::Idle {
            self.start();
        }
        if self.state.is_terminal() {
            tracing::warn!(
                exchange_id = self.exchange.id,
                state = ?self.state,
                class = %event.class(),
                "Event after exchange ended, ignoring"
            );
            return Ok(());
        }

        match event {
            Event::ItemReplace(delta) => {
                if self.exchange.contains(&ItemId::Wire(delta.item_id)) {
                    return Err(Error::DuplicateItem(delta.item_id));
                }
                self.append(delta);
            }
            Event::ItemAppend(delta) => self.append(delta),
            Event::DocumentAttached(doc) => self.attach_document(doc),
            Event::ItemRemove { item_id } => self.remove(item_id),
            Event::ItemHide { item_id } => self.hide(item_id),
        }

        self.request_scroll();
        Ok(())
    }

    /// Pull events until the stream ends, fails, or `cancel` fires.
    ///
    /// Events are pulled one at a time; nothing is read past the first
    /// failing record. On failure the exchange gets its error item and the
    /// original error is returned.
    pub async fn consume<S>(&mut self, mut events: S, cancel: &CancellationToken) -> Result<()>
    where
        S: Stream<Item = Result<Event>> + Unpin,
    {
        self.start();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.cancel();
                    return Err(Error::Cancelled);
                }
                next = events.next() => next,
            };

            let outcome = match next {
                None => break,
                Some(event) => event.and_then(|event| self.apply(event)),
            };
            if let Err(e) = outcome {
                self.fail(&e);
                return Err(e);
            }
        }

        self.finish();
        Ok(())
    }

    /// Normal end of stream.
    pub fn finish(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.finalize(AssemblerState::Finalized);
        tracing::debug!(
            exchange_id = self.exchange.id,
            items = self.exchange.len(),
            "Exchange finalized"
        );
    }

    /// Abort with an error: append the error item and finalize.
    pub fn fail(&mut self, error: &Error) {
        if self.state.is_terminal() {
            return;
        }
        tracing::error!(exchange_id = self.exchange.id, error = %error, "Exchange failed");

        let mut item = Item::new(ItemId::Error, ItemKind::Text, None);
        item.append(&self.error_text);
        let rendered = self.renderer.render(&item);
        self.sink.item_updated(self.exchange.id, &item, &rendered);
        self.exchange.push(item);

        self.finalize(AssemblerState::Failed);
    }

    /// Stop without an error item.
    pub fn cancel(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        tracing::info!(exchange_id = self.exchange.id, "Exchange cancelled");
        self.finalize(AssemblerState::Cancelled);
    }

    // ============================================
    // Transitions
    // ============================================

    fn append(&mut self, delta: ItemDelta) {
        let id = ItemId::Wire(delta.item_id);

        if !self.exchange.contains(&id) {
            tracing::debug!(
                exchange_id = self.exchange.id,
                item_id = delta.item_id,
                kind = %delta.kind,
                "New item"
            );
            let mut item = Item::new(id, delta.kind, delta.name);
            item.active = true;
            item.selected = true;
            self.exchange.push(item);
            self.exchange.set_current(id);
        }

        let exchange_id = self.exchange.id;
        if let Some(item) = self.exchange.get_mut(&id) {
            item.append(&delta.content);
            let rendered = self.renderer.render(item);
            self.sink.item_updated(exchange_id, item, &rendered);
        }
    }

    fn attach_document(&mut self, doc: DocumentEvent) {
        let document = Document {
            exchange_id: self.exchange.id,
            title: doc.title,
            content: doc.content,
            icon: doc.icon,
        };
        tracing::debug!(
            exchange_id = self.exchange.id,
            title = %document.title,
            "Document attached"
        );
        self.documents.dispatch(&document);
    }

    fn remove(&mut self, item_id: i64) {
        match self.exchange.remove(&ItemId::Wire(item_id)) {
            Some(_) => self.sink.item_removed(self.exchange.id, ItemId::Wire(item_id)),
            None => {
                tracing::warn!(
                    exchange_id = self.exchange.id,
                    item_id,
                    "Remove signal for unknown item"
                );
            }
        }
    }

    fn hide(&mut self, item_id: i64) {
        let exchange_id = self.exchange.id;
        match self.exchange.get_mut(&ItemId::Wire(item_id)) {
            Some(item) => {
                item.hidden = true;
                self.sink.item_hidden(exchange_id, item);
            }
            None => {
                tracing::warn!(exchange_id, item_id, "Hide signal for unknown item");
            }
        }
    }

    fn request_scroll(&mut self) {
        if self.scroll.request(Instant::now()) {
            self.sink.scroll_to_bottom();
        }
    }

    fn finalize(&mut self, state: AssemblerState) {
        self.exchange.finalize();
        self.state = state;
        self.sink.exchange_finalized(&self.exchange);
        self.sink.scroll_to_bottom();
    }
}
