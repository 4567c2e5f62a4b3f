//! Terminal output for streamed transcripts.
//!
//! The assembler hands over the full rendered buffer on every update; this
//! sink prints only the part not yet written, so a reply appears on the
//! terminal as it streams in. Works best with renderers whose output only
//! grows at the end (the identity renderer does).

use std::collections::HashMap;
use std::io::Write;

use chatline_core::transcript::RenderSink;
use chatline_core::types::{Exchange, ExchangeId, Item, ItemId, ItemKind, Role};

type ItemKey = (ExchangeId, ItemId);

pub struct TerminalSink<W> {
    out: W,
    /// Bytes of each item's rendered buffer already written
    printed: HashMap<ItemKey, usize>,
    last: Option<ItemKey>,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: HashMap::new(),
            last: None,
        }
    }

    /// Start a new output line when switching items.
    fn switch_to(&mut self, key: ItemKey, item: &Item) {
        if self.last == Some(key) {
            return;
        }
        if self.last.is_some() {
            writeln!(self.out).ok();
        }
        self.last = Some(key);

        let name = item.name.as_deref().unwrap_or_default();
        match item.kind {
            ItemKind::Text => {}
            ItemKind::Tool => {
                write!(self.out, "[tool: {}] ", name).ok();
            }
            ItemKind::Image => {
                write!(self.out, "[image: {}]", name).ok();
            }
        }
    }
}

impl<W: Write + Send> RenderSink for TerminalSink<W> {
    fn exchange_started(&mut self, exchange: &Exchange) {
        let prefix = match exchange.role {
            Role::User => "you> ",
            Role::Assistant => "assistant> ",
        };
        write!(self.out, "{}", prefix).ok();
        self.last = None;
    }

    fn item_updated(&mut self, exchange_id: ExchangeId, item: &Item, rendered: &str) {
        let key = (exchange_id, item.id);
        self.switch_to(key, item);

        let done = self.printed.get(&key).copied().unwrap_or(0);
        self.printed.insert(key, rendered.len());

        // Image payloads are base64; the header is enough
        if item.kind == ItemKind::Image {
            return;
        }
        let delta = rendered.get(done..).unwrap_or(rendered);
        write!(self.out, "{}", delta).ok();
        self.out.flush().ok();
    }

    fn item_removed(&mut self, exchange_id: ExchangeId, item_id: ItemId) {
        self.printed.remove(&(exchange_id, item_id));
        write!(self.out, "\n[removed {}]", item_id).ok();
        self.last = None;
    }

    fn item_hidden(&mut self, _exchange_id: ExchangeId, item: &Item) {
        write!(self.out, "\n[hidden {}]", item.id).ok();
        self.last = None;
    }

    fn exchange_finalized(&mut self, _exchange: &Exchange) {
        writeln!(self.out).ok();
        self.out.flush().ok();
        self.last = None;
    }
}
