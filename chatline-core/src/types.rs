//! Core domain types for chatline
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Exchange** | One turn of the conversation (the user's message or one assistant reply) |
//! | **Item** | An identity-addressed piece of an exchange: a text run, a tool call, an image |
//! | **Document** | A side artifact attached to an assistant exchange; handed to callbacks, never stored |
//! | **Transcript** | The ordered list of exchanges of one chat session |
//!
//! Items are created by the first record that names their id and grow by
//! appending content. They disappear only through an explicit remove signal.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Identifier of an exchange, unique within a chat session.
pub type ExchangeId = u64;

// ============================================
// Items
// ============================================

/// What an item holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Markdown text
    Text,
    /// Output of a named tool
    Tool,
    /// Base64-encoded image (wire name `b64image`)
    Image,
}

impl ItemKind {
    /// Returns the identifier used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Text => "text",
            ItemKind::Tool => "tool",
            ItemKind::Image => "b64image",
        }
    }

    /// Whether items of this kind carry a name
    pub fn is_named(&self) -> bool {
        !matches!(self, ItemKind::Text)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ItemKind::Text),
            "tool" => Ok(ItemKind::Tool),
            "b64image" => Ok(ItemKind::Image),
            _ => Err(format!("unknown item type: {}", s)),
        }
    }
}

/// Key of an item inside its exchange.
///
/// Wire ids are signed because the protocol defaults a missing id to `-1`.
/// The synthetic failure item lives under its own key so it can never
/// collide with a wire id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemId {
    Wire(i64),
    Error,
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemId::Wire(id) => write!(f, "{}", id),
            ItemId::Error => write!(f, "error"),
        }
    }
}

impl From<i64> for ItemId {
    fn from(id: i64) -> Self {
        ItemId::Wire(id)
    }
}

/// An item of an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    /// Tool or image name; always `None` for text items
    pub name: Option<String>,
    /// Accumulated raw content (markdown for text, payload for tools/images)
    pub content: String,
    /// Still receiving content
    pub active: bool,
    pub selected: bool,
    /// Set by a hide signal; the item stays in the exchange
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Create an empty, inactive item. `name` is dropped for text items.
    pub fn new(id: ItemId, kind: ItemKind, name: Option<String>) -> Self {
        Self {
            id,
            kind,
            name: if kind.is_named() { name } else { None },
            content: String::new(),
            active: false,
            selected: false,
            hidden: false,
            created_at: Utc::now(),
        }
    }

    /// Append a content delta.
    pub fn append(&mut self, delta: &str) {
        self.content.push_str(delta);
    }

    pub fn is_error(&self) -> bool {
        self.id == ItemId::Error
    }
}

// ============================================
// Exchanges
// ============================================

/// Who authored an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One turn of the conversation.
///
/// Items are kept in first-seen order and are addressable by id in O(1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub role: Role,
    #[serde(with = "item_seq")]
    items: IndexMap<ItemId, Item>,
    current: Option<ItemId>,
    pub created_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(id: ExchangeId, role: Role) -> Self {
        Self {
            id,
            role,
            items: IndexMap::new(),
            current: None,
            created_at: Utc::now(),
        }
    }

    /// A finished user exchange holding a single plain-text item.
    pub fn user_message(id: ExchangeId, text: &str) -> Self {
        let mut exchange = Self::new(id, Role::User);
        let mut item = Item::new(ItemId::Wire(0), ItemKind::Text, None);
        item.append(text);
        exchange.push(item);
        exchange
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    /// Items in first-seen order.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item most recently created by the stream, if any.
    pub fn current(&self) -> Option<&Item> {
        self.current.as_ref().and_then(|id| self.items.get(id))
    }

    pub fn current_id(&self) -> Option<ItemId> {
        self.current
    }

    /// Append an item at the end. An existing item with the same id is replaced in place.
    pub fn push(&mut self, item: Item) {
        self.items.insert(item.id, item);
    }

    /// Make `id` the current item, deactivating the previous one.
    pub fn set_current(&mut self, id: ItemId) {
        if let Some(previous) = self.current.replace(id) {
            if previous != id {
                if let Some(item) = self.items.get_mut(&previous) {
                    item.active = false;
                }
            }
        }
    }

    /// Delete an item, keeping the order of the rest.
    pub fn remove(&mut self, id: &ItemId) -> Option<Item> {
        let removed = self.items.shift_remove(id);
        if removed.is_some() && self.current.as_ref() == Some(id) {
            self.current = None;
        }
        removed
    }

    /// Deactivate every item and drop the current marker.
    pub fn finalize(&mut self) {
        for item in self.items.values_mut() {
            item.active = false;
        }
        self.current = None;
    }

    /// Whether the exchange ended with a synthetic error item.
    pub fn has_error(&self) -> bool {
        self.items.contains_key(&ItemId::Error)
    }

    /// Concatenated content of the visible text items.
    pub fn text(&self) -> String {
        self.items
            .values()
            .filter(|item| item.kind == ItemKind::Text && !item.hidden)
            .map(|item| item.content.as_str())
            .collect()
    }
}

/// Serializes the item index as a plain list; the ids live inside the items.
mod item_seq {
    use super::{Item, ItemId};
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        items: &IndexMap<ItemId, Item>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<ItemId, Item>, D::Error> {
        let items = Vec::<Item>::deserialize(deserializer)?;
        Ok(items.into_iter().map(|item| (item.id, item)).collect())
    }
}

/// A document attached to an assistant exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub exchange_id: ExchangeId,
    pub title: String,
    pub content: String,
    /// Usually a single emoji
    pub icon: String,
}

// ============================================
// Transcript
// ============================================

/// Ordered exchanges of one chat session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    exchanges: Vec<Exchange>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    pub fn get(&self, id: ExchangeId) -> Option<&Exchange> {
        self.exchanges.iter().find(|e| e.id == id)
    }

    pub fn last(&self) -> Option<&Exchange> {
        self.exchanges.last()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}
