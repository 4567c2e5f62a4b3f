//! Record decoding: one framed line in, one typed [`Event`] out.
//!
//! Each line is a JSON envelope `{"class": <tag>, "data": {...}}`. The tag
//! is resolved against the closed [`RecordClass`] set before the payload is
//! looked at, so an unknown tag is reported as [`Error::UnknownVariant`]
//! and a bad payload for a known tag as [`Error::MalformedRecord`].
//!
//! | class | event |
//! |-------|-------|
//! | `MessageItemResponse` | [`Event::ItemReplace`] |
//! | `MessageItemResponseChunk` | [`Event::ItemAppend`] |
//! | `DocumentResponse` | [`Event::DocumentAttached`] |
//! | `DeleteMessageItemSignal` | [`Event::ItemRemove`] |
//! | `HideMessageItemSignal` | [`Event::ItemHide`] |

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ItemKind;

/// Wire-level unit as framed from the stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordEnvelope {
    #[serde(rename = "class")]
    pub tag: String,
    #[serde(rename = "data", default)]
    pub payload: serde_json::Value,
}

/// Known record classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordClass {
    MessageItemResponse,
    MessageItemResponseChunk,
    DocumentResponse,
    DeleteMessageItemSignal,
    HideMessageItemSignal,
}

impl RecordClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordClass::MessageItemResponse => "MessageItemResponse",
            RecordClass::MessageItemResponseChunk => "MessageItemResponseChunk",
            RecordClass::DocumentResponse => "DocumentResponse",
            RecordClass::DeleteMessageItemSignal => "DeleteMessageItemSignal",
            RecordClass::HideMessageItemSignal => "HideMessageItemSignal",
        }
    }
}

impl std::fmt::Display for RecordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MessageItemResponse" => Ok(RecordClass::MessageItemResponse),
            "MessageItemResponseChunk" => Ok(RecordClass::MessageItemResponseChunk),
            "DocumentResponse" => Ok(RecordClass::DocumentResponse),
            "DeleteMessageItemSignal" => Ok(RecordClass::DeleteMessageItemSignal),
            "HideMessageItemSignal" => Ok(RecordClass::HideMessageItemSignal),
            other => Err(Error::UnknownVariant(other.to_string())),
        }
    }
}

/// Content for an item, shared by replace and append events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDelta {
    pub item_id: i64,
    pub kind: ItemKind,
    pub content: String,
    /// Present only when `kind` is not text
    pub name: Option<String>,
}

/// A document attached to the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    pub title: String,
    pub content: String,
    pub icon: String,
}

/// Typed event decoded from one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// First content of a new item; fatal if the item exists
    ItemReplace(ItemDelta),
    /// Content delta for a new or existing item
    ItemAppend(ItemDelta),
    DocumentAttached(DocumentEvent),
    ItemRemove { item_id: i64 },
    ItemHide { item_id: i64 },
}

impl Event {
    pub fn class(&self) -> RecordClass {
        match self {
            Event::ItemReplace(_) => RecordClass::MessageItemResponse,
            Event::ItemAppend(_) => RecordClass::MessageItemResponseChunk,
            Event::DocumentAttached(_) => RecordClass::DocumentResponse,
            Event::ItemRemove { .. } => RecordClass::DeleteMessageItemSignal,
            Event::ItemHide { .. } => RecordClass::HideMessageItemSignal,
        }
    }

    /// Encode back into a wire line (without the trailing newline).
    pub fn to_record(&self) -> Result<String> {
        let payload = match self {
            Event::ItemReplace(delta) | Event::ItemAppend(delta) => {
                let mut data = serde_json::json!({
                    "type": delta.kind.as_str(),
                    "content": delta.content,
                    "messageItemID": delta.item_id,
                });
                if let Some(name) = &delta.name {
                    data["name"] = serde_json::Value::String(name.clone());
                }
                data
            }
            Event::DocumentAttached(doc) => serde_json::json!({
                "title": doc.title,
                "content": doc.content,
                "icon": doc.icon,
            }),
            Event::ItemRemove { item_id } | Event::ItemHide { item_id } => {
                serde_json::json!({ "messageItemID": item_id })
            }
        };
        let envelope = RecordEnvelope {
            tag: self.class().as_str().to_string(),
            payload,
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

// ============================================
// Raw payloads (serde deserialization)
// ============================================

#[derive(Debug, Deserialize)]
struct RawItemResponse {
    #[serde(rename = "type")]
    item_type: String,
    content: String,
    #[serde(rename = "messageItemID", default = "default_item_id")]
    message_item_id: i64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawItemChunk {
    content: String,
    #[serde(rename = "messageItemID")]
    message_item_id: i64,
    #[serde(rename = "type", default)]
    item_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    title: String,
    content: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct RawSignal {
    #[serde(rename = "messageItemID", default = "default_item_id")]
    message_item_id: i64,
}

fn default_item_id() -> i64 {
    -1
}

fn payload<T: DeserializeOwned>(class: RecordClass, value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::MalformedRecord(format!("invalid {} payload: {}", class, e)))
}

fn item_kind(class: RecordClass, raw: &str) -> Result<ItemKind> {
    raw.parse()
        .map_err(|e| Error::MalformedRecord(format!("invalid {} payload: {}", class, e)))
}

/// Keep the name only for non-text kinds, falling back to the class default.
fn item_name(kind: ItemKind, name: Option<String>, default: &str) -> Option<String> {
    kind.is_named()
        .then(|| name.unwrap_or_else(|| default.to_string()))
}

/// Materialize the event for an already parsed envelope.
pub fn dispatch(envelope: RecordEnvelope) -> Result<Event> {
    let class: RecordClass = envelope.tag.parse()?;
    let data = envelope.payload;

    let event = match class {
        RecordClass::MessageItemResponse => {
            let raw: RawItemResponse = payload(class, data)?;
            let kind = item_kind(class, &raw.item_type)?;
            Event::ItemReplace(ItemDelta {
                item_id: raw.message_item_id,
                kind,
                content: raw.content,
                name: item_name(kind, raw.name, "N/A"),
            })
        }
        RecordClass::MessageItemResponseChunk => {
            let raw: RawItemChunk = payload(class, data)?;
            let kind = match raw.item_type.as_deref() {
                Some(t) => item_kind(class, t)?,
                None => ItemKind::Text,
            };
            Event::ItemAppend(ItemDelta {
                item_id: raw.message_item_id,
                kind,
                content: raw.content,
                name: item_name(kind, raw.name, ""),
            })
        }
        RecordClass::DocumentResponse => {
            let raw: RawDocument = payload(class, data)?;
            Event::DocumentAttached(DocumentEvent {
                title: raw.title,
                content: raw.content,
                icon: raw.icon,
            })
        }
        RecordClass::DeleteMessageItemSignal => {
            let raw: RawSignal = payload(class, data)?;
            Event::ItemRemove {
                item_id: raw.message_item_id,
            }
        }
        RecordClass::HideMessageItemSignal => {
            let raw: RawSignal = payload(class, data)?;
            Event::ItemHide {
                item_id: raw.message_item_id,
            }
        }
    };

    Ok(event)
}

/// Parse one framed record into an [`Event`].
pub fn decode_record(record: &str) -> Result<Event> {
    let envelope: RecordEnvelope = serde_json::from_str(record)
        .map_err(|e| Error::MalformedRecord(format!("invalid record envelope: {}", e)))?;
    dispatch(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chunk_defaults_to_text() {
        let event =
            decode_record(r#"{"class":"MessageItemResponseChunk","data":{"content":"Hi","messageItemID":0}}"#)
                .unwrap();
        assert_eq!(
            event,
            Event::ItemAppend(ItemDelta {
                item_id: 0,
                kind: ItemKind::Text,
                content: "Hi".into(),
                name: None,
            })
        );
    }

    #[test]
    fn test_decode_tool_response() {
        let event = decode_record(
            r#"{"class":"MessageItemResponse","data":{"type":"tool","content":"out","messageItemID":1,"name":"Supertool"}}"#,
        )
        .unwrap();
        match event {
            Event::ItemReplace(delta) => {
                assert_eq!(delta.kind, ItemKind::Tool);
                assert_eq!(delta.name.as_deref(), Some("Supertool"));
                assert_eq!(delta.item_id, 1);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_response_defaults() {
        // Null name as emitted by the reference server
        let event = decode_record(
            r#"{"class":"MessageItemResponse","data":{"type":"b64image","content":"iVBO","name":null}}"#,
        )
        .unwrap();
        match event {
            Event::ItemReplace(delta) => {
                assert_eq!(delta.item_id, -1);
                assert_eq!(delta.kind, ItemKind::Image);
                assert_eq!(delta.name.as_deref(), Some("N/A"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let event = decode_record(
            r#"{"class":"MessageItemResponseChunk","data":{"type":"tool","content":"x","messageItemID":2}}"#,
        )
        .unwrap();
        match event {
            Event::ItemAppend(delta) => assert_eq!(delta.name.as_deref(), Some("")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_text_drops_name() {
        let event = decode_record(
            r#"{"class":"MessageItemResponse","data":{"type":"text","content":"x","messageItemID":2,"name":"ignored"}}"#,
        )
        .unwrap();
        match event {
            Event::ItemReplace(delta) => assert!(delta.name.is_none()),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_document_and_signals() {
        let event = decode_record(
            r#"{"class":"DocumentResponse","data":{"title":"Doc","content":"body","icon":"📄"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            Event::DocumentAttached(DocumentEvent {
                title: "Doc".into(),
                content: "body".into(),
                icon: "📄".into(),
            })
        );

        assert_eq!(
            decode_record(r#"{"class":"DeleteMessageItemSignal","data":{"messageItemID":3}}"#)
                .unwrap(),
            Event::ItemRemove { item_id: 3 }
        );
        assert_eq!(
            decode_record(r#"{"class":"HideMessageItemSignal","data":{}}"#).unwrap(),
            Event::ItemHide { item_id: -1 }
        );
    }

    #[test]
    fn test_unknown_class() {
        let err = decode_record(r#"{"class":"Bogus","data":{}}"#).unwrap_err();
        assert!(matches!(err, Error::UnknownVariant(ref tag) if tag == "Bogus"));
    }

    #[test]
    fn test_malformed_payloads() {
        // Missing messageItemID on a chunk
        let err = decode_record(r#"{"class":"MessageItemResponseChunk","data":{"content":"x"}}"#)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));

        // Unknown item type
        let err = decode_record(
            r#"{"class":"MessageItemResponse","data":{"type":"video","content":"x"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));

        // Not JSON at all
        let err = decode_record("not json").unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));

        // Envelope without a class
        let err = decode_record(r#"{"data":{}}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_to_record_decodes_back() {
        let event = Event::ItemAppend(ItemDelta {
            item_id: 4,
            kind: ItemKind::Tool,
            content: "partial".into(),
            name: Some("grep".into()),
        });
        let line = event.to_record().unwrap();
        assert!(line.contains("\"class\":\"MessageItemResponseChunk\""));
        assert_eq!(decode_record(&line).unwrap(), event);
    }
}
