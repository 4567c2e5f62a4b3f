//! Input serialization: from input widgets to request payload fields.
//!
//! Each input widget is described by an [`InputNode`] carrying a `kind`
//! tag (e.g. `ChatInput`, `InputFileArea`). A [`SerializerRegistry`] holds
//! an ordered chain of extractor functions; the first extractor that
//! returns `Some` for a node decides its value. [`collect`](SerializerRegistry::collect)
//! walks a widget tree and stores each serialized node under a field name
//! derived from its kind (`ChatInput` → `chat-input`).
//!
//! The registry is a plain value owned by whoever builds requests; nothing
//! here is global. [`SerializerRegistry::with_defaults`] is the chain for a
//! chat bar with file attachments.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind tag of the text editor widget.
pub const CHAT_INPUT: &str = "ChatInput";
/// Kind tag of the attachment tray.
pub const INPUT_FILE_AREA: &str = "InputFileArea";
/// Kind tag of a single attachment inside the tray.
pub const INPUT_FILE: &str = "InputFile";
/// Attribute holding the server-side id of an uploaded attachment.
pub const INPUT_FILE_ID: &str = "input-file-id";
/// Attribute holding the display name of an attachment.
pub const INPUT_FILE_NAME: &str = "input-file-name";

/// An input widget as seen by the serializer chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputNode {
    pub kind: String,
    /// Markup content (editor widgets)
    pub markup: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<InputNode>,
}

impl InputNode {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = markup.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: InputNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// This node followed by all descendants, depth first.
    pub fn walk(&self) -> Vec<&InputNode> {
        let mut nodes = vec![self];
        for child in &self.children {
            nodes.extend(child.walk());
        }
        nodes
    }
}

/// Extractor: returns the node's value, or `None` if it does not handle the node.
pub type SerializerFn = dyn Fn(&InputNode) -> Option<serde_json::Value> + Send + Sync;

/// Ordered, append-only chain of extractors.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    serializers: Vec<Arc<SerializerFn>>,
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("serializers", &self.serializers.len())
            .finish()
    }
}

impl SerializerRegistry {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Text editor and attachment tray serializers, in that order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.add_serializer(text_serializer);
        registry.add_serializer(file_serializer);
        registry
    }

    /// Append an extractor to the end of the chain.
    pub fn add_serializer<F>(&mut self, serializer: F)
    where
        F: Fn(&InputNode) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        self.serializers.push(Arc::new(serializer));
    }

    pub fn len(&self) -> usize {
        self.serializers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializers.is_empty()
    }

    /// First present result in registration order.
    pub fn serialize(&self, node: &InputNode) -> Option<serde_json::Value> {
        self.serializers.iter().find_map(|serializer| serializer(node))
    }

    /// Serialize every node of the given trees into named fields.
    ///
    /// Nodes no extractor handles are skipped. When two nodes map to the
    /// same field name the later one wins.
    pub fn collect(&self, roots: &[InputNode]) -> InputData {
        let mut fields = BTreeMap::new();
        for node in roots.iter().flat_map(InputNode::walk) {
            if let Some(value) = self.serialize(node) {
                fields.insert(field_name(&node.kind), value);
            }
        }
        InputData { fields }
    }
}

/// Serialized input, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputData {
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl InputData {
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    /// Text of the chat editor, empty if absent.
    pub fn message(&self) -> String {
        self.get(&field_name(CHAT_INPUT))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Ids of uploaded attachments, empty if absent.
    pub fn files(&self) -> Vec<String> {
        self.get(&field_name(INPUT_FILE_AREA))
            .and_then(|v| v.as_array())
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Payload of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session: String,
    pub message: String,
    pub files: Vec<String>,
}

impl ChatRequest {
    pub fn from_input(session: impl Into<String>, input: &InputData) -> Self {
        Self {
            session: session.into(),
            message: input.message(),
            files: input.files(),
        }
    }
}

/// Convert a camel-cased kind tag to a hyphenated lowercase field name.
pub fn field_name(kind: &str) -> String {
    static BOUNDARY: OnceLock<Regex> = OnceLock::new();
    let re = BOUNDARY.get_or_init(|| Regex::new(r"([a-z])([A-Z])").expect("valid regex"));
    re.replace_all(kind, "$1-$2").to_lowercase()
}

/// Convert editor markup to plain text: line-breaking tags become newlines,
/// every other tag is dropped.
pub fn markup_to_text(markup: &str) -> String {
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let breaks = BREAKS
        .get_or_init(|| Regex::new(r"(?i)<br\s*/?>|</div>|</p>").expect("valid regex"));
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid regex"));

    let text = breaks.replace_all(markup, "\n");
    tags.replace_all(&text, "").into_owned()
}

/// Serializer for the chat text editor.
pub fn text_serializer(node: &InputNode) -> Option<serde_json::Value> {
    (node.kind == CHAT_INPUT).then(|| serde_json::Value::String(markup_to_text(&node.markup)))
}

/// Serializer for the attachment tray: ids of attachments that finished uploading.
pub fn file_serializer(node: &InputNode) -> Option<serde_json::Value> {
    if node.kind != INPUT_FILE_AREA {
        return None;
    }
    let ids = node
        .children
        .iter()
        .filter(|child| child.kind == INPUT_FILE)
        .filter_map(|child| child.attribute(INPUT_FILE_ID))
        .map(|id| serde_json::Value::String(id.to_string()))
        .collect();
    Some(serde_json::Value::Array(ids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tray(ids: &[Option<&str>]) -> InputNode {
        ids.iter().enumerate().fold(InputNode::new(INPUT_FILE_AREA), |area, (i, id)| {
            let mut file =
                InputNode::new(INPUT_FILE).with_attribute(INPUT_FILE_NAME, format!("f{}.csv", i));
            if let Some(id) = id {
                file = file.with_attribute(INPUT_FILE_ID, *id);
            }
            area.with_child(file)
        })
    }

    #[test]
    fn test_field_name() {
        assert_eq!(field_name("ChatInput"), "chat-input");
        assert_eq!(field_name("InputFileArea"), "input-file-area");
        assert_eq!(field_name("plain"), "plain");
    }

    #[test]
    fn test_markup_to_text() {
        assert_eq!(
            markup_to_text("line one<br>line <b>two</b><div>three</div><p>four</P>"),
            "line one\nline twothree\nfour\n"
        );
        assert_eq!(markup_to_text("a<BR/>b<br />c"), "a\nb\nc");
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = SerializerRegistry::new();
        registry.add_serializer(|node: &InputNode| (node.kind == "Widget").then(|| json!("first")));
        registry.add_serializer(|node: &InputNode| (node.kind == "Widget").then(|| json!("second")));

        assert_eq!(registry.serialize(&InputNode::new("Widget")), Some(json!("first")));
        assert_eq!(registry.serialize(&InputNode::new("Other")), None);
    }

    #[test]
    fn test_empty_registry_serializes_nothing() {
        let registry = SerializerRegistry::new();
        assert!(registry.serialize(&InputNode::new(CHAT_INPUT)).is_none());
        assert!(registry.collect(&[InputNode::new(CHAT_INPUT)]).fields.is_empty());
    }

    #[test]
    fn test_file_serializer_skips_pending_uploads() {
        let value = file_serializer(&tray(&[Some("id-1"), None, Some("id-3")])).unwrap();
        assert_eq!(value, json!(["id-1", "id-3"]));
        assert!(file_serializer(&InputNode::new(CHAT_INPUT)).is_none());
    }

    #[test]
    fn test_collect_builds_request() {
        let registry = SerializerRegistry::with_defaults();
        let bar = InputNode::new("ChatBar")
            .with_child(tray(&[Some("abc")]))
            .with_child(InputNode::new(CHAT_INPUT).with_markup("Hello<br>world"));

        let input = registry.collect(&[bar]);
        assert_eq!(input.get("chat-input"), Some(&json!("Hello\nworld")));
        assert_eq!(input.get("input-file-area"), Some(&json!(["abc"])));

        let request = ChatRequest::from_input("s-1", &input);
        assert_eq!(
            request,
            ChatRequest {
                session: "s-1".into(),
                message: "Hello\nworld".into(),
                files: vec!["abc".into()],
            }
        );
    }

    #[test]
    fn test_request_defaults_when_fields_missing() {
        let request = ChatRequest::from_input("s", &InputData::default());
        assert_eq!(request.message, "");
        assert!(request.files.is_empty());
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"session": "s", "message": "", "files": []})
        );
    }
}
