//! Transport seam between a chat session and the chat server.
//!
//! A [`Transport`] knows how to obtain a session id, open the incremental
//! reply stream for a request, and manage file attachments. Everything
//! above it (framing, decoding, assembly) is transport-agnostic.
//!
//! [`HttpTransport`] speaks the reference HTTP protocol:
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | session | `GET /session` | `{"session": "...", ...}` |
//! | stream | `POST /stream` with a [`ChatRequest`] | NDJSON records |
//! | upload | `POST /file` multipart `session`, `file` | JSON string id |
//! | detach | `DELETE /file` form `session`, `file` | ignored |

mod http;

pub use http::HttpTransport;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;
use crate::serialize::ChatRequest;
use crate::stream::ByteStream;

/// What the server reports about a session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session: String,
    /// Display name of the assistant
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub multi_turn: bool,
    #[serde(default)]
    pub file_support: bool,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Session info; implementations fetch it once and reuse it.
    async fn session(&self) -> Result<SessionInfo>;

    /// Open the reply stream for a request.
    ///
    /// Errors returned here happen before any record was read.
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Upload an attachment and return its server-side id.
    async fn upload_file(&self, name: &str, data: Vec<u8>) -> Result<String>;

    /// Release an attachment previously returned by [`upload_file`](Self::upload_file).
    async fn detach_file(&self, _file_id: &str) -> Result<()> {
        Ok(())
    }
}
