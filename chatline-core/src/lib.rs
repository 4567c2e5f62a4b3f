//! # chatline-core
//!
//! Core library for chatline - a streaming chat client.
//!
//! This library provides:
//! - NDJSON framing and typed decoding of a chat server's reply stream
//! - Incremental transcript assembly with error recovery
//! - Fault-isolating callbacks for errors and attached documents
//! - A pluggable serializer chain building request payloads from input widgets
//! - An HTTP transport, configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! A reply flows through three layers:
//! - **Wire:** byte chunks from a [`Transport`], split into records by [`FrameDecoder`]
//! - **Events:** each record resolved to a closed [`Event`] enum by [`decode_record`]
//! - **Transcript:** events folded into an [`Exchange`] by a [`TranscriptAssembler`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chatline_core::{ChatSession, Config, HttpTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> chatline_core::Result<()> {
//! let config = Config::load()?;
//! let transport = HttpTransport::new(config.server.clone())?;
//!
//! let mut session = ChatSession::new(Arc::new(transport)).with_config(config.transcript);
//! session.set_input("Hello!");
//! session.send(&CancellationToken::new()).await?;
//!
//! for exchange in session.transcript().exchanges() {
//!     println!("{}: {}", exchange.role, exchange.text());
//! }
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use callback::{CallbackRegistry, Subscriber};
pub use chat::ChatSession;
pub use config::Config;
pub use error::{Error, Result};
pub use serialize::{ChatRequest, InputNode, SerializerRegistry};
pub use stream::{decode_record, Event, FrameDecoder};
pub use transcript::{AssemblerState, RenderSink, Renderer, TranscriptAssembler};
pub use transport::{HttpTransport, Transport};
pub use types::*;

// Public modules
pub mod callback;
pub mod chat;
pub mod config;
pub mod error;
pub mod logging;
pub mod serialize;
pub mod stream;
pub mod transcript;
pub mod transport;
pub mod types;
