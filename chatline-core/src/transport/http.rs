//! reqwest-based [`Transport`] for the reference chat server.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::multipart::{Form, Part};
use tokio::sync::OnceCell;

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::serialize::ChatRequest;
use crate::stream::ByteStream;

use super::{SessionInfo, Transport};

/// HTTP client for the chat server.
///
/// The session is fetched lazily on first use and cached for the lifetime
/// of the transport.
pub struct HttpTransport {
    config: ServerConfig,
    http_client: reqwest::Client,
    session: OnceCell<SessionInfo>,
}

impl HttpTransport {
    /// Create a transport from configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        // No overall timeout: reply streams stay open as long as the server writes.
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
            session: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    async fn fetch_session(&self) -> Result<SessionInfo> {
        let url = self.config.url(&self.config.session_path);
        tracing::debug!(url = %url, "Fetching session");

        let response = self
            .http_client
            .get(&url)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("session request failed: {}", e)))?;
        let response = check_status(response, "session").await?;

        let info: SessionInfo = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("failed to parse session response: {}", e)))?;
        tracing::info!(session = %info.session, "Session established");
        Ok(info)
    }
}

/// Turn a non-success response into a transport error carrying the body.
async fn check_status(response: reqwest::Response, call: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    Err(Error::Transport(format!(
        "{} failed ({}): {}",
        call, status, error_text
    )))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn session(&self) -> Result<SessionInfo> {
        self.session
            .get_or_try_init(|| self.fetch_session())
            .await
            .cloned()
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
        let url = self.config.url(&self.config.stream_path);
        tracing::debug!(
            url = %url,
            files = request.files.len(),
            "Opening reply stream"
        );

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("stream request failed: {}", e)))?;
        let response = check_status(response, "stream").await?;

        let body = response
            .bytes_stream()
            .map_err(|e| Error::Transport(format!("reply stream broken: {}", e)));
        Ok(Box::pin(body))
    }

    async fn upload_file(&self, name: &str, data: Vec<u8>) -> Result<String> {
        let session = self.session().await?;
        let url = self.config.url(&self.config.file_path);
        let size = data.len();

        let form = Form::new()
            .text("session", session.session)
            .part("file", Part::bytes(data).file_name(name.to_string()));

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("upload request failed: {}", e)))?;
        let response = check_status(response, "upload").await?;

        let file_id: String = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("failed to parse upload response: {}", e)))?;
        tracing::info!(file = %name, size, file_id = %file_id, "File uploaded");
        Ok(file_id)
    }

    async fn detach_file(&self, file_id: &str) -> Result<()> {
        let session = self.session().await?;
        let url = self.config.url(&self.config.file_path);

        let response = self
            .http_client
            .delete(&url)
            .form(&[("session", session.session.as_str()), ("file", file_id)])
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("detach request failed: {}", e)))?;
        check_status(response, "detach").await?;

        tracing::debug!(file_id = %file_id, "File detached");
        Ok(())
    }
}
