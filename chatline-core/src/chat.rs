//! Chat session controller.
//!
//! [`ChatSession`] ties the pieces together for one conversation: it holds
//! the editor contents and the attachment tray, serializes them into a
//! [`ChatRequest`], opens the reply stream through a [`Transport`], and runs a
//! [`TranscriptAssembler`] over it. Only one exchange runs at a time.
//!
//! Failures are reported twice: as the `Err` of the call, and as a short
//! user-facing message to the error subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::callback::{CallbackRegistry, Subscriber};
use crate::config::TranscriptConfig;
use crate::error::{Error, Result};
use crate::serialize::{
    markup_to_text, ChatRequest, InputData, InputNode, SerializerRegistry, CHAT_INPUT,
    INPUT_FILE, INPUT_FILE_AREA, INPUT_FILE_ID, INPUT_FILE_NAME,
};
use crate::stream::{event_stream, ByteStream};
use crate::transcript::{NullSink, RenderSink, Renderer, TranscriptAssembler};
use crate::transport::Transport;
use crate::types::{Document, Exchange, ExchangeId, Transcript};

/// Reported when the request could not be sent.
pub const SEND_FAILED: &str = "Failed to send message.";
/// Reported when the reply failed while streaming.
pub const PROCESSING_FAILED: &str = "Failure during message processing.";
/// Reported when an attachment upload failed.
pub const ATTACH_FAILED: &str = "Failed to attach file.";

/// A file in the attachment tray.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub name: String,
    /// Server-side id; `None` while the upload is in flight
    pub id: Option<String>,
}

/// Clears the running flag when dropped, so an abandoned send future
/// cannot leave the session locked.
struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct ChatSession {
    transport: Arc<dyn Transport>,
    serializers: SerializerRegistry,
    renderer: Renderer,
    config: TranscriptConfig,
    sink: Box<dyn RenderSink>,
    errors: CallbackRegistry<String>,
    documents: CallbackRegistry<Document>,
    input: String,
    files: Vec<AttachedFile>,
    transcript: Transcript,
    running: Arc<AtomicBool>,
    next_exchange_id: ExchangeId,
}

impl ChatSession {
    /// Session with the default serializer chain, identity rendering and no display.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            serializers: SerializerRegistry::with_defaults(),
            renderer: Renderer::default(),
            config: TranscriptConfig::default(),
            sink: Box::new(NullSink),
            errors: CallbackRegistry::new(),
            documents: CallbackRegistry::new(),
            input: String::new(),
            files: Vec::new(),
            transcript: Transcript::new(),
            running: Arc::new(AtomicBool::new(false)),
            next_exchange_id: 0,
        }
    }

    pub fn with_serializers(mut self, serializers: SerializerRegistry) -> Self {
        self.serializers = serializers;
        self
    }

    pub fn with_renderer(mut self, renderer: Renderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_config(mut self, config: TranscriptConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn RenderSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Subscribe to user-facing error messages.
    pub fn on_error(&mut self, subscriber: Subscriber<String>) -> bool {
        self.errors.register(subscriber)
    }

    /// Subscribe to documents attached to assistant replies.
    pub fn on_document(&mut self, subscriber: Subscriber<Document>) -> bool {
        self.documents.register(subscriber)
    }

    pub fn errors_mut(&mut self) -> &mut CallbackRegistry<String> {
        &mut self.errors
    }

    pub fn documents_mut(&mut self) -> &mut CallbackRegistry<Document> {
        &mut self.documents
    }

    // ============================================
    // Input state
    // ============================================

    /// Replace the editor contents (markup).
    pub fn set_input(&mut self, markup: impl Into<String>) {
        self.input = markup.into();
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn files(&self) -> &[AttachedFile] {
        &self.files
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared handle to the running flag, for displays that gate on it.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Whether a send would go through: idle and non-blank input.
    pub fn can_send(&self) -> bool {
        !self.is_running() && !markup_to_text(&self.input).trim().is_empty()
    }

    /// Widget tree read by the serializer chain.
    pub fn input_nodes(&self) -> Vec<InputNode> {
        let tray = self
            .files
            .iter()
            .fold(InputNode::new(INPUT_FILE_AREA), |area, file| {
                let mut node = InputNode::new(INPUT_FILE).with_attribute(INPUT_FILE_NAME, &file.name);
                if let Some(id) = &file.id {
                    node = node.with_attribute(INPUT_FILE_ID, id);
                }
                area.with_child(node)
            });

        vec![
            InputNode::new("ChatBar")
                .with_child(tray)
                .with_child(InputNode::new(CHAT_INPUT).with_markup(&self.input)),
        ]
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    // ============================================
    // Attachments
    // ============================================

    /// Upload a file and add it to the tray.
    ///
    /// The file shows up in the tray as pending right away. If the upload
    /// fails it is removed again and [`ATTACH_FAILED`] is reported.
    pub async fn attach_file(&mut self, name: &str, data: Vec<u8>) -> Result<String> {
        let slot = self.files.len();
        self.files.push(AttachedFile {
            name: name.to_string(),
            id: None,
        });

        match self.transport.upload_file(name, data).await {
            Ok(id) => {
                self.files[slot].id = Some(id.clone());
                Ok(id)
            }
            Err(e) => {
                tracing::error!(file = %name, error = %e, "Attachment upload failed");
                self.files.remove(slot);
                self.errors.dispatch(&ATTACH_FAILED.to_string());
                Err(e)
            }
        }
    }

    /// Remove an uploaded file from the tray. Pending uploads cannot be removed.
    pub async fn detach_file(&mut self, file_id: &str) -> bool {
        let Some(pos) = self
            .files
            .iter()
            .position(|f| f.id.as_deref() == Some(file_id))
        else {
            return false;
        };
        self.files.remove(pos);

        if let Err(e) = self.transport.detach_file(file_id).await {
            tracing::warn!(file_id = %file_id, error = %e, "Failed to detach file on server");
        }
        true
    }

    // ============================================
    // Send
    // ============================================

    /// Send the current input and stream the reply into the transcript.
    ///
    /// Returns `Ok(None)` without doing anything when [`can_send`](Self::can_send)
    /// is false, and the id of the assistant exchange otherwise.
    pub async fn send(&mut self, cancel: &CancellationToken) -> Result<Option<ExchangeId>> {
        if markup_to_text(&self.input).trim().is_empty() {
            tracing::debug!("Blank input, not sending");
            return Ok(None);
        }
        let Some(_running) = RunningGuard::acquire(&self.running) else {
            tracing::debug!("Exchange already running, not sending");
            return Ok(None);
        };

        let input = self.serializers.collect(&self.input_nodes());
        self.input.clear();
        self.files.clear();

        let (request, stream) = match self.open(&input).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::error!(error = %e, "Failed to send message");
                self.errors.dispatch(&SEND_FAILED.to_string());
                return Err(e);
            }
        };

        self.record_user_message(&request.message);

        let exchange_id = self.next_id();
        let mut assembler =
            TranscriptAssembler::new(exchange_id, &self.config, self.sink.as_mut(), &self.documents)
                .with_renderer(self.renderer.clone());
        let result = assembler.consume(event_stream(stream), cancel).await;
        self.transcript.push(assembler.into_exchange());

        match result {
            Ok(()) => Ok(Some(exchange_id)),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                self.errors.dispatch(&PROCESSING_FAILED.to_string());
                Err(e)
            }
        }
    }

    async fn open(&self, input: &InputData) -> Result<(ChatRequest, ByteStream)> {
        let session = self.transport.session().await?;
        let request = ChatRequest::from_input(session.session, input);
        let stream = self.transport.open_stream(&request).await?;
        Ok((request, stream))
    }

    fn record_user_message(&mut self, message: &str) {
        let exchange = Exchange::user_message(self.next_id(), message);
        self.sink.exchange_started(&exchange);
        for item in exchange.items() {
            self.sink.item_updated(exchange.id, item, &item.content);
        }
        self.sink.exchange_finalized(&exchange);
        self.transcript.push(exchange);
    }

    fn next_id(&mut self) -> ExchangeId {
        let id = self.next_exchange_id;
        self.next_exchange_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::chunked;
    use crate::transport::SessionInfo;
    use crate::types::{ItemId, Role};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const REPLY: &str = concat!(
        r#"{"class":"MessageItemResponseChunk","data":{"type":"text","content":"Some","messageItemID":0,"name":null}}"#,
        "\n",
        r#"{"class":"MessageItemResponse","data":{"type":"tool","content":"tool says hi","messageItemID":1,"name":"Supertool"}}"#,
        "\n",
        r#"{"class":"MessageItemResponseChunk","data":{"type":"text","content":" output","messageItemID":0,"name":null}}"#,
        "\n",
        r#"{"class":"DocumentResponse","data":{"title":"Example Document","content":"Lorem","icon":"📄"}}"#,
        "\n",
    );

    #[derive(Default)]
    struct MockTransport {
        body: Mutex<Option<Vec<u8>>>,
        fail_stream: bool,
        fail_upload: bool,
        requests: Mutex<Vec<ChatRequest>>,
        detached: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn replying(body: &str) -> Self {
            Self {
                body: Mutex::new(Some(body.as_bytes().to_vec())),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn session(&self) -> Result<SessionInfo> {
            Ok(SessionInfo {
                session: "s-1".into(),
                name: None,
                multi_turn: true,
                file_support: true,
            })
        }

        async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_stream {
                return Err(Error::Transport("503 Service Unavailable".into()));
            }
            let body = self.body.lock().unwrap().take().unwrap_or_default();
            Ok(chunked(body, 5))
        }

        async fn upload_file(&self, name: &str, _data: Vec<u8>) -> Result<String> {
            if self.fail_upload {
                return Err(Error::Transport("413 Payload Too Large".into()));
            }
            Ok(format!("id-{}", name))
        }

        async fn detach_file(&self, file_id: &str) -> Result<()> {
            self.detached.lock().unwrap().push(file_id.to_string());
            Ok(())
        }
    }

    fn session_with(transport: MockTransport) -> (ChatSession, Arc<MockTransport>, Arc<Mutex<Vec<String>>>) {
        let transport = Arc::new(transport);
        let mut session = ChatSession::new(transport.clone());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&errors);
        session.on_error(Subscriber::from_fn(move |msg: &String| {
            log.lock().unwrap().push(msg.clone());
        }));
        (session, transport, errors)
    }

    #[test]
    fn test_can_send_gating() {
        let (mut session, _, _) = session_with(MockTransport::default());
        assert!(!session.can_send());

        session.set_input("<br><div> </div>");
        assert!(!session.can_send());

        session.set_input("hello");
        assert!(session.can_send());

        session.running_flag().store(true, Ordering::Release);
        assert!(!session.can_send());
    }

    #[tokio::test]
    async fn test_send_streams_reply_into_transcript() {
        let (mut session, transport, errors) = session_with(MockTransport::replying(REPLY));
        let documents = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&documents);
        session.on_document(Subscriber::from_fn(move |doc: &Document| {
            log.lock().unwrap().push(doc.clone());
        }));

        session.attach_file("data.csv", b"a,b\n1,2\n".to_vec()).await.unwrap();
        session.set_input("What is<br>this?");
        let exchange_id = session.send(&CancellationToken::new()).await.unwrap();

        assert_eq!(exchange_id, Some(1));
        assert!(!session.is_running());
        assert!(session.input().is_empty());
        assert!(session.files().is_empty());
        assert!(errors.lock().unwrap().is_empty());

        let requests = transport.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            ChatRequest {
                session: "s-1".into(),
                message: "What is\nthis?".into(),
                files: vec!["id-data.csv".into()],
            }
        );

        let exchanges = session.transcript().exchanges();
        assert_eq!(exchanges.len(), 2);
        assert_eq!(exchanges[0].role, Role::User);
        assert_eq!(exchanges[0].text(), "What is\nthis?");

        let reply = &exchanges[1];
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.text(), "Some output");
        let tool = reply.get(&ItemId::Wire(1)).unwrap();
        assert_eq!(tool.name.as_deref(), Some("Supertool"));
        assert!(reply.items().all(|i| !i.active));

        let documents = documents.lock().unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].exchange_id, 1);
    }

    #[tokio::test]
    async fn test_blank_input_is_not_sent() {
        let (mut session, transport, _) = session_with(MockTransport::replying(REPLY));
        session.set_input("   ");
        assert_eq!(session.send(&CancellationToken::new()).await.unwrap(), None);
        assert!(transport.requests.lock().unwrap().is_empty());
        assert!(session.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_running_session_does_not_send() {
        let (mut session, transport, _) = session_with(MockTransport::replying(REPLY));
        session.set_input("hello");
        let flag = session.running_flag();
        flag.store(true, Ordering::Release);

        assert_eq!(session.send(&CancellationToken::new()).await.unwrap(), None);
        assert!(transport.requests.lock().unwrap().is_empty());
        // The flag belongs to whoever set it
        assert!(flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_stream_open_failure_reports_send_failure() {
        let (mut session, _, errors) = session_with(MockTransport {
            fail_stream: true,
            ..Default::default()
        });
        session.set_input("hello");

        let err = session.send(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(*errors.lock().unwrap(), vec![SEND_FAILED.to_string()]);
        assert!(session.transcript().is_empty());
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_processing_failure_reports_and_marks_exchange() {
        let body = concat!(
            r#"{"class":"MessageItemResponseChunk","data":{"content":"Hi","messageItemID":0}}"#,
            "\n",
            r#"{"class":"SomethingNew","data":{}}"#,
            "\n",
        );
        let (mut session, _, errors) = session_with(MockTransport::replying(body));
        session.set_input("hello");

        let err = session.send(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownVariant(_)));
        assert_eq!(*errors.lock().unwrap(), vec![PROCESSING_FAILED.to_string()]);

        let reply = session.transcript().last().unwrap();
        assert!(reply.has_error());
        assert_eq!(reply.text(), format!("Hi{}", TranscriptConfig::default().error_text));
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_attach_failure_removes_pending_file() {
        let (mut session, _, errors) = session_with(MockTransport {
            fail_upload: true,
            ..Default::default()
        });

        assert!(session.attach_file("big.csv", vec![0; 16]).await.is_err());
        assert!(session.files().is_empty());
        assert_eq!(*errors.lock().unwrap(), vec![ATTACH_FAILED.to_string()]);
    }

    #[tokio::test]
    async fn test_detach_only_uploaded_files() {
        let (mut session, transport, _) = session_with(MockTransport::default());
        session.attach_file("a.csv", Vec::new()).await.unwrap();
        session.files.push(AttachedFile {
            name: "pending.csv".into(),
            id: None,
        });

        assert!(!session.detach_file("unknown").await);
        assert!(session.detach_file("id-a.csv").await);
        assert_eq!(session.files().len(), 1);
        assert_eq!(*transport.detached.lock().unwrap(), vec!["id-a.csv".to_string()]);

        // Pending file is still serialized without an id
        let input = session.serializers.collect(&session.input_nodes());
        assert_eq!(input.files(), Vec::<String>::new());
    }

    #[tokio::test]
    async fn test_pre_cancelled_send_keeps_partial_exchange_without_error() {
        let (mut session, _, errors) = session_with(MockTransport::replying(REPLY));
        session.set_input("hello");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = session.send(&cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(errors.lock().unwrap().is_empty());
        let reply = session.transcript().last().unwrap();
        assert!(!reply.has_error());
        assert!(!session.is_running());
    }
}
