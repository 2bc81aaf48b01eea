//! Conversation controller: drives one exchange at a time.
//!
//! A submission walks `Idle → Sending → Streaming → Idle` for network
//! models and `Idle → Sending → Idle` for simulated ones. Every exchange
//! carries an [`ExchangeId`]; once a clear or a session load detaches it,
//! its remaining deltas, its error reply and its completion are all
//! discarded.

use std::sync::Arc;

use futures::StreamExt;
use rand::Rng;
use tokio::sync::{RwLock, watch};
use tracing::{debug, error, info, warn};

use crate::chat::{
    AttachmentRef, ConversationSnapshot, ExchangeId, Message, MessageId, Session, SessionId,
    SessionStore,
};
use crate::config::{ChatConfig, SimulatedConfig};
use crate::error::{ChatError, ChatResult};
use crate::models::{ModelBinding, ModelCatalog};
use crate::stream::{DeltaAssembler, Fold, decode_lines};
use crate::transport::{ChatCompletionRequest, ChatTransport, HttpChatTransport};

/// Why a submission was refused without touching the conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitRejection {
    /// Another exchange is still in flight.
    Pending,
    /// Blank text and no attachments.
    Empty,
}

impl std::fmt::Display for SubmitRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("a reply is still being generated"),
            Self::Empty => f.write_str("nothing to send"),
        }
    }
}

/// How a submission ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The streamed reply reached `[DONE]` or end of body.
    Completed {
        /// Assistant message holding the reply.
        message: MessageId,
        /// Malformed frames skipped along the way.
        dropped_frames: usize,
    },
    /// A canned reply was appended for a simulated model.
    Simulated {
        /// Assistant message holding the reply.
        message: MessageId,
    },
    /// The exchange failed and the error reply was rendered.
    Failed {
        /// Assistant message holding the error reply.
        message: MessageId,
        /// Underlying cause, for logs.
        cause: String,
    },
    /// A clear or a session load detached the exchange before it finished.
    Cancelled,
    /// Nothing was sent.
    Rejected(SubmitRejection),
}

/// Front door for the conversation.
///
/// Cheap to clone; clones share the same store, so a clear issued from one
/// handle cancels a submission running on another.
#[derive(Clone)]
pub struct ConversationController {
    store: Arc<RwLock<SessionStore>>,
    observer: watch::Receiver<ConversationSnapshot>,
    transport: Arc<dyn ChatTransport>,
    catalog: Arc<ModelCatalog>,
    simulated: Arc<SimulatedConfig>,
    error_reply: Arc<str>,
}

impl std::fmt::Debug for ConversationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationController")
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl ConversationController {
    /// Create a controller over an arbitrary transport.
    #[must_use]
    pub fn new(config: &ChatConfig, transport: Arc<dyn ChatTransport>) -> Self {
        let store = SessionStore::new(config.models.default_model.clone());
        let observer = store.subscribe();
        Self {
            store: Arc::new(RwLock::new(store)),
            observer,
            transport,
            catalog: Arc::new(ModelCatalog::new(&config.models)),
            simulated: Arc::new(config.simulated.clone()),
            error_reply: Arc::from(config.error_reply.as_str()),
        }
    }

    /// Validate `config` and wire the hosted HTTP transport.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the client cannot be built.
    pub fn from_config(config: &ChatConfig) -> ChatResult<Self> {
        config.validate()?;
        let transport = HttpChatTransport::new(&config.api)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    /// Observe state changes. Every delta publishes a new snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.observer.clone()
    }

    /// Current state.
    pub async fn snapshot(&self) -> ConversationSnapshot {
        self.store.read().await.snapshot()
    }

    /// Whether an exchange is in flight.
    pub async fn is_pending(&self) -> bool {
        self.store.read().await.is_pending()
    }

    /// The model catalog.
    #[must_use]
    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Rebind the conversation to another catalog entry.
    ///
    /// Takes effect on the next submission.
    ///
    /// # Errors
    /// Returns [`ChatError::UnknownModel`] for names outside the catalog.
    pub async fn select_model(&self, name: &str) -> ChatResult<()> {
        if !self.catalog.contains(name) {
            return Err(ChatError::UnknownModel(name.to_string()));
        }
        info!("Selected model {name}");
        self.store.write().await.set_selected_model(name);
        Ok(())
    }

    /// Archive the active conversation (if any) and start a fresh one.
    ///
    /// Safe while an exchange is streaming.
    pub async fn clear(&self) -> Option<Session> {
        self.store.write().await.clear()
    }

    /// Load an archived session by identifier. Returns `false` if unknown.
    ///
    /// Like [`clear`](Self::clear), this detaches an in-flight exchange.
    pub async fn load_session(&self, id: SessionId) -> bool {
        let mut store = self.store.write().await;
        let Some(session) = store.session(id).cloned() else {
            return false;
        };
        store.load_session(&session);
        true
    }

    /// Load the `index`-th history entry (0 = most recent).
    pub async fn load_history_entry(&self, index: usize) -> bool {
        self.store.write().await.load_history_entry(index)
    }

    /// Submit one user turn and drive the reply to completion.
    ///
    /// Never fails: transport and decode errors become an assistant
    /// message carrying the configured error reply.
    pub async fn submit(
        &self,
        text: impl Into<String>,
        attachments: Vec<AttachmentRef>,
    ) -> ExchangeOutcome {
        let text = text.into();
        if text.trim().is_empty() && attachments.is_empty() {
            return ExchangeOutcome::Rejected(SubmitRejection::Empty);
        }

        let exchange = ExchangeId::fresh();
        let (binding, history) = {
            let mut store = self.store.write().await;
            if !store.begin_exchange(exchange) {
                debug!("Submission refused: exchange already in flight");
                return ExchangeOutcome::Rejected(SubmitRejection::Pending);
            }
            store.append_message(Message::user(text, attachments));
            (
                self.catalog.resolve(store.selected_model()),
                store.messages().to_vec(),
            )
        };

        match binding {
            ModelBinding::Network { remote_id } => {
                info!(
                    "Exchange {exchange} started on {remote_id} with {} messages",
                    history.len()
                );
                let request = ChatCompletionRequest::from_history(remote_id, &history);
                self.stream_reply(exchange, request).await
            }
            ModelBinding::Simulated => {
                info!("Exchange {exchange} started on a simulated model");
                self.simulate_reply(exchange).await
            }
        }
    }

    async fn stream_reply(
        &self,
        exchange: ExchangeId,
        request: ChatCompletionRequest,
    ) -> ExchangeOutcome {
        let body = match self.transport.open_stream(request).await {
            Ok(body) => body,
            Err(err) => return self.fail(exchange, &err).await,
        };

        let placeholder = {
            let mut store = self.store.write().await;
            if !store.mark_streaming(exchange) {
                debug!("Exchange {exchange} detached before the first byte");
                return ExchangeOutcome::Cancelled;
            }
            store.append_message(Message::placeholder())
        };

        let mut assembler = DeltaAssembler::new();
        let mut detached = false;
        let mut lines = std::pin::pin!(decode_lines(body));

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(err) if detached => {
                    debug!("Detached exchange {exchange} ended with: {err}");
                    self.store.write().await.finish_exchange(exchange);
                    return ExchangeOutcome::Cancelled;
                }
                Err(err) => return self.fail(exchange, &err).await,
            };

            match assembler.fold(&line) {
                Fold::Appended if !detached => {
                    let mut store = self.store.write().await;
                    if !store.is_current(exchange)
                        || !store.replace_message_content(placeholder, assembler.text())
                    {
                        debug!("Exchange {exchange} detached; draining the rest of the body");
                        store.finish_exchange(exchange);
                        detached = true;
                    }
                }
                Fold::Finished => break,
                Fold::Appended | Fold::Unchanged | Fold::Dropped => {}
            }
        }

        if !self.store.write().await.finish_exchange(exchange) {
            return ExchangeOutcome::Cancelled;
        }
        info!(
            "Exchange {exchange} completed with {} chars",
            assembler.text().chars().count()
        );
        ExchangeOutcome::Completed {
            message: placeholder,
            dropped_frames: assembler.dropped(),
        }
    }

    async fn simulate_reply(&self, exchange: ExchangeId) -> ExchangeOutcome {
        tokio::time::sleep(self.simulated.delay).await;
        let reply = canned_reply(&self.simulated);

        let mut store = self.store.write().await;
        if !store.is_current(exchange) {
            debug!("Simulated exchange {exchange} detached during its delay");
            return ExchangeOutcome::Cancelled;
        }
        let message = store.append_message(reply);
        store.finish_exchange(exchange);
        ExchangeOutcome::Simulated { message }
    }

    async fn fail(&self, exchange: ExchangeId, err: &ChatError) -> ExchangeOutcome {
        let mut store = self.store.write().await;
        if !store.is_current(exchange) {
            warn!("Detached exchange {exchange} failed: {err}");
            return ExchangeOutcome::Cancelled;
        }
        error!("Exchange {exchange} failed: {err}");
        let message = store.append_message(Message::assistant(self.error_reply.as_ref()));
        store.finish_exchange(exchange);
        ExchangeOutcome::Failed {
            message,
            cause: err.to_string(),
        }
    }
}

/// Pick a canned reply and maybe attach the sample assets.
fn canned_reply(config: &SimulatedConfig) -> Message {
    let mut rng = rand::thread_rng();
    let content = if config.replies.is_empty() {
        String::new()
    } else {
        config.replies[rng.gen_range(0..config.replies.len())].clone()
    };
    let message = Message::assistant(content);
    if rng.gen_range(0.0..1.0) < config.attachment_probability {
        message.with_attachments(config.attachments.clone())
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::stream;
    use tokio::sync::{Mutex, mpsc};
    use tokio::task::JoinHandle;

    use super::*;
    use crate::chat::{ExchangeState, Role};
    use crate::transport::{ByteStream, TransportFuture};

    const NETWORK_MODEL: &str = "Llama 4 Maverick";
    const SIMULATED_MODEL: &str = "Claude 4.5 Sonnet";

    /// Replays canned chunks and records every request.
    struct ScriptedTransport {
        chunks: Vec<ChatResult<Vec<u8>>>,
        requests: Mutex<Vec<ChatCompletionRequest>>,
    }

    impl ScriptedTransport {
        fn new(chunks: Vec<ChatResult<Vec<u8>>>) -> Arc<Self> {
            Arc::new(Self {
                chunks,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChatTransport for ScriptedTransport {
        fn open_stream(
            &self,
            request: ChatCompletionRequest,
        ) -> TransportFuture<'_, ChatResult<ByteStream>> {
            Box::pin(async move {
                self.requests.lock().await.push(request);
                let chunks: Vec<ChatResult<Vec<u8>>> = self
                    .chunks
                    .iter()
                    .map(|chunk| match chunk {
                        Ok(bytes) => Ok(bytes.clone()),
                        Err(err) => Err(ChatError::Transport(err.to_string())),
                    })
                    .collect();
                Ok(Box::pin(stream::iter(chunks)) as ByteStream)
            })
        }
    }

    /// Always refuses with the given status.
    struct RefusingTransport(u16);

    impl ChatTransport for RefusingTransport {
        fn open_stream(
            &self,
            _request: ChatCompletionRequest,
        ) -> TransportFuture<'_, ChatResult<ByteStream>> {
            let status = self.0;
            Box::pin(async move { Err(ChatError::Status(status)) })
        }
    }

    /// Body fed by the test through a channel.
    struct ChannelTransport {
        body: Mutex<Option<mpsc::UnboundedReceiver<ChatResult<Vec<u8>>>>>,
    }

    impl ChatTransport for ChannelTransport {
        fn open_stream(
            &self,
            _request: ChatCompletionRequest,
        ) -> TransportFuture<'_, ChatResult<ByteStream>> {
            Box::pin(async move {
                let rx = self
                    .body
                    .lock()
                    .await
                    .take()
                    .ok_or_else(|| ChatError::Transport("body already taken".to_string()))?;
                let body = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|chunk| (chunk, rx))
                });
                Ok(Box::pin(body) as ByteStream)
            })
        }
    }

    fn channel_transport() -> (Arc<ChannelTransport>, mpsc::UnboundedSender<ChatResult<Vec<u8>>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(ChannelTransport {
            body: Mutex::new(Some(rx)),
        });
        (transport, tx)
    }

    fn config() -> ChatConfig {
        ChatConfig::new()
            .with_default_model(NETWORK_MODEL)
            .with_simulated_delay(Duration::from_millis(20))
    }

    fn frame(content: &str) -> Vec<u8> {
        format!("data: {}\n", serde_json::json!({ "choices": [{ "delta": { "content": content } }] }))
            .into_bytes()
    }

    async fn wait_for(
        rx: &mut watch::Receiver<ConversationSnapshot>,
        ready: impl Fn(&ConversationSnapshot) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(ready))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_streamed_reply_end_to_end() {
        let transport = ScriptedTransport::new(vec![
            Ok(b"dat".to_vec()),
            Ok(b"a: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\ndata: {\"ch".to_vec()),
            Ok(b"oices\":[{\"delta\":{\"content\":\" there\"}}]}\ndata: [DONE]\n".to_vec()),
        ]);
        let controller = ConversationController::new(&config(), transport.clone());

        let outcome = controller.submit("Hello", Vec::new()).await;
        assert!(matches!(
            outcome,
            ExchangeOutcome::Completed { dropped_frames: 0, .. }
        ));

        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.state, ExchangeState::Idle);
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].role, Role::User);
        assert_eq!(snap.messages[0].content, "Hello");
        assert_eq!(snap.messages[1].role, Role::Assistant);
        assert_eq!(snap.messages[1].content, "Hi there");

        let requests = transport.requests.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "Llama-4-Maverick-17B-128E-Instruct");
        assert_eq!(requests[0].messages.len(), 1);
        assert!(requests[0].stream);
    }

    #[tokio::test]
    async fn test_request_carries_full_history() {
        let transport = ScriptedTransport::new(vec![Ok(frame("ok")), Ok(b"data: [DONE]\n".to_vec())]);
        let controller = ConversationController::new(&config(), transport.clone());

        controller.submit("one", Vec::new()).await;
        controller.submit("two", Vec::new()).await;

        let requests = transport.requests.lock().await;
        let roles: Vec<_> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(requests[1].messages[1].content, "ok");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() {
        let transport = ScriptedTransport::new(vec![
            Ok(frame("A")),
            Ok(b"data: {not json\n".to_vec()),
            Ok(frame("B")),
            Ok(b"data: [DONE]\n".to_vec()),
        ]);
        let controller = ConversationController::new(&config(), transport);

        let outcome = controller.submit("go", Vec::new()).await;
        assert!(matches!(
            outcome,
            ExchangeOutcome::Completed { dropped_frames: 1, .. }
        ));
        assert_eq!(controller.snapshot().await.messages[1].content, "AB");
    }

    #[tokio::test]
    async fn test_lines_after_done_are_ignored() {
        let transport = ScriptedTransport::new(vec![Ok(
            [frame("done"), b"data: [DONE]\n".to_vec(), frame(" extra")].concat(),
        )]);
        let controller = ConversationController::new(&config(), transport);

        controller.submit("go", Vec::new()).await;
        assert_eq!(controller.snapshot().await.messages[1].content, "done");
    }

    #[tokio::test]
    async fn test_body_end_without_done_completes() {
        let transport = ScriptedTransport::new(vec![Ok(frame("partial")), Ok(b"data: {\"cho".to_vec())]);
        let controller = ConversationController::new(&config(), transport);

        let outcome = controller.submit("go", Vec::new()).await;
        assert!(matches!(outcome, ExchangeOutcome::Completed { .. }));
        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.messages[1].content, "partial");
    }

    #[tokio::test]
    async fn test_status_error_renders_error_reply() {
        let controller =
            ConversationController::new(&config(), Arc::new(RefusingTransport(500)));

        let outcome = controller.submit("Hello", Vec::new()).await;
        assert!(
            matches!(&outcome, ExchangeOutcome::Failed { cause, .. } if cause.contains("500")),
            "{outcome:?}"
        );

        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[1].role, Role::Assistant);
        assert_eq!(snap.messages[1].content, ChatConfig::default().error_reply);
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_text() {
        let transport = ScriptedTransport::new(vec![
            Ok(frame("Hal")),
            Err(ChatError::Transport("connection reset".to_string())),
        ]);
        let controller = ConversationController::new(&config(), transport);

        let outcome = controller.submit("Hello", Vec::new()).await;
        assert!(matches!(outcome, ExchangeOutcome::Failed { .. }));

        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.messages.len(), 3);
        assert_eq!(snap.messages[1].content, "Hal");
        assert_eq!(snap.messages[2].content, ChatConfig::default().error_reply);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_pending() {
        let (transport, tx) = channel_transport();
        let controller = ConversationController::new(&config(), transport);

        assert_eq!(
            controller.submit("   ", Vec::new()).await,
            ExchangeOutcome::Rejected(SubmitRejection::Empty)
        );

        let mut rx = controller.subscribe();
        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("first", Vec::new()).await }
        });
        wait_for(&mut rx, |snap| snap.state == ExchangeState::Streaming).await;

        assert_eq!(
            controller.submit("second", Vec::new()).await,
            ExchangeOutcome::Rejected(SubmitRejection::Pending)
        );
        assert_eq!(controller.snapshot().await.messages.len(), 2);

        tx.send(Ok(b"data: [DONE]\n".to_vec())).unwrap();
        assert!(matches!(
            running.await.unwrap(),
            ExchangeOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_attachment_only_submission_is_accepted() {
        let controller = ConversationController::new(
            &config().with_default_model(SIMULATED_MODEL),
            ScriptedTransport::new(Vec::new()),
        );
        let attachment = AttachmentRef::from_upload("image/png", "cat.png", 2048, None);

        let outcome = controller.submit("", vec![attachment.clone()]).await;
        assert!(matches!(outcome, ExchangeOutcome::Simulated { .. }));
        assert_eq!(controller.snapshot().await.messages[0].attachments, vec![attachment]);
    }

    #[tokio::test]
    async fn test_partial_text_is_published_per_delta() {
        let (transport, tx) = channel_transport();
        let controller = ConversationController::new(&config(), transport);
        let mut rx = controller.subscribe();

        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("Hello", Vec::new()).await }
        });

        tx.send(Ok(frame("Hi"))).unwrap();
        wait_for(&mut rx, |snap| {
            snap.messages.get(1).is_some_and(|m| m.content == "Hi")
        })
        .await;
        assert!(rx.borrow().pending);

        tx.send(Ok(frame(" there"))).unwrap();
        tx.send(Ok(b"data: [DONE]\n".to_vec())).unwrap();
        running.await.unwrap();

        wait_for(&mut rx, |snap| !snap.pending).await;
        assert_eq!(rx.borrow().messages[1].content, "Hi there");
    }

    #[tokio::test]
    async fn test_clear_while_streaming_discards_late_deltas() {
        let (transport, tx) = channel_transport();
        let controller = ConversationController::new(&config(), transport);
        let mut rx = controller.subscribe();

        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("Hello", Vec::new()).await }
        });
        tx.send(Ok(frame("Hi"))).unwrap();
        wait_for(&mut rx, |snap| {
            snap.messages.get(1).is_some_and(|m| m.content == "Hi")
        })
        .await;

        let archived = controller.clear().await.unwrap();
        assert_eq!(archived.title, "Hello");
        assert_eq!(archived.messages.len(), 2);
        assert_eq!(archived.messages[1].content, "Hi");

        let snap = controller.snapshot().await;
        assert!(snap.messages.is_empty());
        assert!(!snap.pending);

        tx.send(Ok(frame(" there"))).unwrap();
        tx.send(Err(ChatError::Transport("reset".to_string()))).unwrap();
        assert_eq!(running.await.unwrap(), ExchangeOutcome::Cancelled);

        let snap = controller.snapshot().await;
        assert!(snap.messages.is_empty());
        assert!(!snap.pending);
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].message_count, 2);
    }

    #[tokio::test]
    async fn test_clear_then_new_submission_is_not_corrupted() {
        let (transport, old_tx) = channel_transport();
        let controller = ConversationController::new(&config(), transport);
        let mut rx = controller.subscribe();

        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("old", Vec::new()).await }
        });
        wait_for(&mut rx, |snap| snap.state == ExchangeState::Streaming).await;
        controller.clear().await;

        controller
            .select_model(SIMULATED_MODEL)
            .await
            .unwrap();
        let fresh = controller.submit("new", Vec::new()).await;
        assert!(matches!(fresh, ExchangeOutcome::Simulated { .. }));

        old_tx.send(Ok(frame("stale"))).unwrap();
        old_tx.send(Ok(b"data: [DONE]\n".to_vec())).unwrap();
        assert_eq!(running.await.unwrap(), ExchangeOutcome::Cancelled);

        let snap = controller.snapshot().await;
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[0].content, "new");
        assert!(snap.messages.iter().all(|m| m.content != "stale"));
    }

    #[tokio::test]
    async fn test_simulated_model_replies_after_delay() {
        let transport = ScriptedTransport::new(Vec::new());
        let controller = ConversationController::new(
            &config().with_default_model(SIMULATED_MODEL),
            transport.clone(),
        );

        let outcome = controller.submit("Hi", Vec::new()).await;
        assert!(matches!(outcome, ExchangeOutcome::Simulated { .. }));
        assert!(transport.requests.lock().await.is_empty());

        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.messages.len(), 2);
        assert_eq!(snap.messages[1].role, Role::Assistant);
        assert!(
            ChatConfig::default()
                .simulated
                .replies
                .contains(&snap.messages[1].content)
        );
    }

    #[tokio::test]
    async fn test_simulated_attachments_follow_probability() {
        let always = config()
            .with_default_model(SIMULATED_MODEL)
            .with_attachment_probability(1.0);
        let controller = ConversationController::new(&always, ScriptedTransport::new(Vec::new()));
        controller.submit("Hi", Vec::new()).await;
        assert_eq!(controller.snapshot().await.messages[1].attachments.len(), 2);

        let never = config()
            .with_default_model(SIMULATED_MODEL)
            .with_attachment_probability(0.0);
        let controller = ConversationController::new(&never, ScriptedTransport::new(Vec::new()));
        controller.submit("Hi", Vec::new()).await;
        assert!(controller.snapshot().await.messages[1].attachments.is_empty());
    }

    #[tokio::test]
    async fn test_clear_during_simulated_delay() {
        let slow = config()
            .with_default_model(SIMULATED_MODEL)
            .with_simulated_delay(Duration::from_millis(200));
        let controller = ConversationController::new(&slow, ScriptedTransport::new(Vec::new()));
        let mut rx = controller.subscribe();

        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("Hi", Vec::new()).await }
        });
        wait_for(&mut rx, |snap| snap.pending).await;
        controller.clear().await;

        assert_eq!(running.await.unwrap(), ExchangeOutcome::Cancelled);
        assert!(controller.snapshot().await.messages.is_empty());
    }

    #[tokio::test]
    async fn test_select_model_validates_catalog() {
        let controller = ConversationController::new(&config(), ScriptedTransport::new(Vec::new()));

        let err = controller.select_model("GPT-9").await.unwrap_err();
        assert!(matches!(err, ChatError::UnknownModel(name) if name == "GPT-9"));
        assert_eq!(controller.snapshot().await.selected_model, NETWORK_MODEL);

        controller.select_model("DeepSeek V3.1").await.unwrap();
        assert_eq!(controller.snapshot().await.selected_model, "DeepSeek V3.1");
    }

    #[tokio::test]
    async fn test_load_history_entry_restores_messages() {
        let controller = ConversationController::new(
            &config().with_default_model(SIMULATED_MODEL),
            ScriptedTransport::new(Vec::new()),
        );
        controller.submit("remember me", Vec::new()).await;
        let archived = controller.clear().await.unwrap();

        assert!(!controller.load_history_entry(3).await);
        assert!(controller.load_session(archived.id).await);
        let snap = controller.snapshot().await;
        assert_eq!(snap.messages, archived.messages);
        assert_eq!(snap.history.len(), 1);
    }

    /// Archive one simulated exchange, then start streaming on the network model.
    async fn streaming_after_archive(
        controller: &ConversationController,
        tx: &mpsc::UnboundedSender<ChatResult<Vec<u8>>>,
    ) -> (Session, JoinHandle<ExchangeOutcome>) {
        controller.select_model(SIMULATED_MODEL).await.unwrap();
        controller.submit("earlier", Vec::new()).await;
        let archived = controller.clear().await.unwrap();
        controller.select_model(NETWORK_MODEL).await.unwrap();

        let mut rx = controller.subscribe();
        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("live", Vec::new()).await }
        });
        tx.send(Ok(frame("Hi"))).unwrap();
        wait_for(&mut rx, |snap| {
            snap.messages.get(1).is_some_and(|m| m.content == "Hi")
        })
        .await;
        (archived, running)
    }

    #[tokio::test]
    async fn test_load_while_streaming_releases_pending() {
        let (transport, tx) = channel_transport();
        let controller = ConversationController::new(&config(), transport);
        let (archived, running) = streaming_after_archive(&controller, &tx).await;

        assert!(controller.load_history_entry(0).await);
        assert!(!controller.is_pending().await);

        tx.send(Ok(frame(" more"))).unwrap();
        tx.send(Err(ChatError::Transport("reset".to_string()))).unwrap();
        assert_eq!(running.await.unwrap(), ExchangeOutcome::Cancelled);

        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.state, ExchangeState::Idle);
        assert_eq!(snap.messages, archived.messages);

        controller.select_model(SIMULATED_MODEL).await.unwrap();
        let next = controller.submit("after load", Vec::new()).await;
        assert!(matches!(next, ExchangeOutcome::Simulated { .. }));
        assert_eq!(controller.snapshot().await.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_load_session_while_streaming_then_error() {
        let (transport, tx) = channel_transport();
        let controller = ConversationController::new(&config(), transport);
        let (archived, running) = streaming_after_archive(&controller, &tx).await;

        assert!(controller.load_session(archived.id).await);
        tx.send(Err(ChatError::Transport("reset".to_string()))).unwrap();
        assert_eq!(running.await.unwrap(), ExchangeOutcome::Cancelled);

        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.messages, archived.messages);
        assert!(
            snap.messages
                .iter()
                .all(|m| m.content != ChatConfig::default().error_reply)
        );
    }

    #[tokio::test]
    async fn test_load_during_simulated_delay() {
        let slow = config()
            .with_default_model(SIMULATED_MODEL)
            .with_simulated_delay(Duration::from_millis(200));
        let controller = ConversationController::new(&slow, ScriptedTransport::new(Vec::new()));
        controller.submit("earlier", Vec::new()).await;
        let archived = controller.clear().await.unwrap();

        let mut rx = controller.subscribe();
        let running = tokio::spawn({
            let controller = controller.clone();
            async move { controller.submit("waiting", Vec::new()).await }
        });
        wait_for(&mut rx, |snap| snap.pending).await;
        assert!(controller.load_history_entry(0).await);

        assert_eq!(running.await.unwrap(), ExchangeOutcome::Cancelled);
        let snap = controller.snapshot().await;
        assert!(!snap.pending);
        assert_eq!(snap.messages, archived.messages);

        let next = controller.submit("again", Vec::new()).await;
        assert!(matches!(next, ExchangeOutcome::Simulated { .. }));
    }
}
