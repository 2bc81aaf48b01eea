//! In-memory session store: the active conversation plus archived history.
//!
//! Every operation is total. After each mutation the store publishes a fresh
//! [`ConversationSnapshot`] on a `watch` channel so a renderer can redraw
//! partial text without polling.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::chat::ids::{ExchangeId, MessageId, SessionId};
use crate::chat::types::{Message, Session, SessionSummary};

/// Phase of the active conversation's exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    /// Nothing in flight; submissions are accepted.
    #[default]
    Idle,
    /// User message appended, request issued or reply being prepared.
    Sending,
    /// Placeholder appended, deltas are being folded into it.
    Streaming,
}

/// Read-only view handed to observers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConversationSnapshot {
    /// Active conversation, oldest first.
    pub messages: Vec<Message>,
    /// An exchange is in flight.
    pub pending: bool,
    /// Phase of the in-flight exchange.
    pub state: ExchangeState,
    /// Display name of the selected model.
    pub selected_model: String,
    /// Archived sessions, most recent first.
    pub history: Vec<SessionSummary>,
}

/// Active conversation state and session history.
#[derive(Debug)]
pub struct SessionStore {
    messages: Vec<Message>,
    history: Vec<Session>,
    state: ExchangeState,
    exchange: Option<ExchangeId>,
    selected_model: String,
    publisher: watch::Sender<ConversationSnapshot>,
}

impl SessionStore {
    /// Create an empty store bound to `selected_model`.
    #[must_use]
    pub fn new(selected_model: impl Into<String>) -> Self {
        let selected_model = selected_model.into();
        let (publisher, _) = watch::channel(ConversationSnapshot {
            selected_model: selected_model.clone(),
            ..ConversationSnapshot::default()
        });
        Self {
            messages: Vec::new(),
            history: Vec::new(),
            state: ExchangeState::Idle,
            exchange: None,
            selected_model,
            publisher,
        }
    }

    /// Subscribe to state changes. The receiver starts at the current state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.publisher.subscribe()
    }

    /// Build a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.messages.clone(),
            pending: self.is_pending(),
            state: self.state,
            selected_model: self.selected_model.clone(),
            history: self.history.iter().map(Session::summary).collect(),
        }
    }

    /// Active conversation, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Archived sessions, most recent first.
    #[must_use]
    pub fn history(&self) -> &[Session] {
        &self.history
    }

    /// Whether an exchange is in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state != ExchangeState::Idle
    }

    /// Phase of the in-flight exchange.
    #[must_use]
    pub const fn state(&self) -> ExchangeState {
        self.state
    }

    /// Display name of the selected model.
    #[must_use]
    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Look a message up by identifier.
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Look an archived session up by identifier.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.history.iter().find(|s| s.id == id)
    }

    /// Append a message to the active conversation.
    pub fn append_message(&mut self, message: Message) -> MessageId {
        let id = message.id;
        self.messages.push(message);
        self.publish();
        id
    }

    /// Replace the content of message `id`.
    ///
    /// Returns `false` (and changes nothing) when `id` is no longer in the
    /// active conversation, e.g. after a clear.
    pub fn replace_message_content(&mut self, id: MessageId, content: &str) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            return false;
        };
        content.clone_into(&mut message.content);
        self.publish();
        true
    }

    /// Snapshot the active conversation into history (most recent first).
    ///
    /// The active conversation is left untouched. Returns `None` when it is empty.
    pub fn archive_active(&mut self) -> Option<Session> {
        if self.messages.is_empty() {
            return None;
        }
        let session = Session::archive(&self.messages);
        info!(
            "Archived session {} ({} messages): {}",
            session.id,
            session.messages.len(),
            session.title
        );
        self.history.insert(0, session.clone());
        self.publish();
        Some(session)
    }

    /// Archive (if non-empty) and reset the active conversation.
    ///
    /// Always succeeds, including mid-stream: the in-flight exchange loses
    /// its claim on `pending` and its later deltas find no target.
    pub fn clear(&mut self) -> Option<Session> {
        let archived = self.archive_active();
        self.detach_exchange();
        self.messages.clear();
        self.publish();
        archived
    }

    /// Replace the active conversation with a copy of `session`'s messages.
    ///
    /// The archived entry stays in history. An in-flight exchange is detached
    /// as on [`clear`](Self::clear).
    pub fn load_session(&mut self, session: &Session) {
        self.detach_exchange();
        self.messages = session.messages.clone();
        self.publish();
    }

    /// Load the `index`-th history entry (0 = most recent).
    ///
    /// Returns `false` when the index is out of range.
    pub fn load_history_entry(&mut self, index: usize) -> bool {
        let Some(messages) = self.history.get(index).map(|s| s.messages.clone()) else {
            return false;
        };
        self.detach_exchange();
        self.messages = messages;
        self.publish();
        true
    }

    /// Rebind the selected model.
    pub fn set_selected_model(&mut self, model: impl Into<String>) {
        self.selected_model = model.into();
        self.publish();
    }

    /// Claim `pending` for `exchange`. Returns `false` if one is already in flight.
    pub fn begin_exchange(&mut self, exchange: ExchangeId) -> bool {
        if self.is_pending() {
            return false;
        }
        self.state = ExchangeState::Sending;
        self.exchange = Some(exchange);
        self.publish();
        true
    }

    /// Move `exchange` from sending to streaming. No-op for a stale exchange.
    pub fn mark_streaming(&mut self, exchange: ExchangeId) -> bool {
        if !self.is_current(exchange) {
            return false;
        }
        self.state = ExchangeState::Streaming;
        self.publish();
        true
    }

    /// Whether `exchange` still owns the active conversation.
    #[must_use]
    pub fn is_current(&self, exchange: ExchangeId) -> bool {
        self.exchange == Some(exchange)
    }

    /// Release `pending` if `exchange` still holds it.
    pub fn finish_exchange(&mut self, exchange: ExchangeId) -> bool {
        if !self.is_current(exchange) {
            return false;
        }
        self.exchange = None;
        self.state = ExchangeState::Idle;
        self.publish();
        true
    }

    fn detach_exchange(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            debug!("Detached in-flight exchange {exchange}");
        }
        self.state = ExchangeState::Idle;
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot());
    }
}
