//! Conversation data model and in-memory session store.

pub mod ids;
pub mod store;
pub mod types;

pub use ids::{ExchangeId, MessageId, SessionId};
pub use store::{ConversationSnapshot, ExchangeState, SessionStore};
pub use types::{
    AttachmentKind, AttachmentRef, DEFAULT_SESSION_TITLE, Message, Role, Session, SessionSummary,
    derive_title, format_size,
};
