//! Outbound side of an exchange: the request contract and the transport seam.
//!
//! The controller only sees [`ChatTransport`]; the hosted endpoint is one
//! implementation ([`HttpChatTransport`]), tests plug in their own.

pub mod http;
pub mod transcription;

pub use http::HttpChatTransport;
pub use transcription::TranscriptionClient;

use std::future::Future;
use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::chat::types::{Message, Role};
use crate::error::ChatResult;

/// Boxed future type for transport operations.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Response body as it arrives: raw chunks with arbitrary boundaries.
pub type ByteStream = Pin<Box<dyn Stream<Item = ChatResult<Vec<u8>>> + Send>>;

/// One history entry on the wire. Attachments are never sent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    /// Author.
    pub role: Role,
    /// Text body.
    pub content: String,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Body of the streaming completion request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Remote model identifier.
    pub model: String,
    /// Full conversation history including the new user turn.
    pub messages: Vec<WireMessage>,
    /// Always `true`.
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Build a streaming request from the active conversation.
    #[must_use]
    pub fn from_history(model: impl Into<String>, history: &[Message]) -> Self {
        Self {
            model: model.into(),
            messages: history.iter().map(WireMessage::from).collect(),
            stream: true,
        }
    }
}

/// Transport seam used by the conversation controller.
pub trait ChatTransport: Send + Sync {
    /// Issue the request and hand back the body stream once a success status arrived.
    ///
    /// # Errors
    /// Returns an error on network failure or a non-success status.
    fn open_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> TransportFuture<'_, ChatResult<ByteStream>>;
}
