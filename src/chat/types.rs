//! Message, attachment and session model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ids::{MessageId, SessionId};

/// Title used when an archived conversation does not open with a user message.
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Number of characters of the first user message kept as the session title.
pub const TITLE_CHARS: usize = 30;

/// Author of a message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// User input.
    User,
    /// Model reply (streamed, simulated or synthetic error).
    Assistant,
}

impl Role {
    /// Stable wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            _ => Err(value.to_string()),
        }
    }
}

/// Kind of an attached file.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Raster image; may carry a preview URL.
    Image,
    /// Plain text or anything not otherwise recognised.
    Text,
    /// PDF document.
    Pdf,
}

impl AttachmentKind {
    /// Classify an upload from its MIME type.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("image/") {
            Self::Image
        } else if mime.contains("pdf") {
            Self::Pdf
        } else {
            Self::Text
        }
    }

    /// Short lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::Pdf => "pdf",
        }
    }
}

/// Reference to a file attached to a message. Read-only once built.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// File kind.
    pub kind: AttachmentKind,
    /// File name as shown to the user.
    pub name: String,
    /// Human-readable size, e.g. `1.2 MB`.
    pub size_label: String,
    /// Optional short description.
    pub description: Option<String>,
    /// Preview location (images only).
    pub source_url: Option<String>,
}

impl AttachmentRef {
    /// Build a reference with no description and no preview URL.
    #[must_use]
    pub fn new(kind: AttachmentKind, name: impl Into<String>, size_label: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            size_label: size_label.into(),
            description: None,
            source_url: None,
        }
    }

    /// Build a reference for a freshly uploaded file.
    ///
    /// The preview URL is only kept for images.
    #[must_use]
    pub fn from_upload(
        mime: &str,
        name: impl Into<String>,
        size_bytes: u64,
        source_url: Option<String>,
    ) -> Self {
        let kind = AttachmentKind::from_mime(mime);
        Self {
            kind,
            name: name.into(),
            size_label: format_size(size_bytes),
            description: Some("Uploaded via FileUpload".to_string()),
            source_url: if kind == AttachmentKind::Image {
                source_url
            } else {
                None
            },
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Format a byte count as `Bytes`/`KB`/`MB`/`GB` with at most one decimal.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0_usize;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 10.0).round() / 10.0;
    if (rounded - rounded.trunc()).abs() < f64::EPSILON {
        format!("{rounded:.0} {}", UNITS[unit])
    } else {
        format!("{rounded:.1} {}", UNITS[unit])
    }
}

/// One chat message.
///
/// `content` only grows while an exchange streams into it and is never
/// touched again once the exchange is over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique key; the only way a streaming exchange finds its placeholder.
    pub id: MessageId,
    /// Author.
    pub role: Role,
    /// Text body.
    pub content: String,
    /// Ordered attachments.
    pub attachments: Vec<AttachmentRef>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>, attachments: Vec<AttachmentRef>) -> Self {
        Self::build(Role::User, content.into(), attachments)
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::build(Role::Assistant, content.into(), Vec::new())
    }

    /// Build the empty assistant message a stream is folded into.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::assistant(String::new())
    }

    /// Attach files to the message.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<AttachmentRef>) -> Self {
        self.attachments = attachments;
        self
    }

    fn build(role: Role, content: String, attachments: Vec<AttachmentRef>) -> Self {
        Self {
            id: MessageId::fresh(),
            role,
            content,
            attachments,
            created_at: Utc::now(),
        }
    }
}

/// An archived conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Derived title.
    pub title: String,
    /// Snapshot of the conversation at archive time.
    pub messages: Vec<Message>,
    /// Archive time.
    pub archived_at: DateTime<Utc>,
}

impl Session {
    /// Archive a copy of `messages`.
    #[must_use]
    pub fn archive(messages: &[Message]) -> Self {
        Self {
            id: SessionId::new(),
            title: derive_title(messages),
            messages: messages.to_vec(),
            archived_at: Utc::now(),
        }
    }

    /// Lightweight listing entry.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            title: self.title.clone(),
            message_count: self.messages.len(),
        }
    }
}

/// History entry as shown in a sidebar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: SessionId,
    /// Derived title.
    pub title: String,
    /// Number of archived messages.
    pub message_count: usize,
}

/// First [`TITLE_CHARS`] characters of an opening user message, else [`DEFAULT_SESSION_TITLE`].
#[must_use]
pub fn derive_title(messages: &[Message]) -> String {
    match messages.first() {
        Some(first) if first.role == Role::User => first.content.chars().take(TITLE_CHARS).collect(),
        _ => DEFAULT_SESSION_TITLE.to_string(),
    }
}
