//! Delta assembler: folds server-sent-event lines into the running reply text.

use serde::Deserialize;
use tracing::{debug, warn};

/// Prefix of an event line (checked after trimming).
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// What a single decoded line means to the assembler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
    /// Blank line, comment or anything without the `data: ` prefix.
    Ignored,
    /// The `[DONE]` sentinel.
    Done,
    /// A well-formed payload; the fragment is empty when the delta has no content.
    Delta(String),
    /// A `data: ` line whose payload could not be parsed.
    Malformed,
}

/// Classify one decoded line.
#[must_use]
pub fn classify_line(line: &str) -> LineEvent {
    let Some(payload) = line.trim().strip_prefix(DATA_PREFIX) else {
        return LineEvent::Ignored;
    };
    if payload == DONE_SENTINEL {
        return LineEvent::Done;
    }

    match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(chunk) => match chunk.choices.into_iter().next() {
            Some(choice) => LineEvent::Delta(
                choice
                    .delta
                    .and_then(|delta| delta.content)
                    .unwrap_or_default(),
            ),
            None => LineEvent::Malformed,
        },
        Err(err) => {
            debug!("Unparseable event payload: {err}");
            LineEvent::Malformed
        }
    }
}

/// Result of folding one line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fold {
    /// Text grew; the caller should publish the new total.
    Appended,
    /// Nothing changed (non-event line, empty fragment, or already finished).
    Unchanged,
    /// Malformed frame dropped; accumulated text kept.
    Dropped,
    /// Sentinel seen; the text is final.
    Finished,
}

/// Running text of one streamed reply. One instance per exchange.
#[derive(Debug, Default)]
pub struct DeltaAssembler {
    text: String,
    finished: bool,
    dropped: usize,
}

impl DeltaAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one line, strictly in arrival order.
    ///
    /// Once the sentinel has been seen every further line is ignored.
    pub fn fold(&mut self, line: &str) -> Fold {
        if self.finished {
            return Fold::Unchanged;
        }
        match classify_line(line) {
            LineEvent::Ignored => Fold::Unchanged,
            LineEvent::Done => {
                self.finished = true;
                Fold::Finished
            }
            LineEvent::Delta(fragment) if fragment.is_empty() => Fold::Unchanged,
            LineEvent::Delta(fragment) => {
                self.text.push_str(&fragment);
                Fold::Appended
            }
            LineEvent::Malformed => {
                self.dropped += 1;
                warn!("Dropped malformed event frame ({} so far)", self.dropped);
                Fold::Dropped
            }
        }
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the sentinel has been seen.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of malformed frames dropped.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    /// Consume the assembler and return the final text.
    #[must_use]
    pub fn into_text(self) -> String {
        self.text
    }
}
