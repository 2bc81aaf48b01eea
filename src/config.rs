//! Configuration for the chat front-end.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::chat::types::{AttachmentKind, AttachmentRef};
use crate::error::{ChatError, ChatResult};

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "ANMIX_API_URL";
/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "ANMIX_API_KEY";
/// Environment variable selecting the initial model (display name).
pub const MODEL_ENV: &str = "ANMIX_MODEL";

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Model endpoint settings.
    pub api: ApiConfig,
    /// Model catalog and initial selection.
    pub models: ModelsConfig,
    /// Placeholder replies for models without a network binding.
    pub simulated: SimulatedConfig,
    /// Speech-to-text settings.
    pub transcription: TranscriptionConfig,
    /// Assistant text shown when an exchange fails.
    #[serde(default = "default_error_reply")]
    pub error_reply: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            models: ModelsConfig::default(),
            simulated: SimulatedConfig::default(),
            transcription: TranscriptionConfig::default(),
            error_reply: default_error_reply(),
        }
    }
}

impl ChatConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `ANMIX_API_URL`, `ANMIX_API_KEY` and `ANMIX_MODEL`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(API_URL_ENV) {
            config.api.base_url = url;
        }
        if let Some(key) = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
        {
            config.api.api_key = Some(key);
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.models.default_model = model;
        }
        config
    }

    /// Set the API base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// Set the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api.api_key = Some(key.into());
        self
    }

    /// Set the initially selected model.
    #[must_use]
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.models.default_model = model.into();
        self
    }

    /// Set the simulated-reply delay.
    #[must_use]
    pub const fn with_simulated_delay(mut self, delay: Duration) -> Self {
        self.simulated.delay = delay;
        self
    }

    /// Set the probability of synthetic attachments on simulated replies.
    #[must_use]
    pub const fn with_attachment_probability(mut self, probability: f64) -> Self {
        self.simulated.attachment_probability = probability;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the base URL does not parse, the reply pool is
    /// empty, the probability is outside `[0, 1]`, or the default model is
    /// missing from the catalog.
    pub fn validate(&self) -> ChatResult<()> {
        Url::parse(&self.api.base_url)?;

        if self.simulated.replies.is_empty() {
            return Err(ChatError::InvalidConfig(
                "simulated.replies must not be empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.simulated.attachment_probability) {
            return Err(ChatError::InvalidConfig(format!(
                "simulated.attachment_probability must be within [0, 1], got {}",
                self.simulated.attachment_probability
            )));
        }

        if !self
            .models
            .catalog
            .iter()
            .any(|entry| entry.name == self.models.default_model)
        {
            return Err(ChatError::InvalidConfig(format!(
                "default model {:?} is not in the catalog",
                self.models.default_model
            )));
        }

        Ok(())
    }
}

/// Model endpoint settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL; `/chat/completions` and `/audio/transcriptions` are appended.
    pub base_url: String,
    /// Bearer token.
    pub api_key: Option<String>,
    /// Connection timeout. No overall request timeout is applied.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sambanova.ai/v1".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// One entry of the model catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Display name shown in the model picker.
    pub name: String,
    /// Remote model identifier; `None` means replies are simulated.
    pub remote_id: Option<String>,
}

impl ModelEntry {
    fn network(name: &str, remote_id: &str) -> Self {
        Self {
            name: name.to_string(),
            remote_id: Some(remote_id.to_string()),
        }
    }

    fn simulated(name: &str) -> Self {
        Self {
            name: name.to_string(),
            remote_id: None,
        }
    }
}

/// Model catalog settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Catalog in picker order.
    pub catalog: Vec<ModelEntry>,
    /// Display name selected at startup.
    pub default_model: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            catalog: vec![
                ModelEntry::network("Llama 4 Maverick", "Llama-4-Maverick-17B-128E-Instruct"),
                ModelEntry::network("DeepSeek V3.1", "DeepSeek-V3.1"),
                ModelEntry::network("DeepSeek V3.2", "DeepSeek-V3.2"),
                ModelEntry::network("Qwen3 235B", "Qwen3-235B"),
                ModelEntry::network("gpt-oss-120b", "gpt-oss-120b"),
                ModelEntry::simulated("Claude 4.5 Sonnet"),
                ModelEntry::simulated("GPT-5-mini"),
                ModelEntry::network("Whisper-Large-v3", "Whisper-Large-v3"),
            ],
            default_model: "Llama 4 Maverick".to_string(),
        }
    }
}

/// Placeholder-reply settings for models without a network binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulatedConfig {
    /// Delay before the canned reply appears.
    #[serde(with = "duration_millis_serde")]
    pub delay: Duration,
    /// Pool of canned replies.
    pub replies: Vec<String>,
    /// Probability that the reply carries `attachments`.
    pub attachment_probability: f64,
    /// Synthetic attachments.
    pub attachments: Vec<AttachmentRef>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1500),
            replies: vec![
                "I've analyzed your request and I'm ready to help. What specific details would you like to explore first?".to_string(),
                "That's an interesting perspective. Based on current trends, we could approach this from several angles.".to_string(),
                "Understood. I'm processing that information now. Would you like me to generate a summary or dive deeper into the technical aspects?".to_string(),
                "I can certainly help with that. Here's what I've found so far...".to_string(),
            ],
            attachment_probability: 0.3,
            attachments: vec![
                AttachmentRef::new(AttachmentKind::Image, "generated-asset.png", "1.2 MB")
                    .with_description("AI generated visual."),
                AttachmentRef::new(AttachmentKind::Text, "notes.md", "2 KB")
                    .with_description("Extracted insights."),
            ],
        }
    }
}

/// Speech-to-text settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Remote transcription model.
    pub model: String,
    /// File name sent with the audio part.
    pub file_name: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-large-v3".to_string(),
            file_name: "audio.wav".to_string(),
        }
    }
}

fn default_error_reply() -> String {
    "Error: Failed to get response from SambaNova. Please try again later.".to_string()
}

/// Serde module for whole-second durations.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde module for millisecond durations.
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
