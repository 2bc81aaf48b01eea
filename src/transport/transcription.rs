//! Speech-to-text: one multipart upload, one JSON answer, no streaming.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use url::Url;

use crate::config::{ApiConfig, TranscriptionConfig};
use crate::error::{ChatError, ChatResult};
use crate::transport::http::{build_client, endpoint};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Client for the `audio/transcriptions` endpoint.
#[derive(Clone, Debug)]
pub struct TranscriptionClient {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    model: String,
    file_name: String,
}

impl TranscriptionClient {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(api: &ApiConfig, config: &TranscriptionConfig) -> ChatResult<Self> {
        Ok(Self {
            client: build_client(api)?,
            endpoint: endpoint(api, "audio/transcriptions")?,
            api_key: api.api_key.clone(),
            model: config.model.clone(),
            file_name: config.file_name.clone(),
        })
    }

    /// Transcribe a recorded audio blob.
    ///
    /// Returns `None` when the service answered without any text.
    ///
    /// # Errors
    /// Returns an error on network failure, a non-success status, or an
    /// unparseable response.
    pub async fn transcribe(&self, audio: Vec<u8>) -> ChatResult<Option<String>> {
        let size = audio.len();
        let form = Form::new()
            .part("file", Part::bytes(audio).file_name(self.file_name.clone()))
            .text("model", self.model.clone())
            .text("response_format", "json");

        let mut builder = self.client.post(self.endpoint.clone()).multipart(form);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!("Uploading {size} bytes of audio for transcription");
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChatError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: TranscriptionResponse = serde_json::from_slice(&body)?;
        Ok(parsed.text.filter(|text| !text.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    use super::*;

    async fn client_for(app: Router) -> TranscriptionClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let api = ApiConfig {
            base_url: format!("http://{addr}/v1"),
            ..ApiConfig::default()
        };
        TranscriptionClient::new(&api, &TranscriptionConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_transcribe_returns_text() {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(|| async { axum::Json(serde_json::json!({ "text": "hello there" })) }),
        );
        let client = client_for(app).await;
        let text = client.transcribe(vec![0_u8; 64]).await.unwrap();
        assert_eq!(text.as_deref(), Some("hello there"));
    }

    #[tokio::test]
    async fn test_transcribe_without_text() {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(|| async { axum::Json(serde_json::json!({ "text": "" })) }),
        );
        let client = client_for(app).await;
        assert_eq!(client.transcribe(vec![1, 2, 3]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transcribe_status_error() {
        let app = Router::new().route(
            "/v1/audio/transcriptions",
            post(|| async { StatusCode::UNAUTHORIZED }),
        );
        let client = client_for(app).await;
        let err = client.transcribe(Vec::new()).await.unwrap_err();
        assert!(matches!(err, ChatError::Status(401)));
    }
}
