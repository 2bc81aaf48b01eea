//! reqwest-backed transport for the hosted completion endpoint.

use futures::StreamExt;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{ChatError, ChatResult};
use crate::transport::{ByteStream, ChatCompletionRequest, ChatTransport, TransportFuture};

/// Build the shared HTTP client.
///
/// Only the connection phase is bounded; a streaming body may take as long
/// as the model needs.
pub(crate) fn build_client(config: &ApiConfig) -> ChatResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .gzip(true)
        .build()
        .map_err(ChatError::from)
}

/// Join `path` onto the configured base URL.
pub(crate) fn endpoint(config: &ApiConfig, path: &str) -> ChatResult<Url> {
    let base = config.base_url.trim_end_matches('/');
    Ok(Url::parse(&format!("{base}/{path}"))?)
}

/// Streaming chat-completions client.
#[derive(Clone, Debug)]
pub struct HttpChatTransport {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpChatTransport {
    /// Create a transport for the configured endpoint.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &ApiConfig) -> ChatResult<Self> {
        Ok(Self {
            client: build_client(config)?,
            endpoint: endpoint(config, "chat/completions")?,
            api_key: config.api_key.clone(),
        })
    }

    /// The completions URL requests are sent to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl ChatTransport for HttpChatTransport {
    fn open_stream(
        &self,
        request: ChatCompletionRequest,
    ) -> TransportFuture<'_, ChatResult<ByteStream>> {
        Box::pin(async move {
            tracing::debug!(
                "POST {} model={} messages={}",
                self.endpoint,
                request.model,
                request.messages.len()
            );

            let mut builder = self.client.post(self.endpoint.clone()).json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(ChatError::Status(status.as_u16()));
            }

            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from));
            Ok(Box::pin(body) as ByteStream)
        })
    }
}
