//! Speech request model and the transport that delivers the response body.
//!
//! The pipeline only needs an ordered byte stream; how it is obtained is the
//! transport's business. [`HttpTransport`] posts the request to an
//! OpenAI-compatible `/v1/audio/speech` endpoint.

use crate::config::Config;
use crate::defaults::MAX_INPUT_CHARS;
use crate::error::{OpenAudioError, Result};
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Response mode requested from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    /// Server-sent audio deltas.
    #[default]
    Sse,
    /// One complete audio file.
    Audio,
}

impl StreamFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamFormat::Sse => "sse",
            StreamFormat::Audio => "audio",
        }
    }
}

/// JSON body of a speech request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub model: String,
    pub input: String,
    pub voice: String,
    pub stream_format: StreamFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    pub max_chunk_duration: f32,
    pub silence_duration: f32,
}

impl SpeechRequest {
    /// Build a request for `input` using the configured server defaults.
    pub fn new(config: &Config, input: impl Into<String>) -> Self {
        let server = &config.server;
        Self {
            model: server.model.clone(),
            input: input.into(),
            voice: server.voice.clone(),
            stream_format: server.stream_format,
            response_format: server.response_format.clone(),
            max_chunk_duration: server.max_chunk_duration,
            silence_duration: server.silence_duration,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.trim().is_empty() {
            return Err(OpenAudioError::InvalidRequest {
                message: "input text is empty".to_string(),
            });
        }
        let chars = self.input.chars().count();
        if chars > MAX_INPUT_CHARS {
            return Err(OpenAudioError::InvalidRequest {
                message: format!(
                    "input is {} characters, the limit is {}",
                    chars, MAX_INPUT_CHARS
                ),
            });
        }
        Ok(())
    }
}

/// Ordered response body. A mid-body failure is yielded as an item error.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send>>;

/// Delivers speech responses.
#[async_trait]
pub trait SpeechTransport: Send + Sync {
    /// Send `request` and return the response body as it arrives.
    ///
    /// A non-success status is an error here, before any byte is yielded.
    async fn open_stream(&self, request: &SpeechRequest) -> Result<ByteStream>;

    /// Send `request` and return the complete response body.
    async fn fetch_audio(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
}

/// Longest body excerpt kept as an error diagnostic.
const MAX_DIAGNOSTIC_CHARS: usize = 512;

/// Turn a failed response into an [`OpenAudioError::HttpStatus`].
///
/// Prefers the `details` field of a JSON error body, then its `error` field,
/// then the raw body text.
pub fn describe_failure(status: u16, body: &str) -> OpenAudioError {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["details", "error"].iter().find_map(|key| {
                value
                    .get(key)
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        });

    let details = from_json.or_else(|| {
        let text = body.trim();
        (!text.is_empty()).then(|| text.chars().take(MAX_DIAGNOSTIC_CHARS).collect())
    });

    OpenAudioError::HttpStatus { status, details }
}

#[cfg(feature = "http")]
pub use http::HttpTransport;

#[cfg(feature = "http")]
mod http {
    use super::*;
    use crate::defaults::SPEECH_ENDPOINT;
    use futures_util::StreamExt;
    use std::time::Duration;
    use tracing::{debug, info};

    /// [`SpeechTransport`] over HTTP with `reqwest`.
    #[derive(Debug, Clone)]
    pub struct HttpTransport {
        client: reqwest::Client,
        endpoint: String,
        api_key: Option<String>,
    }

    impl HttpTransport {
        pub fn new(api_url: &str, api_key: Option<String>, connect_timeout: Duration) -> Result<Self> {
            // No overall timeout: a stream lasts as long as the speech
            let client = reqwest::Client::builder()
                .connect_timeout(connect_timeout)
                .build()
                .map_err(|e| OpenAudioError::Transport {
                    message: format!("Failed to build HTTP client: {e}"),
                })?;

            Ok(Self {
                client,
                endpoint: endpoint_url(api_url),
                api_key: api_key.filter(|k| !k.is_empty()),
            })
        }

        pub fn from_config(config: &Config) -> Result<Self> {
            Self::new(
                &config.server.api_url,
                config.server.api_key.clone(),
                Duration::from_secs(config.server.connect_timeout_secs),
            )
        }

        pub fn endpoint(&self) -> &str {
            &self.endpoint
        }

        async fn send(&self, request: &SpeechRequest) -> Result<reqwest::Response> {
            request.validate()?;

            let mut builder = self.client.post(&self.endpoint).json(request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            info!(
                "POST {} (model={}, voice={}, format={})",
                self.endpoint,
                request.model,
                request.voice,
                request.stream_format.as_str()
            );

            let response = builder.send().await.map_err(|e| OpenAudioError::Transport {
                message: format!("Failed to reach {}: {e}", self.endpoint),
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(describe_failure(status.as_u16(), &body));
            }

            debug!("Response status {}", status);
            Ok(response)
        }
    }

    #[async_trait]
    impl SpeechTransport for HttpTransport {
        async fn open_stream(&self, request: &SpeechRequest) -> Result<ByteStream> {
            let response = self.send(request).await?;
            let stream = response.bytes_stream().map(|chunk| {
                chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(std::io::Error::other)
            });
            Ok(Box::pin(stream))
        }

        async fn fetch_audio(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
            let response = self.send(request).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(|e| OpenAudioError::Transport {
                    message: format!("Failed to read response body: {e}"),
                })?;
            Ok(bytes.to_vec())
        }
    }

    /// `<api_url>/v1/audio/speech`, tolerating a trailing slash.
    pub(super) fn endpoint_url(api_url: &str) -> String {
        format!("{}{}", api_url.trim().trim_end_matches('/'), SPEECH_ENDPOINT)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn endpoint_appends_speech_path() {
            assert_eq!(
                endpoint_url("http://localhost:8000"),
                "http://localhost:8000/v1/audio/speech"
            );
            assert_eq!(
                endpoint_url("https://tts.example.com/"),
                "https://tts.example.com/v1/audio/speech"
            );
        }

        #[test]
        fn empty_api_key_is_not_sent() {
            let transport =
                HttpTransport::new("http://localhost:1", Some(String::new()), Duration::from_secs(1))
                    .unwrap();
            assert!(transport.api_key.is_none());
        }

        #[tokio::test]
        async fn invalid_request_fails_before_sending() {
            let transport =
                HttpTransport::new("http://127.0.0.1:9", None, Duration::from_millis(100)).unwrap();
            let mut request = SpeechRequest::new(&Config::default(), "hello");
            request.input = "   ".to_string();

            let result = transport.fetch_audio(&request).await;
            assert!(matches!(result, Err(OpenAudioError::InvalidRequest { .. })));
        }
    }
}
