use crate::defaults;
use crate::error::{OpenAudioError, Result};
use crate::stream::framing::Framing;
use crate::transport::StreamFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub output: OutputConfig,
}

/// Speech server connection and request defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    pub stream_format: StreamFormat,
    pub response_format: Option<String>,
    pub connect_timeout_secs: u64,
    pub max_chunk_duration: f32,
    pub silence_duration: f32,
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub play: bool,
    pub framing: Framing,
}

/// Where the finished container is written
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::API_URL.to_string(),
            api_key: None,
            model: defaults::MODEL.to_string(),
            voice: defaults::VOICE.to_string(),
            stream_format: StreamFormat::default(),
            response_format: None,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            max_chunk_duration: defaults::MAX_CHUNK_DURATION_SECS,
            silence_duration: defaults::SILENCE_DURATION_SECS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            play: true,
            framing: Framing::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(defaults::OUTPUT_FILE),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                OpenAudioError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                OpenAudioError::Io(e)
            }
        })?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load configuration, falling back to defaults only when the file is missing
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(OpenAudioError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - OPENAUDIO_API_URL → server.api_url
    /// - OPENAUDIO_API_KEY → server.api_key
    /// - OPENAUDIO_MODEL → server.model
    /// - OPENAUDIO_VOICE → server.voice
    /// - OPENAUDIO_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = env_value("OPENAUDIO_API_URL") {
            self.server.api_url = url;
        }
        if let Some(key) = env_value("OPENAUDIO_API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(model) = env_value("OPENAUDIO_MODEL") {
            self.server.model = model;
        }
        if let Some(voice) = env_value("OPENAUDIO_VOICE") {
            self.server.voice = voice;
        }
        if let Some(device) = env_value("OPENAUDIO_AUDIO_DEVICE") {
            self.audio.device = Some(device);
        }
        self
    }

    /// Check values that would otherwise fail deep inside a session
    pub fn validate(&self) -> Result<()> {
        let rate = self.audio.sample_rate;
        if rate == 0 || rate > defaults::MAX_SAMPLE_RATE {
            return Err(OpenAudioError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: format!(
                    "{} Hz is outside 1..={} Hz",
                    rate,
                    defaults::MAX_SAMPLE_RATE
                ),
            });
        }

        let url = self.server.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(OpenAudioError::ConfigInvalidValue {
                key: "server.api_url".to_string(),
                message: format!("'{}' is not an http(s) URL", url),
            });
        }

        Ok(())
    }

    /// Serialize the effective configuration, masking the API key
    pub fn to_display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.server.api_key.is_some() {
            shown.server.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).map_err(|e| OpenAudioError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/openaudio/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("openaudio").join("config.toml"))
            .ok_or_else(|| OpenAudioError::Other("Could not determine config directory".into()))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Commented configuration template with every key at its default
pub fn dump_template() -> String {
    format!(
        r#"# openaudio configuration
# Location: ~/.config/openaudio/config.toml

[server]
# Base URL of the speech server (env: OPENAUDIO_API_URL)
api_url = "{api_url}"
# Bearer token sent with every request (env: OPENAUDIO_API_KEY)
# api_key = ""
# Model name (env: OPENAUDIO_MODEL)
model = "{model}"
# Voice: {voices} (env: OPENAUDIO_VOICE)
voice = "{voice}"
# "sse" streams audio deltas as they are synthesized, "audio" waits for the whole file
stream_format = "sse"
# Container requested from the server in "audio" mode (e.g. "wav")
# response_format = "wav"
connect_timeout_secs = {timeout}
# Longest text chunk synthesized at once, in seconds of audio
max_chunk_duration = {max_chunk:?}
# Silence inserted between chunks, in seconds
silence_duration = {silence:?}

[audio]
# Output device name (env: OPENAUDIO_AUDIO_DEVICE); see `openaudio devices`
# device = ""
sample_rate = {rate}
# Play audio while it streams
play = true
# "line": one record per line, "event": records separated by a blank line
framing = "line"

[output]
path = "{path}"
"#,
        api_url = defaults::API_URL,
        model = defaults::MODEL,
        voice = defaults::VOICE,
        voices = defaults::VOICES.join(", "),
        timeout = defaults::CONNECT_TIMEOUT_SECS,
        max_chunk = defaults::MAX_CHUNK_DURATION_SECS,
        silence = defaults::SILENCE_DURATION_SECS,
        rate = defaults::SAMPLE_RATE,
        path = defaults::OUTPUT_FILE,
    )
}
