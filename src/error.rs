//! Error types for openaudio.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpenAudioError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Request errors
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // Transport errors
    #[error("HTTP error! status: {status}{}", format_details(.details))]
    HttpStatus {
        status: u16,
        details: Option<String>,
    },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Stream cancelled")]
    Cancelled,

    // Audio output errors
    #[error("Audio output device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio output failed: {message}")]
    AudioOutput { message: String },

    #[error("Invalid audio container: {message}")]
    Container { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

fn format_details(details: &Option<String>) -> String {
    match details {
        Some(d) if !d.is_empty() => format!(" ({})", d),
        _ => String::new(),
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, OpenAudioError>;
