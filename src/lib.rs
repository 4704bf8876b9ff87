//! openaudio - streaming text-to-speech client
//!
//! Reassembles server-sent PCM deltas into sample-aligned chunks, schedules
//! them for gapless playback, and encodes the session as a WAV file.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
#[cfg(feature = "cli")]
pub mod logging;
#[cfg(feature = "cli")]
pub mod output;
pub mod playback;
pub mod stream;
pub mod transport;

// Composition root - needs the CLI surface and a real transport
#[cfg(all(feature = "cli", feature = "http"))]
pub mod app;

// Core pipeline (decode → align → schedule + encode)
pub use stream::{
    AlignedChunk, CancelHandle, ContainerBuffer, Framing, PlaybackScheduler, ProtocolEvent,
    SampleAligner, SessionConfig, SessionOutcome, SessionState, StreamSession, UsageStats,
};

// Output sinks
pub use playback::{AudioOutput, CollectorOutput, NullOutput};

// Transport
#[cfg(feature = "http")]
pub use transport::HttpTransport;
pub use transport::{SpeechRequest, SpeechTransport, StreamFormat};

// Error handling
pub use error::{OpenAudioError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_has_short_hash_when_built_from_git() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(hash_part.len(), 7, "Git hash should be 7 chars, got: {}", ver);
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
