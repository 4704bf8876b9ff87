//! Default configuration constants for openaudio.
//!
//! Shared by the config layer, the CLI and the streaming pipeline so that the
//! playback clock and the WAV header always agree on the audio format.

/// Default PCM sample rate in Hz.
///
/// Matches the rate the speech server streams its 16-bit mono deltas at.
pub const SAMPLE_RATE: u32 = 22050;

/// Highest sample rate accepted from configuration, in Hz.
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Channel count of the streamed PCM. The pipeline is mono only.
pub const CHANNELS: u16 = 1;

/// Bits per PCM sample.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Bytes per PCM sample (16-bit little-endian).
pub const BYTES_PER_SAMPLE: usize = 2;

/// Default speech server base URL.
pub const API_URL: &str = "http://localhost:8000";

/// Path of the speech endpoint relative to the base URL.
pub const SPEECH_ENDPOINT: &str = "/v1/audio/speech";

/// Default synthesis model.
pub const MODEL: &str = "tts-1";

/// Default voice.
pub const VOICE: &str = "random";

/// Voices the reference server advertises.
pub const VOICES: &[&str] = &[
    "random", "alloy", "echo", "fable", "onyx", "nova", "shimmer",
];

/// Maximum number of characters accepted as synthesis input.
pub const MAX_INPUT_CHARS: usize = 4096;

/// Upper bound on a single streamed chunk's duration, in seconds.
pub const MAX_CHUNK_DURATION_SECS: f32 = 12.0;

/// Silence inserted by the server between sentences, in seconds.
pub const SILENCE_DURATION_SECS: f32 = 0.2;

/// Connect timeout for the speech endpoint, in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default file the finished container is written to.
pub const OUTPUT_FILE: &str = "speech.wav";
