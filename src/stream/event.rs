//! Protocol events carried by the speech stream.
//!
//! Each record holds one or more `data:` lines whose payload is a JSON object
//! tagged by `type`. Only two types matter to the pipeline: audio deltas
//! carrying base64 PCM, and the terminal `done` event with token usage.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marker that prefixes every data line.
pub const DATA_MARKER: &str = "data:";

/// `type` value of an audio delta event.
pub const DELTA_EVENT: &str = "speech.audio.delta";

/// `type` value of the terminal event.
pub const DONE_EVENT: &str = "speech.audio.done";

/// Token accounting reported by the server at the end of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// One decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ProtocolEvent {
    /// A chunk of base64-encoded 16-bit PCM.
    #[serde(rename = "speech.audio.delta")]
    Delta { audio: String },
    /// End of synthesis, optionally with usage.
    #[serde(rename = "speech.audio.done")]
    Done {
        #[serde(default)]
        usage: Option<UsageStats>,
    },
    /// Any other event type. Ignored by the pipeline.
    #[serde(other)]
    Unknown,
}

impl ProtocolEvent {
    /// Parse the JSON payload of a data line.
    pub fn parse(payload: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// A record that could not be turned into an event or PCM bytes.
///
/// Always recoverable: the record is skipped and the stream continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed event JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base64 audio: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Extract the data payload of a record.
///
/// Lines without the marker (comments, `event:`/`id:` fields, blank lines) are
/// ignored. A single space after the marker is stripped; multiple data lines
/// are joined with `\n`. Returns `None` when the record has no data line.
pub fn record_payload(record: &str) -> Option<String> {
    let mut payload: Option<String> = None;

    for line in record.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(data) = line.strip_prefix(DATA_MARKER) else {
            continue;
        };
        let data = data.strip_prefix(' ').unwrap_or(data);

        match payload.as_mut() {
            Some(p) => {
                p.push('\n');
                p.push_str(data);
            }
            None => payload = Some(data.to_string()),
        }
    }

    payload
}

/// Decode one complete record into a protocol event.
///
/// `None` means the record carries no data and should be ignored.
pub fn decode_record(record: &str) -> Option<Result<ProtocolEvent, DecodeError>> {
    let payload = record_payload(record)?;
    Some(ProtocolEvent::parse(&payload))
}

/// Decode the `audio` field of a delta event into raw PCM bytes.
pub fn decode_audio(audio: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(STANDARD.decode(audio.trim())?)
}
