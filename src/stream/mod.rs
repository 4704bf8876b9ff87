//! Streaming PCM pipeline for speech responses.
//!
//! ```text
//!                 ┌──────────┐    ┌─────────┐    ┌─────────┐    ┌───────────┐
//! transport ─────▶│ Framing  │───▶│  Event  │───▶│ Aligner │─┬─▶│ Scheduler │───▶ audio output
//!   bytes         │ (records)│    │ decode  │    │ (carry) │ │  └───────────┘
//!                 └──────────┘    └─────────┘    └─────────┘ │  ┌───────────┐
//!                                      │                     └─▶│ Container │───▶ WAV bytes
//!                                      ▼                        └───────────┘
//!                                 done + usage
//! ```
//!
//! [`session::StreamSession`] drives all stages from a single read loop.

pub mod aligner;
pub mod container;
pub mod event;
pub mod framing;
pub mod scheduler;
pub mod session;

pub use aligner::{AlignedChunk, AlignmentState, SampleAligner, align};
pub use container::{ContainerBuffer, HEADER_LEN, PcmFormat};
pub use event::{DecodeError, ProtocolEvent, UsageStats, decode_audio, decode_record};
pub use framing::{Framing, RecordSplitter, split_records};
pub use scheduler::{PlaybackScheduler, ScheduledBuffer, normalize, plan, schedule};
pub use session::{
    CancelHandle, Flow, Progress, SessionConfig, SessionOutcome, SessionState, StreamSession,
};
