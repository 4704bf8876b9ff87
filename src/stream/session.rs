//! Stream controller: one read loop per speech request.
//!
//! The session owns every piece of per-request state (record splitter, sample
//! carry, playback cursor, container buffer) and drives them synchronously for
//! each transport read. The only suspension point is the wait for the next
//! read, which is also where cancellation is observed.

use crate::config::Config;
use crate::error::{OpenAudioError, Result};
use crate::playback::AudioOutput;
use crate::stream::aligner::SampleAligner;
use crate::stream::container::{ContainerBuffer, PcmFormat};
use crate::stream::event::{ProtocolEvent, UsageStats, decode_audio, decode_record};
use crate::stream::framing::{Framing, RecordSplitter};
use crate::stream::scheduler::PlaybackScheduler;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Notify, watch};
use tracing::{debug, info, warn};

/// Lifecycle of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Snapshot published to observers after every transition and delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub state: SessionState,
    /// Delta events received so far.
    pub chunks_received: usize,
    /// Transport bytes received so far.
    pub bytes_received: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub framing: Framing,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: crate::defaults::SAMPLE_RATE,
            framing: Framing::default(),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            sample_rate: config.audio.sample_rate,
            framing: config.audio.framing,
        }
    }
}

/// Result of a completed session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Finalized WAV bytes.
    pub container: Vec<u8>,
    pub usage: Option<UsageStats>,
    /// Delta events received.
    pub chunks: usize,
    /// Records skipped because they could not be decoded.
    pub skipped: usize,
    /// Buffers the audio output refused.
    pub output_errors: usize,
    pub dropped_trailing_byte: bool,
    /// Aligned PCM bytes in the container.
    pub pcm_bytes: usize,
    /// Output clock time at which the last scheduled chunk ends.
    pub playback_end: f64,
    /// Audio duration in seconds.
    pub duration: f64,
}

/// Cloneable handle that aborts a running session.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Whether the read loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Per-request pipeline: decode, align, then fan out to playback and container.
pub struct StreamSession<O: AudioOutput> {
    config: SessionConfig,
    output: O,
    state: SessionState,
    splitter: RecordSplitter,
    aligner: SampleAligner,
    scheduler: PlaybackScheduler,
    container: ContainerBuffer,
    usage: Option<UsageStats>,
    chunks: usize,
    skipped: usize,
    output_errors: usize,
    bytes_received: usize,
    progress_tx: watch::Sender<Progress>,
    cancel: CancelHandle,
}

impl<O: AudioOutput> StreamSession<O> {
    pub fn new(config: SessionConfig, output: O) -> Self {
        let (progress_tx, _) = watch::channel(Progress::default());
        Self {
            config,
            output,
            state: SessionState::Idle,
            splitter: RecordSplitter::new(config.framing),
            aligner: SampleAligner::new(),
            scheduler: PlaybackScheduler::new(config.sample_rate, 0.0),
            container: ContainerBuffer::new(PcmFormat::mono16(config.sample_rate)),
            usage: None,
            chunks: 0,
            skipped: 0,
            output_errors: 0,
            bytes_received: 0,
            progress_tx,
            cancel: CancelHandle::new(),
        }
    }

    /// Share a cancel handle created by the host.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn progress(&self) -> Progress {
        Progress {
            state: self.state,
            chunks_received: self.chunks,
            bytes_received: self.bytes_received,
        }
    }

    /// Receive a [`Progress`] update after every change.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress_tx.subscribe()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn usage(&self) -> Option<UsageStats> {
        self.usage
    }

    /// Output clock time at which everything queued so far has played.
    pub fn playback_end(&self) -> f64 {
        self.scheduler.cursor()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    /// Reset per-request state and enter `Connecting`.
    pub fn start(&mut self) {
        let SessionConfig {
            sample_rate,
            framing,
        } = self.config;
        self.splitter = RecordSplitter::new(framing);
        self.aligner.reset();
        self.scheduler = PlaybackScheduler::new(sample_rate, self.output.current_time());
        self.container = ContainerBuffer::new(PcmFormat::mono16(sample_rate));
        self.usage = None;
        self.chunks = 0;
        self.skipped = 0;
        self.output_errors = 0;
        self.bytes_received = 0;
        self.transition(SessionState::Connecting);
    }

    /// Process one transport read.
    ///
    /// Returns [`Flow::Done`] once the terminal event has been seen; the
    /// caller should stop reading and call [`finish`](Self::finish). Input
    /// fed after that, or after [`abort`](Self::abort), is ignored.
    pub fn feed(&mut self, bytes: &[u8]) -> Flow {
        match self.state {
            SessionState::Idle => self.start(),
            state if state.is_terminal() => return Flow::Done,
            _ => {}
        }
        if bytes.is_empty() {
            return Flow::Continue;
        }

        self.bytes_received += bytes.len();
        if self.state == SessionState::Connecting {
            self.transition(SessionState::Streaming);
        }

        for record in self.splitter.push(bytes) {
            if self.handle_record(&record) == Flow::Done {
                return Flow::Done;
            }
        }
        Flow::Continue
    }

    /// End of stream: finalize the container and enter `Completed`.
    ///
    /// Returns `None` for an aborted session, which never yields a container.
    pub fn finish(&mut self) -> Option<SessionOutcome> {
        if self.state == SessionState::Aborted {
            debug!("Not finalizing an aborted session");
            return None;
        }

        let remainder = self.splitter.take_remainder();
        if !remainder.trim().is_empty() {
            debug!("Discarding incomplete record ({} bytes)", remainder.len());
        }

        let dropped_trailing_byte = self.aligner.finish().is_some();
        if dropped_trailing_byte {
            debug!("Dropping trailing odd byte at end of stream");
        }

        if self.state != SessionState::Completed {
            self.transition(SessionState::Completed);
        }

        let format = self.container.format();
        let outcome = SessionOutcome {
            container: self.container.finalize(),
            usage: self.usage,
            chunks: self.chunks,
            skipped: self.skipped,
            output_errors: self.output_errors,
            dropped_trailing_byte,
            pcm_bytes: self.container.data_len(),
            playback_end: self.scheduler.cursor(),
            duration: format.duration_secs(self.container.data_len()),
        };

        info!(
            "Stream completed: {} chunks, {} PCM bytes, {:.2}s",
            outcome.chunks, outcome.pcm_bytes, outcome.duration
        );
        Some(outcome)
    }

    /// Enter `Aborted`. Audio already queued is left to play.
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            self.transition(SessionState::Aborted);
        }
    }

    /// Drain `stream` in order until it ends, a done event arrives, or the
    /// session is cancelled.
    pub async fn run<S, B, E>(&mut self, mut stream: S) -> Result<SessionOutcome>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        self.start();
        let cancel = self.cancel.clone();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Stream cancelled after {} chunks", self.chunks);
                    self.abort();
                    return Err(OpenAudioError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(bytes)) => {
                    if self.feed(bytes.as_ref()) == Flow::Done {
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!("Transport failed after {} chunks: {}", self.chunks, e);
                    self.abort();
                    return Err(OpenAudioError::Transport {
                        message: e.to_string(),
                    });
                }
                None => break,
            }
        }

        self.finish().ok_or(OpenAudioError::Cancelled)
    }

    fn handle_record(&mut self, record: &str) -> Flow {
        let event = match decode_record(record) {
            None => return Flow::Continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!("Failed to parse SSE event: {}", e);
                self.skipped += 1;
                return Flow::Continue;
            }
        };

        match event {
            ProtocolEvent::Delta { audio } => {
                match decode_audio(&audio) {
                    Ok(raw) => self.on_delta(&raw),
                    Err(e) => {
                        warn!("Failed to decode audio delta: {}", e);
                        self.skipped += 1;
                    }
                }
                Flow::Continue
            }
            ProtocolEvent::Done { usage } => {
                self.usage = usage;
                self.transition(SessionState::Completed);
                Flow::Done
            }
            ProtocolEvent::Unknown => {
                debug!("Ignoring unknown event");
                Flow::Continue
            }
        }
    }

    fn on_delta(&mut self, raw: &[u8]) {
        self.chunks += 1;
        let chunk = self.aligner.align(raw);
        debug!(
            "Delta {}: {} raw bytes, {} aligned",
            self.chunks,
            raw.len(),
            chunk.len()
        );

        self.container.append(&chunk);
        if let Err(e) = self.scheduler.schedule(&mut self.output, &chunk) {
            warn!("Failed to queue audio: {}", e);
            self.output_errors += 1;
        }

        self.publish();
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {} -> {}", self.state, next);
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        self.progress_tx.send_replace(self.progress());
    }
}
