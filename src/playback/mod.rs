//! Audio output sinks for scheduled playback.
//!
//! The scheduler only needs two things from an output: the current position
//! of its clock and a way to queue samples at a position on that clock.
//! Queuing never blocks on real time.

#[cfg(feature = "cpal-audio")]
pub mod cpal_output;

use crate::error::{OpenAudioError, Result};
use crate::stream::aligner::AlignedChunk;
use crate::stream::scheduler::PlaybackScheduler;
use std::io::Cursor;
use std::time::{Duration, Instant};

#[cfg(feature = "cpal-audio")]
pub use cpal_output::{CpalOutput, list_output_devices, suppress_audio_warnings};

/// Real-time audio output driven by an independent clock.
pub trait AudioOutput {
    /// Current position of the output clock, in seconds.
    fn current_time(&self) -> f64;

    /// Queue mono samples in [-1.0, 1.0] to start at `start` seconds.
    fn enqueue(&mut self, start: f64, samples: Vec<f32>, sample_rate: u32) -> Result<()>;

    /// Name for logging.
    fn name(&self) -> &'static str {
        "output"
    }
}

impl<T: AudioOutput + ?Sized> AudioOutput for &mut T {
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn enqueue(&mut self, start: f64, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        (**self).enqueue(start, samples, sample_rate)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn enqueue(&mut self, start: f64, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        (**self).enqueue(start, samples, sample_rate)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Output that discards audio. Its clock follows wall time.
#[derive(Debug, Clone)]
pub struct NullOutput {
    started: Instant,
}

impl NullOutput {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for NullOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for NullOutput {
    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn enqueue(&mut self, _start: f64, _samples: Vec<f32>, _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// A buffer handed to [`CollectorOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedAudio {
    pub start: f64,
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Output with a manually driven clock that records every queued buffer.
#[derive(Debug, Clone, Default)]
pub struct CollectorOutput {
    now: f64,
    queued: Vec<QueuedAudio>,
    fail_enqueue: bool,
}

impl CollectorOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the clock at `now` seconds.
    pub fn with_time(mut self, now: f64) -> Self {
        self.now = now;
        self
    }

    /// Make every enqueue fail.
    pub fn with_enqueue_failure(mut self) -> Self {
        self.fail_enqueue = true;
        self
    }

    pub fn set_time(&mut self, now: f64) {
        self.now = now;
    }

    pub fn queued(&self) -> &[QueuedAudio] {
        &self.queued
    }
}

impl AudioOutput for CollectorOutput {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn enqueue(&mut self, start: f64, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        if self.fail_enqueue {
            return Err(OpenAudioError::AudioOutput {
                message: "collector configured to fail".to_string(),
            });
        }
        self.queued.push(QueuedAudio {
            start,
            samples,
            sample_rate,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Schedule a complete WAV container for playback.
///
/// Used for the non-streaming path, where the server returns a finished
/// file. Only 16-bit integer PCM is supported; multi-channel audio is
/// downmixed by averaging. Returns the time at which playback ends.
pub fn play_container<O: AudioOutput + ?Sized>(output: &mut O, bytes: &[u8]) -> Result<f64> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| OpenAudioError::Container {
            message: format!("Failed to parse WAV data: {}", e),
        })?;

    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(OpenAudioError::Container {
            message: format!(
                "unsupported sample format: {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            ),
        });
    }

    let raw: Vec<i16> = reader
        .samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| OpenAudioError::Container {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

    let channels = spec.channels.max(1) as usize;
    let mono: Vec<i16> = if channels == 1 {
        raw
    } else {
        raw.chunks_exact(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / channels as i32) as i16
            })
            .collect()
    };

    let mut scheduler = PlaybackScheduler::new(spec.sample_rate, output.current_time());
    scheduler.schedule(output, &AlignedChunk::from_samples(&mono))
}

/// Wait until the output clock reaches `end`.
pub async fn wait_for_playback<O: AudioOutput + ?Sized>(output: &O, end: f64) {
    loop {
        let remaining = end - output.current_time();
        if remaining <= 0.0 {
            break;
        }
        tokio::time::sleep(Duration::from_secs_f64(remaining.min(0.1))).await;
    }
}
