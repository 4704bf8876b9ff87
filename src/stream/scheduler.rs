//! Gapless playback scheduling on a logical clock.
//!
//! Each aligned chunk is queued to start where the previous one ended, or
//! immediately if the output clock has already moved past that point. The
//! cursor is the only thing serializing chunks; scheduling never waits for
//! audio to actually play.

use crate::error::Result;
use crate::playback::AudioOutput;
use crate::stream::aligner::AlignedChunk;
use tracing::debug;

/// Full-scale divisor for 16-bit PCM.
const I16_SCALE: f32 = 32768.0;

/// Convert 16-bit samples to floats in [-1.0, 1.0].
pub fn normalize(chunk: &AlignedChunk) -> Vec<f32> {
    chunk.samples().map(|s| s as f32 / I16_SCALE).collect()
}

/// Where and for how long a chunk will play.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledBuffer {
    pub start: f64,
    pub duration: f64,
    pub samples: Vec<f32>,
}

impl ScheduledBuffer {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Compute the placement of `chunk` without touching any output.
///
/// Returns `None` for an empty chunk.
pub fn plan(cursor: f64, now: f64, chunk: &AlignedChunk, sample_rate: u32) -> Option<ScheduledBuffer> {
    if chunk.is_empty() {
        return None;
    }

    let samples = normalize(chunk);
    let duration = samples.len() as f64 / sample_rate as f64;
    let start = now.max(cursor);

    Some(ScheduledBuffer {
        start,
        duration,
        samples,
    })
}

/// Queue `chunk` on `output` and return the advanced cursor.
///
/// An empty chunk returns `cursor` unchanged and queues nothing.
pub fn schedule<O: AudioOutput + ?Sized>(
    cursor: f64,
    chunk: &AlignedChunk,
    output: &mut O,
    sample_rate: u32,
) -> Result<f64> {
    let Some(buffer) = plan(cursor, output.current_time(), chunk, sample_rate) else {
        return Ok(cursor);
    };

    let end = buffer.end();
    debug!(
        "Scheduling {} samples at {:.3}s for {:.3}s on {}",
        buffer.samples.len(),
        buffer.start,
        buffer.duration,
        output.name()
    );
    output.enqueue(buffer.start, buffer.samples, sample_rate)?;

    Ok(end)
}

/// Owns the playback cursor for one session.
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    cursor: f64,
    sample_rate: u32,
    scheduled: usize,
}

impl PlaybackScheduler {
    /// Start a timeline at `start` seconds on the output clock.
    pub fn new(sample_rate: u32, start: f64) -> Self {
        Self {
            cursor: start,
            sample_rate,
            scheduled: 0,
        }
    }

    /// End of the last scheduled chunk.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of chunks handed to the output.
    pub fn scheduled(&self) -> usize {
        self.scheduled
    }

    /// Queue `chunk` and advance the cursor.
    ///
    /// On error the cursor is left where it was.
    pub fn schedule<O: AudioOutput + ?Sized>(
        &mut self,
        output: &mut O,
        chunk: &AlignedChunk,
    ) -> Result<f64> {
        let next = schedule(self.cursor, chunk, output, self.sample_rate)?;
        if !chunk.is_empty() {
            self.scheduled += 1;
        }
        self.cursor = next;
        Ok(next)
    }

    pub fn reset(&mut self, start: f64) {
        self.cursor = start;
        self.scheduled = 0;
    }
}
