//! Real-time audio output using CPAL (Cross-Platform Audio Library).
//!
//! The device callback is the clock: it counts rendered frames, and queued
//! buffers are mixed in at the frame their start time maps to. Everything the
//! scheduler sends crosses into the callback through a channel, so `enqueue`
//! never blocks on the audio thread.

use crate::error::{OpenAudioError, Result};
use crate::playback::AudioOutput;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// CPAL probes every backend it knows (ALSA, JACK, PipeWire) and those print
/// harmless noise to stderr while doing so.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` on fd 2. Safe as long as no other thread is
/// concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Keep JACK and PipeWire from logging while CPAL probes backends.
///
/// # Safety
/// Modifies the process environment. Call before any audio thread exists.
pub fn suppress_audio_warnings() {
    // SAFETY: called from the main thread before the output stream is built
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for PipeWire/PulseAudio desktops.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// ALSA per-speaker aliases that duplicate a real device.
const FILTERED_PATTERNS: &[&str] = &["surround", "front:", "rear:", "center:", "side:"];

/// How long to wait for the first callback before falling back.
const CALLBACK_PROBE: Duration = Duration::from_millis(200);

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List output devices, marking preferred ones with "\[recommended\]".
pub fn list_output_devices() -> Result<Vec<String>> {
    let (_host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.output_devices();
        (host, devices)
    });
    let devices = devices.map_err(|e| OpenAudioError::AudioOutput {
        message: format!("Failed to enumerate output devices: {}", e),
    })?;

    let mut names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                names.push(format!("{} [recommended]", name));
            } else {
                names.push(name);
            }
        }
    }

    Ok(names)
}

/// Find `name`, or the best default output device when `None`.
fn find_device(name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = name {
            let devices = host
                .output_devices()
                .map_err(|e| OpenAudioError::AudioOutput {
                    message: format!("Failed to enumerate devices: {}", e),
                })?;
            for device in devices {
                if device.name().is_ok_and(|n| n == name) {
                    return Ok(device);
                }
            }
            return Err(OpenAudioError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.output_devices() {
            for device in devices {
                if device.name().is_ok_and(|n| is_preferred_device(&n)) {
                    return Ok(device);
                }
            }
        }

        host.default_output_device()
            .ok_or_else(|| OpenAudioError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Mono samples at the device rate, starting at an absolute device frame.
#[derive(Debug, Clone, PartialEq)]
struct QueuedBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

impl QueuedBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Mix `pending` into an interleaved block whose first frame is `base`.
///
/// Frames no buffer covers are silent. Buffers that end within the block are
/// removed.
fn render_into(data: &mut [f32], channels: usize, base: u64, pending: &mut VecDeque<QueuedBuffer>) {
    data.fill(0.0);
    let channels = channels.max(1);
    let frames = (data.len() / channels) as u64;
    let block_end = base + frames;

    for buffer in pending.iter() {
        let from = buffer.start_frame.max(base);
        let to = buffer.end_frame().min(block_end);
        for frame in from..to {
            let sample = buffer.samples[(frame - buffer.start_frame) as usize];
            let offset = (frame - base) as usize * channels;
            for out in &mut data[offset..offset + channels] {
                *out += sample;
            }
        }
    }

    pending.retain(|buffer| buffer.end_frame() > block_end);
}

/// Device frame span `[start, end)` of a buffer starting at `start` seconds.
///
/// Both edges are rounded from absolute times, so a buffer that starts where
/// the previous one ended begins on the frame right after it.
fn frame_span(start: f64, len: usize, sample_rate: u32, device_rate: u32) -> (u64, u64) {
    let start = start.max(0.0);
    let end = start + len as f64 / sample_rate as f64;
    let to_frame = |t: f64| (t * device_rate as f64).round() as u64;
    (to_frame(start), to_frame(end))
}

/// Linear-interpolation resampling to exactly `output_len` samples.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32, output_len: usize) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    if from_rate == to_rate && output_len == samples.len() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = (source_pos - source_idx as f64) as f32;

            match (samples.get(source_idx), samples.get(source_idx + 1)) {
                (Some(&left), Some(&right)) => left + (right - left) * fraction,
                (Some(&left), None) => left,
                _ => samples[samples.len() - 1],
            }
        })
        .collect()
}

/// State owned by the device callback.
struct Renderer {
    receiver: Receiver<QueuedBuffer>,
    pending: VecDeque<QueuedBuffer>,
    channels: usize,
    frames_rendered: Arc<AtomicU64>,
}

impl Renderer {
    fn render(&mut self, data: &mut [f32]) {
        let base = self.frames_rendered.load(Ordering::Acquire);

        while let Ok(mut buffer) = self.receiver.try_recv() {
            // Arrived after its start frame: play it now rather than clip it
            buffer.start_frame = buffer.start_frame.max(base);
            self.pending.push_back(buffer);
        }

        render_into(data, self.channels, base, &mut self.pending);

        let frames = (data.len() / self.channels.max(1)) as u64;
        self.frames_rendered.fetch_add(frames, Ordering::Release);
    }
}

fn log_stream_error(err: cpal::StreamError) {
    warn!("Audio stream error: {}", err);
}

/// Negotiated device format.
struct StreamSetup {
    config: cpal::StreamConfig,
    format: cpal::SampleFormat,
}

impl StreamSetup {
    fn rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn channels(&self) -> usize {
        self.config.channels as usize
    }
}

/// [`AudioOutput`] on a CPAL output device.
pub struct CpalOutput {
    // Dropping the stream stops playback
    _stream: cpal::Stream,
    sender: Sender<QueuedBuffer>,
    frames_rendered: Arc<AtomicU64>,
    device_rate: u32,
    device_name: String,
}

impl CpalOutput {
    /// Open `device_name`, or the best default output device.
    ///
    /// Tries mono f32 at `sample_rate` first, then the device's native
    /// config with software resampling and channel duplication.
    pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self> {
        let device = find_device(device_name)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let preferred = StreamSetup {
            config: cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            },
            format: cpal::SampleFormat::F32,
        };

        if let Ok(output) = Self::start(&device, &name, preferred)
            && output.probe()
        {
            info!("Audio output: {} (mono/{}Hz)", name, sample_rate);
            return Ok(output);
        }

        // Some PipeWire-ALSA setups accept non-native configs but never call back
        let native = device
            .default_output_config()
            .map_err(|e| OpenAudioError::AudioOutput {
                message: format!("Failed to query default output config: {}", e),
            })?;
        let setup = StreamSetup {
            format: native.sample_format(),
            config: native.into(),
        };
        info!(
            "Audio output: {} (native {}ch/{}Hz/{:?}, converting in software)",
            name,
            setup.channels(),
            setup.rate(),
            setup.format
        );
        Self::start(&device, &name, setup)
    }

    fn start(device: &cpal::Device, name: &str, setup: StreamSetup) -> Result<Self> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let mut renderer = Renderer {
            receiver,
            pending: VecDeque::new(),
            channels: setup.channels(),
            frames_rendered: Arc::clone(&frames_rendered),
        };

        let stream = match setup.format {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &setup.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
                log_stream_error,
                None,
            ),
            cpal::SampleFormat::I16 => {
                let mut scratch: Vec<f32> = Vec::new();
                device.build_output_stream(
                    &setup.config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len(), 0.0);
                        renderer.render(&mut scratch);
                        for (out, &s) in data.iter_mut().zip(scratch.iter()) {
                            *out = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        }
                    },
                    log_stream_error,
                    None,
                )
            }
            fmt => {
                return Err(OpenAudioError::AudioOutput {
                    message: format!(
                        "Unsupported native sample format: {:?}. \
                         Try specifying a device with --device.",
                        fmt
                    ),
                });
            }
        }
        .map_err(|e| OpenAudioError::AudioOutput {
            message: format!("Failed to build output stream: {}", e),
        })?;

        stream.play().map_err(|e| OpenAudioError::AudioOutput {
            message: format!("Failed to start output stream: {}", e),
        })?;

        Ok(Self {
            _stream: stream,
            sender,
            frames_rendered,
            device_rate: setup.rate(),
            device_name: name.to_string(),
        })
    }

    /// Whether the device callback has started firing.
    fn probe(&self) -> bool {
        std::thread::sleep(CALLBACK_PROBE);
        let fired = self.frames_rendered.load(Ordering::Acquire) > 0;
        if !fired {
            debug!("No callback from {} within {:?}", self.device_name, CALLBACK_PROBE);
        }
        fired
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn enqueue(&mut self, start: f64, samples: Vec<f32>, sample_rate: u32) -> Result<()> {
        let (start_frame, end_frame) =
            frame_span(start, samples.len(), sample_rate, self.device_rate);
        let frames = (end_frame - start_frame) as usize;
        let samples = if sample_rate == self.device_rate && frames == samples.len() {
            samples
        } else {
            resample(&samples, sample_rate, self.device_rate, frames)
        };

        self.sender
            .send(QueuedBuffer {
                start_frame,
                samples,
            })
            .map_err(|_| OpenAudioError::AudioOutput {
                message: "audio callback is gone".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(start_frame: u64, samples: &[f32]) -> QueuedBuffer {
        QueuedBuffer {
            start_frame,
            samples: samples.to_vec(),
        }
    }

    #[test]
    fn render_places_buffer_at_start_frame() {
        let mut pending = VecDeque::from([buffer(12, &[0.5, 0.25])]);
        let mut data = [1.0f32; 4];

        render_into(&mut data, 1, 10, &mut pending);

        assert_eq!(data, [0.0, 0.0, 0.5, 0.25]);
        assert!(pending.is_empty());
    }

    #[test]
    fn render_duplicates_mono_to_all_channels() {
        let mut pending = VecDeque::from([buffer(0, &[0.1, 0.2])]);
        let mut data = [0.0f32; 6];

        render_into(&mut data, 2, 0, &mut pending);

        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.0, 0.0]);
    }

    #[test]
    fn render_continues_buffer_across_blocks() {
        let mut pending = VecDeque::from([buffer(2, &[1.0, 2.0, 3.0, 4.0])]);

        let mut first = [0.0f32; 4];
        render_into(&mut first, 1, 0, &mut pending);
        assert_eq!(first, [0.0, 0.0, 1.0, 2.0]);
        assert_eq!(pending.len(), 1);

        let mut second = [0.0f32; 4];
        render_into(&mut second, 1, 4, &mut pending);
        assert_eq!(second, [3.0, 4.0, 0.0, 0.0]);
        assert!(pending.is_empty());
    }

    #[test]
    fn render_back_to_back_buffers_leave_no_gap() {
        let mut pending = VecDeque::from([buffer(0, &[0.1, 0.2]), buffer(2, &[0.3, 0.4])]);
        let mut data = [0.0f32; 4];

        render_into(&mut data, 1, 0, &mut pending);

        assert_eq!(data, [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn render_keeps_future_buffers() {
        let mut pending = VecDeque::from([buffer(100, &[1.0])]);
        let mut data = [0.5f32; 8];

        render_into(&mut data, 1, 0, &mut pending);

        assert_eq!(data, [0.0; 8]);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn renderer_advances_clock_and_plays_late_buffers_now() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let clock = Arc::new(AtomicU64::new(0));
        let mut renderer = Renderer {
            receiver,
            pending: VecDeque::new(),
            channels: 2,
            frames_rendered: Arc::clone(&clock),
        };

        let mut data = [0.0f32; 8];
        renderer.render(&mut data);
        assert_eq!(clock.load(Ordering::Acquire), 4);

        // Start frame already in the past
        sender.send(buffer(1, &[0.7])).unwrap();
        renderer.render(&mut data);
        assert_eq!(&data[..2], &[0.7, 0.7]);
        assert_eq!(clock.load(Ordering::Acquire), 8);
    }

    #[test]
    fn resample_identity_same_rate() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample(&samples, 22050, 22050, 3), samples);
    }

    #[test]
    fn resample_upsample_interpolates() {
        let resampled = resample(&[0.0, 1.0, 0.0], 22050, 44100, 6);
        assert_eq!(resampled.len(), 6);
        assert_eq!(resampled[0], 0.0);
        assert!((resampled[1] - 0.5).abs() < 1e-6);
        assert_eq!(resampled[2], 1.0);
    }

    #[test]
    fn resample_downsample_halves_length() {
        let resampled = resample(&vec![0.25f32; 4800], 48000, 24000, 2400);
        assert_eq!(resampled.len(), 2400);
        assert!(resampled.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn resample_handles_edge_cases() {
        assert!(resample(&[], 22050, 48000, 0).is_empty());
        assert_eq!(resample(&[0.3], 48000, 24000, 1), vec![0.3]);
        // Padding past the source holds the last sample
        assert_eq!(resample(&[0.1, 0.2], 22050, 22050, 3), vec![0.1, 0.2, 0.2]);
    }

    #[test]
    fn resampled_chunks_tile_without_overlap() {
        // 22050 -> 48000 does not divide evenly, so per-chunk rounding matters
        let mut cursor = 0.0;
        let mut next_frame = 0;
        for len in [441usize, 1, 1023, 77, 2205, 3] {
            let (start, end) = frame_span(cursor, len, 22050, 48000);
            assert_eq!(start, next_frame, "chunk of {} samples", len);
            assert!(end >= start);

            let resampled = resample(&vec![0.5; len], 22050, 48000, (end - start) as usize);
            assert_eq!(resampled.len() as u64, end - start);

            next_frame = end;
            cursor += len as f64 / 22050.0;
        }
        assert_eq!(next_frame, (cursor * 48000.0).round() as u64);
    }

    #[test]
    fn tiled_chunks_render_without_doubling() {
        let mut pending = VecDeque::new();
        let mut cursor = 0.0;
        for len in [3usize, 5, 2] {
            let (start, end) = frame_span(cursor, len, 22050, 48000);
            let samples = resample(&vec![0.25; len], 22050, 48000, (end - start) as usize);
            pending.push_back(buffer(start, &samples));
            cursor += len as f64 / 22050.0;
        }

        let mut data = [0.0f32; 32];
        render_into(&mut data, 1, 0, &mut pending);

        assert!(data.iter().all(|&s| s == 0.0 || s == 0.25), "{:?}", data);
    }

    #[test]
    fn filters_speaker_aliases() {
        assert!(should_filter_device("surround51:CARD=PCH"));
        assert!(should_filter_device("front:CARD=PCH,DEV=0"));
        assert!(!should_filter_device("HDMI 1"));
        assert!(!should_filter_device("pipewire"));
    }

    #[test]
    fn prefers_sound_servers() {
        assert!(is_preferred_device("pipewire"));
        assert!(is_preferred_device("PulseAudio Sound Server"));
        assert!(!is_preferred_device("hw:CARD=PCH,DEV=0"));
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn list_output_devices_on_hardware() {
        let devices = list_output_devices().unwrap();
        assert!(!devices.is_empty());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn clock_advances_on_hardware() {
        let output = CpalOutput::new(None, 22050).unwrap();
        let t0 = output.current_time();
        std::thread::sleep(Duration::from_millis(300));
        assert!(output.current_time() > t0);
    }
}
