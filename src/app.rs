//! Speech application entry point.
//!
//! Orchestrates one request end to end:
//! request → transport → stream session → file + playback

use crate::config::Config;
use crate::error::{OpenAudioError, Result};
use crate::output::{SpeakSummary, progress_message};
use crate::playback::{AudioOutput, NullOutput, play_container, wait_for_playback};
use crate::stream::session::{CancelHandle, Progress, SessionConfig, StreamSession};
use crate::transport::{HttpTransport, SpeechRequest, SpeechTransport, StreamFormat};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Run the speak command: synthesize `text`, play it, and save the WAV.
///
/// Ctrl-C cancels the request; audio already queued is torn down with the
/// output device.
pub async fn run_speak_command(mut config: Config, text: String, quiet: bool) -> Result<SpeakSummary> {
    config.validate()?;

    let transport = HttpTransport::from_config(&config)?;
    let output = open_output(&mut config)?;

    let cancel = CancelHandle::new();
    let ctrl_c = spawn_ctrl_c(cancel.clone());
    let spinner = (!quiet).then(new_spinner);

    let result = speak(&config, &text, &transport, output, &cancel, spinner.as_ref()).await;

    ctrl_c.abort();
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    result
}

/// Send one request through `transport` and deliver the audio to `output`
/// and the configured file.
pub async fn speak<T, O>(
    config: &Config,
    text: &str,
    transport: &T,
    output: O,
    cancel: &CancelHandle,
    spinner: Option<&ProgressBar>,
) -> Result<SpeakSummary>
where
    T: SpeechTransport + ?Sized,
    O: AudioOutput,
{
    let request = SpeechRequest::new(config, text);
    request.validate()?;

    match config.server.stream_format {
        StreamFormat::Sse => stream_speech(config, &request, transport, output, cancel, spinner).await,
        StreamFormat::Audio => fetch_speech(config, &request, transport, output, cancel).await,
    }
}

async fn stream_speech<T, O>(
    config: &Config,
    request: &SpeechRequest,
    transport: &T,
    output: O,
    cancel: &CancelHandle,
    spinner: Option<&ProgressBar>,
) -> Result<SpeakSummary>
where
    T: SpeechTransport + ?Sized,
    O: AudioOutput,
{
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(OpenAudioError::Cancelled),
        body = transport.open_stream(request) => body?,
    };

    let mut session = StreamSession::new(SessionConfig::from(config), output).with_cancel(cancel.clone());
    let progress_task = spinner.map(|pb| spawn_progress(pb.clone(), session.subscribe()));

    let result = session.run(body).await;

    if let Some(task) = progress_task {
        task.abort();
    }

    match result {
        Ok(outcome) => {
            write_container(&config.output.path, &outcome.container)?;
            if config.audio.play {
                if let Some(pb) = spinner {
                    pb.set_message("Playing…");
                }
                drain(session.output(), outcome.playback_end, cancel).await;
            }

            Ok(SpeakSummary {
                path: config.output.path.clone(),
                bytes_written: outcome.container.len(),
                duration: Some(outcome.duration),
                chunks: Some(outcome.chunks),
                skipped: outcome.skipped,
                usage: outcome.usage,
            })
        }
        Err(OpenAudioError::Cancelled) => Err(OpenAudioError::Cancelled),
        Err(e) => {
            // Let what already reached the device finish before reporting
            if config.audio.play {
                drain(session.output(), session.playback_end(), cancel).await;
            }
            Err(e)
        }
    }
}

async fn fetch_speech<T, O>(
    config: &Config,
    request: &SpeechRequest,
    transport: &T,
    mut output: O,
    cancel: &CancelHandle,
) -> Result<SpeakSummary>
where
    T: SpeechTransport + ?Sized,
    O: AudioOutput,
{
    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(OpenAudioError::Cancelled),
        bytes = transport.fetch_audio(request) => bytes?,
    };
    info!("Received {} bytes", bytes.len());

    write_container(&config.output.path, &bytes)?;

    if config.audio.play {
        match play_container(&mut output, &bytes) {
            Ok(end) => drain(&output, end, cancel).await,
            Err(e) => warn!("Not playing response: {}", e),
        }
    }

    Ok(SpeakSummary {
        path: config.output.path.clone(),
        bytes_written: bytes.len(),
        duration: wav_duration(&bytes),
        chunks: None,
        skipped: 0,
        usage: None,
    })
}

/// Open the playback device, or a silent output when playback is off.
///
/// A failure to open the default device disables playback for this run; a
/// device that was asked for by name must open.
fn open_output(config: &mut Config) -> Result<Box<dyn AudioOutput>> {
    if !config.audio.play {
        return Ok(Box::new(NullOutput::new()));
    }

    #[cfg(feature = "cpal-audio")]
    {
        use crate::playback::{CpalOutput, suppress_audio_warnings};

        suppress_audio_warnings();
        match CpalOutput::new(config.audio.device.as_deref(), config.audio.sample_rate) {
            Ok(output) => return Ok(Box::new(output)),
            Err(e) if config.audio.device.is_some() => return Err(e),
            Err(e) => warn!("Playback disabled: {}", e),
        }
    }
    #[cfg(not(feature = "cpal-audio"))]
    warn!("Playback disabled: built without audio output support");

    config.audio.play = false;
    Ok(Box::new(NullOutput::new()))
}

/// Wait for queued audio to play out, unless cancelled first.
async fn drain<O: AudioOutput + ?Sized>(output: &O, end: f64, cancel: &CancelHandle) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = wait_for_playback(output, end) => {}
    }
}

fn write_container(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes)
        .map_err(|e| OpenAudioError::Other(format!("Failed to write {}: {e}", path.display())))
}

/// Duration of a WAV payload, if it is one.
fn wav_duration(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(Cursor::new(bytes)).ok()?;
    let rate = reader.spec().sample_rate;
    (rate > 0).then(|| reader.duration() as f64 / rate as f64)
}

fn spawn_ctrl_c(cancel: CancelHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            cancel.cancel();
        }
    })
}

fn new_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        // SAFETY: hardcoded template string, always valid
        #[allow(clippy::expect_used)]
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .expect("hardcoded spinner template"),
    );
    pb.set_message("Connecting…");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn spawn_progress(pb: ProgressBar, mut progress: watch::Receiver<Progress>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = *progress.borrow();
            pb.set_message(progress_message(p.chunks_received, p.bytes_received));
        }
    })
}
