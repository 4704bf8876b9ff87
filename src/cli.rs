//! Command-line interface for openaudio
//!
//! Provides argument parsing using clap derive macros.

use crate::config::Config;
use crate::stream::framing::Framing;
use crate::transport::StreamFormat;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Stream speech from an OpenAI-compatible TTS server
#[derive(Parser, Debug)]
#[command(
    name = "openaudio",
    version,
    about = "Stream speech from an OpenAI-compatible TTS server",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: progress, -vv: per-chunk diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub speak: SpeakArgs,
}

/// Options for synthesizing text
#[derive(Args, Debug, Clone, Default)]
pub struct SpeakArgs {
    /// Text to speak (reads stdin when omitted)
    pub text: Option<String>,

    /// Speech server base URL (e.g., http://localhost:8000)
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,

    /// API key sent as a bearer token
    #[arg(long, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Voice (random, alloy, echo, fable, onyx, nova, shimmer)
    #[arg(long, value_name = "VOICE")]
    pub voice: Option<String>,

    /// Synthesis model
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Response mode: stream deltas (sse) or fetch one file (audio)
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub format: Option<StreamFormat>,

    /// Container requested in audio mode (e.g., wav, pcm)
    #[arg(long, value_name = "FORMAT")]
    pub response_format: Option<String>,

    /// Where to write the audio file
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Save the file without playing it
    #[arg(long)]
    pub no_play: bool,

    /// Audio output device (see `openaudio devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Connect timeout. Examples: 10, 30s, 2m
    #[arg(long, value_name = "DURATION", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// PCM sample rate of the streamed audio in Hz
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Record framing of the event stream
    #[arg(long, value_enum, value_name = "FRAMING")]
    pub framing: Option<Framing>,
}

impl SpeakArgs {
    /// Override configuration values with the flags that were given.
    pub fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.url {
            config.server.api_url = url.clone();
        }
        if let Some(key) = &self.api_key {
            config.server.api_key = Some(key.clone());
        }
        if let Some(voice) = &self.voice {
            config.server.voice = voice.clone();
        }
        if let Some(model) = &self.model {
            config.server.model = model.clone();
        }
        if let Some(format) = self.format {
            config.server.stream_format = format;
        }
        if let Some(response_format) = &self.response_format {
            config.server.response_format = Some(response_format.clone());
        }
        if let Some(output) = &self.output {
            config.output.path = output.clone();
        }
        if self.no_play {
            config.audio.play = false;
        }
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        if let Some(timeout) = self.timeout {
            config.server.connect_timeout_secs = timeout.as_secs().max(1);
        }
        if let Some(rate) = self.sample_rate {
            config.audio.sample_rate = rate;
        }
        if let Some(framing) = self.framing {
            config.audio.framing = framing;
        }
    }
}

/// Parse a timeout: bare seconds or any `humantime` duration (`30s`, `2m`).
fn parse_timeout(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio output devices
    Devices,

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file + environment)
    Show,
    /// Print the configuration file path
    Path,
    /// Dump a commented configuration template
    Dump,
}
