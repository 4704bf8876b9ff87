use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use openaudio::app::run_speak_command;
use openaudio::cli::{Cli, Commands, ConfigAction};
use openaudio::config::{Config, dump_template};
use openaudio::error::OpenAudioError;
use openaudio::output::print_summary;
use owo_colors::OwoColorize;
use std::io::{IsTerminal, Read};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    openaudio::logging::init(cli.verbose, cli.quiet);
    tracing::debug!("openaudio {}", openaudio::version_string());

    match cli.command {
        None => {
            let mut config = load_config(cli.config.as_deref())?;
            cli.speak.apply(&mut config);
            let text = read_text(cli.speak.text.clone())?;

            match run_speak_command(config, text, cli.quiet).await {
                Ok(summary) => {
                    if !cli.quiet {
                        print_summary(&summary);
                    }
                }
                Err(OpenAudioError::Cancelled) => {
                    if !cli.quiet {
                        eprintln!("{}", "Cancelled".yellow());
                    }
                    std::process::exit(130);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Some(Commands::Devices) => {
            list_audio_devices()?;
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "openaudio", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/openaudio/config.toml)
/// 3. Built-in defaults
///
/// Environment overrides apply on top; CLI flags are applied by the caller.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()?)?,
    };
    Ok(config.with_env_overrides())
}

/// Text from the argument, or all of stdin when it is piped.
fn read_text(arg: Option<String>) -> Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        bail!("No text given. Pass TEXT or pipe it on stdin (see --help)");
    }

    let mut text = String::new();
    stdin
        .lock()
        .read_to_string(&mut text)
        .context("Failed to read text from stdin")?;
    Ok(text)
}

#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = openaudio::playback::list_output_devices()?;

    if devices.is_empty() {
        eprintln!("No audio output devices found");
        std::process::exit(1);
    }

    println!("Available audio output devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

#[cfg(not(feature = "cpal-audio"))]
fn list_audio_devices() -> Result<()> {
    bail!("openaudio was built without audio output support (feature `cpal-audio`)")
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_display_toml()?);
        }
        ConfigAction::Path => {
            let path = match custom_path {
                Some(path) => path.to_path_buf(),
                None => Config::default_path()?,
            };
            let marker = if path.exists() {
                "exists".green().to_string()
            } else {
                "not created".dimmed().to_string()
            };
            println!("{} ({})", path.display(), marker);
        }
        ConfigAction::Dump => {
            print!("{}", dump_template());
        }
    }
    Ok(())
}
