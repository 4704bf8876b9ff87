//! Terminal rendering for speech results.

use crate::stream::event::UsageStats;
use owo_colors::OwoColorize;
use std::path::PathBuf;

/// What a finished speak command produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakSummary {
    pub path: PathBuf,
    pub bytes_written: usize,
    /// Audio length, when known.
    pub duration: Option<f64>,
    /// Delta events received; `None` for a buffered response.
    pub chunks: Option<usize>,
    pub skipped: usize,
    pub usage: Option<UsageStats>,
}

/// `1.25s`, or `1m 02.5s` past a minute.
pub fn format_duration(secs: f64) -> String {
    let secs = secs.max(0.0);
    if secs < 60.0 {
        format!("{:.2}s", secs)
    } else {
        let minutes = (secs / 60.0).floor();
        format!("{}m {:04.1}s", minutes as u64, secs - minutes * 60.0)
    }
}

pub fn format_usage(usage: &UsageStats) -> String {
    format!(
        "{} input + {} output = {} tokens",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    )
}

/// Spinner message while streaming.
pub fn progress_message(chunks: usize, bytes: usize) -> String {
    let plural = if chunks == 1 { "" } else { "s" };
    format!("Streaming… {} chunk{} ({} KiB)", chunks, plural, bytes / 1024)
}

/// Print the result block to stdout.
pub fn print_summary(summary: &SpeakSummary) {
    println!(
        "{} {} ({} bytes)",
        "Saved".green(),
        summary.path.display(),
        summary.bytes_written
    );
    if let Some(duration) = summary.duration {
        println!("  {}  {}", "Duration:".dimmed(), format_duration(duration));
    }
    if let Some(chunks) = summary.chunks {
        if summary.skipped > 0 {
            println!(
                "  {}    {} ({} skipped)",
                "Chunks:".dimmed(),
                chunks,
                summary.skipped.yellow()
            );
        } else {
            println!("  {}    {}", "Chunks:".dimmed(), chunks);
        }
    }
    if let Some(usage) = &summary.usage {
        println!("  {}     {}", "Usage:".dimmed(), format_usage(usage));
    }
}
