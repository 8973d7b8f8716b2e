//! Command line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Parser};
use tracing::Level;
use tubetracks_core::{AppConfig, AudioFormat, SessionMetadata};

/// Download a YouTube playlist as tagged audio files.
#[derive(Parser, Debug)]
#[command(name = "tubetracks")]
#[command(about = "Download a YouTube playlist as tagged audio files")]
#[command(version)]
pub struct Args {
    /// Playlist URL
    pub playlist: Option<String>,

    /// Directory the files are written into (a new temporary directory by default)
    #[arg(short, long, env = "TUBETRACKS_DESTINATION")]
    pub destination: Option<PathBuf>,

    /// Album tag for every file
    #[arg(long, default_value = "")]
    pub album: String,

    /// Artist tag for every file
    #[arg(long, default_value = "")]
    pub artist: String,

    /// Output format (mp3, m4a, ogg, opus, flac, wav)
    #[arg(short, long)]
    pub format: Option<AudioFormat>,

    /// Maximum number of conversions running at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Path to the ffmpeg binary
    #[arg(long, env = "TUBETRACKS_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,

    /// Seconds allowed for resolving one playlist entry (0 waits forever)
    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,

    /// Configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Write the effective settings back to the configuration file
    #[arg(long)]
    pub save_config: bool,

    /// Print progress events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Directory for JSON log files
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Increase console log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Configuration file to read, and write with `--save-config`.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(AppConfig::config_file_path)
    }

    /// Let command line flags override `config`.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(format) = self.format {
            config.audio_format = format;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrent_conversions = concurrency;
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            config.ffmpeg_path = Some(ffmpeg.clone());
        }
        if let Some(secs) = self.fetch_timeout {
            config.fetch_timeout_secs = secs;
        }
        config.validate();
    }

    /// Album and artist tags; empty values leave the tag out.
    pub fn metadata(&self) -> SessionMetadata {
        let present = |value: &str| (!value.trim().is_empty()).then(|| value.to_string());
        SessionMetadata {
            album: present(&self.album),
            artist: present(&self.artist),
        }
    }

    /// Console log level selected by `-v`.
    pub const fn console_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
