//! Tubetracks - download a YouTube playlist as tagged audio files.
//!
//! This is the command line entry point. It validates the invocation, sets up
//! logging and configuration, then drives a [`PlaylistDownloader`] with the
//! `YouTube` source and the ffmpeg encoder.

mod args;
mod error;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tubetracks_core::{
    AppConfig, DownloadSummary, FfmpegEncoder, PlaylistDownloader, PlaylistReference,
    SessionOptions, YouTubeSource,
};

use args::Args;
use error::CliError;
use logging::LoggingConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) if e.is_usage() => {
            println!("{}", e.exit_message());
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e.exit_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<DownloadSummary, CliError> {
    // Usage is checked before anything touches the filesystem
    let reference = PlaylistReference::new(args.playlist.clone().unwrap_or_default())
        .map_err(CliError::from_reference_error)?;

    let mut logging_config = LoggingConfig::default().with_console_level(args.console_level());
    if let Some(dir) = &args.log_dir {
        logging_config = logging_config.with_log_directory(dir.clone());
    }
    let _guard = logging::init(&logging_config)?;

    info!("Starting tubetracks {}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config_path();
    let mut config = AppConfig::load_from(&config_path)?;
    args.apply_to(&mut config);
    if args.save_config {
        config.save_to(&config_path)?;
    }

    YouTubeSource::check_reference(&reference)?;
    let encoder = FfmpegEncoder::locate(config.ffmpeg_path.as_deref())?;
    info!("Using encoder at {}", encoder.binary_path().display());

    let destination = match &args.destination {
        Some(dir) => dir.clone(),
        None => temp_destination()?,
    };
    println!("Downloading into \"{}\".", destination.display());

    let options = SessionOptions::new(reference.as_str(), &destination)
        .with_config(&config)
        .with_metadata(args.metadata());
    let downloader = PlaylistDownloader::new(
        options,
        Arc::new(YouTubeSource::with_config(config.youtube.clone())),
        Arc::new(encoder),
    )?;

    let printer = if args.json {
        Some(print_json_events(&downloader))
    } else {
        downloader.on_downloaded_file(|title, n| println!("{n}. Downloaded \"{title}\"."));
        None
    };

    let cancel = downloader.cancellation_token();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling downloads");
            cancel.cancel();
        }
    });

    let summary = downloader.download().join().await?;

    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!("Event printer ended abnormally: {}", e);
        }
        println!("{}", serde_json::to_string(&summary)?);
    } else if summary.failed > 0 {
        eprintln!("{} item(s) could not be downloaded.", summary.failed);
    }

    info!(
        "Done: {} downloaded, {} failed, {} cancelled",
        summary.completed, summary.failed, summary.cancelled
    );
    Ok(summary)
}

/// Print every event as one JSON line until the session ends.
fn print_json_events(downloader: &PlaylistDownloader) -> JoinHandle<()> {
    let mut events = downloader.subscribe();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        }
    })
}

/// Fresh directory under the system temp dir, kept after exit.
fn temp_destination() -> Result<PathBuf, CliError> {
    tempfile::Builder::new()
        .prefix("tubetracks-")
        .tempdir()
        .map(tempfile::TempDir::keep)
        .map_err(CliError::TempDir)
}
