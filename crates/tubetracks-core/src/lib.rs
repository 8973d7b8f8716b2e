//! Tubetracks Core Library
//!
//! This crate walks a playlist and turns every entry into a tagged audio file:
//! - Playlist traversal with discovery running ahead of conversion
//! - Conversion of each item through an external encoder (ffmpeg)
//! - Tag construction (album, artist, title, track) and filename sanitizing
//! - Progress notifications for callers
//!
//! The source of playlist items and the encoder are traits, so the traversal
//! can be driven by `YouTube` and ffmpeg or by in-memory fakes.

pub mod config;
pub mod convert;
pub mod downloader;
pub mod encoder;
pub mod error;
pub mod progress;
pub mod sanitize;
pub mod source;
pub mod tags;
pub mod youtube;

pub use config::{AppConfig, AudioFormat, YouTubeConfig};
pub use convert::{OutputTarget, convert};
pub use downloader::{
    DownloadHandle, DownloadSummary, PlaylistDownloader, SessionMetadata, SessionOptions,
};
pub use encoder::{AudioEncoder, EncodeRequest, FfmpegEncoder};
pub use error::{Error, Result};
pub use progress::{DownloadEvent, DownloadedFile, ItemFailure, ProgressChannel};
pub use sanitize::sanitize;
pub use source::{ByteStream, ItemInfo, PlaylistReference, PlaylistSource, SourceFetch, SourceItem};
pub use tags::{AudioFileMetadata, TagDirective, TagValue, build_tag_options};
pub use youtube::{YouTubeSource, validate_youtube_url};
