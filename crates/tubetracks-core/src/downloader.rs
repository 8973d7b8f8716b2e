//! Playlist traversal and conversion orchestration.
//!
//! A [`PlaylistDownloader`] owns one download session. It walks the playlist
//! by repeatedly fetching the next discovered reference, hands each resolved
//! item to the conversion stage and reports progress through its
//! [`ProgressChannel`].
//!
//! Discovery runs ahead of conversion: while item N converts, item N+1 is
//! already being fetched. The number of conversions running at once is
//! bounded by `max_concurrent_conversions`.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tubetracks_core::{FfmpegEncoder, PlaylistDownloader, SessionOptions, YouTubeSource};
//!
//! # async fn demo() -> tubetracks_core::Result<()> {
//! let options = SessionOptions::new(
//!     "https://www.youtube.com/playlist?list=PLrAXtmErZgOei",
//!     "/tmp/music",
//! )
//! .with_album("Mixtape");
//!
//! let downloader = PlaylistDownloader::new(
//!     options,
//!     Arc::new(YouTubeSource::new()),
//!     Arc::new(FfmpegEncoder::locate(None)?),
//! )?;
//! downloader.on_downloaded_file(|title, index| println!("{index}. Downloaded \"{title}\"."));
//!
//! let summary = downloader.download().join().await?;
//! println!("{} files written", summary.completed);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{
    AppConfig, AudioFormat, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_CONVERSIONS,
    MAX_CONCURRENT_CONVERSIONS, MIN_CONCURRENT_CONVERSIONS,
};
use crate::convert::{OutputTarget, convert};
use crate::encoder::AudioEncoder;
use crate::error::{Error, Result};
use crate::progress::{DownloadEvent, DownloadedFile, ItemFailure, ProgressChannel};
use crate::source::{ItemInfo, PlaylistReference, PlaylistSource, SourceFetch, SourceItem};
use crate::tags::{ALBUM, ARTIST, AudioFileMetadata, TITLE, TRACK};

/// Tags applied to every file of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Album tag; empty or `None` leaves the tag out.
    pub album: Option<String>,
    /// Artist tag; empty or `None` leaves the tag out.
    pub artist: Option<String>,
}

/// Everything needed to start a download session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Playlist URL or other source reference.
    pub playlist_reference: String,
    /// Existing directory the audio files are written into.
    pub destination_directory: PathBuf,
    /// Format of the produced files.
    pub audio_format: AudioFormat,
    /// Constant tags.
    pub metadata: SessionMetadata,
    /// Maximum number of conversions running at once.
    pub max_concurrent_conversions: usize,
    /// Time allowed for resolving one reference; `None` waits forever.
    pub fetch_timeout: Option<Duration>,
}

impl SessionOptions {
    /// Options with default format, no constant tags and default limits.
    pub fn new(
        playlist_reference: impl Into<String>,
        destination_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            playlist_reference: playlist_reference.into(),
            destination_directory: destination_directory.into(),
            audio_format: AudioFormat::default(),
            metadata: SessionMetadata::default(),
            max_concurrent_conversions: DEFAULT_MAX_CONCURRENT_CONVERSIONS,
            fetch_timeout: Some(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)),
        }
    }

    /// Take format, concurrency and timeout from `config`.
    #[must_use]
    pub const fn with_config(mut self, config: &AppConfig) -> Self {
        self.audio_format = config.audio_format;
        self.max_concurrent_conversions = config.max_concurrent_conversions;
        self.fetch_timeout = config.fetch_timeout();
        self
    }

    /// Set the audio format.
    #[must_use]
    pub const fn with_audio_format(mut self, format: AudioFormat) -> Self {
        self.audio_format = format;
        self
    }

    /// Replace both constant tags.
    #[must_use]
    pub fn with_metadata(mut self, metadata: SessionMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the album tag.
    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.metadata.album = Some(album.into());
        self
    }

    /// Set the artist tag.
    #[must_use]
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.metadata.artist = Some(artist.into());
        self
    }

    /// Set the conversion concurrency bound.
    #[must_use]
    pub const fn with_max_concurrent_conversions(mut self, max: usize) -> Self {
        self.max_concurrent_conversions = max;
        self
    }

    /// Set the per-reference fetch timeout.
    #[must_use]
    pub const fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Outcome counts of a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSummary {
    /// Items resolved by the source.
    pub discovered: u64,
    /// Items converted and written.
    pub completed: u64,
    /// Items skipped because of an error.
    pub failed: u64,
    /// Items abandoned because the session was cancelled.
    pub cancelled: u64,
}

/// Immutable per-session settings.
#[derive(Debug)]
struct DownloadSession {
    playlist_reference: PlaylistReference,
    destination_directory: PathBuf,
    constant_tags: AudioFileMetadata,
    audio_format: AudioFormat,
}

impl DownloadSession {
    /// Constant tags followed by the item's title and track.
    fn item_tags(&self, title: &str, track: u64) -> AudioFileMetadata {
        let mut tags = self.constant_tags.clone();
        tags.insert(TITLE, title);
        tags.insert(TRACK, track);
        tags
    }
}

/// Mutable session counters. `completed` is the sequence counter.
#[derive(Debug, Default)]
struct SessionStats {
    completed: u64,
    failed: u64,
    cancelled: u64,
}

struct Pipeline {
    session: DownloadSession,
    source: Arc<dyn PlaylistSource>,
    encoder: Arc<dyn AudioEncoder>,
    progress: ProgressChannel,
    stats: Mutex<SessionStats>,
    cancel: CancellationToken,
    max_concurrent_conversions: usize,
    fetch_timeout: Option<Duration>,
}

impl Pipeline {
    async fn run(self: Arc<Self>) -> DownloadSummary {
        info!(
            "Starting download of {} into {}",
            self.session.playlist_reference,
            self.session.destination_directory.display()
        );

        let slots = Arc::new(Semaphore::new(self.max_concurrent_conversions));
        let mut conversions = JoinSet::new();
        let mut discovered = 0u64;
        let mut next = Some(self.session.playlist_reference.clone());

        while let Some(reference) = next.take() {
            let fetched = tokio::select! {
                () = self.cancel.cancelled() => break,
                fetched = self.fetch(&reference) => fetched,
            };
            next = fetched.next;

            match fetched.item {
                Some(Ok(item)) => {
                    discovered += 1;
                    let permit = tokio::select! {
                        () = self.cancel.cancelled() => None,
                        permit = Arc::clone(&slots).acquire_owned() => permit.ok(),
                    };
                    let Some(permit) = permit else {
                        warn!("Cancelled before converting '{}'", item.info.title);
                        self.stats.lock().await.cancelled += 1;
                        break;
                    };

                    let pipeline = Arc::clone(&self);
                    conversions.spawn(async move {
                        let _permit = permit;
                        pipeline.convert_item(reference, item).await;
                    });
                }
                Some(Err(error)) => self.report_failure(&reference, None, &error).await,
                None => debug!("Nothing to convert for {}", reference),
            }
        }

        while let Some(joined) = conversions.join_next().await {
            if let Err(e) = joined {
                error!("Conversion task ended abnormally: {}", e);
            }
        }
        self.progress.close();

        let stats = self.stats.lock().await;
        let summary = DownloadSummary {
            discovered,
            completed: stats.completed,
            failed: stats.failed,
            cancelled: stats.cancelled,
        };
        info!(
            "Finished {}: {} downloaded, {} failed, {} cancelled",
            self.session.playlist_reference, summary.completed, summary.failed, summary.cancelled
        );
        summary
    }

    async fn fetch(&self, reference: &PlaylistReference) -> SourceFetch {
        debug!("Fetching {} from {}", reference, self.source.name());
        let Some(limit) = self.fetch_timeout else {
            return self.source.fetch(reference).await;
        };

        match tokio::time::timeout(limit, self.source.fetch(reference)).await {
            Ok(fetched) => fetched,
            Err(_) => {
                warn!("No answer for {} within {:?}, ending traversal", reference, limit);
                SourceFetch::failed(
                    Error::FetchTimeout {
                        reference: reference.to_string(),
                        secs: limit.as_secs(),
                    },
                    None,
                )
            }
        }
    }

    async fn convert_item(&self, reference: PlaylistReference, item: SourceItem) {
        let info = item.info.clone();
        let title = info.title.clone();
        let track = self.stats.lock().await.completed + 1;
        let tags = self.session.item_tags(&title, track);
        let target = OutputTarget::new(
            &self.session.destination_directory,
            &title,
            self.session.audio_format,
        );

        info!("Converting '{}' as track {}", title, track);
        let outcome = tokio::select! {
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            outcome = convert(self.encoder.as_ref(), item, &target, &tags) => outcome,
        };

        match outcome {
            Ok(path) => self.complete(info, path).await,
            Err(Error::Cancelled) => {
                warn!("Conversion of '{}' cancelled", title);
                self.stats.lock().await.cancelled += 1;
            }
            Err(error) => self.report_failure(&reference, Some(&title), &error).await,
        }
    }

    /// Bump the sequence counter and announce the file under the same lock,
    /// so listeners see sequence numbers in increasing order.
    async fn complete(&self, info: ItemInfo, path: PathBuf) {
        let mut stats = self.stats.lock().await;
        stats.completed += 1;
        let sequence_number = stats.completed;

        info!(
            channel = info.channel.as_deref().unwrap_or("-"),
            duration_secs = info.duration_secs,
            "{}. Downloaded '{}' to {}",
            sequence_number,
            info.title,
            path.display()
        );
        self.progress
            .publish(&DownloadEvent::FileDownloaded(DownloadedFile {
                title: info.title,
                sequence_number,
                path,
                channel: info.channel,
                duration_secs: info.duration_secs,
            }));
    }

    async fn report_failure(
        &self,
        reference: &PlaylistReference,
        title: Option<&str>,
        error: &Error,
    ) {
        let mut stats = self.stats.lock().await;
        stats.failed += 1;

        error!(
            reference = %reference,
            title = title.unwrap_or("-"),
            "Skipping playlist item: {}",
            error
        );
        self.progress.publish(&DownloadEvent::ItemFailed(ItemFailure {
            reference: reference.clone(),
            title: title.map(str::to_owned),
            error: error.to_string(),
        }));
    }
}

/// Downloads every item of one playlist.
pub struct PlaylistDownloader {
    pipeline: Arc<Pipeline>,
}

impl PlaylistDownloader {
    /// Validate `options` and set up a session.
    ///
    /// Nothing is written to disk here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPlaylistReference`] for a blank reference and
    /// [`Error::DestinationNotFound`] when the destination is not an existing
    /// directory.
    pub fn new(
        options: SessionOptions,
        source: Arc<dyn PlaylistSource>,
        encoder: Arc<dyn AudioEncoder>,
    ) -> Result<Self> {
        let playlist_reference = PlaylistReference::new(options.playlist_reference)?;
        validate_destination(&options.destination_directory)?;

        let mut constant_tags = AudioFileMetadata::new();
        constant_tags.insert_opt(ALBUM, non_empty(options.metadata.album));
        constant_tags.insert_opt(ARTIST, non_empty(options.metadata.artist));

        let session = DownloadSession {
            playlist_reference,
            destination_directory: options.destination_directory,
            constant_tags,
            audio_format: options.audio_format,
        };

        Ok(Self {
            pipeline: Arc::new(Pipeline {
                session,
                source,
                encoder,
                progress: ProgressChannel::new(),
                stats: Mutex::new(SessionStats::default()),
                cancel: CancellationToken::new(),
                max_concurrent_conversions: options
                    .max_concurrent_conversions
                    .clamp(MIN_CONCURRENT_CONVERSIONS, MAX_CONCURRENT_CONVERSIONS),
                fetch_timeout: options.fetch_timeout,
            }),
        })
    }

    /// The playlist this session downloads.
    #[must_use]
    pub fn playlist_reference(&self) -> &PlaylistReference {
        &self.pipeline.session.playlist_reference
    }

    /// Directory the files are written into.
    #[must_use]
    pub fn destination_directory(&self) -> &Path {
        &self.pipeline.session.destination_directory
    }

    /// Call `listener` with the title and sequence number of every written file.
    pub fn on_downloaded_file(&self, listener: impl Fn(&str, u64) + Send + Sync + 'static) {
        self.pipeline.progress.subscribe_listener(move |event| {
            if let DownloadEvent::FileDownloaded(file) = event {
                listener(&file.title, file.sequence_number);
            }
        });
    }

    /// Call `listener` for every skipped item.
    pub fn on_item_failed(&self, listener: impl Fn(&ItemFailure) + Send + Sync + 'static) {
        self.pipeline.progress.subscribe_listener(move |event| {
            if let DownloadEvent::ItemFailed(failure) = event {
                listener(failure);
            }
        });
    }

    /// Receive every event of the session; the stream ends with the session.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DownloadEvent> {
        self.pipeline.progress.subscribe()
    }

    /// Token that cancels the session when triggered.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.pipeline.cancel.clone()
    }

    /// Start the session in the background.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn download(self) -> DownloadHandle {
        let cancel = self.pipeline.cancel.clone();
        DownloadHandle {
            task: tokio::spawn(self.pipeline.run()),
            cancel,
        }
    }

    /// Run the session to completion on the current task.
    pub async fn run(self) -> DownloadSummary {
        self.pipeline.run().await
    }
}

impl std::fmt::Debug for PlaylistDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistDownloader")
            .field("session", &self.pipeline.session)
            .finish_non_exhaustive()
    }
}

/// Handle to a session started with [`PlaylistDownloader::download`].
#[derive(Debug)]
pub struct DownloadHandle {
    task: JoinHandle<DownloadSummary>,
    cancel: CancellationToken,
}

impl DownloadHandle {
    /// Stop discovering items and abort running conversions.
    pub fn cancel(&self) {
        info!("Cancelling download session");
        self.cancel.cancel();
    }

    /// Whether the session has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskFailed`] if the session task panicked or was aborted.
    pub async fn join(self) -> Result<DownloadSummary> {
        self.task
            .await
            .map_err(|e| Error::TaskFailed(e.to_string()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_destination(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(Error::DestinationNotFound(path.to_path_buf()))
    }
}
