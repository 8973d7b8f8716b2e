//! `YouTube` playlist source.
//!
//! Resolves `YouTube` playlist references into playable items, one entry per
//! fetch. The playlist page is scraped once per playlist and cached; every
//! entry is then addressed by a watch URL carrying the playlist id and a
//! 1-based `index`, which doubles as the "next" reference handed back to the
//! traversal.
//!
//! Media streams are opened with `rusty_ytdl`, so no `yt-dlp` is required.
//!
//! ## Limitations
//!
//! Only the entries embedded in the initial playlist page are listed (about
//! one hundred); continuation pages are not requested.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tubetracks_core::source::{PlaylistReference, PlaylistSource};
//! use tubetracks_core::youtube::YouTubeSource;
//!
//! # async fn demo() -> tubetracks_core::Result<()> {
//! let source = YouTubeSource::new();
//! let reference = PlaylistReference::new("https://www.youtube.com/playlist?list=PLtest123")?;
//! let fetched = source.fetch(&reference).await;
//! println!("next: {:?}", fetched.next);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use rusty_ytdl::{Video, VideoOptions, VideoQuality, VideoSearchOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::YouTubeConfig;
use crate::error::{Error, Result};
use crate::source::{ByteStream, ItemInfo, PlaylistReference, PlaylistSource, SourceFetch, SourceItem};

/// Result of `YouTube` URL validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YouTubeUrlValidation {
    /// Whether the URL is valid.
    pub is_valid: bool,
    /// The extracted playlist ID (if valid).
    pub playlist_id: Option<String>,
    /// The normalized/canonical URL.
    pub normalized_url: Option<String>,
    /// Error message if validation failed.
    pub error_message: Option<String>,
    /// The URL type detected.
    pub url_type: YouTubeUrlType,
}

/// Type of `YouTube` URL detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum YouTubeUrlType {
    /// Standard playlist URL (youtube.com/playlist?list=...)
    Playlist,
    /// Watch URL with playlist parameter (youtube.com/watch?v=...&list=...)
    WatchWithPlaylist,
    /// Single video URL without playlist
    SingleVideo,
    /// Short URL (youtu.be/...)
    ShortUrl,
    /// Invalid or unrecognized URL
    #[default]
    Invalid,
}

impl YouTubeUrlValidation {
    /// Create a successful validation result.
    #[must_use]
    pub const fn valid(
        playlist_id: String,
        url_type: YouTubeUrlType,
        normalized_url: String,
    ) -> Self {
        Self {
            is_valid: true,
            playlist_id: Some(playlist_id),
            normalized_url: Some(normalized_url),
            error_message: None,
            url_type,
        }
    }

    /// Create a failed validation result.
    #[must_use]
    pub const fn invalid(error_message: String, url_type: YouTubeUrlType) -> Self {
        Self {
            is_valid: false,
            playlist_id: None,
            normalized_url: None,
            error_message: Some(error_message),
            url_type,
        }
    }
}

/// Validate a `YouTube` URL and extract its playlist id.
///
/// # Supported URL Formats
///
/// - `https://www.youtube.com/playlist?list=PLxxxxxxxx`
/// - `https://www.youtube.com/watch?v=xxxxx&list=PLxxxxxxxx&index=3`
/// - `https://youtu.be/xxxxx?list=PLxxxxxxxx`
/// - `http://` variants are also accepted
///
/// ```rust
/// use tubetracks_core::youtube::validate_youtube_url;
///
/// let result = validate_youtube_url("https://www.youtube.com/playlist?list=PLrAXtmErZgOei");
/// assert!(result.is_valid);
/// assert_eq!(result.playlist_id, Some("PLrAXtmErZgOei".to_string()));
///
/// let result = validate_youtube_url("https://example.com");
/// assert!(!result.is_valid);
/// ```
#[must_use]
pub fn validate_youtube_url(url: &str) -> YouTubeUrlValidation {
    let url = url.trim();

    if url.is_empty() {
        return YouTubeUrlValidation::invalid(
            "URL cannot be empty".to_string(),
            YouTubeUrlType::Invalid,
        );
    }

    let url_lower = url.to_lowercase();
    if !url_lower.starts_with("http://") && !url_lower.starts_with("https://") {
        return YouTubeUrlValidation::invalid(
            "URL must start with http:// or https://".to_string(),
            YouTubeUrlType::Invalid,
        );
    }

    let is_youtube_domain = url_lower.contains("youtube.com") || url_lower.contains("youtu.be");
    if !is_youtube_domain {
        return YouTubeUrlValidation::invalid(
            "URL must be a YouTube URL (youtube.com or youtu.be)".to_string(),
            YouTubeUrlType::Invalid,
        );
    }

    let url_type = detect_url_type(url);

    if let Some(playlist_id) = query_param(url, "list") {
        if let Err(validation_error) = validate_playlist_id_format(playlist_id) {
            return YouTubeUrlValidation::invalid(validation_error, url_type);
        }

        let normalized = format!("https://www.youtube.com/playlist?list={playlist_id}");
        YouTubeUrlValidation::valid(playlist_id.to_string(), url_type, normalized)
    } else {
        let error_msg = match url_type {
            YouTubeUrlType::SingleVideo => {
                "URL is a single video, not a playlist. Add a playlist to the URL or use a playlist URL."
            }
            YouTubeUrlType::ShortUrl => {
                "Short URL does not contain a playlist. Use a playlist URL instead."
            }
            _ => "URL does not contain a valid playlist ID",
        };
        YouTubeUrlValidation::invalid(error_msg.to_string(), url_type)
    }
}

fn detect_url_type(url: &str) -> YouTubeUrlType {
    let url_lower = url.to_lowercase();

    if url_lower.contains("youtu.be/") {
        if url_lower.contains("list=") {
            YouTubeUrlType::WatchWithPlaylist
        } else {
            YouTubeUrlType::ShortUrl
        }
    } else if url_lower.contains("/playlist") {
        YouTubeUrlType::Playlist
    } else if url_lower.contains("/watch") {
        if url_lower.contains("list=") {
            YouTubeUrlType::WatchWithPlaylist
        } else {
            YouTubeUrlType::SingleVideo
        }
    } else {
        YouTubeUrlType::Invalid
    }
}

/// Value of query parameter `name` (case-insensitive), ignoring any fragment.
fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or(query);

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// Validate playlist ID format.
///
/// Known prefixes: `PL` (user playlists), `UU` (uploads), `LL`, `WL`, `FL`,
/// `RD` (mixes) and `OLAK5uy_` (albums).
fn validate_playlist_id_format(playlist_id: &str) -> std::result::Result<(), String> {
    if playlist_id.len() < 2 {
        return Err("Playlist ID is too short".to_string());
    }

    if playlist_id.len() > 64 {
        return Err("Playlist ID is too long".to_string());
    }

    if !playlist_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Playlist ID contains invalid characters".to_string());
    }

    let valid_prefixes = ["PL", "UU", "LL", "WL", "RD", "OLAK5uy_", "FL"];
    let has_valid_prefix = valid_prefixes
        .iter()
        .any(|prefix| playlist_id.starts_with(prefix));

    if !has_valid_prefix
        && !playlist_id
            .chars()
            .next()
            .is_some_and(char::is_alphanumeric)
    {
        return Err("Playlist ID has an invalid format".to_string());
    }

    Ok(())
}

/// Extract the playlist id from a `YouTube` URL.
///
/// # Errors
///
/// Returns [`Error::InvalidPlaylistReference`] when the URL is not a
/// `YouTube` playlist URL.
pub fn extract_playlist_id(url: &str) -> Result<String> {
    playlist_page(url).map(|(playlist_id, _)| playlist_id)
}

/// Playlist id and canonical playlist page URL for any playlist-bearing URL.
fn playlist_page(url: &str) -> Result<(String, String)> {
    let validation = validate_youtube_url(url);

    match (validation.playlist_id, validation.normalized_url) {
        (Some(playlist_id), Some(page_url)) if validation.is_valid => Ok((playlist_id, page_url)),
        _ => Err(Error::InvalidPlaylistReference {
            reference: url.trim().to_string(),
            reason: validation
                .error_message
                .unwrap_or_else(|| "Invalid URL".to_string()),
        }),
    }
}

/// Reference of the entry at 1-based `index` of `playlist_id`.
#[must_use]
pub fn entry_reference(video_id: &str, playlist_id: &str, index: usize) -> String {
    format!("https://www.youtube.com/watch?v={video_id}&list={playlist_id}&index={index}")
}

/// Entries of one playlist as listed on its page.
#[derive(Debug, Clone, Default)]
struct PlaylistListing {
    title: String,
    entries: Vec<ItemInfo>,
}

impl PlaylistListing {
    /// 0-based position a reference points at.
    ///
    /// An explicit `index` wins, then the `v` parameter, then the first entry.
    fn position_of(&self, reference: &str) -> usize {
        if let Some(index) = query_param(reference, "index").and_then(|i| i.parse::<usize>().ok())
        {
            return index.saturating_sub(1);
        }

        query_param(reference, "v")
            .and_then(|video_id| {
                self.entries
                    .iter()
                    .position(|entry| entry.id.as_deref() == Some(video_id))
            })
            .unwrap_or(0)
    }
}

/// [`PlaylistSource`] backed by `YouTube` playlist pages and `rusty_ytdl`.
pub struct YouTubeSource {
    client: reqwest::Client,
    config: YouTubeConfig,
    listings: Mutex<HashMap<String, Arc<PlaylistListing>>>,
}

impl YouTubeSource {
    /// Create a source with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(YouTubeConfig::default())
    }

    /// Create a source with custom settings.
    #[must_use]
    pub fn with_config(config: YouTubeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            listings: Mutex::new(HashMap::new()),
        }
    }

    /// Check that `reference` is something this source can walk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPlaylistReference`] for anything that is not a
    /// `YouTube` playlist URL.
    pub fn check_reference(reference: &PlaylistReference) -> Result<()> {
        extract_playlist_id(reference.as_str()).map(|_| ())
    }

    /// Playlist entries, scraped on first use and cached afterwards.
    async fn listing(&self, playlist_id: &str, page_url: &str) -> Result<Arc<PlaylistListing>> {
        let mut listings = self.listings.lock().await;
        if let Some(listing) = listings.get(playlist_id) {
            return Ok(Arc::clone(listing));
        }

        let listing = Arc::new(self.fetch_listing(page_url).await?);
        info!(
            "Playlist '{}' lists {} entries",
            listing.title,
            listing.entries.len()
        );
        listings.insert(playlist_id.to_string(), Arc::clone(&listing));
        Ok(listing)
    }

    async fn fetch_listing(&self, url: &str) -> Result<PlaylistListing> {
        info!("Fetching playlist page: {}", url);

        let html = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, &self.config.user_agent)
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::fetch(url, format!("Failed to fetch playlist page: {e}")))?
            .text()
            .await
            .map_err(|e| Error::fetch(url, format!("Failed to read response: {e}")))?;

        Self::parse_listing(&html).map_err(|reason| Error::fetch(url, reason))
    }

    fn parse_listing(html: &str) -> std::result::Result<PlaylistListing, String> {
        let title = extract_playlist_title(html).unwrap_or_else(|| "Unknown Playlist".to_string());

        let json_data = extract_yt_initial_data(html)?;
        let mut entries: Vec<ItemInfo> = find_playlist_contents(&json_data)
            .map(|contents| contents.iter().filter_map(parse_playlist_item).collect())
            .unwrap_or_default();

        if entries.is_empty() {
            warn!("No entries found in playlist data, trying alternative extraction");
            entries = extract_entries_regex(html);
        }

        Ok(PlaylistListing { title, entries })
    }

    fn video_options(&self) -> VideoOptions {
        // audio-only streams are refused more often than combined ones
        let filter = if self.config.audio_only {
            VideoSearchOptions::Audio
        } else {
            VideoSearchOptions::VideoAudio
        };

        VideoOptions {
            quality: VideoQuality::Lowest,
            filter,
            ..Default::default()
        }
    }

    /// Open the media stream of `entry`.
    async fn open_stream(&self, entry: &ItemInfo) -> Result<ByteStream> {
        let video_id = entry.id.as_deref().unwrap_or_default();
        let video_url = format!("https://www.youtube.com/watch?v={video_id}");
        debug!("Opening stream for {} using rusty_ytdl", video_id);

        let video = Video::new_with_options(&video_url, self.video_options())
            .map_err(|e| Error::fetch(&video_url, format!("Failed to create video instance: {e}")))?;

        let stream = video
            .stream()
            .await
            .map_err(|e| Error::fetch(&video_url, format!("Failed to create stream: {e}")))?;
        debug!("Stream content length: {} bytes", stream.content_length());

        let title = entry.title.clone();
        Ok(Box::pin(futures::stream::try_unfold(
            stream,
            move |stream| {
                let title = title.clone();
                async move {
                    match stream.chunk().await {
                        Ok(Some(chunk)) => Ok(Some((chunk, stream))),
                        Ok(None) => Ok(None),
                        Err(e) => Err(Error::Stream {
                            title,
                            reason: e.to_string(),
                        }),
                    }
                }
            },
        )))
    }
}

impl Default for YouTubeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for YouTubeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeSource")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PlaylistSource for YouTubeSource {
    async fn fetch(&self, reference: &PlaylistReference) -> SourceFetch {
        let (playlist_id, page_url) = match playlist_page(reference.as_str()) {
            Ok(page) => page,
            Err(e) => return SourceFetch::failed(e, None),
        };

        let listing = match self.listing(&playlist_id, &page_url).await {
            Ok(listing) => listing,
            Err(e) => return SourceFetch::failed(e, None),
        };

        if listing.entries.is_empty() {
            return SourceFetch::failed(Error::EmptyPlaylist(playlist_id), None);
        }

        let position = listing.position_of(reference.as_str());
        let Some(entry) = listing.entries.get(position) else {
            debug!("{} is past the end of playlist {}", reference, playlist_id);
            return SourceFetch::exhausted();
        };

        let next = listing.entries.get(position + 1).and_then(|following| {
            let video_id = following.id.as_deref().unwrap_or_default();
            PlaylistReference::new(entry_reference(video_id, &playlist_id, position + 2)).ok()
        });

        match self.open_stream(entry).await {
            Ok(stream) => SourceFetch::resolved(SourceItem::new(entry.clone(), stream), next),
            Err(e) => SourceFetch::failed(e, next),
        }
    }

    fn name(&self) -> &'static str {
        "youtube"
    }
}

// ============================================================================
// Playlist page scraping
// ============================================================================

fn extract_playlist_title(html: &str) -> Option<String> {
    let og_title_re = Regex::new(r#"<meta\s+property="og:title"\s+content="([^"]+)""#).ok()?;
    if let Some(caps) = og_title_re.captures(html) {
        return Some(html_decode(caps.get(1)?.as_str()));
    }

    let title_re = Regex::new(r"<title>([^<]+?)\s*-\s*YouTube</title>").ok()?;
    if let Some(caps) = title_re.captures(html) {
        return Some(html_decode(caps.get(1)?.as_str()));
    }

    None
}

/// Cut the `ytInitialData` JSON object out of the page by counting braces.
fn extract_yt_initial_data(html: &str) -> std::result::Result<serde_json::Value, String> {
    const MARKERS: [&str; 2] = ["var ytInitialData = ", "ytInitialData = "];

    let start_pos = MARKERS
        .iter()
        .find_map(|marker| html.find(marker).map(|pos| pos + marker.len()))
        .ok_or_else(|| "Could not find ytInitialData in page".to_string())?;

    let json_bytes = &html.as_bytes()[start_pos..];
    if json_bytes.first() != Some(&b'{') {
        return Err("ytInitialData does not start with '{'".to_string());
    }

    let mut depth = 0usize;
    let mut end_pos = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &byte) in json_bytes.iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match byte {
            b'\\' if in_string => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    end_pos = Some(i + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    let end_pos = end_pos.ok_or_else(|| "Could not find end of ytInitialData JSON".to_string())?;
    let json_str = &html[start_pos..start_pos + end_pos];
    debug!("Extracted ytInitialData JSON: {} bytes", json_str.len());

    serde_json::from_str(json_str).map_err(|e| format!("Failed to parse ytInitialData: {e}"))
}

/// Walk `contents.twoColumnBrowseResultsRenderer.tabs[].tabRenderer.content
/// .sectionListRenderer.contents[].itemSectionRenderer.contents[]
/// .playlistVideoListRenderer.contents`.
fn find_playlist_contents(json: &serde_json::Value) -> Option<&Vec<serde_json::Value>> {
    let tabs = json
        .get("contents")?
        .get("twoColumnBrowseResultsRenderer")?
        .get("tabs")?
        .as_array()?;

    for tab in tabs {
        if let Some(section_contents) = tab
            .pointer("/tabRenderer/content/sectionListRenderer/contents")
            .and_then(serde_json::Value::as_array)
        {
            for section in section_contents {
                if let Some(item_contents) = section
                    .pointer("/itemSectionRenderer/contents")
                    .and_then(serde_json::Value::as_array)
                {
                    for item in item_contents {
                        if let Some(playlist_renderer) = item.get("playlistVideoListRenderer") {
                            return playlist_renderer.get("contents")?.as_array();
                        }
                    }
                }
            }
        }
    }

    None
}

fn parse_playlist_item(item: &serde_json::Value) -> Option<ItemInfo> {
    let renderer = item.get("playlistVideoRenderer")?;

    let id = renderer.get("videoId")?.as_str()?.to_string();
    let title = renderer
        .pointer("/title/runs/0/text")
        .or_else(|| renderer.pointer("/title/simpleText"))?
        .as_str()?
        .to_string();

    let duration_secs = renderer
        .get("lengthSeconds")
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .or_else(|| {
            renderer
                .pointer("/lengthText/simpleText")
                .and_then(|st| st.as_str())
                .and_then(parse_duration_text)
        });

    let channel = renderer
        .pointer("/shortBylineText/runs/0/text")
        .and_then(|t| t.as_str())
        .map(String::from);

    Some(ItemInfo {
        title,
        id: Some(id),
        duration_secs,
        channel,
    })
}

/// Fallback listing: every distinct `"videoId"` on the page.
fn extract_entries_regex(html: &str) -> Vec<ItemInfo> {
    let Ok(id_regex) = Regex::new(r#""videoId"\s*:\s*"([a-zA-Z0-9_-]{11})""#) else {
        return Vec::new();
    };

    let mut seen_ids = std::collections::HashSet::new();
    let mut entries: Vec<ItemInfo> = id_regex
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| seen_ids.insert(id.clone()))
        .map(|id| ItemInfo {
            title: format!("Video {id}"),
            id: Some(id),
            duration_secs: None,
            channel: None,
        })
        .collect();

    entries.truncate(200);
    entries
}

/// Parse duration text like "3:45" or "1:23:45" into seconds.
fn parse_duration_text(text: &str) -> Option<u64> {
    let parts: Vec<&str> = text.split(':').collect();
    match parts.as_slice() {
        [mins, secs] => Some(mins.parse::<u64>().ok()? * 60 + secs.parse::<u64>().ok()?),
        [hours, mins, secs] => Some(
            hours.parse::<u64>().ok()? * 3600
                + mins.parse::<u64>().ok()? * 60
                + secs.parse::<u64>().ok()?,
        ),
        _ => None,
    }
}

fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(items: &serde_json::Value) -> String {
        let data = serde_json::json!({
            "contents": {
                "twoColumnBrowseResultsRenderer": {
                    "tabs": [{
                        "tabRenderer": {
                            "content": {
                                "sectionListRenderer": {
                                    "contents": [{
                                        "itemSectionRenderer": {
                                            "contents": [{
                                                "playlistVideoListRenderer": { "contents": items }
                                            }]
                                        }
                                    }]
                                }
                            }
                        }
                    }]
                }
            }
        });
        format!(
            r#"<html><head><meta property="og:title" content="Warp &amp; Weft"></head>
<script>var ytInitialData = {data};</script></html>"#
        )
    }

    fn renderer(id: &str, title: &str, length: &str) -> serde_json::Value {
        serde_json::json!({
            "playlistVideoRenderer": {
                "videoId": id,
                "title": { "runs": [{ "text": title }] },
                "lengthText": { "simpleText": length },
                "shortBylineText": { "runs": [{ "text": "Boards of Canada" }] }
            }
        })
    }

    fn seeded(playlist_id: &str, entries: Vec<ItemInfo>) -> YouTubeSource {
        let source = YouTubeSource::new();
        source.listings.try_lock().unwrap().insert(
            playlist_id.to_string(),
            Arc::new(PlaylistListing {
                title: "Seeded".to_string(),
                entries,
            }),
        );
        source
    }

    fn entry(id: &str) -> ItemInfo {
        ItemInfo {
            id: Some(id.to_string()),
            ..ItemInfo::titled(format!("Title {id}"))
        }
    }

    mod validate_youtube_url_tests {
        use super::*;

        #[test]
        fn test_valid_standard_playlist_url() {
            let url = "https://www.youtube.com/playlist?list=PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf";
            let result = validate_youtube_url(url);

            assert!(result.is_valid);
            assert_eq!(
                result.playlist_id,
                Some("PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf".to_string())
            );
            assert_eq!(result.url_type, YouTubeUrlType::Playlist);
            assert!(result.error_message.is_none());
        }

        #[test]
        fn test_valid_entry_reference_round_trips_playlist_id() {
            let url = entry_reference("dQw4w9WgXcQ", "PLrAXtmErZgOtest", 4);
            let result = validate_youtube_url(&url);

            assert!(result.is_valid);
            assert_eq!(result.playlist_id, Some("PLrAXtmErZgOtest".to_string()));
            assert_eq!(result.url_type, YouTubeUrlType::WatchWithPlaylist);
        }

        #[test]
        fn test_valid_list_first_and_mixed_case() {
            let result = validate_youtube_url("https://www.youtube.com/watch?LIST=PLtest123&v=abc");
            assert!(result.is_valid);
            assert_eq!(result.playlist_id, Some("PLtest123".to_string()));
        }

        #[test]
        fn test_valid_short_url_with_playlist() {
            let result = validate_youtube_url("https://youtu.be/dQw4w9WgXcQ?list=PLrAXtmErZgOtest");
            assert!(result.is_valid);
            assert_eq!(result.url_type, YouTubeUrlType::WatchWithPlaylist);
        }

        #[test]
        fn test_url_with_hash_fragment_and_whitespace() {
            let result =
                validate_youtube_url("  https://www.youtube.com/playlist?list=PLtest123#section  ");
            assert!(result.is_valid);
            assert_eq!(result.playlist_id, Some("PLtest123".to_string()));
        }

        #[test]
        fn test_invalid_urls() {
            for url in [
                "",
                "   ",
                "https://www.vimeo.com/video/123",
                "www.youtube.com/playlist?list=PLtest123",
                "https://www.youtube.com/playlist?list=",
                "https://www.youtube.com/playlist?list=X",
                "https://www.youtube.com/playlist?list=PL<script>",
            ] {
                let result = validate_youtube_url(url);
                assert!(!result.is_valid, "{url} should be rejected");
                assert!(result.error_message.is_some());
            }
        }

        #[test]
        fn test_single_video_is_not_a_playlist() {
            let result = validate_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
            assert!(!result.is_valid);
            assert_eq!(result.url_type, YouTubeUrlType::SingleVideo);
            assert!(result.error_message.unwrap().contains("single video"));
        }
    }

    mod playlist_id_format_tests {
        use super::*;

        #[test]
        fn test_known_prefixes() {
            for id in ["PLtest123", "UUxxxxxxxx", "RDxxxxxxxx", "OLAK5uy_test123"] {
                assert!(validate_playlist_id_format(id).is_ok(), "{id}");
            }
        }

        #[test]
        fn test_invalid_ids() {
            assert!(validate_playlist_id_format("X").is_err());
            assert!(validate_playlist_id_format(&"P".repeat(65)).is_err());
            assert!(validate_playlist_id_format("PL test").is_err());
        }
    }

    #[test]
    fn test_entry_references_share_the_canonical_playlist_page() {
        let first = playlist_page("https://youtube.com/playlist?list=PLtest123&si=share").unwrap();
        let third = playlist_page(&entry_reference("dQw4w9WgXcQ", "PLtest123", 3)).unwrap();

        assert_eq!(
            first,
            (
                "PLtest123".to_string(),
                "https://www.youtube.com/playlist?list=PLtest123".to_string()
            )
        );
        assert_eq!(third, first);
        assert!(playlist_page("https://example.com/").is_err());
    }

    #[test]
    fn test_extract_playlist_id_errors_are_invalid_reference() {
        let err = extract_playlist_id("https://www.vimeo.com/video/123").unwrap_err();
        assert!(matches!(err, Error::InvalidPlaylistReference { .. }));
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_check_reference() {
        let good = PlaylistReference::new("https://www.youtube.com/playlist?list=PLtest123").unwrap();
        let bad = PlaylistReference::new("https://example.com/").unwrap();
        assert!(YouTubeSource::check_reference(&good).is_ok());
        assert!(YouTubeSource::check_reference(&bad).is_err());
    }

    #[test]
    fn test_query_param() {
        let url = "https://www.youtube.com/watch?v=abc&list=PLx&index=7#t=3";
        assert_eq!(query_param(url, "v"), Some("abc"));
        assert_eq!(query_param(url, "index"), Some("7"));
        assert_eq!(query_param(url, "missing"), None);
        assert_eq!(query_param("https://youtu.be/abc", "v"), None);
    }

    #[test]
    fn test_position_of() {
        let listing = PlaylistListing {
            title: String::new(),
            entries: vec![entry("aaa"), entry("bbb"), entry("ccc")],
        };
        assert_eq!(listing.position_of("https://www.youtube.com/playlist?list=PLx"), 0);
        assert_eq!(
            listing.position_of("https://www.youtube.com/watch?v=ccc&list=PLx"),
            2
        );
        assert_eq!(
            listing.position_of("https://www.youtube.com/watch?v=aaa&list=PLx&index=2"),
            1
        );
        assert_eq!(
            listing.position_of("https://www.youtube.com/watch?v=zzz&list=PLx"),
            0
        );
    }

    #[test]
    fn test_parse_listing_from_initial_data() {
        let html = page(&serde_json::json!([
            renderer("aaaaaaaaaaa", "Roygbiv", "2:31"),
            renderer("bbbbbbbbbbb", "Olson", "1:31"),
            { "continuationItemRenderer": {} }
        ]));

        let listing = YouTubeSource::parse_listing(&html).unwrap();
        assert_eq!(listing.title, "Warp & Weft");
        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries[0].title, "Roygbiv");
        assert_eq!(listing.entries[0].id.as_deref(), Some("aaaaaaaaaaa"));
        assert_eq!(listing.entries[0].duration_secs, Some(151));
        assert_eq!(listing.entries[1].channel.as_deref(), Some("Boards of Canada"));
    }

    #[test]
    fn test_parse_listing_falls_back_to_video_ids() {
        let html = format!(
            "{}<div data='\"videoId\":\"ccccccccccc\"'></div>",
            page(&serde_json::json!([]))
        );
        let listing = YouTubeSource::parse_listing(&html).unwrap();
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].title, "Video ccccccccccc");
    }

    #[test]
    fn test_parse_listing_without_initial_data() {
        let err = YouTubeSource::parse_listing("<html></html>").unwrap_err();
        assert!(err.contains("ytInitialData"));
    }

    #[test]
    fn test_extract_yt_initial_data_handles_braces_in_strings() {
        let html = r#"ytInitialData = {"a":"}{","b":{"c":"\"}"}};</script>"#;
        let json = extract_yt_initial_data(html).unwrap();
        assert_eq!(json["a"], "}{");
        assert_eq!(json["b"]["c"], "\"}");
    }

    #[test]
    fn test_parse_duration_text() {
        assert_eq!(parse_duration_text("3:45"), Some(225));
        assert_eq!(parse_duration_text("1:23:45"), Some(5025));
        assert_eq!(parse_duration_text("abc"), None);
    }

    #[test]
    fn test_html_decode() {
        assert_eq!(html_decode("Tom &amp; Jerry &#39;live&#39;"), "Tom & Jerry 'live'");
    }

    #[tokio::test]
    async fn test_fetch_rejects_non_playlist_reference() {
        let source = YouTubeSource::new();
        let reference = PlaylistReference::new("https://example.com/list").unwrap();

        let fetched = source.fetch(&reference).await;
        assert!(matches!(
            fetched.item,
            Some(Err(Error::InvalidPlaylistReference { .. }))
        ));
        assert!(fetched.next.is_none());
    }

    #[tokio::test]
    async fn test_fetch_empty_playlist_ends_traversal() {
        let source = seeded("PLempty", Vec::new());
        let reference = PlaylistReference::new("https://www.youtube.com/playlist?list=PLempty").unwrap();

        let fetched = source.fetch(&reference).await;
        assert!(matches!(fetched.item, Some(Err(Error::EmptyPlaylist(_)))));
        assert!(fetched.next.is_none());
    }

    #[tokio::test]
    async fn test_fetch_past_the_end_is_exhausted() {
        let source = seeded("PLshort", vec![entry("aaa")]);
        let reference = PlaylistReference::new(entry_reference("zzz", "PLshort", 5)).unwrap();

        let fetched = source.fetch(&reference).await;
        assert!(fetched.item.is_none());
        assert!(fetched.next.is_none());
    }

    #[tokio::test]
    async fn test_fetch_unplayable_entry_still_points_at_next() {
        // ids that rusty_ytdl rejects before any network access
        let source = seeded("PLbroken", vec![entry("bad id!"), entry("also bad!")]);
        let reference = PlaylistReference::new("https://www.youtube.com/playlist?list=PLbroken").unwrap();

        let fetched = source.fetch(&reference).await;
        assert!(matches!(fetched.item, Some(Err(Error::Fetch { .. }))));
        assert_eq!(
            fetched.next.as_ref().map(PlaylistReference::as_str),
            Some("https://www.youtube.com/watch?v=also bad!&list=PLbroken&index=2")
        );
    }
}
