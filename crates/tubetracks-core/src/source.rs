//! The playlist source collaborator.
//!
//! A [`PlaylistSource`] resolves one [`PlaylistReference`] at a time into the
//! item it points at and, when there is one, the reference of the following
//! item. Traversal ends when a fetch reports no next reference.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A live byte stream of raw media. It can be consumed exactly once.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Opaque locator for a whole playlist or one item within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaylistReference(String);

impl PlaylistReference {
    /// Build a reference from user or source supplied text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingPlaylistReference`] when `value` is blank.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::MissingPlaylistReference);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// The reference as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaylistReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PlaylistReference {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Information about one playlist item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    /// Human readable title.
    pub title: String,
    /// Source specific identifier, when known.
    pub id: Option<String>,
    /// Duration in seconds, when known.
    pub duration_secs: Option<u64>,
    /// Channel or uploader name, when known.
    pub channel: Option<String>,
}

impl ItemInfo {
    /// Item info carrying only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A resolved playlist item: its info plus the stream of its raw media.
pub struct SourceItem {
    /// Item info.
    pub info: ItemInfo,
    /// Raw media stream, handed to the conversion stage.
    pub stream: ByteStream,
}

impl SourceItem {
    /// Pair item info with its stream.
    pub fn new(info: ItemInfo, stream: ByteStream) -> Self {
        Self { info, stream }
    }
}

impl fmt::Debug for SourceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceItem")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Everything a single fetch produced.
#[derive(Debug)]
pub struct SourceFetch {
    /// The resolved item, the error that prevented resolving it, or nothing.
    pub item: Option<Result<SourceItem>>,
    /// Reference of the following item. `None` means the playlist is exhausted.
    pub next: Option<PlaylistReference>,
}

impl SourceFetch {
    /// A successfully resolved item.
    pub const fn resolved(item: SourceItem, next: Option<PlaylistReference>) -> Self {
        Self {
            item: Some(Ok(item)),
            next,
        }
    }

    /// A failed resolution. Traversal continues with `next` when it is known.
    pub const fn failed(error: Error, next: Option<PlaylistReference>) -> Self {
        Self {
            item: Some(Err(error)),
            next,
        }
    }

    /// Nothing to convert and nothing after it.
    pub const fn exhausted() -> Self {
        Self {
            item: None,
            next: None,
        }
    }
}

/// Resolves playlist references into items and discovers following items.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    /// Resolve `reference`.
    ///
    /// Never fails as a whole: item level errors are carried inside the
    /// returned [`SourceFetch`] so traversal can go on with `next`.
    async fn fetch(&self, reference: &PlaylistReference) -> SourceFetch;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}
