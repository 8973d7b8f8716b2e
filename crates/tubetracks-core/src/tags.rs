//! Audio file tags and the encoder directives that embed them.
//!
//! [`AudioFileMetadata`] keeps tags in insertion order so the directives handed
//! to the encoder are reproducible: constant session tags first (`album`,
//! `artist`), then the per-item ones (`title`, `track`).
//!
//! # Example
//!
//! ```rust
//! use tubetracks_core::tags::{AudioFileMetadata, build_tag_options};
//!
//! let mut tags = AudioFileMetadata::new();
//! tags.insert("title", "Intro");
//! tags.insert("track", 1u32);
//!
//! let options = build_tag_options(&tags);
//! assert_eq!(options[0].assignment, "title=Intro");
//! assert_eq!(options[1].assignment, "track=1");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Flag the encoder expects in front of each `key=value` tag assignment.
pub const METADATA_FLAG: &str = "-metadata";

/// Tag name for the item title.
pub const TITLE: &str = "title";
/// Tag name for the album.
pub const ALBUM: &str = "album";
/// Tag name for the artist.
pub const ARTIST: &str = "artist";
/// Tag name for the 1-based track number.
pub const TRACK: &str = "track";

/// A single tag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// Free text.
    Text(String),
    /// Unsigned number, rendered as plain decimal digits.
    Number(u64),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<u32> for TagValue {
    fn from(value: u32) -> Self {
        Self::Number(u64::from(value))
    }
}

impl From<u64> for TagValue {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

/// Ordered mapping of tag name to value.
///
/// Absent tags are simply not stored; there is no null value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFileMetadata {
    entries: Vec<(String, TagValue)>,
}

impl AudioFileMetadata {
    /// Create an empty tag set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Set a tag. An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Set a tag only when a value is present.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<impl Into<TagValue>>) {
        if let Some(value) = value {
            self.insert(key, value);
        }
    }

    /// Look up a tag value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    /// Iterate over tags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Number of tags set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tag is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One tag assignment for the encoder: a flag followed by `key=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagDirective {
    /// The encoder flag, always [`METADATA_FLAG`].
    pub flag: &'static str,
    /// The `key=value` assignment.
    pub assignment: String,
}

impl TagDirective {
    /// The directive as the two command line arguments it expands to.
    #[must_use]
    pub fn to_args(&self) -> [String; 2] {
        [self.flag.to_owned(), self.assignment.clone()]
    }
}

/// Turn a tag set into the ordered directives handed to the encoder.
///
/// Emits exactly one directive per present tag, in insertion order.
#[must_use]
pub fn build_tag_options(tags: &AudioFileMetadata) -> Vec<TagDirective> {
    tags.iter()
        .map(|(key, value)| TagDirective {
            flag: METADATA_FLAG,
            assignment: format!("{key}={value}"),
        })
        .collect()
}
