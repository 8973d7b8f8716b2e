//! Conversion of one source item into one tagged audio file.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::AudioFormat;
use crate::encoder::{AudioEncoder, EncodeRequest};
use crate::error::Result;
use crate::sanitize::sanitize;
use crate::source::SourceItem;
use crate::tags::{AudioFileMetadata, build_tag_options};

/// Where a converted item is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// Destination directory.
    pub directory: PathBuf,
    /// Sanitized filename, extension included.
    pub file_name: String,
    /// Audio format of the file.
    pub format: AudioFormat,
}

impl OutputTarget {
    /// Derive the target for an item titled `title`.
    pub fn new(directory: &Path, title: &str, format: AudioFormat) -> Self {
        Self {
            directory: directory.to_path_buf(),
            file_name: format!("{}.{}", sanitize(title), format.extension()),
            format,
        }
    }

    /// Full path of the output file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Feed `item` through `encoder` into `target`, embedding `tags`.
///
/// Resolves exactly once. A failed conversion may leave a partial file behind;
/// removing it is left to the caller.
pub async fn convert(
    encoder: &dyn AudioEncoder,
    item: SourceItem,
    target: &OutputTarget,
    tags: &AudioFileMetadata,
) -> Result<PathBuf> {
    let request = EncodeRequest {
        output_path: target.path(),
        format: target.format,
        tags: build_tag_options(tags),
    };

    debug!(
        "Converting '{}' with {} into {}",
        item.info.title,
        encoder.name(),
        request.output_path.display()
    );

    encoder.encode(item.stream, &request).await?;
    Ok(request.output_path)
}
