//! Application configuration management.
//!
//! Handles loading and saving the settings shared by every download session:
//! output format, encoder location, concurrency bound and fetch timeout.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default maximum number of conversions running at once.
pub const DEFAULT_MAX_CONCURRENT_CONVERSIONS: usize = 1;

/// Minimum allowed concurrent conversions.
pub const MIN_CONCURRENT_CONVERSIONS: usize = 1;

/// Maximum allowed concurrent conversions.
pub const MAX_CONCURRENT_CONVERSIONS: usize = 8;

/// Default time allowed for resolving a single playlist reference.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// Target audio format of the converted files.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III (default).
    #[default]
    Mp3,
    /// AAC in an MPEG-4 container.
    M4a,
    /// Vorbis in an Ogg container.
    Ogg,
    /// Opus in an Ogg container.
    Opus,
    /// Free Lossless Audio Codec.
    Flac,
    /// Uncompressed 16-bit PCM.
    Wav,
}

impl AudioFormat {
    /// Every supported format.
    pub const ALL: [Self; 6] = [
        Self::Mp3,
        Self::M4a,
        Self::Ogg,
        Self::Opus,
        Self::Flac,
        Self::Wav,
    ];

    /// File extension, without the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }

    /// ffmpeg audio codec name.
    #[must_use]
    pub const fn codec(self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::M4a => "aac",
            Self::Ogg => "libvorbis",
            Self::Opus => "libopus",
            Self::Flac => "flac",
            Self::Wav => "pcm_s16le",
        }
    }

    /// ffmpeg muxer name.
    #[must_use]
    pub const fn muxer(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "ipod",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().trim_start_matches('.').to_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == wanted)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "Unsupported audio format '{s}' (expected one of: mp3, m4a, ogg, opus, flac, wav)"
                ))
            })
    }
}

/// Settings for the `YouTube` source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct YouTubeConfig {
    /// Request audio-only streams instead of combined audio+video ones.
    ///
    /// Audio-only streams are smaller but are refused more often by `YouTube`.
    #[serde(default)]
    pub audio_only: bool,
    /// User agent sent when fetching playlist pages.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

impl Default for YouTubeConfig {
    fn default() -> Self {
        Self {
            audio_only: false,
            user_agent: default_user_agent(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Format of the produced audio files.
    #[serde(default)]
    pub audio_format: AudioFormat,
    /// Explicit path to the ffmpeg binary; looked up on `PATH` when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Maximum number of conversions running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_conversions: usize,
    /// Seconds allowed for resolving one playlist reference (0 disables the limit).
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// `YouTube` source settings.
    #[serde(default)]
    pub youtube: YouTubeConfig,
}

const fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_CONVERSIONS
}

const fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            audio_format: AudioFormat::default(),
            ffmpeg_path: None,
            max_concurrent_conversions: DEFAULT_MAX_CONCURRENT_CONVERSIONS,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            youtube: YouTubeConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, or defaults if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, or defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to read config file: {e}"),
        })?;

        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.validate();

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| Error::FileSystem {
                path: parent.to_path_buf(),
                message: format!("Failed to create config directory: {e}"),
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| Error::FileSystem {
            path: path.to_path_buf(),
            message: format!("Failed to write config file: {e}"),
        })?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Clamp values into their supported ranges.
    pub fn validate(&mut self) {
        self.max_concurrent_conversions = self
            .max_concurrent_conversions
            .clamp(MIN_CONCURRENT_CONVERSIONS, MAX_CONCURRENT_CONVERSIONS);
    }

    /// The fetch timeout, or `None` when disabled.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Option<Duration> {
        if self.fetch_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.fetch_timeout_secs))
        }
    }

    /// Get the path to the default config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("tubetracks")
        .join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.audio_format, AudioFormat::Mp3);
        assert_eq!(config.max_concurrent_conversions, 1);
        assert_eq!(config.fetch_timeout(), Some(Duration::from_secs(120)));
        assert!(config.ffmpeg_path.is_none());
    }

    #[test]
    fn test_config_deserialization_fills_defaults() {
        let json = r#"{"audio_format":"opus"}"#;
        let config: AppConfig = serde_json::from_str(json).expect("Should deserialize");
        assert_eq!(config.audio_format, AudioFormat::Opus);
        assert_eq!(config.max_concurrent_conversions, DEFAULT_MAX_CONCURRENT_CONVERSIONS);
        assert_eq!(config.youtube, YouTubeConfig::default());
    }

    #[test]
    fn test_validate_clamps_concurrency() {
        let mut config = AppConfig {
            max_concurrent_conversions: 0,
            ..Default::default()
        };
        config.validate();
        assert_eq!(config.max_concurrent_conversions, MIN_CONCURRENT_CONVERSIONS);

        config.max_concurrent_conversions = 100;
        config.validate();
        assert_eq!(config.max_concurrent_conversions, MAX_CONCURRENT_CONVERSIONS);
    }

    #[test]
    fn test_zero_timeout_disables_limit() {
        let config = AppConfig {
            fetch_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.fetch_timeout(), None);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("missing.json");

        let config = AppConfig::load_from(&path).expect("Should load");
        assert_eq!(config, AppConfig::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("nested").join("config.json");

        let config = AppConfig {
            audio_format: AudioFormat::Flac,
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            max_concurrent_conversions: 3,
            fetch_timeout_secs: 10,
            youtube: YouTubeConfig {
                audio_only: true,
                ..Default::default()
            },
        };
        config.save_to(&path).expect("Should save");

        let loaded = AppConfig::load_from(&path).expect("Should load");
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_invalid_json_fails() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").expect("Should write file");

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_audio_format_parsing() {
        assert_eq!("mp3".parse::<AudioFormat>().unwrap(), AudioFormat::Mp3);
        assert_eq!(".M4A".parse::<AudioFormat>().unwrap(), AudioFormat::M4a);
        assert_eq!(" flac ".parse::<AudioFormat>().unwrap(), AudioFormat::Flac);
        assert!("aiff".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_audio_format_names() {
        for format in AudioFormat::ALL {
            assert_eq!(format.to_string(), format.extension());
            assert!(!format.codec().is_empty());
            assert!(!format.muxer().is_empty());
        }
        assert_eq!(AudioFormat::M4a.muxer(), "ipod");
    }

    #[test]
    fn test_config_file_path_uses_correct_name() {
        let path = AppConfig::config_file_path();
        assert!(path.ends_with("tubetracks/config.json"));
    }
}
