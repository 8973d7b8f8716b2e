//! The encoder collaborator and its ffmpeg implementation.
//!
//! The ffmpeg encoder runs the external `ffmpeg` binary, pipes the source
//! stream into its stdin and lets it write the tagged output file directly.
//!
//! ```no_run
//! use tubetracks_core::encoder::FfmpegEncoder;
//!
//! let encoder = FfmpegEncoder::from_path().expect("ffmpeg not found in PATH");
//! println!("using {}", encoder.binary_path().display());
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tracing::{debug, warn};

use crate::config::AudioFormat;
use crate::error::{Error, Result};
use crate::source::ByteStream;
use crate::tags::TagDirective;

/// What the encoder should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    /// Output file path.
    pub output_path: PathBuf,
    /// Target audio format.
    pub format: AudioFormat,
    /// Tag directives, passed through in order.
    pub tags: Vec<TagDirective>,
}

/// Transcodes a raw media stream into a tagged audio file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioEncoder: Send + Sync {
    /// Consume `input` and write the file described by `request`.
    ///
    /// Resolves once, with success only when the output file is complete.
    async fn encode(&self, input: ByteStream, request: &EncodeRequest) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Encoder driving an external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary_path: PathBuf,
}

impl FfmpegEncoder {
    /// Create an encoder with an explicit binary path.
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Attempt to find `ffmpeg` in `PATH`.
    pub fn from_path() -> Option<Self> {
        which::which("ffmpeg").ok().map(Self::new)
    }

    /// Use `configured` when given, otherwise search `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EncoderNotFound`] when no usable binary is found.
    pub fn locate(configured: Option<&Path>) -> Result<Self> {
        match configured {
            Some(path) => which::which(path)
                .map(Self::new)
                .map_err(|e| Error::EncoderNotFound(format!("{}: {e}", path.display()))),
            None => Self::from_path()
                .ok_or_else(|| Error::EncoderNotFound("ffmpeg is not on PATH".to_string())),
        }
    }

    /// Path of the binary this encoder runs.
    #[must_use]
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Command line arguments for `request`; the input is always stdin.
    #[must_use]
    pub fn build_args(request: &EncodeRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-i",
            "pipe:0",
            "-vn",
            "-c:a",
            request.format.codec(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        for directive in &request.tags {
            args.extend(directive.to_args().map(OsString::from));
        }

        args.push("-f".into());
        args.push(request.format.muxer().into());
        args.push(request.output_path.clone().into_os_string());
        args
    }
}

/// Why feeding the encoder stopped early.
enum PumpError {
    /// The source stream failed.
    Source(Error),
    /// Writing to the encoder failed, usually because it exited.
    Sink(std::io::Error),
}

/// Copy `input` into the encoder's stdin, returning the number of bytes written.
async fn pump(mut input: ByteStream, stdin: &mut ChildStdin) -> std::result::Result<u64, PumpError> {
    let mut written = 0u64;
    while let Some(chunk) = input.next().await {
        let chunk = chunk.map_err(PumpError::Source)?;
        stdin.write_all(&chunk).await.map_err(PumpError::Sink)?;
        written += chunk.len() as u64;
    }
    stdin.flush().await.map_err(PumpError::Sink)?;
    Ok(written)
}

#[async_trait]
impl AudioEncoder for FfmpegEncoder {
    async fn encode(&self, input: ByteStream, request: &EncodeRequest) -> Result<()> {
        let encode_error = |reason: String| Error::Encode {
            path: request.output_path.clone(),
            reason,
        };

        let mut child = Command::new(&self.binary_path)
            .args(Self::build_args(request))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| encode_error(format!("Failed to execute ffmpeg: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| encode_error("ffmpeg stdin was not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| encode_error("ffmpeg stderr was not captured".to_string()))?;

        // ffmpeg stalls on a full stderr pipe, drain it alongside the input
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            let _ = stderr.read_to_string(&mut output).await;
            output
        });

        let pumped = pump(input, &mut stdin).await;
        drop(stdin);

        if let Err(PumpError::Source(error)) = pumped {
            warn!(
                "Source stream failed, stopping ffmpeg for {}",
                request.output_path.display()
            );
            let _ = child.kill().await;
            stderr_task.abort();
            return Err(error);
        }

        let status = child
            .wait()
            .await
            .map_err(|e| encode_error(format!("Failed to wait for ffmpeg: {e}")))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let detail = stderr_output.trim();
            let reason = if detail.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                format!("ffmpeg exited with {status}: {detail}")
            };
            return Err(encode_error(reason));
        }

        match pumped {
            Ok(bytes) => {
                debug!(
                    "ffmpeg wrote {} from {} input bytes",
                    request.output_path.display(),
                    bytes
                );
                Ok(())
            }
            // ffmpeg exited successfully without reading all input
            Err(PumpError::Sink(e)) => Err(encode_error(format!(
                "ffmpeg stopped reading its input: {e}"
            ))),
            Err(PumpError::Source(error)) => Err(error),
        }
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{AudioFileMetadata, build_tag_options};

    fn request(format: AudioFormat) -> EncodeRequest {
        let mut tags = AudioFileMetadata::new();
        tags.insert("album", "Geogaddi");
        tags.insert("track", 3u32);
        EncodeRequest {
            output_path: PathBuf::from("/music/Music Is Math.mp3"),
            format,
            tags: build_tag_options(&tags),
        }
    }

    #[test]
    fn test_build_args_layout() {
        let args: Vec<String> = FfmpegEncoder::build_args(&request(AudioFormat::Mp3))
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            args,
            [
                "-hide_banner",
                "-loglevel",
                "error",
                "-y",
                "-i",
                "pipe:0",
                "-vn",
                "-c:a",
                "libmp3lame",
                "-metadata",
                "album=Geogaddi",
                "-metadata",
                "track=3",
                "-f",
                "mp3",
                "/music/Music Is Math.mp3",
            ]
        );
    }

    #[test]
    fn test_build_args_uses_format_codec_and_muxer() {
        let args = FfmpegEncoder::build_args(&request(AudioFormat::M4a));
        assert!(args.contains(&OsString::from("aac")));
        assert!(args.contains(&OsString::from("ipod")));
    }

    #[test]
    fn test_locate_missing_binary() {
        let result = FfmpegEncoder::locate(Some(Path::new("/nonexistent/ffmpeg-binary-xyz")));
        assert!(matches!(result, Err(Error::EncoderNotFound(_))));
    }

    #[test]
    fn test_from_path_consistency_with_which_crate() {
        assert_eq!(
            which::which("ffmpeg").is_ok(),
            FfmpegEncoder::from_path().is_some()
        );
    }

    #[tokio::test]
    async fn test_encode_reports_spawn_failure() {
        let encoder = FfmpegEncoder::new("/nonexistent/ffmpeg-binary-xyz");
        let input: ByteStream = Box::pin(futures::stream::empty());

        let err = encoder
            .encode(input, &request(AudioFormat::Mp3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
        assert!(err.to_string().contains("Failed to execute ffmpeg"));
    }

    /// Stand-in for ffmpeg: a shell script that gets the same arguments.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> FfmpegEncoder {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        FfmpegEncoder::new(path)
    }

    #[cfg(unix)]
    fn chunks(parts: Vec<Result<bytes::Bytes>>) -> ByteStream {
        Box::pin(futures::stream::iter(parts))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encode_pipes_input_to_output_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        // The output path is the last argument
        let encoder = fake_ffmpeg(temp_dir.path(), r#"for last; do :; done; cat > "$last""#);
        let mut req = request(AudioFormat::Mp3);
        req.output_path = temp_dir.path().join("Music Is Math.mp3");
        let payload = vec![7u8; 300_000];
        let input = chunks(vec![
            Ok(bytes::Bytes::copy_from_slice(&payload[..100_000])),
            Ok(bytes::Bytes::copy_from_slice(&payload[100_000..])),
        ]);

        encoder.encode(input, &req).await.unwrap();

        assert_eq!(std::fs::read(&req.output_path).unwrap(), payload);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encode_failure_carries_ffmpeg_stderr() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let encoder = fake_ffmpeg(
            temp_dir.path(),
            "cat >/dev/null; echo 'Invalid data found' >&2; exit 1",
        );
        let mut req = request(AudioFormat::Mp3);
        req.output_path = temp_dir.path().join("garbage.mp3");
        let input = chunks(vec![Ok(bytes::Bytes::from_static(b"definitely not media"))]);

        let err = encoder.encode(input, &req).await.unwrap_err();

        match err {
            Error::Encode { path, reason } => {
                assert_eq!(path, req.output_path);
                assert!(reason.contains("Invalid data found"), "reason: {reason}");
                assert!(!reason.ends_with('\n'));
            }
            other => panic!("expected an encode error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encode_stops_ffmpeg_when_stream_breaks() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let encoder = fake_ffmpeg(temp_dir.path(), "cat >/dev/null; sleep 30");
        let mut req = request(AudioFormat::Mp3);
        req.output_path = temp_dir.path().join("broken.mp3");
        let input = chunks(vec![
            Ok(bytes::Bytes::from_static(b"first chunk")),
            Err(Error::Stream {
                title: "Music Is Math".to_string(),
                reason: "connection reset".to_string(),
            }),
        ]);

        let result =
            tokio::time::timeout(std::time::Duration::from_secs(10), encoder.encode(input, &req))
                .await
                .expect("encode should not wait for ffmpeg to finish");

        assert!(matches!(result, Err(Error::Stream { .. })));
    }

    // Requires ffmpeg in PATH
    #[tokio::test]
    #[ignore]
    async fn test_encode_rejects_garbage_input() {
        let Some(encoder) = FfmpegEncoder::from_path() else {
            return;
        };
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut req = request(AudioFormat::Mp3);
        req.output_path = temp_dir.path().join("garbage.mp3");
        let input: ByteStream = Box::pin(futures::stream::iter(vec![Ok(bytes::Bytes::from_static(
            b"definitely not media",
        ))]));

        let err = encoder.encode(input, &req).await.unwrap_err();
        assert!(matches!(err, Error::Encode { .. }));
    }
}
