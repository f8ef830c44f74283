//! Media download pipeline
//!
//! Fetches source media to local storage under size and length constraints.
//! Formats are attempted in platform preference order with a bounded retry;
//! the last attempt always falls back to the lowest-priority format, which
//! is the smallest and most likely to fit. Only an oversize result keeps the
//! loop going; any other failure deletes the partial file and terminates.

use crate::platform::{PlatformError, SourceFormat, SourcePlatform};
use crate::video::VideoItem;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Codecs the publish target can serve without transcoding
const ALLOWED_CODECS: &[&str] = &["avc1", "h264"];

/// Containers the publish target can serve without remuxing
const ALLOWED_CONTAINERS: &[&str] = &["mp4"];

/// Upper bound on per-item format attempts
pub const MAX_FORMAT_ATTEMPTS: usize = 5;

/// Error type for download operations
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No listed format matches the codec/container allow-list
    #[error("no compatible format available for this video")]
    NoCompatibleFormat,

    /// The item exceeds the configured duration limit
    #[error("video is too long to process: {hours:.2}h > {max_hours:.2}h")]
    ContentTooLong { hours: f64, max_hours: f64 },

    /// Every attempted format produced a file over the size limit
    #[error(
        "all {attempts} attempted formats exceeded the size limit: last {last_bytes} > {max_bytes}"
    )]
    AllFormatsTooLarge {
        attempts: usize,
        last_bytes: u64,
        max_bytes: u64,
    },

    /// Source-platform failure during format query or transfer
    #[error("source platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Local filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Fallback downloader exited with non-zero status
    #[error("fallback downloader failed with exit code {0}")]
    FallbackFailed(i32),

    /// Fallback downloader was terminated by signal
    #[error("fallback downloader was terminated by signal")]
    FallbackTerminated,
}

/// Which format a given retry attempt should take.
///
/// Attempts walk the preference order, except the final attempt which always
/// takes the last (lowest-priority) format.
pub fn attempt_format_index(attempt: usize, format_count: usize) -> usize {
    if attempt == MAX_FORMAT_ATTEMPTS - 1 {
        format_count - 1
    } else {
        attempt.min(format_count - 1)
    }
}

/// Filter the platform's format listing to the allow-list, preserving order
pub fn compatible_formats(formats: &[SourceFormat]) -> Vec<SourceFormat> {
    formats
        .iter()
        .filter(|f| {
            let codec = f.codec.to_lowercase();
            ALLOWED_CODECS.iter().any(|c| codec.starts_with(c))
                && ALLOWED_CONTAINERS.contains(&f.container.to_lowercase().as_str())
        })
        .cloned()
        .collect()
}

/// Downloads one item's media through the primary platform path
pub struct DownloadPipeline {
    platform: Arc<dyn SourcePlatform>,
    /// Size ceiling in bytes; None means unlimited
    max_video_size: Option<u64>,
    /// Duration ceiling in hours; values at or below 0.01 mean unlimited
    max_video_length_hours: f64,
}

impl DownloadPipeline {
    pub fn new(
        platform: Arc<dyn SourcePlatform>,
        max_video_size: Option<u64>,
        max_video_length_hours: f64,
    ) -> Self {
        Self {
            platform,
            max_video_size,
            max_video_length_hours,
        }
    }

    /// Fetch the item's media to its deterministic local path.
    ///
    /// Idempotent: if the target file already exists, no network call is
    /// made. On success `video.size` holds the measured file size.
    pub async fn fetch(&self, video: &mut VideoItem) -> Result<(), DownloadError> {
        std::fs::create_dir_all(video.video_dir())?;

        let path = video.full_path();
        if path.exists() {
            debug!(video_id = %video.id, path = %path.display(), "media already downloaded");
            video.size = Some(std::fs::metadata(&path)?.len());
            return Ok(());
        }

        let media = self.platform.media_info(&video.id).await?;
        let formats = compatible_formats(&media.formats);
        if formats.is_empty() {
            return Err(DownloadError::NoCompatibleFormat);
        }

        let length_limit_set = self.max_video_length_hours > 0.01;
        let hours = media.duration_secs / 3600.0;
        if length_limit_set && hours > self.max_video_length_hours {
            return Err(DownloadError::ContentTooLong {
                hours,
                max_hours: self.max_video_length_hours,
            });
        }

        let attempts = formats.len().min(MAX_FORMAT_ATTEMPTS);
        let mut last_oversize = 0u64;
        for attempt in 0..attempts {
            let format = &formats[attempt_format_index(attempt, formats.len())];
            debug!(video_id = %video.id, format_id = %format.id, attempt, "downloading format");

            if let Err(e) = self.platform.download_format(&video.id, format, &path).await {
                let _ = std::fs::remove_file(&path);
                return Err(e.into());
            }

            let size = std::fs::metadata(&path)?.len();
            match self.max_video_size {
                Some(max) if size > max => {
                    // Oversize is the one recoverable condition: drop the
                    // file and try the next format.
                    let _ = std::fs::remove_file(&path);
                    last_oversize = size;
                    continue;
                }
                _ => {
                    video.size = Some(size);
                    info!(video_id = %video.id, size, "download complete");
                    return Ok(());
                }
            }
        }

        Err(DownloadError::AllFormatsTooLarge {
            attempts,
            last_bytes: last_oversize,
            max_bytes: self.max_video_size.unwrap_or(0),
        })
    }
}

/// Build the external fallback downloader invocation.
///
/// The tool negotiates nothing: one attempt with a fixed encoding/container
/// constraint, writing a single merged file at the given path prefix.
pub fn build_fallback_command(video_id: &str, output_prefix: &Path, max_size_mb: u64) -> Command {
    let mut cmd = Command::new("yt-dlp");
    cmd.arg(video_id);
    cmd.arg("--no-progress");
    cmd.arg("-f").arg(format!(
        "bestvideo[ext=mp4][height<=1080][filesize<{0}M]+bestaudio[ext=m4a]/best[ext=mp4][height<=1080][filesize<{0}M]",
        max_size_mb
    ));
    cmd.arg("-o").arg(output_prefix);
    cmd.arg("--merge-output-format").arg("mp4");
    cmd
}

/// Run the fallback downloader to completion.
///
/// Blocking; callers run it on a blocking task. Best effort, single attempt.
pub fn run_fallback_downloader(
    video_id: &str,
    output_prefix: &Path,
    max_size_mb: u64,
) -> Result<(), DownloadError> {
    let mut cmd = build_fallback_command(video_id, output_prefix, max_size_mb);
    let output = cmd.output()?;
    debug!(video_id, "fallback downloader output: {}", String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(())
    } else {
        match output.status.code() {
            Some(code) => Err(DownloadError::FallbackFailed(code)),
            None => Err(DownloadError::FallbackTerminated),
        }
    }
}
