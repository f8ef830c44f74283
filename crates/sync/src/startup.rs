//! Startup checks
//!
//! Preflight checks run before a sync starts:
//! - Channel configuration is complete
//! - The staging directory for downloaded media is creatable and writable
//! - The fallback downloader (yt-dlp) is present and recent enough

use claimsync_config::Config;
use std::fs;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Oldest yt-dlp release year accepted; extractors older than this are
/// broken against the source platform.
const MIN_DOWNLOADER_YEAR: u32 = 2023;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Channel configuration incomplete: {0}")]
    ChannelConfig(String),

    #[error("Videos directory not usable: {0}")]
    VideosDir(String),

    #[error("Fallback downloader not available: {0}")]
    DownloaderUnavailable(String),

    #[error("Fallback downloader too old: {0}")]
    DownloaderVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Assert the channel section is complete enough to sync
pub fn check_channel_config(cfg: &Config) -> Result<(), StartupError> {
    if cfg.channel.name.is_empty() {
        return Err(StartupError::ChannelConfig(
            "channel.name is not set".to_string(),
        ));
    }
    if cfg.channel.source_channel_id.is_empty() {
        return Err(StartupError::ChannelConfig(
            "channel.source_channel_id is not set".to_string(),
        ));
    }
    Ok(())
}

/// Ensure the staging directory exists and is writable
pub fn check_videos_dir(dir: &Path) -> Result<(), StartupError> {
    fs::create_dir_all(dir)
        .map_err(|e| StartupError::VideosDir(format!("cannot create {}: {}", dir.display(), e)))?;
    let probe = dir.join(".claimsync-write-probe");
    fs::write(&probe, b"ok")
        .map_err(|e| StartupError::VideosDir(format!("cannot write to {}: {}", dir.display(), e)))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Parse the fallback downloader's date-based version and extract the
/// release year.
///
/// Handles the usual formats:
/// - Plain: "2024.08.06"
/// - Suffixed: "2024.08.06.232710" or "2024.08.06-dev"
pub fn parse_downloader_year(version_output: &str) -> Option<u32> {
    let first = version_output.lines().next()?.trim();
    let year_str = first.split(|c| c == '.' || c == '-').next()?;
    let year: u32 = year_str.parse().ok()?;
    // Date-based versions start with a 4-digit year
    if (2000..3000).contains(&year) {
        Some(year)
    } else {
        None
    }
}

/// Check the fallback downloader is present and recent enough by running
/// `yt-dlp --version`
pub fn check_downloader_available() -> Result<(), StartupError> {
    let output = Command::new("yt-dlp").arg("--version").output().map_err(|e| {
        StartupError::DownloaderUnavailable(format!(
            "yt-dlp --version failed; is yt-dlp installed and in PATH? Error: {}",
            e
        ))
    })?;

    if !output.status.success() {
        return Err(StartupError::DownloaderUnavailable(
            "yt-dlp --version failed; is yt-dlp installed and in PATH?".to_string(),
        ));
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let year = parse_downloader_year(&version_output).ok_or_else(|| {
        StartupError::DownloaderVersion(format!(
            "could not parse yt-dlp version from output: {}",
            version_output.lines().next().unwrap_or("(empty)")
        ))
    })?;

    if year < MIN_DOWNLOADER_YEAR {
        return Err(StartupError::DownloaderVersion(format!(
            "yt-dlp {}+ required, got a {} release",
            MIN_DOWNLOADER_YEAR, year
        )));
    }

    Ok(())
}

/// Run all startup checks in order
///
/// 1. Channel configuration
/// 2. Videos directory
/// 3. Fallback downloader
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_channel_config(cfg)?;
    check_videos_dir(Path::new(&cfg.channel.videos_dir))?;
    check_downloader_available()?;
    Ok(())
}
