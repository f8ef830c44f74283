//! Source-platform collaborators
//!
//! Content enumeration, metadata, media download, thumbnail mirroring and
//! tag sanitation are external services. The sync only depends on these
//! traits; HTTP client implementations live in [`crate::remote`].

use crate::video::VideoItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for source-platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Transport-level failure reaching the platform API
    #[error("platform transport error: {0}")]
    Transport(String),

    /// The platform rejected the request
    #[error("platform api error: {0}")]
    Api(String),

    /// The requested entity does not exist on the platform
    #[error("not found on source platform: {0}")]
    NotFound(String),

    /// IO failure while writing downloaded media
    #[error("download io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Channel branding/snippet as returned by the source platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelSnippet {
    pub title: String,
    pub description: String,
    pub thumbnail_url: String,
    /// Banner image, when the channel has one
    pub banner_url: Option<String>,
    /// BCP-47-ish language code; may use legacy codes the ledger rejects
    pub default_language: Option<String>,
    pub country: Option<String>,
}

/// One downloadable encoding of a source item, in the platform's
/// preference order (highest quality first).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceFormat {
    /// Platform-assigned format identifier
    pub id: String,
    pub codec: String,
    pub container: String,
}

/// Format listing plus the declared duration for a source item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceMediaInfo {
    pub duration_secs: f64,
    pub formats: Vec<SourceFormat>,
}

/// Read-only view of the source platform, externally rate limited
#[async_trait]
pub trait SourcePlatform: Send + Sync {
    /// Total number of items published on the channel
    async fn video_count(&self, channel_id: &str) -> Result<u64, PlatformError>;

    /// Enumerate items with their metadata, oldest first, up to `limit`
    async fn list_videos(&self, channel_id: &str, limit: u64)
        -> Result<Vec<VideoItem>, PlatformError>;

    /// Channel snippet and branding
    async fn channel_snippet(&self, channel_id: &str)
        -> Result<Option<ChannelSnippet>, PlatformError>;

    /// Available encodings and duration for one item
    async fn media_info(&self, video_id: &str) -> Result<SourceMediaInfo, PlatformError>;

    /// Fetch one encoding of `video_id` to `dest`
    async fn download_format(
        &self,
        video_id: &str,
        format: &SourceFormat,
        dest: &Path,
    ) -> Result<(), PlatformError>;
}

/// Mirrors a remote image into our own storage, returning the mirrored URL
#[async_trait]
pub trait ThumbnailMirror: Send + Sync {
    async fn mirror(&self, source_url: &str, key: &str) -> Result<String, PlatformError>;
}

/// External tag-sanitation policy
pub trait TagPolicy: Send + Sync {
    /// Sanitize raw source tags for the given channel
    fn sanitize(&self, tags: Vec<String>, channel_id: &str) -> Vec<String>;

    /// Curated tags for the channel claim itself
    fn channel_tags(&self, channel_id: &str) -> Vec<String>;
}

/// Pass-through policy used when no external sanitizer is wired in
pub struct KeepAllTags;

impl TagPolicy for KeepAllTags {
    fn sanitize(&self, tags: Vec<String>, _channel_id: &str) -> Vec<String> {
        tags
    }

    fn channel_tags(&self, _channel_id: &str) -> Vec<String> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_all_tags_is_identity() {
        let policy = KeepAllTags;
        let tags = vec!["music".to_string(), "live".to_string()];
        assert_eq!(policy.sanitize(tags.clone(), "UC123"), tags);
        assert!(policy.channel_tags("UC123").is_empty());
    }

    #[test]
    fn test_source_media_info_round_trip() {
        let info = SourceMediaInfo {
            duration_secs: 873.4,
            formats: vec![SourceFormat {
                id: "22".to_string(),
                codec: "avc1".to_string(),
                container: "mp4".to_string(),
            }],
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: SourceMediaInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
