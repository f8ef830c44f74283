//! Publish engine
//!
//! Builds claim metadata and fee terms for a downloaded item and submits the
//! stream claim. Name collisions are not handled here: submission is
//! delegated to the external [`Namer`], which retries under an alternative
//! name when the target is already taken.

use crate::gateway::{DaemonGateway, Fee, StreamMetadata};
use crate::platform::TagPolicy;
use crate::video::{title_slug, VideoItem};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Fixed license recorded on every published claim
pub const LICENSE: &str = "Copyrighted (contact publisher)";

/// Error type for publish operations
#[derive(Debug, Error)]
pub enum PublishError {
    /// Daemon rejected or failed the publish
    #[error("daemon error: {0}")]
    Gateway(#[from] crate::gateway::GatewayError),

    /// The downloaded media file is missing
    #[error("downloaded media not found at {0}")]
    MediaMissing(String),

    /// The thumbnail was never mirrored for this item
    #[error("no mirrored thumbnail for {0}")]
    ThumbnailMissing(String),
}

/// Outcome of a publish or reprocess
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncSummary {
    pub claim_id: String,
    pub claim_name: String,
}

/// Wallet-side parameters shared by every publish in a run
#[derive(Debug, Clone)]
pub struct PublishParams {
    /// Address claims are created at (resolved by the capacity manager)
    pub claim_address: String,
    /// Bid amount per stream claim
    pub amount: f64,
    /// Channel the claims are published under
    pub channel_claim_id: String,
    /// Optional paid-fee policy
    pub fee: Option<Fee>,
}

/// External naming/collision-retry helper. Implementations resubmit under an
/// alternative name when the requested one is taken; the retry policy is
/// theirs, not ours.
#[async_trait]
pub trait Namer: Send + Sync {
    async fn publish_with_retry(
        &self,
        gateway: &dyn DaemonGateway,
        name: &str,
        bid: f64,
        file_path: &Path,
        metadata: StreamMetadata,
    ) -> Result<SyncSummary, crate::gateway::GatewayError>;
}

/// Single-attempt namer: submits once under the requested name and
/// propagates any collision as the daemon reports it.
pub struct DirectNamer;

#[async_trait]
impl Namer for DirectNamer {
    async fn publish_with_retry(
        &self,
        gateway: &dyn DaemonGateway,
        name: &str,
        bid: f64,
        file_path: &Path,
        metadata: StreamMetadata,
    ) -> Result<SyncSummary, crate::gateway::GatewayError> {
        let summary = gateway.stream_create(name, bid, file_path, metadata).await?;
        let output = summary.outputs.first().ok_or_else(|| {
            crate::gateway::GatewayError::Malformed("publish returned no claim output".to_string())
        })?;
        Ok(SyncSummary {
            claim_id: output.claim_id.clone(),
            claim_name: output.name.clone(),
        })
    }
}

/// Builds and submits new stream claims
pub struct PublishEngine {
    gateway: Arc<dyn DaemonGateway>,
    namer: Arc<dyn Namer>,
    tags: Arc<dyn TagPolicy>,
}

impl PublishEngine {
    pub fn new(
        gateway: Arc<dyn DaemonGateway>,
        namer: Arc<dyn Namer>,
        tags: Arc<dyn TagPolicy>,
    ) -> Self {
        Self {
            gateway,
            namer,
            tags,
        }
    }

    /// Assemble the claim metadata for one item
    pub fn build_metadata(&self, video: &VideoItem, params: &PublishParams) -> StreamMetadata {
        let resolved = video.resolve_metadata(self.tags.as_ref());
        StreamMetadata {
            title: Some(video.title.clone()),
            description: Some(video.abbreviated_description()),
            claim_address: Some(params.claim_address.clone()),
            tags: resolved.tags,
            languages: resolved.languages,
            locations: resolved.locations,
            thumbnail_url: video.thumbnail_url.clone(),
            fee: params.fee.clone(),
            license: Some(LICENSE.to_string()),
            release_time: Some(video.published_at),
            duration_secs: None,
            channel_id: Some(params.channel_claim_id.clone()),
        }
    }

    /// Publish a downloaded item as a new stream claim
    pub async fn publish(
        &self,
        video: &VideoItem,
        params: &PublishParams,
    ) -> Result<SyncSummary, PublishError> {
        let path = video.full_path();
        if !path.exists() {
            return Err(PublishError::MediaMissing(path.display().to_string()));
        }
        if video.thumbnail_url.is_none() {
            return Err(PublishError::ThumbnailMissing(video.id.clone()));
        }

        let metadata = self.build_metadata(video, params);
        let name = {
            let slug = title_slug(&video.title);
            if slug.is_empty() {
                video.id.clone()
            } else {
                slug
            }
        };
        debug!(video_id = %video.id, claim_name = %name, "submitting publish");
        let summary = self
            .namer
            .publish_with_retry(self.gateway.as_ref(), &name, params.amount, &path, metadata)
            .await?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::KeepAllTags;
    use crate::test_util::{MockGateway, MockNamer};
    use crate::video::SourceVideoMetadata;
    use std::path::PathBuf;

    fn test_video(dir: PathBuf) -> VideoItem {
        VideoItem {
            id: "vid002".to_string(),
            title: "Hello, World! 2024".to_string(),
            description: "a description".to_string(),
            published_at: 1_600_000_000,
            source_channel_id: "UC1".to_string(),
            source_url: "https://source.example/watch?v=vid002".to_string(),
            dir,
            size: Some(100),
            thumbnail_url: Some("https://thumbs/vid002.jpg".to_string()),
            metadata: Some(SourceVideoMetadata {
                default_language: Some("en".to_string()),
                tags: vec!["demo".to_string()],
                duration_secs: 42.0,
                ..Default::default()
            }),
        }
    }

    fn params() -> PublishParams {
        PublishParams {
            claim_address: "bAddress1".to_string(),
            amount: 0.01,
            channel_claim_id: "chan1".to_string(),
            fee: None,
        }
    }

    #[tokio::test]
    async fn test_publish_builds_metadata_and_delegates_to_namer() {
        let dir = tempfile::tempdir().unwrap();
        let video = test_video(dir.path().to_path_buf());
        std::fs::create_dir_all(video.video_dir()).unwrap();
        std::fs::write(video.full_path(), b"media").unwrap();

        let gateway = Arc::new(MockGateway::default());
        let namer = Arc::new(MockNamer::default());
        let engine = PublishEngine::new(gateway, namer.clone(), Arc::new(KeepAllTags));

        let summary = engine.publish(&video, &params()).await.unwrap();
        assert_eq!(summary.claim_id, "new-claim");

        let submitted = namer.submissions.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        let (name, bid, metadata) = &submitted[0];
        assert_eq!(name, "hello-world-2024");
        assert!((bid - 0.01).abs() < 1e-9);
        assert_eq!(metadata.title.as_deref(), Some("Hello, World! 2024"));
        assert_eq!(metadata.license.as_deref(), Some(LICENSE));
        assert_eq!(metadata.release_time, Some(1_600_000_000));
        assert_eq!(metadata.channel_id.as_deref(), Some("chan1"));
        assert_eq!(metadata.claim_address.as_deref(), Some("bAddress1"));
        assert_eq!(metadata.languages, vec!["en"]);
        assert_eq!(metadata.tags, vec!["demo"]);
    }

    #[tokio::test]
    async fn test_publish_fails_without_media_file() {
        let dir = tempfile::tempdir().unwrap();
        let video = test_video(dir.path().to_path_buf());

        let engine = PublishEngine::new(
            Arc::new(MockGateway::default()),
            Arc::new(MockNamer::default()),
            Arc::new(KeepAllTags),
        );

        let err = engine.publish(&video, &params()).await.unwrap_err();
        assert!(matches!(err, PublishError::MediaMissing(_)));
    }

    #[tokio::test]
    async fn test_publish_fails_without_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let mut video = test_video(dir.path().to_path_buf());
        std::fs::create_dir_all(video.video_dir()).unwrap();
        std::fs::write(video.full_path(), b"media").unwrap();
        video.thumbnail_url = None;

        let engine = PublishEngine::new(
            Arc::new(MockGateway::default()),
            Arc::new(MockNamer::default()),
            Arc::new(KeepAllTags),
        );

        let err = engine.publish(&video, &params()).await.unwrap_err();
        assert!(matches!(err, PublishError::ThumbnailMissing(_)));
    }

    #[tokio::test]
    async fn test_publish_attaches_fee_terms() {
        let dir = tempfile::tempdir().unwrap();
        let video = test_video(dir.path().to_path_buf());
        std::fs::create_dir_all(video.video_dir()).unwrap();
        std::fs::write(video.full_path(), b"media").unwrap();

        let namer = Arc::new(MockNamer::default());
        let engine = PublishEngine::new(
            Arc::new(MockGateway::default()),
            namer.clone(),
            Arc::new(KeepAllTags),
        );

        let mut p = params();
        p.fee = Some(Fee {
            amount: 0.5,
            currency: "LBC".to_string(),
            address: "bFeeAddr".to_string(),
        });
        engine.publish(&video, &p).await.unwrap();

        let submitted = namer.submissions.lock().unwrap();
        let fee = submitted[0].2.fee.as_ref().expect("fee should be set");
        assert!((fee.amount - 0.5).abs() < 1e-9);
    }
}
