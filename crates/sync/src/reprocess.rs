//! Reprocess engine
//!
//! Updates a previously published claim's on-chain metadata without touching
//! its media. The canonical media size is resolved through a fallback chain:
//! the claim's embedded stream descriptor first, the persisted record next,
//! and if neither is available the item must be republished from scratch;
//! a condition this engine reports but never acts on itself.

use crate::gateway::{DaemonGateway, StreamMetadata, StreamUpdate};
use crate::platform::{TagPolicy, ThumbnailMirror};
use crate::publish::{PublishParams, SyncSummary, LICENSE};
use crate::records::SyncedVideoRecord;
use crate::video::VideoItem;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Error type for reprocess operations
#[derive(Debug, Error)]
pub enum ReprocessError {
    /// The recorded claim id resolves to nothing on the ledger
    #[error("cannot reprocess: no claim found for claim id {0}")]
    ClaimNotFound(String),

    /// The recorded claim id resolves to more than one claim
    #[error("cannot reprocess: {count} claims found for claim id {claim_id}")]
    AmbiguousClaim { claim_id: String, count: usize },

    /// No media size is recoverable; an in-place update is impossible
    #[error("the video must be republished: no media size is recoverable for claim {0}")]
    MustRepublish(String),

    /// Record-only reprocess with legacy metadata and no source to mirror from
    #[error("no source metadata available to mirror a thumbnail for {0}")]
    NoSourceThumbnail(String),

    /// Daemon failure
    #[error("daemon error: {0}")]
    Gateway(#[from] crate::gateway::GatewayError),

    /// Thumbnail mirroring failure
    #[error("thumbnail error: {0}")]
    Mirror(#[from] crate::platform::PlatformError),
}

/// Resolve the canonical media size: claim-embedded first, then the
/// persisted record. `None` means an update-in-place is impossible.
pub fn resolve_stream_size(claim_size: Option<u64>, recorded_size: Option<u64>) -> Option<u64> {
    claim_size.or_else(|| recorded_size.filter(|size| *size > 0))
}

/// Updates already-published claims in place
pub struct ReprocessEngine {
    gateway: Arc<dyn DaemonGateway>,
    mirror: Arc<dyn ThumbnailMirror>,
    tags: Arc<dyn TagPolicy>,
    /// Base URL where previously mirrored thumbnails are served, keyed by id
    thumbnail_endpoint: String,
}

impl ReprocessEngine {
    pub fn new(
        gateway: Arc<dyn DaemonGateway>,
        mirror: Arc<dyn ThumbnailMirror>,
        tags: Arc<dyn TagPolicy>,
        thumbnail_endpoint: String,
    ) -> Self {
        Self {
            gateway,
            mirror,
            tags,
            thumbnail_endpoint,
        }
    }

    /// Reprocess one already-published item.
    ///
    /// A record-only reprocess (no source metadata) updates fewer fields:
    /// title, description, duration and release time are left untouched and
    /// no clear flags are sent.
    pub async fn reprocess(
        &self,
        video: &VideoItem,
        record: &SyncedVideoRecord,
        params: &PublishParams,
    ) -> Result<SyncSummary, ReprocessError> {
        let claims = self.gateway.claim_search(&record.claim_id).await?;
        let current = match claims.len() {
            0 => return Err(ReprocessError::ClaimNotFound(record.claim_id.clone())),
            1 => &claims[0],
            count => {
                return Err(ReprocessError::AmbiguousClaim {
                    claim_id: record.claim_id.clone(),
                    count,
                })
            }
        };

        let thumbnail_url = if current.value.thumbnail_url.is_some() {
            // Metadata is already current-format; keep pointing at the mirror
            format!("{}{}", self.thumbnail_endpoint, video.id)
        } else {
            let source_url = video
                .metadata
                .as_ref()
                .and_then(|m| m.source_thumbnail_url.clone())
                .ok_or_else(|| ReprocessError::NoSourceThumbnail(video.id.clone()))?;
            self.mirror.mirror(&source_url, &video.id).await?
        };

        let size = resolve_stream_size(current.value.stream_size, record.size).ok_or_else(|| {
            info!(video_id = %video.id, "no recoverable media size; republish required");
            ReprocessError::MustRepublish(record.claim_id.clone())
        })?;

        let resolved = video.resolve_metadata(self.tags.as_ref());
        let mut metadata = StreamMetadata {
            tags: resolved.tags,
            languages: resolved.languages,
            locations: resolved.locations,
            thumbnail_url: Some(thumbnail_url),
            fee: params.fee.clone(),
            license: Some(LICENSE.to_string()),
            channel_id: Some(params.channel_claim_id.clone()),
            ..Default::default()
        };

        let full_metadata = video.metadata.is_some();
        if let Some(source) = &video.metadata {
            metadata.title = Some(video.title.clone());
            metadata.description = Some(video.abbreviated_description());
            metadata.duration_secs = Some(source.duration_secs.ceil() as u64);
            metadata.release_time = Some(video.published_at);
        }

        let update = StreamUpdate {
            metadata,
            file_size: Some(size),
            clear_tags: full_metadata,
            clear_languages: full_metadata,
            clear_locations: full_metadata,
        };

        debug!(video_id = %video.id, claim_id = %record.claim_id, size, "submitting stream update");
        let summary = self.gateway.stream_update(&record.claim_id, update).await?;
        let output = summary.outputs.first().ok_or_else(|| {
            crate::gateway::GatewayError::Malformed("update returned no claim output".to_string())
        })?;
        Ok(SyncSummary {
            claim_id: output.claim_id.clone(),
            claim_name: output.name.clone(),
        })
    }
}
