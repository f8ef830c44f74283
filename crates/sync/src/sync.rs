//! Channel sync orchestrator
//!
//! Drives one full pass over a source channel: establish wallet capacity,
//! then push every item through download, thumbnail mirroring and publish
//! (or an idempotent reprocess when a claim already exists). Item failures
//! are recorded and the pass continues; capacity failures abort the pass.
//!
//! All wallet-output-consuming work happens under a per-account section:
//! capacity setup holds it exclusively (it counts and splits outputs),
//! concurrent publishes share it (each consumes outputs but never reshapes
//! the pool).

use crate::capacity::{CapacityError, CapacityManager, CapacityReport};
use crate::concurrency::ConcurrencyPlan;
use crate::download::{run_fallback_downloader, DownloadError, DownloadPipeline};
use crate::gateway::Fee;
use crate::metrics::{collect_system_metrics, ItemMetrics, SharedMetrics};
use crate::platform::{PlatformError, SourcePlatform, ThumbnailMirror};
use crate::publish::{PublishEngine, PublishParams, SyncSummary};
use crate::records::{RecordError, RecordStore, SyncedVideoRecord, CURRENT_METADATA_VERSION};
use crate::reprocess::ReprocessEngine;
use crate::video::VideoItem;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors that abort a whole sync pass.
///
/// Per-item failures never surface here; they are folded into
/// [`SyncOutcome::failures`] with a pipeline-stage label.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    #[error("source platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("record store error: {0}")]
    Records(#[from] RecordError),

    /// A stage-labeled per-item failure
    #[error("{stage}: {message}")]
    Stage { stage: &'static str, message: String },
}

impl SyncError {
    fn stage(stage: &'static str, source: impl std::fmt::Display) -> Self {
        Self::Stage {
            stage,
            message: source.to_string(),
        }
    }
}

/// Tally of one completed sync pass
#[derive(Debug, Default, PartialEq)]
pub struct SyncOutcome {
    pub published: u64,
    pub reprocessed: u64,
    pub failed: u64,
    /// `(video_id, stage-labeled message)` per failed item
    pub failures: Vec<(String, String)>,
}

/// What one item produced when it went through cleanly
struct ItemOutcome {
    summary: SyncSummary,
    reprocessed: bool,
    size: Option<u64>,
}

/// One source channel's full sync pipeline
pub struct ChannelSync {
    platform: Arc<dyn SourcePlatform>,
    records: Arc<dyn RecordStore>,
    mirror: Arc<dyn ThumbnailMirror>,
    capacity: Arc<CapacityManager>,
    downloads: Arc<DownloadPipeline>,
    publisher: Arc<PublishEngine>,
    reprocessor: Arc<ReprocessEngine>,
    metrics: SharedMetrics,
    /// Exclusive for capacity setup, shared for publishes
    wallet_section: Arc<RwLock<()>>,
    permits: Arc<Semaphore>,
    cancel: watch::Receiver<bool>,
    channel_name: String,
    source_channel_id: String,
    videos_limit: u64,
    publish_amount: f64,
    fee: Option<Fee>,
    max_video_size_mb: u64,
    /// Whether to shell out to the external downloader when the primary
    /// path fails; disabled in tests.
    use_fallback_downloader: bool,
}

impl ChannelSync {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: Arc<dyn SourcePlatform>,
        records: Arc<dyn RecordStore>,
        mirror: Arc<dyn ThumbnailMirror>,
        capacity: Arc<CapacityManager>,
        downloads: Arc<DownloadPipeline>,
        publisher: Arc<PublishEngine>,
        reprocessor: Arc<ReprocessEngine>,
        metrics: SharedMetrics,
        wallet_section: Arc<RwLock<()>>,
        plan: ConcurrencyPlan,
        cancel: watch::Receiver<bool>,
        channel_name: String,
        source_channel_id: String,
        videos_limit: u64,
        publish_amount: f64,
        fee: Option<Fee>,
        max_video_size_mb: u64,
        use_fallback_downloader: bool,
    ) -> Self {
        Self {
            platform,
            records,
            mirror,
            capacity,
            downloads,
            publisher,
            reprocessor,
            metrics,
            wallet_section,
            permits: Arc::new(Semaphore::new(plan.concurrent_videos as usize)),
            cancel,
            channel_name,
            source_channel_id,
            videos_limit,
            publish_amount,
            fee,
            max_video_size_mb,
            use_fallback_downloader,
        }
    }

    /// Run one full sync pass over the source channel.
    pub async fn run(self: Arc<Self>) -> Result<SyncOutcome, SyncError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, channel = %self.channel_name, "sync run starting");
        let report = {
            let _section = self.wallet_section.write().await;
            self.capacity.ensure_capacity(&self.cancel).await?
        };
        if report.videos_on_source == 0 {
            info!(channel = %self.channel_name, "source channel has no items, nothing to sync");
            return Ok(SyncOutcome::default());
        }
        let params = self.publish_params(&report)?;

        let videos = self
            .platform
            .list_videos(&self.source_channel_id, self.videos_limit)
            .await?;
        let known: HashMap<String, SyncedVideoRecord> = self
            .records
            .synced_videos(&self.source_channel_id)
            .await?
            .into_iter()
            .map(|record| (record.video_id.clone(), record))
            .collect();

        {
            let mut snapshot = self.metrics.write().await;
            snapshot.channel = self.channel_name.clone();
            snapshot.queued = videos.len();
            snapshot.timestamp_unix_ms = now_unix_ms();
        }
        info!(
            channel = %self.channel_name,
            items = videos.len(),
            "starting sync pass"
        );

        let mut tasks: JoinSet<(String, String, ItemResult)> = JoinSet::new();
        for video in videos {
            if *self.cancel.borrow() {
                info!("cancellation requested, not scheduling further items");
                break;
            }
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .expect("permit semaphore closed");
            let this = self.clone();
            let record = known.get(&video.id).cloned();
            let params = params.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let id = video.id.clone();
                let prior_claim = record
                    .as_ref()
                    .map(|r| r.claim_id.clone())
                    .unwrap_or_default();
                let path = video.full_path();
                let result = this.process_item(video, record, &params).await;
                // The media file never outlives its item, success or not
                let _ = std::fs::remove_file(&path);
                (id, prior_claim, result)
            });
        }

        let mut outcome = SyncOutcome::default();
        while let Some(joined) = tasks.join_next().await {
            let (video_id, prior_claim, result) = match joined {
                Ok(finished) => finished,
                Err(join_error) => {
                    warn!(error = %join_error, "item task aborted");
                    outcome.failed += 1;
                    outcome
                        .failures
                        .push(("<unknown>".to_string(), join_error.to_string()));
                    continue;
                }
            };
            match result {
                Ok(item) => {
                    self.records
                        .set_video_record(
                            &self.source_channel_id,
                            &SyncedVideoRecord {
                                video_id: video_id.clone(),
                                published: true,
                                claim_id: item.summary.claim_id.clone(),
                                size: item.size,
                                metadata_version: CURRENT_METADATA_VERSION,
                            },
                        )
                        .await?;
                    self.finish_item(&video_id, &item).await;
                    if item.reprocessed {
                        outcome.reprocessed += 1;
                    } else {
                        outcome.published += 1;
                    }
                }
                Err(error) => {
                    warn!(video_id = %video_id, error = %error, "item failed");
                    self.records
                        .set_video_record(
                            &self.source_channel_id,
                            &SyncedVideoRecord {
                                video_id: video_id.clone(),
                                published: false,
                                claim_id: prior_claim,
                                size: None,
                                metadata_version: CURRENT_METADATA_VERSION,
                            },
                        )
                        .await?;
                    {
                        let mut snapshot = self.metrics.write().await;
                        snapshot.failed += 1;
                        snapshot.items.retain(|item| item.video_id != video_id);
                    }
                    outcome.failed += 1;
                    outcome.failures.push((video_id, error.to_string()));
                }
            }
        }
        info!(
            published = outcome.published,
            reprocessed = outcome.reprocessed,
            failed = outcome.failed,
            "sync pass complete"
        );
        Ok(outcome)
    }

    fn publish_params(&self, report: &CapacityReport) -> Result<PublishParams, SyncError> {
        let claim_address = report
            .claim_address
            .clone()
            .ok_or_else(|| SyncError::stage("publish error", "no claim address resolved"))?;
        Ok(PublishParams {
            claim_address,
            amount: self.publish_amount,
            channel_claim_id: report.channel_claim_id.clone(),
            fee: self.fee.clone(),
        })
    }

    async fn process_item(
        &self,
        mut video: VideoItem,
        record: Option<SyncedVideoRecord>,
        params: &PublishParams,
    ) -> ItemResult {
        if let Some(record) = record.filter(|r| r.published) {
            self.set_stage(&video, "reprocess").await;
            let _section = self.wallet_section.read().await;
            let summary = self
                .reprocessor
                .reprocess(&video, &record, params)
                .await
                .map_err(|e| SyncError::stage("reprocess error", e))?;
            return Ok(ItemOutcome {
                summary,
                reprocessed: true,
                size: record.size,
            });
        }

        self.set_stage(&video, "download").await;
        self.fetch_with_fallback(&mut video).await?;

        self.set_stage(&video, "thumbnail").await;
        if video.thumbnail_url.is_none() {
            let source_url = video
                .metadata
                .as_ref()
                .and_then(|m| m.source_thumbnail_url.clone())
                .ok_or_else(|| {
                    SyncError::stage(
                        "thumbnail error",
                        format!("item {} has no source thumbnail", video.id),
                    )
                })?;
            let mirrored = self
                .mirror
                .mirror(&source_url, &video.id)
                .await
                .map_err(|e| SyncError::stage("thumbnail error", e))?;
            video.thumbnail_url = Some(mirrored);
        }

        self.set_stage(&video, "publish").await;
        let _section = self.wallet_section.read().await;
        let summary = self
            .publisher
            .publish(&video, params)
            .await
            .map_err(|e| SyncError::stage("publish error", e))?;
        Ok(ItemOutcome {
            summary,
            reprocessed: false,
            size: video.size,
        })
    }

    /// Primary download, with one best-effort pass through the external
    /// downloader on failure. The primary error is the one reported when
    /// the fallback doesn't produce a file either.
    async fn fetch_with_fallback(&self, video: &mut VideoItem) -> Result<(), SyncError> {
        let primary = match self.downloads.fetch(video).await {
            Ok(()) => return Ok(()),
            Err(error) => error,
        };
        // An over-length item is a policy gate, not a transport failure
        let worth_retrying = !matches!(primary, DownloadError::ContentTooLong { .. });
        if self.use_fallback_downloader && worth_retrying {
            warn!(
                video_id = %video.id,
                error = %primary,
                "primary download failed, trying external downloader"
            );
            let id = video.id.clone();
            let prefix = video.full_path();
            let max_mb = if self.max_video_size_mb == 0 {
                1_000_000
            } else {
                self.max_video_size_mb
            };
            let fallback =
                tokio::task::spawn_blocking(move || run_fallback_downloader(&id, &prefix, max_mb))
                    .await;
            if matches!(fallback, Ok(Ok(()))) {
                if let Ok(file) = std::fs::metadata(video.full_path()) {
                    video.size = Some(file.len());
                    return Ok(());
                }
            }
        }
        Err(SyncError::stage("download error", primary))
    }

    async fn set_stage(&self, video: &VideoItem, stage: &str) {
        let mut snapshot = self.metrics.write().await;
        snapshot.timestamp_unix_ms = now_unix_ms();
        snapshot.system = collect_system_metrics();
        if let Some(item) = snapshot.items.iter_mut().find(|i| i.video_id == video.id) {
            item.stage = stage.to_string();
        } else {
            snapshot.queued = snapshot.queued.saturating_sub(1);
            snapshot.running += 1;
            snapshot.items.push(ItemMetrics {
                video_id: video.id.clone(),
                title: video.title.clone(),
                stage: stage.to_string(),
                size_bytes: video.size.unwrap_or(0),
                claim_id: None,
            });
        }
    }

    async fn finish_item(&self, video_id: &str, item: &ItemOutcome) {
        let mut snapshot = self.metrics.write().await;
        snapshot.timestamp_unix_ms = now_unix_ms();
        snapshot.running = snapshot.running.saturating_sub(1);
        snapshot.items.retain(|i| i.video_id != video_id);
        if item.reprocessed {
            snapshot.reprocessed += 1;
        } else {
            snapshot.published += 1;
        }
        snapshot.total_bytes_published += item.size.unwrap_or(0);
    }
}

type ItemResult = Result<ItemOutcome, SyncError>;

fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
