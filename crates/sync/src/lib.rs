//! claimsync
//!
//! Service that mirrors a source platform channel onto a claim-based
//! ledger: wallet capacity management, channel claim ownership, the
//! download/thumbnail/publish pipeline and idempotent reprocessing of
//! already-published items.

pub mod capacity;
pub mod channel;
pub mod concurrency;
pub mod download;
pub mod gateway;
pub mod metrics;
pub mod platform;
pub mod publish;
pub mod records;
pub mod remote;
pub mod reprocess;
pub mod startup;
pub mod status_server;
pub mod sync;
pub mod video;

#[cfg(test)]
mod test_util;

pub use claimsync_config as config;
pub use claimsync_config::Config;

pub use capacity::{
    resolve_default_account, BlockWait, CapacityError, CapacityManager, CapacityReport,
    WaitIntervals,
};
pub use channel::{OwnershipError, OwnershipManager};
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use download::{DownloadError, DownloadPipeline};
pub use gateway::{DaemonGateway, FundingSource, GatewayError, HttpFundingSource, HttpGateway};
pub use metrics::{
    collect_system_metrics, new_shared_metrics, ItemMetrics, SharedMetrics, SyncSnapshot,
    SystemMetrics,
};
pub use platform::{KeepAllTags, PlatformError, SourcePlatform, TagPolicy, ThumbnailMirror};
pub use publish::{DirectNamer, Namer, PublishEngine, PublishError, PublishParams, SyncSummary};
pub use records::{RecordError, RecordStore, SyncedVideoRecord};
pub use remote::{RemoteRecordStore, RemoteSourcePlatform, RemoteThumbnailMirror};
pub use reprocess::{ReprocessEngine, ReprocessError};
pub use startup::{run_startup_checks, StartupError};
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use sync::{ChannelSync, SyncError, SyncOutcome};
pub use video::VideoItem;
