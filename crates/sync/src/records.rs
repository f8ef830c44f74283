//! Persisted sync records
//!
//! The record store is an external service that remembers, per item, whether
//! a publish already happened and under which claim id. The sync consumes
//! these records to budget credits and to decide publish vs. reprocess; it
//! never owns them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Metadata schema version written by current builds. Records below this
/// version are budgeted for an upgrade pass when enabled.
pub const CURRENT_METADATA_VERSION: u32 = 2;

/// Error type for record-store operations
#[derive(Debug, Error)]
pub enum RecordError {
    /// Transport-level failure reaching the record store
    #[error("record store transport error: {0}")]
    Transport(String),

    /// The record store rejected the request
    #[error("record store error: {0}")]
    Api(String),
}

/// Whether ownership of the channel claim has been handed off externally
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    #[default]
    None,
    Pending,
    Complete,
}

/// Per-item record of a previous sync attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncedVideoRecord {
    pub video_id: String,
    /// True once a claim exists for this item; false records count as
    /// failed attempts that already consumed their credit allocation.
    pub published: bool,
    pub claim_id: String,
    /// Media size recorded at publish time, when known
    pub size: Option<u64>,
    pub metadata_version: u32,
}

impl SyncedVideoRecord {
    /// Whether this record predates the current metadata schema
    pub fn needs_metadata_upgrade(&self) -> bool {
        self.published && self.metadata_version < CURRENT_METADATA_VERSION
    }
}

/// Per-channel record held by the store
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelRecord {
    /// Claim id recorded after the channel claim was first created
    pub claim_id: Option<String>,
    pub transfer_state: TransferState,
    /// Address publishes must target once a transfer is underway
    pub publish_address: Option<String>,
}

/// External persistence for sync state
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All per-item records for a channel
    async fn synced_videos(&self, channel_id: &str)
        -> Result<Vec<SyncedVideoRecord>, RecordError>;

    /// The channel-level record (claim id, transfer state)
    async fn channel_record(&self, channel_id: &str) -> Result<ChannelRecord, RecordError>;

    /// Persist the channel claim id after a create or upgrade
    async fn set_channel_claim_id(
        &self,
        channel_id: &str,
        claim_id: &str,
    ) -> Result<(), RecordError>;

    /// Persist the outcome of one item sync
    async fn set_video_record(
        &self,
        channel_id: &str,
        record: &SyncedVideoRecord,
    ) -> Result<(), RecordError>;
}

/// Tally of already-allocated credits across a channel's records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationCounts {
    pub published: u64,
    pub failed: u64,
    pub not_upgraded: u64,
}

impl AllocationCounts {
    /// Count published/failed/legacy records the way the capacity budget
    /// consumes them.
    pub fn tally(records: &[SyncedVideoRecord]) -> Self {
        let mut counts = Self::default();
        for record in records {
            if record.published {
                counts.published += 1;
                if record.metadata_version < CURRENT_METADATA_VERSION {
                    counts.not_upgraded += 1;
                }
            } else {
                counts.failed += 1;
            }
        }
        counts
    }

    /// Total items that already consumed their credit allocation
    pub fn allocated(&self) -> u64 {
        self.published + self.failed
    }
}
