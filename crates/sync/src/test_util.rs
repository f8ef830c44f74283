//! Scripted mock collaborators shared by module tests
//!
//! Every mock records the calls made against it so tests can assert not
//! just outcomes but also which daemon writes happened (or didn't).

use crate::gateway::{
    Account, ChannelMetadata, Claim, ClaimOutput, ClearFlags, DaemonGateway, DaemonStatus,
    FundingSource, GatewayError, StreamMetadata, StreamUpdate, TransactionSummary, Utxo,
};
use crate::platform::{
    ChannelSnippet, PlatformError, SourceFormat, SourceMediaInfo, SourcePlatform, ThumbnailMirror,
};
use crate::publish::{Namer, SyncSummary};
use crate::records::{ChannelRecord, RecordError, RecordStore, SyncedVideoRecord};
use crate::video::VideoItem;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

fn default_summary() -> TransactionSummary {
    TransactionSummary {
        outputs: vec![ClaimOutput {
            claim_id: "new-claim".to_string(),
            name: "new-claim-name".to_string(),
        }],
    }
}

/// Scripted wallet daemon
pub struct MockGateway {
    pub accounts: Vec<Account>,
    pub balance: Option<f64>,
    pub utxos: Option<Vec<Utxo>>,
    pub addresses: Vec<String>,
    pub unused_address: Option<String>,
    pub channels: Option<Vec<Claim>>,
    pub search_results: Vec<Claim>,
    /// Status replies consumed front-to-back; the last one repeats
    pub statuses: Mutex<VecDeque<DaemonStatus>>,
    pub summary: TransactionSummary,
    /// Method names in call order
    pub calls: Mutex<Vec<String>>,
    /// Stream updates captured for inspection
    pub stream_updates: Mutex<Vec<(String, StreamUpdate)>>,
    /// Channel writes captured for inspection
    pub channel_writes: Mutex<Vec<(String, ChannelMetadata, Option<ClearFlags>)>>,
    /// Account funds captured as (amount, output_count)
    pub funds: Mutex<Vec<(f64, u64)>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            accounts: vec![Account {
                id: "acct1".to_string(),
                ledger: "regtest".to_string(),
                is_default: true,
                available: 10.0,
            }],
            balance: Some(10.0),
            utxos: Some(Vec::new()),
            addresses: vec!["bAddr1".to_string()],
            unused_address: Some("bUnused1".to_string()),
            channels: Some(Vec::new()),
            search_results: Vec::new(),
            statuses: Mutex::new(VecDeque::new()),
            summary: default_summary(),
            calls: Mutex::new(Vec::new()),
            stream_updates: Mutex::new(Vec::new()),
            channel_writes: Mutex::new(Vec::new()),
            funds: Mutex::new(Vec::new()),
        }
    }
}

impl MockGateway {
    fn record(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }

    /// Count of claim- or output-mutating calls made so far
    pub fn write_count(&self) -> usize {
        const WRITES: &[&str] = &[
            "account_fund",
            "channel_create",
            "channel_update",
            "stream_create",
            "stream_update",
        ];
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| WRITES.contains(&call.as_str()))
            .count()
    }
}

#[async_trait]
impl DaemonGateway for MockGateway {
    async fn account_list(&self) -> Result<Vec<Account>, GatewayError> {
        self.record("account_list");
        Ok(self.accounts.clone())
    }

    async fn account_balance(
        &self,
        _account_id: Option<&str>,
    ) -> Result<Option<f64>, GatewayError> {
        self.record("account_balance");
        Ok(self.balance)
    }

    async fn account_fund(
        &self,
        _from: &str,
        _to: &str,
        amount: f64,
        output_count: u64,
        _broadcast: bool,
    ) -> Result<Option<TransactionSummary>, GatewayError> {
        self.record("account_fund");
        self.funds.lock().unwrap().push((amount, output_count));
        Ok(Some(self.summary.clone()))
    }

    async fn utxo_list(&self, _account_id: &str) -> Result<Option<Vec<Utxo>>, GatewayError> {
        self.record("utxo_list");
        Ok(self.utxos.clone())
    }

    async fn address_list(&self, _account_id: Option<&str>) -> Result<Vec<String>, GatewayError> {
        self.record("address_list");
        Ok(self.addresses.clone())
    }

    async fn address_unused(&self, _account_id: &str) -> Result<Option<String>, GatewayError> {
        self.record("address_unused");
        Ok(self.unused_address.clone())
    }

    async fn channel_list(&self) -> Result<Option<Vec<Claim>>, GatewayError> {
        self.record("channel_list");
        Ok(self.channels.clone())
    }

    async fn channel_create(
        &self,
        name: &str,
        _bid: f64,
        metadata: ChannelMetadata,
    ) -> Result<TransactionSummary, GatewayError> {
        self.record("channel_create");
        self.channel_writes
            .lock()
            .unwrap()
            .push((name.to_string(), metadata, None));
        Ok(self.summary.clone())
    }

    async fn channel_update(
        &self,
        claim_id: &str,
        metadata: ChannelMetadata,
        clear: ClearFlags,
    ) -> Result<TransactionSummary, GatewayError> {
        self.record("channel_update");
        self.channel_writes
            .lock()
            .unwrap()
            .push((claim_id.to_string(), metadata, Some(clear)));
        Ok(self.summary.clone())
    }

    async fn stream_create(
        &self,
        _name: &str,
        _bid: f64,
        _file_path: &Path,
        _metadata: StreamMetadata,
    ) -> Result<TransactionSummary, GatewayError> {
        self.record("stream_create");
        Ok(self.summary.clone())
    }

    async fn stream_update(
        &self,
        claim_id: &str,
        update: StreamUpdate,
    ) -> Result<TransactionSummary, GatewayError> {
        self.record("stream_update");
        self.stream_updates
            .lock()
            .unwrap()
            .push((claim_id.to_string(), update));
        Ok(self.summary.clone())
    }

    async fn claim_search(&self, _claim_id: &str) -> Result<Vec<Claim>, GatewayError> {
        self.record("claim_search");
        Ok(self.search_results.clone())
    }

    async fn status(&self) -> Result<DaemonStatus, GatewayError> {
        self.record("status");
        let mut queue = self.statuses.lock().unwrap();
        let status = if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap_or(DaemonStatus {
                wallet_blocks: 100,
                blocks_behind: 0,
            })
        };
        Ok(status)
    }
}

/// Scripted funding source
#[derive(Default)]
pub struct MockFunding {
    pub sent: Mutex<Vec<(String, f64)>>,
    pub generated: Mutex<u32>,
    pub generator: bool,
}

#[async_trait]
impl FundingSource for MockFunding {
    async fn send(&self, address: &str, amount: f64) -> Result<String, GatewayError> {
        self.sent.lock().unwrap().push((address.to_string(), amount));
        Ok("txid".to_string())
    }

    async fn generate(&self, blocks: u32) -> Result<Vec<String>, GatewayError> {
        *self.generated.lock().unwrap() += blocks;
        Ok(vec!["blockhash".to_string(); blocks as usize])
    }

    fn can_generate(&self) -> bool {
        self.generator
    }
}

/// Scripted record store
#[derive(Default)]
pub struct MockRecords {
    pub channel: Mutex<ChannelRecord>,
    pub videos: Vec<SyncedVideoRecord>,
    pub saved_channel_claims: Mutex<Vec<(String, String)>>,
    pub saved_videos: Mutex<Vec<SyncedVideoRecord>>,
}

#[async_trait]
impl RecordStore for MockRecords {
    async fn synced_videos(
        &self,
        _channel_id: &str,
    ) -> Result<Vec<SyncedVideoRecord>, RecordError> {
        Ok(self.videos.clone())
    }

    async fn channel_record(&self, _channel_id: &str) -> Result<ChannelRecord, RecordError> {
        Ok(self.channel.lock().unwrap().clone())
    }

    async fn set_channel_claim_id(
        &self,
        channel_id: &str,
        claim_id: &str,
    ) -> Result<(), RecordError> {
        self.saved_channel_claims
            .lock()
            .unwrap()
            .push((channel_id.to_string(), claim_id.to_string()));
        self.channel.lock().unwrap().claim_id = Some(claim_id.to_string());
        Ok(())
    }

    async fn set_video_record(
        &self,
        _channel_id: &str,
        record: &SyncedVideoRecord,
    ) -> Result<(), RecordError> {
        self.saved_videos.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Scripted source platform (metadata only; downloads fail)
#[derive(Default)]
pub struct MockPlatform {
    pub count: u64,
    pub snippet: Option<ChannelSnippet>,
    pub videos: Vec<VideoItem>,
}

#[async_trait]
impl SourcePlatform for MockPlatform {
    async fn video_count(&self, _channel_id: &str) -> Result<u64, PlatformError> {
        Ok(self.count)
    }

    async fn list_videos(
        &self,
        _channel_id: &str,
        limit: u64,
    ) -> Result<Vec<VideoItem>, PlatformError> {
        Ok(self.videos.iter().take(limit as usize).cloned().collect())
    }

    async fn channel_snippet(
        &self,
        _channel_id: &str,
    ) -> Result<Option<ChannelSnippet>, PlatformError> {
        Ok(self.snippet.clone())
    }

    async fn media_info(&self, video_id: &str) -> Result<SourceMediaInfo, PlatformError> {
        Err(PlatformError::NotFound(video_id.to_string()))
    }

    async fn download_format(
        &self,
        video_id: &str,
        _format: &SourceFormat,
        _dest: &Path,
    ) -> Result<(), PlatformError> {
        Err(PlatformError::NotFound(video_id.to_string()))
    }
}

/// Mirror that records requests and returns deterministic mirrored URLs
#[derive(Default)]
pub struct MockMirror {
    pub mirrored: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ThumbnailMirror for MockMirror {
    async fn mirror(&self, source_url: &str, key: &str) -> Result<String, PlatformError> {
        self.mirrored
            .lock()
            .unwrap()
            .push((source_url.to_string(), key.to_string()));
        Ok(format!("https://mirror.example/{}", key))
    }
}

/// Namer that records submissions and reports success
#[derive(Default)]
pub struct MockNamer {
    pub submissions: Mutex<Vec<(String, f64, StreamMetadata)>>,
}

#[async_trait]
impl Namer for MockNamer {
    async fn publish_with_retry(
        &self,
        _gateway: &dyn DaemonGateway,
        name: &str,
        bid: f64,
        _file_path: &Path,
        metadata: StreamMetadata,
    ) -> Result<SyncSummary, GatewayError> {
        self.submissions
            .lock()
            .unwrap()
            .push((name.to_string(), bid, metadata));
        Ok(SyncSummary {
            claim_id: "new-claim".to_string(),
            claim_name: name.to_string(),
        })
    }
}
