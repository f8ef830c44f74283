//! Wallet capacity management
//!
//! Publishing consumes wallet outputs; before a run touches any item the
//! wallet must hold enough credits, in enough spendable fragments, with
//! enough of them confirmed. All of that is established here, inside the
//! account's exclusive wallet section, so no publish races a refill or a
//! resplit.

use crate::channel::OwnershipManager;
use crate::gateway::{DaemonGateway, FundingSource, GatewayError, Utxo};
use crate::platform::{PlatformError, SourcePlatform};
use crate::records::{AllocationCounts, RecordError, RecordStore, TransferState};
use claimsync_config::{LedgerConfig, Network};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Desired number of spendable outputs in the wallet
pub const UTXO_TARGET: u64 = 40;
/// Resplitting starts only below `UTXO_TARGET - UTXO_SLACK`
pub const UTXO_SLACK: u64 = UTXO_TARGET / 10;
/// Minimum confirmed outputs before publishing proceeds without waiting
pub const CONFIRMED_THRESHOLD: u64 = 16;
/// Outputs at or below this amount are ignored as dust
pub const DUST_THRESHOLD: f64 = 0.001;
/// Hard cap on outputs produced by one resplit
pub const MAX_SPLIT_OUTPUTS: u64 = 500;
/// Credits per desired output when sizing a resplit
pub const PER_OUTPUT_AMOUNT: f64 = 0.1;
/// Fee reserved out of the balance when broadcasting a resplit
pub const BROADCAST_FEE: f64 = 0.1;

/// Error type for capacity operations
#[derive(Debug, Error)]
pub enum CapacityError {
    /// The daemon replied without data where data was expected
    #[error("no daemon response for {0}")]
    NoDaemonResponse(&'static str),

    /// No default account matches the configured ledger
    #[error("no default account found for ledger {0}")]
    NoDefaultAccount(String),

    /// The resolved claim address is blank
    #[error("found blank claim address")]
    BlankClaimAddress,

    /// Cancellation was signalled while waiting for confirmations
    #[error("cancelled while waiting for a new block")]
    Cancelled,

    /// The confirmation wait outlived its deadline
    #[error("deadline exceeded while waiting for a new block")]
    DeadlineExceeded,

    /// Channel ownership could not be established
    #[error(transparent)]
    Ownership(#[from] crate::channel::OwnershipError),

    /// Daemon failure
    #[error("daemon error: {0}")]
    Gateway(#[from] GatewayError),

    /// Record store failure
    #[error("record error: {0}")]
    Records(#[from] RecordError),

    /// Source platform failure
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Poll and settle intervals, injectable so tests run instantly
#[derive(Debug, Clone, Copy)]
pub struct WaitIntervals {
    /// Poll interval while the wallet catches up to the chain tip
    pub catch_up: Duration,
    /// Poll interval while awaiting the next block
    pub block_poll: Duration,
    /// Wait after external funding for the wallet to see the transaction
    pub settle: Duration,
}

impl Default for WaitIntervals {
    fn default() -> Self {
        Self {
            catch_up: Duration::from_secs(5),
            block_poll: Duration::from_secs(10),
            settle: Duration::from_secs(15),
        }
    }
}

/// Outcome of a block wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockWait {
    NewBlock,
    Cancelled,
    DeadlineExceeded,
}

/// What `ensure_capacity` established for the rest of the run
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityReport {
    pub channel_claim_id: String,
    /// Address publishes must target; `None` when the channel has no items
    pub claim_address: Option<String>,
    /// Item count on the source, capped at the configured limit
    pub videos_on_source: u64,
}

/// Credits required to sync the remaining unallocated items
pub fn required_balance(
    unallocated: u64,
    not_upgraded: u64,
    channel_claimed: bool,
    ledger: &LedgerConfig,
) -> f64 {
    let channel_fee = if channel_claimed {
        0.0
    } else {
        ledger.channel_claim_amount
    };
    let mut required =
        unallocated as f64 * (ledger.publish_amount + ledger.estimated_max_tx_fee) + channel_fee;
    if ledger.upgrade_metadata {
        required += not_upgraded as f64 * ledger.metadata_upgrade_fee;
    }
    required
}

/// Credits to request from the funding source; zero when the balance
/// already covers both the required amount and the configured floor.
pub fn refill_amount(balance: f64, required: f64, ledger: &LedgerConfig) -> f64 {
    if balance < required || balance < ledger.minimum_account_balance {
        (required - balance)
            .max(ledger.minimum_account_balance - balance)
            .max(ledger.minimum_refill_amount)
    } else {
        0.0
    }
}

/// UTXO maintenance decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtxoPlan {
    /// Resplit the balance into this many outputs, when below the band
    pub split_outputs: Option<u64>,
    /// Wait for a new block before publishing
    pub wait: bool,
}

/// Decide whether the UTXO pool needs a resplit and/or a confirmation wait
pub fn plan_utxo_action(count: u64, confirmed: u64, balance: f64) -> UtxoPlan {
    let split_outputs = (count < UTXO_TARGET - UTXO_SLACK)
        .then(|| ((balance / PER_OUTPUT_AMOUNT).floor() as u64).min(MAX_SPLIT_OUTPUTS));
    UtxoPlan {
        split_outputs,
        wait: confirmed < CONFIRMED_THRESHOLD,
    }
}

/// Count eligible outputs: ours, payment-typed, above dust. Returns
/// `(total, confirmed)`.
pub fn count_eligible(utxos: &[Utxo]) -> (u64, u64) {
    let mut count = 0;
    let mut confirmed = 0;
    for utxo in utxos {
        if utxo.is_mine && utxo.kind == "payment" && utxo.amount > DUST_THRESHOLD {
            count += 1;
            if utxo.confirmations > 0 {
                confirmed += 1;
            }
        }
    }
    (count, confirmed)
}

/// Resolve the default account for the configured ledger
pub async fn resolve_default_account(
    gateway: &dyn DaemonGateway,
    network: Network,
) -> Result<String, CapacityError> {
    let tag = network.ledger_tag();
    let accounts = gateway.account_list().await?;
    accounts
        .iter()
        .find(|account| account.ledger == tag && account.is_default)
        .map(|account| account.id.clone())
        .ok_or_else(|| CapacityError::NoDefaultAccount(tag.to_string()))
}

/// Send credits from the external funding source to a fresh wallet
/// address, then wait a fixed interval for the wallet to notice. The
/// settle wait is best-effort; confirmation is handled separately.
pub async fn add_credits(
    gateway: &dyn DaemonGateway,
    funding: &dyn FundingSource,
    account: &str,
    amount: f64,
    settle: Duration,
) -> Result<(), GatewayError> {
    info!(amount, "adding credits");
    let address = gateway
        .address_unused(account)
        .await?
        .ok_or_else(|| GatewayError::Malformed("daemon returned no unused address".to_string()))?;
    funding.send(&address, amount).await?;
    tokio::time::sleep(settle).await;
    Ok(())
}

/// Establishes wallet capacity for a channel's run
pub struct CapacityManager {
    gateway: Arc<dyn DaemonGateway>,
    funding: Arc<dyn FundingSource>,
    records: Arc<dyn RecordStore>,
    platform: Arc<dyn SourcePlatform>,
    ownership: Arc<OwnershipManager>,
    ledger: LedgerConfig,
    network: Network,
    videos_limit: u64,
    /// Operator-requested extra refill, added on top of the computed amount
    refill_top_up: f64,
    source_channel_id: String,
    default_account: String,
    intervals: WaitIntervals,
}

impl CapacityManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn DaemonGateway>,
        funding: Arc<dyn FundingSource>,
        records: Arc<dyn RecordStore>,
        platform: Arc<dyn SourcePlatform>,
        ownership: Arc<OwnershipManager>,
        ledger: LedgerConfig,
        network: Network,
        videos_limit: u64,
        refill_top_up: f64,
        source_channel_id: String,
        default_account: String,
        intervals: WaitIntervals,
    ) -> Self {
        Self {
            gateway,
            funding,
            records,
            platform,
            ownership,
            ledger,
            network,
            videos_limit,
            refill_top_up,
            source_channel_id,
            default_account,
            intervals,
        }
    }

    /// Establish full publishing capacity: channel ownership, account
    /// balance, UTXO pool. Must be called under the account's exclusive
    /// wallet section. A channel with no items returns after the ownership
    /// check without touching the wallet.
    pub async fn ensure_capacity(
        &self,
        cancel: &watch::Receiver<bool>,
    ) -> Result<CapacityReport, CapacityError> {
        let channel_claim_id = self.ownership.ensure_ownership().await?;

        let balance = self
            .gateway
            .account_balance(None)
            .await?
            .ok_or(CapacityError::NoDaemonResponse("account_balance"))?;
        debug!("starting balance is {:.4}", balance);

        let on_source = self.platform.video_count(&self.source_channel_id).await?;
        debug!(on_source, "source channel item count");
        if on_source == 0 {
            return Ok(CapacityReport {
                channel_claim_id,
                claim_address: None,
                videos_on_source: 0,
            });
        }
        let capped = on_source.min(self.videos_limit);

        let records = self.records.synced_videos(&self.source_channel_id).await?;
        let counts = AllocationCounts::tally(&records);
        debug!(
            published = counts.published,
            failed = counts.failed,
            "credits already allocated"
        );
        let unallocated = capped.saturating_sub(counts.allocated());

        let required = required_balance(
            unallocated,
            counts.not_upgraded,
            !channel_claim_id.is_empty(),
            &self.ledger,
        );
        let mut refill = refill_amount(balance, required, &self.ledger);
        if self.refill_top_up > 0.0 {
            refill += self.refill_top_up;
        }
        if refill > 0.0 {
            add_credits(
                self.gateway.as_ref(),
                self.funding.as_ref(),
                &self.default_account,
                refill,
                self.intervals.settle,
            )
            .await?;
        }

        let claim_address = self.resolve_claim_address().await?;
        self.ensure_utxos(cancel).await?;

        Ok(CapacityReport {
            channel_claim_id,
            claim_address: Some(claim_address),
            videos_on_source: capped,
        })
    }

    /// The address publishes target: the account's first receiving
    /// address, or the recorded external one once a transfer is pending.
    async fn resolve_claim_address(&self) -> Result<String, CapacityError> {
        let channel_record = self.records.channel_record(&self.source_channel_id).await?;
        if channel_record.transfer_state == TransferState::Pending {
            return channel_record
                .publish_address
                .filter(|address| !address.is_empty())
                .ok_or(CapacityError::BlankClaimAddress);
        }
        let addresses = self.gateway.address_list(None).await?;
        let address = addresses
            .into_iter()
            .next()
            .ok_or(CapacityError::NoDaemonResponse("address_list"))?;
        if address.is_empty() {
            return Err(CapacityError::BlankClaimAddress);
        }
        Ok(address)
    }

    /// Resplit the UTXO pool when it is below the band and wait for a
    /// confirmation block when too few outputs are confirmed.
    pub async fn ensure_utxos(&self, cancel: &watch::Receiver<bool>) -> Result<(), CapacityError> {
        let utxos = self
            .gateway
            .utxo_list(&self.default_account)
            .await?
            .ok_or(CapacityError::NoDaemonResponse("utxo_list"))?;
        let (count, confirmed) = count_eligible(&utxos);
        info!(count, confirmed, "utxo count");

        let balance = self
            .gateway
            .account_balance(Some(&self.default_account))
            .await?
            .ok_or(CapacityError::NoDaemonResponse("account_balance"))?;

        let plan = plan_utxo_action(count, confirmed, balance);
        if let Some(outputs) = plan.split_outputs {
            info!(balance, outputs, "splitting balance into outputs");
            self.gateway
                .account_fund(
                    &self.default_account,
                    &self.default_account,
                    balance - BROADCAST_FEE,
                    outputs,
                    false,
                )
                .await?
                .ok_or(CapacityError::NoDaemonResponse("account_fund"))?;
        }
        if plan.wait {
            info!("waiting for outputs to confirm");
            match self.wait_for_new_block(cancel.clone(), None).await? {
                BlockWait::NewBlock => {}
                BlockWait::Cancelled => return Err(CapacityError::Cancelled),
                BlockWait::DeadlineExceeded => return Err(CapacityError::DeadlineExceeded),
            }
        }
        Ok(())
    }

    /// Wait until the wallet reports a block height above the current one.
    ///
    /// Two phases: *catch-up* while the wallet is starting or behind the
    /// chain tip, then *await-block* until the height increases. On regtest
    /// with a block generator available, a block is mined each iteration
    /// instead of waiting for one to arrive.
    pub async fn wait_for_new_block(
        &self,
        mut cancel: watch::Receiver<bool>,
        deadline: Option<Duration>,
    ) -> Result<BlockWait, CapacityError> {
        let started = Instant::now();

        let mut status = self.gateway.status().await?;
        while status.wallet_blocks == 0 || status.blocks_behind != 0 {
            debug!(
                blocks = status.wallet_blocks,
                behind = status.blocks_behind,
                "wallet catching up"
            );
            if let Some(outcome) = self
                .pause(&mut cancel, self.intervals.catch_up, started, deadline)
                .await
            {
                return Ok(outcome);
            }
            status = self.gateway.status().await?;
        }

        let current = status.wallet_blocks;
        let mut iteration = 0u32;
        while status.wallet_blocks <= current {
            if iteration % 3 == 0 {
                info!(height = current + 1, "waiting for new block");
            }
            if self.network == Network::Regtest && self.funding.can_generate() {
                self.funding.generate(1).await?;
            }
            if let Some(outcome) = self
                .pause(&mut cancel, self.intervals.block_poll, started, deadline)
                .await
            {
                return Ok(outcome);
            }
            status = self.gateway.status().await?;
            iteration += 1;
        }
        Ok(BlockWait::NewBlock)
    }

    /// Sleep one poll interval unless cancellation or the deadline cuts
    /// the wait short.
    async fn pause(
        &self,
        cancel: &mut watch::Receiver<bool>,
        interval: Duration,
        started: Instant,
        deadline: Option<Duration>,
    ) -> Option<BlockWait> {
        if *cancel.borrow() {
            return Some(BlockWait::Cancelled);
        }
        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                return Some(BlockWait::DeadlineExceeded);
            }
        }
        tokio::select! {
            changed = cancel.changed() => match changed {
                Ok(()) if *cancel.borrow() => Some(BlockWait::Cancelled),
                Ok(()) => None,
                // Sender dropped; no cancellation will ever arrive
                Err(_) => {
                    tokio::time::sleep(interval).await;
                    None
                }
            },
            _ = tokio::time::sleep(interval) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Claim, ClaimValue, DaemonStatus};
    use crate::platform::KeepAllTags;
    use crate::records::{ChannelRecord, SyncedVideoRecord};
    use crate::test_util::{MockFunding, MockGateway, MockMirror, MockPlatform, MockRecords};
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn ledger() -> LedgerConfig {
        LedgerConfig::default()
    }

    fn instant_intervals() -> WaitIntervals {
        WaitIntervals {
            catch_up: Duration::ZERO,
            block_poll: Duration::ZERO,
            settle: Duration::ZERO,
        }
    }

    fn payment_utxo(amount: f64, confirmations: u64) -> Utxo {
        Utxo {
            amount,
            confirmations,
            is_mine: true,
            kind: "payment".to_string(),
        }
    }

    /// A wallet+record state where ownership is already established
    fn owned_claim() -> Claim {
        Claim {
            claim_id: "chan-claim".to_string(),
            name: "@chan".to_string(),
            value: ClaimValue {
                thumbnail_url: Some("https://thumbs.example/UC1".to_string()),
                stream_size: None,
            },
        }
    }

    fn owned_records() -> MockRecords {
        MockRecords {
            channel: Mutex::new(ChannelRecord {
                claim_id: Some("chan-claim".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    struct Fixture {
        gateway: Arc<MockGateway>,
        funding: Arc<MockFunding>,
        manager: CapacityManager,
    }

    fn fixture(
        gateway: MockGateway,
        funding: MockFunding,
        records: MockRecords,
        count: u64,
    ) -> Fixture {
        let gateway = Arc::new(gateway);
        let funding = Arc::new(funding);
        let records = Arc::new(records);
        let platform = Arc::new(MockPlatform {
            count,
            ..Default::default()
        });
        let ownership = Arc::new(OwnershipManager::new(
            gateway.clone(),
            funding.clone(),
            records.clone(),
            platform.clone(),
            Arc::new(MockMirror::default()),
            Arc::new(KeepAllTags),
            "@chan".to_string(),
            "UC1".to_string(),
            0.01,
            "acct1".to_string(),
            Duration::ZERO,
        ));
        let manager = CapacityManager::new(
            gateway.clone(),
            funding.clone(),
            records.clone(),
            platform,
            ownership,
            ledger(),
            Network::Regtest,
            1000,
            0.0,
            "UC1".to_string(),
            "acct1".to_string(),
            instant_intervals(),
        );
        Fixture {
            gateway,
            funding,
            manager,
        }
    }

    fn no_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the duration of the test
        std::mem::forget(tx);
        rx
    }

    fn healthy_gateway(balance: f64, utxos: Vec<Utxo>) -> MockGateway {
        MockGateway {
            balance: Some(balance),
            utxos: Some(utxos),
            channels: Some(vec![owned_claim()]),
            ..Default::default()
        }
    }

    #[test]
    fn test_refill_zero_at_exact_required_balance() {
        let cfg = ledger();
        // required above the minimum floor so only the required bound binds
        let required = 5.0;
        assert_eq!(refill_amount(5.0, required, &cfg), 0.0);
        assert!(refill_amount(4.999, required, &cfg) > 0.0);
    }

    #[test]
    fn test_refill_zero_at_exact_minimum_balance() {
        let cfg = ledger();
        // nothing required, balance exactly at the floor
        assert_eq!(refill_amount(cfg.minimum_account_balance, 0.0, &cfg), 0.0);
        assert!(refill_amount(cfg.minimum_account_balance - 0.001, 0.0, &cfg) > 0.0);
    }

    #[test]
    fn test_refill_respects_minimum_refill_amount() {
        let cfg = ledger();
        // balance barely short of required; the minimum refill still applies
        let refill = refill_amount(4.999, 5.0, &cfg);
        assert_eq!(refill, cfg.minimum_refill_amount);
    }

    #[test]
    fn test_required_balance_includes_channel_fee_only_when_unclaimed() {
        let cfg = ledger();
        let with_fee = required_balance(10, 0, false, &cfg);
        let without_fee = required_balance(10, 0, true, &cfg);
        assert!((with_fee - without_fee - cfg.channel_claim_amount).abs() < 1e-9);
    }

    #[test]
    fn test_required_balance_upgrade_fee() {
        let mut cfg = ledger();
        cfg.upgrade_metadata = true;
        let base = required_balance(0, 0, true, &cfg);
        let with_upgrades = required_balance(0, 7, true, &cfg);
        assert!((with_upgrades - base - 7.0 * cfg.metadata_upgrade_fee).abs() < 1e-9);
    }

    #[test]
    fn test_utxo_plan_no_resplit_inside_band() {
        // 36 is the band edge: target 40 minus slack 4
        assert_eq!(plan_utxo_action(36, 20, 10.0).split_outputs, None);
        assert_eq!(plan_utxo_action(35, 20, 10.0).split_outputs, Some(100));
    }

    #[test]
    fn test_utxo_plan_wait_threshold() {
        assert!(plan_utxo_action(40, 15, 10.0).wait);
        assert!(!plan_utxo_action(40, 16, 10.0).wait);
    }

    #[test]
    fn test_utxo_plan_split_cap() {
        let plan = plan_utxo_action(0, 0, 1000.0);
        assert_eq!(plan.split_outputs, Some(MAX_SPLIT_OUTPUTS));
    }

    #[test]
    fn test_count_eligible_filters_dust_and_foreign() {
        let utxos = vec![
            payment_utxo(0.1, 1),
            payment_utxo(0.1, 0),
            payment_utxo(0.001, 5), // dust, not strictly above threshold
            Utxo {
                amount: 0.5,
                confirmations: 3,
                is_mine: false,
                kind: "payment".to_string(),
            },
            Utxo {
                amount: 0.5,
                confirmations: 3,
                is_mine: true,
                kind: "other".to_string(),
            },
        ];
        assert_eq!(count_eligible(&utxos), (2, 1));
    }

    #[tokio::test]
    async fn test_resolve_default_account_matches_ledger() {
        let gateway = MockGateway::default();
        let account = resolve_default_account(&gateway, Network::Regtest)
            .await
            .unwrap();
        assert_eq!(account, "acct1");

        let err = resolve_default_account(&gateway, Network::Mainnet)
            .await
            .unwrap_err();
        assert!(matches!(err, CapacityError::NoDefaultAccount(_)));
    }

    #[tokio::test]
    async fn test_zero_item_channel_does_no_wallet_work() {
        let fx = fixture(
            healthy_gateway(10.0, Vec::new()),
            MockFunding::default(),
            owned_records(),
            0,
        );
        let report = fx.manager.ensure_capacity(&no_cancel()).await.unwrap();
        assert_eq!(report.videos_on_source, 0);
        assert!(report.claim_address.is_none());
        assert_eq!(report.channel_claim_id, "chan-claim");
        assert_eq!(fx.gateway.write_count(), 0);
        assert!(fx.funding.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_low_balance_triggers_minimum_refill() {
        let gateway = MockGateway {
            statuses: Mutex::new(VecDeque::from([
                DaemonStatus {
                    wallet_blocks: 100,
                    blocks_behind: 0,
                },
                DaemonStatus {
                    wallet_blocks: 101,
                    blocks_behind: 0,
                },
            ])),
            ..healthy_gateway(0.5, Vec::new())
        };
        let fx = fixture(gateway, MockFunding::default(), owned_records(), 5);

        fx.manager.ensure_capacity(&no_cancel()).await.unwrap();

        let sent = fx.funding.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // balance 0.5 is under the 1.0 floor; the 1.0 minimum refill wins
        assert!((sent[0].1 - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_healthy_wallet_makes_no_writes() {
        let utxos: Vec<Utxo> = (0..40).map(|_| payment_utxo(0.2, 5)).collect();
        let fx = fixture(
            healthy_gateway(10.0, utxos),
            MockFunding::default(),
            owned_records(),
            5,
        );

        let report = fx.manager.ensure_capacity(&no_cancel()).await.unwrap();
        assert_eq!(report.claim_address.as_deref(), Some("bAddr1"));
        assert_eq!(report.videos_on_source, 5);
        assert_eq!(fx.gateway.write_count(), 0);
    }

    #[tokio::test]
    async fn test_depleted_pool_is_resplit() {
        let gateway = MockGateway {
            statuses: Mutex::new(VecDeque::from([
                DaemonStatus {
                    wallet_blocks: 100,
                    blocks_behind: 0,
                },
                DaemonStatus {
                    wallet_blocks: 101,
                    blocks_behind: 0,
                },
            ])),
            ..healthy_gateway(10.0, vec![payment_utxo(9.9, 2)])
        };
        let fx = fixture(gateway, MockFunding::default(), owned_records(), 5);

        fx.manager.ensure_capacity(&no_cancel()).await.unwrap();

        let funds = fx.gateway.funds.lock().unwrap();
        assert_eq!(funds.len(), 1);
        let (amount, outputs) = funds[0];
        assert!((amount - 9.9).abs() < 1e-9); // balance minus broadcast fee
        assert_eq!(outputs, 100); // floor(10.0 / 0.1)
    }

    #[tokio::test]
    async fn test_pending_transfer_uses_recorded_publish_address() {
        let utxos: Vec<Utxo> = (0..40).map(|_| payment_utxo(0.2, 5)).collect();
        let records = MockRecords {
            channel: Mutex::new(ChannelRecord {
                claim_id: Some("chan-claim".to_string()),
                transfer_state: TransferState::Pending,
                publish_address: Some("bExternal".to_string()),
            }),
            ..Default::default()
        };
        let fx = fixture(
            healthy_gateway(10.0, utxos),
            MockFunding::default(),
            records,
            5,
        );

        let report = fx.manager.ensure_capacity(&no_cancel()).await.unwrap();
        assert_eq!(report.claim_address.as_deref(), Some("bExternal"));
    }

    #[tokio::test]
    async fn test_pending_transfer_with_blank_address_fails() {
        let utxos: Vec<Utxo> = (0..40).map(|_| payment_utxo(0.2, 5)).collect();
        let records = MockRecords {
            channel: Mutex::new(ChannelRecord {
                claim_id: Some("chan-claim".to_string()),
                transfer_state: TransferState::Pending,
                publish_address: None,
            }),
            ..Default::default()
        };
        let fx = fixture(
            healthy_gateway(10.0, utxos),
            MockFunding::default(),
            records,
            5,
        );

        let err = fx.manager.ensure_capacity(&no_cancel()).await.unwrap_err();
        assert!(matches!(err, CapacityError::BlankClaimAddress));
    }

    #[tokio::test]
    async fn test_allocated_records_reduce_required_balance() {
        let records = MockRecords {
            videos: vec![
                SyncedVideoRecord {
                    video_id: "v1".to_string(),
                    published: true,
                    claim_id: "c1".to_string(),
                    size: None,
                    metadata_version: 2,
                },
                SyncedVideoRecord {
                    video_id: "v2".to_string(),
                    published: false,
                    claim_id: String::new(),
                    size: None,
                    metadata_version: 0,
                },
            ],
            ..owned_records()
        };
        let utxos: Vec<Utxo> = (0..40).map(|_| payment_utxo(0.2, 5)).collect();
        // 2 items, both allocated, balance above the floor: no refill
        let fx = fixture(
            healthy_gateway(1.5, utxos),
            MockFunding::default(),
            records,
            2,
        );

        fx.manager.ensure_capacity(&no_cancel()).await.unwrap();
        assert!(fx.funding.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_new_block_generates_on_regtest() {
        let gateway = MockGateway {
            statuses: Mutex::new(VecDeque::from([
                DaemonStatus {
                    wallet_blocks: 100,
                    blocks_behind: 0,
                },
                DaemonStatus {
                    wallet_blocks: 101,
                    blocks_behind: 0,
                },
            ])),
            ..healthy_gateway(10.0, Vec::new())
        };
        let funding = MockFunding {
            generator: true,
            ..Default::default()
        };
        let fx = fixture(gateway, funding, owned_records(), 5);

        let outcome = fx
            .manager
            .wait_for_new_block(no_cancel(), None)
            .await
            .unwrap();
        assert_eq!(outcome, BlockWait::NewBlock);
        assert_eq!(*fx.funding.generated.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_wait_for_new_block_catch_up_phase() {
        let gateway = MockGateway {
            statuses: Mutex::new(VecDeque::from([
                DaemonStatus {
                    wallet_blocks: 0,
                    blocks_behind: 0,
                },
                DaemonStatus {
                    wallet_blocks: 90,
                    blocks_behind: 10,
                },
                DaemonStatus {
                    wallet_blocks: 100,
                    blocks_behind: 0,
                },
                DaemonStatus {
                    wallet_blocks: 101,
                    blocks_behind: 0,
                },
            ])),
            ..healthy_gateway(10.0, Vec::new())
        };
        let fx = fixture(gateway, MockFunding::default(), owned_records(), 5);

        let outcome = fx
            .manager
            .wait_for_new_block(no_cancel(), None)
            .await
            .unwrap();
        assert_eq!(outcome, BlockWait::NewBlock);
    }

    #[tokio::test]
    async fn test_wait_for_new_block_cancellation() {
        let fx = fixture(
            healthy_gateway(10.0, Vec::new()),
            MockFunding::default(),
            owned_records(),
            5,
        );
        let (tx, rx) = watch::channel(true);
        let outcome = fx.manager.wait_for_new_block(rx, None).await.unwrap();
        assert_eq!(outcome, BlockWait::Cancelled);
        drop(tx);
    }

    #[tokio::test]
    async fn test_wait_for_new_block_deadline() {
        let fx = fixture(
            healthy_gateway(10.0, Vec::new()),
            MockFunding::default(),
            owned_records(),
            5,
        );
        let outcome = fx
            .manager
            .wait_for_new_block(no_cancel(), Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(outcome, BlockWait::DeadlineExceeded);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_refill_covers_required_and_floor(
            balance in 0.0f64..100.0,
            required in 0.0f64..100.0,
        ) {
            let cfg = ledger();
            let refill = refill_amount(balance, required, &cfg);
            prop_assert!(refill >= 0.0);
            if refill > 0.0 {
                prop_assert!(refill >= cfg.minimum_refill_amount);
                prop_assert!(balance + refill >= required - 1e-9);
                prop_assert!(balance + refill >= cfg.minimum_account_balance - 1e-9);
            } else {
                prop_assert!(balance >= required);
                prop_assert!(balance >= cfg.minimum_account_balance);
            }
        }

        #[test]
        fn prop_utxo_plan_band(
            count in 0u64..200,
            confirmed in 0u64..200,
            balance in 0.0f64..10_000.0,
        ) {
            let plan = plan_utxo_action(count, confirmed, balance);
            prop_assert_eq!(plan.split_outputs.is_some(), count < UTXO_TARGET - UTXO_SLACK);
            if let Some(outputs) = plan.split_outputs {
                prop_assert!(outputs <= MAX_SPLIT_OUTPUTS);
            }
            prop_assert_eq!(plan.wait, confirmed < CONFIRMED_THRESHOLD);
        }
    }
}
