//! Channel claim ownership
//!
//! Before any item is published, the wallet must control a channel claim
//! that matches what the record store remembers. Mismatches between the
//! wallet and the records are integrity faults: they are reported and the
//! run stops, they are never auto-repaired.

use crate::capacity::add_credits;
use crate::gateway::{
    ChannelMetadata, Claim, ClearFlags, DaemonGateway, FundingSource, GatewayError, Location,
};
use crate::platform::{SourcePlatform, TagPolicy, ThumbnailMirror};
use crate::records::{RecordError, RecordStore, TransferState};
use crate::video::normalize_language;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Extra credits added on top of the channel bid when topping up, covering
/// the claim transaction fee.
const CHANNEL_TOPUP_MARGIN: f64 = 0.3;

/// Error type for channel ownership operations
#[derive(Debug, Error)]
pub enum OwnershipError {
    /// The target channel name is not configured
    #[error("no channel name set")]
    NoChannelConfigured,

    /// The daemon replied without data where data was expected
    #[error("no daemon response for {0}")]
    NoDaemonResponse(&'static str),

    /// The wallet controls channels but no claim id is recorded; updating
    /// blind could clobber an unrelated channel.
    #[error(
        "this channel does not have a recorded claim id; \
         updates are not supported until one is recorded"
    )]
    MissingRecordedClaim,

    /// The wallet claim matching the recorded id carries a different name
    #[error("the channel in the wallet is different than the channel on record")]
    OwnershipMismatch,

    /// A claim id is recorded but the wallet does not control it
    #[error("a channel claim is recorded ({0}) but nothing was found in our control")]
    RecordedClaimMissing(String),

    /// Ownership was transferred away and the claim has since vanished
    #[error("the channel was transferred but appears to have been abandoned")]
    AbandonedAfterTransfer,

    /// The source platform no longer serves the channel
    #[error("source channel not found: {0}")]
    ChannelNotFound(String),

    /// Daemon failure
    #[error("daemon error: {0}")]
    Gateway(#[from] GatewayError),

    /// Record store failure
    #[error("record error: {0}")]
    Records(#[from] RecordError),

    /// Source platform failure
    #[error("platform error: {0}")]
    Platform(#[from] crate::platform::PlatformError),
}

/// Ensures the wallet controls a current-format channel claim
pub struct OwnershipManager {
    gateway: Arc<dyn DaemonGateway>,
    funding: Arc<dyn FundingSource>,
    records: Arc<dyn RecordStore>,
    platform: Arc<dyn SourcePlatform>,
    mirror: Arc<dyn ThumbnailMirror>,
    tags: Arc<dyn TagPolicy>,
    channel_name: String,
    source_channel_id: String,
    bid: f64,
    default_account: String,
    /// Wait after external funding for the wallet to see the transaction
    settle: Duration,
}

impl OwnershipManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn DaemonGateway>,
        funding: Arc<dyn FundingSource>,
        records: Arc<dyn RecordStore>,
        platform: Arc<dyn SourcePlatform>,
        mirror: Arc<dyn ThumbnailMirror>,
        tags: Arc<dyn TagPolicy>,
        channel_name: String,
        source_channel_id: String,
        bid: f64,
        default_account: String,
        settle: Duration,
    ) -> Self {
        Self {
            gateway,
            funding,
            records,
            platform,
            mirror,
            tags,
            channel_name,
            source_channel_id,
            bid,
            default_account,
            settle,
        }
    }

    /// Ensure the wallet controls the configured channel claim, creating or
    /// upgrading it when needed. Returns the channel claim id. Idempotent:
    /// when the matching claim already carries current-format metadata the
    /// call performs no daemon writes.
    pub async fn ensure_ownership(&self) -> Result<String, OwnershipError> {
        if self.channel_name.is_empty() {
            return Err(OwnershipError::NoChannelConfigured);
        }

        let channels = self
            .gateway
            .channel_list()
            .await?
            .ok_or(OwnershipError::NoDaemonResponse("channel_list"))?;
        let record = self.records.channel_record(&self.source_channel_id).await?;
        let recorded_claim_id = record.claim_id.clone().unwrap_or_default();

        let owned = if !channels.is_empty() {
            if recorded_claim_id.is_empty() {
                return Err(OwnershipError::MissingRecordedClaim);
            }
            let matching = channels.iter().find(|c| c.claim_id == recorded_claim_id);
            match matching {
                Some(claim) if claim.name != self.channel_name => {
                    return Err(OwnershipError::OwnershipMismatch)
                }
                Some(claim) => Some(claim.clone()),
                None => return Err(OwnershipError::RecordedClaimMissing(recorded_claim_id)),
            }
        } else if record.transfer_state == TransferState::Complete {
            return Err(OwnershipError::AbandonedAfterTransfer);
        } else if !recorded_claim_id.is_empty() {
            return Err(OwnershipError::RecordedClaimMissing(recorded_claim_id));
        } else {
            None
        };

        let legacy_metadata = match &owned {
            Some(claim) => {
                if claim.value.thumbnail_url.is_some() {
                    debug!(claim_id = %claim.claim_id, "channel claim already current");
                    return Ok(claim.claim_id.clone());
                }
                true
            }
            None => false,
        };

        let balance = self
            .gateway
            .account_balance(None)
            .await?
            .ok_or(OwnershipError::NoDaemonResponse("account_balance"))?;
        if balance < self.bid {
            add_credits(
                self.gateway.as_ref(),
                self.funding.as_ref(),
                &self.default_account,
                self.bid + CHANNEL_TOPUP_MARGIN,
                self.settle,
            )
            .await?;
        }

        let metadata = self.build_metadata().await?;
        let summary = match &owned {
            Some(claim) if legacy_metadata => {
                info!(claim_id = %claim.claim_id, "upgrading legacy channel metadata");
                self.gateway
                    .channel_update(&claim.claim_id, metadata, ClearFlags::all())
                    .await?
            }
            _ => {
                info!(name = %self.channel_name, bid = self.bid, "creating channel claim");
                self.gateway
                    .channel_create(&self.channel_name, self.bid, metadata)
                    .await?
            }
        };

        let claim_id = summary
            .outputs
            .first()
            .map(|o| o.claim_id.clone())
            .ok_or(OwnershipError::NoDaemonResponse("channel claim output"))?;
        self.records
            .set_channel_claim_id(&self.source_channel_id, &claim_id)
            .await?;
        Ok(claim_id)
    }

    /// Assemble channel metadata from the source platform's snippet and
    /// branding, with images re-hosted on our mirror.
    async fn build_metadata(&self) -> Result<ChannelMetadata, OwnershipError> {
        let snippet = self
            .platform
            .channel_snippet(&self.source_channel_id)
            .await?
            .ok_or_else(|| OwnershipError::ChannelNotFound(self.source_channel_id.clone()))?;

        let thumbnail_url = self
            .mirror
            .mirror(&snippet.thumbnail_url, &self.source_channel_id)
            .await?;
        let cover_url = match &snippet.banner_url {
            Some(banner) if !banner.is_empty() => Some(
                self.mirror
                    .mirror(banner, &format!("banner-{}", self.source_channel_id))
                    .await?,
            ),
            _ => None,
        };

        let languages = snippet
            .default_language
            .as_deref()
            .filter(|l| !l.is_empty())
            .map(|l| vec![normalize_language(l).to_string()])
            .unwrap_or_default();
        let locations = snippet
            .country
            .as_ref()
            .filter(|c| !c.is_empty())
            .map(|country| {
                vec![Location {
                    country: Some(country.clone()),
                    ..Default::default()
                }]
            })
            .unwrap_or_default();

        Ok(ChannelMetadata {
            title: Some(snippet.title),
            description: Some(snippet.description),
            tags: self.tags.channel_tags(&self.source_channel_id),
            languages,
            locations,
            thumbnail_url: Some(thumbnail_url),
            cover_url,
        })
    }
}

/// Whether a wallet claim carries current-format metadata
pub fn has_current_metadata(claim: &Claim) -> bool {
    claim.value.thumbnail_url.is_some()
}
