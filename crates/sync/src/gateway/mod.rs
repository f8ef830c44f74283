//! Wallet daemon command surface
//!
//! The sync never talks to the ledger directly; every balance read, funding
//! transaction, and claim operation goes through the [`DaemonGateway`] trait.
//! Calls are synchronous request/response with no push notification; state
//! is discovered by re-polling. A daemon reply that carries no payload where
//! one is expected surfaces as `Ok(None)` so callers can distinguish "empty
//! response" from a transport failure.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use http::{HttpFundingSource, HttpGateway};

/// Error type for gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure reaching the daemon
    #[error("daemon transport error: {0}")]
    Transport(String),

    /// The daemon returned an RPC-level error
    #[error("daemon rpc error: {0}")]
    Rpc(String),

    /// The daemon's reply could not be decoded
    #[error("malformed daemon response: {0}")]
    Malformed(String),
}

/// A wallet account as listed by the daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    /// Ledger tag, e.g. "mainnet" or "regtest"
    pub ledger: String,
    pub is_default: bool,
    /// Available balance in ledger-native credits
    pub available: f64,
}

/// A spendable fragment of ledger balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Utxo {
    pub amount: f64,
    pub confirmations: u64,
    pub is_mine: bool,
    /// Output type tag; only "payment" outputs are spendable for publishes
    #[serde(rename = "type")]
    pub kind: String,
}

/// Decoded claim value fields the sync cares about
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClaimValue {
    /// Present iff the claim carries current-format metadata
    pub thumbnail_url: Option<String>,
    /// Media size embedded in the claim's stream descriptor, when decodable
    pub stream_size: Option<u64>,
}

/// A claim under wallet control or found via search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claim {
    pub claim_id: String,
    pub name: String,
    #[serde(default)]
    pub value: ClaimValue,
}

/// One output of a claim-creating transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimOutput {
    pub claim_id: String,
    pub name: String,
}

/// Summary of a submitted claim transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSummary {
    pub outputs: Vec<ClaimOutput>,
}

/// Daemon wallet/blockchain status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonStatus {
    /// Wallet's current block height; zero while the wallet is starting up
    pub wallet_blocks: u64,
    /// How far the wallet lags the network tip
    pub blocks_behind: u64,
}

/// A geographic location attached to claim metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<String>,
}

/// Fee terms attached to a paid claim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fee {
    pub amount: f64,
    pub currency: String,
    pub address: String,
}

/// Metadata shared by channel create and update calls
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub languages: Vec<String>,
    pub locations: Vec<Location>,
    pub thumbnail_url: Option<String>,
    pub cover_url: Option<String>,
}

/// Metadata for a stream claim create
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub claim_address: Option<String>,
    pub tags: Vec<String>,
    pub languages: Vec<String>,
    pub locations: Vec<Location>,
    pub thumbnail_url: Option<String>,
    pub fee: Option<Fee>,
    pub license: Option<String>,
    /// Unix timestamp of the original publication
    pub release_time: Option<i64>,
    pub duration_secs: Option<u64>,
    pub channel_id: Option<String>,
}

/// Parameters for a metadata-only stream update
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamUpdate {
    pub metadata: StreamMetadata,
    /// Canonical media size to record on the claim
    pub file_size: Option<u64>,
    /// An update is never a partial merge: when set, prior tags, languages
    /// and locations are dropped before the new metadata is applied.
    pub clear_tags: bool,
    pub clear_languages: bool,
    pub clear_locations: bool,
}

/// Flags for clearing prior metadata on a channel update
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ClearFlags {
    pub tags: bool,
    pub languages: bool,
    pub locations: bool,
}

impl ClearFlags {
    /// Clear everything, used when replacing legacy metadata wholesale
    pub fn all() -> Self {
        Self {
            tags: true,
            languages: true,
            locations: true,
        }
    }
}

/// Synchronous command surface of the wallet/ledger daemon
#[async_trait]
pub trait DaemonGateway: Send + Sync {
    /// List wallet accounts with their ledger tags
    async fn account_list(&self) -> Result<Vec<Account>, GatewayError>;

    /// Available balance; `account_id` of None means the default account.
    /// `Ok(None)` means the daemon replied without data.
    async fn account_balance(&self, account_id: Option<&str>)
        -> Result<Option<f64>, GatewayError>;

    /// Redistribute `amount` from one account to another across
    /// `output_count` outputs. Self-to-self funding is how the sync
    /// resplits its UTXO pool.
    async fn account_fund(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        output_count: u64,
        broadcast: bool,
    ) -> Result<Option<TransactionSummary>, GatewayError>;

    /// List unspent outputs for an account
    async fn utxo_list(&self, account_id: &str) -> Result<Option<Vec<Utxo>>, GatewayError>;

    /// List receiving addresses for an account (or the default account)
    async fn address_list(&self, account_id: Option<&str>) -> Result<Vec<String>, GatewayError>;

    /// A fresh, never-used receiving address
    async fn address_unused(&self, account_id: &str) -> Result<Option<String>, GatewayError>;

    /// Channel claims under wallet control
    async fn channel_list(&self) -> Result<Option<Vec<Claim>>, GatewayError>;

    /// Create a channel claim under `name` with the given bid
    async fn channel_create(
        &self,
        name: &str,
        bid: f64,
        metadata: ChannelMetadata,
    ) -> Result<TransactionSummary, GatewayError>;

    /// Update an existing channel claim, optionally clearing prior metadata
    async fn channel_update(
        &self,
        claim_id: &str,
        metadata: ChannelMetadata,
        clear: ClearFlags,
    ) -> Result<TransactionSummary, GatewayError>;

    /// Publish a new stream claim from a local media file
    async fn stream_create(
        &self,
        name: &str,
        bid: f64,
        file_path: &Path,
        metadata: StreamMetadata,
    ) -> Result<TransactionSummary, GatewayError>;

    /// Metadata-only update of an existing stream claim
    async fn stream_update(
        &self,
        claim_id: &str,
        update: StreamUpdate,
    ) -> Result<TransactionSummary, GatewayError>;

    /// Search claims by claim id
    async fn claim_search(&self, claim_id: &str) -> Result<Vec<Claim>, GatewayError>;

    /// Wallet/blockchain status
    async fn status(&self) -> Result<DaemonStatus, GatewayError>;
}

/// External funding source: a ledger-native sender outside the wallet
/// daemon, plus an on-demand block generator on regtest.
#[async_trait]
pub trait FundingSource: Send + Sync {
    /// Send `amount` credits to `address`; returns the transaction id
    async fn send(&self, address: &str, amount: f64) -> Result<String, GatewayError>;

    /// Mine `blocks` new blocks (regtest only); returns the block hashes
    async fn generate(&self, blocks: u32) -> Result<Vec<String>, GatewayError>;

    /// Whether this source can generate blocks on demand
    fn can_generate(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_flags_all() {
        let flags = ClearFlags::all();
        assert!(flags.tags);
        assert!(flags.languages);
        assert!(flags.locations);
    }

    #[test]
    fn test_clear_flags_default_clears_nothing() {
        let flags = ClearFlags::default();
        assert!(!flags.tags);
        assert!(!flags.languages);
        assert!(!flags.locations);
    }

    #[test]
    fn test_utxo_type_tag_round_trip() {
        let utxo = Utxo {
            amount: 0.1,
            confirmations: 3,
            is_mine: true,
            kind: "payment".to_string(),
        };
        let json = serde_json::to_string(&utxo).unwrap();
        assert!(json.contains("\"type\":\"payment\""));
        let back: Utxo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, utxo);
    }

    #[test]
    fn test_claim_value_defaults_to_legacy_metadata() {
        let json = r#"{"claim_id":"abc","name":"@chan"}"#;
        let claim: Claim = serde_json::from_str(json).unwrap();
        assert!(claim.value.thumbnail_url.is_none());
        assert!(claim.value.stream_size.is_none());
    }
}
