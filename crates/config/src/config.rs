//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Which ledger network the wallet daemon is attached to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Production ledger
    #[default]
    Mainnet,
    /// Local regression-test ledger with an on-demand block generator
    Regtest,
}

impl Network {
    /// Ledger tag as reported by the wallet daemon's account list
    pub fn ledger_tag(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Regtest => "regtest",
        }
    }
}

/// Publishing channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ChannelConfig {
    /// Claim name of the publishing channel (required at runtime)
    #[serde(default)]
    pub name: String,
    /// Channel identifier on the source platform
    #[serde(default)]
    pub source_channel_id: String,
    /// Directory where downloaded media is staged
    #[serde(default = "default_videos_dir")]
    pub videos_dir: String,
}

fn default_videos_dir() -> String {
    "/tmp/claimsync-videos".to_string()
}

/// Ledger amounts and refill thresholds, in ledger-native credits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerConfig {
    /// Network the wallet daemon is attached to
    #[serde(default)]
    pub network: Network,
    /// Bid amount for each published stream claim
    #[serde(default = "default_publish_amount")]
    pub publish_amount: f64,
    /// Bid amount for the channel claim
    #[serde(default = "default_channel_claim_amount")]
    pub channel_claim_amount: f64,
    /// Estimated worst-case transaction fee per publish
    #[serde(default = "default_estimated_max_tx_fee")]
    pub estimated_max_tx_fee: f64,
    /// Balance floor below which a refill is always requested
    #[serde(default = "default_minimum_account_balance")]
    pub minimum_account_balance: f64,
    /// Smallest refill the funding source will be asked for
    #[serde(default = "default_minimum_refill_amount")]
    pub minimum_refill_amount: f64,
    /// Extra credits budgeted per already-published item on legacy metadata
    #[serde(default = "default_metadata_upgrade_fee")]
    pub metadata_upgrade_fee: f64,
    /// Whether legacy-metadata items are budgeted for an upgrade pass
    #[serde(default)]
    pub upgrade_metadata: bool,
}

fn default_publish_amount() -> f64 {
    0.01
}

fn default_channel_claim_amount() -> f64 {
    0.01
}

fn default_estimated_max_tx_fee() -> f64 {
    0.1
}

fn default_minimum_account_balance() -> f64 {
    1.0
}

fn default_minimum_refill_amount() -> f64 {
    1.0
}

fn default_metadata_upgrade_fee() -> f64 {
    0.001
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            publish_amount: default_publish_amount(),
            channel_claim_amount: default_channel_claim_amount(),
            estimated_max_tx_fee: default_estimated_max_tx_fee(),
            minimum_account_balance: default_minimum_account_balance(),
            minimum_refill_amount: default_minimum_refill_amount(),
            metadata_upgrade_fee: default_metadata_upgrade_fee(),
            upgrade_metadata: false,
        }
    }
}

/// Workload and media limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    /// Maximum number of items budgeted per sync run
    #[serde(default = "default_videos_limit")]
    pub videos_limit: u64,
    /// Maximum media size in MB (0 = unlimited)
    #[serde(default = "default_max_video_size_mb")]
    pub max_video_size_mb: u64,
    /// Maximum media duration in hours (0.0 = unlimited)
    #[serde(default = "default_max_video_length_hours")]
    pub max_video_length_hours: f64,
    /// Concurrent per-item pipelines (0 = auto-derive from cores)
    #[serde(default)]
    pub concurrent_videos: u32,
}

fn default_videos_limit() -> u64 {
    1000
}

fn default_max_video_size_mb() -> u64 {
    2048
}

fn default_max_video_length_hours() -> f64 {
    2.0
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            videos_limit: default_videos_limit(),
            max_video_size_mb: default_max_video_size_mb(),
            max_video_length_hours: default_max_video_length_hours(),
            concurrent_videos: 0,
        }
    }
}

/// Optional paid-fee policy attached to published claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeeConfig {
    pub amount: f64,
    pub currency: String,
    pub address: String,
}

/// Publish-time options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PublishConfig {
    /// Fee terms to attach to each published claim, if any
    #[serde(default)]
    pub fee: Option<FeeConfig>,
}

/// Thumbnail mirror endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MirrorConfig {
    /// Base URL under which mirrored thumbnails are served, keyed by item id
    #[serde(default = "default_thumbnail_endpoint")]
    pub thumbnail_endpoint: String,
}

fn default_thumbnail_endpoint() -> String {
    "https://thumbnails.claimsync.net/".to_string()
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            thumbnail_endpoint: default_thumbnail_endpoint(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - CLAIMSYNC_CHANNEL_NAME -> channel.name
    /// - CLAIMSYNC_NETWORK -> ledger.network
    /// - CLAIMSYNC_VIDEOS_LIMIT -> limits.videos_limit
    /// - CLAIMSYNC_MAX_VIDEO_SIZE_MB -> limits.max_video_size_mb
    /// - CLAIMSYNC_MAX_VIDEO_LENGTH_HOURS -> limits.max_video_length_hours
    /// - CLAIMSYNC_CONCURRENT_VIDEOS -> limits.concurrent_videos
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CLAIMSYNC_CHANNEL_NAME") {
            if !val.is_empty() {
                self.channel.name = val;
            }
        }

        if let Ok(val) = env::var("CLAIMSYNC_NETWORK") {
            match val.to_lowercase().as_str() {
                "mainnet" => self.ledger.network = Network::Mainnet,
                "regtest" => self.ledger.network = Network::Regtest,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Ok(val) = env::var("CLAIMSYNC_VIDEOS_LIMIT") {
            if let Ok(limit) = val.parse::<u64>() {
                self.limits.videos_limit = limit;
            }
        }

        if let Ok(val) = env::var("CLAIMSYNC_MAX_VIDEO_SIZE_MB") {
            if let Ok(size) = val.parse::<u64>() {
                self.limits.max_video_size_mb = size;
            }
        }

        if let Ok(val) = env::var("CLAIMSYNC_MAX_VIDEO_LENGTH_HOURS") {
            if let Ok(hours) = val.parse::<f64>() {
                self.limits.max_video_length_hours = hours;
            }
        }

        if let Ok(val) = env::var("CLAIMSYNC_CONCURRENT_VIDEOS") {
            if let Ok(n) = val.parse::<u32>() {
                self.limits.concurrent_videos = n;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Maximum media size in bytes, None when unlimited
    pub fn max_video_size_bytes(&self) -> Option<u64> {
        if self.limits.max_video_size_mb == 0 {
            None
        } else {
            Some(self.limits.max_video_size_mb * 1024 * 1024)
        }
    }
}
