//! Concurrency planning
//!
//! Derives how many per-item pipelines may run at once from CPU core count
//! and configuration. Downloads are network-bound but muxing and hashing
//! are not, so the plan stays conservative on small machines.

use claimsync_config::LimitsConfig;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Number of items processed concurrently
    pub concurrent_videos: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// An explicit non-zero `concurrent_videos` is used unchanged; zero
    /// auto-derives from the detected core count.
    pub fn derive(limits: &LimitsConfig) -> Self {
        Self::derive_with_cores(limits, num_cpus::get() as u32)
    }

    fn derive_with_cores(limits: &LimitsConfig, total_cores: u32) -> Self {
        let concurrent_videos = if limits.concurrent_videos > 0 {
            limits.concurrent_videos
        } else {
            derive_concurrent_videos(total_cores)
        };
        Self {
            total_cores,
            concurrent_videos,
        }
    }
}

/// Derive concurrent item count from core count
/// - 4 pipelines for 8+ cores
/// - 2 for 4+ cores
/// - 1 otherwise
fn derive_concurrent_videos(cores: u32) -> u32 {
    if cores >= 8 {
        4
    } else if cores >= 4 {
        2
    } else {
        1
    }
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(limits: &LimitsConfig) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(limits)
}
