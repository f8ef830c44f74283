//! Run metrics
//!
//! Per-item progress, system resource usage and aggregate counters,
//! snapshotted for the status endpoint.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-item metrics tracking sync progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemMetrics {
    pub video_id: String,
    pub title: String,
    /// Pipeline stage: "download", "thumbnail", "publish" or "reprocess"
    pub stage: String,
    pub size_bytes: u64,
    pub claim_id: Option<String>,
}

/// System-level metrics for resource monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub mem_usage_percent: f32,
    pub load_avg_1: f32,
    pub load_avg_5: f32,
    pub load_avg_15: f32,
}

/// Complete metrics snapshot for one sync run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncSnapshot {
    pub timestamp_unix_ms: i64,
    pub channel: String,
    pub items: Vec<ItemMetrics>,
    pub system: SystemMetrics,
    pub queued: usize,
    pub running: usize,
    pub published: u64,
    pub reprocessed: u64,
    pub failed: u64,
    pub total_bytes_published: u64,
}

/// Shared metrics state for concurrent access across sync components
pub type SharedMetrics = Arc<RwLock<SyncSnapshot>>;

/// Creates a new SharedMetrics instance with default values
pub fn new_shared_metrics() -> SharedMetrics {
    Arc::new(RwLock::new(SyncSnapshot::default()))
}

/// Collects current system metrics using sysinfo
pub fn collect_system_metrics() -> SystemMetrics {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu_usage = sys.global_cpu_usage();
    let total_memory = sys.total_memory();
    let used_memory = sys.used_memory();
    let mem_usage = if total_memory > 0 {
        (used_memory as f64 / total_memory as f64 * 100.0) as f32
    } else {
        0.0
    };

    let load_avg = System::load_average();

    SystemMetrics {
        cpu_usage_percent: cpu_usage,
        mem_usage_percent: mem_usage,
        load_avg_1: load_avg.one as f32,
        load_avg_5: load_avg.five as f32,
        load_avg_15: load_avg.fifteen as f32,
    }
}
