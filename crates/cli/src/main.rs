//! CLI entry point for claimsync
//!
//! Parses command line arguments, loads config.toml, wires up the HTTP
//! collaborators and runs one sync pass over the configured channel.

use clap::Parser;
use claimsync::capacity::{resolve_default_account, CapacityManager, WaitIntervals};
use claimsync::channel::OwnershipManager;
use claimsync::concurrency::derive_plan;
use claimsync::download::DownloadPipeline;
use claimsync::gateway::{Fee, HttpFundingSource, HttpGateway};
use claimsync::metrics::new_shared_metrics;
use claimsync::platform::KeepAllTags;
use claimsync::publish::{DirectNamer, PublishEngine};
use claimsync::remote::{RemoteRecordStore, RemoteSourcePlatform, RemoteThumbnailMirror};
use claimsync::reprocess::ReprocessEngine;
use claimsync::startup::run_startup_checks;
use claimsync::status_server::run_status_server;
use claimsync::sync::ChannelSync;
use claimsync::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

/// claimsync - mirrors a source platform channel onto a claim-based ledger
#[derive(Parser, Debug)]
#[command(name = "claimsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Wallet daemon JSON-RPC endpoint
    #[arg(long, default_value = "http://localhost:5279")]
    daemon_url: String,

    /// Funding node JSON-RPC endpoint
    #[arg(long, default_value = "http://localhost:18443")]
    funding_url: String,

    /// Source platform data API base URL
    #[arg(long, default_value = "https://api.claimsync.net/platform")]
    platform_url: String,

    /// Thumbnail mirror service base URL
    #[arg(long, default_value = "https://api.claimsync.net/thumbnails")]
    mirror_url: String,

    /// Sync record store base URL
    #[arg(long, default_value = "https://api.claimsync.net/records")]
    records_url: String,

    /// Extra refill credits requested on top of the computed amount
    #[arg(long, default_value = "0.0")]
    refill: f64,

    /// Skip startup checks (downloader, staging dir). For testing only.
    #[arg(long, default_value = "false")]
    skip_checks: bool,

    /// Never shell out to the external downloader on download failure
    #[arg(long, default_value = "false")]
    no_fallback: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
    } else if let Err(e) = run_startup_checks(&cfg) {
        error!("startup check failed: {}", e);
        return ExitCode::FAILURE;
    }

    // API credentials come from the environment, never from flags
    let platform_key = std::env::var("CLAIMSYNC_PLATFORM_KEY").unwrap_or_default();
    let records_token = std::env::var("CLAIMSYNC_RECORDS_TOKEN").unwrap_or_default();

    let network = cfg.ledger.network;
    let gateway = Arc::new(HttpGateway::new(&args.daemon_url));
    let funding = Arc::new(HttpFundingSource::new(
        &args.funding_url,
        network == claimsync::config::Network::Regtest,
    ));
    let platform = Arc::new(RemoteSourcePlatform::new(
        &args.platform_url,
        platform_key,
        PathBuf::from(&cfg.channel.videos_dir),
    ));
    let mirror = Arc::new(RemoteThumbnailMirror::new(&args.mirror_url));
    let records = Arc::new(RemoteRecordStore::new(&args.records_url, records_token));
    let tags = Arc::new(KeepAllTags);

    let default_account = match resolve_default_account(gateway.as_ref(), network).await {
        Ok(account) => account,
        Err(e) => {
            error!("could not resolve the default wallet account: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(account = %default_account, "resolved default wallet account");

    let intervals = WaitIntervals::default();
    let ownership = Arc::new(OwnershipManager::new(
        gateway.clone(),
        funding.clone(),
        records.clone(),
        platform.clone(),
        mirror.clone(),
        tags.clone(),
        cfg.channel.name.clone(),
        cfg.channel.source_channel_id.clone(),
        cfg.ledger.channel_claim_amount,
        default_account.clone(),
        intervals.settle,
    ));
    let capacity = Arc::new(CapacityManager::new(
        gateway.clone(),
        funding,
        records.clone(),
        platform.clone(),
        ownership,
        cfg.ledger.clone(),
        network,
        cfg.limits.videos_limit,
        args.refill,
        cfg.channel.source_channel_id.clone(),
        default_account,
        intervals,
    ));
    let downloads = Arc::new(DownloadPipeline::new(
        platform.clone(),
        cfg.max_video_size_bytes(),
        cfg.limits.max_video_length_hours,
    ));
    let publisher = Arc::new(PublishEngine::new(
        gateway.clone(),
        Arc::new(DirectNamer),
        tags.clone(),
    ));
    let reprocessor = Arc::new(ReprocessEngine::new(
        gateway,
        mirror.clone(),
        tags,
        cfg.mirror.thumbnail_endpoint.clone(),
    ));

    let plan = derive_plan(&cfg.limits);
    info!(
        cores = plan.total_cores,
        concurrent_videos = plan.concurrent_videos,
        "concurrency plan derived"
    );

    let metrics = new_shared_metrics();
    info!("starting status server on http://127.0.0.1:7878/status");
    tokio::spawn(run_status_server(metrics.clone()));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight items");
            let _ = cancel_tx.send(true);
        }
    });

    let fee = cfg.publish.fee.as_ref().map(|fee| Fee {
        amount: fee.amount,
        currency: fee.currency.clone(),
        address: fee.address.clone(),
    });
    let sync = Arc::new(ChannelSync::new(
        platform,
        records,
        mirror,
        capacity,
        downloads,
        publisher,
        reprocessor,
        metrics,
        Arc::new(RwLock::new(())),
        plan,
        cancel_rx,
        cfg.channel.name.clone(),
        cfg.channel.source_channel_id.clone(),
        cfg.limits.videos_limit,
        cfg.ledger.publish_amount,
        fee,
        cfg.limits.max_video_size_mb,
        !args.no_fallback,
    ));

    match sync.run().await {
        Ok(outcome) => {
            info!(
                published = outcome.published,
                reprocessed = outcome.reprocessed,
                failed = outcome.failed,
                "sync finished"
            );
            for (video_id, message) in &outcome.failures {
                warn!(video_id = %video_id, "{}", message);
            }
            if outcome.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("sync aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
