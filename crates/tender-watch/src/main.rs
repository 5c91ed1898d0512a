//! # tender-watch
//!
//! Headless tender marketplace watcher.
//!
//! Connects to the ledger gateway, keeps a synchronized read model of every
//! tender and logs each published snapshot. Useful for monitoring a
//! deployment and for exercising the synchronizer against a live node.

mod report;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use tender_net::{NetConfig, Session};
use tender_sync::{ActionOutcome, SyncConfig, SyncHandle};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tender_sync=debug,tender_net=debug")),
        )
        .init();

    info!("Starting tender watcher v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let net_config = NetConfig::from_env();
    let sync_config = SyncConfig::from_env();
    info!(
        rpc = %net_config.rpc_url,
        contract = %net_config.contract,
        pinning = net_config.pinning_enabled(),
        "Loaded transport configuration"
    );
    info!(?sync_config, "Loaded sync configuration");

    // -----------------------------------------------------------------------
    // 3. Connect and start syncing
    // -----------------------------------------------------------------------
    let session = Session::connect(&net_config).await?;
    let sync = SyncHandle::spawn(session, sync_config);

    let _subscription = sync.subscribe(|snapshot| {
        info!(
            generation = snapshot.generation,
            "{}",
            report::summary_line(&snapshot)
        );
        if let Some(account) = &snapshot.account {
            debug!(
                account = %account.address.short(),
                role = ?account.role,
                subscribed = account.has_subscription,
                "Connected account"
            );
        }
        for entry in &snapshot.entries {
            info!("  {}", report::entry_line(entry));
        }
    });

    let mut outcomes = sync.action_outcomes();
    tokio::spawn(async move {
        while let Ok(outcome) = outcomes.recv().await {
            match outcome {
                ActionOutcome::Confirmed(id) => info!(action = %id, "Action confirmed"),
                ActionOutcome::Failed { id, reason } => {
                    warn!(action = %id, reason = %reason, "Action failed")
                }
            }
        }
    });

    // -----------------------------------------------------------------------
    // 4. Run until Ctrl+C
    // -----------------------------------------------------------------------
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");

    let health = sync.health();
    if health.consecutive_failures > 0 {
        warn!(
            failures = health.consecutive_failures,
            last_error = ?health.last_error,
            "Gateway was failing at shutdown"
        );
    }

    sync.shutdown().await;
    info!("Tender watcher stopped");
    Ok(())
}
