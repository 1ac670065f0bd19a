//! Security Monitor - Main Entry Point

use api::{init_logging, run_server};
use dispatch::Dispatcher;
use monitor_scheduler::{MonitorScheduler, SchedulerConfig};
use rule_registry::RuleRegistry;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    info!("=== Security Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    // An invalid rule document is fatal: monitoring never starts on bad rules
    let registry = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading rule document from {}", path);
            Arc::new(RuleRegistry::from_file(&path)?)
        }
        None => {
            info!("No rule document given, using built-in rules");
            Arc::new(RuleRegistry::builtin())
        }
    };

    let (scheduler, handle) = MonitorScheduler::new(
        Arc::clone(&registry),
        Dispatcher::with_defaults(),
        SchedulerConfig::default(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

    let addr = "0.0.0.0:8080";
    run_server(addr, handle).await?;

    // server exited on ctrl-c; let the in-flight tick finish, then stop
    let _ = shutdown_tx.send(true);
    scheduler_task.await?;

    Ok(())
}
