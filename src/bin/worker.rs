//! Worker process: consumes diagnosis jobs and runs them through the
//! handler pipeline until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use diagsync_core::config::AppConfig;
use diagsync_core::handlers::build_registry;
use diagsync_core::ids::RequestIdGenerator;
use diagsync_core::logging::init_logging;
use diagsync_core::messaging::{LmstfyClient, QueueDriver};
use diagsync_core::worker::{Manager, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("DIAGSYNC_CONFIG").ok())
        .unwrap_or_else(|| "config/diagsync.yaml".to_string());

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading config from {config_path}"))?;
    config.validate().context("validating config")?;
    init_logging(&config.app.log_level, &config.app.env);

    info!(
        app = %config.app.name,
        env = %config.app.env,
        workers = config.workers.len(),
        "starting worker process"
    );

    let client = LmstfyClient::new(&config.queue);
    client
        .ping()
        .await
        .context("queue service unreachable at boot")?;
    let queue: Arc<dyn QueueDriver> = Arc::new(client);
    let ids = RequestIdGenerator::new();

    let mut manager = Manager::new();
    for worker_config in &config.workers {
        let registry = build_registry(Arc::clone(&queue), worker_config.callback_queue.clone())
            .context("building handler registry")?;
        registry
            .validate_actions(config.configured_actions())
            .context("validating configured action types")?;
        manager.add_worker(Worker::new(
            worker_config.clone(),
            Arc::clone(&queue),
            Arc::new(registry),
            ids.clone(),
        ));
    }
    manager.start().context("starting workers")?;

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received, draining workers");
    manager.shutdown().await;
    Ok(())
}
