//! Callback-consumer process: receives diagnosis completions, hands them
//! to the result repository, and notifies in-flight smart waits.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use diagsync_core::config::AppConfig;
use diagsync_core::dispatch::{CallbackConsumer, CallbackMessage, ResultRepository};
use diagsync_core::dispatch::callback::RepositoryError;
use diagsync_core::logging::init_logging;
use diagsync_core::messaging::{LmstfyClient, QueueDriver};
use diagsync_core::pubsub::{PubSubDriver, RedisPubSub};

/// Stand-in repository until storage is wired to this process: records
/// each completion in the log so nothing is silently swallowed.
struct LogRepository;

#[async_trait]
impl ResultRepository for LogRepository {
    async fn record(&self, callback: &CallbackMessage) -> Result<(), RepositoryError> {
        info!(
            order_id = %callback.order_id,
            request_id = %callback.request_id,
            status = ?callback.status,
            "diagnosis result recorded"
        );
        Ok(())
    }
}

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

    let consumer_config = config
        .callback_consumer
        .clone()
        .context("config has no callback_consumer section")?;
    info!(
        app = %config.app.name,
        queue = %consumer_config.queue_name,
        "starting callback consumer process"
    );

    let client = LmstfyClient::new(&config.queue);
    client
        .ping()
        .await
        .context("queue service unreachable at boot")?;
    let queue: Arc<dyn QueueDriver> = Arc::new(client);

    let pubsub: Arc<dyn PubSubDriver> = Arc::new(
        RedisPubSub::from_config(&config.redis)
            .await
            .context("connecting to redis")?,
    );

    let mut consumer = CallbackConsumer::start(
        queue,
        pubsub,
        Arc::new(LogRepository),
        consumer_config,
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received, stopping consumer");
    consumer.shutdown().await;
    Ok(())
}
