//! # Configuration
//!
//! Process configuration loaded once at startup from a YAML file with
//! `DIAGSYNC_`-prefixed environment overrides, immutable thereafter.
//! Validation failures here are fatal: no worker starts on a bad config.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{CoreError, Result};

/// Root configuration for a worker process.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppInfo,
    pub queue: QueueConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub callback_consumer: Option<CallbackConsumerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppInfo {
    pub name: String,
    #[serde(default = "default_env")]
    pub env: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Connection settings for the HTTP queue service.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub host: String,
    pub port: u16,
    pub namespace: String,
    #[serde(default)]
    pub token: String,
}

impl QueueConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// One named worker: a queue binding plus subscriber/processor pool sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub queue_name: String,
    pub callback_queue: String,
    pub subscriber: SubscriberConfig,
    pub processor: ProcessorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberConfig {
    /// Concurrent polling loops.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Minimum interval between consume calls per poller.
    #[serde(default = "default_rate_ms")]
    pub rate_ms: u64,
    /// Long-poll timeout handed to the queue service.
    #[serde(default = "default_consume_timeout_secs")]
    pub timeout_secs: u64,
    /// Message lease: unacked messages become visible again after this.
    #[serde(default = "default_ttr_secs")]
    pub ttr_secs: u64,
    /// Sleep after a transport error before retrying.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    /// Concurrent consumer loops.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Bounded internal queue capacity between subscriber and processor.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Deadline for a single handler invocation.
    #[serde(default = "default_process_timeout_ms")]
    pub timeout_ms: u64,
    /// Delay for explicit delayed republish of retryable failures.
    /// Zero leaves the message unacked for TTR-based redelivery instead.
    #[serde(default)]
    pub retry_delay_secs: u64,
}

/// Standalone callback-consumer loop settings (producer-side process).
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConsumerConfig {
    pub queue_name: String,
    #[serde(default = "default_consume_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_ttr_secs")]
    pub ttr_secs: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub poll_interval_ms: u64,
}

fn default_env() -> String {
    "development".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_threads() -> usize {
    4
}
fn default_rate_ms() -> u64 {
    100
}
fn default_consume_timeout_secs() -> u64 {
    3
}
fn default_ttr_secs() -> u64 {
    30
}
fn default_error_backoff_ms() -> u64 {
    1000
}
fn default_buffer_size() -> usize {
    64
}
fn default_process_timeout_ms() -> u64 {
    30_000
}

impl SubscriberConfig {
    pub fn rate(&self) -> Duration {
        Duration::from_millis(self.rate_ms)
    }
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
    pub fn ttr(&self) -> Duration {
        Duration::from_secs(self.ttr_secs)
    }
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl ProcessorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AppConfig {
    /// Load from a YAML file, then apply `DIAGSYNC_`-prefixed env overrides
    /// (e.g. `DIAGSYNC_QUEUE__HOST`).
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("DIAGSYNC")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| CoreError::Configuration(format!("failed to read config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| CoreError::Configuration(format!("failed to parse config: {e}")))
    }

    /// Fail-fast startup validation.
    pub fn validate(&self) -> Result<()> {
        if self.app.name.is_empty() {
            return Err(CoreError::Configuration("app.name is required".into()));
        }
        if self.queue.host.is_empty() {
            return Err(CoreError::Configuration("queue.host is required".into()));
        }
        if self.workers.is_empty() && self.callback_consumer.is_none() {
            return Err(CoreError::Configuration(
                "at least one worker or a callback_consumer section is required".into(),
            ));
        }
        for worker in &self.workers {
            if worker.queue_name.is_empty() {
                return Err(CoreError::Configuration(format!(
                    "worker {}: queue_name is required",
                    worker.name
                )));
            }
            if worker.callback_queue.is_empty() {
                return Err(CoreError::Configuration(format!(
                    "worker {}: callback_queue is required",
                    worker.name
                )));
            }
            if worker.subscriber.threads == 0 || worker.processor.threads == 0 {
                return Err(CoreError::Configuration(format!(
                    "worker {}: subscriber and processor thread counts must be non-zero",
                    worker.name
                )));
            }
            if worker.processor.buffer_size == 0 {
                return Err(CoreError::Configuration(format!(
                    "worker {}: processor.buffer_size must be non-zero",
                    worker.name
                )));
            }
        }
        Ok(())
    }

    /// Action types every worker in this process must be able to route.
    pub fn configured_actions(&self) -> Vec<&str> {
        // Routing is envelope-driven; the process-level contract is that the
        // registry resolves the actions this deployment dispatches.
        vec![crate::handlers::ACTION_ORDER_DIAGNOSE]
    }
}
