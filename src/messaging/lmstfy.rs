//! # HTTP Queue Service Adapter
//!
//! `QueueDriver` backed by an lmstfy-style HTTP queue service:
//! publish = `PUT /api/{ns}/{queue}?ttl=&delay=&tries=` with a raw body,
//! consume = `GET ?timeout=&ttr=` where 404 means empty, ack = `DELETE` by
//! job id. Message data in consume responses is base64 encoded.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::messaging::errors::MessagingError;
use crate::messaging::message::TransportMessage;
use crate::messaging::queue::QueueDriver;

/// Default publish retry budget handed to the queue service.
const PUBLISH_TRIES: u32 = 3;

/// HTTP queue client. Cheap to clone; the underlying connection pool is
/// shared.
#[derive(Debug, Clone)]
pub struct LmstfyClient {
    http: reqwest::Client,
    base_url: String,
    namespace: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ConsumeResponse {
    job_id: String,
    /// Base64-encoded job body.
    data: String,
    #[serde(default)]
    remain_tries: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    job_id: String,
}

impl LmstfyClient {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            token: config.token.clone(),
        }
    }

    fn queue_url(&self, queue: &str) -> String {
        format!("{}/api/{}/{}", self.base_url, self.namespace, queue)
    }

    fn job_url(&self, queue: &str, job_id: &str) -> String {
        format!("{}/job/{}", self.queue_url(queue), job_id)
    }

    fn with_token(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.header("X-Token", &self.token)
        }
    }

    /// Probe connectivity at boot. A dead queue service aborts startup.
    pub async fn ping(&self) -> Result<(), MessagingError> {
        let url = format!("{}/ping", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MessagingError::transport(format!("queue service unreachable: {e}")))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(MessagingError::transport(format!(
                "queue service ping returned {}",
                resp.status()
            )))
        }
    }
}

#[async_trait]
impl QueueDriver for LmstfyClient {
    async fn consume(
        &self,
        queue: &str,
        timeout: Duration,
        ttr: Duration,
    ) -> Result<Option<TransportMessage>, MessagingError> {
        let url = self.queue_url(queue);
        let req = self.http.get(&url).query(&[
            ("timeout", timeout.as_secs().to_string()),
            ("ttr", ttr.as_secs().to_string()),
        ]);

        let resp = self
            .with_token(req)
            .send()
            .await
            .map_err(|e| MessagingError::transport(format!("consume failed: {e}")))?;

        // 404 is the service's way of saying the queue is empty
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(MessagingError::UnexpectedStatus {
                queue_name: queue.to_string(),
                operation: "consume".to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body: ConsumeResponse = resp
            .json()
            .await
            .map_err(|e| MessagingError::decode(format!("consume body decode failed: {e}")))?;

        let data = general_purpose::STANDARD
            .decode(&body.data)
            .map_err(|e| MessagingError::decode(format!("base64 decode failed: {e}")))?;

        debug!(queue = queue, job_id = %body.job_id, "message consumed");
        Ok(Some(TransportMessage {
            id: body.job_id,
            queue: queue.to_string(),
            data,
            attempts: body.remain_tries,
        }))
    }

    async fn ack(&self, queue: &str, job_id: &str) -> Result<(), MessagingError> {
        let req = self.http.delete(self.job_url(queue, job_id));
        let resp = self
            .with_token(req)
            .send()
            .await
            .map_err(|e| MessagingError::transport(format!("ack failed: {e}")))?;

        match resp.status() {
            reqwest::StatusCode::NO_CONTENT | reqwest::StatusCode::OK => {
                debug!(queue = queue, job_id = job_id, "message acked");
                Ok(())
            }
            status => Err(MessagingError::UnexpectedStatus {
                queue_name: queue.to_string(),
                operation: "ack".to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        ttl: Duration,
        delay: Duration,
    ) -> Result<String, MessagingError> {
        let req = self
            .http
            .put(self.queue_url(queue))
            .query(&[
                ("ttl", ttl.as_secs().to_string()),
                ("delay", delay.as_secs().to_string()),
                ("tries", PUBLISH_TRIES.to_string()),
            ])
            // raw body, no content-type: the service stores bytes verbatim
            .body(payload.to_vec());

        let resp = self
            .with_token(req)
            .send()
            .await
            .map_err(|e| MessagingError::transport(format!("publish failed: {e}")))?;

        match resp.status() {
            reqwest::StatusCode::CREATED | reqwest::StatusCode::OK => {
                let body: PublishResponse = resp.json().await.map_err(|e| {
                    MessagingError::decode(format!("publish body decode failed: {e}"))
                })?;
                debug!(queue = queue, job_id = %body.job_id, "message published");
                Ok(body.job_id)
            }
            status => Err(MessagingError::UnexpectedStatus {
                queue_name: queue.to_string(),
                operation: "publish".to_string(),
                status: status.as_u16(),
            }),
        }
    }

    async fn bury(
        &self,
        queue: &str,
        job_id: &str,
        payload: &[u8],
    ) -> Result<(), MessagingError> {
        // The consumer API has no bury verb; dead-letter by moving the raw
        // payload to the queue's dead-letter companion before acking.
        let dead_queue = format!("{queue}_dead");
        self.publish(&dead_queue, payload, Duration::ZERO, Duration::ZERO)
            .await?;
        warn!(queue = queue, job_id = job_id, dead_queue = %dead_queue, "message buried");
        self.ack(queue, job_id).await
    }

    async fn release(
        &self,
        queue: &str,
        job_id: &str,
        payload: &[u8],
        delay: Duration,
    ) -> Result<(), MessagingError> {
        // Fast retry: republish with delay, then ack the served lease.
        self.publish(queue, payload, Duration::ZERO, delay).await?;
        debug!(queue = queue, job_id = job_id, delay_secs = delay.as_secs(), "message released");
        self.ack(queue, job_id).await
    }
}
