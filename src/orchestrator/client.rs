//! HTTP transport to data agents
//!
//! Uses a long-lived reqwest::Client for connection pooling. Connect
//! failures, timeouts and 5xx responses get a bounded retry. A 4xx, an
//! unreadable envelope or a JSON-RPC error object is final.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::BiError;
use crate::models::{AgentCard, QueryResult};
use crate::rpc::{RpcRequest, RpcResponse};
use crate::Result;

pub const AGENT_CARD_PATH: &str = "/.well-known/agent-card.json";
pub const RPC_PATH: &str = "/rpc";

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn fetch_card(&self, base_url: &str) -> Result<AgentCard>;

    async fn query(&self, agent_id: &str, base_url: &str, question: &str) -> Result<QueryResult>;
}

pub struct HttpAgentClient {
    client: Client,
    retries: u32,
}

impl HttpAgentClient {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, retries })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.peer_timeout, settings.peer_retries)
    }

    async fn send_once(
        &self,
        url: &str,
        request: &RpcRequest,
    ) -> std::result::Result<RpcResponse, SendFailure> {
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    SendFailure::Transient(e.into())
                } else {
                    SendFailure::Permanent(e.into())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = BiError::UpstreamError(format!("{} returned {}: {}", url, status, body));
            return Err(if status.is_server_error() {
                SendFailure::Transient(error)
            } else {
                SendFailure::Permanent(error)
            });
        }

        response.json::<RpcResponse>().await.map_err(|e| {
            SendFailure::Permanent(BiError::UpstreamError(format!(
                "invalid JSON-RPC envelope: {}",
                e
            )))
        })
    }
}

/// Outcome of one failed send: worth another attempt or not.
enum SendFailure {
    Transient(BiError),
    Permanent(BiError),
}

#[async_trait]
impl AgentTransport for HttpAgentClient {
    async fn fetch_card(&self, base_url: &str) -> Result<AgentCard> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), AGENT_CARD_PATH);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(BiError::DiscoveryError(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json::<AgentCard>()
            .await
            .map_err(|e| BiError::DiscoveryError(format!("invalid agent card at {}: {}", url, e)))
    }

    async fn query(&self, agent_id: &str, base_url: &str, question: &str) -> Result<QueryResult> {
        let url = format!("{}{}", base_url.trim_end_matches('/'), RPC_PATH);
        let request = RpcRequest::query(Uuid::new_v4().to_string(), question);

        let mut attempt = 0;
        let response = loop {
            match self.send_once(&url, &request).await {
                Ok(response) => break response,
                Err(SendFailure::Transient(e)) if attempt < self.retries => {
                    attempt += 1;
                    warn!(agent = agent_id, attempt, error = %e, "Peer call failed - retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(SendFailure::Permanent(e)) => {
                    warn!(agent = agent_id, error = %e, "Peer call failed - not retryable");
                    return Err(BiError::UpstreamError(format!(
                        "{} refused the call: {}",
                        agent_id, e
                    )));
                }
                Err(SendFailure::Transient(e)) => {
                    return Err(BiError::UpstreamError(format!(
                        "{} unreachable after {} attempt(s): {}",
                        agent_id,
                        attempt + 1,
                        e
                    )))
                }
            }
        };

        if let Some(error) = response.error {
            debug!(agent = agent_id, code = error.code, "Peer returned JSON-RPC error");
            return Err(BiError::RemoteAgentError {
                agent: agent_id.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.ok_or_else(|| {
            BiError::UpstreamError(format!("{} sent neither result nor error", agent_id))
        })?;

        serde_json::from_value(result)
            .map_err(|e| BiError::UpstreamError(format!("{} sent an invalid result: {}", agent_id, e)))
    }
}
