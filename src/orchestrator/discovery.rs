//! Agent discovery
//!
//! Probes each configured base URL for its agent card. Runs once, on first
//! use; a failed discovery is not cached, so the next question retries it.

use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::client::AgentTransport;
use crate::error::BiError;
use crate::models::AgentCard;
use crate::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredAgent {
    /// URL the card was fetched from; calls go here, not to `card.url`.
    pub base_url: String,
    pub card: AgentCard,
}

impl DiscoveredAgent {
    pub fn id(&self) -> &str {
        &self.card.id
    }
}

pub struct AgentRegistry {
    urls: Vec<String>,
    transport: Arc<dyn AgentTransport>,
    discovered: OnceCell<Vec<DiscoveredAgent>>,
}

impl AgentRegistry {
    pub fn new(urls: Vec<String>, transport: Arc<dyn AgentTransport>) -> Self {
        Self {
            urls,
            transport,
            discovered: OnceCell::new(),
        }
    }

    /// Discovered agents, probing on first call.
    pub async fn agents(&self) -> Result<&[DiscoveredAgent]> {
        let agents = self
            .discovered
            .get_or_try_init(|| self.discover())
            .await?;
        Ok(agents.as_slice())
    }

    async fn discover(&self) -> Result<Vec<DiscoveredAgent>> {
        let mut agents = Vec::with_capacity(self.urls.len());
        let mut seen = HashSet::new();

        for url in &self.urls {
            match self.transport.fetch_card(url).await {
                Ok(card) if !seen.insert(card.id.clone()) => {
                    warn!(url = %url, agent = %card.id, "Duplicate agent id - skipping");
                }
                Ok(card) => {
                    info!(
                        url = %url,
                        agent = %card.id,
                        skills = card.skills.len(),
                        "Agent discovered"
                    );
                    agents.push(DiscoveredAgent {
                        base_url: url.trim_end_matches('/').to_string(),
                        card,
                    });
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Agent discovery failed");
                }
            }
        }

        if agents.is_empty() {
            return Err(BiError::DiscoveryError(format!(
                "no data agents reachable at {}",
                self.urls.join(", ")
            )));
        }

        Ok(agents)
    }
}
