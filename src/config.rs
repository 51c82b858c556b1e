//! Runtime settings
//!
//! Read from the process environment (after `.env` is loaded by the binaries).
//! Per-table allow-lists are static and live in `agent::profiles`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::BiError;
use crate::sql::DEFAULT_MAX_ROWS;
use crate::Result;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub llm_model: String,
    pub llm_timeout: Duration,

    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub db_query_timeout: Duration,

    pub peer_timeout: Duration,
    pub peer_retries: u32,
    pub max_rows: u32,

    pub orchestrator_port: u16,
    pub customers_agent_port: u16,
    pub orders_agent_port: u16,
    pub products_agent_port: u16,

    /// Base URLs probed during discovery.
    pub data_agent_urls: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup. Missing keys take defaults;
    /// present but unparsable values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let customers_agent_port = parse_or(&get, "CUSTOMERS_AGENT_PORT", 8001)?;
        let orders_agent_port = parse_or(&get, "ORDERS_AGENT_PORT", 8002)?;
        let products_agent_port = parse_or(&get, "PRODUCTS_AGENT_PORT", 8003)?;

        let data_agent_urls = match get("DATA_AGENT_URLS") {
            Some(raw) => raw
                .split(',')
                .map(|u| u.trim().trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            None => [customers_agent_port, orders_agent_port, products_agent_port]
                .iter()
                .map(|port| format!("http://localhost:{}", port))
                .collect(),
        };

        let max_rows: u32 = parse_or(&get, "MAX_ROWS", DEFAULT_MAX_ROWS)?;
        if max_rows == 0 {
            return Err(BiError::ConfigError("MAX_ROWS must be positive".to_string()));
        }

        let db_max_connections: u32 = parse_or(&get, "DB_MAX_CONNECTIONS", 10)?;
        if db_max_connections == 0 {
            return Err(BiError::ConfigError(
                "DB_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }

        Ok(Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/conversational_bi".to_string()),
            openai_api_key: get("OPENAI_API_KEY").unwrap_or_default(),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 60)?),

            db_max_connections,
            db_acquire_timeout: Duration::from_secs(parse_or(&get, "DB_ACQUIRE_TIMEOUT_SECS", 5)?),
            db_query_timeout: Duration::from_secs(parse_or(&get, "DB_QUERY_TIMEOUT_SECS", 15)?),

            peer_timeout: Duration::from_secs(parse_or(&get, "PEER_TIMEOUT_SECS", 30)?),
            peer_retries: parse_or(&get, "PEER_RETRIES", 1)?,
            max_rows,

            orchestrator_port: parse_or(&get, "ORCHESTRATOR_PORT", 8000)?,
            customers_agent_port,
            orders_agent_port,
            products_agent_port,

            data_agent_urls,
        })
    }

    /// Port for a data agent by its id.
    pub fn agent_port(&self, agent_id: &str) -> Option<u16> {
        match agent_id {
            "customers" => Some(self.customers_agent_port),
            "orders" => Some(self.orders_agent_port),
            "products" => Some(self.products_agent_port),
            _ => None,
        }
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            BiError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `LOG_LEVEL`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into())))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
