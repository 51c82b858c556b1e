//! Front-end orchestrator
//!
//! QUESTION → DISCOVER → ROUTE → FAN OUT → JOIN/CONCAT → SYNTHESIZE → ANSWER
//!
//! Per-agent failures are kept as outcomes so the answer can still be built
//! from whichever agents succeeded.

pub mod client;
pub mod discovery;
pub mod routing;
pub mod synthesis;

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::BiError;
use crate::llm::LlmClient;
use crate::models::{AgentFailure, AgentOutcome, Answer, QueryResult, Route, RoutePlan};
use crate::Result;

use client::AgentTransport;
use discovery::{AgentRegistry, DiscoveredAgent};

pub struct Orchestrator {
    registry: AgentRegistry,
    transport: Arc<dyn AgentTransport>,
    llm: Arc<dyn LlmClient>,
    /// Deadline for one agent including its retries.
    agent_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        agent_urls: Vec<String>,
        transport: Arc<dyn AgentTransport>,
        llm: Arc<dyn LlmClient>,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            registry: AgentRegistry::new(agent_urls, transport.clone()),
            transport,
            llm,
            agent_timeout,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        transport: Arc<dyn AgentTransport>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        // Every attempt may use the full peer timeout, plus a little backoff.
        let agent_timeout =
            settings.peer_timeout * (settings.peer_retries + 1) + Duration::from_secs(1);
        Self::new(settings.data_agent_urls.clone(), transport, llm, agent_timeout)
    }

    pub async fn agents(&self) -> Result<&[DiscoveredAgent]> {
        self.registry.agents().await
    }

    /// Answer a user question end to end.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let started = Instant::now();
        let question = question.trim();

        info!(question = %question, "Orchestrator: question received");

        let agents = self.registry.agents().await?;
        let plan = routing::plan_routes(self.llm.as_ref(), agents, question).await?;

        info!(
            routes = plan.routes.len(),
            join_key = ?plan.join_key,
            "Orchestrator: dispatching"
        );

        let outcomes = self.dispatch(&plan, agents).await;
        let answer = self.compose(question, plan, outcomes, started).await;

        info!(
            answer_id = %answer.answer_id,
            success = answer.success,
            sources = ?answer.sources,
            elapsed_ms = answer.elapsed_ms,
            "Orchestrator: answer ready"
        );

        Ok(answer)
    }

    /// Query every routed agent concurrently. Outcomes keep route order.
    async fn dispatch(&self, plan: &RoutePlan, agents: &[DiscoveredAgent]) -> Vec<AgentOutcome> {
        let mut outcomes: Vec<AgentOutcome> = plan
            .routes
            .iter()
            .map(|route| failed(route, "internal_error", "agent task did not complete"))
            .collect();

        let mut tasks = JoinSet::new();

        for (index, route) in plan.routes.iter().enumerate() {
            let Some(agent) = agents.iter().find(|a| a.id() == route.agent) else {
                outcomes[index] = failed(route, "unknown_agent", "agent is not discovered");
                continue;
            };

            let transport = self.transport.clone();
            let base_url = agent.base_url.clone();
            let route = route.clone();
            let timeout = self.agent_timeout;

            tasks.spawn(async move {
                let started = Instant::now();
                let call = transport.query(&route.agent, &base_url, &route.question);
                let result = match tokio::time::timeout(timeout, call).await {
                    Ok(result) => result,
                    Err(_) => Err(BiError::UpstreamError(format!(
                        "{} did not answer within {}s",
                        route.agent,
                        timeout.as_secs_f32()
                    ))),
                };
                debug!(
                    agent = %route.agent,
                    ok = result.is_ok(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Agent call finished"
                );
                (index, outcome(route, result))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = outcome,
                Err(e) => warn!(error = %e, "Agent task aborted"),
            }
        }

        outcomes
    }

    async fn compose(
        &self,
        question: &str,
        plan: RoutePlan,
        outcomes: Vec<AgentOutcome>,
        started: Instant,
    ) -> Answer {
        let successes: Vec<&QueryResult> = outcomes.iter().filter_map(AgentOutcome::result).collect();
        let sources: Vec<String> = outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.agent().to_string())
            .collect();

        let success = !successes.is_empty();
        let (rows, joined) = synthesis::combine_rows(&successes, plan.join_key.as_deref());

        let answer = if success {
            synthesis::synthesize(self.llm.as_ref(), question, &outcomes).await
        } else {
            warn!(failures = outcomes.len(), "No agent produced data");
            synthesis::could_not_answer(&outcomes)
        };

        Answer {
            answer_id: Uuid::new_v4(),
            question: question.to_string(),
            answer,
            success,
            sources,
            join_key: if joined { plan.join_key } else { None },
            rows,
            outcomes,
            created_at: Utc::now(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

fn outcome(route: Route, result: Result<QueryResult>) -> AgentOutcome {
    match result {
        Ok(result) => AgentOutcome::Success {
            agent: route.agent,
            question: route.question,
            result,
        },
        Err(e) => {
            warn!(agent = %route.agent, kind = e.kind(), error = %e, "Agent failed");
            AgentOutcome::Failed {
                agent: route.agent,
                question: route.question,
                error: AgentFailure {
                    kind: e.kind().to_string(),
                    message: e.to_string(),
                },
            }
        }
    }
}

fn failed(route: &Route, kind: &str, message: &str) -> AgentOutcome {
    AgentOutcome::Failed {
        agent: route.agent.clone(),
        question: route.question.clone(),
        error: AgentFailure {
            kind: kind.to_string(),
            message: message.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::profiles;
    use crate::llm::testing::ScriptedLlm;
    use client::testing::{FakeReply, FakeTransport};
    use serde_json::json;

    const CUSTOMERS_URL: &str = "http://customers:8001";
    const ORDERS_URL: &str = "http://orders:8002";
    const PRODUCTS_URL: &str = "http://products:8003";

    fn rows(sql: &str, rows: Vec<serde_json::Value>) -> FakeReply {
        FakeReply::Rows(QueryResult {
            rows,
            sql: sql.to_string(),
            explanation: String::new(),
        })
    }

    fn orchestrator(transport: FakeTransport, llm: ScriptedLlm) -> Orchestrator {
        Orchestrator::new(
            vec![
                CUSTOMERS_URL.to_string(),
                ORDERS_URL.to_string(),
                PRODUCTS_URL.to_string(),
            ],
            Arc::new(transport),
            Arc::new(llm),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_single_agent_question() {
        let transport = FakeTransport::new()
            .with_agent(
                CUSTOMERS_URL,
                profiles::CUSTOMERS.card("http://0.0.0.0:8001/"),
                rows("SELECT COUNT(*) FROM customers LIMIT 1000", vec![json!({"count": 42})]),
            )
            .with_agent(
                ORDERS_URL,
                profiles::ORDERS.card("http://0.0.0.0:8002/"),
                rows("unused", vec![]),
            );
        let llm = ScriptedLlm::new([
            r#"{"routes": [{"agent": "customers", "question": "How many customers?"}]}"#,
            "We have 42 customers.",
        ]);

        let answer = orchestrator(transport, llm)
            .ask("How many customers do we have?")
            .await
            .unwrap();

        assert!(answer.success);
        assert_eq!(answer.answer, "We have 42 customers.");
        assert_eq!(answer.sources, vec!["customers"]);
        assert_eq!(answer.rows, vec![json!({"count": 42})]);
        assert_eq!(answer.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn test_parallel_fan_out_with_join() {
        let transport = FakeTransport::new()
            .with_agent(
                CUSTOMERS_URL,
                profiles::CUSTOMERS.card("http://0.0.0.0:8001/"),
                rows(
                    "SELECT customer_id, region FROM customers LIMIT 1000",
                    vec![
                        json!({"customer_id": "c1", "region": "Europe"}),
                        json!({"customer_id": "c2", "region": "Latin America"}),
                    ],
                ),
            )
            .with_agent(
                ORDERS_URL,
                profiles::ORDERS.card("http://0.0.0.0:8002/"),
                rows(
                    "SELECT customer_id, SUM(total_amount) AS revenue FROM orders GROUP BY customer_id LIMIT 1000",
                    vec![json!({"customer_id": "c2", "revenue": 80})],
                ),
            );
        let llm = ScriptedLlm::new([
            r#"{"routes": [
                {"agent": "customers", "question": "Customer ids with region"},
                {"agent": "orders", "question": "Revenue per customer_id"}
            ], "join_key": "customer_id"}"#,
            "Latin America generated 80 in revenue.",
        ]);

        let orchestrator = orchestrator(transport, llm);
        let answer = orchestrator.ask("Revenue by region").await.unwrap();

        assert!(answer.success);
        assert_eq!(answer.join_key.as_deref(), Some("customer_id"));
        assert_eq!(
            answer.rows,
            vec![json!({"customer_id": "c2", "region": "Latin America", "revenue": 80})]
        );
        assert_eq!(
            answer.outcomes.iter().map(|o| o.agent()).collect::<Vec<_>>(),
            vec!["customers", "orders"]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_still_answers() {
        let transport = FakeTransport::new()
            .with_agent(
                CUSTOMERS_URL,
                profiles::CUSTOMERS.card("http://0.0.0.0:8001/"),
                rows("SELECT COUNT(*) FROM customers LIMIT 1000", vec![json!({"count": 42})]),
            )
            .with_agent(
                ORDERS_URL,
                profiles::ORDERS.card("http://0.0.0.0:8002/"),
                FakeReply::Hang(Duration::from_secs(5)),
            );
        let llm = ScriptedLlm::new([
            r#"{"routes": [
                {"agent": "customers", "question": "How many customers?"},
                {"agent": "orders", "question": "How many orders?"}
            ]}"#,
        ]);

        let answer = orchestrator(transport, llm)
            .ask("Customers and orders?")
            .await
            .unwrap();

        // Synthesis script is exhausted, so the fallback summary is used.
        assert!(answer.success);
        assert_eq!(answer.sources, vec!["customers"]);
        assert!(answer.answer.contains("customers: Result: count: 42"));
        assert!(answer.answer.contains("orders: no data"));
        assert!(!answer.outcomes[1].is_success());
        assert_eq!(answer.join_key, None);
    }

    #[tokio::test]
    async fn test_all_failed_could_not_answer() {
        let transport = FakeTransport::new().with_agent(
            PRODUCTS_URL,
            profiles::PRODUCTS.card("http://0.0.0.0:8003/"),
            FakeReply::Fail(BiError::RemoteAgentError {
                agent: "products".to_string(),
                code: crate::rpc::codes::VALIDATION_REJECTED,
                message: "Validation rejected: [disallowed_table] ...".to_string(),
            }),
        );
        let llm = ScriptedLlm::new([
            r#"{"routes": [{"agent": "products", "question": "Products and their suppliers"}]}"#,
        ]);

        let answer = orchestrator(transport, llm)
            .ask("Which suppliers sell Electronics?")
            .await
            .unwrap();

        assert!(!answer.success);
        assert!(answer.answer.starts_with(synthesis::COULD_NOT_ANSWER));
        assert!(answer.answer.contains("validation_rejected"));
        assert!(answer.rows.is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure_is_an_error() {
        let llm = ScriptedLlm::new(Vec::<String>::new());
        let err = orchestrator(FakeTransport::new(), llm)
            .ask("anything")
            .await
            .unwrap_err();
        assert!(matches!(err, BiError::DiscoveryError(_)));
    }

    #[tokio::test]
    async fn test_empty_route_list_asks_everyone() {
        let transport = FakeTransport::new()
            .with_agent(
                CUSTOMERS_URL,
                profiles::CUSTOMERS.card("http://0.0.0.0:8001/"),
                rows("a", vec![json!({"customers": 3})]),
            )
            .with_agent(
                ORDERS_URL,
                profiles::ORDERS.card("http://0.0.0.0:8002/"),
                rows("b", vec![json!({"orders": 9})]),
            );
        let llm = ScriptedLlm::new([r#"{"routes": []}"#, "3 customers placed 9 orders."]);

        let orchestrator = orchestrator(transport, llm);
        let answer = orchestrator.ask("Overview please").await.unwrap();

        assert_eq!(answer.sources, vec!["customers", "orders"]);
        assert_eq!(answer.rows.len(), 2);
    }
}
