//! Core data models shared by data agents and the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

//
// ================= Statement =================
//

/// SQL proposed by the LLM. Untrusted until validated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statement {
    pub sql: String,
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default)]
    pub explanation: String,
}

//
// ================= Query Result =================
//

/// What a data agent returns for one question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// One JSON object per row, keyed by column name.
    pub rows: Vec<Value>,
    /// The validated SQL that was actually executed.
    pub sql: String,
    pub explanation: String,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Short human-readable digest of the rows.
    pub fn summary(&self) -> String {
        match self.rows.as_slice() {
            [] => "No results found.".to_string(),
            [Value::Object(row)] if row.len() <= 3 => {
                let values: Vec<String> = row.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                format!("Result: {}", values.join(", "))
            }
            rows => format!("Found {} results. {}", rows.len(), self.explanation)
                .trim_end()
                .to_string(),
        }
    }
}

//
// ================= Discovery =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    /// Stable routing identifier, e.g. `orders`.
    pub id: String,
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    /// The single table this agent may read.
    pub table: String,
    #[serde(default)]
    pub capabilities: AgentCapabilities,
    #[serde(default)]
    pub skills: Vec<Skill>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Route {
    pub agent: String,
    pub question: String,
}

/// Which agents to ask and how to correlate their rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoutePlan {
    pub routes: Vec<Route>,
    #[serde(default)]
    pub join_key: Option<String>,
}

//
// ================= Outcomes =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentFailure {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AgentOutcome {
    Success {
        agent: String,
        question: String,
        result: QueryResult,
    },
    Failed {
        agent: String,
        question: String,
        error: AgentFailure,
    },
}

impl AgentOutcome {
    pub fn agent(&self) -> &str {
        match self {
            AgentOutcome::Success { agent, .. } | AgentOutcome::Failed { agent, .. } => agent,
        }
    }

    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            AgentOutcome::Success { result, .. } => Some(result),
            AgentOutcome::Failed { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AgentOutcome::Success { .. })
    }
}

//
// ================= Final Answer =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer_id: Uuid,
    pub question: String,
    pub answer: String,
    /// False when no agent produced data.
    pub success: bool,
    pub sources: Vec<String>,
    pub join_key: Option<String>,
    pub rows: Vec<Value>,
    pub outcomes: Vec<AgentOutcome>,
    pub created_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(rows: Vec<Value>) -> QueryResult {
        QueryResult {
            rows,
            sql: "SELECT 1".to_string(),
            explanation: "Counts customers by region.".to_string(),
        }
    }

    #[test]
    fn test_summary_variants() {
        assert_eq!(result(vec![]).summary(), "No results found.");
        assert_eq!(result(vec![json!({"count": 42})]).summary(), "Result: count: 42");
        assert_eq!(
            result(vec![json!({"a": 1}), json!({"a": 2})]).summary(),
            "Found 2 results. Counts customers by region."
        );
    }

    #[test]
    fn test_statement_defaults() {
        let statement: Statement = serde_json::from_value(json!({"sql": "SELECT 1"})).unwrap();
        assert!(statement.parameters.is_empty());
        assert!(statement.explanation.is_empty());
    }

    #[test]
    fn test_outcome_tagging() {
        let outcome = AgentOutcome::Failed {
            agent: "orders".to_string(),
            question: "revenue?".to_string(),
            error: AgentFailure {
                kind: "upstream_error".to_string(),
                message: "timed out".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(outcome.agent(), "orders");
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_agent_card_uses_camel_case() {
        let card = AgentCard {
            id: "orders".to_string(),
            name: "Orders Data Agent".to_string(),
            description: String::new(),
            url: "http://localhost:8002/".to_string(),
            version: "1.0.0".to_string(),
            table: "orders".to_string(),
            capabilities: AgentCapabilities::default(),
            skills: vec![],
        };
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["capabilities"]["pushNotifications"], false);
    }
}
