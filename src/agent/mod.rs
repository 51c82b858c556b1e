//! Data agent: one table, one allow-list
//!
//! QUESTION → GENERATE SQL → VALIDATE → (REPROMPT once?) → EXECUTE → ROWS
//!
//! The LLM is only trusted to propose a statement. Nothing reaches the
//! executor unless the validator accepted it.

pub mod profiles;

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::database::QueryExecutor;
use crate::error::BiError;
use crate::llm::{parse_json_reply, prompts, ChatPrompt, LlmClient};
use crate::models::{AgentCard, QueryResult, Statement};
use crate::sql::tokenizer::{self, TokenKind};
use crate::sql::{SqlValidator, ValidatedSql};
use crate::Result;

use profiles::TableProfile;

/// First attempt plus one re-prompt.
const MAX_GENERATION_ATTEMPTS: u32 = 2;

pub struct DataAgent {
    profile: &'static TableProfile,
    validator: SqlValidator,
    llm: Arc<dyn LlmClient>,
    executor: Arc<dyn QueryExecutor>,
}

impl DataAgent {
    pub fn new(
        profile: &'static TableProfile,
        max_rows: u32,
        llm: Arc<dyn LlmClient>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self {
            profile,
            validator: SqlValidator::new(profile.allow_list(max_rows)),
            llm,
            executor,
        }
    }

    pub fn id(&self) -> &'static str {
        self.profile.id
    }

    pub fn card(&self, url: &str) -> AgentCard {
        self.profile.card(url)
    }

    /// Answer one question against this agent's table.
    pub async fn answer(&self, question: &str) -> Result<QueryResult> {
        let started = Instant::now();

        info!(agent = self.id(), question = %question, "Data agent: question received");

        let base_prompt = ChatPrompt::json(
            prompts::sql_system_prompt(self.profile, Utc::now().date_naive()),
            prompts::sql_user_prompt(question),
        );

        let mut prompt = base_prompt.clone();
        let mut attempt = 1;

        let (statement, validated) = loop {
            match self.generate(&prompt).await {
                Ok(planned) => break planned,
                Err(e) if e.is_reprompt_worthy() && attempt < MAX_GENERATION_ATTEMPTS => {
                    warn!(
                        agent = self.id(),
                        attempt,
                        kind = e.kind(),
                        error = %e,
                        "Generated SQL unusable - re-prompting"
                    );
                    prompt = base_prompt.with_failure(&e.to_string());
                    attempt += 1;
                }
                Err(e) => {
                    warn!(agent = self.id(), attempt, kind = e.kind(), error = %e, "Giving up on question");
                    return Err(e);
                }
            }
        };

        debug!(
            agent = self.id(),
            sql = %validated.sql,
            limit = ?validated.limit_action,
            "Executing validated SQL"
        );

        let rows = self
            .executor
            .fetch_rows(&validated.sql, &statement.parameters)
            .await?;

        info!(
            agent = self.id(),
            row_count = rows.len(),
            attempts = attempt,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Data agent: question answered"
        );

        Ok(QueryResult {
            rows,
            sql: validated.sql,
            explanation: statement.explanation,
        })
    }

    /// One LLM round: parse the reply and run it through the allow-list.
    async fn generate(&self, prompt: &ChatPrompt) -> Result<(Statement, ValidatedSql)> {
        let reply = self.llm.complete(prompt).await?;
        let statement: Statement = parse_json_reply(&reply)?;

        let validated = self.validator.validate(&statement.sql)?;

        let needed = highest_placeholder(&validated.sql);
        if needed > statement.parameters.len() {
            return Err(BiError::MalformedLlmResponse(format!(
                "statement uses ${} but only {} parameter(s) were supplied",
                needed,
                statement.parameters.len()
            )));
        }

        Ok((statement, validated))
    }
}

fn highest_placeholder(sql: &str) -> usize {
    tokenizer::tokenize(sql)
        .map(|tokens| {
            tokens
                .iter()
                .filter(|t| t.kind == TokenKind::Placeholder)
                .filter_map(|t| t.text[1..].parse::<usize>().ok())
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::StaticExecutor;
    use crate::llm::testing::ScriptedLlm;
    use serde_json::json;

    fn agent(llm: Arc<ScriptedLlm>, executor: Arc<StaticExecutor>) -> DataAgent {
        DataAgent::new(&profiles::CUSTOMERS, 1000, llm, executor)
    }

    #[tokio::test]
    async fn test_answer_appends_row_cap() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"sql": "SELECT region, COUNT(*) FROM customers GROUP BY region", "parameters": [], "explanation": "Customers per region"}"#,
        ]));
        let executor = Arc::new(StaticExecutor::returning(vec![
            json!({"region": "Europe", "count": 12}),
            json!({"region": "Asia Pacific", "count": 9}),
        ]));

        let result = agent(llm.clone(), executor.clone())
            .answer("How many customers per region?")
            .await
            .unwrap();

        assert_eq!(
            result.sql,
            "SELECT region, COUNT(*) FROM customers GROUP BY region LIMIT 1000"
        );
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.explanation, "Customers per region");
        assert_eq!(executor.calls()[0].0, result.sql);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].system.contains("Table: customers"));
    }

    #[tokio::test]
    async fn test_rejected_sql_is_reprompted_once() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"sql": "SELECT * FROM customers; DROP TABLE customers", "parameters": []}"#,
            r#"{"sql": "SELECT COUNT(*) FROM customers WHERE region = $1", "parameters": ["Europe"]}"#,
        ]));
        let executor = Arc::new(StaticExecutor::returning(vec![json!({"count": 12})]));

        let result = agent(llm.clone(), executor.clone())
            .answer("How many customers in Europe?")
            .await
            .unwrap();

        assert_eq!(result.rows, vec![json!({"count": 12})]);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].user.contains("statement_separator"));

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, vec![json!("Europe")]);
    }

    #[tokio::test]
    async fn test_rejected_twice_never_executes() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"sql": "SELECT * FROM orders"}"#,
            r#"{"sql": "SELECT * FROM customers JOIN orders ON true"}"#,
        ]));
        let executor = Arc::new(StaticExecutor::returning(vec![]));

        let err = agent(llm.clone(), executor.clone())
            .answer("Show me orders")
            .await
            .unwrap_err();

        assert!(matches!(err, BiError::ValidationRejected(_)));
        assert_eq!(err.kind(), "validation_rejected");
        assert_eq!(llm.prompts().len(), 2);
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reply_is_reprompted() {
        let llm = Arc::new(ScriptedLlm::new([
            "Sorry, I can only answer in prose.",
            r#"{"sql": "SELECT AVG(lifetime_value) FROM customers"}"#,
        ]));
        let executor = Arc::new(StaticExecutor::returning(vec![json!({"avg": 310.5})]));

        let result = agent(llm.clone(), executor)
            .answer("Average lifetime value?")
            .await
            .unwrap();

        assert_eq!(result.summary(), "Result: avg: 310.5");
        assert!(llm.prompts()[1].user.contains("rejected"));
    }

    #[tokio::test]
    async fn test_missing_parameters_are_malformed() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"sql": "SELECT * FROM customers WHERE segment = $1"}"#,
            r#"{"sql": "SELECT * FROM customers WHERE segment = $1"}"#,
        ]));
        let executor = Arc::new(StaticExecutor::returning(vec![]));

        let err = agent(llm, executor.clone())
            .answer("Corporate customers")
            .await
            .unwrap_err();

        assert!(matches!(err, BiError::MalformedLlmResponse(_)));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_llm_outage_is_not_retried() {
        let llm = Arc::new(ScriptedLlm::failing("connection refused"));
        let executor = Arc::new(StaticExecutor::returning(vec![]));

        let err = agent(llm.clone(), executor)
            .answer("How many customers?")
            .await
            .unwrap_err();

        assert!(matches!(err, BiError::LlmError(_)));
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_execution_error_is_not_a_rejection() {
        let llm = Arc::new(ScriptedLlm::new([
            r#"{"sql": "SELECT no_such_column FROM customers"}"#,
        ]));
        let executor = Arc::new(StaticExecutor::failing(
            "column \"no_such_column\" does not exist",
        ));

        let err = agent(llm.clone(), executor)
            .answer("Weird question")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "execution_error");
        assert_eq!(llm.prompts().len(), 1);
    }

    #[test]
    fn test_highest_placeholder() {
        assert_eq!(highest_placeholder("SELECT 1"), 0);
        assert_eq!(
            highest_placeholder("SELECT * FROM t WHERE a = $2 AND b = $1 LIMIT LEAST($3, 10)"),
            3
        );
        assert_eq!(highest_placeholder("SELECT '$9' FROM t"), 0);
    }
}
