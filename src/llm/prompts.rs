//! Prompt templates

use chrono::NaiveDate;

use crate::agent::profiles::TableProfile;
use crate::models::{AgentCard, AgentOutcome};

const SQL_RULES: &str = r#"You are a SQL expert. Generate PostgreSQL queries that answer business questions.

Rules:
1. Only generate a single SELECT statement. No modifications, no semicolons, no comments.
2. Query only the table described below. Never reference any other table or schema.
3. Use $1, $2, ... placeholders for every user-provided value.
4. Parameters must be LITERAL values (strings, numbers, ISO 8601 dates), never SQL expressions.
5. For relative dates ("last 3 months"), compute the actual date from today's date and pass it as a parameter.
6. Use aggregate functions (COUNT, SUM, AVG, MIN, MAX) for summary questions.
7. Include ORDER BY for sorted results and LIMIT for "top N" questions.
8. Use PostgreSQL date functions (DATE_TRUNC, EXTRACT) in the SQL itself.

Respond with ONLY a JSON object:
{
  "sql": "SELECT ... WHERE column = $1",
  "parameters": ["value for $1"],
  "explanation": "one sentence describing the query"
}"#;

/// System prompt for a data agent.
pub fn sql_system_prompt(profile: &TableProfile, today: NaiveDate) -> String {
    format!("{}\n\n{}", SQL_RULES, schema_description(profile, today))
}

pub fn schema_description(profile: &TableProfile, today: NaiveDate) -> String {
    let mut lines = vec![
        format!("Table: {}", profile.table),
        format!("Today's date: {}", today.format("%Y-%m-%d")),
        String::new(),
        "Columns:".to_string(),
    ];

    for column in profile.columns {
        let mut line = format!("- {}: {}", column.name, column.sql_type);
        if !column.description.is_empty() {
            line.push_str(&format!(" - {}", column.description));
        }
        if !column.allowed_values.is_empty() {
            line.push_str(&format!(" [Values: {}]", column.allowed_values.join(", ")));
        }
        lines.push(line);
    }

    lines.join("\n")
}

pub fn sql_user_prompt(question: &str) -> String {
    format!("Question: {}", question)
}

const ROUTER_RULES: &str = r#"You are the query router of a business-intelligence system.
Decide which data agents must be asked to answer the user's question.
Each agent can only read its own table.

Rules:
- Use only agent ids from the list below.
- Give each selected agent a self-contained sub-question about its own table.
- Select an agent at most once.
- If rows from several agents must be correlated, set "join_key" to the shared column (e.g. "customer_id"); otherwise null.

Respond with ONLY a JSON object:
{
  "routes": [{"agent": "<agent id>", "question": "<sub-question>"}],
  "join_key": null
}"#;

pub fn router_system_prompt(agents: &[AgentCard]) -> String {
    format!("{}\n\nAvailable agents:\n{}", ROUTER_RULES, capabilities(agents))
}

/// One block per agent: id, table, description, skills with examples.
pub fn capabilities(agents: &[AgentCard]) -> String {
    agents
        .iter()
        .map(|agent| {
            let mut block = format!(
                "- id: {} (table: {})\n  {}",
                agent.id, agent.table, agent.description
            );
            for skill in &agent.skills {
                block.push_str(&format!("\n  * {}: {}", skill.name, skill.description));
                if let Some(example) = skill.examples.first() {
                    block.push_str(&format!(" (e.g. \"{}\")", example));
                }
            }
            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn router_user_prompt(question: &str) -> String {
    format!("Question: {}", question)
}

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a BI assistant. Turn the data results into a clear, \
concise natural-language answer. Include key numbers. Be direct and factual. \
If some data sources failed, say which information is missing instead of guessing.";

/// Rows shown to the model per agent.
const SYNTHESIS_ROW_SAMPLE: usize = 10;

pub fn synthesis_user_prompt(question: &str, outcomes: &[AgentOutcome]) -> String {
    let mut out = format!("Question: {}\n\nResults:\n", question);

    for outcome in outcomes {
        match outcome {
            AgentOutcome::Success { agent, result, .. } => {
                out.push_str(&format!(
                    "- {} ({} rows): {}\n",
                    agent,
                    result.row_count(),
                    result.summary()
                ));
                for row in result.rows.iter().take(SYNTHESIS_ROW_SAMPLE) {
                    out.push_str(&format!("    {}\n", row));
                }
                if result.row_count() > SYNTHESIS_ROW_SAMPLE {
                    out.push_str("    ...\n");
                }
            }
            AgentOutcome::Failed { agent, error, .. } => {
                out.push_str(&format!("- {}: FAILED ({})\n", agent, error.message));
            }
        }
    }

    out
}
