//! Aggregation and answer synthesis

use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::llm::{prompts, ChatPrompt, LlmClient};
use crate::models::{AgentOutcome, QueryResult};

pub const COULD_NOT_ANSWER: &str = "I could not answer that question.";

/// Combine successful result sets. With a join key and two or more sets,
/// rows are inner-joined on the key; otherwise they are concatenated.
/// Returns the rows and whether a join was performed.
pub fn combine_rows(results: &[&QueryResult], join_key: Option<&str>) -> (Vec<Value>, bool) {
    match join_key {
        Some(key) if results.len() >= 2 => (join_rows(results, key), true),
        _ => (
            results.iter().flat_map(|r| r.rows.iter().cloned()).collect(),
            false,
        ),
    }
}

/// Inner join on `key`. The first set drives row order; each later set must
/// contribute a matching row, whose fields are merged in without
/// overwriting fields already present.
pub fn join_rows(results: &[&QueryResult], key: &str) -> Vec<Value> {
    let Some((first, rest)) = results.split_first() else {
        return Vec::new();
    };

    let indexes: Vec<HashMap<String, &Map<String, Value>>> = rest
        .iter()
        .map(|result| {
            let mut index = HashMap::new();
            for row in result.rows.iter().filter_map(Value::as_object) {
                if let Some(k) = key_of(row, key) {
                    index.entry(k).or_insert(row);
                }
            }
            index
        })
        .collect();

    let mut joined = Vec::new();
    'rows: for row in first.rows.iter().filter_map(Value::as_object) {
        let Some(k) = key_of(row, key) else {
            continue;
        };

        let mut merged = row.clone();
        for index in &indexes {
            let Some(other) = index.get(&k) else {
                continue 'rows;
            };
            for (field, value) in other.iter() {
                merged
                    .entry(field.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        joined.push(Value::Object(merged));
    }

    debug!(key, driving_rows = first.rows.len(), joined = joined.len(), "Rows joined");
    joined
}

/// Join keys compare by JSON text, so `42` and `"42"` do not match.
fn key_of(row: &Map<String, Value>, key: &str) -> Option<String> {
    match row.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Deterministic answer used when synthesis is unavailable.
pub fn fallback_answer(outcomes: &[AgentOutcome]) -> String {
    outcomes
        .iter()
        .map(|outcome| match outcome {
            AgentOutcome::Success { agent, result, .. } => {
                format!("{}: {}", agent, result.summary())
            }
            AgentOutcome::Failed { agent, error, .. } => {
                format!("{}: no data ({})", agent, error.message)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn could_not_answer(outcomes: &[AgentOutcome]) -> String {
    let reasons: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            AgentOutcome::Failed { agent, error, .. } => {
                Some(format!("- {} ({}): {}", agent, error.kind, error.message))
            }
            AgentOutcome::Success { .. } => None,
        })
        .collect();

    if reasons.is_empty() {
        COULD_NOT_ANSWER.to_string()
    } else {
        format!("{}\n{}", COULD_NOT_ANSWER, reasons.join("\n"))
    }
}

/// Ask the LLM for a natural-language answer, falling back to a plain
/// summary if the call fails or comes back empty.
pub async fn synthesize(llm: &dyn LlmClient, question: &str, outcomes: &[AgentOutcome]) -> String {
    let prompt = ChatPrompt::text(
        prompts::SYNTHESIS_SYSTEM_PROMPT,
        prompts::synthesis_user_prompt(question, outcomes),
    );

    match llm.complete(&prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!("Synthesis returned empty text - using fallback summary");
            fallback_answer(outcomes)
        }
        Err(e) => {
            warn!(error = %e, "Synthesis failed - using fallback summary");
            fallback_answer(outcomes)
        }
    }
}
