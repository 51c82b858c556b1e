//! Route planning
//!
//! One LLM call decides which agents to ask and with what sub-question.
//! The reply is checked against the discovered set before anything is sent.

use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::discovery::DiscoveredAgent;
use crate::error::BiError;
use crate::llm::{parse_json_reply, prompts, ChatPrompt, LlmClient};
use crate::models::{AgentCard, Route, RoutePlan};
use crate::Result;

#[derive(Debug, Deserialize)]
struct RawRoute {
    agent: String,
    #[serde(default)]
    question: String,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    routes: Vec<RawRoute>,
    #[serde(default)]
    join_key: Option<String>,
}

pub async fn plan_routes(
    llm: &dyn LlmClient,
    agents: &[DiscoveredAgent],
    question: &str,
) -> Result<RoutePlan> {
    let cards: Vec<AgentCard> = agents.iter().map(|a| a.card.clone()).collect();
    let base_prompt = ChatPrompt::json(
        prompts::router_system_prompt(&cards),
        prompts::router_user_prompt(question),
    );

    match route_once(llm, &base_prompt, agents, question).await {
        Err(e) if e.is_reprompt_worthy() => {
            warn!(error = %e, "Route plan unusable - re-prompting");
            let retry = base_prompt.with_failure(&e.to_string());
            route_once(llm, &retry, agents, question).await
        }
        other => other,
    }
}

async fn route_once(
    llm: &dyn LlmClient,
    prompt: &ChatPrompt,
    agents: &[DiscoveredAgent],
    question: &str,
) -> Result<RoutePlan> {
    let reply = llm.complete(prompt).await?;
    let raw: RawPlan = parse_json_reply(&reply)?;
    let plan = check_plan(raw, agents, question)?;

    debug!(
        agents = ?plan.routes.iter().map(|r| r.agent.as_str()).collect::<Vec<_>>(),
        join_key = ?plan.join_key,
        "Route plan accepted"
    );

    Ok(plan)
}

fn check_plan(raw: RawPlan, agents: &[DiscoveredAgent], question: &str) -> Result<RoutePlan> {
    if raw.routes.is_empty() {
        debug!("Router selected no agents - asking all of them");
        return Ok(RoutePlan {
            routes: agents
                .iter()
                .map(|a| Route {
                    agent: a.id().to_string(),
                    question: question.to_string(),
                })
                .collect(),
            join_key: None,
        });
    }

    let mut seen = HashSet::new();
    let mut routes = Vec::with_capacity(raw.routes.len());

    for route in raw.routes {
        let wanted = route.agent.trim();
        let agent = agents
            .iter()
            .find(|a| a.id().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| BiError::UnknownAgent(wanted.to_string()))?;

        if !seen.insert(agent.id()) {
            return Err(BiError::MalformedLlmResponse(format!(
                "agent '{}' selected more than once",
                agent.id()
            )));
        }

        let sub_question = route.question.trim();
        routes.push(Route {
            agent: agent.id().to_string(),
            question: if sub_question.is_empty() {
                question.to_string()
            } else {
                sub_question.to_string()
            },
        });
    }

    let join_key = raw
        .join_key
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    Ok(RoutePlan { routes, join_key })
}
