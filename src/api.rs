//! HTTP servers
//!
//! Data agents speak JSON-RPC on `/rpc` and publish their card for discovery.
//! The orchestrator exposes a small REST API for asking questions.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::DataAgent;
use crate::models::AgentCard;
use crate::orchestrator::Orchestrator;
use crate::rpc::{self, codes, RpcError, RpcMethod, RpcResponse};

//
// ================= Response Wrapper =================
//

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

//
// ================= Data Agent Server =================
//

#[derive(Clone)]
pub struct AgentState {
    pub agent: Arc<DataAgent>,
    /// URL advertised on the agent card.
    pub public_url: String,
}

async fn agent_card(State(state): State<AgentState>) -> Json<AgentCard> {
    Json(state.agent.card(&state.public_url))
}

async fn agent_health(State(state): State<AgentState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "agent": state.agent.id(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// JSON-RPC endpoint. Protocol and application errors are both reported
/// in the JSON-RPC envelope with HTTP 200.
async fn handle_rpc(State(state): State<AgentState>, body: Bytes) -> Json<RpcResponse> {
    let request = match rpc::parse_request(&body) {
        Ok(request) => request,
        Err(response) => return Json(response),
    };

    let Some(method) = RpcMethod::parse(&request.method) else {
        return Json(RpcResponse::failure(
            request.id,
            RpcError::new(
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
            ),
        ));
    };

    let question = match method.question(&request.params) {
        Ok(question) => question,
        Err(error) => return Json(RpcResponse::failure(request.id, error)),
    };

    match state.agent.answer(&question).await {
        Ok(result) => Json(RpcResponse::success(request.id, method.render(&result))),
        Err(e) => {
            warn!(agent = state.agent.id(), kind = e.kind(), error = %e, "RPC request failed");
            Json(RpcResponse::failure(request.id, RpcError::from(&e)))
        }
    }
}

pub fn create_agent_router(agent: Arc<DataAgent>, public_url: String) -> Router {
    let state = AgentState { agent, public_url };

    Router::new()
        .route("/.well-known/agent-card.json", get(agent_card))
        .route("/rpc", post(handle_rpc))
        .route("/a2a/tasks/send", post(handle_rpc))
        .route("/health", get(agent_health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

//
// ================= Orchestrator Server =================
//

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AskRequest {
    pub question: String,
}

#[derive(Clone)]
pub struct OrchestratorState {
    pub orchestrator: Arc<Orchestrator>,
}

async fn orchestrator_health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn ask(
    State(state): State<OrchestratorState>,
    Json(req): Json<AskRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let question = req.question.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("Question must not be empty".into())),
        );
    }

    info!("Received question: {}", question);

    match state.orchestrator.ask(question).await {
        Ok(answer) => (StatusCode::OK, Json(ApiResponse::success(answer))),
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Question could not be answered");
            let status = match e.kind() {
                "discovery_error" | "upstream_error" | "llm_error" => StatusCode::BAD_GATEWAY,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            (
                status,
                Json(ApiResponse::error(format!(
                    "I could not answer that question: {}",
                    e
                ))),
            )
        }
    }
}

async fn list_agents(State(state): State<OrchestratorState>) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.agents().await {
        Ok(agents) => {
            let cards: Vec<&AgentCard> = agents.iter().map(|a| &a.card).collect();
            (StatusCode::OK, Json(ApiResponse::success(cards)))
        }
        Err(e) => (
            StatusCode::BAD_GATEWAY,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

pub fn create_orchestrator_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = OrchestratorState { orchestrator };

    Router::new()
        .route("/health", get(orchestrator_health))
        .route("/api/ask", post(ask))
        .route("/api/agents", get(list_agents))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

//
// ================= Server Startup =================
//

pub async fn start_server(
    router: Router,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::profiles;
    use crate::database::testing::StaticExecutor;
    use crate::llm::testing::ScriptedLlm;
    use crate::orchestrator::client::testing::{FakeReply, FakeTransport};
    use crate::models::QueryResult;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;

    fn agent_router(replies: &[&str], rows: Vec<Value>) -> Router {
        let agent = DataAgent::new(
            &profiles::ORDERS,
            1000,
            Arc::new(ScriptedLlm::new(replies.iter().copied())),
            Arc::new(StaticExecutor::returning(rows)),
        );
        create_agent_router(Arc::new(agent), "http://localhost:8002/".to_string())
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_agent_card_endpoint() {
        let request = Request::builder()
            .uri("/.well-known/agent-card.json")
            .body(Body::empty())
            .unwrap();
        let (status, card) = call(agent_router(&[], vec![]), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(card["id"], "orders");
        assert_eq!(card["url"], "http://localhost:8002/");
        assert_eq!(card["capabilities"]["pushNotifications"], false);
    }

    #[tokio::test]
    async fn test_rpc_query() {
        let router = agent_router(
            &[r#"{"sql": "SELECT SUM(total_amount) AS revenue FROM orders", "explanation": "Total revenue"}"#],
            vec![json!({"revenue": 1234.5})],
        );
        let (status, body) = call(
            router,
            post_json(
                "/rpc",
                r#"{"jsonrpc": "2.0", "id": "1", "method": "query", "params": {"question": "Total revenue?"}}"#,
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "1");
        assert_eq!(body["result"]["rows"][0]["revenue"], 1234.5);
        assert_eq!(
            body["result"]["sql"],
            "SELECT SUM(total_amount) AS revenue FROM orders LIMIT 1000"
        );
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_rpc_validation_rejection() {
        let router = agent_router(
            &[
                r#"{"sql": "DELETE FROM orders"}"#,
                r#"{"sql": "SELECT * FROM customers"}"#,
            ],
            vec![],
        );
        let (_, body) = call(
            router,
            post_json(
                "/rpc",
                r#"{"jsonrpc": "2.0", "id": 9, "method": "query", "params": {"question": "Wipe orders"}}"#,
            ),
        )
        .await;

        assert_eq!(body["error"]["code"], codes::VALIDATION_REJECTED);
        assert_eq!(body["error"]["data"]["reason"], "disallowed_table");
    }

    #[tokio::test]
    async fn test_rpc_protocol_errors() {
        let (_, body) = call(agent_router(&[], vec![]), post_json("/rpc", "{oops")).await;
        assert_eq!(body["error"]["code"], codes::PARSE_ERROR);

        let (_, body) = call(
            agent_router(&[], vec![]),
            post_json("/rpc", r#"{"jsonrpc": "2.0", "id": 2, "method": "delete"}"#),
        )
        .await;
        assert_eq!(body["error"]["code"], codes::METHOD_NOT_FOUND);

        let (_, body) = call(
            agent_router(&[], vec![]),
            post_json("/rpc", r#"{"jsonrpc": "2.0", "id": 3, "method": "query", "params": {}}"#),
        )
        .await;
        assert_eq!(body["error"]["code"], codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_tasks_send_alias() {
        let router = agent_router(
            &[r#"{"sql": "SELECT COUNT(*) AS pending FROM orders WHERE status = $1", "parameters": ["pending"]}"#],
            vec![json!({"pending": 17})],
        );
        let (_, body) = call(
            router,
            post_json(
                "/a2a/tasks/send",
                r#"{"jsonrpc": "2.0", "id": "t", "method": "tasks/send",
                    "params": {"message": {"role": "user", "parts": [{"type": "text", "text": "Pending orders?"}]}}}"#,
            ),
        )
        .await;

        let parts = &body["result"]["artifacts"][0]["parts"];
        assert_eq!(parts[0]["text"], "Result: pending: 17");
        assert_eq!(parts[1]["data"]["rows"][0]["pending"], 17);
    }

    fn orchestrator_router(transport: FakeTransport, llm: ScriptedLlm) -> Router {
        let orchestrator = Orchestrator::new(
            vec!["http://orders:8002".to_string()],
            Arc::new(transport),
            Arc::new(llm),
            Duration::from_secs(1),
        );
        create_orchestrator_router(Arc::new(orchestrator))
    }

    #[tokio::test]
    async fn test_ask_endpoint() {
        let transport = FakeTransport::new().with_agent(
            "http://orders:8002",
            profiles::ORDERS.card("http://orders:8002/"),
            FakeReply::Rows(QueryResult {
                rows: vec![json!({"orders": 310})],
                sql: "SELECT COUNT(*) AS orders FROM orders LIMIT 1000".to_string(),
                explanation: String::new(),
            }),
        );
        let llm = ScriptedLlm::new([
            r#"{"routes": [{"agent": "orders", "question": "How many orders?"}]}"#,
            "There are 310 orders.",
        ]);

        let (status, body) = call(
            orchestrator_router(transport, llm),
            post_json("/api/ask", r#"{"question": "How many orders do we have?"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["answer"], "There are 310 orders.");
        assert_eq!(body["data"]["sources"][0], "orders");
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_question() {
        let (status, body) = call(
            orchestrator_router(FakeTransport::new(), ScriptedLlm::new(Vec::<String>::new())),
            post_json("/api/ask", r#"{"question": "   "}"#),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_agents_endpoint_reports_discovery_failure() {
        let request = Request::builder()
            .uri("/api/agents")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(
            orchestrator_router(FakeTransport::new(), ScriptedLlm::new(Vec::<String>::new())),
            request,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("Discovery error"));
    }
}
