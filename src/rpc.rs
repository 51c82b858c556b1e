//! JSON-RPC 2.0 peer protocol
//!
//! Data agents accept `query` (`{"question": "..."}`) and the task-style
//! alias `tasks/send` (`{"message": {"parts": [{"type": "text", "text": "..."}]}}`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::BiError;
use crate::models::QueryResult;

pub const JSONRPC_VERSION: &str = "2.0";

pub const METHOD_QUERY: &str = "query";
pub const METHOD_TASKS_SEND: &str = "tasks/send";

pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const VALIDATION_REJECTED: i32 = -32001;
    pub const EXECUTION_ERROR: i32 = -32002;
    pub const LLM_MALFORMED: i32 = -32003;
    pub const LLM_UNAVAILABLE: i32 = -32004;
}

//
// ================= Envelopes =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn query(id: impl Into<Value>, question: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: METHOD_QUERY.to_string(),
            params: json!({ "question": question }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<&BiError> for RpcError {
    fn from(err: &BiError) -> Self {
        let data = match err {
            BiError::ValidationRejected(rejection) => json!({
                "kind": err.kind(),
                "reason": rejection.reason.code(),
            }),
            _ => json!({ "kind": err.kind() }),
        };

        Self {
            code: error_code(err),
            message: err.to_string(),
            data: Some(data),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

//
// ================= Error Codes =================
//

pub fn error_code(err: &BiError) -> i32 {
    match err {
        BiError::ValidationRejected(_) => codes::VALIDATION_REJECTED,
        BiError::ExecutionError(_) | BiError::SqlError(_) | BiError::DatabaseError(_) => {
            codes::EXECUTION_ERROR
        }
        BiError::MalformedLlmResponse(_) => codes::LLM_MALFORMED,
        BiError::LlmError(_) => codes::LLM_UNAVAILABLE,
        _ => codes::INTERNAL_ERROR,
    }
}

/// Error kind a peer error code stands for on the calling side.
pub fn kind_for_code(code: i32) -> &'static str {
    match code {
        codes::VALIDATION_REJECTED => "validation_rejected",
        codes::EXECUTION_ERROR => "execution_error",
        codes::LLM_MALFORMED => "llm_malformed",
        codes::LLM_UNAVAILABLE => "llm_error",
        codes::PARSE_ERROR | codes::INVALID_REQUEST | codes::METHOD_NOT_FOUND
        | codes::INVALID_PARAMS => "protocol_error",
        _ => "upstream_error",
    }
}

//
// ================= Methods =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMethod {
    Query,
    TasksSend,
}

impl RpcMethod {
    pub fn parse(method: &str) -> Option<Self> {
        match method {
            METHOD_QUERY => Some(RpcMethod::Query),
            METHOD_TASKS_SEND => Some(RpcMethod::TasksSend),
            _ => None,
        }
    }

    /// Pull the question text out of the method's params.
    pub fn question(&self, params: &Value) -> Result<String, RpcError> {
        let question = match self {
            RpcMethod::Query => params
                .get("question")
                .and_then(Value::as_str)
                .map(str::to_string),
            RpcMethod::TasksSend => params
                .get("message")
                .and_then(|m| m.get("parts"))
                .and_then(Value::as_array)
                .map(|parts| {
                    parts
                        .iter()
                        .filter(|p| {
                            p.get("type").and_then(Value::as_str) == Some("text")
                                || p.get("kind").and_then(Value::as_str) == Some("text")
                        })
                        .filter_map(|p| p.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join(" ")
                }),
        };

        match question.map(|q| q.trim().to_string()) {
            Some(q) if !q.is_empty() => Ok(q),
            _ => Err(RpcError::new(
                codes::INVALID_PARAMS,
                "params must carry a non-empty question",
            )),
        }
    }

    pub fn render(&self, result: &QueryResult) -> Value {
        match self {
            RpcMethod::Query => serde_json::to_value(result).unwrap_or(Value::Null),
            RpcMethod::TasksSend => json!({
                "status": "completed",
                "artifacts": [{
                    "artifactId": "result",
                    "name": "Query Result",
                    "parts": [
                        { "type": "text", "text": result.summary() },
                        {
                            "type": "data",
                            "data": {
                                "rows": result.rows,
                                "sql": result.sql,
                                "explanation": result.explanation,
                            }
                        }
                    ]
                }]
            }),
        }
    }
}

/// Validate the envelope of an incoming request body.
pub fn parse_request(body: &[u8]) -> Result<RpcRequest, RpcResponse> {
    let raw: Value = serde_json::from_slice(body).map_err(|e| {
        RpcResponse::failure(
            Value::Null,
            RpcError::new(codes::PARSE_ERROR, format!("Parse error: {}", e)),
        )
    })?;

    let id = raw.get("id").cloned().unwrap_or(Value::Null);

    let request: RpcRequest = serde_json::from_value(raw).map_err(|e| {
        RpcResponse::failure(
            id.clone(),
            RpcError::new(codes::INVALID_REQUEST, format!("Invalid request: {}", e)),
        )
    })?;

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(RpcResponse::failure(
            id,
            RpcError::new(codes::INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        ));
    }

    Ok(request)
}
