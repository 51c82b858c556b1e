//! Conversational BI agents
//!
//! Natural-language questions over a small e-commerce dataset:
//! - Data agents (customers, orders, products) turn a question into one
//!   parameterized SELECT, check it against a per-table allow-list, run it
//!   read-only and return rows
//! - The orchestrator discovers data agents, routes sub-questions to them
//!   in parallel, joins their rows and synthesizes an answer
//!
//! DATA AGENT:   QUESTION → SQL → VALIDATE → EXECUTE → ROWS
//! ORCHESTRATOR: QUESTION → ROUTE → FAN OUT → JOIN → SYNTHESIZE

pub mod agent;
pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod rpc;
pub mod sql;

pub use error::{BiError, Result};

// Re-export common types
pub use models::*;
pub use sql::{validate, AllowList, Rejection, RejectionReason, SqlValidator, ValidationResult};
