//! SQL safety layer
//!
//! Generated statements are untrusted until [`SqlValidator`] accepts them.

pub mod tokenizer;
pub mod validator;

pub use validator::{
    validate, AllowList, LimitAction, Rejection, RejectionReason, SqlValidator, ValidatedSql,
    ValidationResult, DEFAULT_FORBIDDEN_KEYWORDS, DEFAULT_MAX_ROWS,
};
