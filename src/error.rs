//! Unified error model for the temp-table data manager.
//! Every operation surfaces an `AppError`; callers that speak SQL map it to a
//! SQLSTATE through `sqlstate()`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    /// Caller mistake: bad parameters, unknown columns, unsupported keys.
    #[error("{code}: {message}")]
    UserInput { code: String, message: String },
    #[error("{code}: {message}")]
    NotFound { code: String, message: String },
    /// Name or key already taken.
    #[error("{code}: {message}")]
    Conflict { code: String, message: String },
    /// Catalog lookup failed.
    #[error("{code}: {message}")]
    Metadata { code: String, message: String },
    /// Query processing failed (defining queries, validation of procedures).
    #[error("{code}: {message}")]
    Processing { code: String, message: String },
    /// A collaborator (processor, executor) failed underneath us.
    #[error("{code}: {message}")]
    Component { code: String, message: String },
    #[error("{code}: {message}")]
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Metadata { code, .. }
            | AppError::Processing { code, .. }
            | AppError::Component { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Metadata { message, .. }
            | AppError::Processing { message, .. }
            | AppError::Component { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn metadata<S: Into<String>>(code: S, msg: S) -> Self { AppError::Metadata { code: code.into(), message: msg.into() } }
    pub fn processing<S: Into<String>>(code: S, msg: S) -> Self { AppError::Processing { code: code.into(), message: msg.into() } }
    pub fn component<S: Into<String>>(code: S, msg: S) -> Self { AppError::Component { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Usage errors are the caller's fault and never worth retrying.
    pub fn is_usage(&self) -> bool {
        matches!(self, AppError::UserInput { .. } | AppError::Conflict { .. } | AppError::NotFound { .. })
    }

    /// SQLSTATE mapping: (sqlstate, severity, message)
    pub fn sqlstate(&self) -> (&'static str, &'static str, String) {
        let msg = self.message().to_string();
        match self {
            AppError::UserInput { .. } => ("22000", "ERROR", msg),  // data exception
            AppError::NotFound { .. } => ("42P01", "ERROR", msg),   // undefined_table
            AppError::Conflict { .. } => ("42P07", "ERROR", msg),   // duplicate_table
            AppError::Metadata { .. } => ("42000", "ERROR", msg),   // syntax_error_or_access_rule_violation
            AppError::Processing { .. } => ("XX000", "ERROR", msg),
            AppError::Component { .. } => ("58000", "ERROR", msg),  // system_error
            AppError::Internal { .. } => ("XX000", "ERROR", msg),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: an opaque processing failure unless downcast succeeds
        match err.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Processing { code: "processing_error".into(), message: other.to_string() },
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod error_tests;
