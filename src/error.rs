//! Engine error taxonomy
//!
//! Every operation of the orchestrator returns `CoreError`. Error codes and
//! HTTP status suggestions are stable and used verbatim by the API layer.

use thiserror::Error;

use crate::authz::Action;
use crate::core_types::{CaseId, Role, UserId};

/// Engine error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Malformed or missing input
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Actor lacks permission for the action in the current state
    #[error("Actor {actor} ({role}) is not allowed to {action} on case {}", display_case(.case_id))]
    Authorization {
        actor: UserId,
        role: Role,
        case_id: Option<CaseId>,
        action: Action,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Illegal transition, or a concurrent writer already won
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The payment gateway returned a failure
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// Storage failure; the transaction was rolled back
    #[error("Persistence error: {0}")]
    Persistence(String),
}

fn display_case(case_id: &Option<CaseId>) -> String {
    case_id.map(|c| c.to_string()).unwrap_or_else(|| "-".into())
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Authorization { .. } => "AUTHORIZATION_ERROR",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::Conflict(_) => "CONFLICT",
            CoreError::Gateway(_) => "EXTERNAL_GATEWAY_ERROR",
            CoreError::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            CoreError::Validation(_) => 400,
            CoreError::Authorization { .. } => 401,
            CoreError::NotFound { .. } => 404,
            CoreError::Conflict(_) => 409,
            CoreError::Gateway(_) => 502,
            CoreError::Persistence(_) => 500,
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return CoreError::Conflict(format!("Unique constraint violated: {}", db_err));
        }
        CoreError::Persistence(e.to_string())
    }
}
