//! Typed errors and HTTP mapping.

use crate::response::{reply, Envelope};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Raised while deriving a model descriptor from a record definition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("type '{0}' is not a record")]
    NotARecord(String),
    #[error("record '{0}' declares no persistent fields")]
    NoPersistentFields(String),
    #[error("record '{record}' declares column '{column}' more than once")]
    DuplicateColumn { record: String, column: String },
    #[error("record '{0}' declares more than one auto-increment field")]
    MultipleAutoIncrement(String),
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("duplicate resource name: {0}")]
    DuplicateResource(String),
    #[error("duplicate resource prefix: {0}")]
    DuplicatePrefix(String),
    #[error("resource '{resource}' references unknown field '{field}'")]
    UnknownField { resource: String, field: String },
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("invalid route for '{operation}': {reason}")]
    InvalidRoute { operation: String, reason: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Errors produced while serving a request. Every variant renders as the
/// standard envelope with a non-zero code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("unsupported operator in query parameter '{0}'")]
    UnsupportedOperator(String),
    #[error("missing primary key: {0}")]
    MissingPrimaryKey(String),
    #[error("operation not registered: {0}")]
    NotRegistered(String),
    #[error("field not allowed: {0}")]
    FieldNotAllowed(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Collaborator failure; the message is passed through unaltered.
    #[error("{0}")]
    Execution(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Schema(_) | AppError::Execution(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotRegistered(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedOperator(_)
            | AppError::MissingPrimaryKey(_)
            | AppError::FieldNotAllowed(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::failure(i32::from(self.status().as_u16()), self.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Execution(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        reply(self.status(), self.to_envelope()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::UnsupportedOperator("foo__bogus".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::NotRegistered("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Execution("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Schema(SchemaError::NotARecord("i64".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_execution_message_passes_through() {
        let err = AppError::Execution("relation \"users\" does not exist".into());
        let env = err.to_envelope();
        assert_eq!(env.code, 500);
        assert_eq!(env.message, "relation \"users\" does not exist");
    }

    #[test]
    fn test_unsupported_operator_names_parameter() {
        let env = AppError::UnsupportedOperator("foo__bogus".into()).to_envelope();
        assert_eq!(env.code, 400);
        assert!(env.message.contains("foo__bogus"));
    }
}
