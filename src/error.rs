//! Error taxonomy shared by every layer of the crate.
//!
//! Store and identity failures are never retried. The `commands` layer is
//! the only place these errors are turned into user-facing notices.

use serde::Serialize;
use std::fmt;

use crate::auth::Capability;

pub type Result<T, E = BooksError> = std::result::Result<T, E>;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BooksError {
    /// Required backend credentials are missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    /// The store or identity service answered with a non-success status.
    #[error("{message} (HTTP {status})")]
    Remote { status: u16, message: String },

    /// The request never produced a response.
    #[error("{0}")]
    Network(String),

    /// An expected row is absent. Not a failure of the backend.
    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("not signed in")]
    Unauthenticated,

    #[error("missing capability: {capability}")]
    Forbidden { capability: Capability },

    #[error("export failed: {0}")]
    Export(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl BooksError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Field detail for validation errors, empty for everything else.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::Validation(fields) => fields,
            _ => &[],
        }
    }
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<csv::Error> for BooksError {
    fn from(err: csv::Error) -> Self {
        Self::Export(format!("csv: {err}"))
    }
}

impl From<lopdf::Error> for BooksError {
    fn from(err: lopdf::Error) -> Self {
        Self::Export(format!("pdf: {err}"))
    }
}
