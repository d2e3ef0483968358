use thiserror::Error;

use crate::schema::FieldType;

/// Errors produced while parsing or evaluating a collection query.
///
/// Every variant is a client input problem and maps to `400 Bad Request` at
/// the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    #[error("Unknown field '{0}'")]
    UnknownField(String),

    #[error("Value {value} for field '{field}' is not a valid {expected}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        value: String,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl QueryError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        QueryError::MalformedQuery(msg.into())
    }
}
