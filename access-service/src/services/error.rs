use service_core::error::AppError;
use thiserror::Error;

use super::accounts::AccountStoreError;
use super::collections::CollectionError;
use super::token::TokenError;

/// Every credential failure renders with this message, whatever the cause.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("Verification code delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("{0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<TokenError> for FlowError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(e) => FlowError::Internal(anyhow::anyhow!(e)),
            other => {
                tracing::debug!(reason = %other, "Token rejected");
                FlowError::Unauthorized
            }
        }
    }
}

impl From<AccountStoreError> for FlowError {
    fn from(err: AccountStoreError) -> Self {
        match err {
            AccountStoreError::AlreadyExists => {
                FlowError::Forbidden("Phone number is already registered".to_string())
            }
            AccountStoreError::Backend(e) => FlowError::Internal(e),
        }
    }
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        match err {
            FlowError::Unauthorized => AppError::Unauthorized(anyhow::anyhow!(UNAUTHORIZED_MESSAGE)),
            FlowError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            FlowError::DeliveryFailed(_) => AppError::ServiceUnavailable(
                "Verification code could not be delivered".to_string(),
            ),
            FlowError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            FlowError::Internal(e) => AppError::InternalError(e),
        }
    }
}

impl From<CollectionError> for AppError {
    fn from(err: CollectionError) -> Self {
        match err {
            CollectionError::NotFound(name) => {
                AppError::NotFound(anyhow::anyhow!("Collection not found: {}", name))
            }
            CollectionError::Query(e) => AppError::BadRequest(anyhow::anyhow!(e.to_string())),
            CollectionError::Backend(e) => AppError::InternalError(e),
        }
    }
}
