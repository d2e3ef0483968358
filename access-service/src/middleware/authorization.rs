use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use service_core::error::AppError;

use crate::services::error::UNAUTHORIZED_MESSAGE;
use crate::services::metrics::record_authorization;
use crate::services::{Decision, DenyReason};
use crate::AppState;

/// Run the authorization gate before any application handler.
///
/// Denials are always 401 with a fixed message; the request is passed on
/// untouched when allowed.
pub async fn authorization_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let decision = state.gate.decide(
        req.method().as_str(),
        req.uri().path(),
        authorization,
        Utc::now(),
    );
    record_authorization(decision.outcome());

    match decision {
        Decision::Allow(_) => Ok(next.run(req).await),
        Decision::Deny(reason) => {
            match &reason {
                DenyReason::InvalidCredentials(e) => {
                    tracing::debug!(reason = %e, path = %req.uri().path(), "Request denied")
                }
                other => {
                    tracing::debug!(reason = ?other, path = %req.uri().path(), "Request denied")
                }
            }
            Err(AppError::Unauthorized(anyhow::anyhow!(UNAUTHORIZED_MESSAGE)))
        }
    }
}
