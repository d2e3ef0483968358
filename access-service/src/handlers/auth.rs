use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::auth::{
    PhoneRequest, RefreshRequest, RefreshResponse, TokenPairResponse, VerificationResponse,
    VerifyRequest,
};
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<PhoneRequest>,
) -> Result<Json<VerificationResponse>, AppError> {
    let response = state.flow.register(&payload.phone).await?;
    Ok(Json(response))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<PhoneRequest>,
) -> Result<Json<VerificationResponse>, AppError> {
    let response = state.flow.login(&payload.phone).await?;
    Ok(Json(response))
}

/// POST /auth/verify
pub async fn verify(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<VerifyRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    let response = state
        .flow
        .verify(&payload.code, &payload.verification_token)
        .await?;
    Ok(Json(response))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let response = state.flow.refresh(&payload.refresh_token).await?;
    Ok(Json(response))
}
