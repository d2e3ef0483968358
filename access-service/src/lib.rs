pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AccessConfig;
use crate::services::{
    AccountStore, AuthorizationGate, CodeDelivery, CollectionSource, TokenCodec,
    VerificationFlow, VerificationPolicy,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AccessConfig,
    pub codec: TokenCodec,
    pub gate: Arc<AuthorizationGate>,
    pub flow: Arc<VerificationFlow>,
    pub collections: Arc<dyn CollectionSource>,
    pub auth_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the codec, gate and verification flow from configuration.
    pub fn new(
        config: AccessConfig,
        accounts: Arc<dyn AccountStore>,
        delivery: Arc<dyn CodeDelivery>,
        collections: Arc<dyn CollectionSource>,
    ) -> Self {
        let flow = VerificationFlow::new(
            TokenCodec::new(&config.token),
            accounts,
            delivery,
            VerificationPolicy::from_config(&config),
        );
        Self::with_flow(config, flow, collections)
    }

    /// Like [`AppState::new`] but with a pre-built flow, e.g. one driven by a
    /// test clock.
    pub fn with_flow(
        config: AccessConfig,
        flow: VerificationFlow,
        collections: Arc<dyn CollectionSource>,
    ) -> Self {
        let codec = TokenCodec::new(&config.token);
        let gate = AuthorizationGate::new(codec.clone(), config.gate.clone());

        let auth_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.auth_attempts,
            config.rate_limit.auth_window_seconds,
        );
        let ip_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        );

        Self {
            config,
            codec,
            gate: Arc::new(gate),
            flow: Arc::new(flow),
            collections,
            auth_rate_limiter,
            ip_rate_limiter,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let prefix = state.config.gate.auth_path_prefix.as_str();
    let auth_routes = Router::new()
        .route(&format!("{}/register", prefix), post(handlers::auth::register))
        .route(&format!("{}/login", prefix), post(handlers::auth::login))
        .route(&format!("{}/verify", prefix), post(handlers::auth::verify))
        .route(&format!("{}/refresh", prefix), post(handlers::auth::refresh))
        .layer(from_fn_with_state(
            state.auth_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    // Everything here passes through the authorization gate; the gate itself
    // lets the auth prefix through.
    let gated = Router::new()
        .merge(auth_routes)
        .route("/api/:collection", get(handlers::collections::list_records))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::authorization_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();
    let allowed_origins = cors_origins(&state.config.security.allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(gated)
        .with_state(state)
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    HeaderName::from_static(REQUEST_ID_HEADER),
                ]),
        )
}

fn cors_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter(|origin| {
            let wildcard = origin.as_str() == "*";
            if wildcard {
                tracing::warn!("Wildcard CORS origin ignored; list explicit origins instead");
            }
            !wildcard
        })
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect()
}

/// Liveness probe.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "authorization_enabled": state.config.gate.enabled,
        "pending_verifications": state.flow.pending_sessions(),
    })))
}
