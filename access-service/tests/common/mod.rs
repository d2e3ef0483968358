//! Shared setup for access-service integration tests.

#![allow(dead_code)]

use access_service::{
    build_router,
    config::{
        AccessConfig, CollectionsConfig, DeliveryConfig, Environment, GateConfig,
        RateLimitConfig, SecurityConfig, TokenConfig, VerificationConfig,
    },
    models::CapabilityMatrix,
    services::{
        Clock, Collection, InMemoryAccountStore, InMemoryCollections, MockCodeDelivery,
        TokenCodec, VerificationFlow, VerificationPolicy,
    },
    AppState,
};
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use query_engine::{FieldType, Record, Schema};
use secrecy::Secret;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-0123456789abcdef-0123456789";
pub const ISSUER: &str = "access-service-test";
pub const ADMIN_PHONE: &str = "+15550000";

pub fn test_config() -> AccessConfig {
    AccessConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "access-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        token: TokenConfig {
            secret: Secret::new(TEST_SECRET.to_string()),
            issuer: ISSUER.to_string(),
            verification_ttl_seconds: 300,
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
        },
        gate: GateConfig {
            enabled: true,
            auth_path_prefix: "/auth".to_string(),
        },
        verification: VerificationConfig {
            code_length: 6,
            max_attempts: 3,
            sweep_interval_seconds: 60,
            default_capabilities: "GET=users,posts;POST=posts"
                .parse::<CapabilityMatrix>()
                .expect("valid capabilities"),
            admin_phones: vec![ADMIN_PHONE.to_string()],
        },
        delivery: DeliveryConfig {
            notification_service_url: None,
            timeout_seconds: 5,
        },
        collections: CollectionsConfig { seed_path: None },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            auth_attempts: 1000,
            auth_window_seconds: 60,
            global_ip_limit: 1000,
            global_ip_window_seconds: 60,
        },
    }
}

/// A clock tests can move forward.
#[derive(Clone)]
pub struct TestClock(Arc<Mutex<DateTime<Utc>>>);

impl TestClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Utc::now())))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }

    pub fn as_clock(&self) -> Clock {
        let inner = self.0.clone();
        Arc::new(move || *inner.lock().unwrap())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub delivery: Arc<MockCodeDelivery>,
    pub accounts: Arc<InMemoryAccountStore>,
    pub clock: TestClock,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AccessConfig) -> Self {
        let delivery = Arc::new(MockCodeDelivery::new());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let clock = TestClock::new();

        let collections = InMemoryCollections::new();
        collections.insert("users", users_collection());
        collections.insert("posts", posts_collection());

        let flow = VerificationFlow::new(
            TokenCodec::new(&config.token),
            accounts.clone(),
            delivery.clone(),
            VerificationPolicy::from_config(&config),
        )
        .with_clock(clock.as_clock());

        let state = AppState::with_flow(config, flow, Arc::new(collections));
        let router = build_router(state.clone());

        Self {
            router,
            state,
            delivery,
            accounts,
            clock,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (u16, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        read_json(self.router.clone().oneshot(request).await.unwrap()).await
    }

    pub async fn get(&self, uri: &str, bearer: Option<&str>) -> (u16, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = builder.body(Body::empty()).unwrap();
        read_json(self.router.clone().oneshot(request).await.unwrap()).await
    }

    /// Register `phone` and return the verification token.
    pub async fn start_registration(&self, phone: &str) -> String {
        let (status, body) = self
            .post_json("/auth/register", json!({ "phone": phone }))
            .await;
        assert_eq!(status, 200, "register failed: {body}");
        body["verification_token"].as_str().unwrap().to_string()
    }

    /// Register and verify `phone`, returning `(access_token, refresh_token)`.
    pub async fn sign_up(&self, phone: &str) -> (String, String) {
        let token = self.start_registration(phone).await;
        let code = self.delivery.last_code_for(phone).unwrap();
        let (status, body) = self
            .post_json(
                "/auth/verify",
                json!({ "code": code, "verification_token": token }),
            )
            .await;
        assert_eq!(status, 200, "verify failed: {body}");
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }
}

pub async fn read_json(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn records(values: Vec<Value>) -> Vec<Record> {
    values
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

pub fn users_collection() -> Collection {
    Collection {
        schema: Schema::new(
            "id",
            [
                ("id", FieldType::Number),
                ("name", FieldType::String),
                ("surname", FieldType::String),
                ("age", FieldType::Number),
            ],
        )
        .unwrap(),
        records: records(vec![
            json!({"id": 1, "name": "Ada", "surname": "Lovelace", "age": 36}),
            json!({"id": 2, "name": "Mia", "surname": "Zhou", "age": 12}),
            json!({"id": 3, "name": "Mia", "surname": "Adams", "age": 24}),
            json!({"id": 4, "name": "Leo", "surname": "Brown", "age": 18}),
            json!({"id": 5, "name": "Zoe", "surname": "Clark", "age": 11}),
            json!({"id": 6, "name": "Leo", "surname": "Brown", "age": 20}),
        ]),
    }
}

pub fn posts_collection() -> Collection {
    Collection {
        schema: Schema::new(
            "id",
            [
                ("id", FieldType::String),
                ("title", FieldType::String),
                ("published", FieldType::Timestamp),
            ],
        )
        .unwrap(),
        records: records(vec![
            json!({"id": "p1", "title": "Hello", "published": "2024-01-10T09:00:00Z"}),
            json!({"id": "p2", "title": "Again", "published": "2024-03-02T12:30:00Z"}),
        ]),
    }
}
