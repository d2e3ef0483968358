use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

use crate::models::CapabilityMatrix;

/// Minimum signing secret length for HS256.
pub const MIN_SECRET_BYTES: usize = 32;
pub const MAX_VERIFICATION_TTL_SECONDS: i64 = 60 * 60;
pub const MAX_ACCESS_TTL_MINUTES: i64 = 24 * 60;
pub const MAX_REFRESH_TTL_DAYS: i64 = 365;

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub token: TokenConfig,
    pub gate: GateConfig,
    pub verification: VerificationConfig,
    pub delivery: DeliveryConfig,
    pub collections: CollectionsConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: Secret<String>,
    pub issuer: String,
    pub verification_ttl_seconds: i64,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Operational kill switch; when false every request is allowed.
    pub enabled: bool,
    /// Requests under this prefix skip authorization.
    pub auth_path_prefix: String,
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub code_length: usize,
    pub max_attempts: u32,
    pub sweep_interval_seconds: u64,
    pub default_capabilities: CapabilityMatrix,
    pub admin_phones: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub notification_service_url: Option<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct CollectionsConfig {
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub auth_attempts: u32,
    pub auth_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AccessConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("access-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            token: TokenConfig {
                secret: Secret::new(get_env("TOKEN_SECRET", None, is_prod)?),
                issuer: get_env("TOKEN_ISSUER", Some("access-service"), is_prod)?,
                verification_ttl_seconds: parse_env(
                    "VERIFICATION_TOKEN_TTL_SECONDS",
                    Some("300"),
                    is_prod,
                )?,
                access_ttl_minutes: parse_env("ACCESS_TOKEN_TTL_MINUTES", Some("15"), is_prod)?,
                refresh_ttl_days: parse_env("REFRESH_TOKEN_TTL_DAYS", Some("30"), is_prod)?,
            },
            gate: GateConfig {
                enabled: parse_env("AUTHORIZATION_ENABLED", Some("true"), is_prod)?,
                auth_path_prefix: get_env("AUTH_PATH_PREFIX", Some("/auth"), is_prod)?,
            },
            verification: VerificationConfig {
                code_length: parse_env("VERIFICATION_CODE_LENGTH", Some("6"), is_prod)?,
                max_attempts: parse_env("VERIFICATION_MAX_ATTEMPTS", Some("5"), is_prod)?,
                sweep_interval_seconds: parse_env(
                    "SESSION_SWEEP_INTERVAL_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
                default_capabilities: parse_env(
                    "DEFAULT_CAPABILITIES",
                    Some("GET=users,posts;POST=posts"),
                    is_prod,
                )?,
                admin_phones: split_list(&get_env("ADMIN_PHONES", Some(""), is_prod)?),
            },
            delivery: DeliveryConfig {
                notification_service_url: get_optional_env("NOTIFICATION_SERVICE_URL"),
                timeout_seconds: parse_env("NOTIFICATION_TIMEOUT_SECONDS", Some("10"), is_prod)?,
            },
            collections: CollectionsConfig {
                seed_path: get_optional_env("COLLECTIONS_SEED_PATH"),
            },
            security: SecurityConfig {
                allowed_origins: split_list(&get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?),
            },
            rate_limit: RateLimitConfig {
                auth_attempts: parse_env("RATE_LIMIT_AUTH_ATTEMPTS", Some("10"), is_prod)?,
                auth_window_seconds: parse_env(
                    "RATE_LIMIT_AUTH_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", Some("100"), is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    Some("60"),
                    is_prod,
                )?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.token.secret.expose_secret().len() < MIN_SECRET_BYTES {
            return Err(config_error(format!(
                "TOKEN_SECRET must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }

        if self.token.issuer.trim().is_empty() {
            return Err(config_error("TOKEN_ISSUER cannot be empty"));
        }

        check_ttl(
            "VERIFICATION_TOKEN_TTL_SECONDS",
            self.token.verification_ttl_seconds,
            MAX_VERIFICATION_TTL_SECONDS,
        )?;
        check_ttl(
            "ACCESS_TOKEN_TTL_MINUTES",
            self.token.access_ttl_minutes,
            MAX_ACCESS_TTL_MINUTES,
        )?;
        check_ttl(
            "REFRESH_TOKEN_TTL_DAYS",
            self.token.refresh_ttl_days,
            MAX_REFRESH_TTL_DAYS,
        )?;

        let prefix = &self.gate.auth_path_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(config_error(format!(
                "AUTH_PATH_PREFIX must look like /segment, got {:?}",
                prefix
            )));
        }

        if !(4..=10).contains(&self.verification.code_length) {
            return Err(config_error("VERIFICATION_CODE_LENGTH must be between 4 and 10"));
        }

        if self.verification.max_attempts == 0 {
            return Err(config_error("VERIFICATION_MAX_ATTEMPTS must be at least 1"));
        }

        if self.verification.sweep_interval_seconds == 0 {
            return Err(config_error("SESSION_SWEEP_INTERVAL_SECONDS must be at least 1"));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(config_error("Wildcard CORS origin is not allowed in production"));
            }

            if self.delivery.notification_service_url.is_none() {
                return Err(config_error(
                    "NOTIFICATION_SERVICE_URL is required in production",
                ));
            }

            if !self.gate.enabled {
                tracing::error!("Authorization is DISABLED in production");
            }
        }

        Ok(())
    }
}

fn check_ttl(key: &str, value: i64, max: i64) -> Result<(), AppError> {
    if value <= 0 || value > max {
        return Err(config_error(format!(
            "{} must be between 1 and {}, got {}",
            key, max, value
        )));
    }
    Ok(())
}

fn config_error(message: impl Into<String>) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message.into()))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .parse()
        .map_err(|e: T::Err| config_error(format!("Invalid value for {}: {}", key, e)))
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(config_error(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else {
                default.map(|s| s.to_string()).ok_or_else(|| {
                    config_error(format!("{} is required but not set", key))
                })
            }
        }
    }
}
