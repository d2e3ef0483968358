//! Bearer-token authorization for resource requests.

use chrono::{DateTime, Utc};
use std::borrow::Cow;

use super::token::{TokenCodec, TokenError};
use crate::config::GateConfig;
use crate::models::{Level, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowReason {
    /// Authorization is switched off.
    Disabled,
    /// Path is under the authentication prefix.
    AuthEndpoint,
    /// `acs[method]` contains the action.
    Capability,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    MissingCredentials,
    InvalidCredentials(TokenError),
    NotPermitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(AllowReason),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    /// Metric label for this decision.
    pub fn outcome(&self) -> &'static str {
        match self {
            Decision::Allow(AllowReason::Disabled) => "allow_disabled",
            Decision::Allow(AllowReason::AuthEndpoint) => "allow_auth_endpoint",
            Decision::Allow(AllowReason::Capability) => "allow_capability",
            Decision::Allow(AllowReason::Admin) => "allow_admin",
            Decision::Deny(DenyReason::MissingCredentials) => "deny_missing_credentials",
            Decision::Deny(DenyReason::InvalidCredentials(_)) => "deny_invalid_credentials",
            Decision::Deny(DenyReason::NotPermitted) => "deny_not_permitted",
        }
    }
}

/// Decides whether a request may reach application logic.
///
/// Stateless: the decision depends only on the request line, the
/// `Authorization` header, the clock and immutable configuration.
#[derive(Clone)]
pub struct AuthorizationGate {
    codec: TokenCodec,
    config: GateConfig,
}

impl AuthorizationGate {
    pub fn new(codec: TokenCodec, config: GateConfig) -> Self {
        Self { codec, config }
    }

    pub fn decide(
        &self,
        method: &str,
        path: &str,
        authorization: Option<&str>,
        now: DateTime<Utc>,
    ) -> Decision {
        if !self.config.enabled {
            return Decision::Allow(AllowReason::Disabled);
        }

        if self.is_auth_endpoint(path) {
            return Decision::Allow(AllowReason::AuthEndpoint);
        }

        let Some(raw) = authorization.and_then(bearer_token) else {
            return Decision::Deny(DenyReason::MissingCredentials);
        };

        let claims = match self.codec.authenticate(raw, TokenKind::Access, now) {
            Ok(claims) => claims,
            Err(e) => return Decision::Deny(DenyReason::InvalidCredentials(e)),
        };

        if claims.lvl == Level::Admin {
            return Decision::Allow(AllowReason::Admin);
        }

        match terminal_segment(path) {
            Some(action) if claims.acs.allows(method, &action) => {
                Decision::Allow(AllowReason::Capability)
            }
            _ => Decision::Deny(DenyReason::NotPermitted),
        }
    }

    fn is_auth_endpoint(&self, path: &str) -> bool {
        let prefix = self.config.auth_path_prefix.as_str();
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// The token from `Bearer <token>`, if the header has that shape.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// The last path segment, percent-decoded the way axum's `Path` extractor
/// sees it, ignoring a trailing slash. `None` if it is empty or not UTF-8.
pub fn terminal_segment(path: &str) -> Option<Cow<'_, str>> {
    let raw = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())?;
    urlencoding::decode(raw).ok()
}
