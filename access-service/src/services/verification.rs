//! Phone verification: register/login issue a code, verify exchanges it for
//! access and refresh tokens, refresh mints new access tokens.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::accounts::AccountStore;
use super::delivery::CodeDelivery;
use super::error::FlowError;
use super::metrics::record_verification_event;
use super::sessions::{ConsumeOutcome, SessionStore};
use super::token::TokenCodec;
use crate::config::AccessConfig;
use crate::dtos::auth::{RefreshResponse, TokenPairResponse, VerificationResponse};
use crate::models::{
    Account, CapabilityMatrix, Grant, Level, SessionPurpose, TokenKind, VerificationSession,
};
use crate::utils::normalize_phone;

/// Source of "now". Swapped out in tests to step past expiry deadlines.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Clone)]
pub struct VerificationPolicy {
    pub verification_ttl: Duration,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub code_length: usize,
    pub max_attempts: u32,
    pub default_capabilities: CapabilityMatrix,
    pub admin_phones: HashSet<String>,
}

impl VerificationPolicy {
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            verification_ttl: Duration::seconds(config.token.verification_ttl_seconds),
            access_ttl: Duration::minutes(config.token.access_ttl_minutes),
            refresh_ttl: Duration::days(config.token.refresh_ttl_days),
            code_length: config.verification.code_length,
            max_attempts: config.verification.max_attempts,
            default_capabilities: config.verification.default_capabilities.clone(),
            admin_phones: config
                .verification
                .admin_phones
                .iter()
                .filter_map(|phone| {
                    let normalized = normalize_phone(phone);
                    if normalized.is_none() {
                        tracing::warn!(phone = %phone, "Ignoring invalid admin phone");
                    }
                    normalized
                })
                .collect(),
        }
    }
}

pub struct VerificationFlow {
    codec: TokenCodec,
    sessions: SessionStore,
    accounts: Arc<dyn AccountStore>,
    delivery: Arc<dyn CodeDelivery>,
    policy: VerificationPolicy,
    clock: Clock,
}

impl VerificationFlow {
    pub fn new(
        codec: TokenCodec,
        accounts: Arc<dyn AccountStore>,
        delivery: Arc<dyn CodeDelivery>,
        policy: VerificationPolicy,
    ) -> Self {
        Self {
            codec,
            sessions: SessionStore::new(),
            accounts,
            delivery,
            policy,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub fn pending_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Start verification for a phone with no account yet.
    #[tracing::instrument(skip_all)]
    pub async fn register(&self, phone: &str) -> Result<VerificationResponse, FlowError> {
        let phone = valid_phone(phone)?;

        if self.accounts.find_by_phone(&phone).await?.is_some() {
            record_verification_event("register_conflict");
            return Err(FlowError::Forbidden(
                "Phone number is already registered".to_string(),
            ));
        }

        self.start_session(phone, SessionPurpose::Register).await
    }

    /// Start verification for a phone that already has an account.
    #[tracing::instrument(skip_all)]
    pub async fn login(&self, phone: &str) -> Result<VerificationResponse, FlowError> {
        let phone = valid_phone(phone)?;

        if self.accounts.find_by_phone(&phone).await?.is_none() {
            record_verification_event("login_unknown_phone");
            return Err(FlowError::Unauthorized);
        }

        self.start_session(phone, SessionPurpose::Login).await
    }

    async fn start_session(
        &self,
        phone: String,
        purpose: SessionPurpose,
    ) -> Result<VerificationResponse, FlowError> {
        let now = self.now();
        let code = generate_code(self.policy.code_length);

        let grant = Grant::new(phone.clone(), Level::User, CapabilityMatrix::new());
        let issued = self.codec.issue(
            &grant,
            TokenKind::Verification,
            self.policy.verification_ttl,
            now,
        )?;
        let token_id = issued.claims.jti.clone();

        let session = VerificationSession::new(
            phone.clone(),
            &code,
            token_id.clone(),
            purpose,
            now,
            now + self.policy.verification_ttl,
        );
        if self.sessions.insert(session).is_some() {
            tracing::debug!(purpose = purpose.as_str(), "Replaced pending verification session");
        }

        if let Err(e) = self.delivery.deliver(&phone, &code).await {
            self.sessions.discard(&phone, &token_id);
            tracing::error!(error = %e, purpose = purpose.as_str(), "Verification code delivery failed");
            record_verification_event("delivery_failed");
            return Err(FlowError::DeliveryFailed(e.to_string()));
        }

        record_verification_event(match purpose {
            SessionPurpose::Register => "register_started",
            SessionPurpose::Login => "login_started",
        });
        tracing::info!(purpose = purpose.as_str(), "Verification code sent");

        Ok(VerificationResponse {
            message: "Verification code sent".to_string(),
            verification_token: issued.token,
        })
    }

    /// Exchange a code and its verification token for access and refresh
    /// tokens. A bad token and a bad code fail the same way.
    #[tracing::instrument(skip_all)]
    pub async fn verify(
        &self,
        code: &str,
        verification_token: &str,
    ) -> Result<TokenPairResponse, FlowError> {
        let now = self.now();
        let claims = self
            .codec
            .authenticate(verification_token, TokenKind::Verification, now)?;

        let session = match self.sessions.consume(
            &claims.sub,
            &claims.jti,
            code,
            now,
            self.policy.max_attempts,
        ) {
            ConsumeOutcome::Consumed(session) => session,
            ConsumeOutcome::Rejected { remaining } => {
                record_verification_event("code_rejected");
                if remaining == 0 {
                    tracing::warn!("Verification attempts exhausted; session destroyed");
                }
                return Err(FlowError::Unauthorized);
            }
            ConsumeOutcome::NotFound => {
                record_verification_event("session_not_found");
                return Err(FlowError::Unauthorized);
            }
        };

        let account = match session.purpose {
            SessionPurpose::Register => {
                let lvl = if self.policy.admin_phones.contains(&session.phone) {
                    Level::Admin
                } else {
                    Level::User
                };
                let account = Account::new(
                    session.phone,
                    lvl,
                    self.policy.default_capabilities.clone(),
                    now,
                );
                let account = self.accounts.create(account).await?;
                tracing::info!(account_id = %account.account_id, "Account created");
                account
            }
            SessionPurpose::Login => self
                .accounts
                .find_by_phone(&session.phone)
                .await?
                .ok_or(FlowError::Unauthorized)?,
        };

        let grant = account.grant();
        let access = self
            .codec
            .issue(&grant, TokenKind::Access, self.policy.access_ttl, now)?;
        let refresh = self
            .codec
            .issue(&grant, TokenKind::Refresh, self.policy.refresh_ttl, now)?;

        record_verification_event("verified");
        tracing::info!(account_id = %account.account_id, "Phone verified");

        Ok(TokenPairResponse {
            message: "Verification successful".to_string(),
            access_token: access.token,
            refresh_token: refresh.token,
        })
    }

    /// Mint a new access token carrying the refresh token's subject, level
    /// and capabilities. The refresh token itself stays valid.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, FlowError> {
        let now = self.now();
        let claims = self
            .codec
            .authenticate(refresh_token, TokenKind::Refresh, now)?;

        let access = self.codec.issue(
            &Grant::from(&claims),
            TokenKind::Access,
            self.policy.access_ttl,
            now,
        )?;

        record_verification_event("refreshed");

        Ok(RefreshResponse {
            access_token: access.token,
        })
    }

    /// Drop expired sessions. Expiry is also enforced on every verify, so
    /// this only reclaims memory.
    pub fn purge_expired(&self) -> usize {
        self.sessions.purge_expired(self.now())
    }
}

fn valid_phone(raw: &str) -> Result<String, FlowError> {
    normalize_phone(raw).ok_or_else(|| {
        FlowError::Validation(
            "Invalid phone number; expected + followed by 4-15 digits".to_string(),
        )
    })
}

fn generate_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Periodically purge expired verification sessions.
pub fn spawn_session_sweeper(
    flow: Arc<VerificationFlow>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = flow.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged expired verification sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_is_numeric() {
        for length in [4, 6, 10] {
            let code = generate_code(length);
            assert_eq!(code.len(), length);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_valid_phone() {
        assert_eq!(valid_phone("+1 555-0100").unwrap(), "+15550100");
        assert!(matches!(valid_phone("5550100"), Err(FlowError::Validation(_))));
    }
}
