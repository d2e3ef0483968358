use chrono::{DateTime, Utc};
use service_core::utils::signature::{constant_time_eq, sha256_hex};

/// Why a verification session was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPurpose {
    Register,
    Login,
}

impl SessionPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPurpose::Register => "register",
            SessionPurpose::Login => "login",
        }
    }
}

/// A pending phone verification.
///
/// The code is held only as a SHA-256 digest. `token_id` is the `jti` of the
/// verification token issued alongside it; a token whose `jti` differs belongs
/// to a replaced session and is refused.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub phone: String,
    pub code_hash: String,
    pub token_id: String,
    pub purpose: SessionPurpose,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

impl VerificationSession {
    pub fn new(
        phone: String,
        code: &str,
        token_id: String,
        purpose: SessionPurpose,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            phone,
            code_hash: sha256_hex(code),
            token_id,
            purpose,
            created_at,
            expires_at,
            attempts: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn code_matches(&self, code: &str) -> bool {
        constant_time_eq(sha256_hex(code).as_bytes(), self.code_hash.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(now: DateTime<Utc>) -> VerificationSession {
        VerificationSession::new(
            "+15550100".to_string(),
            "123456",
            "jti-1".to_string(),
            SessionPurpose::Register,
            now,
            now + Duration::seconds(300),
        )
    }

    #[test]
    fn test_code_is_stored_hashed() {
        let s = session(Utc::now());
        assert_ne!(s.code_hash, "123456");
        assert!(s.code_matches("123456"));
        assert!(!s.code_matches("123457"));
        assert!(!s.code_matches(""));
    }

    #[test]
    fn test_expiry_is_exclusive_of_deadline() {
        let now = Utc::now();
        let s = session(now);
        assert!(!s.is_expired(now + Duration::seconds(300)));
        assert!(s.is_expired(now + Duration::seconds(301)));
    }
}
