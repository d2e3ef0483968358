//! HS256 token issue, decode and verification.
//!
//! Decoding and verification are separate steps: [`TokenCodec::decode`]
//! rejects anything structurally wrong without touching the key, and
//! [`TokenCodec::verify`] checks expiry before the signature, so an expired
//! token reports `Expired` whatever its signature.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, Secret};
use service_core::utils::signature::verify_hmac_sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::models::{Claims, Grant, TokenKind, TOKEN_VERSION};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Expected a {expected} token, got {actual}")]
    WrongKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("Untrusted token issuer")]
    UntrustedIssuer,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

fn invalid(reason: impl Into<String>) -> TokenError {
    TokenError::InvalidToken(reason.into())
}

/// A structurally valid token whose signature has not been checked yet.
#[derive(Debug, Clone)]
pub struct Token {
    pub claims: Claims,
    signing_input: String,
    signature: Vec<u8>,
}

/// A freshly signed token and the claims inside it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    secret: Secret<String>,
    issuer: String,
}

impl TokenCodec {
    pub fn new(config: &TokenConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.expose_secret().as_bytes());

        tracing::info!(issuer = %config.issuer, "Token codec initialized with HS256");

        Self {
            encoding_key,
            secret: config.secret.clone(),
            issuer: config.issuer.clone(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Sign `grant` as a `kind` token valid from `now` for `ttl`.
    pub fn issue(
        &self,
        grant: &Grant,
        kind: TokenKind,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| TokenError::Signing(format!("ttl {} overflows expiry", ttl)))?;

        let claims = Claims {
            v: TOKEN_VERSION,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            sub: grant.sub.clone(),
            lvl: grant.lvl,
            acs: grant.acs.clone(),
            kind,
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken { token, claims })
    }

    /// Parse `raw` into a [`Token`] without checking its signature or expiry.
    pub fn decode(&self, raw: &str) -> Result<Token, TokenError> {
        let segments: Vec<&str> = raw.split('.').collect();
        let [header_b64, payload_b64, signature_b64] = segments.as_slice() else {
            return Err(invalid("expected three segments"));
        };

        let header = jsonwebtoken::decode_header(raw).map_err(|e| invalid(e.to_string()))?;
        if header.alg != Algorithm::HS256 {
            return Err(invalid(format!("unsupported algorithm {:?}", header.alg)));
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| invalid("payload is not base64url"))?;
        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|e| invalid(e.to_string()))?;

        if claims.v != TOKEN_VERSION {
            return Err(invalid(format!("unknown claim version {}", claims.v)));
        }
        if claims.exp < claims.iat {
            return Err(invalid("expires before it was issued"));
        }
        if claims.sub.is_empty() || claims.jti.is_empty() {
            return Err(invalid("empty subject or token id"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid("signature is not base64url"))?;

        Ok(Token {
            claims,
            signing_input: format!("{}.{}", header_b64, payload_b64),
            signature,
        })
    }

    /// Check expiry, then the signature. `now` is UNIX seconds.
    pub fn verify(&self, token: &Token, now: i64) -> Result<(), TokenError> {
        if now > token.claims.exp {
            return Err(TokenError::Expired);
        }

        let valid = verify_hmac_sha256(
            self.secret.expose_secret().as_bytes(),
            token.signing_input.as_bytes(),
            &token.signature,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;

        if valid {
            Ok(())
        } else {
            Err(TokenError::BadSignature)
        }
    }

    /// Decode and verify `raw`, then require our issuer and the given kind.
    pub fn authenticate(
        &self,
        raw: &str,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        let token = self.decode(raw)?;
        self.verify(&token, now.timestamp())?;

        let claims = token.claims;
        if claims.iss != self.issuer {
            return Err(TokenError::UntrustedIssuer);
        }
        if claims.kind != kind {
            return Err(TokenError::WrongKind {
                expected: kind,
                actual: claims.kind,
            });
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CapabilityMatrix, Level};
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn codec_with(secret: &str, issuer: &str) -> TokenCodec {
        TokenCodec::new(&TokenConfig {
            secret: Secret::new(secret.to_string()),
            issuer: issuer.to_string(),
            verification_ttl_seconds: 300,
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
        })
    }

    fn codec() -> TokenCodec {
        codec_with(SECRET, "access-service")
    }

    fn grant() -> Grant {
        Grant::new(
            "account-1",
            Level::User,
            CapabilityMatrix::new().with("GET", ["users"]).unwrap(),
        )
    }

    /// Sign arbitrary payload JSON with the test secret.
    fn forge(header: serde_json::Value, payload: serde_json::Value) -> String {
        let h = URL_SAFE_NO_PAD.encode(header.to_string());
        let p = URL_SAFE_NO_PAD.encode(payload.to_string());
        let sig = service_core::utils::signature::hmac_sha256(
            SECRET.as_bytes(),
            format!("{h}.{p}").as_bytes(),
        )
        .unwrap();
        format!("{h}.{p}.{}", URL_SAFE_NO_PAD.encode(sig))
    }

    fn hs256() -> serde_json::Value {
        json!({"alg": "HS256", "typ": "JWT"})
    }

    #[test]
    fn test_issue_then_verify_at_issue_time() {
        let codec = codec();
        let now = Utc::now();
        let issued = codec
            .issue(&grant(), TokenKind::Access, Duration::minutes(15), now)
            .unwrap();

        let token = codec.decode(&issued.token).unwrap();
        assert_eq!(token.claims, issued.claims);
        assert_eq!(token.claims.iat, now.timestamp());
        assert!(codec.verify(&token, token.claims.iat).is_ok());
        assert!(codec.verify(&token, token.claims.exp).is_ok());
    }

    #[test]
    fn test_ttl_past_calendar_range_is_an_error() {
        let result = codec().issue(
            &grant(),
            TokenKind::Refresh,
            Duration::days(100_000_000),
            Utc::now(),
        );
        assert!(matches!(result, Err(TokenError::Signing(_))));
    }

    #[test]
    fn test_expired_after_exp_even_with_bad_signature() {
        let codec = codec();
        let issued = codec
            .issue(&grant(), TokenKind::Access, Duration::seconds(60), Utc::now())
            .unwrap();
        let token = codec.decode(&issued.token).unwrap();
        assert_eq!(
            codec.verify(&token, token.claims.exp + 1),
            Err(TokenError::Expired)
        );

        let other = codec_with("ffffffffffffffffffffffffffffffff", "access-service");
        assert_eq!(
            other.verify(&token, token.claims.exp + 1),
            Err(TokenError::Expired)
        );
        assert_eq!(
            other.verify(&token, token.claims.iat),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_payload_is_bad_signature() {
        let codec = codec();
        let issued = codec
            .issue(&grant(), TokenKind::Access, Duration::minutes(15), Utc::now())
            .unwrap();
        let parts: Vec<&str> = issued.token.split('.').collect();

        let mut claims = serde_json::to_value(&issued.claims).unwrap();
        claims["lvl"] = json!("admin");
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(claims.to_string()),
            parts[2]
        );

        let token = codec.decode(&tampered).unwrap();
        assert_eq!(token.claims.lvl, Level::Admin);
        assert_eq!(
            codec.verify(&token, token.claims.iat),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_structural_failures_are_invalid_token() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let valid = json!({
            "v": 1, "iss": "access-service", "iat": now, "exp": now + 60,
            "sub": "a", "lvl": "user", "acs": {}, "kind": "access", "jti": "j"
        });

        let cases = vec![
            "not-a-token".to_string(),
            "a.b".to_string(),
            "a.b.c.d".to_string(),
            format!("{}.!!!.sig", URL_SAFE_NO_PAD.encode(hs256().to_string())),
            forge(json!({"alg": "none"}), valid.clone()),
            forge(json!({"alg": "HS512", "typ": "JWT"}), valid.clone()),
            forge(hs256(), json!({"sub": "a"})),
            forge(hs256(), {
                let mut c = valid.clone();
                c["v"] = json!(2);
                c
            }),
            forge(hs256(), {
                let mut c = valid.clone();
                c["exp"] = json!(now - 10);
                c
            }),
            forge(hs256(), {
                let mut c = valid.clone();
                c["acs"] = json!({"BREW": ["tea"]});
                c
            }),
            forge(hs256(), {
                let mut c = valid.clone();
                c["iat"] = json!("yesterday");
                c
            }),
        ];

        for raw in cases {
            assert!(
                matches!(codec.decode(&raw), Err(TokenError::InvalidToken(_))),
                "{raw}"
            );
        }

        assert!(codec.decode(&forge(hs256(), valid)).is_ok());
    }

    #[test]
    fn test_legacy_claim_names_decode() {
        let codec = codec();
        let now = Utc::now().timestamp();
        let raw = forge(
            hs256(),
            json!({
                "v": 1, "iss": "access-service", "iat": now, "exp": now + 60,
                "sub": "a", "role": "admin", "permissions": {"GET": ["users"]},
                "kind": "access", "jti": "j"
            }),
        );

        let token = codec.decode(&raw).unwrap();
        assert_eq!(token.claims.lvl, Level::Admin);
        assert!(token.claims.acs.allows("GET", "users"));
        assert!(codec.verify(&token, now).is_ok());

        let reissued = serde_json::to_value(&token.claims).unwrap();
        assert!(reissued.get("lvl").is_some());
        assert!(reissued.get("role").is_none());
        assert!(reissued.get("permissions").is_none());
    }

    #[test]
    fn test_authenticate_checks_issuer_and_kind() {
        let codec = codec();
        let now = Utc::now();
        let refresh = codec
            .issue(&grant(), TokenKind::Refresh, Duration::days(1), now)
            .unwrap();

        assert!(codec.authenticate(&refresh.token, TokenKind::Refresh, now).is_ok());
        assert_eq!(
            codec.authenticate(&refresh.token, TokenKind::Access, now),
            Err(TokenError::WrongKind {
                expected: TokenKind::Access,
                actual: TokenKind::Refresh,
            })
        );

        let foreign = codec_with(SECRET, "someone-else");
        assert_eq!(
            foreign.authenticate(&refresh.token, TokenKind::Refresh, now),
            Err(TokenError::UntrustedIssuer)
        );
    }

    #[test]
    fn test_each_token_has_unique_id() {
        let codec = codec();
        let now = Utc::now();
        let a = codec.issue(&grant(), TokenKind::Access, Duration::minutes(1), now).unwrap();
        let b = codec.issue(&grant(), TokenKind::Access, Duration::minutes(1), now).unwrap();
        assert_ne!(a.claims.jti, b.claims.jti);
        assert_ne!(a.token, b.token);
    }
}
