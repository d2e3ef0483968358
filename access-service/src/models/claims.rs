use serde::{Deserialize, Serialize};
use std::fmt;

use super::CapabilityMatrix;

/// Claim-set layout version. Tokens carrying any other `v` are rejected.
pub const TOKEN_VERSION: u32 = 1;

/// Which endpoint a token is good for. All kinds share one claim shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Binds a pending verification session; accepted only by `/verify`.
    Verification,
    /// Accepted by resource endpoints.
    Access,
    /// Accepted only by `/refresh`.
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TokenKind::Verification => "verification",
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        })
    }
}

/// Privilege level. Admins bypass capability checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    User,
    Admin,
}

/// Signed claim set carried by every token.
///
/// `role` and `permissions` are read as legacy spellings of `lvl` and `acs`;
/// only the canonical names are ever written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub v: u32,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub sub: String,
    #[serde(alias = "role")]
    pub lvl: Level,
    #[serde(alias = "permissions", default)]
    pub acs: CapabilityMatrix,
    pub kind: TokenKind,
    pub jti: String,
}

/// What a token says about its holder: subject, level and capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub sub: String,
    pub lvl: Level,
    pub acs: CapabilityMatrix,
}

impl Grant {
    pub fn new(sub: impl Into<String>, lvl: Level, acs: CapabilityMatrix) -> Self {
        Self {
            sub: sub.into(),
            lvl,
            acs,
        }
    }
}

impl From<&Claims> for Grant {
    fn from(claims: &Claims) -> Self {
        Grant::new(claims.sub.clone(), claims.lvl, claims.acs.clone())
    }
}
