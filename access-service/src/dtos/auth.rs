use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct PhoneRequest {
    #[validate(length(min = 5, max = 32, message = "Phone number must be 5-32 characters"))]
    pub phone: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub message: String,
    pub verification_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(min = 1, max = 16, message = "Code must be 1-16 characters"))]
    pub code: String,

    #[validate(length(min = 1, message = "Verification token is required"))]
    pub verification_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub message: String,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}
