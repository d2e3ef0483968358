use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 of `payload` under `secret`.
pub fn hmac_sha256(secret: &[u8], payload: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify an HMAC-SHA256 signature using constant-time comparison
pub fn verify_hmac_sha256(
    secret: &[u8],
    payload: &[u8],
    signature: &[u8],
) -> Result<bool, anyhow::Error> {
    let expected = hmac_sha256(secret, payload)?;
    Ok(constant_time_eq(&expected, signature))
}

/// Byte comparison whose running time does not depend on where the inputs
/// differ. Length mismatch returns early; lengths are not secret here.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Hex-encoded SHA-256 digest, used for storing short secrets at rest.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
