// livespot-core/src/auth/jwt.rs

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde_json::Value;

/// Fallback lifetime when a token carries no readable `exp`.
pub const DEFAULT_TTL_SECS: i64 = 3600;

/// Reads the `exp` claim without verifying the signature.
pub fn decode_exp(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    claims.get("exp").and_then(|v| v.as_i64())
}

pub fn expiry_or_default(token: &str, default_ttl_secs: i64) -> i64 {
    decode_exp(token).unwrap_or_else(|| Utc::now().timestamp() + default_ttl_secs)
}
