// Login token module
//
// The token is an opaque, unsigned credential: base64 of the claims JSON.
// It is issued at login and never checked on subsequent requests; see
// DESIGN.md for the known deficiency.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::logger;

/// Token lifetime: 7 days in milliseconds
pub const TOKEN_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub username: String,
    /// Expiry, milliseconds since epoch
    pub exp: i64,
}

/// Issue a token for a successfully logged-in user
pub fn issue(user_id: i64, username: &str, now: DateTime<Utc>) -> String {
    let claims = TokenClaims {
        user_id,
        username: username.to_string(),
        exp: now.timestamp_millis() + TOKEN_TTL_MS,
    };

    match serde_json::to_vec(&claims) {
        Ok(bytes) => STANDARD.encode(bytes),
        Err(e) => {
            logger::log_error(&format!("Failed to serialize token claims: {e}"));
            String::new()
        }
    }
}

/// Decode a token back into its claims.
///
/// No route verifies tokens yet; kept alongside `issue` for clients and
/// tests that need to inspect what was handed out.
#[allow(dead_code)]
pub fn decode(token: &str) -> Option<TokenClaims> {
    let bytes = STANDARD.decode(token).ok()?;
    serde_json::from_slice(&bytes).ok()
}
