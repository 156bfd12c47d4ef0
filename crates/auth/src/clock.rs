//! Local, unverified reading of a token's expiry claim
//!
//! The signature is never checked here; that is the backend's job. The claims
//! are only read to decide when to refresh.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;

use crate::error::AuthError;

/// Refresh look-ahead used when none is configured (5 minutes).
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Claims the client cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub sub: Option<Value>,
    #[serde(default)]
    pub user_id: Option<Value>,
}

/// Decodes the claims of `token` without verifying its signature.
pub fn decode_claims(token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

/// Whether `token` expires within `threshold` of now.
///
/// An undecodable token counts as expired.
pub fn is_near_expiry(token: &str, threshold: Duration) -> bool {
    is_near_expiry_at(token, threshold, chrono::Utc::now().timestamp())
}

fn is_near_expiry_at(token: &str, threshold: Duration, now: i64) -> bool {
    match decode_claims(token) {
        Ok(claims) => {
            let threshold = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
            claims.exp.saturating_sub(now) <= threshold
        }
        Err(err) => {
            warn!("Treating undecodable token as expired: {}", err);
            true
        }
    }
}

/// [`is_near_expiry`] bound to a configured threshold.
#[derive(Debug, Clone, Copy)]
pub struct TokenClock {
    threshold: Duration,
}

impl TokenClock {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_near_expiry(&self, token: &str) -> bool {
        is_near_expiry(token, self.threshold)
    }
}

impl Default for TokenClock {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_THRESHOLD)
    }
}
