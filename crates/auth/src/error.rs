use thiserror::Error;

/// Errors raised while keeping the session credentials valid.
///
/// The type is `Clone` because a single refresh outcome is handed to every
/// task waiting on the same refresh cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No refresh token available")]
    MissingRefreshToken,

    #[error("Refresh rejected ({status}): {message}")]
    RefreshRejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// Builds a rejection from a non-success refresh response body.
    pub fn rejected(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                ["error", "detail"]
                    .iter()
                    .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            })
            .unwrap_or_else(|| body.to_string());

        Self::RefreshRejected { status, message }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::InvalidToken(err.to_string())
    }
}
