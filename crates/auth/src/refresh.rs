//! Single-flight access token refresh

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

use crate::error::AuthError;
use crate::session::SessionState;
use crate::store::TokenStore;
use crate::types::RefreshResponse;

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError>;
}

/// `POST auth/refresh/` against the backend.
///
/// Uses the bare HTTP client rather than the authenticated pipeline, so a
/// refresh can never recurse into another refresh.
pub struct HttpRefresher {
    url: Url,
    http_client: Client,
}

impl HttpRefresher {
    /// `base_url` is the API root, e.g. `http://localhost:8000/api/v1/`.
    pub fn new(base_url: &Url, http_client: Client) -> Result<Self, AuthError> {
        let url = base_url
            .join("auth/refresh/")
            .map_err(|e| AuthError::InvalidResponse(format!("bad refresh URL: {}", e)))?;
        Ok(Self { url, http_client })
    }
}

#[async_trait]
impl TokenRefresher for HttpRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, AuthError> {
        let payload = serde_json::json!({
            "refresh_token": refresh_token,
        });

        let response = self
            .http_client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AuthError::rejected(status.as_u16(), &error_text));
        }

        response
            .json::<RefreshResponse>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}

/// Result of one completed refresh cycle.
struct Cycle {
    generation: u64,
    outcome: Result<String, AuthError>,
}

/// Turns the stored refresh token into a new access token, at most one
/// backend call at a time.
///
/// Callers that arrive while a cycle is running wait on the cycle lock and
/// then take the outcome of that cycle instead of starting another. A caller
/// that arrives after the cycle completed starts a new one.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    session: Arc<SessionState>,
    refresher: Arc<dyn TokenRefresher>,
    last_cycle: Mutex<Option<Cycle>>,
    completed: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        session: Arc<SessionState>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            store,
            session,
            refresher,
            last_cycle: Mutex::new(None),
            completed: AtomicU64::new(0),
        }
    }

    /// Returns a freshly minted access token.
    ///
    /// On failure the token store is cleared and the session becomes
    /// anonymous before the error is returned to every waiter.
    pub async fn ensure_fresh_token(&self) -> Result<String, AuthError> {
        let observed = self.completed.load(Ordering::Acquire);
        let mut last_cycle = self.last_cycle.lock().await;

        if let Some(cycle) = last_cycle.as_ref() {
            if cycle.generation > observed {
                debug!("Joining refresh cycle #{}", cycle.generation);
                return cycle.outcome.clone();
            }
        }

        let generation = self.completed.load(Ordering::Acquire) + 1;
        debug!("Starting refresh cycle #{}", generation);
        let outcome = self.run_cycle().await;

        *last_cycle = Some(Cycle {
            generation,
            outcome: outcome.clone(),
        });
        self.completed.store(generation, Ordering::Release);

        outcome
    }

    /// Number of refresh cycles completed so far.
    pub fn completed_cycles(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    async fn run_cycle(&self) -> Result<String, AuthError> {
        let result = match self.store.refresh_token() {
            Some(refresh_token) => self
                .refresher
                .refresh(&refresh_token)
                .await
                .map(|grant| (grant, refresh_token)),
            None => Err(AuthError::MissingRefreshToken),
        };

        match result {
            Ok((grant, previous_refresh)) => {
                let refresh_token = grant.refresh_token.unwrap_or(previous_refresh);
                self.store.save(&grant.access_token, &refresh_token);
                info!("Access token refreshed");
                Ok(grant.access_token)
            }
            Err(err) => {
                warn!("Token refresh failed, ending session: {}", err);
                self.store.clear();
                self.session.expire();
                Err(err)
            }
        }
    }
}
