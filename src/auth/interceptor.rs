//! Bearer token stage of the pipeline

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use std::sync::Arc;

use campus_admin_auth::{RefreshCoordinator, TokenClock, TokenStore};

use crate::error::Error;
use crate::fetch::{ApiRequest, ApiResponse};
use crate::middleware::{Middleware, Next};

/// Attaches the session's access token and recovers once from a 401.
///
/// Before sending, a token inside the refresh window is exchanged through the
/// [`RefreshCoordinator`]. After a 401 the request is resent exactly once with
/// a fresh token; a second 401 is handed back to the caller.
pub struct BearerAuth {
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
    clock: TokenClock,
}

impl BearerAuth {
    pub fn new(
        store: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
        clock: TokenClock,
    ) -> Self {
        Self {
            store,
            coordinator,
            clock,
        }
    }

    async fn current_token(&self) -> Result<Option<String>, Error> {
        match self.store.access_token() {
            Some(token) if self.clock.is_near_expiry(&token) => {
                debug!("Access token inside refresh window, refreshing first");
                Ok(Some(self.coordinator.ensure_fresh_token().await?))
            }
            other => Ok(other),
        }
    }

    async fn token_after_rejection(&self, rejected: Option<&str>) -> Result<String, Error> {
        // another request may already have replaced the token we were sent with
        if let Some(current) = self.store.access_token() {
            if rejected != Some(current.as_str()) && !self.clock.is_near_expiry(&current) {
                return Ok(current);
            }
        }
        Ok(self.coordinator.ensure_fresh_token().await?)
    }
}

#[async_trait]
impl Middleware for BearerAuth {
    async fn handle(&self, mut request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, Error> {
        if request.is_public() {
            return next.run(request).await;
        }

        if let Some(token) = self.current_token().await? {
            request.set_bearer(&token)?;
        }

        let response = next.run(request.clone()).await?;
        if response.status != StatusCode::UNAUTHORIZED || request.auth_retried() {
            return Ok(response);
        }

        debug!("401 on {}, refreshing and resending once", request.path());
        request.mark_auth_retried();
        let rejected = request.bearer().map(str::to_string);
        let token = self.token_after_rejection(rejected.as_deref()).await?;
        request.set_bearer(&token)?;

        next.run(request).await
    }
}
