//! Session lifecycle for the administration console
//!
//! [`AuthSession`] owns the transitions of the shared [`SessionState`]: boot
//! from persisted tokens, login, logout and profile resynchronisation. The
//! token refresh itself happens inside the request pipeline
//! ([`interceptor::BearerAuth`]).

pub mod guard;
pub mod interceptor;

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

use campus_admin_auth::{
    AuthStatus, LoginResponse, ProfileResponse, SessionState, TokenStore, UserProfile,
};

use crate::error::Error;
use crate::fetch::ApiRequest;
use crate::http::HttpClient;

const LOGIN_FAILED: &str = "Erreur lors de la connexion administrateur";
const LOGOUT_FAILED: &str = "Erreur lors de la déconnexion";
const PROFILE_FAILED: &str = "Erreur lors de la récupération du profil";
const PASSWORD_CHANGED: &str = "Mot de passe modifié avec succès";
const PASSWORD_CHANGE_FAILED: &str = "Erreur lors du changement de mot de passe";
const RESET_LINK_SENT: &str = "Un lien de réinitialisation a été envoyé à votre email";
const RESET_REQUEST_FAILED: &str = "Erreur lors de la demande de réinitialisation";
const PASSWORD_RESET: &str = "Mot de passe réinitialisé avec succès";
const PASSWORD_RESET_FAILED: &str = "Erreur lors de la réinitialisation du mot de passe";

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

/// Result of [`AuthSession::logout`]. The local session is gone either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The backend revoked the refresh token
    Revoked,
    /// Only the local session was cleared
    LocalOnly { reason: String },
}

impl LogoutOutcome {
    pub fn is_revoked(&self) -> bool {
        matches!(self, LogoutOutcome::Revoked)
    }
}

/// Puts the auth endpoint's message on a backend failure. Kind and status
/// are kept, so only a 401 reads as an authentication failure.
fn flow_error(err: Error, fallback: &str) -> Error {
    match err {
        Error::Api(api) => {
            let message = api.backend_error().unwrap_or(fallback).to_string();
            Error::Api(api.with_message(message))
        }
        other => other,
    }
}

fn message_or(value: Value, fallback: &str) -> String {
    serde_json::from_value::<MessageResponse>(value)
        .ok()
        .and_then(|response| response.message)
        .unwrap_or_else(|| fallback.to_string())
}

/// Login, logout and profile operations over the shared session.
#[derive(Clone)]
pub struct AuthSession {
    http: HttpClient,
    store: Arc<TokenStore>,
    session: Arc<SessionState>,
}

impl AuthSession {
    pub fn new(http: HttpClient, store: Arc<TokenStore>, session: Arc<SessionState>) -> Self {
        Self {
            http,
            store,
            session,
        }
    }

    /// Restores the session from persisted tokens.
    ///
    /// With a stored access token the profile is fetched; any failure ends in
    /// a local logout. Without one the client is anonymous straight away.
    pub async fn initialize(&self) -> AuthStatus {
        if self.store.access_token().is_none() {
            debug!("No stored token, starting anonymous");
            self.store.clear();
            self.session.set(AuthStatus::Anonymous);
            return AuthStatus::Anonymous;
        }

        self.session.begin_loading();
        match self.get_profile().await {
            Ok(user) => {
                info!("Session restored for {}", user.email);
                self.session.set(AuthStatus::Authenticated(user));
            }
            Err(err) => {
                warn!("Could not restore session: {}", err);
                self.store.clear();
                self.session.expire();
            }
        }
        self.session.status()
    }

    /// Signs an administrator in.
    ///
    /// On failure the previous session, if any, is left exactly as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, Error> {
        let previous = self.session.begin_loading();

        let result = async {
            let request = ApiRequest::post("auth/admin/login/")
                .public()
                .json(&json!({ "email": email.trim(), "password": password }))?;
            let response: LoginResponse = self.http.send(request).await?.into_json()?;
            Ok::<_, Error>(response.into_profile())
        }
        .await;

        match result {
            Ok((tokens, user)) => {
                self.store.save(&tokens.access_token, &tokens.refresh_token);
                self.store.save_user(&user);
                self.session.set(AuthStatus::Authenticated(user.clone()));
                info!("Administrator {} signed in", user.email);
                Ok(user)
            }
            Err(err) => {
                debug!("Login failed: {}", err);
                self.session.settle(previous);
                Err(flow_error(err, LOGIN_FAILED))
            }
        }
    }

    /// Ends the session. Never fails: the backend call is best effort and
    /// local state is cleared regardless.
    pub async fn logout(&self) -> LogoutOutcome {
        let outcome = match self.store.refresh_token() {
            Some(refresh_token) => {
                let sent = async {
                    let request = ApiRequest::post("auth/logout/")
                        .json(&json!({ "refresh_token": refresh_token }))?;
                    self.http.send(request).await
                }
                .await;
                match sent {
                    Ok(_) => LogoutOutcome::Revoked,
                    Err(err) => {
                        warn!("Logout call failed, clearing locally: {}", err);
                        LogoutOutcome::LocalOnly {
                            reason: flow_error(err, LOGOUT_FAILED).user_message(),
                        }
                    }
                }
            }
            None => LogoutOutcome::LocalOnly {
                reason: "no refresh token".to_string(),
            },
        };

        self.store.clear();
        self.session.expire();
        outcome
    }

    /// Fetches the profile of the signed-in user and caches it.
    pub async fn get_profile(&self) -> Result<UserProfile, Error> {
        let response: ProfileResponse = self
            .http
            .get("auth/profile/", &[])
            .await
            .map_err(|err| flow_error(err, PROFILE_FAILED))?;
        let user = response.into_profile();
        self.store.save_user(&user);
        Ok(user)
    }

    /// Re-fetches the profile to pick up role or permission changes.
    ///
    /// A failure puts the previous status back, unless the session was moved
    /// elsewhere meanwhile (e.g. expired by a failed refresh).
    pub async fn refresh_user_profile(&self) -> Result<UserProfile, Error> {
        let previous = self.session.begin_loading();
        match self.get_profile().await {
            Ok(user) => {
                self.session.settle(AuthStatus::Authenticated(user.clone()));
                Ok(user)
            }
            Err(err) => {
                self.session.settle(previous);
                Err(err)
            }
        }
    }

    /// Returns the backend confirmation message.
    pub async fn change_password(
        &self,
        current_password: &str,
        new_password: &str,
    ) -> Result<String, Error> {
        let body = json!({
            "current_password": current_password,
            "new_password": new_password,
        });
        let response = self
            .http
            .send(ApiRequest::post("auth/change-password/").json(&body)?)
            .await
            .map_err(|err| flow_error(err, PASSWORD_CHANGE_FAILED))?;
        Ok(message_or(response.body, PASSWORD_CHANGED))
    }

    /// Asks the backend to email a reset link.
    pub async fn forgot_password(&self, email: &str) -> Result<String, Error> {
        let request = ApiRequest::post("auth/forgot-password/")
            .public()
            .json(&json!({ "email": email.trim() }))?;
        let response = self
            .http
            .send(request)
            .await
            .map_err(|err| flow_error(err, RESET_REQUEST_FAILED))?;
        Ok(message_or(response.body, RESET_LINK_SENT))
    }

    pub async fn reset_password(
        &self,
        uidb64: &str,
        token: &str,
        new_password: &str,
    ) -> Result<String, Error> {
        let request = ApiRequest::post("auth/reset-password/")
            .public()
            .json(&json!({
                "uidb64": uidb64,
                "token": token,
                "new_password": new_password,
            }))?;
        let response = self
            .http
            .send(request)
            .await
            .map_err(|err| flow_error(err, PASSWORD_RESET_FAILED))?;
        Ok(message_or(response.body, PASSWORD_RESET))
    }

    /// Persists an edited profile and publishes it if a session is open.
    pub fn update_user(&self, user: UserProfile) {
        self.store.save_user(&user);
        if self.store.access_token().is_some() {
            self.session.set(AuthStatus::Authenticated(user));
        }
    }

    /// Restores the cached profile without calling the backend.
    pub fn load_user(&self) -> Option<UserProfile> {
        let user = self.store.read_user()?;
        if self.store.access_token().is_some() && !self.session.is_authenticated() {
            self.session.set(AuthStatus::Authenticated(user.clone()));
        }
        Some(user)
    }

    pub fn status(&self) -> AuthStatus {
        self.session.status()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.session.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.session.user()
    }

    pub fn is_admin(&self) -> bool {
        self.user().map_or(false, |user| user.is_admin())
    }

    pub fn is_superuser(&self) -> bool {
        self.user().map_or(false, |user| user.is_superuser)
    }

    pub fn user_type(&self) -> Option<String> {
        self.user().and_then(|user| user.user_type)
    }

    pub fn roles(&self) -> Vec<Value> {
        self.user().map(|user| user.roles).unwrap_or_default()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.user()
            .map_or(false, |user| user.has_permission(permission))
    }
}
