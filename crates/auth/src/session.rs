//! Observable authentication status of the running client

use log::{debug, info};
use tokio::sync::watch;

use crate::types::UserProfile;

/// Authentication status.
///
/// The profile lives inside `Authenticated`, so a user is known exactly when
/// the session is authenticated.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    Uninitialized,
    Loading,
    Authenticated(UserProfile),
    Anonymous,
}

impl AuthStatus {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// True until the status is known.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Loading)
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            Self::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// The single session of a client.
///
/// Shared (behind an `Arc`) by the refresh coordinator, the HTTP pipeline and
/// the session controller. Observers subscribe to status changes.
#[derive(Debug)]
pub struct SessionState {
    status: watch::Sender<AuthStatus>,
}

impl SessionState {
    pub fn new() -> Self {
        let (status, _) = watch::channel(AuthStatus::Uninitialized);
        Self { status }
    }

    pub fn status(&self) -> AuthStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.status.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.status.borrow().is_loading()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.status.borrow().user().cloned()
    }

    pub fn set(&self, status: AuthStatus) {
        debug!("Session status -> {}", status_name(&status));
        self.status.send_replace(status);
    }

    /// Enters `Loading` and returns the status it replaced.
    pub fn begin_loading(&self) -> AuthStatus {
        self.status.send_replace(AuthStatus::Loading)
    }

    /// Applies `status` only if nothing moved the session out of `Loading`
    /// in the meantime. Returns whether it was applied.
    pub fn settle(&self, status: AuthStatus) -> bool {
        self.status.send_if_modified(|current| {
            if *current == AuthStatus::Loading {
                *current = status;
                true
            } else {
                false
            }
        })
    }

    /// Terminal transition after logout, refresh failure or revoked access.
    pub fn expire(&self) {
        let changed = self.status.send_if_modified(|current| {
            if *current == AuthStatus::Anonymous {
                false
            } else {
                *current = AuthStatus::Anonymous;
                true
            }
        });
        if changed {
            info!("Session ended, client is now anonymous");
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

fn status_name(status: &AuthStatus) -> &'static str {
    match status {
        AuthStatus::Uninitialized => "uninitialized",
        AuthStatus::Loading => "loading",
        AuthStatus::Authenticated(_) => "authenticated",
        AuthStatus::Anonymous => "anonymous",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        serde_json::from_value(serde_json::json!({"email": "admin@x.com"})).unwrap()
    }

    #[test]
    fn test_starts_uninitialized_and_loading() {
        let state = SessionState::new();
        assert_eq!(state.status(), AuthStatus::Uninitialized);
        assert!(state.is_loading());
        assert!(state.user().is_none());
    }

    #[test]
    fn test_settle_only_from_loading() {
        let state = SessionState::new();
        let previous = state.begin_loading();
        assert_eq!(previous, AuthStatus::Uninitialized);

        state.expire();
        assert!(!state.settle(AuthStatus::Authenticated(profile())));
        assert_eq!(state.status(), AuthStatus::Anonymous);

        state.begin_loading();
        assert!(state.settle(AuthStatus::Authenticated(profile())));
        assert!(state.is_authenticated());
        assert_eq!(state.user().unwrap().email, "admin@x.com");
    }

    #[test]
    fn test_subscribers_observe_expiry() {
        tokio_test::block_on(async {
            let state = SessionState::new();
            state.set(AuthStatus::Authenticated(profile()));
            let mut rx = state.subscribe();

            state.expire();
            rx.changed().await.unwrap();
            assert_eq!(*rx.borrow(), AuthStatus::Anonymous);
        });
    }
}
