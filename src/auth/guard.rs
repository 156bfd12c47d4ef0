//! Route gating on the session status

use campus_admin_auth::AuthStatus;

/// Which side of the login wall a route lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Only for signed-in users (dashboard, classes, planning, ...)
    Protected,
    /// Only for anonymous users (login, forgot password)
    Public,
}

/// What the router should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Status not known yet; render nothing
    Pending,
    Render,
    Redirect {
        to: String,
        /// Location to come back to after signing in
        from: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
    home_path: String,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            home_path: "/".to_string(),
        }
    }
}

impl RouteGuard {
    pub fn new(login_path: &str, home_path: &str) -> Self {
        Self {
            login_path: login_path.to_string(),
            home_path: home_path.to_string(),
        }
    }

    /// Decides a navigation to `location`.
    ///
    /// `from` is the location remembered by an earlier redirect to the login
    /// page; public routes send an authenticated user back there.
    pub fn check(
        &self,
        access: RouteAccess,
        status: &AuthStatus,
        location: &str,
        from: Option<&str>,
    ) -> GuardDecision {
        if status.is_loading() {
            return GuardDecision::Pending;
        }

        match (access, status.is_authenticated()) {
            (RouteAccess::Protected, false) => GuardDecision::Redirect {
                to: self.login_path.clone(),
                from: Some(location.to_string()),
            },
            (RouteAccess::Public, true) => GuardDecision::Redirect {
                to: from.unwrap_or(self.home_path.as_str()).to_string(),
                from: None,
            },
            _ => GuardDecision::Render,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_admin_auth::UserProfile;

    fn signed_in() -> AuthStatus {
        let user: UserProfile =
            serde_json::from_value(serde_json::json!({"email": "admin@x.com"})).unwrap();
        AuthStatus::Authenticated(user)
    }

    #[test]
    fn test_loading_renders_nothing() {
        let guard = RouteGuard::default();
        for access in [RouteAccess::Protected, RouteAccess::Public] {
            assert_eq!(
                guard.check(access, &AuthStatus::Loading, "/classe", None),
                GuardDecision::Pending
            );
            assert_eq!(
                guard.check(access, &AuthStatus::Uninitialized, "/classe", None),
                GuardDecision::Pending
            );
        }
    }

    #[test]
    fn test_protected_route_redirects_anonymous_to_login() {
        let decision = RouteGuard::default().check(
            RouteAccess::Protected,
            &AuthStatus::Anonymous,
            "/planning",
            None,
        );
        assert_eq!(
            decision,
            GuardDecision::Redirect {
                to: "/login".to_string(),
                from: Some("/planning".to_string())
            }
        );
    }

    #[test]
    fn test_public_route_sends_user_back() {
        let guard = RouteGuard::default();
        assert_eq!(
            guard.check(RouteAccess::Public, &signed_in(), "/login", Some("/planning")),
            GuardDecision::Redirect {
                to: "/planning".to_string(),
                from: None
            }
        );
        assert_eq!(
            guard.check(RouteAccess::Public, &signed_in(), "/login", None),
            GuardDecision::Redirect {
                to: "/".to_string(),
                from: None
            }
        );
        assert_eq!(
            guard.check(RouteAccess::Protected, &signed_in(), "/classe", None),
            GuardDecision::Render
        );
        assert_eq!(
            guard.check(RouteAccess::Public, &AuthStatus::Anonymous, "/login", None),
            GuardDecision::Render
        );
    }
}
