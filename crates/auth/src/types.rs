//! Wire types exchanged with the backend `auth/` endpoints

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Snapshot of the signed-in user, as cached under `user_data`.
///
/// Known flags are typed; every other field returned by the backend is kept
/// in `extra` so the cached snapshot round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user ID (numeric or UUID depending on the backend)
    #[serde(default)]
    pub id: Option<Value>,

    /// The user's email address
    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Set locally for accounts signed in through the admin login
    #[serde(default)]
    pub is_admin: bool,

    #[serde(default)]
    pub is_staff: bool,

    #[serde(default)]
    pub is_superuser: bool,

    /// Account category reported by the backend (`admin`, `professor`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<String>,

    #[serde(default)]
    pub roles: Vec<Value>,

    /// Permission name to grant flag
    #[serde(default)]
    pub permissions: HashMap<String, Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// Whether the profile carries any administrative flag.
    pub fn is_admin(&self) -> bool {
        self.is_admin || self.is_staff || self.is_superuser
    }

    /// Whether the named permission is granted.
    ///
    /// Only a JSON `true` counts as granted.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .get(permission)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Access/refresh pair as held by the token store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// `POST auth/admin/login/` response
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub permissions: HashMap<String, Value>,
}

impl LoginResponse {
    /// Merges the top-level login fields into the user snapshot.
    pub fn into_profile(self) -> (TokenPair, UserProfile) {
        let mut user = self.user;
        if self.user_type.is_some() {
            user.user_type = self.user_type;
        }
        if !self.permissions.is_empty() {
            user.permissions = self.permissions;
        }
        user.is_admin = true;

        let tokens = TokenPair {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
        };
        (tokens, user)
    }
}

/// `POST auth/refresh/` response
///
/// `refresh_token` is only present when the backend rotates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// `GET auth/profile/` response
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileResponse {
    pub user: UserProfile,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub roles: Vec<Value>,
    #[serde(default)]
    pub permissions: HashMap<String, Value>,
}

impl ProfileResponse {
    pub fn into_profile(self) -> UserProfile {
        let mut user = self.user;
        user.user_type = self.user_type.or(user.user_type);
        user.roles = self.roles;
        user.permissions = self.permissions;
        user
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_login_response_merges_top_level_fields() {
        let response: LoginResponse = serde_json::from_value(json!({
            "access_token": "a",
            "refresh_token": "r",
            "user": {"id": 7, "email": "admin@x.com", "is_staff": true, "phone": "0600"},
            "user_type": "admin",
            "permissions": {"manage_users": true, "delete_classes": false}
        }))
        .unwrap();

        let (tokens, user) = response.into_profile();
        assert_eq!(tokens.access_token, "a");
        assert_eq!(user.email, "admin@x.com");
        assert_eq!(user.user_type.as_deref(), Some("admin"));
        assert!(user.is_admin);
        assert!(user.has_permission("manage_users"));
        assert!(!user.has_permission("delete_classes"));
        assert!(!user.has_permission("unknown"));
        assert_eq!(user.extra.get("phone"), Some(&json!("0600")));
    }

    #[test]
    fn test_profile_snapshot_keeps_unknown_fields() {
        let user: UserProfile = serde_json::from_value(json!({
            "email": "prof@x.com",
            "matricule": "P-001"
        }))
        .unwrap();

        let cached = serde_json::to_string(&user).unwrap();
        let restored: UserProfile = serde_json::from_str(&cached).unwrap();
        assert_eq!(restored, user);
        assert_eq!(restored.extra.get("matricule"), Some(&json!("P-001")));
        assert!(!restored.is_admin());
    }
}
