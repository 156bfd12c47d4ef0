//! Error handling for the campus admin client

use log::error;
use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use campus_admin_auth::AuthError;

/// Unified error type for the campus admin client
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failures: no response received (connect, timeout, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("{0}")]
    Api(#[from] ApiError),

    /// The session could not be kept alive (refresh failed or missing)
    #[error("Session expired: {0}")]
    Session(#[from] AuthError),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Authentication flow errors carrying a user-facing message
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new authentication error
    pub fn auth<T: fmt::Display>(msg: T) -> Self {
        Error::Auth(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// The taxonomy class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http(_) => ErrorKind::Network,
            Error::Api(api) => api.kind,
            Error::Session(_) | Error::Auth(_) => ErrorKind::Auth,
            Error::Json(_) | Error::Url(_) | Error::Config(_) | Error::General(_) => {
                ErrorKind::Server
            }
        }
    }

    /// HTTP status of the backend response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api(api) => Some(api.status),
            Error::Http(err) => err.status(),
            _ => None,
        }
    }

    /// The session could not be kept alive; retrying cannot help.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Session(_))
    }

    /// Network failures and 5xx responses.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::Api(api) => api.status.is_server_error(),
            _ => false,
        }
    }

    /// Human-readable message for notifications.
    pub fn user_message(&self) -> String {
        match self {
            Error::Api(api) => api.message.clone(),
            Error::Auth(message) => message.clone(),
            other => other.kind().default_message().to_string(),
        }
    }
}

/// Error classes shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Auth,
    Permission,
    Csrf,
    Validation,
    NotFound,
    Server,
}

impl ErrorKind {
    /// Maps a response status (and its body, for CSRF detection) to a class.
    pub fn from_status(status: StatusCode, body: &Value) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => ErrorKind::Auth,
            StatusCode::FORBIDDEN => {
                let csrf = body
                    .get("detail")
                    .and_then(Value::as_str)
                    .map_or(false, |detail| detail.contains("CSRF"));
                if csrf {
                    ErrorKind::Csrf
                } else {
                    ErrorKind::Permission
                }
            }
            StatusCode::BAD_REQUEST => ErrorKind::Validation,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            _ => ErrorKind::Server,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "Erreur de connexion au serveur",
            ErrorKind::Auth => "Session expirée, veuillez vous reconnecter",
            ErrorKind::Validation => "Données invalides",
            ErrorKind::Server => "Une erreur est survenue sur le serveur",
            ErrorKind::NotFound => "Ressource non trouvée",
            ErrorKind::Permission => "Vous n'avez pas les permissions nécessaires",
            ErrorKind::Csrf => "Erreur de sécurité CSRF",
        }
    }
}

/// A non-success response from the backend.
#[derive(Error, Debug, Clone)]
#[error("{message} ({status})")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status: StatusCode,
    pub message: String,
    /// Raw response body
    pub body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, body: Value) -> Self {
        let kind = ErrorKind::from_status(status, &body);
        let message = extract_message(&body).unwrap_or_else(|| kind.default_message().to_string());
        Self {
            kind,
            status,
            message,
            body,
        }
    }

    /// Same kind and status, with the message shown to the user replaced.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// The backend's `error` field, used by the auth endpoints.
    pub fn backend_error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

/// Picks the most useful message out of a Django REST error body.
///
/// Preference: `detail`, then `non_field_errors`, then every field error.
/// Non-object bodies (HTML error pages, plain text) yield nothing.
pub fn extract_message(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => {
            if let Some(detail) = map.get("detail").and_then(Value::as_str) {
                return Some(detail.to_string());
            }
            if let Some(Value::Array(items)) = map.get("non_field_errors") {
                return Some(join_values(items, ", "));
            }
            let formatted = format_field_errors(body);
            (!formatted.is_empty()).then_some(formatted)
        }
        _ => None,
    }
}

fn format_field_errors(errors: &Value) -> String {
    match errors {
        Value::String(text) => text.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(field, messages)| match messages {
                Value::Array(items) => format!("{}: {}", field, join_values(items, ", ")),
                Value::Object(_) => format_field_errors(messages),
                Value::String(text) => format!("{}: {}", field, text),
                other => format!("{}: {}", field, other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn join_values(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| match item {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// What the error reporter receives for each failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub path: String,
}

impl ErrorReport {
    pub fn new(error: &Error, path: &str) -> Self {
        Self {
            kind: error.kind(),
            message: error.user_message(),
            status: error.status().map(|s| s.as_u16()),
            path: path.to_string(),
        }
    }
}

/// Global sink for failed calls (the UI shows these as notifications).
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: &ErrorReport);
}

/// Default reporter: writes the failure to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, report: &ErrorReport) {
        error!(
            "[{:?}] {} {}: {}",
            report.kind,
            report.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            report.path,
            report.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        let empty = Value::Null;
        assert_eq!(ErrorKind::from_status(StatusCode::UNAUTHORIZED, &empty), ErrorKind::Auth);
        assert_eq!(ErrorKind::from_status(StatusCode::BAD_REQUEST, &empty), ErrorKind::Validation);
        assert_eq!(ErrorKind::from_status(StatusCode::NOT_FOUND, &empty), ErrorKind::NotFound);
        assert_eq!(
            ErrorKind::from_status(StatusCode::INTERNAL_SERVER_ERROR, &empty),
            ErrorKind::Server
        );
        assert_eq!(ErrorKind::from_status(StatusCode::BAD_GATEWAY, &empty), ErrorKind::Server);
        assert_eq!(
            ErrorKind::from_status(StatusCode::FORBIDDEN, &json!({"detail": "Forbidden"})),
            ErrorKind::Permission
        );
        assert_eq!(
            ErrorKind::from_status(
                StatusCode::FORBIDDEN,
                &json!({"detail": "CSRF Failed: CSRF token missing."})
            ),
            ErrorKind::Csrf
        );
    }

    #[test]
    fn test_message_prefers_detail() {
        let err = ApiError::new(
            StatusCode::NOT_FOUND,
            json!({"detail": "Classe introuvable", "code": "x"}),
        );
        assert_eq!(err.message, "Classe introuvable");
    }

    #[test]
    fn test_message_non_field_errors() {
        let err = ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({"non_field_errors": ["Dates invalides", "Conflit d'horaire"]}),
        );
        assert_eq!(err.message, "Dates invalides, Conflit d'horaire");
    }

    #[test]
    fn test_message_field_errors_nested() {
        let err = ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({
                "email": ["This field is required."],
                "profile": {"phone": "Invalid number"}
            }),
        );
        assert_eq!(err.message, "email: This field is required.\nphone: Invalid number");
    }

    #[test]
    fn test_message_falls_back_to_kind_default() {
        let err = ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, Value::Null);
        assert_eq!(err.message, ErrorKind::Server.default_message());

        let err = ApiError::new(StatusCode::FORBIDDEN, json!({}));
        assert_eq!(err.message, ErrorKind::Permission.default_message());
    }

    #[test]
    fn test_session_error_is_auth_kind() {
        let err = Error::from(AuthError::MissingRefreshToken);
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert!(err.is_session_expired());
        assert!(!err.is_transient());
        assert_eq!(err.user_message(), ErrorKind::Auth.default_message());
    }

    #[test]
    fn test_message_override_keeps_classification() {
        let err = ApiError::new(
            StatusCode::BAD_REQUEST,
            json!({"error": "Mot de passe actuel incorrect"}),
        );
        let message = err.backend_error().unwrap().to_string();
        let err = Error::Api(err.with_message(message));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.user_message(), "Mot de passe actuel incorrect");
        assert_eq!(
            ErrorKind::Network.default_message(),
            "Erreur de connexion au serveur"
        );
    }
}
