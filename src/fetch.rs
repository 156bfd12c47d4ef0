//! Request and response values flowing through the HTTP pipeline

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION},
    Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::pagination::Pagination;

/// Whether the request carries the session's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Bearer token attached, 401 handled by refresh-and-retry
    Authenticated,
    /// Sent as-is (login, password reset, ...)
    Public,
}

/// One part of a multipart form.
#[derive(Debug, Clone)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

/// Request payload.
///
/// Kept as plain data (not a `reqwest::Body`) so a request can be cloned and
/// sent again by the retry layers.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<FormPart>),
}

/// A request to the backend, relative to the configured API root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: RequestBody,
    pub(crate) access: Access,
    pub(crate) auth_retried: bool,
}

impl ApiRequest {
    /// Create a new request
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.trim_start_matches('/').to_string(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            access: Access::Authenticated,
            auth_retried: false,
        }
    }

    /// Create a GET request
    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request
    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// Create a PUT request
    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Create a PATCH request
    pub fn patch(path: &str) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Create a DELETE request
    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Mark the request as not needing credentials
    pub fn public(mut self) -> Self {
        self.access = Access::Public;
        self
    }

    /// Add a header to the request
    pub fn header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::general(format!("invalid header name {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::general(format!("invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Add query parameters to the request
    pub fn query<K: ToString, V: ToString>(mut self, params: &[(K, V)]) -> Self {
        self.query.extend(
            params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        );
        self
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Add a multipart form body to the request
    pub fn form(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_public(&self) -> bool {
        self.access == Access::Public
    }

    /// Whether this request was already resent after a 401.
    pub fn auth_retried(&self) -> bool {
        self.auth_retried
    }

    pub(crate) fn mark_auth_retried(&mut self) {
        self.auth_retried = true;
    }

    /// Add bearer token authentication to the request
    pub(crate) fn set_bearer(&mut self, token: &str) -> Result<(), Error> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| Error::general("access token contains invalid header characters"))?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub(crate) fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    }
}

/// A backend response with its body already read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// JSON body; `Null` when empty, a string when the body is not JSON
    pub body: Value,
    /// Set when the body was a paginated envelope
    pub pagination: Option<Pagination>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
            pagination: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialize the body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Deserialize the body, consuming the response
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.body)?)
    }
}

/// Parses a raw response body the way the pipeline stores it.
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let request = ApiRequest::get("/classes/")
            .query(&[("page", "2"), ("filiere", "3")])
            .header("X-Client", "console")
            .unwrap();

        assert_eq!(request.path(), "classes/");
        assert_eq!(request.query.len(), 2);
        assert_eq!(request.access(), Access::Authenticated);
        assert!(!request.auth_retried());
        assert_eq!(request.headers.get("x-client").unwrap(), "console");
    }

    #[test]
    fn test_bearer_roundtrip() {
        let mut request = ApiRequest::post("users/").public();
        assert!(request.is_public());
        assert!(request.bearer().is_none());

        request.set_bearer("abc.def.ghi").unwrap();
        assert_eq!(request.bearer(), Some("abc.def.ghi"));
        assert!(request.set_bearer("bad\ntoken").is_err());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\": 1}"), json!({"a": 1}));
        assert_eq!(parse_body("<html>"), json!("<html>"));
    }
}
