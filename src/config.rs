//! Configuration options for the campus admin client

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use campus_admin_auth::DEFAULT_REFRESH_THRESHOLD;

use crate::error::Error;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1/";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Configuration options for the campus admin client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// API root; every endpoint path is resolved against it
    pub api_url: Url,

    /// The request timeout applied to every outbound call
    pub request_timeout: Duration,

    /// How long before expiry an access token is refreshed
    pub refresh_threshold: Duration,

    /// Attempts made by the retrying verb helpers
    pub retry_attempts: u32,

    /// Delay unit of the exponential backoff
    pub retry_base_delay: Duration,

    /// Persist the session to this file instead of keeping it in memory
    pub session_file: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: Duration::from_secs(1),
            session_file: None,
        }
    }
}

impl ClientOptions {
    /// Options pointing at `api_url`, everything else default.
    pub fn new(api_url: &str) -> Result<Self, Error> {
        Self::default().with_api_url(api_url)
    }

    /// Reads options from the environment, falling back to defaults.
    ///
    /// Recognised variables: `CAMPUS_API_URL`, `CAMPUS_REQUEST_TIMEOUT_MS`,
    /// `CAMPUS_REFRESH_THRESHOLD_SECS`, `CAMPUS_RETRY_ATTEMPTS`,
    /// `CAMPUS_SESSION_FILE`.
    pub fn from_env() -> Result<Self, Error> {
        let mut options = Self::default();

        if let Ok(url) = env::var("CAMPUS_API_URL") {
            options = options.with_api_url(&url)?;
        }
        if let Some(ms) = parse_var::<u64>("CAMPUS_REQUEST_TIMEOUT_MS")? {
            options.request_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>("CAMPUS_REFRESH_THRESHOLD_SECS")? {
            options.refresh_threshold = Duration::from_secs(secs);
        }
        if let Some(attempts) = parse_var::<u32>("CAMPUS_RETRY_ATTEMPTS")? {
            options = options.with_retry_attempts(attempts);
        }
        if let Ok(path) = env::var("CAMPUS_SESSION_FILE") {
            options.session_file = Some(PathBuf::from(path));
        }

        Ok(options)
    }

    /// Set the API root. A trailing `/` is added so relative paths join
    /// underneath it.
    pub fn with_api_url(mut self, value: &str) -> Result<Self, Error> {
        let normalized = if value.ends_with('/') {
            value.to_string()
        } else {
            format!("{}/", value)
        };
        self.api_url = Url::parse(&normalized)?;
        Ok(self)
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Duration) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the refresh look-ahead
    pub fn with_refresh_threshold(mut self, value: Duration) -> Self {
        self.refresh_threshold = value;
        self
    }

    /// Set the retry attempt count (at least one attempt is always made)
    pub fn with_retry_attempts(mut self, value: u32) -> Self {
        self.retry_attempts = value.max(1);
        self
    }

    /// Set the backoff delay unit
    pub fn with_retry_base_delay(mut self, value: Duration) -> Self {
        self.retry_base_delay = value;
        self
    }

    /// Persist the session in a JSON file
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, Error> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}
