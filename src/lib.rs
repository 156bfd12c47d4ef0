//! Campus Admin Rust Client Library
//!
//! The data layer of the school administration console: every operation is a
//! REST call to the backend, sent through an auth-aware pipeline that keeps the
//! session alive (silent refresh before expiry, one resend after a 401),
//! retries with backoff and reports failures once.

pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod middleware;
pub mod pagination;
pub mod resources;
pub mod retry;

use std::sync::Arc;

use campus_admin_auth::{
    FileStorage, HttpRefresher, RefreshCoordinator, SessionState, TokenClock, TokenStore,
};

use crate::auth::interceptor::BearerAuth;
use crate::auth::AuthSession;
use crate::config::ClientOptions;
use crate::error::{Error, ErrorReporter, LogReporter};
use crate::http::HttpClient;
use crate::middleware::{Middleware, ReqwestTransport};
use crate::pagination::PaginationMiddleware;
use crate::resources::ResourceClient;
use crate::retry::RetryPolicy;

/// The main entry point for the campus admin client
#[derive(Clone)]
pub struct CampusAdmin {
    /// Client options
    pub options: ClientOptions,

    /// Persisted credentials shared by every component
    store: Arc<TokenStore>,

    /// The one session of this client
    session: Arc<SessionState>,

    /// Single-flight token refresh
    coordinator: Arc<RefreshCoordinator>,

    /// Authenticated pipeline
    http: HttpClient,

    /// Login, logout and profile operations
    auth: AuthSession,
}

impl CampusAdmin {
    /// Create a new client
    ///
    /// # Example
    ///
    /// ```
    /// use campus_admin::{config::ClientOptions, CampusAdmin};
    ///
    /// let options = ClientOptions::new("http://localhost:8000/api/v1/").unwrap();
    /// let client = CampusAdmin::new(options).unwrap();
    /// assert!(!client.auth().is_authenticated());
    /// ```
    pub fn new(options: ClientOptions) -> Result<Self, Error> {
        Self::new_with_reporter(options, Arc::new(LogReporter))
    }

    /// Create a new client reading its options from the environment
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientOptions::from_env()?)
    }

    /// Create a new client whose failed calls go to `reporter`
    pub fn new_with_reporter(
        options: ClientOptions,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, Error> {
        let store = Arc::new(match &options.session_file {
            Some(path) => TokenStore::new(FileStorage::open(path)),
            None => TokenStore::in_memory(),
        });
        let session = Arc::new(SessionState::new());

        let http_client = ReqwestTransport::build_client(options.request_timeout)?;
        let refresher = HttpRefresher::new(&options.api_url, http_client.clone())?;
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            session.clone(),
            Arc::new(refresher),
        ));

        let middlewares: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(PaginationMiddleware),
            Arc::new(BearerAuth::new(
                store.clone(),
                coordinator.clone(),
                TokenClock::new(options.refresh_threshold),
            )),
        ];
        let retry =
            RetryPolicy::new(options.retry_attempts).with_base_delay(options.retry_base_delay);

        let http = HttpClient::new(
            Arc::new(ReqwestTransport::new(options.api_url.clone(), http_client)),
            middlewares,
            retry,
            reporter,
            store.clone(),
            session.clone(),
        );
        let auth = AuthSession::new(http.clone(), store.clone(), session.clone());

        Ok(Self {
            options,
            store,
            session,
            coordinator,
            http,
            auth,
        })
    }

    /// Session operations (login, logout, profile)
    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    /// The authenticated HTTP client, for endpoints without a resource client
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// CRUD client for any collection path
    pub fn resource(&self, collection: &str) -> ResourceClient {
        ResourceClient::new(self.http.clone(), collection)
    }

    pub fn classes(&self) -> ResourceClient {
        self.resource("classes/")
    }

    pub fn filieres(&self) -> ResourceClient {
        self.resource("filieres/")
    }

    pub fn modules(&self) -> ResourceClient {
        self.resource("modules/")
    }

    pub fn roles(&self) -> ResourceClient {
        self.resource("roles/")
    }

    pub fn users(&self) -> ResourceClient {
        self.resource("users/")
    }

    pub fn horaires(&self) -> ResourceClient {
        self.resource("horaires/")
    }

    pub fn plannings(&self) -> ResourceClient {
        self.resource("plannings/")
    }

    pub fn presences(&self) -> ResourceClient {
        self.resource("presences/")
    }
}

/// Re-export of the commonly used types
pub mod prelude {
    pub use crate::auth::guard::{GuardDecision, RouteAccess, RouteGuard};
    pub use crate::auth::{AuthSession, LogoutOutcome};
    pub use crate::config::ClientOptions;
    pub use crate::error::{ApiError, Error, ErrorKind, ErrorReport, ErrorReporter};
    pub use crate::fetch::{ApiRequest, ApiResponse, FormPart};
    pub use crate::http::HttpClient;
    pub use crate::pagination::{Page, Pagination};
    pub use crate::resources::ResourceClient;
    pub use crate::retry::{RetryOn, RetryPolicy};
    pub use crate::CampusAdmin;
    pub use campus_admin_auth::{AuthStatus, TokenPair, UserProfile};
}
