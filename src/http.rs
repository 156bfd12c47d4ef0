//! The authenticated HTTP client used by every call site

use log::warn;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use campus_admin_auth::{SessionState, TokenStore};

use crate::error::{ApiError, Error, ErrorKind, ErrorReport, ErrorReporter};
use crate::fetch::{ApiRequest, ApiResponse, FormPart};
use crate::middleware::{Middleware, Next, Transport};
use crate::retry::RetryPolicy;

/// Runs requests through the middleware chain and settles failures.
///
/// Cheap to clone; clones share the chain, the session and the store.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    middlewares: Arc<[Arc<dyn Middleware>]>,
    retry: RetryPolicy,
    reporter: Arc<dyn ErrorReporter>,
    store: Arc<TokenStore>,
    session: Arc<SessionState>,
}

impl HttpClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        middlewares: Vec<Arc<dyn Middleware>>,
        retry: RetryPolicy,
        reporter: Arc<dyn ErrorReporter>,
        store: Arc<TokenStore>,
        session: Arc<SessionState>,
    ) -> Self {
        Self {
            transport,
            middlewares: middlewares.into(),
            retry,
            reporter,
            store,
            session,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Sends `request` once through the chain.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let result = self.dispatch(request.clone()).await;
        self.settle(&request, result)
    }

    /// Sends `request` under the retry policy.
    pub async fn send_with_retry(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let result = self.retry.run(|| self.dispatch(request.clone())).await;
        self.settle(&request, result)
    }

    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let response = Next::new(self.transport.as_ref(), &self.middlewares)
            .run(request)
            .await?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::new(response.status, response.body).into())
        }
    }

    /// Reports a failure once and applies the session side effect of
    /// authentication failures.
    fn settle(
        &self,
        request: &ApiRequest,
        result: Result<ApiResponse, Error>,
    ) -> Result<ApiResponse, Error> {
        if let Err(err) = &result {
            let report = ErrorReport::new(err, request.path());
            if report.kind == ErrorKind::Auth && !request.is_public() {
                warn!("Authentication failed on {}, clearing session", request.path());
                self.store.clear();
                self.session.expire();
            }
            self.reporter.report(&report);
        }
        result
    }

    /// GET with retry, deserializing the (unwrapped) body.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Error> {
        let request = ApiRequest::get(path).query(params);
        self.send_with_retry(request).await?.into_json()
    }

    /// POST with retry
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let request = ApiRequest::post(path).json(body)?;
        self.send_with_retry(request).await?.into_json()
    }

    /// PUT with retry
    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let request = ApiRequest::put(path).json(body)?;
        self.send_with_retry(request).await?.into_json()
    }

    /// PATCH with retry
    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let request = ApiRequest::patch(path).json(body)?;
        self.send_with_retry(request).await?.into_json()
    }

    /// DELETE with retry; the response body is discarded.
    pub async fn delete(&self, path: &str) -> Result<(), Error> {
        self.send_with_retry(ApiRequest::delete(path)).await?;
        Ok(())
    }

    /// Multipart POST with retry
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<FormPart>,
    ) -> Result<T, Error> {
        let request = ApiRequest::post(path).form(parts);
        self.send_with_retry(request).await?.into_json()
    }

    /// Multipart PUT with retry
    pub async fn put_form<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<FormPart>,
    ) -> Result<T, Error> {
        let request = ApiRequest::put(path).form(parts);
        self.send_with_retry(request).await?.into_json()
    }
}
