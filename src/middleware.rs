//! Composable request/response pipeline around the HTTP transport
//!
//! A request enters the first [`Middleware`]; each one may rewrite it, hand it
//! to the rest of the chain through [`Next`] (as many times as it needs) and
//! rewrite the response on the way back. The last stage is the [`Transport`].

use async_trait::async_trait;
use log::trace;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::error::Error;
use crate::fetch::{parse_body, ApiRequest, ApiResponse, FormPart, RequestBody};

/// Sends a request and returns the response whatever its status.
///
/// Only failures where no response was received are errors here.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error>;
}

/// One stage of the pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse, Error>;
}

/// Cursor over the remaining stages. `Copy`, so a stage may resend.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a dyn Transport,
    rest: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn new(transport: &'a dyn Transport, middlewares: &'a [Arc<dyn Middleware>]) -> Self {
        Self {
            transport,
            rest: middlewares,
        }
    }

    /// Runs the remaining stages.
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, Error> {
        match self.rest.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    transport: self.transport,
                    rest,
                };
                stage.handle(request, next).await
            }
            None => self.transport.send(request).await,
        }
    }
}

/// [`Transport`] backed by `reqwest`.
pub struct ReqwestTransport {
    base_url: Url,
    http_client: Client,
}

impl ReqwestTransport {
    pub fn new(base_url: Url, http_client: Client) -> Self {
        Self {
            base_url,
            http_client,
        }
    }

    /// Builds the shared client with the per-request timeout.
    pub fn build_client(timeout: Duration) -> Result<Client, Error> {
        Ok(Client::builder().timeout(timeout).build()?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, Error> {
        let mut url = self.base_url.join(&request.path)?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn build_form(parts: &[FormPart]) -> Result<Form, Error> {
    let mut form = Form::new();
    for part in parts {
        form = match part {
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
            FormPart::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file.mime_str(mime)?;
                }
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let url = self.url_for(&request)?;
        trace!("{} {}", request.method, url);

        let mut builder = self
            .http_client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        Ok(ApiResponse {
            status,
            headers,
            body: parse_body(&text),
            pagination: None,
        })
    }
}
