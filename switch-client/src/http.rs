//! # Request/Response Adapter
//!
//! Purpose: Carry one operation per HTTP call, attaching the service key and
//! access credential, and map the status code to success or failure.
//!
//! ## Design Principles
//! 1. **Seam at the Wire**: `HttpTransport` takes a fully built request and
//!    returns status + body, so tests can swap in a recording transport.
//! 2. **One Call per Invocation**: No pipelining and no retries; a failure is
//!    reported exactly once.
//! 3. **Strict Success**: Only `200 OK` counts as success, matching the
//!    service's contract.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

use switch_common::{OperationKind, SwitchError, SwitchResult};

use crate::transport::Outbound;

const JSON: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Fully resolved outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    /// JSON body, when the call carries one.
    pub body: Option<String>,
}

impl HttpRequest {
    /// Returns the first header value named `name`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Failure below the HTTP layer (DNS, connect, TLS, reset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure(pub String);

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportFailure {}

/// Executes one HTTP call.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure>;
}

/// `HttpTransport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> SwitchResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| SwitchError::Configuration(format!("http client: {err}")))?;
        Ok(ReqwestTransport { client })
    }

    /// Wraps an existing client, e.g. one with custom TLS roots.
    pub fn with_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportFailure> {
        let mut builder = self.client.request(request.method.into(), request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, JSON).body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| TransportFailure(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TransportFailure(err.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Method and path for each operation.
///
/// `Delete` is sent to `Set`, not `Delete`: that is where the service has
/// always accepted removals.
pub fn route(kind: OperationKind) -> (HttpMethod, &'static str) {
    match kind {
        OperationKind::List => (HttpMethod::Post, "List"),
        OperationKind::Add => (HttpMethod::Post, "Add"),
        OperationKind::Set => (HttpMethod::Post, "Set"),
        OperationKind::Delete => (HttpMethod::Delete, "Set"),
        OperationKind::SendMail => (HttpMethod::Post, "SendGrid/Send"),
    }
}

/// Builds and issues request/response calls against one base address.
pub(crate) struct RequestAdapter {
    transport: Arc<dyn HttpTransport>,
    base: Url,
    api_key: String,
}

impl RequestAdapter {
    pub(crate) fn new(transport: Arc<dyn HttpTransport>, base: Url, api_key: impl Into<String>) -> Self {
        RequestAdapter {
            transport,
            base,
            api_key: api_key.into(),
        }
    }

    /// Builds the call for `kind` without sending it.
    pub(crate) fn build(&self, kind: OperationKind, token: &str, outbound: &Outbound) -> SwitchResult<HttpRequest> {
        let (method, path) = route(kind);
        let url = self
            .base
            .join(path)
            .map_err(|err| SwitchError::Configuration(format!("{kind} address: {err}")))?;

        let mut headers = vec![
            ("Accept", JSON.to_string()),
            ("APIKey", self.api_key.clone()),
            ("AccessToken", token.to_string()),
        ];
        if let Some(list) = outbound.list() {
            headers.push(("List", list.to_string()));
        }
        if let Outbound::Delete { item_id, .. } = outbound {
            headers.push(("ListItemId", item_id.clone()));
        }

        Ok(HttpRequest {
            method,
            url,
            headers,
            body: outbound.body().map(str::to_string),
        })
    }

    /// Sends one call and returns the raw body of a `200` response.
    pub(crate) async fn call(&self, kind: OperationKind, token: &str, outbound: &Outbound) -> SwitchResult<String> {
        let request = self.build(kind, token, outbound)?;
        tracing::debug!(operation = %kind, url = %request.url, "sending request");

        let response = self
            .transport
            .execute(request)
            .await
            .map_err(|err| SwitchError::remote_event(kind, err.to_string()))?;

        if response.status != 200 {
            return Err(SwitchError::remote_status(kind, response.status, response.body));
        }
        Ok(response.body)
    }
}
