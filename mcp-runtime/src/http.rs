use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde_json::{Value, json};
use tracing::{debug, error, warn};

use crate::credentials::{CredentialCache, GuestTokenProvider};
use crate::error::{ApiError, HttpError};

/// Description of one upstream call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Path relative to the base URL, or an absolute `http(s)://` URL
    pub endpoint: String,
    pub method: Method,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub requires_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            query: Vec::new(),
            body: None,
            requires_auth: true,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn unauthenticated(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Unauthenticated HTTP plumbing: URL resolution, headers, body parsing.
#[derive(Debug, Clone)]
pub struct Transport {
    http: reqwest::Client,
    base_url: String,
}

impl Transport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resolve_url(&self, request: &ApiRequest) -> Result<Url, HttpError> {
        let raw = if request.endpoint.starts_with("http") {
            request.endpoint.clone()
        } else {
            let path = request.endpoint.trim_start_matches('/');
            format!("{}/{}", self.base_url.trim_end_matches('/'), path)
        };
        let mut url = Url::parse(&raw).map_err(|e| HttpError::invalid_url(&raw, e))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Sends the request once. Non-2xx statuses are returned, not raised;
    /// only transport failures are errors here.
    pub async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, HttpError> {
        let url = self.resolve_url(request)?;
        debug!(
            method = %request.method,
            url = %url,
            authorization = if bearer.is_some() { "Bearer ***" } else { "none" },
            "HTTP request"
        );

        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            error!(method = %request.method, url = %url, error = %e, "HTTP request failed");
            HttpError::transport(e)
        })?;
        let status = response.status();
        let text = response.text().await.map_err(HttpError::transport)?;
        let body = parse_response_body(&text);

        debug!(method = %request.method, url = %url, status = status.as_u16(), "HTTP response");
        Ok(ApiResponse { status, body })
    }
}

/// Authenticated request executor. The only path to the upstream API.
///
/// Attaches the cached guest credential (fetching one if the cache is empty)
/// and retries exactly once after an unauthorized response with a fresh
/// credential.
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: Transport,
    credentials: Arc<CredentialCache>,
    provider: GuestTokenProvider,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<CredentialCache>) -> Self {
        let transport = Transport::new(base_url);
        let provider = GuestTokenProvider::new(transport.clone(), credentials.clone());
        Self {
            transport,
            credentials,
            provider,
        }
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let mut is_retry = false;
        loop {
            let bearer = if request.requires_auth {
                Some(self.bearer_token().await?)
            } else {
                None
            };

            let response = self.transport.send(request, bearer.as_deref()).await?;
            if response.status.is_success() {
                return Ok(response.body);
            }

            if response.status == StatusCode::UNAUTHORIZED && request.requires_auth && !is_retry {
                warn!(endpoint = %request.endpoint, "Received 401, clearing cached token and retrying");
                self.credentials.clear();
                is_retry = true;
                continue;
            }

            return Err(HttpError::status(response.status, response.body).into());
        }
    }

    async fn bearer_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self.credentials.get() {
            return Ok(token);
        }
        debug!("No cached token, fetching new token");
        Ok(self.provider.fetch_fresh().await?)
    }
}

/// Parses a response body as JSON, wrapping non-JSON text as `{"raw": text}`.
fn parse_response_body(text: &str) -> Value {
    if text.is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "raw": text }))
}
