use std::time::Duration;

use common::error::AppError;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Method, RequestBuilder, StatusCode,
};
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::credential::{Credential, CredentialResolver};

/// Applied when the caller does not ask for a specific timeout. Generation
/// calls can legitimately run for minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Builds pre-authenticated clients bound to the upstream base address.
#[derive(Clone, Debug)]
pub struct ClientFactory {
    base_url: String,
}

impl ClientFactory {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let parsed = Url::parse(base_url).map_err(|err| {
            AppError::Validation(format!("invalid upstream base url {base_url}: {err}"))
        })?;

        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_client(
        &self,
        credential: &Credential,
        timeout: Option<Duration>,
    ) -> Result<UpstreamClient, AppError> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);

        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|_| {
                AppError::Validation(
                    "API key contains characters that cannot be sent in a header".into(),
                )
            })?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(UpstreamClient {
            http,
            base_url: self.base_url.clone(),
            timeout,
        })
    }
}

/// A client for a single proxied call. Built fresh per call so the timeout
/// and the credential always reflect the current request.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .timeout(self.timeout)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.request(Method::POST, path)
    }

    /// Sends the request and decodes the body as JSON (falling back to a JSON
    /// string for non-JSON bodies).
    ///
    /// A 403 becomes `InvalidCredential`; every other non-2xx status becomes
    /// `Upstream` with the status and body preserved. Transport failures,
    /// including local timeouts, surface as `Reqwest`.
    pub async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Value, AppError> {
        let request = request.build()?;
        let method = request.method().clone();
        let path = request.url().path().to_string();

        let response = self.http.execute(request).await.map_err(|err| {
            error!(
                operation,
                %method,
                %path,
                timed_out = err.is_timeout(),
                error = %err,
                "upstream request failed before a response"
            );
            AppError::from(err)
        })?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let body = parse_body(&bytes);

        if status.is_success() {
            debug!(operation, %method, %path, status = status.as_u16(), "upstream call succeeded");
            return Ok(body);
        }

        error!(
            operation,
            %method,
            %path,
            status = status.as_u16(),
            body = %body,
            "upstream returned an error"
        );

        if status == StatusCode::FORBIDDEN {
            return Err(AppError::InvalidCredential);
        }

        Err(AppError::Upstream {
            status: status.as_u16(),
            body,
        })
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }

    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Credential resolution plus client construction, shared by every manager.
#[derive(Clone)]
pub struct Upstream {
    credentials: CredentialResolver,
    factory: ClientFactory,
}

impl Upstream {
    pub fn new(credentials: CredentialResolver, factory: ClientFactory) -> Self {
        Self {
            credentials,
            factory,
        }
    }

    /// Resolves the credential afresh and builds a client for one call.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<UpstreamClient, AppError> {
        let credential = self.credentials.resolve().await?;
        self.factory.build_client(&credential, timeout)
    }

    /// Checks the configured key against the upstream auth endpoint.
    pub async fn check_auth(&self) -> Result<Value, AppError> {
        let client = self.connect(None).await?;
        client.execute("auth", client.get("/api/v1/auth")).await
    }
}
