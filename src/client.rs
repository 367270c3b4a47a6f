//! Data API client and request executor.
//!
//! The [`Client`] turns a [`RequestMetadata`] into one or more HTTP attempts.
//! Each attempt is classified by transport status only: 2xx returns, 4xx fails
//! immediately, and network errors, timeouts and 5xx are retried according to
//! the active [`RetryStrategy`]. Use [`ClientBuilder`] to configure clients.

use crate::{
    metadata::{RequestBody, RequestMetadata},
    retry::RetryStrategy,
    Error, Response, Result,
};
use http::{header::CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Data API version used in every URL.
pub const DEFAULT_API_VERSION: &str = "1.1";

/// The application version requests are addressed to.
///
/// Anything but [`Environment::Live`] is inserted in the URL as a
/// `/version-{name}` path segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    /// The live application; no version segment.
    Live,
    /// The development version (`/version-test`).
    #[default]
    Test,
    /// Any other named version (`/version-{name}`).
    Version(String),
}

impl Environment {
    /// Parses an environment name; `"live"` and `"test"` map to their variants.
    pub fn parse(name: &str) -> Self {
        match name {
            "live" => Environment::Live,
            "test" => Environment::Test,
            other => Environment::Version(other.to_string()),
        }
    }

    fn path_segment(&self) -> Option<String> {
        match self {
            Environment::Live => None,
            Environment::Test => Some("version-test".to_string()),
            Environment::Version(name) => Some(format!("version-{}", name)),
        }
    }
}

/// A client for one application's data API.
///
/// Cheap to clone: clones share the connection pool and configuration.
///
/// # Examples
///
/// ```no_run
/// use bubble_api::{Client, Environment, RetryStrategy};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), bubble_api::Error> {
/// let client = Client::builder()
///     .base_url("https://myapp.bubbleapps.io")?
///     .api_token("secret")
///     .environment(Environment::Live)
///     .timeout(Duration::from_secs(30))
///     .retry_strategy(RetryStrategy::Exponential {
///         initial_delay: Duration::from_millis(200),
///         max_delay: Duration::from_secs(10),
///         max_retries: 4,
///         jitter: true,
///     })
///     .build()?;
///
/// let id = client.create("User", &serde_json::json!({"name": "Ada"})).await?;
/// let user: serde_json::Value = client.get_by_id("User", &id).await?;
/// println!("{}", user);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    api_root: Url,
    api_token: Option<String>,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    timeout: Option<Duration>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match &self.inner.api_token {
            Some(token) => {
                let visible: String = token.chars().take(3).collect();
                let hidden = token.chars().count().saturating_sub(3);
                format!("{}{}", visible, "*".repeat(hidden))
            }
            None => "<none>".to_string(),
        };
        f.debug_struct("Client")
            .field("api_root", &self.inner.api_root.as_str())
            .field("api_token", &token)
            .field("retry_strategy", &self.inner.retry_strategy)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from environment variables.
    ///
    /// - `BUBBLE_BASE_URL` (required) - application URL, e.g. `https://myapp.bubbleapps.io`
    /// - `BUBBLE_API_TOKEN` (optional) - bearer token; anonymous access when unset
    /// - `BUBBLE_ENVIRONMENT` (optional) - `live`, `test` (default) or a version name
    /// - `BUBBLE_TIMEOUT_SECS` (optional) - per-request timeout
    /// - `BUBBLE_RETRIES` (optional) - retries with the default 200ms constant delay
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a variable is missing or malformed.
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("BUBBLE_BASE_URL")
            .map_err(|_| Error::ConfigurationError("BUBBLE_BASE_URL is not set".to_string()))?;
        let mut builder = ClientBuilder::new().base_url(base_url)?;

        if let Ok(token) = std::env::var("BUBBLE_API_TOKEN") {
            builder = builder.api_token(token);
        }
        if let Ok(env) = std::env::var("BUBBLE_ENVIRONMENT") {
            builder = builder.environment(Environment::parse(&env));
        }
        if let Ok(secs) = std::env::var("BUBBLE_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                Error::ConfigurationError(format!("BUBBLE_TIMEOUT_SECS is not a number: {}", secs))
            })?;
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Ok(retries) = std::env::var("BUBBLE_RETRIES") {
            let retries: usize = retries.parse().map_err(|_| {
                Error::ConfigurationError(format!("BUBBLE_RETRIES is not a number: {}", retries))
            })?;
            builder = builder.retry_strategy(RetryStrategy::Constant {
                delay: Duration::from_millis(200),
                max_retries: retries,
            });
        }

        builder.build()
    }

    /// The URL every request path is joined to, e.g.
    /// `https://myapp.bubbleapps.io/version-test/api/1.1/`.
    pub fn api_root(&self) -> &Url {
        &self.inner.api_root
    }

    /// The strategy used when a request has no override.
    pub fn retry_strategy(&self) -> &RetryStrategy {
        &self.inner.retry_strategy
    }

    /// Executes a request with retries and returns the raw successful response.
    ///
    /// Total attempts are bounded by `max_retries + 1` of the active strategy.
    /// Retries run as a loop, never recursively.
    ///
    /// # Errors
    ///
    /// - [`Error::HttpError`] for a 4xx, after exactly one attempt.
    /// - [`Error::MaxRetriesExceeded`] once transient failures use up the
    ///   retries; `last_error` tells a rejecting server from a silent network.
    pub async fn execute(&self, metadata: RequestMetadata) -> Result<Response<String>> {
        let strategy = metadata
            .retry_strategy
            .as_ref()
            .unwrap_or(&self.inner.retry_strategy);
        strategy.validate()?;

        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = match self.execute_request(&metadata, attempt).await {
                Ok(response) => {
                    self.read_response(response, start_time.elapsed(), attempt)
                        .await
                }
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            tracing::warn!(
                error = %error,
                attempt = attempt,
                method = %metadata.method,
                path = %metadata.path,
                "Request failed"
            );

            if !error.is_retryable() {
                return Err(error);
            }

            match strategy.delay_for_attempt(attempt) {
                Some(delay) => {
                    tracing::info!(
                        delay_ms = delay.as_millis(),
                        attempt = attempt,
                        "Retrying request after delay"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                None => {
                    return Err(Error::MaxRetriesExceeded {
                        attempts: attempt,
                        last_error: Box::new(error),
                    });
                }
            }
        }
    }

    /// Executes a request and decodes the JSON body.
    pub async fn call<Res>(&self, metadata: RequestMetadata) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        let response = self.execute(metadata).await?;
        let data = response.json::<Res>()?;
        Ok(response.map(|_| data))
    }

    pub(crate) fn url_for(&self, metadata: &RequestMetadata) -> Result<Url> {
        let mut url = self.inner.api_root.join(&metadata.path)?;
        if !metadata.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &metadata.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Executes a single attempt.
    async fn execute_request(
        &self,
        metadata: &RequestMetadata,
        attempt: usize,
    ) -> Result<reqwest::Response> {
        let url = self.url_for(metadata)?;

        tracing::debug!(
            method = %metadata.method,
            url = %url,
            attempt = attempt,
            "Executing HTTP request"
        );

        let mut request = self.inner.http_client.request(metadata.method.clone(), url);

        for (name, value) in &self.inner.default_headers {
            request = request.header(name, value);
        }
        if let Some(token) = &self.inner.api_token {
            request = request.bearer_auth(token);
        }

        match &metadata.body {
            Some(RequestBody::Json(json)) => {
                request = request.json(json);
            }
            Some(RequestBody::Text { content_type, body }) => {
                request = request
                    .header(CONTENT_TYPE, content_type.as_str())
                    .body(body.clone());
            }
            None => {}
        }

        // Request headers last so they win over defaults and the body's content type.
        for (name, value) in &metadata.headers {
            request = request.header(name, value);
        }

        if let Some(timeout) = self.inner.timeout {
            request = request.timeout(timeout);
        }

        Ok(request.send().await?)
    }

    /// Classifies the response of one attempt.
    async fn read_response(
        &self,
        response: reqwest::Response,
        latency: Duration,
        attempts: usize,
    ) -> Result<Response<String>> {
        let status = response.status();
        let headers = response.headers().clone();

        tracing::info!(
            status = status.as_u16(),
            latency_ms = latency.as_millis(),
            attempts = attempts,
            "Received HTTP response"
        );

        let raw_body = response.text().await?;

        if status.is_success() {
            return Ok(Response::new(
                raw_body.clone(),
                raw_body,
                status,
                headers,
                latency,
                attempts,
            ));
        }

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                response = %raw_body,
                "Client error (4xx)"
            );
        } else {
            tracing::warn!(
                status = status.as_u16(),
                response = %raw_body,
                "Server error"
            );
        }

        Err(Error::HttpError {
            status,
            raw_response: raw_body,
            headers,
        })
    }

    pub(crate) fn request(method: Method, path: impl Into<String>) -> RequestMetadata {
        RequestMetadata::new(method, path)
    }
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    base_url: Option<Url>,
    api_token: Option<String>,
    environment: Environment,
    api_version: String,
    default_headers: HeaderMap,
    retry_strategy: RetryStrategy,
    timeout: Option<Duration>,
}

impl ClientBuilder {
    /// Creates a builder: test environment, API 1.1, no token, default retries.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_token: None,
            environment: Environment::default(),
            api_version: DEFAULT_API_VERSION.to_string(),
            default_headers: HeaderMap::new(),
            retry_strategy: RetryStrategy::default(),
            timeout: None,
        }
    }

    /// Sets the application URL, e.g. `https://myapp.bubbleapps.io`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the bearer token. Without one, requests are sent anonymously.
    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the default retry strategy.
    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Sets the per-attempt timeout. A timed out attempt counts as transient.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided, the URL cannot be a base,
    /// or the retry strategy is invalid.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::ConfigurationError("Base URL is required".to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::ConfigurationError(format!(
                "{} cannot be used as a base URL",
                base_url
            )));
        }
        self.retry_strategy.validate()?;

        let mut root = base_url.as_str().trim_end_matches('/').to_string();
        if let Some(segment) = self.environment.path_segment() {
            root.push('/');
            root.push_str(&segment);
        }
        root.push_str("/api/");
        root.push_str(&self.api_version);
        root.push('/');
        let api_root = Url::parse(&root)?;

        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                api_root,
                api_token: self.api_token,
                default_headers: self.default_headers,
                retry_strategy: self.retry_strategy,
                timeout: self.timeout,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(env: Environment) -> Client {
        Client::builder()
            .base_url("https://example.com/")
            .unwrap()
            .environment(env)
            .build()
            .unwrap()
    }

    #[test]
    fn test_api_root_per_environment() {
        assert_eq!(
            client(Environment::Live).api_root().as_str(),
            "https://example.com/api/1.1/"
        );
        assert_eq!(
            client(Environment::Test).api_root().as_str(),
            "https://example.com/version-test/api/1.1/"
        );
        assert_eq!(
            client(Environment::Version("staging".to_string()))
                .api_root()
                .as_str(),
            "https://example.com/version-staging/api/1.1/"
        );
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("live"), Environment::Live);
        assert_eq!(Environment::parse("test"), Environment::Test);
        assert_eq!(
            Environment::parse("qa"),
            Environment::Version("qa".to_string())
        );
    }

    #[test]
    fn test_url_keeps_query_order() {
        let client = client(Environment::Live);
        let metadata = Client::request(Method::GET, "obj/user")
            .with_query_param("constraints", "[]")
            .with_query_param("cursor", "0")
            .with_query_param("limit", "100");
        assert_eq!(
            client.url_for(&metadata).unwrap().as_str(),
            "https://example.com/api/1.1/obj/user?constraints=%5B%5D&cursor=0&limit=100"
        );
    }

    #[test]
    fn test_url_without_query_has_no_question_mark() {
        let client = client(Environment::Live);
        let metadata = Client::request(Method::GET, "obj/user/123");
        assert_eq!(
            client.url_for(&metadata).unwrap().as_str(),
            "https://example.com/api/1.1/obj/user/123"
        );
    }

    #[test]
    fn test_base_url_required() {
        assert!(matches!(
            Client::builder().build(),
            Err(Error::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_invalid_power_strategy_rejected() {
        let result = Client::builder()
            .base_url("https://example.com")
            .unwrap()
            .retry_strategy(RetryStrategy::Power {
                base: Duration::from_millis(500),
                max_retries: 2,
            })
            .build();
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_debug_masks_token() {
        let client = Client::builder()
            .base_url("https://example.com")
            .unwrap()
            .api_token("abcdef")
            .build()
            .unwrap();
        let debug = format!("{:?}", client);
        assert!(debug.contains("abc***"));
        assert!(!debug.contains("abcdef"));
    }
}
