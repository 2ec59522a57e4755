//! Client for the Key-Value API

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{normalize_base_url, ClientConfig};
use crate::error::{Error, Result};
use crate::request::*;
use crate::response::decode;
use crate::token::Token;
use crate::transport::{HttpRequest, HttpTransport, Transport};
use crate::types::*;

/// Key-Value API client
///
/// One method per API operation. Operations that need a token use the token
/// passed to the call, else the client's default token, else fail with
/// [`Error::MissingToken`] without touching the network.
///
/// Cloning is cheap: clones share the connection pool and configuration,
/// but each clone has its own default token.
///
/// # Example
/// ```rust,no_run
/// use keyvalue_client::{Client, ClientConfig, StoreRequest};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<(), keyvalue_client::Error> {
///     // Default endpoint, existing token
///     let client = Client::new("word-word-word-word-word")?;
///     client.store(StoreRequest::new(json!({"temperature": 23.5})).ttl(3600)).await?;
///
///     // Self-hosted endpoint with a pinned certificate
///     let client = Client::with_config(ClientConfig {
///         base_url: "https://kv.internal:8443".to_string(),
///         tls: keyvalue_client::TlsOptions {
///             ssl_fingerprint: Some("AB:CD:EF:...".to_string()),
///             ..Default::default()
///         },
///         ..Default::default()
///     })?;
///     let token = client.generate(None).await?.token;
///     println!("new token: {}", token);
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    base_url: Arc<str>,
    timeout: Duration,
    token: Option<Token>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Client for the default endpoint with a default token
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_config(ClientConfig {
            token: Some(Token::new(token)),
            ..Default::default()
        })
    }

    /// Client for the default endpoint without a default token.
    /// Use it for `generate`, `batch`, or calls with explicit tokens.
    pub fn without_token() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Client from the environment, see [`ClientConfig::from_env`]
    pub fn from_env() -> Result<Self> {
        Self::with_config(ClientConfig::from_env())
    }

    /// Client with custom configuration and the default HTTP transport
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config.tls)?;
        Self::with_transport(config, transport)
    }

    /// Client with custom configuration and a caller-supplied transport.
    ///
    /// Of the TLS options, only the https requirement of `ssl_fingerprint` is
    /// checked here. Parsing the fingerprint and applying the options is the
    /// transport's job (see [`HttpTransport::new`]).
    pub fn with_transport(config: ClientConfig, transport: impl Transport) -> Result<Self> {
        let base_url = normalize_base_url(&config.base_url);
        let parsed = url::Url::parse(&base_url)
            .map_err(|e| Error::InvalidUrl(format!("Invalid base URL '{}': {}", base_url, e)))?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::InvalidUrl(format!(
                    "Unsupported URL scheme '{}', expected http or https",
                    other
                )))
            }
        }

        if config.tls.ssl_fingerprint.is_some() && parsed.scheme() != "https" {
            return Err(Error::Tls(
                "ssl_fingerprint requires an https:// base URL".to_string(),
            ));
        }

        Ok(Self {
            base_url: Arc::from(base_url),
            timeout: config.timeout(),
            token: config.token.filter(|t| !t.is_empty()),
            transport: Arc::new(transport),
        })
    }

    /// The base URL, without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The default token, if any
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(Token::as_str)
    }

    /// Replace the default token for subsequent calls
    pub fn set_token(&mut self, token: impl Into<String>) {
        let token = Token::new(token);
        self.token = (!token.is_empty()).then_some(token);
    }

    /// Remove the default token
    pub fn clear_token(&mut self) {
        self.token = None;
    }

    /// Generate a new 5-word token
    ///
    /// # Arguments
    /// * `turnstile_token` - Cloudflare Turnstile response, when the server requires one
    pub async fn generate(&self, turnstile_token: Option<&str>) -> Result<GenerateResponse> {
        self.send(&GenerateRequest::new(turnstile_token)).await
    }

    /// Store a JSON document, replacing the current one
    ///
    /// # Example
    /// ```rust,no_run
    /// # use keyvalue_client::{Client, StoreRequest};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), keyvalue_client::Error> {
    /// # let client = Client::new("word-word-word-word-word")?;
    /// let result = client
    ///     .store(StoreRequest::new(serde_json::json!({"temperature": 23.5})).ttl(3600))
    ///     .await?;
    /// println!("version {}, tier {}", result.version, result.tier);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn store(&self, request: StoreRequest) -> Result<StoreResponse> {
        self.send(&request).await
    }

    /// Store a document with the default token and no TTL
    pub async fn store_value(&self, data: Value) -> Result<StoreResponse> {
        self.store(StoreRequest::new(data)).await
    }

    /// Retrieve the document for `token`, or for the default token when `None`
    ///
    /// Fails with [`Error::NotFound`] when nothing is stored.
    pub async fn retrieve(&self, token: Option<&str>) -> Result<RetrieveResponse> {
        self.send(&RetrieveRequest::new(token)).await
    }

    /// Delete the document for `token`, or for the default token when `None`
    ///
    /// Deleting twice surfaces the server's 404 as [`Error::NotFound`].
    pub async fn delete(&self, token: Option<&str>) -> Result<DeleteResponse> {
        self.send(&DeleteRequest::new(token)).await
    }

    /// Apply a partial update guarded by the expected version
    ///
    /// A stale version fails with [`Error::VersionConflict`]; the caller
    /// decides whether to re-read and retry.
    ///
    /// # Example
    /// ```rust,no_run
    /// # use keyvalue_client::{Client, PatchOperations, PatchRequest};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), keyvalue_client::Error> {
    /// # let client = Client::new("word-word-word-word-word")?;
    /// let current = client.retrieve(None).await?;
    /// let patch = PatchOperations::new()
    ///     .set("profile.name", "Alice")
    ///     .remove("old_field");
    /// let updated = client.patch(PatchRequest::new(current.version, patch)).await?;
    /// assert_eq!(updated.version, current.version + 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn patch(&self, request: PatchRequest) -> Result<PatchResponse> {
        self.send(&request).await
    }

    /// Query the token's event history, newest first
    ///
    /// Use [`HistoryResponse::next_page`] to walk older pages.
    pub async fn history(&self, query: &HistoryQuery) -> Result<HistoryResponse> {
        self.send(query).await
    }

    /// Run up to 100 independent operations in one request
    ///
    /// Each operation carries its own token and succeeds or fails on its own.
    pub async fn batch(&self, operations: Vec<BatchOperation>) -> Result<BatchResponse> {
        self.send(&BatchRequest::new(operations)).await
    }

    fn resolve_token<'a>(&'a self, explicit: Option<&'a Token>) -> Result<&'a Token> {
        explicit
            .filter(|t| !t.is_empty())
            .or(self.token.as_ref())
            .ok_or(Error::MissingToken)
    }

    fn build_request<E: Endpoint>(&self, endpoint: &E) -> Result<HttpRequest> {
        endpoint.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if E::AUTHENTICATED {
            let token = self.resolve_token(endpoint.explicit_token())?;
            let mut value = HeaderValue::from_str(token.as_str()).map_err(|_| {
                Error::InvalidRequest("Token contains characters not allowed in a header".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(HeaderName::from_static(TOKEN_HEADER), value);
        }

        let body = endpoint.body()?;
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        Ok(HttpRequest {
            method: E::METHOD,
            url: format!("{}{}", self.base_url, endpoint.path()),
            headers,
            body,
        })
    }

    /// Single send path shared by every operation
    async fn send<E: Endpoint>(&self, endpoint: &E) -> Result<E::Response> {
        let request = self.build_request(endpoint)?;
        let path = endpoint.path();

        debug!("Sending request: {} {}", E::METHOD, path);
        let started = Instant::now();

        let response = tokio::time::timeout(self.timeout, self.transport.send(request))
            .await
            .map_err(|_| {
                warn!("{} {} timed out after {:?}", E::METHOD, path, self.timeout);
                Error::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                }
            })??;

        debug!(
            "{} {} -> {} in {:?}",
            E::METHOD,
            path,
            response.status.as_u16(),
            started.elapsed()
        );

        decode(response)
    }
}
