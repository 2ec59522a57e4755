//! Typed request builders
//!
//! Each API operation has its own request type implementing [`Endpoint`].
//! The client turns any endpoint into one HTTP call through a single send
//! path, so `store` and `patch` share `/api/store` without branching on an
//! operation tag.

use std::borrow::Cow;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::token::Token;
use crate::types::*;

/// Header carrying the access token
pub const TOKEN_HEADER: &str = "x-kv-token";

/// Maximum number of operations in one batch request (mirrors the server limit)
pub const MAX_BATCH_OPERATIONS: usize = 100;

/// Page size sent with history queries unless overridden
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// An API operation: where it goes, what it sends, what comes back
pub trait Endpoint {
    /// Decoded success body
    type Response: DeserializeOwned;

    /// HTTP method
    const METHOD: Method;

    /// Whether the `X-KV-Token` header is required
    const AUTHENTICATED: bool;

    /// Path relative to the base URL, including any query string
    fn path(&self) -> Cow<'_, str>;

    /// Serialized JSON body
    fn body(&self) -> Result<Option<Bytes>> {
        Ok(None)
    }

    /// Token given explicitly for this call, overriding the client default
    fn explicit_token(&self) -> Option<&Token> {
        None
    }

    /// Local precondition checks, run before any I/O
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn encode_json<T: Serialize>(body: &T) -> Result<Option<Bytes>> {
    serde_json::to_vec(body)
        .map(|v| Some(Bytes::from(v)))
        .map_err(|e| Error::InvalidRequest(format!("Failed to encode body: {}", e)))
}

/// `POST /api/generate`
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    turnstile_token: Option<String>,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    #[serde(rename = "turnstileToken", skip_serializing_if = "Option::is_none")]
    turnstile_token: Option<&'a str>,
}

impl GenerateRequest {
    /// Request a token, optionally passing a Cloudflare Turnstile response
    pub fn new(turnstile_token: Option<&str>) -> Self {
        Self {
            turnstile_token: turnstile_token
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }
}

impl Endpoint for GenerateRequest {
    type Response = GenerateResponse;
    const METHOD: Method = Method::POST;
    const AUTHENTICATED: bool = false;

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed("/api/generate")
    }

    fn body(&self) -> Result<Option<Bytes>> {
        encode_json(&GenerateBody {
            turnstile_token: self.turnstile_token.as_deref(),
        })
    }
}

/// `POST /api/store`
#[derive(Debug, Clone)]
pub struct StoreRequest {
    data: Value,
    ttl: Option<u64>,
    schema: Option<Value>,
    token: Option<Token>,
}

#[derive(Serialize)]
struct StoreBody<'a> {
    data: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a Value>,
}

impl StoreRequest {
    /// Store `data`, replacing the current document
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ttl: None,
            schema: None,
            token: None,
        }
    }

    /// Expire the document after `seconds`
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    /// JSON schema for the server to validate against. Not checked locally.
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Use this token instead of the client default
    pub fn token(mut self, token: impl Into<Token>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl Endpoint for StoreRequest {
    type Response = StoreResponse;
    const METHOD: Method = Method::POST;
    const AUTHENTICATED: bool = true;

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed("/api/store")
    }

    fn body(&self) -> Result<Option<Bytes>> {
        encode_json(&StoreBody {
            data: &self.data,
            ttl: self.ttl,
            schema: self.schema.as_ref(),
        })
    }

    fn explicit_token(&self) -> Option<&Token> {
        self.token.as_ref()
    }
}

/// `GET /api/retrieve`
#[derive(Debug, Clone, Default)]
pub struct RetrieveRequest {
    token: Option<Token>,
}

impl RetrieveRequest {
    /// Retrieve with an explicit token, or the client default when `None`
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(Token::from),
        }
    }
}

impl Endpoint for RetrieveRequest {
    type Response = RetrieveResponse;
    const METHOD: Method = Method::GET;
    const AUTHENTICATED: bool = true;

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed("/api/retrieve")
    }

    fn explicit_token(&self) -> Option<&Token> {
        self.token.as_ref()
    }
}

/// `DELETE /api/delete`
#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    token: Option<Token>,
}

impl DeleteRequest {
    /// Delete with an explicit token, or the client default when `None`
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: token.map(Token::from),
        }
    }
}

impl Endpoint for DeleteRequest {
    type Response = DeleteResponse;
    const METHOD: Method = Method::DELETE;
    const AUTHENTICATED: bool = true;

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed("/api/delete")
    }

    fn explicit_token(&self) -> Option<&Token> {
        self.token.as_ref()
    }
}

/// `PATCH /api/store`
#[derive(Debug, Clone)]
pub struct PatchRequest {
    version: u64,
    patch: PatchOperations,
    ttl: Option<u64>,
    token: Option<Token>,
}

#[derive(Serialize)]
struct PatchBody<'a> {
    version: u64,
    patch: &'a PatchOperations,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
}

impl PatchRequest {
    /// Apply `patch` if the stored version still equals `version`
    pub fn new(version: u64, patch: PatchOperations) -> Self {
        Self {
            version,
            patch,
            ttl: None,
            token: None,
        }
    }

    /// Reset the expiry to `seconds` from now
    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl = Some(seconds);
        self
    }

    /// Use this token instead of the client default
    pub fn token(mut self, token: impl Into<Token>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Version precondition sent with the request
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl Endpoint for PatchRequest {
    type Response = PatchResponse;
    const METHOD: Method = Method::PATCH;
    const AUTHENTICATED: bool = true;

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed("/api/store")
    }

    fn body(&self) -> Result<Option<Bytes>> {
        encode_json(&PatchBody {
            version: self.version,
            patch: &self.patch,
            ttl: self.ttl,
        })
    }

    fn explicit_token(&self) -> Option<&Token> {
        self.token.as_ref()
    }
}

/// `GET /api/history`
///
/// `limit` is always sent (default 50); the server caps it. The remaining
/// filters are only sent when set.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    limit: u32,
    before: Option<u64>,
    since: Option<String>,
    kind: Option<String>,
    token: Option<Token>,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_HISTORY_LIMIT,
            before: None,
            since: None,
            kind: None,
            token: None,
        }
    }
}

impl HistoryQuery {
    /// Newest events first, default page size
    pub fn new() -> Self {
        Self::default()
    }

    /// Page size
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Only events with `seq` strictly below this value
    pub fn before(mut self, seq: u64) -> Self {
        self.before = Some(seq);
        self
    }

    /// Only events created at or after this ISO-8601 timestamp
    pub fn since(mut self, timestamp: impl Into<String>) -> Self {
        self.since = Some(timestamp.into());
        self
    }

    /// Same as [`since`](Self::since), formatted as `YYYY-MM-DDTHH:MM:SSZ`
    pub fn since_time(self, time: DateTime<Utc>) -> Self {
        self.since(time.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    /// Only events the server classified as `kind` (the `type` parameter)
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Use this token instead of the client default
    pub fn token(mut self, token: impl Into<Token>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Form-urlencoded query, parameters in the order `limit, before, since, type`
    pub fn query_string(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("limit", &self.limit.to_string());
        if let Some(before) = self.before {
            query.append_pair("before", &before.to_string());
        }
        if let Some(since) = &self.since {
            query.append_pair("since", since);
        }
        if let Some(kind) = &self.kind {
            query.append_pair("type", kind);
        }
        query.finish()
    }
}

impl Endpoint for HistoryQuery {
    type Response = HistoryResponse;
    const METHOD: Method = Method::GET;
    const AUTHENTICATED: bool = true;

    fn path(&self) -> Cow<'_, str> {
        Cow::Owned(format!("/api/history?{}", self.query_string()))
    }

    fn explicit_token(&self) -> Option<&Token> {
        self.token.as_ref()
    }
}

/// `POST /api/batch`
///
/// Carries no `X-KV-Token`; each operation names its own token.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    operations: Vec<BatchOperation>,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    operations: &'a [BatchOperation],
}

impl BatchRequest {
    /// Wrap a list of operations
    pub fn new(operations: Vec<BatchOperation>) -> Self {
        Self { operations }
    }

    /// Operations in request order
    pub fn operations(&self) -> &[BatchOperation] {
        &self.operations
    }
}

impl Endpoint for BatchRequest {
    type Response = BatchResponse;
    const METHOD: Method = Method::POST;
    const AUTHENTICATED: bool = false;

    fn path(&self) -> Cow<'_, str> {
        Cow::Borrowed("/api/batch")
    }

    fn body(&self) -> Result<Option<Bytes>> {
        encode_json(&BatchBody {
            operations: &self.operations,
        })
    }

    fn validate(&self) -> Result<()> {
        let count = self.operations.len();
        if count == 0 || count > MAX_BATCH_OPERATIONS {
            return Err(Error::InvalidBatchSize {
                count,
                max: MAX_BATCH_OPERATIONS,
            });
        }
        Ok(())
    }
}
