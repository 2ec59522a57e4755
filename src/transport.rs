//! HTTP transport layer
//!
//! The client talks to the network only through the [`Transport`] trait, so
//! the default hyper-based implementation can be swapped for an in-process
//! one (see [`crate::testing::MockTransport`]).

use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http::{HeaderMap, Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::rt::TokioExecutor;

use crate::config::TlsOptions;
use crate::error::{Error, Result};
use crate::tls::build_client_config;

/// Boxed future returned by [`Transport::send`]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A fully built HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL, including the query string
    pub url: String,
    /// Request headers
    pub headers: HeaderMap,
    /// JSON body, if any
    pub body: Option<Bytes>,
}

/// A fully buffered HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

/// Sends one request and buffers the response.
///
/// Implementations report network failures as [`Error::Transport`] and must
/// not interpret the status code. Timeouts are applied by the caller, which
/// drops the returned future on expiry.
pub trait Transport: Send + Sync + 'static {
    /// Send the request
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;

/// Default transport: pooled hyper client over rustls.
///
/// Speaks HTTP/1.1 and HTTP/2; over TLS the version is picked by ALPN.
#[derive(Clone)]
pub struct HttpTransport {
    client: HttpClient<HttpsConnector, Full<Bytes>>,
}

impl HttpTransport {
    /// Build the transport with the given TLS options
    pub fn new(tls: &TlsOptions) -> Result<Self> {
        let tls_config = build_client_config(tls)?;

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_all_versions()
            .build();

        let client = HttpClient::builder(TokioExecutor::new()).build(https_connector);

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            let uri: Uri = request
                .url
                .parse()
                .map_err(|e| Error::InvalidUrl(format!("Invalid request URL: {}", e)))?;

            let mut builder = Request::builder().method(request.method).uri(uri);
            if let Some(headers) = builder.headers_mut() {
                headers.extend(request.headers);
            }
            let req = builder
                .body(Full::new(request.body.unwrap_or_default()))
                .map_err(|e| Error::InvalidRequest(format!("Failed to build request: {}", e)))?;

            let response = self
                .client
                .request(req)
                .await
                .map_err(|e| Error::Transport(format!("Request failed: {}", error_chain(&e))))?;

            let (parts, body) = response.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| Error::Transport(format!("Failed to read response body: {}", e)))?
                .to_bytes();

            Ok(HttpResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }
}

/// Flatten an error and its sources into one line.
/// hyper-util reports only "client error (Connect)" at the top level.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
