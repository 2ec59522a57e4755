//! Client configuration

use std::env;
use std::time::Duration;

use crate::token::Token;

/// Default API endpoint
pub const DEFAULT_BASE_URL: &str = "https://key-value.co";

/// Default per-request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// TLS verification options
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// SHA-256 fingerprint of the server certificate to pin, hex with or
    /// without colons (e.g. "AB:CD:EF:..." or "abcdef...").
    /// Replaces CA verification and requires an https:// base URL.
    pub ssl_fingerprint: Option<String>,
    /// Accept any server certificate (self-signed development servers).
    pub accept_invalid_certs: bool,
}

/// Configuration options for the Key-Value client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL (default: https://key-value.co). Trailing slashes are ignored.
    pub base_url: String,
    /// Default token used when an operation is not given one explicitly
    pub token: Option<Token>,
    /// Request timeout in milliseconds (default: 30000, also used for `0`)
    pub timeout_ms: u64,
    /// TLS verification options
    pub tls: TlsOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            tls: TlsOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `API_URL` | `base_url` |
    /// | `KV_TOKEN` | `token` |
    /// | `KV_TIMEOUT_MS` | `timeout_ms` |
    /// | `KV_SSL_FINGERPRINT` | `tls.ssl_fingerprint` |
    /// | `KV_ACCEPT_INVALID_CERTS` | `tls.accept_invalid_certs` (`1`/`true`) |
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let base_url = env::var("API_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let token = env::var("KV_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .map(Token::new);
        let timeout_ms = env::var("KV_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        let ssl_fingerprint = env::var("KV_SSL_FINGERPRINT")
            .ok()
            .filter(|s| !s.trim().is_empty());
        let accept_invalid_certs = env::var("KV_ACCEPT_INVALID_CERTS")
            .map(|s| parse_flag(&s))
            .unwrap_or(false);

        ClientConfig {
            base_url,
            token,
            timeout_ms,
            tls: TlsOptions {
                ssl_fingerprint,
                accept_invalid_certs,
            },
        }
    }

    /// Request timeout as a `Duration`
    ///
    /// A `timeout_ms` of `0` means "unset" and gives the default.
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => Duration::from_millis(DEFAULT_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }
}

/// Strip trailing slashes so paths can be appended with `format!("{}{}", ..)`
pub(crate) fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_flag(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
