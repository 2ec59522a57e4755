//! Async client for the Key-Value JSON storage API
//!
//! Store, retrieve, patch and delete JSON documents addressed by a 5-word
//! token, query a token's event history, and run batches of up to 100
//! operations in one request.
//!
//! # Features
//! - One typed method per API operation
//! - Default token with per-call override
//! - Optimistic concurrency on `patch` with a distinct conflict error
//! - HTTP/1.1 and HTTP/2 over rustls, with optional certificate pinning
//! - Per-request timeout that aborts the in-flight call
//! - Pluggable [`Transport`] for tests and custom stacks
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use keyvalue_client::{Client, Error, HistoryQuery, PatchOperations, PatchRequest, StoreRequest};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new("your-five-word-token-here")?;
//!
//!     let stored = client
//!         .store(StoreRequest::new(json!({"temperature": 23.5})).ttl(3600))
//!         .await?;
//!     println!("Stored version {}", stored.version);
//!
//!     let patch = PatchOperations::new().set("humidity", 40);
//!     match client.patch(PatchRequest::new(stored.version, patch)).await {
//!         Ok(updated) => println!("Now at version {}", updated.version),
//!         Err(Error::VersionConflict { .. }) => println!("Someone else wrote first"),
//!         Err(e) => return Err(e),
//!     }
//!
//!     let history = client.history(&HistoryQuery::new().limit(10)).await?;
//!     println!("{} events", history.events.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod response;
pub mod testing;
mod tls;
pub mod token;
pub mod transport;
pub mod types;

pub use client::Client;
pub use config::{ClientConfig, TlsOptions};
pub use error::{Error, Result};
pub use request::{
    BatchRequest, DeleteRequest, Endpoint, GenerateRequest, HistoryQuery, PatchRequest,
    RetrieveRequest, StoreRequest, MAX_BATCH_OPERATIONS,
};
pub use token::Token;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
pub use types::*;
