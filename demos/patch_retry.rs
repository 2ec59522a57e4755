//! Optimistic concurrency: patch with a version guard and retry on conflict
//!
//! Run with: KV_TOKEN=<your-token> cargo run --example patch_retry

use keyvalue_client::{Client, ClientConfig, PatchOperations, PatchRequest, StoreRequest};
use serde_json::json;
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = Client::with_config(ClientConfig::from_env())?;

    client
        .store(StoreRequest::new(json!({"counter": 0, "profile": {"name": "Bob"}})))
        .await?;

    // Another writer holding a clone of the client races us
    let rival = client.clone();

    let mut attempt = 0;
    let updated = loop {
        attempt += 1;
        let current = client.retrieve(None).await?;
        let counter = current.data["counter"].as_i64().unwrap_or(0);

        if attempt == 1 {
            rival
                .store(StoreRequest::new(json!({"counter": 100, "profile": {"name": "Bob"}})))
                .await?;
        }

        let patch = PatchOperations::new()
            .set("counter", counter + 1)
            .set("profile.name", "Alice");

        match client.patch(PatchRequest::new(current.version, patch)).await {
            Ok(updated) => break updated,
            Err(e) if e.is_retryable_conflict() && attempt < MAX_ATTEMPTS => {
                warn!("Attempt {}: {}, re-reading", attempt, e);
            }
            Err(e) => return Err(e.into()),
        }
    };

    info!(
        "Patched after {} attempt(s): version {} -> {}",
        attempt, updated.version, updated.data
    );
    Ok(())
}
