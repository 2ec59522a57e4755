//! Basic usage of the Key-Value client
//!
//! Run with: KV_TOKEN=<your-token> cargo run --example basic
//! Without KV_TOKEN a new token is generated first.

use keyvalue_client::{Client, ClientConfig, Error, StoreRequest};
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // API_URL, KV_TOKEN, KV_TIMEOUT_MS
    let mut client = Client::with_config(ClientConfig::from_env())?;
    info!("Using {}", client.base_url());

    if client.token().is_none() {
        info!("No KV_TOKEN set, generating one...");
        let generated = client.generate(None).await?;
        info!("Generated token: {}", generated.token);
        client.set_token(generated.token);
    }

    // Store a document with a one hour TTL
    let stored = client
        .store(StoreRequest::new(json!({"temperature": 23.5, "unit": "C"})).ttl(3600))
        .await?;
    info!(
        "Stored {} bytes as version {} (tier: {}, expires: {:?})",
        stored.size, stored.version, stored.tier, stored.expires_at
    );

    // Read it back
    let fetched = client.retrieve(None).await?;
    info!("Retrieved version {}: {}", fetched.version, fetched.data);

    // Delete, then show what a second delete looks like
    let deleted = client.delete(None).await?;
    info!("Deleted: {}", deleted.message);

    match client.delete(None).await {
        Err(Error::NotFound { message }) => info!("Second delete: not found ({})", message),
        Err(e) => return Err(e.into()),
        Ok(_) => info!("Second delete unexpectedly succeeded"),
    }

    info!("Example completed successfully!");
    Ok(())
}
