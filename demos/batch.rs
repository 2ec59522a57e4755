//! Batch operations with the Key-Value client
//!
//! Run with: cargo run --example batch
//! Batch requests carry no default token; every operation names its own.

use keyvalue_client::{BatchOperation, Client, ClientConfig, PatchOperations};
use serde_json::json;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = Client::with_config(ClientConfig::from_env())?;

    // Two fresh tokens to work with
    let sensor_a = client.generate(None).await?.token;
    let sensor_b = client.generate(None).await?.token;
    info!("Tokens: {} / {}", sensor_a, sensor_b);

    let operations = vec![
        BatchOperation::store(&sensor_a, json!({"temperature": 21.0})).with_ttl(600),
        BatchOperation::store(&sensor_b, json!({"temperature": 19.5})),
        BatchOperation::retrieve(&sensor_a),
        // Stale version on purpose: fails without affecting the others
        BatchOperation::patch(&sensor_b, 42, PatchOperations::new().set("temperature", 20.0)),
        BatchOperation::delete(&sensor_b),
    ];

    info!("Executing batch with {} operations...", operations.len());
    let response = client.batch(operations).await?;

    for result in &response.results {
        if result.is_error() {
            warn!(
                "  {} {} failed: {}",
                result.action,
                result.token,
                result.error.as_deref().unwrap_or("unknown error")
            );
        } else {
            info!(
                "  {} {} ok (version: {:?}, data: {:?})",
                result.action, result.token, result.version, result.data
            );
        }
    }

    info!(
        "Summary: {}/{} succeeded ({})",
        response.summary.succeeded, response.summary.total, response.summary.success_rate
    );

    // Cleanup
    client
        .batch(vec![BatchOperation::delete(&sensor_a)])
        .await?;

    Ok(())
}
