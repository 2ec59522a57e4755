//! Walk a token's history page by page
//!
//! Run with: KV_TOKEN=<your-token> cargo run --example history -- [type]

use keyvalue_client::{Client, ClientConfig, HistoryQuery};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let client = Client::with_config(ClientConfig::from_env())?;

    let mut query = HistoryQuery::new().limit(20);
    if let Some(kind) = std::env::args().nth(1) {
        query = query.kind(kind);
    }

    let mut page_number = 1;
    loop {
        let page = client.history(&query).await?;
        info!("Page {}: {} events", page_number, page.events.len());

        for event in &page.events {
            info!(
                "  #{} {} type={} value={}",
                event.seq,
                event.created_at.format("%Y-%m-%d %H:%M:%S"),
                event.classified_type.as_deref().unwrap_or("-"),
                event
                    .numeric_value
                    .map(|v| v.to_string())
                    .or_else(|| event.text_value.clone())
                    .unwrap_or_else(|| event.payload.to_string())
            );
        }

        match page.next_page(&query) {
            Some(next) => {
                query = next;
                page_number += 1;
            }
            None => break,
        }
    }

    info!("Reached the oldest event");
    Ok(())
}
