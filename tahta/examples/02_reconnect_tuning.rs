use std::time::Duration;

use tahta::{Feed, ReconnectConfig, Tahta};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=tahta=debug shows reconnect attempts and dropped frames
    // when the crate is built with the `tracing` feature.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TAHTA_WS_URL").ok())
        .ok_or("usage: 02_reconnect_tuning <connection-url>")?;

    // Retry harder than the defaults: eight attempts, starting at 1s and
    // capping at 15s.
    let client = Tahta::builder()
        .reconnect(ReconnectConfig {
            max_attempts: 8,
            base_delay_ms: 1_000,
            max_delay_ms: 15_000,
        })
        .build();

    client.connect(&url).await?;
    let _sub = client.subscribe(["AAPL", "MSFT"], Feed::LiveUs, |update| {
        println!("{} -> {}", update.symbol(), update.close_price());
    });

    for _ in 0..12 {
        tokio::time::sleep(Duration::from_secs(5)).await;
        println!("state: {:?}", client.connection_state());
        if client.close_reason().is_some() {
            // Terminal: either we closed, or reconnects were exhausted.
            break;
        }
    }

    client.close().await?;
    Ok(())
}
