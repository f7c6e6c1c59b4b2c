use std::time::Duration;

use tahta::{Feed, Tahta};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The provider issues one-time connection URLs through its session
    // API; pass one on the command line or via TAHTA_WS_URL.
    let url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TAHTA_WS_URL").ok())
        .ok_or("usage: 01_live_prices <connection-url>")?;

    let client = Tahta::new();
    client.connect(&url).await?;
    println!("connected, streaming for ~10s...");

    let sub = client.subscribe(["THYAO", "GARAN"], Feed::Live, |update| {
        println!(
            "{} -> {} @ {}",
            update.symbol(),
            update.close_price(),
            update.ts()
        );
    });

    tokio::time::sleep(Duration::from_secs(10)).await;

    sub.unsubscribe();
    client.close().await?;
    println!("closed ({:?})", client.close_reason());

    Ok(())
}
