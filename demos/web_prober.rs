//! Serve the prober over HTTP.
//!
//! Run with: cargo run --example web_prober --features http
//!
//! Then try `curl localhost:8080/scan` and `curl localhost:8080/results`.

use ble_prober::http::serve;
use ble_prober::{BleProber, ProberConfig, Result};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ble_prober=debug".parse().unwrap()),
        )
        .init();

    let prober = Arc::new(BleProber::new(ProberConfig::default()).await?);
    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));

    tokio::select! {
        result = serve(prober, addr) => result?,
        _ = tokio::signal::ctrl_c() => println!("\nShutting down"),
    }

    Ok(())
}
