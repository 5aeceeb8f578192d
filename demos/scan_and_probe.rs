//! Scan for nearby peripherals and probe the strongest one.
//!
//! Run with: cargo run --example scan_and_probe [ADDRESS]

use ble_prober::{BleProber, ProberConfig, Result};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ble_prober=debug".parse().unwrap()),
        )
        .init();

    let config = ProberConfig::new().with_scan_duration(Duration::from_secs(10));
    let prober = BleProber::new(config).await?;

    println!("Scanning for 10 seconds...\n");
    let mut devices = prober.scan().await?;

    println!("--- Scan Complete ---");
    for device in &devices {
        println!("  {} {:<24} {} dBm", device.mac, device.name, device.rssi);
    }

    let target = match std::env::args().nth(1) {
        Some(address) => address,
        None => {
            devices.sort_by_key(|d| std::cmp::Reverse(d.rssi));
            match devices.first() {
                Some(device) => device.mac.clone(),
                None => {
                    println!("\nNo devices found.");
                    return Ok(());
                }
            }
        }
    };

    println!("\nProbing {}...", target);
    let result = prober.probe(&target).await?;

    println!("Device: {} ({})", result.device_name, result.address);
    for (_, service) in result.services.iter() {
        println!("  + {}", service.name);
        for characteristic in &service.characteristics {
            println!(
                "      - {} {}",
                characteristic.uuid,
                characteristic.properties_string()
            );
        }
    }

    println!("\nReport appended to {}", prober.config().log_file.display());
    Ok(())
}
