// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # ble-prober
//!
//! Bluetooth Low Energy discovery and GATT probing.
//!
//! The crate runs timed scans into a device table, then connects to a chosen
//! peripheral, walks its services and characteristics, appends a report to a
//! probe log and disconnects. Only one scan or probe drives the radio at a
//! time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_prober::{BleProber, ProberConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let prober = BleProber::new(ProberConfig::default()).await?;
//!
//!     for device in prober.scan().await? {
//!         println!("{} {} ({} dBm)", device.mac, device.name, device.rssi);
//!     }
//!
//!     if let Some(first) = prober.devices().first() {
//!         let result = prober.probe(&first.mac).await?;
//!         for (key, service) in result.services.iter() {
//!             println!("{} {}", key, service.name);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization for data types
//! - `http`: HTTP front end built on axum (implies `serde`)

// Public modules
pub mod ble;
pub mod config;
pub mod data;
pub mod error;
pub mod gate;
#[cfg(feature = "http")]
pub mod http;
pub mod probe;
pub mod prober;
pub mod report;
pub mod status;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use config::ProberConfig;
pub use error::{Error, Result};
pub use gate::{RadioGate, RadioGuard};
pub use probe::{ProbeOrchestrator, UNKNOWN_DEVICE_NAME};
pub use prober::BleProber;
pub use report::{ProbeLog, TextFileLog};
pub use status::{IndicatorState, StatusBoard, StatusIndicator};

// Re-export commonly used types from submodules
pub use ble::connection::ConnectionState;
pub use ble::platform::BtleplugTransport;
pub use ble::transport::{GattLink, RadioTransport};
pub use data::{
    CharProperty, CharacteristicRecord, DeviceSource, DeviceSummary, DiscoveredDevice,
    ProbeResult, ServiceMap, ServiceRecord,
};
