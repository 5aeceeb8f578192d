//! BLE communication module.
//!
//! Scanning, connection management and GATT enumeration, written against
//! the [`transport::RadioTransport`] abstraction with a btleplug backend.

pub mod connection;
pub mod gatt;
pub mod platform;
pub mod scanner;
pub mod transport;
pub mod uuids;

pub use connection::{ConnectionManager, ConnectionState};
pub use gatt::{Enumeration, GattEnumerator};
pub use platform::{BtleplugLink, BtleplugTransport};
pub use scanner::{ScanManager, ScanOptions};
pub use transport::{ConnectTarget, GattLink, RadioTransport};
pub use uuids::*;
