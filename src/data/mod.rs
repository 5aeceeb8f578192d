//! Data structures for discovery and probe results.
//!
//! This module contains the device table populated by scans and the
//! service/characteristic records produced by GATT enumeration.

pub mod device;
pub mod services;

pub use device::{
    resolve_name, DeviceSummary, DeviceTable, DiscoveredDevice, Observation, UNKNOWN_NAME,
};
pub use services::{
    CharProperty, CharacteristicRecord, DeviceSource, ProbeResult, ServiceMap, ServiceRecord,
};
