//! Prober configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::ble::connection::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RETRIES};
use crate::ble::scanner::ScanOptions;

/// Default probe log file.
pub const DEFAULT_LOG_FILE: &str = "probe_log.txt";

/// Settings for scanning, connecting and logging.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProberConfig {
    /// How long a single scan runs.
    pub scan_duration: Duration,
    /// Ignore advertisements weaker than this (dBm).
    pub rssi_threshold: i16,
    /// Only list devices that advertise a local name.
    pub named_only: bool,
    /// Scan interval.
    pub scan_interval: Duration,
    /// Scan window.
    pub scan_window: Duration,
    /// Per-attempt connection timeout.
    pub connect_timeout: Duration,
    /// Connection retries after the first attempt.
    pub max_retries: u32,
    /// Append-only probe log.
    pub log_file: PathBuf,
    /// Treat an unreadable service table as a probe failure.
    pub fail_on_unreadable_table: bool,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            scan_duration: Duration::from_secs(10),
            rssi_threshold: -90,
            named_only: true,
            scan_interval: Duration::from_millis(30),
            scan_window: Duration::from_millis(30),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            fail_on_unreadable_table: false,
        }
    }
}

impl ProberConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set scan duration.
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the RSSI threshold in dBm.
    pub fn with_rssi_threshold(mut self, threshold: i16) -> Self {
        self.rssi_threshold = threshold;
        self
    }

    /// Enable or disable the named-only filter.
    pub fn with_named_only(mut self, named_only: bool) -> Self {
        self.named_only = named_only;
        self
    }

    /// Set connection timeout and retry count.
    pub fn with_connect_params(mut self, timeout: Duration, max_retries: u32) -> Self {
        self.connect_timeout = timeout;
        self.max_retries = max_retries;
        self
    }

    /// Set the probe log path.
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    /// Fail probes whose service table cannot be read at all.
    pub fn with_fail_on_unreadable_table(mut self, enabled: bool) -> Self {
        self.fail_on_unreadable_table = enabled;
        self
    }

    /// Scan options derived from this configuration.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            duration: self.scan_duration,
            rssi_threshold: self.rssi_threshold,
            named_only: self.named_only,
            interval: self.scan_interval,
            window: self.scan_window,
        }
    }
}
