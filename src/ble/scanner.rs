//! BLE scanning functionality.
//!
//! Runs timed scans and folds advertisement reports into the device table.

use btleplug::api::BDAddr;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::ble::transport::{AdvertisementReport, RadioTransport, ScanParams};
use crate::data::device::{resolve_name, DeviceTable, DiscoveredDevice, Observation};
use crate::error::{Error, Result};
use crate::status::{IndicatorState, StatusIndicator};

/// Filters and timing for one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// How long the scan runs.
    pub duration: Duration,
    /// Reports weaker than this (dBm) are discarded.
    pub rssi_threshold: i16,
    /// Drop anonymous devices that are not already in the table.
    pub named_only: bool,
    /// Scan interval.
    pub interval: Duration,
    /// Scan window.
    pub window: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        let params = ScanParams::default();
        Self {
            duration: params.duration,
            rssi_threshold: -90,
            named_only: true,
            interval: params.interval,
            window: params.window,
        }
    }
}

impl ScanOptions {
    fn params(&self) -> ScanParams {
        ScanParams {
            duration: self.duration,
            interval: self.interval,
            window: self.window,
            active: true,
        }
    }
}

/// Counters for one scan, logged when it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Reports received.
    pub reports: usize,
    /// Reports below the RSSI threshold.
    pub too_weak: usize,
    /// Reports from non-connectable advertisers.
    pub not_connectable: usize,
    /// Anonymous reports dropped by the named-only filter.
    pub anonymous: usize,
}

/// Shared handle to the device table.
pub type SharedDeviceTable<D> = Arc<RwLock<DeviceTable<D>>>;

/// Drives timed scans and owns the device table.
pub struct ScanManager<T: RadioTransport> {
    /// Radio used for scanning.
    transport: Arc<T>,
    /// Devices found by the most recent scan.
    table: SharedDeviceTable<T::Device>,
    /// Whether a scan is in progress.
    is_scanning: AtomicBool,
    /// Phase reporting.
    status: Arc<dyn StatusIndicator>,
}

impl<T: RadioTransport> ScanManager<T> {
    /// Create a scan manager with an empty device table.
    pub fn new(transport: Arc<T>, status: Arc<dyn StatusIndicator>) -> Self {
        Self {
            transport,
            table: Arc::new(RwLock::new(DeviceTable::new())),
            is_scanning: AtomicBool::new(false),
            status,
        }
    }

    /// Shared read access to the device table.
    pub fn table(&self) -> SharedDeviceTable<T::Device> {
        self.table.clone()
    }

    /// Devices from the most recent scan.
    pub fn devices(&self) -> Vec<DiscoveredDevice<T::Device>> {
        self.table.read().snapshot()
    }

    /// Look up a device from the most recent scan.
    pub fn device(&self, address: &BDAddr) -> Option<DiscoveredDevice<T::Device>> {
        self.table.read().get(address).cloned()
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.is_scanning.load(Ordering::SeqCst)
    }

    /// Clear the table and run one timed scan.
    ///
    /// A failing advertisement channel ends the scan early; whatever was
    /// collected up to that point is returned. The radio scan is stopped on
    /// every path, including when this future is dropped before the deadline.
    pub async fn run_scan(&self, options: &ScanOptions) -> Vec<DiscoveredDevice<T::Device>> {
        if self.is_scanning.swap(true, Ordering::SeqCst) {
            debug!("Already scanning, ignoring start request");
            return self.devices();
        }
        let mut scan = ScanGuard::new(self);

        self.status.set_state(IndicatorState::Scanning);
        self.table.write().clear();

        info!(
            "Starting scan for {:?} (threshold: {}dBm, named only: {})",
            options.duration, options.rssi_threshold, options.named_only
        );

        let outcome = self.collect(options).await;

        scan.stop().await;

        match outcome {
            Ok(stats) => debug!(
                "Scan stats: {} reports, {} too weak, {} not connectable, {} anonymous",
                stats.reports, stats.too_weak, stats.not_connectable, stats.anonymous
            ),
            Err(e) => warn!("Scan aborted: {}", e),
        }

        let devices = self.devices();
        info!("Scan finished. Found {} targets", devices.len());

        drop(scan);
        devices
    }

    /// Consume the advertisement stream until the deadline.
    async fn collect(&self, options: &ScanOptions) -> Result<ScanStats> {
        let deadline = Instant::now() + options.duration;
        let mut stats = ScanStats::default();
        let mut reports = self.transport.start_scan(&options.params()).await?;

        loop {
            match tokio::time::timeout_at(deadline, reports.next()).await {
                Err(_) => break,
                Ok(None) => {
                    debug!("Advertisement stream ended before deadline");
                    break;
                }
                Ok(Some(Err(e))) => {
                    return Err(Error::ScanChannel {
                        reason: e.to_string(),
                    })
                }
                Ok(Some(Ok(report))) => self.handle_report(report, options, &mut stats),
            }
        }

        Ok(stats)
    }

    /// Filter one report and merge it into the table.
    fn handle_report(
        &self,
        report: AdvertisementReport<T::Device>,
        options: &ScanOptions,
        stats: &mut ScanStats,
    ) {
        stats.reports += 1;

        if report.rssi < options.rssi_threshold {
            stats.too_weak += 1;
            return;
        }
        if !report.connectable {
            stats.not_connectable += 1;
            return;
        }

        let name = resolve_name(report.local_name.as_deref());
        let observation = self.table.write().observe(
            report.address,
            name.clone(),
            report.rssi,
            report.handle,
            options.named_only,
        );

        match observation {
            Observation::Inserted => {
                info!("Found: {} ({}) RSSI: {}", name, report.address, report.rssi)
            }
            Observation::Updated { renamed: true } => {
                debug!("Device {} is now named {}", report.address, name)
            }
            Observation::Updated { renamed: false } => {
                trace!("Refreshed {} RSSI: {}", report.address, report.rssi)
            }
            Observation::Dropped => stats.anonymous += 1,
        }
    }
}

/// Holds the scanning flag for one scan.
///
/// Dropping the guard clears the flag and returns the status to idle. A scan
/// that was never stopped is stopped on the runtime.
struct ScanGuard<'a, T: RadioTransport> {
    manager: &'a ScanManager<T>,
    stopped: bool,
}

impl<'a, T: RadioTransport> ScanGuard<'a, T> {
    fn new(manager: &'a ScanManager<T>) -> Self {
        Self {
            manager,
            stopped: false,
        }
    }

    async fn stop(&mut self) {
        if let Err(e) = self.manager.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        self.stopped = true;
    }
}

impl<T: RadioTransport> Drop for ScanGuard<'_, T> {
    fn drop(&mut self) {
        if !self.stopped {
            warn!("Scan abandoned before its deadline, stopping radio");
            let transport = self.manager.transport.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = transport.stop_scan().await {
                            warn!("Failed to stop scan: {}", e);
                        }
                    });
                }
                Err(_) => error!("No runtime to stop the abandoned scan"),
            }
        }
        self.manager.is_scanning.store(false, Ordering::SeqCst);
        self.manager.status.set_state(IndicatorState::Idle);
    }
}
