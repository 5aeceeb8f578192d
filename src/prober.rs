//! High-level prober.
//!
//! [`BleProber`] wires the scan manager, probe orchestrator, radio gate,
//! status board and probe log together. Every radio operation goes through
//! the gate, so a second scan or probe started while one is running is
//! rejected with [`crate::Error::Busy`] instead of queueing.

use std::sync::Arc;
use tracing::{debug, info};

use crate::ble::connection::ConnectionManager;
use crate::ble::platform::BtleplugTransport;
use crate::ble::scanner::ScanManager;
use crate::ble::transport::RadioTransport;
use crate::config::ProberConfig;
use crate::data::device::DeviceSummary;
use crate::data::services::ProbeResult;
use crate::error::Result;
use crate::gate::RadioGate;
use crate::probe::ProbeOrchestrator;
use crate::report::TextFileLog;
use crate::status::{IndicatorState, StatusBoard};

/// Scans for peripherals and probes their GATT tables.
pub struct BleProber<T: RadioTransport> {
    config: ProberConfig,
    gate: RadioGate,
    scanner: ScanManager<T>,
    orchestrator: ProbeOrchestrator<T>,
    status: Arc<StatusBoard>,
    log: TextFileLog,
}

impl BleProber<BtleplugTransport> {
    /// Create a prober on the host's first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(config: ProberConfig) -> Result<Self> {
        let transport = BtleplugTransport::new().await?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: RadioTransport> BleProber<T> {
    /// Create a prober over an existing transport.
    pub fn with_transport(transport: T, config: ProberConfig) -> Self {
        let transport = Arc::new(transport);
        let status = Arc::new(StatusBoard::new());
        let log = TextFileLog::new(config.log_file.clone());

        let scanner = ScanManager::new(transport.clone(), status.clone());
        let connection = ConnectionManager::new(transport)
            .with_retry_params(config.max_retries, config.connect_timeout);
        let orchestrator = ProbeOrchestrator::new(
            scanner.table(),
            connection,
            Arc::new(log.clone()),
            status.clone(),
        )
        .with_fail_on_unreadable_table(config.fail_on_unreadable_table);

        debug!("Prober configured: {:?}", config);

        Self {
            config,
            gate: RadioGate::new(),
            scanner,
            orchestrator,
            status,
            log,
        }
    }

    /// Run one timed scan and return the devices found.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Busy`] if another scan or probe is running.
    pub async fn scan(&self) -> Result<Vec<DeviceSummary>> {
        let _guard = self.gate.try_acquire()?;
        let devices = self.scanner.run_scan(&self.config.scan_options()).await;
        Ok(devices.iter().map(|d| d.summary()).collect())
    }

    /// Devices from the most recent scan, in discovery order.
    pub fn devices(&self) -> Vec<DeviceSummary> {
        self.scanner.table().read().summaries()
    }

    /// Probe one device.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Busy`] if another scan or probe is running, otherwise
    /// whatever [`ProbeOrchestrator::probe`] returns.
    pub async fn probe(&self, address: &str) -> Result<ProbeResult> {
        let _guard = self.gate.try_acquire()?;
        let result = self.orchestrator.probe(address).await?;
        info!(
            "Probe of {} found {} services",
            result.address,
            result.services.len()
        );
        Ok(result)
    }

    /// Current status indicator state.
    pub fn status(&self) -> IndicatorState {
        self.status.state()
    }

    /// Check if a scan or probe holds the radio.
    pub fn is_busy(&self) -> bool {
        self.gate.is_held()
    }

    /// Contents of the probe log, or `None` if nothing has been logged.
    pub async fn read_log(&self) -> Result<Option<String>> {
        self.log.read_all().await
    }

    /// The radio gate shared by scans and probes.
    pub fn gate(&self) -> &RadioGate {
        &self.gate
    }

    /// The active configuration.
    pub fn config(&self) -> &ProberConfig {
        &self.config
    }
}
