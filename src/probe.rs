//! Probe orchestration.
//!
//! Sequences connect, enumerate, log and disconnect for one address. The link
//! is released on every exit path, including when the probe future is dropped
//! before it completes.

use btleplug::api::BDAddr;
use chrono::Local;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::ble::connection::ConnectionManager;
use crate::ble::gatt::GattEnumerator;
use crate::ble::scanner::SharedDeviceTable;
use crate::ble::transport::{ConnectTarget, GattLink, RadioTransport};
use crate::data::services::{DeviceSource, ProbeResult};
use crate::error::{Error, Result};
use crate::report::ProbeLog;
use crate::status::{IndicatorState, StatusIndicator};

/// Name used when probing an address that is not in the device table.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

/// Parse a colon-delimited hardware address.
pub fn parse_address(address: &str) -> Result<BDAddr> {
    address
        .trim()
        .parse::<BDAddr>()
        .map_err(|_| Error::InvalidAddress {
            address: address.to_string(),
        })
}

/// Owns a link until it is explicitly released.
///
/// Dropping an unreleased guard schedules the disconnect on the runtime.
struct LinkGuard<L: GattLink> {
    link: Option<L>,
    address: BDAddr,
}

impl<L: GattLink> LinkGuard<L> {
    fn new(link: L, address: BDAddr) -> Self {
        Self {
            link: Some(link),
            address,
        }
    }

    fn link(&self) -> Option<&L> {
        self.link.as_ref()
    }

    async fn release(mut self) {
        if let Some(link) = self.link.take() {
            match link.disconnect().await {
                Ok(()) => info!("Disconnected from {}", self.address),
                Err(e) => warn!("Disconnect from {} failed: {}", self.address, e),
            }
        }
    }
}

impl<L: GattLink> Drop for LinkGuard<L> {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        let address = self.address;
        warn!("Probe of {} abandoned, releasing link", address);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = link.disconnect().await {
                        warn!("Disconnect from {} failed: {}", address, e);
                    }
                });
            }
            Err(_) => error!("No runtime to release link to {}", address),
        }
    }
}

/// Tracks one probe from the first status change until it settles.
///
/// A probe dropped before settling shows `Error` and returns the connection
/// manager to idle.
struct ProbeScope<'a, T: RadioTransport> {
    connection: &'a ConnectionManager<T>,
    status: &'a dyn StatusIndicator,
    address: BDAddr,
    settled: bool,
}

impl<'a, T: RadioTransport> ProbeScope<'a, T> {
    fn begin(
        connection: &'a ConnectionManager<T>,
        status: &'a dyn StatusIndicator,
        address: BDAddr,
    ) -> Self {
        status.set_state(IndicatorState::Connecting);
        Self {
            connection,
            status,
            address,
            settled: false,
        }
    }

    fn settle(mut self, state: IndicatorState) {
        self.settled = true;
        self.status.set_state(state);
    }
}

impl<T: RadioTransport> Drop for ProbeScope<'_, T> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("Probe of {} abandoned", self.address);
        self.connection.mark_released(self.address);
        self.status.set_state(IndicatorState::Error);
    }
}

/// Runs probes against one address at a time.
pub struct ProbeOrchestrator<T: RadioTransport> {
    /// Device table populated by the scan manager.
    table: SharedDeviceTable<T::Device>,
    /// Connection manager.
    connection: ConnectionManager<T>,
    /// GATT walker.
    enumerator: GattEnumerator,
    /// Where finished results are recorded.
    log: Arc<dyn ProbeLog>,
    /// Phase reporting.
    status: Arc<dyn StatusIndicator>,
    /// Fail the probe when the service table is unreadable.
    fail_on_unreadable_table: bool,
}

impl<T: RadioTransport> ProbeOrchestrator<T> {
    /// Create an orchestrator.
    pub fn new(
        table: SharedDeviceTable<T::Device>,
        connection: ConnectionManager<T>,
        log: Arc<dyn ProbeLog>,
        status: Arc<dyn StatusIndicator>,
    ) -> Self {
        Self {
            table,
            connection,
            enumerator: GattEnumerator::new(),
            log,
            status,
            fail_on_unreadable_table: false,
        }
    }

    /// Fail probes whose service table cannot be read at all.
    pub fn with_fail_on_unreadable_table(mut self, enabled: bool) -> Self {
        self.fail_on_unreadable_table = enabled;
        self
    }

    /// The connection manager used for probes.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// Connect to `address`, enumerate its GATT table, log and disconnect.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAddress`] if the address does not parse,
    /// [`Error::ConnectionFailed`] / [`Error::ConnectionTimeout`] if no link
    /// could be established, [`Error::Enumeration`] if the service table was
    /// unreadable and the orchestrator is configured to treat that as fatal.
    pub async fn probe(&self, address: &str) -> Result<ProbeResult> {
        let address = parse_address(address)?;

        let scope = ProbeScope::begin(&self.connection, self.status.as_ref(), address);

        let (device_name, target, source) = self.resolve(address);
        if source == DeviceSource::Blind {
            warn!("{} not in device list, trying blind connect", address);
        }
        info!("Connecting to {} ({})...", device_name, address);

        let link = match self.connection.connect(&target).await {
            Ok(link) => LinkGuard::new(link, address),
            Err(e) => {
                scope.settle(IndicatorState::Error);
                return Err(e);
            }
        };

        let outcome = match link.link() {
            Some(l) => self.enumerate_and_record(l, device_name, address, source).await,
            None => Err(Error::Internal("link released early".into())),
        };

        link.release().await;
        self.connection.mark_released(address);

        match &outcome {
            Ok(_) => scope.settle(IndicatorState::Idle),
            Err(e) => {
                error!("Probe of {} failed: {}", address, e);
                scope.settle(IndicatorState::Error);
            }
        }

        outcome
    }

    /// Look the address up in the device table.
    fn resolve(&self, address: BDAddr) -> (String, ConnectTarget<T::Device>, DeviceSource) {
        match self.table.read().get(&address) {
            Some(device) => (
                device.name.clone(),
                ConnectTarget {
                    address,
                    handle: Some(device.handle.clone()),
                },
                DeviceSource::Scanned,
            ),
            None => (
                UNKNOWN_DEVICE_NAME.to_string(),
                ConnectTarget::blind(address),
                DeviceSource::Blind,
            ),
        }
    }

    async fn enumerate_and_record(
        &self,
        link: &T::Link,
        device_name: String,
        address: BDAddr,
        source: DeviceSource,
    ) -> Result<ProbeResult> {
        let enumeration = self.enumerator.enumerate(link).await;

        if self.fail_on_unreadable_table {
            if let Some(context) = enumeration.table_error {
                return Err(Error::Enumeration { context });
            }
        }

        let result = ProbeResult {
            device_name,
            address,
            source,
            services: enumeration.services,
        };

        if let Err(e) = self.log.append_probe_record(&result, Local::now()).await {
            warn!("Logging failed: {}", e);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::connection::ConnectionState;
    use crate::data::device::DeviceTable;
    use crate::report::MockProbeLog;
    use crate::status::{MockStatusIndicator, StatusBoard};
    use crate::testing::{addr, characteristic, service, Attempt, Counters, FakeRadio};
    use btleplug::api::CharPropFlags;
    use mockall::predicate::eq;
    use parking_lot::RwLock;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio_test::assert_err;

    fn accepting_log() -> Arc<dyn ProbeLog> {
        let mut log = MockProbeLog::new();
        log.expect_append_probe_record().returning(|_, _| Ok(()));
        Arc::new(log)
    }

    fn orchestrator(
        radio: &Arc<FakeRadio>,
        table: DeviceTable<BDAddr>,
        log: Arc<dyn ProbeLog>,
        status: Arc<dyn StatusIndicator>,
    ) -> ProbeOrchestrator<FakeRadio> {
        ProbeOrchestrator::new(
            Arc::new(RwLock::new(table)),
            ConnectionManager::new(radio.clone()),
            log,
            status,
        )
    }

    fn table_with_sensor() -> DeviceTable<BDAddr> {
        let mut table = DeviceTable::new();
        table.observe(addr(0xFF), "Sensor".into(), -60, addr(0xFF), false);
        table
    }

    fn battery_radio() -> FakeRadio {
        FakeRadio::new().with_table(vec![service(
            0x180f,
            vec![characteristic(0x2a19, CharPropFlags::READ | CharPropFlags::NOTIFY)],
        )])
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address(" AA:BB:CC:DD:EE:FF ").unwrap(), addr(0xFF));
        assert!(matches!(
            parse_address("not-an-address"),
            Err(Error::InvalidAddress { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_battery_service() {
        let radio = Arc::new(battery_radio());
        let status = Arc::new(StatusBoard::new());
        let probe = orchestrator(&radio, table_with_sensor(), accepting_log(), status.clone());

        let result = probe.probe("AA:BB:CC:DD:EE:FF").await.unwrap();

        assert_eq!(result.device_name, "Sensor");
        assert_eq!(result.source, DeviceSource::Scanned);
        let battery = result.services.get("0x180f").unwrap();
        assert_eq!(battery.name, "Battery Service");
        assert_eq!(battery.characteristics[0].properties_string(), "[R, N]");

        assert_eq!(Counters::get(&radio.counters.disconnects), 1);
        assert_eq!(status.state(), IndicatorState::Idle);
        assert_eq!(radio.targets.lock().clone(), vec![(addr(0xFF), false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blind_connect_for_unknown_address() {
        let radio = Arc::new(battery_radio());
        let probe = orchestrator(
            &radio,
            DeviceTable::new(),
            accepting_log(),
            Arc::new(StatusBoard::new()),
        );

        let result = probe.probe("AA:BB:CC:DD:EE:01").await.unwrap();

        assert_eq!(result.device_name, UNKNOWN_DEVICE_NAME);
        assert!(result.is_blind());
        assert_eq!(radio.targets.lock().clone(), vec![(addr(0x01), true)]);
        assert_eq!(Counters::get(&radio.counters.disconnects), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_address_never_touches_radio() {
        let radio = Arc::new(FakeRadio::new());
        let mut status = MockStatusIndicator::new();
        status.expect_set_state().never();
        let probe = orchestrator(&radio, DeviceTable::new(), accepting_log(), Arc::new(status));

        let err = assert_err!(probe.probe("zz:zz").await);
        assert!(matches!(err, Error::InvalidAddress { .. }));
        assert_eq!(Counters::get(&radio.counters.connects), 0);
        assert_eq!(Counters::get(&radio.counters.disconnects), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_failure_sets_error_and_holds_no_link() {
        let radio = Arc::new(FakeRadio::new().with_attempts(&[
            Attempt::Refused,
            Attempt::Refused,
            Attempt::TimedOut,
        ]));
        let mut log = MockProbeLog::new();
        log.expect_append_probe_record().never();
        let status = Arc::new(StatusBoard::new());
        let probe = orchestrator(&radio, table_with_sensor(), Arc::new(log), status.clone());

        let err = assert_err!(probe.probe("AA:BB:CC:DD:EE:FF").await);
        assert!(err.is_timeout());
        assert_eq!(Counters::get(&radio.counters.disconnects), 0);
        assert_eq!(status.state(), IndicatorState::Error);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(status.state(), IndicatorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_log_failure_is_swallowed() {
        let radio = Arc::new(battery_radio());
        let mut log = MockProbeLog::new();
        log.expect_append_probe_record()
            .times(1)
            .returning(|_, _| Err(Error::Internal("disk full".into())));
        let probe = orchestrator(
            &radio,
            table_with_sensor(),
            Arc::new(log),
            Arc::new(StatusBoard::new()),
        );

        let result = probe.probe("AA:BB:CC:DD:EE:FF").await.unwrap();
        assert_eq!(result.services.len(), 1);
        assert_eq!(Counters::get(&radio.counters.disconnects), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_table_degrades_to_empty_result() {
        let radio = Arc::new(FakeRadio::new().with_unreadable_table());
        let probe = orchestrator(
            &radio,
            table_with_sensor(),
            accepting_log(),
            Arc::new(StatusBoard::new()),
        );

        let result = probe.probe("AA:BB:CC:DD:EE:FF").await.unwrap();
        assert!(result.services.is_empty());
        assert_eq!(Counters::get(&radio.counters.disconnects), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_table_error_raised_after_release() {
        let radio = Arc::new(FakeRadio::new().with_unreadable_table());
        let mut status = MockStatusIndicator::new();
        status
            .expect_set_state()
            .with(eq(IndicatorState::Connecting))
            .times(1)
            .return_const(());
        status
            .expect_set_state()
            .with(eq(IndicatorState::Error))
            .times(1)
            .return_const(());
        let probe = orchestrator(&radio, table_with_sensor(), accepting_log(), Arc::new(status))
            .with_fail_on_unreadable_table(true);

        let err = assert_err!(probe.probe("AA:BB:CC:DD:EE:FF").await);
        assert!(matches!(err, Error::Enumeration { .. }));
        assert_eq!(Counters::get(&radio.counters.disconnects), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_probe_still_releases_link() {
        let radio = Arc::new(battery_radio().with_hanging_characteristics());
        let status = Arc::new(StatusBoard::new());
        let probe = orchestrator(&radio, table_with_sensor(), accepting_log(), status.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_secs(30), probe.probe("AA:BB:CC:DD:EE:FF")).await;
        assert!(abandoned.is_err());

        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(Counters::get(&radio.counters.disconnects), 1);
        assert_eq!(status.state(), IndicatorState::Error);
        assert_eq!(probe.connection().state(), ConnectionState::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(status.state(), IndicatorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_connect_resets_status_and_connection() {
        let radio = Arc::new(battery_radio().with_attempts(&[Attempt::Hang]));
        let status = Arc::new(StatusBoard::new());
        let probe = orchestrator(&radio, table_with_sensor(), accepting_log(), status.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_secs(5), probe.probe("AA:BB:CC:DD:EE:FF")).await;
        assert!(abandoned.is_err());

        assert_eq!(status.state(), IndicatorState::Error);
        assert_eq!(probe.connection().state(), ConnectionState::Idle);
        assert_eq!(Counters::get(&radio.counters.disconnects), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_probes_release_each_link_once() {
        let radio = Arc::new(battery_radio());
        let probe = orchestrator(
            &radio,
            table_with_sensor(),
            accepting_log(),
            Arc::new(StatusBoard::new()),
        );

        for _ in 0..3 {
            probe.probe("AA:BB:CC:DD:EE:FF").await.unwrap();
        }
        assert_eq!(Counters::get(&radio.counters.connects), 3);
        assert_eq!(Counters::get(&radio.counters.disconnects), 3);
    }
}
