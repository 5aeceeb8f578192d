//! Radio transport abstraction.
//!
//! The scan manager, connection manager and GATT enumerator only talk to the
//! radio through these traits. [`crate::ble::platform::BtleplugTransport`] is
//! the production implementation.

use async_trait::async_trait;
use btleplug::api::{BDAddr, CharPropFlags};
use futures::stream::BoxStream;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// Parameters for one timed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanParams {
    /// How long the scan runs.
    pub duration: Duration,
    /// Scan interval.
    pub interval: Duration,
    /// Scan window within each interval.
    pub window: Duration,
    /// Request scan responses (active scanning).
    pub active: bool,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            interval: Duration::from_millis(30),
            window: Duration::from_millis(30),
            active: true,
        }
    }
}

/// A single advertisement observed during a scan.
#[derive(Debug, Clone)]
pub struct AdvertisementReport<D> {
    /// Advertiser hardware address.
    pub address: BDAddr,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// Advertised local name, if any.
    pub local_name: Option<String>,
    /// Whether the advertiser accepts connections.
    pub connectable: bool,
    /// Transport handle for connecting to the advertiser.
    pub handle: D,
}

/// Where to connect.
#[derive(Debug, Clone)]
pub struct ConnectTarget<D> {
    /// Peer address.
    pub address: BDAddr,
    /// Handle from a scan; `None` means connect by raw address.
    pub handle: Option<D>,
}

impl<D> ConnectTarget<D> {
    /// Target a device by raw address only.
    pub fn blind(address: BDAddr) -> Self {
        Self {
            address,
            handle: None,
        }
    }

    /// Check if this is a connect without a scan handle.
    pub fn is_blind(&self) -> bool {
        self.handle.is_none()
    }
}

/// A service entry as delivered by the peer, possibly incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawService {
    /// Transport-specific handle used to walk the service's characteristics.
    pub handle: Option<u16>,
    /// Service UUID.
    pub uuid: Option<Uuid>,
}

/// A characteristic entry as delivered by the peer, possibly incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCharacteristic {
    /// Characteristic UUID.
    pub uuid: Option<Uuid>,
    /// GATT property bits.
    pub properties: Option<CharPropFlags>,
}

/// Advertisements from an active scan.
pub type AdvertisementStream<D> = BoxStream<'static, Result<AdvertisementReport<D>>>;

/// Services of a connected peer.
pub type ServiceStream = BoxStream<'static, Result<RawService>>;

/// Characteristics of one service.
pub type CharacteristicStream = BoxStream<'static, Result<RawCharacteristic>>;

/// The radio as seen by the discovery and probe engine.
#[async_trait]
pub trait RadioTransport: Send + Sync + 'static {
    /// Handle kept in the device table for each discovered peer.
    type Device: Clone + Send + Sync + 'static;
    /// Live connection to one peer.
    type Link: GattLink;

    /// Start scanning and return the advertisement stream.
    async fn start_scan(&self, params: &ScanParams) -> Result<AdvertisementStream<Self::Device>>;

    /// Stop the scan started by [`RadioTransport::start_scan`].
    async fn stop_scan(&self) -> Result<()>;

    /// Open a connection, giving up after `timeout`.
    async fn connect(
        &self,
        target: &ConnectTarget<Self::Device>,
        timeout: Duration,
    ) -> Result<Self::Link>;
}

/// GATT access over a live connection.
#[async_trait]
pub trait GattLink: Send + Sync + 'static {
    /// Read the peer's service table.
    ///
    /// An error here means the whole table is unreadable.
    async fn services(&self) -> Result<ServiceStream>;

    /// Read the characteristics of one service.
    async fn characteristics(&self, service: &RawService) -> Result<CharacteristicStream>;

    /// Tear down the connection. Consumes the link so it is released once.
    async fn disconnect(self) -> Result<()>;
}
