//! btleplug-backed radio transport.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter, Service};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::ble::transport::{
    AdvertisementReport, AdvertisementStream, CharacteristicStream, ConnectTarget, GattLink,
    RadioTransport, RawCharacteristic, RawService, ScanParams, ServiceStream,
};
use crate::error::{Error, Result};

/// Radio transport over the host's first Bluetooth adapter.
#[derive(Clone)]
pub struct BtleplugTransport {
    adapter: Adapter,
}

impl BtleplugTransport {
    /// Open the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothUnavailable`] if there is no usable adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Find a known peripheral by hardware address.
    async fn lookup(&self, target: &ConnectTarget<Peripheral>) -> Result<Peripheral> {
        if let Some(peripheral) = &target.handle {
            return Ok(peripheral.clone());
        }

        self.adapter
            .peripherals()
            .await?
            .into_iter()
            .find(|p| p.address() == target.address)
            .ok_or_else(|| Error::ConnectionFailed {
                reason: format!("{} is not known to the adapter", target.address),
            })
    }
}

async fn advertisement(
    adapter: &Adapter,
    event: CentralEvent,
) -> Option<Result<AdvertisementReport<Peripheral>>> {
    let id = match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => id,
        _ => return None,
    };

    let peripheral = match adapter.peripheral(&id).await {
        Ok(p) => p,
        Err(e) => {
            trace!("Peripheral {:?} vanished: {}", id, e);
            return None;
        }
    };
    let properties = peripheral.properties().await.ok().flatten()?;
    let rssi = properties.rssi?;

    Some(Ok(AdvertisementReport {
        address: properties.address,
        rssi,
        local_name: properties.local_name,
        // btleplug does not expose the advertising PDU type, so the
        // connectable filter cannot reject anything from this backend.
        connectable: true,
        handle: peripheral,
    }))
}

#[async_trait]
impl RadioTransport for BtleplugTransport {
    type Device = Peripheral;
    type Link = BtleplugLink;

    async fn start_scan(&self, params: &ScanParams) -> Result<AdvertisementStream<Peripheral>> {
        debug!(
            "Starting scan (interval {:?}, window {:?}, active {})",
            params.interval, params.window, params.active
        );

        let events = self.adapter.events().await.map_err(|e| Error::ScanChannel {
            reason: e.to_string(),
        })?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = self.adapter.clone();
        Ok(events
            .filter_map(move |event| {
                let adapter = adapter.clone();
                async move { advertisement(&adapter, event).await }
            })
            .boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(
        &self,
        target: &ConnectTarget<Peripheral>,
        timeout: Duration,
    ) -> Result<BtleplugLink> {
        let peripheral = self.lookup(target).await?;

        match tokio::time::timeout(timeout, peripheral.connect()).await {
            Ok(Ok(())) => Ok(BtleplugLink::new(peripheral)),
            Ok(Err(e)) => Err(classify_connect_error(e)),
            Err(_) => Err(Error::ConnectionTimeout { timeout }),
        }
    }
}

/// Sort a backend connect error into transient, timeout or failure.
///
/// Typed variants decide first. Only the free-text variants are inspected
/// for controller-busy messages.
pub fn classify_connect_error(e: btleplug::Error) -> Error {
    match e {
        btleplug::Error::TimedOut(timeout) => Error::ConnectionTimeout { timeout },
        btleplug::Error::NotConnected => Error::TransientRadio {
            reason: e.to_string(),
        },
        btleplug::Error::RuntimeError(ref message) if is_busy_message(message) => {
            Error::TransientRadio {
                reason: e.to_string(),
            }
        }
        btleplug::Error::Other(ref source) if is_busy_message(&source.to_string()) => {
            Error::TransientRadio {
                reason: e.to_string(),
            }
        }
        other => Error::ConnectionFailed {
            reason: other.to_string(),
        },
    }
}

/// Controller-busy text surfaced as untyped backend errors.
///
/// BlueZ reports `org.bluez.Error.InProgress` ("Operation already in
/// progress") and `org.bluez.Error.Busy` through D-Bus; WinRT reports
/// `ERROR_BUSY` / "The requested resource is in use".
fn is_busy_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("in progress")
        || message.contains("inprogress")
        || message.contains("busy")
        || message.contains("resource is in use")
}

/// Live link to a peripheral.
pub struct BtleplugLink {
    peripheral: Peripheral,
    /// Services from the last discovery; the index is the service handle.
    services: RwLock<Vec<Service>>,
}

impl BtleplugLink {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            services: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GattLink for BtleplugLink {
    async fn services(&self) -> Result<ServiceStream> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| Error::Enumeration {
                context: format!("service discovery failed: {}", e),
            })?;

        let discovered: Vec<Service> = self.peripheral.services().into_iter().collect();
        let raw: Vec<Result<RawService>> = discovered
            .iter()
            .enumerate()
            .map(|(index, service)| {
                Ok(RawService {
                    handle: u16::try_from(index).ok(),
                    uuid: Some(service.uuid),
                })
            })
            .collect();
        *self.services.write() = discovered;

        Ok(stream::iter(raw).boxed())
    }

    async fn characteristics(&self, service: &RawService) -> Result<CharacteristicStream> {
        let services = self.services.read();
        let found = service
            .handle
            .and_then(|handle| services.get(usize::from(handle)))
            .filter(|s| Some(s.uuid) == service.uuid)
            .ok_or_else(|| Error::Enumeration {
                context: format!("unknown service {:?}", service.uuid),
            })?;

        let raw: Vec<Result<RawCharacteristic>> = found
            .characteristics
            .iter()
            .map(|c| {
                Ok(RawCharacteristic {
                    uuid: Some(c.uuid),
                    properties: Some(c.properties),
                })
            })
            .collect();

        Ok(stream::iter(raw).boxed())
    }

    async fn disconnect(self) -> Result<()> {
        if let Err(e) = self.peripheral.disconnect().await {
            warn!("Disconnect reported an error: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}
