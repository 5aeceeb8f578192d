//! Scripted radio used by the crate's unit tests.

use async_trait::async_trait;
use btleplug::api::{BDAddr, CharPropFlags};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ble::transport::*;
use crate::ble::uuids::uuid_from_u16;
use crate::error::{Error, Result};

pub(crate) fn addr(last: u8) -> BDAddr {
    BDAddr::from([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
}

pub(crate) fn report(
    address: BDAddr,
    rssi: i16,
    name: Option<&str>,
) -> Result<AdvertisementReport<BDAddr>> {
    Ok(AdvertisementReport {
        address,
        rssi,
        local_name: name.map(str::to_string),
        connectable: true,
        handle: address,
    })
}

/// Outcome of one scripted connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Attempt {
    Ok,
    Busy,
    Refused,
    TimedOut,
    Hang,
}

/// One entry of a scripted service table.
#[derive(Debug, Clone)]
pub(crate) enum ServiceEntry {
    Service {
        raw: RawService,
        characteristics: Option<Vec<std::result::Result<RawCharacteristic, String>>>,
    },
    Garbled,
}

pub(crate) fn service(short: u16, characteristics: Vec<RawCharacteristic>) -> ServiceEntry {
    ServiceEntry::Service {
        raw: RawService {
            handle: Some(short),
            uuid: Some(uuid_from_u16(short)),
        },
        characteristics: Some(characteristics.into_iter().map(Ok).collect()),
    }
}

pub(crate) fn characteristic(short: u16, flags: CharPropFlags) -> RawCharacteristic {
    RawCharacteristic {
        uuid: Some(uuid_from_u16(short)),
        properties: Some(flags),
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub scans_started: AtomicUsize,
    pub scans_stopped: AtomicUsize,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Radio whose behaviour is scripted per test.
#[derive(Default)]
pub(crate) struct FakeRadio {
    adverts: Mutex<Vec<Result<AdvertisementReport<BDAddr>>>>,
    attempts: Mutex<VecDeque<Attempt>>,
    table: Mutex<Option<Vec<ServiceEntry>>>,
    hang_characteristics: Mutex<bool>,
    fail_scan_start: Mutex<bool>,
    pub counters: Arc<Counters>,
    pub targets: Mutex<Vec<(BDAddr, bool)>>,
}

impl FakeRadio {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Some(Vec::new())),
            ..Self::default()
        }
    }

    pub fn with_adverts(self, adverts: Vec<Result<AdvertisementReport<BDAddr>>>) -> Self {
        *self.adverts.lock() = adverts;
        self
    }

    pub fn with_attempts(self, attempts: &[Attempt]) -> Self {
        *self.attempts.lock() = attempts.iter().copied().collect();
        self
    }

    pub fn with_table(self, table: Vec<ServiceEntry>) -> Self {
        *self.table.lock() = Some(table);
        self
    }

    pub fn with_unreadable_table(self) -> Self {
        *self.table.lock() = None;
        self
    }

    pub fn with_hanging_characteristics(self) -> Self {
        *self.hang_characteristics.lock() = true;
        self
    }

    pub fn with_failing_scan_start(self) -> Self {
        *self.fail_scan_start.lock() = true;
        self
    }
}

#[async_trait]
impl RadioTransport for FakeRadio {
    type Device = BDAddr;
    type Link = FakeLink;

    async fn start_scan(&self, _params: &ScanParams) -> Result<AdvertisementStream<BDAddr>> {
        self.counters.scans_started.fetch_add(1, Ordering::SeqCst);
        if *self.fail_scan_start.lock() {
            return Err(Error::ScanChannel {
                reason: "controller refused scan".into(),
            });
        }
        let adverts = std::mem::take(&mut *self.adverts.lock());
        // Keep the stream open until the scan deadline, like a real radio.
        Ok(stream::iter(adverts).chain(stream::pending()).boxed())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.counters.scans_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, target: &ConnectTarget<BDAddr>, timeout: Duration) -> Result<FakeLink> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().push((target.address, target.is_blind()));
        let attempt = self.attempts.lock().pop_front().unwrap_or(Attempt::Ok);
        match attempt {
            Attempt::Ok => Ok(FakeLink {
                table: self.table.lock().clone(),
                hang_characteristics: *self.hang_characteristics.lock(),
                counters: self.counters.clone(),
            }),
            Attempt::Busy => Err(Error::TransientRadio {
                reason: "controller busy".into(),
            }),
            Attempt::Refused => Err(Error::ConnectionFailed {
                reason: "peer refused".into(),
            }),
            Attempt::TimedOut => Err(Error::ConnectionTimeout { timeout }),
            Attempt::Hang => futures::future::pending().await,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeLink {
    table: Option<Vec<ServiceEntry>>,
    hang_characteristics: bool,
    counters: Arc<Counters>,
}

#[async_trait]
impl GattLink for FakeLink {
    async fn services(&self) -> Result<ServiceStream> {
        let table = self.table.clone().ok_or_else(|| Error::Enumeration {
            context: "invalid service table".into(),
        })?;
        let items: Vec<Result<RawService>> = table
            .into_iter()
            .map(|entry| match entry {
                ServiceEntry::Service { raw, .. } => Ok(raw),
                ServiceEntry::Garbled => Err(Error::Enumeration {
                    context: "garbled service entry".into(),
                }),
            })
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn characteristics(&self, service: &RawService) -> Result<CharacteristicStream> {
        if self.hang_characteristics {
            futures::future::pending::<()>().await;
        }
        let entry = self
            .table
            .iter()
            .flatten()
            .find_map(|entry| match entry {
                ServiceEntry::Service {
                    raw,
                    characteristics,
                } if raw == service => Some(characteristics.clone()),
                _ => None,
            })
            .flatten()
            .ok_or_else(|| Error::Enumeration {
                context: "characteristics unreadable".into(),
            })?;
        let items: Vec<Result<RawCharacteristic>> = entry
            .into_iter()
            .map(|item| item.map_err(|context| Error::Enumeration { context }))
            .collect();
        Ok(stream::iter(items).boxed())
    }

    async fn disconnect(self) -> Result<()> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) fn custom_uuid() -> Uuid {
    Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e)
}
