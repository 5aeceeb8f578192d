//! GATT service and characteristic enumeration.
//!
//! Walks the peer's service table over a live link. Malformed entries are
//! skipped one at a time; an unreadable table yields an empty result.

use futures::stream::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ble::transport::{GattLink, RawCharacteristic, RawService};
use crate::ble::uuids::resolve_service_name;
use crate::data::services::{CharProperty, CharacteristicRecord, ServiceMap, ServiceRecord};

/// Pause between resolving a service and walking its characteristics.
pub const SERVICE_STEP_DELAY: Duration = Duration::from_millis(100);

/// Result of walking one peer's GATT table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    /// Services that decoded cleanly.
    pub services: ServiceMap,
    /// Service entries dropped as malformed.
    pub skipped_services: usize,
    /// Characteristic entries dropped as malformed.
    pub skipped_characteristics: usize,
    /// Why the service table could not be read at all, if it could not.
    pub table_error: Option<String>,
}

impl Enumeration {
    /// Check if the peer's service table was unreadable.
    pub fn is_table_unreadable(&self) -> bool {
        self.table_error.is_some()
    }
}

/// Decode a service entry, rejecting entries without a handle or UUID.
pub fn decode_service(raw: &RawService) -> Option<Uuid> {
    raw.handle?;
    raw.uuid
}

/// Decode a characteristic entry, rejecting entries without a UUID or properties.
pub fn decode_characteristic(raw: &RawCharacteristic) -> Option<CharacteristicRecord> {
    Some(CharacteristicRecord {
        uuid: raw.uuid?,
        properties: CharProperty::from_flags(raw.properties?),
    })
}

/// Walks services and characteristics of a connected peer.
#[derive(Debug, Clone)]
pub struct GattEnumerator {
    step_delay: Duration,
}

impl Default for GattEnumerator {
    fn default() -> Self {
        Self {
            step_delay: SERVICE_STEP_DELAY,
        }
    }
}

impl GattEnumerator {
    /// Create an enumerator with the default inter-step delay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate every readable service and characteristic on `link`.
    ///
    /// Never fails. Callers that need a non-empty table check
    /// [`Enumeration::is_table_unreadable`] or the service count.
    pub async fn enumerate<L: GattLink>(&self, link: &L) -> Enumeration {
        let mut result = Enumeration::default();

        info!("Enumerating services...");

        let mut services = match link.services().await {
            Ok(services) => services,
            Err(e) => {
                warn!("Device sent invalid service table: {}", e);
                result.table_error = Some(e.to_string());
                return result;
            }
        };

        while let Some(item) = services.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("Skipped malformed service entry: {}", e);
                    result.skipped_services += 1;
                    continue;
                }
            };

            let Some(uuid) = decode_service(&raw) else {
                debug!("Skipped service entry without handle or UUID: {:?}", raw);
                result.skipped_services += 1;
                continue;
            };

            let mut record = ServiceRecord::new(uuid, resolve_service_name(&uuid));
            info!("Found service: {}", record.name);

            tokio::time::sleep(self.step_delay).await;

            result.skipped_characteristics += self.walk_characteristics(link, &raw, &mut record).await;
            result.services.insert(record);
        }

        info!(
            "Enumerated {} services, {} characteristics ({} services and {} characteristics skipped)",
            result.services.len(),
            result.services.characteristic_count(),
            result.skipped_services,
            result.skipped_characteristics
        );

        result
    }

    /// Append the service's decodable characteristics, returning how many were skipped.
    async fn walk_characteristics<L: GattLink>(
        &self,
        link: &L,
        raw: &RawService,
        record: &mut ServiceRecord,
    ) -> usize {
        let mut characteristics = match link.characteristics(raw).await {
            Ok(characteristics) => characteristics,
            Err(e) => {
                warn!("Could not read characteristics of {}: {}", record.name, e);
                return 0;
            }
        };

        let mut skipped = 0;
        while let Some(item) = characteristics.next().await {
            match item.ok().as_ref().and_then(decode_characteristic) {
                Some(characteristic) => record.characteristics.push(characteristic),
                None => skipped += 1,
            }
        }
        skipped
    }
}
