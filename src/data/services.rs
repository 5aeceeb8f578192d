//! GATT enumeration results.
//!
//! Service and characteristic records built fresh for each probe.

use btleplug::api::{BDAddr, CharPropFlags};
use uuid::Uuid;

use crate::ble::uuids::uuid_key;

/// Characteristic capability reported in probe results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum CharProperty {
    /// Value can be read.
    #[cfg_attr(feature = "serde", serde(rename = "R"))]
    Read,
    /// Value can be written with response.
    #[cfg_attr(feature = "serde", serde(rename = "W"))]
    Write,
    /// Value changes are notified.
    #[cfg_attr(feature = "serde", serde(rename = "N"))]
    Notify,
}

impl CharProperty {
    /// Compact symbol used in logs and JSON.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Read => "R",
            Self::Write => "W",
            Self::Notify => "N",
        }
    }

    /// Translate GATT property bits into properties, always in R, W, N order.
    pub fn from_flags(flags: CharPropFlags) -> Vec<Self> {
        [
            (CharPropFlags::READ, Self::Read),
            (CharPropFlags::WRITE, Self::Write),
            (CharPropFlags::NOTIFY, Self::Notify),
        ]
        .into_iter()
        .filter(|(bit, _)| flags.contains(*bit))
        .map(|(_, prop)| prop)
        .collect()
    }
}

impl std::fmt::Display for CharProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A characteristic found under a service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CharacteristicRecord {
    /// Characteristic UUID.
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_uuid_key"))]
    pub uuid: Uuid,
    /// Supported operations.
    #[cfg_attr(feature = "serde", serde(rename = "props"))]
    pub properties: Vec<CharProperty>,
}

impl CharacteristicRecord {
    /// Properties as a bracketed symbol list, e.g. `[R, N]`.
    pub fn properties_string(&self) -> String {
        let symbols: Vec<_> = self.properties.iter().map(CharProperty::symbol).collect();
        format!("[{}]", symbols.join(", "))
    }
}

/// A service and the characteristics found under it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServiceRecord {
    /// Service UUID.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub uuid: Uuid,
    /// Name from the UUID registry, or the raw UUID.
    pub name: String,
    /// Characteristics in discovery order.
    #[cfg_attr(feature = "serde", serde(rename = "chars"))]
    pub characteristics: Vec<CharacteristicRecord>,
}

impl ServiceRecord {
    /// Create a service record with no characteristics.
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            characteristics: Vec::new(),
        }
    }

    /// Key under which this service appears in a [`ServiceMap`].
    pub fn key(&self) -> String {
        uuid_key(&self.uuid)
    }
}

/// Services keyed by UUID, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMap {
    entries: Vec<(String, ServiceRecord)>,
}

impl ServiceMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service. A repeated UUID replaces the earlier record in place.
    pub fn insert(&mut self, record: ServiceRecord) -> String {
        let key = record.key();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = record,
            None => self.entries.push((key.clone(), record)),
        }
        key
    }

    /// Look up a service by key.
    pub fn get(&self, key: &str) -> Option<&ServiceRecord> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, record)| record)
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no services were recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(key, record)` pairs in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ServiceRecord)> {
        self.entries.iter().map(|(k, record)| (k.as_str(), record))
    }

    /// Total characteristics across all services.
    pub fn characteristic_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, record)| record.characteristics.len())
            .sum()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ServiceMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, record) in &self.entries {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
fn serialize_uuid_key<S: serde::Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&uuid_key(uuid))
}

#[cfg(feature = "serde")]
fn serialize_address<S: serde::Serializer>(
    address: &BDAddr,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(address)
}

/// How the probed device was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeviceSource {
    /// Found in the device table from the last scan.
    #[default]
    Scanned,
    /// Not in the table; connected by raw address, identity unverified.
    Blind,
}

/// Everything learned from probing one device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProbeResult {
    /// Name from the device table, or "Unknown Device".
    pub device_name: String,
    /// Address that was probed.
    #[cfg_attr(feature = "serde", serde(serialize_with = "serialize_address"))]
    pub address: BDAddr,
    /// Whether the device came from the last scan.
    pub source: DeviceSource,
    /// Enumerated services.
    pub services: ServiceMap,
}

impl ProbeResult {
    /// Check if the result came from a blind connect.
    pub fn is_blind(&self) -> bool {
        self.source == DeviceSource::Blind
    }
}
