//! Discovered device records and the device table.
//!
//! The table is rebuilt on every scan. Entries are keyed by hardware address
//! and merge-updated on repeated sightings within one scan.

use btleplug::api::BDAddr;
use std::collections::HashMap;

/// Name given to devices that did not advertise a local name.
pub const UNKNOWN_NAME: &str = "Unknown";

/// A peripheral seen during the current scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice<D> {
    /// Hardware address.
    pub address: BDAddr,
    /// Advertised local name, or [`UNKNOWN_NAME`].
    pub name: String,
    /// Signal strength of the latest sighting in dBm.
    pub last_rssi: i16,
    /// Transport handle used to connect to the device.
    pub handle: D,
}

impl<D> DiscoveredDevice<D> {
    /// Check if the device has advertised a real name.
    pub fn has_name(&self) -> bool {
        self.name != UNKNOWN_NAME
    }

    /// Handle-free view of this device.
    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            name: self.name.clone(),
            mac: self.address.to_string(),
            rssi: self.last_rssi,
        }
    }
}

/// Serializable view of a discovered device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceSummary {
    /// Advertised name.
    pub name: String,
    /// Hardware address.
    pub mac: String,
    /// Latest signal strength in dBm.
    pub rssi: i16,
}

/// Outcome of feeding one sighting into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A new entry was created.
    Inserted,
    /// An existing entry was refreshed.
    Updated {
        /// The entry went from unknown to a real name.
        renamed: bool,
    },
    /// An anonymous sighting of an unseen address was filtered out.
    Dropped,
}

/// Resolve an advertised name, defaulting to [`UNKNOWN_NAME`].
pub fn resolve_name(advertised: Option<&str>) -> String {
    match advertised.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => UNKNOWN_NAME.to_string(),
    }
}

/// In-memory set of discovered devices, keyed by address.
#[derive(Debug, Clone)]
pub struct DeviceTable<D> {
    entries: HashMap<BDAddr, DiscoveredDevice<D>>,
    /// Addresses in first-seen order.
    order: Vec<BDAddr>,
}

impl<D> Default for DeviceTable<D> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }
}

impl<D: Clone> DeviceTable<D> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a device by address.
    pub fn get(&self, address: &BDAddr) -> Option<&DiscoveredDevice<D>> {
        self.entries.get(address)
    }

    /// Merge a sighting into the table.
    ///
    /// New addresses are inserted unless `named_only` is set and the sighting
    /// is anonymous. Existing entries always take the latest signal strength,
    /// keep their name unless it is unknown and the sighting carries a real
    /// one, and are never evicted by an anonymous re-advertisement.
    pub fn observe(
        &mut self,
        address: BDAddr,
        name: String,
        rssi: i16,
        handle: D,
        named_only: bool,
    ) -> Observation {
        if let Some(existing) = self.entries.get_mut(&address) {
            let renamed = !existing.has_name() && name != UNKNOWN_NAME;
            if renamed {
                existing.name = name;
            }
            existing.last_rssi = rssi;
            existing.handle = handle;
            return Observation::Updated { renamed };
        }

        if named_only && name == UNKNOWN_NAME {
            return Observation::Dropped;
        }

        self.order.push(address);
        self.entries.insert(
            address,
            DiscoveredDevice {
                address,
                name,
                last_rssi: rssi,
                handle,
            },
        );
        Observation::Inserted
    }

    /// Entries in first-seen order.
    pub fn snapshot(&self) -> Vec<DiscoveredDevice<D>> {
        self.order
            .iter()
            .filter_map(|address| self.entries.get(address))
            .cloned()
            .collect()
    }

    /// Handle-free entries in first-seen order.
    pub fn summaries(&self) -> Vec<DeviceSummary> {
        self.order
            .iter()
            .filter_map(|address| self.entries.get(address))
            .map(DiscoveredDevice::summary)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn addr(last: u8) -> BDAddr {
        BDAddr::from([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, last])
    }

    #[test]
    fn test_resolve_name() {
        assert_eq!(resolve_name(Some("Sensor")), "Sensor");
        assert_eq!(resolve_name(Some("  ")), UNKNOWN_NAME);
        assert_eq!(resolve_name(None), UNKNOWN_NAME);
    }

    #[test]
    fn test_name_upgrade_and_rssi_refresh() {
        let mut table = DeviceTable::new();
        assert_eq!(
            table.observe(addr(1), UNKNOWN_NAME.into(), -80, (), false),
            Observation::Inserted
        );
        assert_eq!(
            table.observe(addr(1), "Sensor".into(), -70, (), false),
            Observation::Updated { renamed: true }
        );
        assert_eq!(
            table.observe(addr(1), "Other".into(), -60, (), false),
            Observation::Updated { renamed: false }
        );

        let device = table.get(&addr(1)).unwrap();
        assert_eq!(device.name, "Sensor");
        assert_eq!(device.last_rssi, -60);
    }

    #[test]
    fn test_named_only_keeps_existing_entry() {
        let mut table = DeviceTable::new();
        table.observe(addr(1), "Sensor".into(), -70, (), true);
        assert_eq!(
            table.observe(addr(1), UNKNOWN_NAME.into(), -65, (), true),
            Observation::Updated { renamed: false }
        );
        assert_eq!(
            table.observe(addr(2), UNKNOWN_NAME.into(), -65, (), true),
            Observation::Dropped
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&addr(1)).unwrap().last_rssi, -65);
    }

    #[test]
    fn test_snapshot_preserves_first_seen_order() {
        let mut table = DeviceTable::new();
        table.observe(addr(3), "C".into(), -50, (), false);
        table.observe(addr(1), "A".into(), -50, (), false);
        table.observe(addr(3), "C".into(), -40, (), false);

        let names: Vec<_> = table.summaries().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["C".to_string(), "A".to_string()]);

        table.clear();
        assert!(table.is_empty());
        assert!(table.snapshot().is_empty());
    }

    fn sighting() -> impl Strategy<Value = (u8, Option<String>, i16)> {
        (
            0u8..6,
            prop::option::of(prop::sample::select(vec!["Sensor".to_string(), "Tag".to_string()])),
            -100i16..-20,
        )
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_address_with_latest_rssi(
            sightings in prop::collection::vec(sighting(), 0..64),
            named_only in any::<bool>(),
        ) {
            let mut table = DeviceTable::new();
            let mut latest = HashMap::new();
            for (last, name, rssi) in &sightings {
                let obs = table.observe(addr(*last), resolve_name(name.as_deref()), *rssi, (), named_only);
                if obs != Observation::Dropped {
                    latest.insert(addr(*last), *rssi);
                }
            }

            let snapshot = table.snapshot();
            prop_assert_eq!(snapshot.len(), latest.len());
            for device in snapshot {
                prop_assert_eq!(Some(&device.last_rssi), latest.get(&device.address));
            }
        }

        #[test]
        fn prop_named_devices_are_never_evicted(
            sightings in prop::collection::vec(sighting(), 0..64),
        ) {
            let mut table = DeviceTable::new();
            let mut named = std::collections::HashSet::new();
            for (last, name, rssi) in &sightings {
                table.observe(addr(*last), resolve_name(name.as_deref()), *rssi, (), true);
                for address in &named {
                    let device = table.get(address);
                    prop_assert!(device.map(|d| d.has_name()).unwrap_or(false));
                }
                if table.get(&addr(*last)).map(|d| d.has_name()).unwrap_or(false) {
                    named.insert(addr(*last));
                }
            }
        }
    }
}
