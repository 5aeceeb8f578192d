//! Well-known GATT service UUIDs.
//!
//! Maps assigned 16-bit service UUIDs to human names and renders UUIDs in
//! the compact `0xNNNN` form when they sit on the Bluetooth base UUID.

use uuid::Uuid;

/// Bluetooth base UUID `0000xxxx-0000-1000-8000-00805f9b34fb`.
pub const BLUETOOTH_BASE_UUID: Uuid = Uuid::from_u128(0x0000_0000_0000_1000_8000_00805f9b34fb);

const BASE_MASK: u128 = 0xffff_ffff_0000_0000_0000_0000_0000_0000;

/// Generic Access service UUID.
pub const GENERIC_ACCESS_UUID: Uuid = Uuid::from_u128(0x0000_1800_0000_1000_8000_00805f9b34fb);
/// Generic Attribute service UUID.
pub const GENERIC_ATTRIBUTE_UUID: Uuid = Uuid::from_u128(0x0000_1801_0000_1000_8000_00805f9b34fb);
/// Device Information service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// Battery service UUID.
pub const BATTERY_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180f_0000_1000_8000_00805f9b34fb);

const KNOWN_SERVICES: &[(u16, &str)] = &[
    (0x1800, "Generic Access"),
    (0x1801, "Generic Attribute"),
    (0x180a, "Device Information"),
    (0x180f, "Battery Service"),
    (0x180d, "Heart Rate"),
    (0x1815, "Automation IO"),
    (0x1809, "Health Thermometer"),
    (0xffe0, "HM-10 Serial (Proprietary)"),
    (0xfebe, "Bose Proprietary"),
];

/// Build a full UUID from an assigned 16-bit number.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | ((short as u128) << 96))
}

/// Extract the 16-bit assigned number if the UUID lies on the base UUID.
pub fn as_u16(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & !BASE_MASK != BLUETOOTH_BASE_UUID.as_u128() {
        return None;
    }
    u16::try_from(value >> 96).ok()
}

/// Render a UUID the way probe results key it: `0x180f` or hyphenated.
pub fn uuid_key(uuid: &Uuid) -> String {
    match as_u16(uuid) {
        Some(short) => format!("{:#06x}", short),
        None => uuid.hyphenated().to_string(),
    }
}

/// Look up the assigned name of a service.
pub fn service_name(uuid: &Uuid) -> Option<&'static str> {
    let short = as_u16(uuid)?;
    KNOWN_SERVICES
        .iter()
        .find(|(id, _)| *id == short)
        .map(|(_, name)| *name)
}

/// Resolve a service UUID to its name, falling back to the raw UUID string.
pub fn resolve_service_name(uuid: &Uuid) -> String {
    service_name(uuid)
        .map(str::to_string)
        .unwrap_or_else(|| uuid_key(uuid))
}
