//! Client id derived from the factory MAC address.
//!
//! When the configuration leaves `client_id` empty the bridge identifies
//! itself to the broker with the full 6-byte MAC in lowercase hex
//! (`deadbeefcafe`), which is stable across reboots.

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Lowercase hex of all six bytes.
pub fn client_id(mac: &MacAddress) -> heapless::String<12> {
    use core::fmt::Write;
    let mut id = heapless::String::new();
    for b in mac {
        let _ = write!(id, "{:02x}", b);
    }
    id
}
