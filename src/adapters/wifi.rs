//! WiFi station-mode adapter.
//!
//! Implements [`NetworkLink`], the port the session manager associates
//! through before it opens a broker session.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: real ESP-IDF WiFi driver via `esp_idf_svc::wifi`.
//! - **all other targets**: a simulated link whose failures are injected
//!   through [`SimLinkHandle`].
//!
//! `associate()` only starts the association; the session manager polls
//! [`is_connected`](NetworkLink::is_connected) until the link is up or its
//! timeout expires.

use log::info;
#[cfg(target_os = "espidf")]
use log::{error, warn};

use crate::app::ports::{LinkError, NetworkLink};

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), LinkError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(LinkError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), LinkError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(LinkError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// Simulated link state (host)
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Default)]
    struct State {
        up: AtomicBool,
        fail_remaining: AtomicU32,
        associations: AtomicU32,
    }

    /// Test-side control over a simulated [`WifiAdapter`](super::WifiAdapter).
    #[derive(Clone, Default)]
    pub struct SimLinkHandle(Arc<State>);

    impl SimLinkHandle {
        /// The next `n` associations never bring the link up.
        pub fn fail_association_for(&self, n: u32) {
            self.0.fail_remaining.store(n, Ordering::SeqCst);
        }

        /// Drop an established link, as if the AP went away.
        pub fn drop_link(&self) {
            self.0.up.store(false, Ordering::SeqCst);
        }

        pub fn is_up(&self) -> bool {
            self.0.up.load(Ordering::SeqCst)
        }

        /// Number of `associate()` calls so far.
        pub fn associations(&self) -> u32 {
            self.0.associations.load(Ordering::SeqCst)
        }

        pub(super) fn associate(&self) -> u32 {
            let n = self.0.associations.fetch_add(1, Ordering::SeqCst) + 1;
            let failing = self
                .0
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
                .is_ok();
            self.0.up.store(!failing, Ordering::SeqCst);
            n
        }
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::SimLinkHandle;

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    #[cfg(target_os = "espidf")]
    wifi: BlockingWifi<EspWifi<'static>>,
    #[cfg(not(target_os = "espidf"))]
    sim: SimLinkHandle,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            wifi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            sim: SimLinkHandle::default(),
        }
    }

    /// Handle for injecting link failures in tests.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_handle(&self) -> SimLinkHandle {
        self.sim.clone()
    }

    pub fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), LinkError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| LinkError::InvalidSsid)?;
        self.password.clear();
        self.password
            .push_str(password)
            .map_err(|_| LinkError::InvalidPassword)?;
        info!("WiFi: credentials set (SSID='{}')", self.ssid);
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_associate(&mut self) -> Result<(), LinkError> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: self
                .ssid
                .as_str()
                .try_into()
                .map_err(|_| LinkError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| LinkError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });
        self.wifi.set_configuration(&config).map_err(|e| {
            error!("WiFi: set_configuration failed: {:?}", e);
            LinkError::AssociationFailed
        })?;
        if !self.wifi.is_started().unwrap_or(false) {
            self.wifi.start().map_err(|e| {
                error!("WiFi: start failed: {:?}", e);
                LinkError::AssociationFailed
            })?;
        }
        // Non-blocking connect; the session polls `is_connected`.
        self.wifi.wifi_mut().connect().map_err(|e| {
            warn!("WiFi: connect request failed: {:?}", e);
            LinkError::AssociationFailed
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_associate(&mut self) -> Result<(), LinkError> {
        let attempt = self.sim.associate();
        info!("WiFi(sim): association attempt {}", attempt);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.wifi.disconnect() {
            warn!("WiFi: disconnect failed: {:?}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim.drop_link();
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim.is_up()
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: `ap_info` is a valid, writable record for the duration of the call.
        let rc = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (rc == esp_idf_svc::sys::ESP_OK).then_some(ap_info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        self.sim.is_up().then_some(-60)
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────────────────────────────────────
// NetworkLink
// ───────────────────────────────────────────────────────────────

impl NetworkLink for WifiAdapter {
    fn associate(&mut self) -> Result<(), LinkError> {
        if self.ssid.is_empty() {
            return Err(LinkError::NoCredentials);
        }
        info!("WiFi: connecting to '{}'", self.ssid);
        self.platform_associate()
    }

    fn is_connected(&self) -> bool {
        self.platform_is_connected()
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        info!("WiFi: disconnected");
    }

    fn rssi(&self) -> Option<i8> {
        if !self.platform_is_connected() {
            return None;
        }
        self.platform_rssi()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
