//! Task Watchdog Timer (TWDT) driver.
//!
//! Wraps the ESP-IDF TWDT API to reset the device if the supervisor task
//! stalls for longer than the configured timeout. This is the outermost
//! recovery layer: a hung broker handshake or a wedged driver ends in a
//! hardware reset rather than a silent device.
//!
//! The supervisor feeds it from the run loop's idle hook and between
//! backoff slices. A zero timeout leaves the TWDT untouched.

use std::time::Duration;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::info;

pub struct Watchdog {
    timeout: Duration,
    #[cfg(target_os = "espidf")]
    subscribed: bool,
    #[cfg(not(target_os = "espidf"))]
    feeds: std::sync::atomic::AtomicU32,
}

impl Watchdog {
    /// Configure the TWDT and subscribe the current task.
    pub fn new(timeout: Duration) -> Self {
        if timeout.is_zero() {
            return Self::disabled();
        }

        #[cfg(target_os = "espidf")]
        {
            // SAFETY: plain FFI calls on the current task; the config is
            // copied by ESP-IDF before returning.
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: timeout.as_millis() as u32,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    log::warn!(
                        "TWDT reconfigure returned {} (may already be configured)",
                        ret
                    );
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!(
                        "Watchdog: subscribed ({} ms timeout, panic on trigger)",
                        timeout.as_millis()
                    );
                } else {
                    log::warn!("Watchdog: failed to subscribe ({})", ret);
                }

                Self { timeout, subscribed }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("Watchdog(sim): {} ms timeout, not enforced", timeout.as_millis());
            Self {
                timeout,
                feeds: std::sync::atomic::AtomicU32::new(0),
            }
        }
    }

    /// A watchdog that never fires.
    pub fn disabled() -> Self {
        info!("Watchdog: disabled");
        Self {
            timeout: Duration::ZERO,
            #[cfg(target_os = "espidf")]
            subscribed: false,
            #[cfg(not(target_os = "espidf"))]
            feeds: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Feed the watchdog. Must be called at least once per timeout.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: resets the TWDT entry of the calling task.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.feeds
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Number of feeds so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn feeds(&self) -> u32 {
        self.feeds.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Watchdog {
    fn drop(&mut self) {
        if self.subscribed {
            // SAFETY: null removes the calling task, which `new` subscribed.
            unsafe {
                esp_task_wdt_delete(core::ptr::null_mut());
            }
        }
    }
}
