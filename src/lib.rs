//! devbridge library.
//!
//! Exposes the bridge components for the binary and for integration
//! testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; host builds use the
//! simulated link, broker, pins and probes.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod measurement;
pub mod resources;
pub mod rpc;
pub mod scheduler;
pub mod session;
pub mod supervisor;
pub mod topics;

mod esp_link_shims;

// Links the `critical-section/std` implementation used by the inbound channel.
#[cfg(not(target_os = "espidf"))]
use critical_section as _;
