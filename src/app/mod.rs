//! Application core: domain types and port traits, zero I/O.
//!
//! All interaction with hardware, the network and the clock happens
//! through **port traits** defined in [`ports`], keeping the session,
//! scheduler and dispatcher testable without real peripherals.

pub mod events;
pub mod identity;
pub mod ports;
