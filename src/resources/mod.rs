//! Resource adapters: one readable or controllable hardware unit each.
//!
//! | Adapter | Implements | Hardware |
//! |---------|------------|----------|
//! | `gpio::GpioSwitch` | Readable + Writable | digital output (relay, LED) |
//! | `climate::ClimateSensor` | Readable | temperature / humidity probe |
//!
//! Adapters know nothing about the network. Each one is shared between
//! the telemetry scheduler and the RPC dispatcher behind its own mutex.

use std::sync::{Arc, Mutex};

use crate::app::ports::{Readable, Writable};

pub mod climate;
pub mod gpio;

pub type SharedReadable = Arc<Mutex<dyn Readable>>;
pub type SharedWritable = Arc<Mutex<dyn Writable>>;
