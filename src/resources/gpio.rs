//! GPIO switch: a single digital output exposed as a readable and
//! writable resource.
//!
//! ## Dual-target design
//!
//! Generic over the `embedded-hal` 1.0 [`StatefulOutputPin`] trait. On
//! ESP-IDF the pin is an `esp_idf_hal::gpio::PinDriver` in output mode;
//! on host/test it is a [`SimOutputPin`] that records writes in memory.
//!
//! The pin is driven low at construction and again on
//! [`release`](Writable::release), so a restart never leaves a relay
//! energised from the previous session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use embedded_hal::digital::{self, ErrorKind, ErrorType, OutputPin, StatefulOutputPin};
use log::warn;

use crate::app::events::{Metric, Reading, Status};
use crate::app::ports::{Readable, Resource, Writable};
use crate::error::{ActuatorError, SensorError};

pub struct GpioSwitch<P> {
    name: String,
    attribute: String,
    pin: P,
    level: bool,
}

impl<P: StatefulOutputPin + Send> GpioSwitch<P> {
    /// Take ownership of `pin` and drive it low.
    pub fn new(name: impl Into<String>, mut pin: P) -> Result<Self, ActuatorError> {
        pin.set_low().map_err(|_| ActuatorError::GpioWriteFailed)?;
        Ok(Self {
            name: name.into(),
            attribute: "status".to_owned(),
            pin,
            level: false,
        })
    }

    /// Publish state under `attribute` instead of `status`.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = attribute.into();
        self
    }

    fn drive(&mut self, high: bool) -> Result<(), ActuatorError> {
        let res = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        res.map_err(|_| ActuatorError::GpioWriteFailed)
    }
}

/// Switch levels accept booleans and the numeric forms 0 / 1.
fn level_of(status: Status) -> Option<bool> {
    match status {
        Status::Bool(b) => Some(b),
        Status::Number(n) if n == 0.0 => Some(false),
        Status::Number(n) if n == 1.0 => Some(true),
        Status::Number(_) => None,
    }
}

impl<P: StatefulOutputPin + Send> Resource for GpioSwitch<P> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<P: StatefulOutputPin + Send> Readable for GpioSwitch<P> {
    fn read(&mut self) -> Result<Reading, SensorError> {
        let high = self
            .pin
            .is_set_high()
            .map_err(|_| SensorError::GpioReadFailed)?;
        let mut reading = Reading::new();
        let _ = reading.push(Metric::new("status", high));
        Ok(reading)
    }
}

impl<P: StatefulOutputPin + Send> Writable for GpioSwitch<P> {
    fn apply(&mut self, status: Status) -> Result<Status, ActuatorError> {
        let level = level_of(status).ok_or(ActuatorError::UnsupportedStatus)?;
        if level != self.level {
            self.drive(level)?;
            self.level = level;
        }
        Ok(Status::Bool(level))
    }

    fn current(&self) -> Status {
        Status::Bool(self.level)
    }

    fn attribute(&self) -> &str {
        &self.attribute
    }

    fn release(&mut self) {
        if let Err(e) = self.drive(false) {
            warn!("GPIO: '{}' release failed: {}", self.name, e);
        }
        self.level = false;
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated pin (host)
// ───────────────────────────────────────────────────────────────

/// Injected failure from a [`SimOutputPin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimPinError;

impl digital::Error for SimPinError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// In-memory output pin. Clones share the same level, so a test keeps one
/// clone to observe the pin after handing the other to a [`GpioSwitch`].
#[derive(Debug, Clone, Default)]
pub struct SimOutputPin {
    level: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl SimOutputPin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_high(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    /// Hardware writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn write(&mut self, high: bool) -> Result<(), SimPinError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SimPinError);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.level.store(high, Ordering::SeqCst);
        Ok(())
    }
}

impl ErrorType for SimOutputPin {
    type Error = SimPinError;
}

impl OutputPin for SimOutputPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

impl StatefulOutputPin for SimOutputPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.level.load(Ordering::SeqCst))
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.level.load(Ordering::SeqCst))
    }
}
