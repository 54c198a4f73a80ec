//! Temperature / humidity sensor resource.
//!
//! [`ClimateSensor`] wraps any [`ClimateProbe`] (a DHT-class single-wire
//! part, an I2C combo sensor) and reports two metrics per read:
//! `temp` in °C and `humi` in %RH. The probe protocol itself lives behind
//! the trait.
//!
//! ## Plausibility bounds
//!
//! | Metric | Range | Outside range |
//! |--------|-------|---------------|
//! | temp | -40 … 80 °C | `SensorError::OutOfRange` |
//! | humi | 0 … 100 %RH | `SensorError::OutOfRange` |
//!
//! A reading that fails either bound is discarded whole.

use std::sync::{Arc, Mutex, PoisonError};

use crate::app::events::{Metric, Reading};
use crate::app::ports::{Readable, Resource};
use crate::error::SensorError;

pub const TEMP_MIN_C: f32 = -40.0;
pub const TEMP_MAX_C: f32 = 80.0;

/// One probe sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    pub temperature_c: f32,
    pub humidity_pct: f32,
}

/// Low-level temperature/humidity probe.
pub trait ClimateProbe: Send {
    fn measure(&mut self) -> Result<ClimateReading, SensorError>;
}

pub struct ClimateSensor<P> {
    name: String,
    probe: P,
}

impl<P: ClimateProbe> ClimateSensor<P> {
    pub fn new(name: impl Into<String>, probe: P) -> Self {
        Self {
            name: name.into(),
            probe,
        }
    }
}

impl<P: ClimateProbe> Resource for ClimateSensor<P> {
    fn name(&self) -> &str {
        &self.name
    }
}

impl<P: ClimateProbe> Readable for ClimateSensor<P> {
    fn read(&mut self) -> Result<Reading, SensorError> {
        let r = self.probe.measure()?;
        if !(TEMP_MIN_C..=TEMP_MAX_C).contains(&r.temperature_c)
            || !(0.0..=100.0).contains(&r.humidity_pct)
        {
            return Err(SensorError::OutOfRange);
        }
        let mut reading = Reading::new();
        let _ = reading.push(Metric::new("temp", f64::from(r.temperature_c)));
        let _ = reading.push(Metric::new("humi", f64::from(r.humidity_pct)));
        Ok(reading)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulated probe (host)
// ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct SimProbeState {
    reading: ClimateReading,
    fail_remaining: u32,
    reads: u32,
}

/// Probe returning a settable value; failures are injected through
/// [`SimClimateHandle`].
pub struct SimClimateProbe {
    state: Arc<Mutex<SimProbeState>>,
}

/// Test-side control of a [`SimClimateProbe`].
#[derive(Clone)]
pub struct SimClimateHandle {
    state: Arc<Mutex<SimProbeState>>,
}

impl SimClimateProbe {
    pub fn new(temperature_c: f32, humidity_pct: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimProbeState {
                reading: ClimateReading {
                    temperature_c,
                    humidity_pct,
                },
                fail_remaining: 0,
                reads: 0,
            })),
        }
    }

    pub fn handle(&self) -> SimClimateHandle {
        SimClimateHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl SimClimateHandle {
    pub fn set(&self, temperature_c: f32, humidity_pct: f32) {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        s.reading = ClimateReading {
            temperature_c,
            humidity_pct,
        };
    }

    /// The next `n` measurements fail with `ReadFailed`.
    pub fn fail_next(&self, n: u32) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_remaining = n;
    }

    pub fn reads(&self) -> u32 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).reads
    }
}

impl ClimateProbe for SimClimateProbe {
    fn measure(&mut self) -> Result<ClimateReading, SensorError> {
        let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        s.reads += 1;
        if s.fail_remaining > 0 {
            s.fail_remaining -= 1;
            return Err(SensorError::ReadFailed);
        }
        Ok(s.reading)
    }
}
