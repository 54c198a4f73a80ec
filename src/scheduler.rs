//! Telemetry scheduler.
//!
//! Samples every registered [`Readable`](crate::app::ports::Readable) once per period and publishes one
//! payload per metric to the measurement topic.
//!
//! ```text
//!   poll(now) ──due?──▶ tick(now)
//!                         │  for each sensor:
//!                         │    read() ─Err─▶ skip, count
//!                         │      │ Ok
//!                         ▼      ▼
//!                    Measurement per metric ──▶ Publisher::publish
//! ```
//!
//! The scheduler never waits on the broker: publishes are fire-and-forget
//! and a disconnected session simply drops them. It runs either from the
//! session run loop's idle hook ([`poll`](TelemetryScheduler::poll)) or on
//! its own thread ([`run_until`](TelemetryScheduler::run_until)).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info};

use crate::app::events::Measurement;
use crate::app::ports::{Clock, PublishOutcome, Publisher};
use crate::error::SensorError;
use crate::measurement::MeasurementEncoding;
use crate::resources::SharedReadable;

/// Longest single sleep in [`TelemetryScheduler::run_until`], bounding how
/// late a stop request is noticed.
const STOP_POLL: Duration = Duration::from_millis(50);

// ═══════════════════════════════════════════════════════════════
//  Stats
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryStats {
    pub ticks: u32,
    /// Measurements handed to the transport.
    pub published: u32,
    /// Measurements the session dropped or failed to send.
    pub undelivered: u32,
    /// Sensor reads skipped because of a fault.
    pub sensor_faults: u32,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

pub struct TelemetryScheduler {
    period_ms: u64,
    topic: String,
    encoding: MeasurementEncoding,
    sensors: Vec<SharedReadable>,
    /// `None` until the first poll after construction or [`reset`](Self::reset).
    next_due_ms: Option<u64>,
    stats: TelemetryStats,
}

impl TelemetryScheduler {
    pub fn new(period: Duration, topic: impl Into<String>, encoding: MeasurementEncoding) -> Self {
        Self {
            period_ms: (period.as_millis() as u64).max(1),
            topic: topic.into(),
            encoding,
            sensors: Vec::new(),
            next_due_ms: None,
            stats: TelemetryStats::default(),
        }
    }

    pub fn add_sensor(&mut self, sensor: SharedReadable) {
        self.sensors.push(sensor);
    }

    pub fn sensor_count(&self) -> usize {
        self.sensors.len()
    }

    pub fn stats(&self) -> TelemetryStats {
        self.stats
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Restart the period; the next tick is one full period after the
    /// next `poll`.
    pub fn reset(&mut self) {
        self.next_due_ms = None;
    }

    /// Tick if a period has elapsed. Returns whether a tick ran.
    ///
    /// Ticks are fixed-rate. If the caller fell more than a period behind,
    /// missed ticks are skipped rather than replayed.
    pub fn poll(&mut self, now_ms: u64, publisher: &dyn Publisher) -> bool {
        let due = *self
            .next_due_ms
            .get_or_insert(now_ms.saturating_add(self.period_ms));
        if now_ms < due {
            return false;
        }
        self.tick(now_ms, publisher);
        let mut next = due.saturating_add(self.period_ms);
        if next <= now_ms {
            next = now_ms.saturating_add(self.period_ms);
        }
        self.next_due_ms = Some(next);
        true
    }

    /// Sample every sensor now. Returns the number of measurements sent.
    pub fn tick(&mut self, now_ms: u64, publisher: &dyn Publisher) -> usize {
        self.stats.ticks += 1;
        let mut sent = 0;
        for sensor in &self.sensors {
            // Lock only for the read; publishing happens with the sensor free.
            let (name, result) = match sensor.lock() {
                Ok(mut s) => (s.name().to_owned(), s.read()),
                Err(_) => ("<poisoned>".to_owned(), Err(SensorError::Unavailable)),
            };
            let reading = match result {
                Ok(r) => r,
                Err(e) => {
                    self.stats.sensor_faults += 1;
                    debug!("Telemetry: '{}' skipped this tick: {}", name, e);
                    continue;
                }
            };
            for metric in reading {
                let m = Measurement::new(&name, metric, now_ms);
                let payload = self.encoding.encode(&m);
                match publisher.publish(&self.topic, &payload) {
                    PublishOutcome::Sent => {
                        self.stats.published += 1;
                        sent += 1;
                    }
                    PublishOutcome::Dropped | PublishOutcome::Failed => {
                        self.stats.undelivered += 1;
                    }
                }
            }
        }
        sent
    }

    /// Dedicated-thread loop: poll until `stop` is set.
    pub fn run_until(&mut self, publisher: &dyn Publisher, clock: &dyn Clock, stop: &AtomicBool) {
        info!(
            "Telemetry: thread started ({} sensor(s), every {} ms)",
            self.sensors.len(),
            self.period_ms
        );
        self.reset();
        while !stop.load(Ordering::Acquire) {
            let now = clock.now_ms();
            self.poll(now, publisher);
            let remaining = self
                .next_due_ms
                .map_or(self.period_ms, |due| due.saturating_sub(clock.now_ms()));
            clock.sleep(Duration::from_millis(remaining.max(1)).min(STOP_POLL));
        }
        info!("Telemetry: thread stopped");
    }
}
