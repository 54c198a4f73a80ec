//! Values that flow out of resources and into the broker.
//!
//! Resource adapters produce [`Status`] values and [`Reading`]s; the
//! scheduler turns readings into [`Measurement`]s and actuators emit
//! [`AppEvent::StateChanged`] through the
//! [`EventSink`](super::ports::EventSink) port. Adapters on the other side
//! decide what to do with them: publish over MQTT, log to serial, record
//! in a test.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of metrics a single resource read may return.
pub const MAX_METRICS: usize = 4;

/// Current value of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Status {
    Bool(bool),
    Number(f64),
}

impl Status {
    /// Logical negation. Numbers have no negation and yield `None`.
    pub fn negate(self) -> Option<Self> {
        match self {
            Self::Bool(b) => Some(Self::Bool(!b)),
            Self::Number(_) => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            Self::Number(_) => None,
        }
    }
}

impl From<bool> for Status {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Status {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl fmt::Display for Status {
    /// Whole numbers render without a fractional part (`22`, not `22.0`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// One named value inside a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metric {
    pub name: &'static str,
    pub value: Status,
}

impl Metric {
    pub fn new(name: &'static str, value: impl Into<Status>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// Everything a resource reports on one read.
pub type Reading = heapless::Vec<Metric, MAX_METRICS>;

/// A single timestamped value bound for the measurement topic.
///
/// Built fresh per tick, published once, then dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub resource: String,
    pub metric: &'static str,
    pub value: Status,
    /// Milliseconds since boot.
    pub timestamp_ms: u64,
}

impl Measurement {
    pub fn new(resource: &str, metric: Metric, timestamp_ms: u64) -> Self {
        Self {
            resource: resource.to_owned(),
            metric: metric.name,
            value: metric.value,
            timestamp_ms,
        }
    }
}

/// Structured events emitted by resource adapters.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A writable resource applied a status (emitted even when unchanged).
    StateChanged {
        resource: String,
        /// Attribute key the status is published under.
        attribute: String,
        status: Status,
    },
}
