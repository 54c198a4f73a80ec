//! Port traits: the hexagonal boundary between the bridge core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Session / Scheduler / Dispatcher
//! ```
//!
//! Driven adapters (GPIO pins, probes, Wi-Fi, MQTT client, clocks, config
//! storage) implement these traits. The core consumes them via generics or
//! trait objects, so it never touches hardware or sockets directly.

use std::sync::Arc;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::error::{ActuatorError, BridgeError, SensorError};
use crate::session::inbound::InboundQueue;

use super::events::{AppEvent, Reading, Status};
use super::identity::Identity;

// ───────────────────────────────────────────────────────────────
// Resource ports (driven adapters: hardware ↔ core)
// ───────────────────────────────────────────────────────────────

/// A named hardware unit.
pub trait Resource: Send {
    fn name(&self) -> &str;
}

/// Read-side capability. A pure sensor implements only this.
pub trait Readable: Resource {
    /// Sample the resource. Must not change its state.
    ///
    /// A fault is reported as [`SensorError`]; callers skip the sample.
    fn read(&mut self) -> Result<Reading, SensorError>;
}

/// Write-side capability. A pure actuator implements only this.
///
/// Implementors provide [`apply`](Self::apply) and
/// [`current`](Self::current); the state-changed event is emitted by the
/// provided methods so that every adapter honours the same contract.
pub trait Writable: Resource {
    /// Drive the hardware to `status` and return the value actually applied.
    /// Applying the current value again must not touch the hardware.
    fn apply(&mut self, status: Status) -> Result<Status, ActuatorError>;

    /// Last applied status.
    fn current(&self) -> Status;

    /// Attribute key the status is published under.
    fn attribute(&self) -> &str {
        "status"
    }

    /// Return the hardware to its safe idle level during teardown.
    fn release(&mut self) {}

    /// Apply `status` and emit exactly one [`AppEvent::StateChanged`].
    fn set_status(
        &mut self,
        status: Status,
        sink: &mut dyn EventSink,
    ) -> Result<Status, ActuatorError> {
        let applied = self.apply(status)?;
        sink.emit(&AppEvent::StateChanged {
            resource: self.name().to_owned(),
            attribute: self.attribute().to_owned(),
            status: applied,
        });
        Ok(applied)
    }

    /// `set_status(!current())`.
    fn toggle(&mut self, sink: &mut dyn EventSink) -> Result<Status, ActuatorError> {
        let next = self
            .current()
            .negate()
            .ok_or(ActuatorError::UnsupportedStatus)?;
        self.set_status(next, sink)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink port (domain → broker / log)
// ───────────────────────────────────────────────────────────────

/// Resource adapters emit [`AppEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Publisher port (scheduler / dispatcher → session)
// ───────────────────────────────────────────────────────────────

/// What happened to a fire-and-forget publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport.
    Sent,
    /// Not connected; discarded without touching the transport.
    Dropped,
    /// The transport reported an error; the session is now down.
    Failed,
}

/// Anything that can publish a payload to a topic.
pub trait Publisher: Sync {
    fn publish(&self, topic: &str, payload: &[u8]) -> PublishOutcome;
}

// ───────────────────────────────────────────────────────────────
// Network link port (driven adapter: core ↔ Wi-Fi / Ethernet)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    AssociationFailed,
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no network credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::AssociationFailed => write!(f, "association failed"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<LinkError> for BridgeError {
    fn from(_: LinkError) -> Self {
        Self::NetworkUnavailable
    }
}

/// Network-layer association, below the broker session.
pub trait NetworkLink: Send {
    /// Start (or restart) association. May return before the link is up.
    fn associate(&mut self) -> Result<(), LinkError>;
    fn is_connected(&self) -> bool;
    fn disconnect(&mut self);
    /// Signal strength in dBm, when the link has one.
    fn rssi(&self) -> Option<i8> {
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Broker transport port (driven adapter: core ↔ MQTT client)
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// CONNACK refused the credentials.
    AuthRejected,
    /// TCP connect or handshake failed / timed out.
    Unreachable,
    /// Operation needs an open session.
    NotConnected,
    /// Write to an open session failed.
    Io,
}

impl core::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AuthRejected => write!(f, "authentication rejected"),
            Self::Unreachable => write!(f, "broker unreachable"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Io => write!(f, "transport I/O error"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<BrokerError> for BridgeError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::AuthRejected => Self::AuthRejected,
            BrokerError::Unreachable => Self::BrokerUnreachable,
            BrokerError::NotConnected | BrokerError::Io => Self::TransportFatal,
        }
    }
}

/// MQTT-style publish/subscribe session.
///
/// Keep-alive is the implementation's job; [`is_alive`](Self::is_alive)
/// reports whether it still holds.
pub trait BrokerTransport: Send {
    /// Open a session. Inbound messages on subscribed topics are pushed
    /// into `inbound` until the next `disconnect`.
    fn connect(
        &mut self,
        identity: &Identity,
        keep_alive: Duration,
        inbound: Arc<InboundQueue>,
    ) -> Result<(), BrokerError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    fn subscribe(&mut self, filter: &str) -> Result<(), BrokerError>;

    fn is_alive(&self) -> bool;

    fn disconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Configuration port
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config could not be read.
    IoError(String),
    /// Stored config failed deserialization.
    Corrupted(String),
    /// A config field failed range validation.
    ValidationFailed(&'static str),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
            Self::Corrupted(msg) => write!(f, "config corrupted: {}", msg),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for BridgeError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::IoError(_) => Self::Config("unreadable"),
            ConfigError::Corrupted(_) => Self::Config("corrupted"),
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
        }
    }
}

/// Loads the static startup configuration.
///
/// Implementations MUST validate before returning; invalid ranges are
/// rejected with [`ConfigError::ValidationFailed`], not clamped.
pub trait ConfigPort {
    fn load(&self) -> Result<BridgeConfig, ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Monotonic time and blocking delay.
///
/// Every wait in the bridge goes through this trait so tests can run
/// backoff and telemetry periods without real sleeps.
pub trait Clock: Send + Sync {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    fn sleep(&self, duration: Duration);
}
