//! Unified error types for the bridge.
//!
//! Errors fall into four classes that decide who recovers from them:
//!
//! | Class            | Variants                                              | Recovered by |
//! |------------------|-------------------------------------------------------|--------------|
//! | connection phase | `NetworkUnavailable`, `AuthRejected`, `BrokerUnreachable` | Supervisor backoff |
//! | per tick         | [`SensorError`]                                       | scheduler (skip sample) |
//! | per call         | [`ActuatorError`] and the RPC error kinds             | dispatcher (error response) |
//! | mid session      | `TransportFatal`                                      | Supervisor teardown + fault policy |
//!
//! All variants are `Copy` so they pass through the supervisor loop
//! without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level bridge error
// ---------------------------------------------------------------------------

/// Errors that escape the session and reach the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// The network link could not be associated.
    NetworkUnavailable,
    /// The broker refused the identity credentials.
    AuthRejected,
    /// The broker could not be reached or did not complete the handshake.
    BrokerUnreachable,
    /// The session failed after it was established.
    TransportFatal,
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl BridgeError {
    /// Connection-phase errors are retried by the supervisor with backoff.
    pub const fn is_connection_phase(self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable | Self::AuthRejected | Self::BrokerUnreachable
        )
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkUnavailable => write!(f, "network unavailable"),
            Self::AuthRejected => write!(f, "broker rejected credentials"),
            Self::BrokerUnreachable => write!(f, "broker unreachable"),
            Self::TransportFatal => write!(f, "transport failed mid-session"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

/// A resource could not be read. The scheduler skips the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// The probe did not answer or returned a checksum error.
    ReadFailed,
    /// GPIO level read returned an error.
    GpioReadFailed,
    /// Reading is outside the physically plausible range.
    OutOfRange,
    /// The resource lock was poisoned by a panicking holder.
    Unavailable,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed => write!(f, "probe read failed"),
            Self::GpioReadFailed => write!(f, "GPIO read failed"),
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::Unavailable => write!(f, "resource unavailable"),
        }
    }
}

impl std::error::Error for SensorError {}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

/// A resource rejected or failed to apply a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// GPIO set failed.
    GpioWriteFailed,
    /// The status kind does not fit this resource (e.g. a number for a switch).
    UnsupportedStatus,
    /// The resource lock was poisoned by a panicking holder.
    Unavailable,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::UnsupportedStatus => write!(f, "unsupported status value"),
            Self::Unavailable => write!(f, "resource unavailable"),
        }
    }
}

impl std::error::Error for ActuatorError {}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Bridge-wide `Result` alias.
pub type Result<T> = core::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_phase_classification() {
        assert!(BridgeError::NetworkUnavailable.is_connection_phase());
        assert!(BridgeError::AuthRejected.is_connection_phase());
        assert!(BridgeError::BrokerUnreachable.is_connection_phase());
        assert!(!BridgeError::TransportFatal.is_connection_phase());
        assert!(!BridgeError::Config("x").is_connection_phase());
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(BridgeError::AuthRejected.to_string(), "broker rejected credentials");
        assert_eq!(SensorError::OutOfRange.to_string(), "reading out of range");
        assert_eq!(ActuatorError::UnsupportedStatus.to_string(), "unsupported status value");
    }
}
