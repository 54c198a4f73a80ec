//! Bridge configuration parameters.
//!
//! Loaded once at startup through [`ConfigPort`](crate::app::ports::ConfigPort)
//! and never written back. Every field has a default so a partial JSON
//! document is enough; [`BridgeConfig::validate`] rejects out-of-range
//! values instead of clamping them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::identity::Identity;
use crate::app::ports::ConfigError;
use crate::drivers::task_pin::Core;
use crate::measurement::MeasurementEncoding;
use crate::session::SessionPolicy;
use crate::session::backoff::BackoffPolicy;

/// Upper bound on how long the ESP-IDF MQTT client may take to report
/// `Connected`, used to size the watchdog check below.
pub const BROKER_CONNECT_TIMEOUT_MS: u32 = 10_000;

/// Core bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    // --- Identity / network ---
    pub identity: IdentityConfig,
    pub wifi: WifiConfig,

    // --- Telemetry ---
    /// Sampling period (milliseconds)
    pub telemetry_interval_ms: u32,
    pub measurement_encoding: MeasurementEncoding,

    // --- Session ---
    /// MQTT keep-alive (seconds)
    pub keep_alive_secs: u16,
    /// Time allowed for the link to come up (milliseconds)
    pub association_timeout_ms: u32,
    /// Link poll interval while associating; 0 polls as fast as possible
    pub network_poll_ms: u32,
    /// Run-loop idle sleep (milliseconds)
    pub loop_poll_ms: u32,

    // --- Supervision ---
    pub reconnect: BackoffPolicy,
    /// Consecutive failed connects before the fault policy applies; `None` retries forever
    pub max_connect_attempts: Option<u32>,
    pub on_fault: FaultPolicy,
    pub scheduling: SchedulingModel,
    /// Task watchdog timeout (milliseconds); 0 disables
    pub watchdog_timeout_ms: u32,

    // --- Resources ---
    pub switches: Vec<SwitchConfig>,
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Broker client id; derived from the MAC when absent
    pub client_id: Option<String>,
    /// Access token: MQTT username and topic prefix
    pub access_token: String,
    pub broker_host: String,
    pub broker_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    /// Empty for an open network
    pub password: String,
}

/// What the supervisor does after a mid-session failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Tear down, wait, and connect again in-process.
    Restart { delay_ms: u32 },
    /// Tear down and exit so an external supervisor restarts the process.
    Terminate,
}

impl FaultPolicy {
    pub fn restart_delay(self) -> Option<Duration> {
        match self {
            Self::Restart { delay_ms } => Some(Duration::from_millis(delay_ms.into())),
            Self::Terminate => None,
        }
    }
}

/// Where the telemetry scheduler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum SchedulingModel {
    /// Ticks from the run loop's idle hook on the supervisor thread.
    Cooperative,
    /// Ticks on its own thread.
    Threaded { core: Core, priority: u8, stack_kb: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchConfig {
    pub name: String,
    pub gpio: u8,
    /// Attribute key for state publishes
    #[serde(default = "default_attribute")]
    pub attribute: String,
    /// Register RPC methods as `{name}.{method}`
    #[serde(default)]
    pub namespaced: bool,
}

fn default_attribute() -> String {
    "status".to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            access_token: "devbridge-sim".to_owned(),
            broker_host: "localhost".to_owned(),
            broker_port: 1883,
        }
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: "devbridge".to_owned(),
            password: String::new(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            wifi: WifiConfig::default(),

            telemetry_interval_ms: 2_000,
            measurement_encoding: MeasurementEncoding::LineProtocol,

            keep_alive_secs: 60,
            association_timeout_ms: 15_000,
            network_poll_ms: 100,
            loop_poll_ms: 20,

            reconnect: BackoffPolicy::default(), // fixed 10 s
            max_connect_attempts: None,
            on_fault: FaultPolicy::Restart { delay_ms: 10_000 },
            scheduling: SchedulingModel::Cooperative,
            watchdog_timeout_ms: 30_000,

            switches: vec![SwitchConfig {
                name: "pin17".to_owned(),
                gpio: 17,
                attribute: default_attribute(),
                namespaced: false,
            }],
            sensors: vec![SensorConfig {
                name: "dht".to_owned(),
            }],
        }
    }
}

impl BridgeConfig {
    /// Range-check every field. The first violation is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use ConfigError::ValidationFailed as Invalid;

        let token = &self.identity.access_token;
        if token.is_empty() || token.len() > 64 {
            return Err(Invalid("access_token must be 1-64 bytes"));
        }
        if token.contains(['/', '+', '#']) {
            return Err(Invalid("access_token must not contain '/', '+' or '#'"));
        }
        if self.identity.broker_host.is_empty() {
            return Err(Invalid("broker_host must not be empty"));
        }
        if self.identity.broker_port == 0 {
            return Err(Invalid("broker_port must be non-zero"));
        }
        if let Some(id) = &self.identity.client_id {
            if id.is_empty() || id.len() > 64 {
                return Err(Invalid("client_id must be 1-64 bytes"));
            }
        }

        if self.wifi.ssid.is_empty() || self.wifi.ssid.len() > 32 {
            return Err(Invalid("wifi.ssid must be 1-32 bytes"));
        }
        let pw = self.wifi.password.len();
        if pw != 0 && !(8..=64).contains(&pw) {
            return Err(Invalid("wifi.password must be empty or 8-64 bytes"));
        }

        if !(100..=3_600_000).contains(&self.telemetry_interval_ms) {
            return Err(Invalid("telemetry_interval_ms must be 100-3600000"));
        }
        if !(5..=3_600).contains(&self.keep_alive_secs) {
            return Err(Invalid("keep_alive_secs must be 5-3600"));
        }
        if !(1_000..=120_000).contains(&self.association_timeout_ms) {
            return Err(Invalid("association_timeout_ms must be 1000-120000"));
        }
        if self.network_poll_ms > 5_000 {
            return Err(Invalid("network_poll_ms must be 0-5000"));
        }
        if !(1..=1_000).contains(&self.loop_poll_ms) {
            return Err(Invalid("loop_poll_ms must be 1-1000"));
        }

        let r = &self.reconnect;
        if r.first.is_zero() || r.max < r.first {
            return Err(Invalid("reconnect requires 0 < first_ms <= max_ms"));
        }
        if !r.factor.is_finite() || r.factor < 1.0 {
            return Err(Invalid("reconnect.factor must be >= 1.0"));
        }
        if self.max_connect_attempts == Some(0) {
            return Err(Invalid("max_connect_attempts must be at least 1"));
        }
        if let FaultPolicy::Restart { delay_ms } = self.on_fault {
            if delay_ms > 3_600_000 {
                return Err(Invalid("on_fault.delay_ms must be at most 3600000"));
            }
        }
        if let SchedulingModel::Threaded { stack_kb, .. } = self.scheduling {
            if !(4..=64).contains(&stack_kb) {
                return Err(Invalid("scheduling.stack_kb must be 4-64"));
            }
        }

        // Association and the broker handshake run without feeding the watchdog.
        if self.watchdog_timeout_ms != 0
            && self.watchdog_timeout_ms <= self.association_timeout_ms + BROKER_CONNECT_TIMEOUT_MS
        {
            return Err(Invalid(
                "watchdog_timeout_ms must exceed association_timeout_ms + 10000",
            ));
        }

        let mut names: Vec<&str> = Vec::new();
        let mut plain_switches = 0;
        for sw in &self.switches {
            if sw.name.is_empty() || sw.name.contains(['.', '/']) {
                return Err(Invalid("switch name must be non-empty without '.' or '/'"));
            }
            if sw.gpio > 48 {
                return Err(Invalid("switch gpio must be 0-48"));
            }
            if sw.attribute.is_empty() {
                return Err(Invalid("switch attribute must not be empty"));
            }
            if !sw.namespaced {
                plain_switches += 1;
            }
            names.push(&sw.name);
        }
        if plain_switches > 1 {
            return Err(Invalid("at most one switch may register un-namespaced methods"));
        }
        let mut pins: Vec<u8> = self.switches.iter().map(|sw| sw.gpio).collect();
        pins.sort_unstable();
        if pins.windows(2).any(|w| w[0] == w[1]) {
            return Err(Invalid("each switch needs its own gpio"));
        }
        for s in &self.sensors {
            if s.name.is_empty() || s.name.contains([',', ' ']) {
                return Err(Invalid("sensor name must be non-empty without ',' or ' '"));
            }
            names.push(&s.name);
        }
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        if names.len() != total {
            return Err(Invalid("resource names must be unique"));
        }

        Ok(())
    }

    /// Build the broker identity, falling back to `default_client_id`.
    pub fn identity(&self, default_client_id: &str) -> Identity {
        let id = &self.identity;
        Identity::new(
            id.client_id.as_deref().unwrap_or(default_client_id),
            id.access_token.as_str(),
            id.broker_host.as_str(),
            id.broker_port,
        )
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            association_timeout: Duration::from_millis(self.association_timeout_ms.into()),
            network_poll: Duration::from_millis(self.network_poll_ms.into()),
            keep_alive: Duration::from_secs(self.keep_alive_secs.into()),
            loop_poll: Duration::from_millis(self.loop_poll_ms.into()),
        }
    }

    pub fn telemetry_period(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let cfg = BridgeConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.telemetry_interval_ms, 2_000);
        assert_eq!(cfg.reconnect.next(0), Duration::from_secs(10));
        assert_eq!(cfg.switches[0].name, "pin17");
        assert_eq!(cfg.switches[0].gpio, 17);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: BridgeConfig = serde_json::from_str(
            r#"{"identity":{"access_token":"ABC","broker_host":"192.168.55.1"},
                "telemetry_interval_ms":5000}"#,
        )
        .unwrap();
        assert_eq!(cfg.identity.access_token, "ABC");
        assert_eq!(cfg.identity.broker_port, 1883);
        assert_eq!(cfg.telemetry_interval_ms, 5000);
        assert_eq!(cfg.keep_alive_secs, 60);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = BridgeConfig {
            on_fault: FaultPolicy::Terminate,
            scheduling: SchedulingModel::Threaded {
                core: Core::App,
                priority: 5,
                stack_kb: 8,
            },
            ..BridgeConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn token_with_topic_wildcards_rejected() {
        let mut cfg = BridgeConfig::default();
        cfg.identity.access_token = "a/b".into();
        assert!(cfg.validate().is_err());
        cfg.identity.access_token = "a+b".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn shared_gpio_rejected() {
        let mut cfg = BridgeConfig::default();
        cfg.switches.push(SwitchConfig {
            name: "relay".into(),
            gpio: 17,
            attribute: "relay".into(),
            namespaced: true,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn two_plain_switches_collide() {
        let mut cfg = BridgeConfig::default();
        cfg.switches.push(SwitchConfig {
            name: "relay".into(),
            gpio: 18,
            attribute: default_attribute(),
            namespaced: false,
        });
        assert!(cfg.validate().is_err());
        cfg.switches[1].namespaced = true;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn duplicate_resource_names_rejected() {
        let mut cfg = BridgeConfig::default();
        cfg.sensors.push(SensorConfig {
            name: "pin17".into(),
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn watchdog_must_outlast_connect() {
        let mut cfg = BridgeConfig::default();
        cfg.watchdog_timeout_ms = 20_000;
        assert!(cfg.validate().is_err());
        cfg.watchdog_timeout_ms = 0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn shrinking_backoff_rejected() {
        let mut cfg = BridgeConfig::default();
        cfg.reconnect.factor = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_client_id_wins() {
        let mut cfg = BridgeConfig::default();
        assert_eq!(cfg.identity("deadbeefcafe").client_id(), "deadbeefcafe");
        cfg.identity.client_id = Some("bench-1".into());
        assert_eq!(cfg.identity("deadbeefcafe").client_id(), "bench-1");
    }

    #[test]
    fn fault_policy_json_shape() {
        let p: FaultPolicy = serde_json::from_str(r#"{"policy":"restart","delay_ms":500}"#).unwrap();
        assert_eq!(p.restart_delay(), Some(Duration::from_millis(500)));
        let t: FaultPolicy = serde_json::from_str(r#"{"policy":"terminate"}"#).unwrap();
        assert_eq!(t.restart_delay(), None);
    }
}
