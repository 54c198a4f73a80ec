//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter          | Implements       | Connects to                  |
//! |------------------|------------------|------------------------------|
//! | `config_store`   | ConfigPort       | JSON file / build-time JSON  |
//! | `device_id`      | (none)           | eFuse base MAC               |
//! | `mqtt`           | BrokerTransport  | ESP-IDF MQTT client          |
//! | `sim_broker`     | BrokerTransport  | In-process broker (host)     |
//! | `telemetry_sink` | EventSink        | Broker attributes topic      |
//! | `time`           | Clock            | ESP32 system timer / Instant |
//! | `wifi`           | NetworkLink      | ESP-IDF WiFi STA             |

pub mod config_store;
pub mod device_id;
#[cfg(target_os = "espidf")]
pub mod mqtt;
pub mod sim_broker;
pub mod telemetry_sink;
pub mod time;
pub mod wifi;
