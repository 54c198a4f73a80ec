//! devbridge entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  WifiAdapter      EspMqttTransport / SimBroker   ConfigStore │
//! │  (NetworkLink)    (BrokerTransport)              (ConfigPort)│
//! │  GpioSwitch       ClimateSensor                  Clock       │
//! │  (Writable)       (Readable)                                 │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │  ┌──────────────────────────────────────────────────────┐    │
//! │  │  Supervisor                                          │    │
//! │  │  SessionManager · RpcDispatcher · TelemetryScheduler │    │
//! │  └──────────────────────────────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use embedded_hal::digital::StatefulOutputPin;
use log::{error, info};

use devbridge::adapters::device_id;
use devbridge::adapters::time::MonotonicClock;
use devbridge::adapters::wifi::WifiAdapter;
use devbridge::app::ports::{Clock, ConfigPort};
use devbridge::config::{BridgeConfig, SwitchConfig};
use devbridge::drivers::watchdog::Watchdog;
use devbridge::error::BridgeError;
use devbridge::resources::gpio::GpioSwitch;
use devbridge::resources::SharedWritable;
use devbridge::session::{SessionManager, ShutdownSignal};
use devbridge::supervisor::{Supervisor, SupervisorExit, SupervisorPolicy};

#[cfg(target_os = "espidf")]
type Transport = devbridge::adapters::mqtt::EspMqttTransport;
#[cfg(not(target_os = "espidf"))]
type Transport = devbridge::adapters::sim_broker::SimBroker;

type Bridge = Supervisor<WifiAdapter, Transport>;

fn main() -> Result<()> {
    // ── 1. Platform bootstrap ─────────────────────────────────
    #[cfg(target_os = "espidf")]
    {
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;
    }
    #[cfg(not(target_os = "espidf"))]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("devbridge v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration and identity ─────────────────────────
    let config = load_config().context("loading configuration")?;
    let mac = device_id::read_mac();
    let identity = config.identity(&device_id::client_id(&mac));
    info!("Identity: {:?}", identity);

    // ── 3. Link, transport, session ───────────────────────────
    let link = build_link(&config).context("bringing up the network adapter")?;
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let session = SessionManager::new(
        identity,
        link,
        Transport::new(),
        config.session_policy(),
        Arc::clone(&clock),
        ShutdownSignal::new(),
    );

    // ── 4. Supervisor and resources ───────────────────────────
    let watchdog = Watchdog::new(Duration::from_millis(config.watchdog_timeout_ms.into()));
    let mut bridge: Bridge = Supervisor::new(
        session,
        clock,
        SupervisorPolicy::from(&config),
        config.telemetry_period(),
        config.measurement_encoding,
        watchdog,
    );
    attach_resources(&mut bridge, &config)?;

    // ── 5. Run ────────────────────────────────────────────────
    match bridge.run() {
        SupervisorExit::Shutdown => {
            info!("devbridge: stopped");
            Ok(())
        }
        SupervisorExit::Terminated(e) => terminate(e),
    }
}

fn load_config() -> Result<BridgeConfig> {
    #[cfg(target_os = "espidf")]
    let store = devbridge::adapters::config_store::EmbeddedConfigStore::new();
    #[cfg(not(target_os = "espidf"))]
    let store = devbridge::adapters::config_store::FileConfigStore::from_env();
    Ok(store.load()?)
}

#[cfg(target_os = "espidf")]
fn build_link(config: &BridgeConfig) -> Result<WifiAdapter> {
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::peripherals::Peripherals;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{BlockingWifi, EspWifi};

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;
    let wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sysloop.clone(), Some(nvs))?,
        sysloop,
    )?;
    let mut adapter = WifiAdapter::new(wifi);
    adapter.set_credentials(&config.wifi.ssid, &config.wifi.password)?;
    Ok(adapter)
}

#[cfg(not(target_os = "espidf"))]
fn build_link(config: &BridgeConfig) -> Result<WifiAdapter> {
    let mut adapter = WifiAdapter::new();
    adapter.set_credentials(&config.wifi.ssid, &config.wifi.password)?;
    Ok(adapter)
}

fn switch_resource<P>(sw: &SwitchConfig, pin: P) -> Result<SharedWritable>
where
    P: StatefulOutputPin + Send + 'static,
{
    let switch = GpioSwitch::new(sw.name.as_str(), pin)
        .with_context(|| format!("driving '{}' low", sw.name))?
        .with_attribute(sw.attribute.as_str());
    Ok(Arc::new(Mutex::new(switch)))
}

fn attach_resources(bridge: &mut Bridge, config: &BridgeConfig) -> Result<()> {
    for sw in &config.switches {
        #[cfg(target_os = "espidf")]
        let pin = {
            use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};
            // SAFETY: `validate()` rejects two switches on one GPIO, so
            // each pin is claimed once.
            PinDriver::output(unsafe { AnyOutputPin::new(i32::from(sw.gpio)) })
                .with_context(|| format!("claiming GPIO{}", sw.gpio))?
        };
        #[cfg(not(target_os = "espidf"))]
        let pin = devbridge::resources::gpio::SimOutputPin::new();

        bridge.add_switch(switch_resource(sw, pin)?, sw.namespaced);
        info!("Resource: switch '{}' on GPIO{}", sw.name, sw.gpio);
    }

    for sensor in &config.sensors {
        #[cfg(target_os = "espidf")]
        {
            log::warn!("Resource: no probe driver for '{}' on this target, skipped", sensor.name);
        }
        #[cfg(not(target_os = "espidf"))]
        {
            use devbridge::resources::climate::{ClimateSensor, SimClimateProbe};
            let shared: devbridge::resources::SharedReadable = Arc::new(Mutex::new(ClimateSensor::new(
                sensor.name.as_str(),
                SimClimateProbe::new(22.0, 45.0),
            )));
            bridge.add_sensor(shared);
            info!("Resource: sensor '{}' (simulated probe)", sensor.name);
        }
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
fn terminate(e: BridgeError) -> Result<()> {
    error!("devbridge: {}, restarting chip", e);
    // SAFETY: esp_restart never returns.
    unsafe { esp_idf_svc::sys::esp_restart() }
}

#[cfg(not(target_os = "espidf"))]
fn terminate(e: BridgeError) -> Result<()> {
    error!("devbridge: {}, exiting for the service manager", e);
    Err(anyhow::Error::new(e).context("supervisor terminated"))
}
