//! Simulated device rig for integration tests.
//!
//! Wires a session manager to the in-process broker, a simulated Wi-Fi
//! link and a manual clock, and exposes the test-side handles so tests
//! can inject inbound messages and provoke failures without real
//! hardware.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use devbridge::adapters::sim_broker::{SimBroker, SimBrokerHandle};
use devbridge::adapters::time::ManualClock;
use devbridge::adapters::wifi::{SimLinkHandle, WifiAdapter};
use devbridge::app::events::AppEvent;
use devbridge::app::identity::Identity;
use devbridge::app::ports::{EventSink, PublishOutcome, Publisher};
use devbridge::drivers::watchdog::Watchdog;
use devbridge::measurement::MeasurementEncoding;
use devbridge::resources::climate::{ClimateSensor, SimClimateHandle, SimClimateProbe};
use devbridge::resources::gpio::{GpioSwitch, SimOutputPin};
use devbridge::resources::{SharedReadable, SharedWritable};
use devbridge::session::{SessionManager, SessionPolicy, ShutdownSignal};
use devbridge::supervisor::{Supervisor, SupervisorPolicy};

pub const TOKEN: &str = "TOKEN";
pub const MEASUREMENT_TOPIC: &str = "api/v1/TOKEN/me/measurement";
pub const ATTRIBUTES_TOPIC: &str = "api/v1/TOKEN/me/attributes";

pub type SimSession = SessionManager<WifiAdapter, SimBroker>;
pub type SimSupervisor = Supervisor<WifiAdapter, SimBroker>;

// ── Recording sink ────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Recording publisher ───────────────────────────────────────

/// Publisher that records everything and answers with a fixed outcome.
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<(String, Vec<u8>)>>,
    outcome: PublishOutcome,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::with_outcome(PublishOutcome::Sent)
    }

    pub fn with_outcome(outcome: PublishOutcome) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            outcome,
        }
    }

    pub fn payloads_to(&self, topic: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> PublishOutcome {
        self.sent
            .lock()
            .unwrap()
            .push((topic.to_owned(), payload.to_vec()));
        self.outcome
    }
}

// ── Resources ─────────────────────────────────────────────────

pub fn pin17() -> (SharedWritable, SimOutputPin) {
    let pin = SimOutputPin::new();
    let sw = GpioSwitch::new("pin17", pin.clone()).unwrap();
    (Arc::new(Mutex::new(sw)), pin)
}

pub fn dht() -> (SharedReadable, SimClimateHandle) {
    let probe = SimClimateProbe::new(22.0, 40.0);
    let handle = probe.handle();
    (Arc::new(Mutex::new(ClimateSensor::new("dht", probe))), handle)
}

// ── Session rig ───────────────────────────────────────────────

pub struct SessionRig {
    pub session: SimSession,
    pub broker: SimBrokerHandle,
    pub link: SimLinkHandle,
    pub clock: Arc<ManualClock>,
}

pub fn session_rig() -> SessionRig {
    let clock = Arc::new(ManualClock::new());
    let broker = SimBroker::new();
    let broker_handle = broker.handle();
    let mut wifi = WifiAdapter::new();
    wifi.set_credentials("lab", "password123").unwrap();
    let link = wifi.sim_handle();
    let session = SessionManager::new(
        Identity::new("deadbeefcafe", TOKEN, "localhost", 1883),
        wifi,
        broker,
        SessionPolicy::default(),
        clock.clone(),
        ShutdownSignal::new(),
    );
    SessionRig {
        session,
        broker: broker_handle,
        link,
        clock,
    }
}

// ── Supervisor rig ────────────────────────────────────────────

pub struct BridgeRig {
    pub supervisor: SimSupervisor,
    pub broker: SimBrokerHandle,
    pub link: SimLinkHandle,
    pub clock: Arc<ManualClock>,
    pub pin: SimOutputPin,
    pub probe: SimClimateHandle,
}

/// The two-resource device: `pin17` switch plus `dht` climate sensor.
pub fn bridge_rig(policy: SupervisorPolicy) -> BridgeRig {
    let SessionRig {
        session,
        broker,
        link,
        clock,
    } = session_rig();
    let mut supervisor = Supervisor::new(
        session,
        clock.clone(),
        policy,
        Duration::from_millis(2000),
        MeasurementEncoding::LineProtocol,
        Watchdog::disabled(),
    );
    let (switch, pin) = pin17();
    let (sensor, probe) = dht();
    supervisor.add_switch(switch, false);
    supervisor.add_sensor(sensor);
    BridgeRig {
        supervisor,
        broker,
        link,
        clock,
        pin,
        probe,
    }
}

/// Poll `cond` in real time; the supervisor under test runs on its own
/// thread against a manual clock, so progress is fast but asynchronous.
pub fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "timed out waiting for {what}"
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

pub fn text(payloads: Vec<Vec<u8>>) -> Vec<String> {
    payloads
        .into_iter()
        .map(|p| String::from_utf8_lossy(&p).into_owned())
        .collect()
}
