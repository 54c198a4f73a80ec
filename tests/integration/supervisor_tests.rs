//! Supervisor runs on a background thread against the simulated rig.

use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::{Value, json};

use devbridge::config::{FaultPolicy, SchedulingModel};
use devbridge::drivers::task_pin::Core;
use devbridge::error::BridgeError;
use devbridge::session::backoff::BackoffPolicy;
use devbridge::supervisor::{SupervisorExit, SupervisorPolicy};

use crate::mock_hw::{
    ATTRIBUTES_TOPIC, BridgeRig, MEASUREMENT_TOPIC, SimSupervisor, bridge_rig, text, wait_for,
};

fn spawn(mut sup: SimSupervisor) -> JoinHandle<(SupervisorExit, SimSupervisor)> {
    std::thread::spawn(move || {
        let exit = sup.run();
        (exit, sup)
    })
}

#[test]
fn backoff_on_broker_unreachable_then_connects() {
    let BridgeRig {
        supervisor,
        broker,
        clock,
        ..
    } = bridge_rig(SupervisorPolicy::default());
    broker.unreachable_for(2);
    let stop = supervisor.shutdown_signal();
    let runner = spawn(supervisor);

    wait_for("connect", || broker.is_connected());
    assert_eq!(broker.connect_attempts(), 3);
    // Two fixed 10 s waits, never a busy loop.
    assert!(clock.total_slept() >= Duration::from_secs(20));
    assert_eq!(broker.last_username().as_deref(), Some("TOKEN"));

    stop.request();
    let (exit, _) = runner.join().unwrap();
    assert_eq!(exit, SupervisorExit::Shutdown);
}

#[test]
fn exponential_backoff_grows_until_cap() {
    let policy = SupervisorPolicy {
        backoff: BackoffPolicy {
            first: Duration::from_secs(1),
            max: Duration::from_secs(4),
            factor: 2.0,
        },
        max_connect_attempts: Some(5),
        fault: FaultPolicy::Terminate,
        ..SupervisorPolicy::default()
    };
    let BridgeRig {
        mut supervisor,
        broker,
        clock,
        ..
    } = bridge_rig(policy);
    broker.unreachable_for(u32::MAX);

    let exit = supervisor.run();
    assert_eq!(exit, SupervisorExit::Terminated(BridgeError::BrokerUnreachable));
    // 1 + 2 + 4 + 4 seconds between five attempts.
    assert_eq!(clock.total_slept(), Duration::from_secs(11));
}

#[test]
fn full_bridge_announces_serves_and_samples() {
    let BridgeRig {
        supervisor,
        broker,
        pin,
        ..
    } = bridge_rig(SupervisorPolicy::default());
    let stop = supervisor.shutdown_signal();
    let runner = spawn(supervisor);

    wait_for("announce", || !broker.published_to(ATTRIBUTES_TOPIC).is_empty());
    assert_eq!(
        text(broker.published_to(ATTRIBUTES_TOPIC)),
        [r#"{"status":false}"#]
    );

    broker.inject("TOKEN/me/rpc/request/11", br#"{"method":"set_status","params":true}"#);
    wait_for("reply", || {
        !broker.published_to("TOKEN/me/rpc/response/11").is_empty()
    });
    let reply: Value =
        serde_json::from_slice(&broker.published_to("TOKEN/me/rpc/response/11")[0]).unwrap();
    assert_eq!(reply["result"], json!(true));
    assert!(pin.is_high());

    wait_for("telemetry", || broker.published_to(MEASUREMENT_TOPIC).len() >= 2);
    let samples = text(broker.published_to(MEASUREMENT_TOPIC));
    assert_eq!(samples[0], "dht,measure=temp value=22");
    assert_eq!(samples[1], "dht,measure=humi value=40");

    stop.request();
    let (exit, sup) = runner.join().unwrap();
    assert_eq!(exit, SupervisorExit::Shutdown);
    assert!(!pin.is_high(), "teardown releases the switch");
    assert!(sup.telemetry_stats().published >= 2);
}

#[test]
fn keep_alive_loss_terminates_under_terminate_policy() {
    let policy = SupervisorPolicy {
        fault: FaultPolicy::Terminate,
        ..SupervisorPolicy::default()
    };
    let BridgeRig {
        supervisor,
        broker,
        pin,
        ..
    } = bridge_rig(policy);
    let runner = spawn(supervisor);

    wait_for("connect", || broker.is_connected());
    broker.inject("TOKEN/me/rpc/request/1", br#"{"method":"toggle"}"#);
    wait_for("toggle", || pin.is_high());
    broker.drop_session();

    let (exit, sup) = runner.join().unwrap();
    assert_eq!(exit, SupervisorExit::Terminated(BridgeError::TransportFatal));
    assert!(!pin.is_high());
    assert_eq!(sup.session().stats().sessions, 1);
}

#[test]
fn restart_policy_reconnects_after_link_loss() {
    let policy = SupervisorPolicy {
        fault: FaultPolicy::Restart { delay_ms: 5000 },
        ..SupervisorPolicy::default()
    };
    let BridgeRig {
        supervisor,
        broker,
        link,
        ..
    } = bridge_rig(policy);
    let stop = supervisor.shutdown_signal();
    let session = std::sync::Arc::clone(supervisor.session());
    let runner = spawn(supervisor);

    wait_for("first session", || session.stats().sessions == 1);
    link.drop_link();
    wait_for("second session", || session.stats().sessions == 2);
    wait_for("re-announce", || broker.published_to(ATTRIBUTES_TOPIC).len() >= 2);
    assert!(
        broker
            .subscriptions()
            .contains(&"TOKEN/me/rpc/request/+".to_owned())
    );

    stop.request();
    let (exit, _) = runner.join().unwrap();
    assert_eq!(exit, SupervisorExit::Shutdown);
}

#[test]
fn threaded_scheduling_samples_off_the_loop_thread() {
    let policy = SupervisorPolicy {
        scheduling: SchedulingModel::Threaded {
            core: Core::App,
            priority: 5,
            stack_kb: 16,
        },
        ..SupervisorPolicy::default()
    };
    let BridgeRig {
        supervisor,
        broker,
        probe,
        ..
    } = bridge_rig(policy);
    let stop = supervisor.shutdown_signal();
    let runner = spawn(supervisor);

    wait_for("telemetry", || broker.published_to(MEASUREMENT_TOPIC).len() >= 4);
    assert!(probe.reads() >= 2);

    stop.request();
    let (exit, sup) = runner.join().unwrap();
    assert_eq!(exit, SupervisorExit::Shutdown);
    assert!(sup.telemetry_stats().ticks >= 2);
}

#[test]
fn shutdown_during_backoff_exits_promptly() {
    let BridgeRig {
        supervisor,
        broker,
        ..
    } = bridge_rig(SupervisorPolicy::default());
    broker.unreachable_for(u32::MAX);
    let stop = supervisor.shutdown_signal();
    let runner = spawn(supervisor);

    wait_for("first attempt", || broker.connect_attempts() >= 1);
    stop.request();
    let (exit, _) = runner.join().unwrap();
    assert_eq!(exit, SupervisorExit::Shutdown);
}
