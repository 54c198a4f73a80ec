//! End-to-end flows through session, dispatcher and scheduler, driven
//! step by step on the test thread.

use std::cell::Cell;
use std::time::Duration;

use serde_json::{Value, json};

use devbridge::adapters::telemetry_sink::BrokerEventSink;
use devbridge::app::ports::{PublishOutcome, Publisher};
use devbridge::measurement::MeasurementEncoding;
use devbridge::rpc::RpcDispatcher;
use devbridge::scheduler::TelemetryScheduler;
use devbridge::session::SessionState;
use devbridge::session::inbound::{INBOUND_DEPTH, MAX_PAYLOAD_LEN};

use crate::mock_hw::{
    ATTRIBUTES_TOPIC, MEASUREMENT_TOPIC, SessionRig, dht, pin17, session_rig, text,
};

const REQUEST_FILTER: &str = "TOKEN/me/rpc/request/+";

/// Run the session loop until `n` inbound messages have been dispatched
/// and answered.
fn serve(rig: &SessionRig, dispatcher: &mut RpcDispatcher, n: usize) {
    let delivered = Cell::new(0);
    let session = &rig.session;
    session
        .run_loop(
            |msg| {
                let mut sink = BrokerEventSink::new(session, ATTRIBUTES_TOPIC);
                if let Some(reply) = dispatcher.dispatch_inbound(&msg, &mut sink) {
                    assert_eq!(session.publish(&reply.topic, &reply.payload), PublishOutcome::Sent);
                }
                delivered.set(delivered.get() + 1);
            },
            || {
                if delivered.get() >= n {
                    session.shutdown_signal().request();
                }
            },
        )
        .unwrap();
}

fn connected_rig(dispatcher: &mut RpcDispatcher) -> (SessionRig, devbridge::resources::gpio::SimOutputPin) {
    let rig = session_rig();
    let (switch, pin) = pin17();
    dispatcher.register_switch(switch);
    rig.session.subscribe(REQUEST_FILTER).unwrap();
    rig.session.connect().unwrap();
    (rig, pin)
}

fn response(rig: &SessionRig, id: &str) -> Value {
    let topic = format!("TOKEN/me/rpc/response/{id}");
    let payloads = rig.broker.published_to(&topic);
    assert_eq!(payloads.len(), 1, "exactly one response on {topic}");
    serde_json::from_slice(&payloads[0]).unwrap()
}

#[test]
fn pin17_toggle_scenario() {
    let mut dispatcher = RpcDispatcher::new();
    let (rig, pin) = connected_rig(&mut dispatcher);
    assert!(!pin.is_high(), "switch starts low");

    assert!(
        rig.broker
            .inject("TOKEN/me/rpc/request/1", br#"{"method":"toggle","params":null}"#)
    );
    serve(&rig, &mut dispatcher, 1);

    assert!(pin.is_high());
    assert_eq!(response(&rig, "1")["result"], json!(true));
    assert_eq!(
        text(rig.broker.published_to(ATTRIBUTES_TOPIC)),
        [r#"{"status":true}"#]
    );
}

#[test]
fn malformed_request_answered_and_next_still_served() {
    let mut dispatcher = RpcDispatcher::new();
    let (rig, _pin) = connected_rig(&mut dispatcher);

    rig.broker.inject("TOKEN/me/rpc/request/7", b"{not json");
    rig.broker
        .inject("TOKEN/me/rpc/request/8", br#"{"method":"get_status"}"#);
    serve(&rig, &mut dispatcher, 2);

    let bad = response(&rig, "7");
    assert_eq!(bad["error"]["code"], json!(-32700));
    assert_eq!(bad["id"], json!(7));
    assert_eq!(response(&rig, "8")["result"], json!(false));
}

#[test]
fn unknown_method_has_no_side_effects() {
    let mut dispatcher = RpcDispatcher::new();
    let (rig, pin) = connected_rig(&mut dispatcher);
    let writes = pin.writes();

    rig.broker
        .inject("TOKEN/me/rpc/request/3", br#"{"method":"reboot","id":3}"#);
    serve(&rig, &mut dispatcher, 1);

    assert_eq!(response(&rig, "3")["error"]["code"], json!(-32601));
    assert_eq!(pin.writes(), writes);
    assert!(rig.broker.published_to(ATTRIBUTES_TOPIC).is_empty());
}

#[test]
fn requests_served_in_arrival_order() {
    let mut dispatcher = RpcDispatcher::new();
    let (rig, pin) = connected_rig(&mut dispatcher);

    for id in 1..=3 {
        rig.broker.inject(
            &format!("TOKEN/me/rpc/request/{id}"),
            br#"{"method":"toggle"}"#,
        );
    }
    serve(&rig, &mut dispatcher, 3);

    let topics: Vec<String> = rig
        .broker
        .published()
        .into_iter()
        .map(|(t, _)| t)
        .filter(|t| t.contains("/rpc/response/"))
        .collect();
    assert_eq!(
        topics,
        [
            "TOKEN/me/rpc/response/1",
            "TOKEN/me/rpc/response/2",
            "TOKEN/me/rpc/response/3"
        ]
    );
    // Three toggles from low.
    assert!(pin.is_high());
}

#[test]
fn oversized_request_answered_with_parse_error() {
    let mut dispatcher = RpcDispatcher::new();
    let (rig, pin) = connected_rig(&mut dispatcher);
    let writes = pin.writes();

    let pad = "x".repeat(MAX_PAYLOAD_LEN + 76);
    let body = format!(r#"{{"method":"toggle","id":1,"pad":"{pad}"}}"#);
    assert!(rig.broker.inject("TOKEN/me/rpc/request/1", body.as_bytes()));
    rig.broker
        .inject("TOKEN/me/rpc/request/2", br#"{"method":"get_status"}"#);
    serve(&rig, &mut dispatcher, 2);

    let big = response(&rig, "1");
    assert_eq!(big["error"]["code"], json!(-32700));
    assert_eq!(big["id"], json!(1));
    assert_eq!(pin.writes(), writes);
    assert_eq!(response(&rig, "2")["result"], json!(false));
}

#[test]
fn burst_beyond_queue_depth_is_answered_in_full() {
    let mut dispatcher = RpcDispatcher::new();
    let (rig, _pin) = connected_rig(&mut dispatcher);
    let burst = INBOUND_DEPTH + 4;

    for id in 1..=burst {
        assert!(rig.broker.inject(
            &format!("TOKEN/me/rpc/request/{id}"),
            br#"{"method":"get_status"}"#,
        ));
    }
    serve(&rig, &mut dispatcher, burst);

    for id in 1..=INBOUND_DEPTH {
        assert_eq!(response(&rig, &id.to_string())["result"], json!(false));
    }
    for id in INBOUND_DEPTH + 1..=burst {
        let busy = response(&rig, &id.to_string());
        assert_eq!(busy["error"]["code"], json!(-32000));
        assert_eq!(busy["id"], json!(id));
    }
}

#[test]
fn climate_tick_publishes_two_measurements() {
    let rig = session_rig();
    rig.session.connect().unwrap();
    let (sensor, _probe) = dht();
    let mut sched = TelemetryScheduler::new(
        Duration::from_millis(2000),
        MEASUREMENT_TOPIC,
        MeasurementEncoding::LineProtocol,
    );
    sched.add_sensor(sensor);

    assert_eq!(sched.tick(2000, &rig.session), 2);
    assert_eq!(
        text(rig.broker.published_to(MEASUREMENT_TOPIC)),
        ["dht,measure=temp value=22", "dht,measure=humi value=40"]
    );
}

#[test]
fn sensor_fault_skips_only_that_tick() {
    let rig = session_rig();
    rig.session.connect().unwrap();
    let (sensor, probe) = dht();
    let mut sched = TelemetryScheduler::new(
        Duration::from_millis(2000),
        MEASUREMENT_TOPIC,
        MeasurementEncoding::LineProtocol,
    );
    sched.add_sensor(sensor);

    probe.fail_next(1);
    assert_eq!(sched.tick(2000, &rig.session), 0);
    assert_eq!(sched.stats().sensor_faults, 1);
    assert_eq!(sched.tick(4000, &rig.session), 2);
}

#[test]
fn telemetry_while_disconnected_is_dropped_not_queued() {
    let rig = session_rig();
    let (sensor, _probe) = dht();
    let mut sched = TelemetryScheduler::new(
        Duration::from_millis(2000),
        MEASUREMENT_TOPIC,
        MeasurementEncoding::LineProtocol,
    );
    sched.add_sensor(sensor);

    assert_eq!(sched.tick(2000, &rig.session), 0);
    assert_eq!(rig.session.stats().dropped, 2);
    assert_eq!(rig.broker.connect_attempts(), 0);

    rig.session.connect().unwrap();
    assert!(rig.broker.published().is_empty(), "nothing replayed after connect");
}

#[test]
fn reconnect_restores_rpc_subscription() {
    let mut dispatcher = RpcDispatcher::new();
    let (rig, pin) = connected_rig(&mut dispatcher);

    rig.broker.drop_session();
    assert!(!rig.broker.inject("TOKEN/me/rpc/request/1", br#"{"method":"toggle"}"#));
    assert!(rig.session.run_loop(|_| {}, || {}).is_err());
    assert_eq!(rig.session.state(), SessionState::Disconnected);

    rig.session.connect().unwrap();
    assert!(rig.broker.inject("TOKEN/me/rpc/request/2", br#"{"method":"toggle"}"#));
    serve(&rig, &mut dispatcher, 1);
    assert!(pin.is_high());
    assert_eq!(rig.session.stats().sessions, 2);
}

#[test]
fn link_poll_respects_association_timeout() {
    let rig = session_rig();
    rig.link.fail_association_for(1);
    assert!(rig.session.connect().is_err());
    assert!(rig.clock.total_slept() >= Duration::from_secs(15));
    // Next association succeeds.
    rig.session.connect().unwrap();
}
