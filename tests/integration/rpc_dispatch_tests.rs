//! Resource adapter and dispatcher behaviour against simulated pins.

use serde_json::{Value, json};

use devbridge::app::events::{AppEvent, Status};
use devbridge::rpc::{RpcDispatcher, RpcErrorKind};

use crate::mock_hw::{RecordingSink, pin17};

fn call(d: &mut RpcDispatcher, sink: &mut RecordingSink, id: u32, body: &str) -> Value {
    let reply = d
        .dispatch(&format!("TOKEN/me/rpc/request/{id}"), body.as_bytes(), sink)
        .expect("request topics are always answered");
    assert_eq!(reply.topic, format!("TOKEN/me/rpc/response/{id}"));
    serde_json::from_slice(&reply.payload).unwrap()
}

#[test]
fn set_status_is_idempotent_with_one_event_per_call() {
    let (switch, pin) = pin17();
    let mut sink = RecordingSink::default();
    {
        let mut sw = switch.lock().unwrap();
        assert_eq!(sw.set_status(Status::Bool(true), &mut sink), Ok(Status::Bool(true)));
        assert_eq!(sw.set_status(Status::Bool(true), &mut sink), Ok(Status::Bool(true)));
    }
    // Construction drives low once; only the first `true` reaches the pin.
    assert_eq!(pin.writes(), 2);
    assert!(pin.is_high());
    assert_eq!(sink.events.len(), 2);
    assert!(sink.events.iter().all(|e| matches!(
        e,
        AppEvent::StateChanged { status: Status::Bool(true), .. }
    )));
}

#[test]
fn toggle_twice_restores_state() {
    let (switch, pin) = pin17();
    let mut sink = RecordingSink::default();
    let mut sw = switch.lock().unwrap();
    let before = sw.current();
    sw.toggle(&mut sink).unwrap();
    assert_ne!(sw.current(), before);
    sw.toggle(&mut sink).unwrap();
    assert_eq!(sw.current(), before);
    assert!(!pin.is_high());
    assert_eq!(sink.events.len(), 2);
}

#[test]
fn set_status_param_shapes() {
    let (switch, pin) = pin17();
    let mut d = RpcDispatcher::new();
    d.register_switch(switch);
    let mut sink = RecordingSink::default();

    let v = call(&mut d, &mut sink, 1, r#"{"method":"set_status","params":true}"#);
    assert_eq!(v["result"], json!(true));
    let v = call(&mut d, &mut sink, 2, r#"{"method":"set_status","params":[false]}"#);
    assert_eq!(v["result"], json!(false));
    let v = call(&mut d, &mut sink, 3, r#"{"method":"set_status","params":{"status":1}}"#);
    assert_eq!(v["result"], json!(true));
    assert!(pin.is_high());
    assert_eq!(sink.events.len(), 3);
}

#[test]
fn payload_id_wins_over_topic_id() {
    let (switch, _) = pin17();
    let mut d = RpcDispatcher::new();
    d.register_switch(switch);
    let mut sink = RecordingSink::default();

    let v = call(&mut d, &mut sink, 5, r#"{"method":"get_status","id":"abc"}"#);
    assert_eq!(v["id"], json!("abc"));
    let v = call(&mut d, &mut sink, 6, r#"{"method":"get_status"}"#);
    assert_eq!(v["id"], json!(6));
}

#[test]
fn namespaced_switches_are_independent() {
    let (a, pin_a) = pin17();
    let (b, pin_b) = {
        use devbridge::resources::gpio::{GpioSwitch, SimOutputPin};
        use std::sync::{Arc, Mutex};
        let pin = SimOutputPin::new();
        let sw = GpioSwitch::new("relay", pin.clone()).unwrap();
        let shared: devbridge::resources::SharedWritable = Arc::new(Mutex::new(sw));
        (shared, pin)
    };
    let mut d = RpcDispatcher::new();
    d.register_switch_namespaced(a);
    d.register_switch_namespaced(b);
    let mut sink = RecordingSink::default();

    call(&mut d, &mut sink, 1, r#"{"method":"relay.toggle"}"#);
    assert!(pin_b.is_high());
    assert!(!pin_a.is_high());

    let v = call(&mut d, &mut sink, 2, r#"{"method":"toggle"}"#);
    assert_eq!(v["error"]["code"], json!(-32601));
}

#[test]
fn every_request_gets_exactly_one_response() {
    let (switch, pin) = pin17();
    let mut d = RpcDispatcher::new();
    d.register_switch(switch);
    let mut sink = RecordingSink::default();

    pin.fail_writes(true);
    let bodies = [
        "",
        "[]",
        r#"{"method":42}"#,
        r#"{"method":"toggle"}"#,
        r#"{"method":"set_status","params":"yes"}"#,
        r#"{"method":"nope"}"#,
    ];
    for (i, body) in bodies.iter().enumerate() {
        let v = call(&mut d, &mut sink, i as u32, body);
        assert!(
            v.get("result").is_some() ^ v.get("error").is_some(),
            "exactly one of result/error for {body:?}"
        );
    }
    assert_eq!(d.stats().handled, bodies.len() as u32);
    assert_eq!(d.stats().errors, bodies.len() as u32);
    assert!(sink.events.is_empty(), "no state change on failed calls");
}

#[test]
fn custom_method_sees_params() {
    let mut d = RpcDispatcher::new();
    d.register("echo", |params, _sink| {
        if params.value().is_null() {
            Err(RpcErrorKind::InvalidParams("echo needs params".into()))
        } else {
            Ok(params.value().clone())
        }
    });
    let mut sink = RecordingSink::default();

    let v = call(&mut d, &mut sink, 1, r#"{"method":"echo","params":{"a":1}}"#);
    assert_eq!(v["result"], json!({"a":1}));
    let v = call(&mut d, &mut sink, 2, r#"{"method":"echo"}"#);
    assert_eq!(v["error"]["code"], json!(-32602));
}
