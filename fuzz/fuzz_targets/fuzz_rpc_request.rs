//! Fuzz target: `RpcDispatcher::dispatch`
//!
//! Feeds arbitrary payloads on a request topic through a dispatcher with
//! one simulated switch bound, and asserts every payload is answered on
//! the response topic with valid JSON carrying exactly one of `result`
//! or `error`.
//!
//! cargo fuzz run fuzz_rpc_request

#![no_main]

use std::sync::{Arc, Mutex};

use devbridge::app::events::AppEvent;
use devbridge::app::ports::EventSink;
use devbridge::resources::gpio::{GpioSwitch, SimOutputPin};
use devbridge::rpc::RpcDispatcher;
use libfuzzer_sys::fuzz_target;

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Ok(sw) = GpioSwitch::new("pin17", SimOutputPin::new()) else {
        return;
    };
    let mut dispatcher = RpcDispatcher::new();
    dispatcher.register_switch(Arc::new(Mutex::new(sw)));

    let reply = dispatcher
        .dispatch("TOK/me/rpc/request/1", data, &mut Discard)
        .expect("request topics are always answered");
    assert_eq!(reply.topic, "TOK/me/rpc/response/1");

    let v: serde_json::Value =
        serde_json::from_slice(&reply.payload).expect("reply must be valid JSON");
    assert!(v.get("result").is_some() ^ v.get("error").is_some());
});
