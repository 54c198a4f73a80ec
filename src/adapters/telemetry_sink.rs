//! Event sink that turns state changes into attribute publishes.
//!
//! `StateChanged { attribute: "status", status: true }` becomes
//! `{"status": true}` on `api/v1/{token}/me/attributes`. The publish is
//! fire-and-forget; a dropped or failed attribute update is only logged.

use log::{debug, warn};
use serde_json::{Map, Value};

use crate::app::events::{AppEvent, Status};
use crate::app::ports::{EventSink, PublishOutcome, Publisher};

pub struct BrokerEventSink<'a, P: Publisher + ?Sized> {
    publisher: &'a P,
    topic: &'a str,
}

impl<'a, P: Publisher + ?Sized> BrokerEventSink<'a, P> {
    pub fn new(publisher: &'a P, topic: &'a str) -> Self {
        Self { publisher, topic }
    }
}

/// `{"<attribute>": <status>}`
pub fn attributes_payload(attribute: &str, status: &Status) -> Vec<u8> {
    let mut map = Map::new();
    map.insert(
        attribute.to_owned(),
        serde_json::to_value(status).unwrap_or(Value::Null),
    );
    Value::Object(map).to_string().into_bytes()
}

impl<P: Publisher + ?Sized> EventSink for BrokerEventSink<'_, P> {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::StateChanged {
                resource,
                attribute,
                status,
            } => {
                let payload = attributes_payload(attribute, status);
                match self.publisher.publish(self.topic, &payload) {
                    PublishOutcome::Sent => {
                        debug!("Attributes: {}.{} = {}", resource, attribute, status)
                    }
                    outcome => warn!(
                        "Attributes: update for '{}' not delivered ({:?})",
                        resource, outcome
                    ),
                }
            }
        }
    }
}
