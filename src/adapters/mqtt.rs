//! ESP-IDF MQTT client transport.
//!
//! Implements [`BrokerTransport`] on top of `esp_idf_svc::mqtt::client`.
//! The client runs its own FreeRTOS task; its event callback only flips
//! atomics and pushes received messages into the session's inbound queue,
//! so it never blocks on the session lock.
//!
//! The client's built-in reconnect is not relied on: a `Disconnected`
//! event marks the transport dead, the session loop reports it, and the
//! supervisor builds a fresh client on the next `connect`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
};
use log::{debug, info, warn};

use crate::app::identity::Identity;
use crate::app::ports::{BrokerError, BrokerTransport};
use crate::config::BROKER_CONNECT_TIMEOUT_MS;
use crate::session::inbound::{self, InboundQueue};

const CONNECT_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct ClientState {
    connected: AtomicBool,
    /// An error event arrived before the session came up.
    errored: AtomicBool,
}

#[derive(Default)]
pub struct EspMqttTransport {
    client: Option<EspMqttClient<'static>>,
    state: Arc<ClientState>,
}

impl EspMqttTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

fn on_event(state: &ClientState, queue: &InboundQueue, payload: EventPayload<'_, esp_idf_svc::sys::EspError>) {
    match payload {
        EventPayload::Connected(_) => {
            state.connected.store(true, Ordering::Release);
        }
        EventPayload::Disconnected => {
            state.connected.store(false, Ordering::Release);
        }
        EventPayload::Received {
            topic: Some(topic),
            data,
            details: Details::Complete,
            ..
        } => {
            inbound::offer(queue, topic, data);
        }
        // Larger than the client buffer: answered as too large from the
        // first chunk, the rest are skipped.
        EventPayload::Received {
            topic: Some(topic),
            details: Details::InitialChunk(chunk),
            ..
        } => {
            debug!("MQTT: fragmented message, {} bytes total", chunk.total_data_size);
            inbound::offer_too_large(queue, topic);
        }
        EventPayload::Received {
            details: Details::SubsequentChunk(_),
            ..
        } => {}
        EventPayload::Received { details, .. } => {
            warn!("MQTT: dropping topic-less message ({:?})", details);
        }
        EventPayload::Error(e) => {
            state.errored.store(true, Ordering::Release);
            debug!("MQTT: client error {:?}", e);
        }
        _ => {}
    }
}

impl BrokerTransport for EspMqttTransport {
    fn connect(
        &mut self,
        identity: &Identity,
        keep_alive: Duration,
        inbound: Arc<InboundQueue>,
    ) -> Result<(), BrokerError> {
        self.disconnect();

        let state = Arc::new(ClientState::default());
        let cb_state = Arc::clone(&state);
        let conf = MqttClientConfiguration {
            client_id: Some(identity.client_id()),
            username: Some(identity.access_token()),
            password: Some(""),
            keep_alive_interval: Some(keep_alive),
            ..Default::default()
        };

        let url = identity.broker_url();
        let client = EspMqttClient::new_cb(&url, &conf, move |event| {
            on_event(&cb_state, &inbound, event.payload());
        })
        .map_err(|e| {
            warn!("MQTT: client init for {} failed: {:?}", url, e);
            BrokerError::Unreachable
        })?;

        let deadline = Instant::now() + Duration::from_millis(BROKER_CONNECT_TIMEOUT_MS.into());
        while !state.connected.load(Ordering::Acquire) {
            if Instant::now() >= deadline {
                // ESP-IDF reports a refused CONNACK only as a generic error
                // event, so a rejection and an unreachable host look alike.
                if state.errored.load(Ordering::Acquire) {
                    warn!("MQTT: broker refused or dropped the handshake");
                } else {
                    warn!("MQTT: no CONNACK within {} ms", BROKER_CONNECT_TIMEOUT_MS);
                }
                return Err(BrokerError::Unreachable);
            }
            std::thread::sleep(CONNECT_POLL);
        }

        info!("MQTT: connected to {}", url);
        self.client = Some(client);
        self.state = state;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let client = self.client.as_mut().ok_or(BrokerError::NotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: publish failed: {:?}", e);
                BrokerError::Io
            })
    }

    fn subscribe(&mut self, filter: &str) -> Result<(), BrokerError> {
        let client = self.client.as_mut().ok_or(BrokerError::NotConnected)?;
        client
            .subscribe(filter, QoS::AtMostOnce)
            .map(|_| ())
            .map_err(|e| {
                warn!("MQTT: subscribe failed: {:?}", e);
                BrokerError::Io
            })
    }

    fn is_alive(&self) -> bool {
        self.client.is_some() && self.state.connected.load(Ordering::Acquire)
    }

    fn disconnect(&mut self) {
        // Dropping the client stops its task and closes the socket.
        if self.client.take().is_some() {
            info!("MQTT: client closed");
        }
        self.state.connected.store(false, Ordering::Release);
    }
}
