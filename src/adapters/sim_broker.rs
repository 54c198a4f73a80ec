//! In-memory broker transport for host builds and tests.
//!
//! [`SimBroker`] is handed to the session manager; the cloneable
//! [`SimBrokerHandle`] stays with the test (or the host binary) to inject
//! inbound messages, inspect publishes and provoke failures.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info};

use crate::app::identity::Identity;
use crate::app::ports::{BrokerError, BrokerTransport};
use crate::session::inbound::{self, InboundQueue};
use crate::topics::topic_matches;

#[derive(Default)]
struct SimState {
    connected: bool,
    inbound: Option<Arc<InboundQueue>>,
    subscriptions: Vec<String>,
    published: Vec<(String, Vec<u8>)>,
    connect_attempts: u32,
    last_username: Option<String>,
    refuse_auth: bool,
    unreachable_remaining: u32,
    fail_next_publish: bool,
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Broker transport backed by shared in-memory state.
#[derive(Default)]
pub struct SimBroker {
    state: Arc<Mutex<SimState>>,
}

impl SimBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SimBrokerHandle {
        SimBrokerHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl BrokerTransport for SimBroker {
    fn connect(
        &mut self,
        identity: &Identity,
        _keep_alive: Duration,
        inbound: Arc<InboundQueue>,
    ) -> Result<(), BrokerError> {
        let mut s = lock(&self.state);
        s.connect_attempts += 1;
        if s.unreachable_remaining > 0 {
            s.unreachable_remaining -= 1;
            debug!("SimBroker: refusing TCP connect ({} left)", s.unreachable_remaining);
            return Err(BrokerError::Unreachable);
        }
        if s.refuse_auth {
            debug!("SimBroker: CONNACK not authorized");
            return Err(BrokerError::AuthRejected);
        }
        s.connected = true;
        s.inbound = Some(inbound);
        // Clean session: the client must subscribe again.
        s.subscriptions.clear();
        s.last_username = Some(identity.access_token().to_owned());
        info!("SimBroker: client '{}' connected", identity.client_id());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut s = lock(&self.state);
        if !s.connected {
            return Err(BrokerError::NotConnected);
        }
        if s.fail_next_publish {
            s.fail_next_publish = false;
            s.connected = false;
            s.inbound = None;
            return Err(BrokerError::Io);
        }
        s.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }

    fn subscribe(&mut self, filter: &str) -> Result<(), BrokerError> {
        let mut s = lock(&self.state);
        if !s.connected {
            return Err(BrokerError::NotConnected);
        }
        if !s.subscriptions.iter().any(|f| f == filter) {
            s.subscriptions.push(filter.to_owned());
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        lock(&self.state).connected
    }

    fn disconnect(&mut self) {
        let mut s = lock(&self.state);
        s.connected = false;
        s.inbound = None;
    }
}

/// Test-side view of a [`SimBroker`].
#[derive(Clone)]
pub struct SimBrokerHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimBrokerHandle {
    /// Deliver a message as the broker would. Returns `false` when the
    /// client is offline, not subscribed to a matching filter, or its
    /// queue is full.
    pub fn inject(&self, topic: &str, payload: &[u8]) -> bool {
        let s = lock(&self.state);
        if !s.connected || !s.subscriptions.iter().any(|f| topic_matches(f, topic)) {
            return false;
        }
        match &s.inbound {
            Some(queue) => inbound::offer(queue, topic, payload),
            None => false,
        }
    }

    /// Every publish accepted so far, oldest first.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.state).published.clone()
    }

    /// Payloads published to exactly `topic`.
    pub fn published_to(&self, topic: &str) -> Vec<Vec<u8>> {
        lock(&self.state)
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn clear_published(&self) {
        lock(&self.state).published.clear();
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.state).subscriptions.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    pub fn connect_attempts(&self) -> u32 {
        lock(&self.state).connect_attempts
    }

    /// MQTT username presented on the last successful connect.
    pub fn last_username(&self) -> Option<String> {
        lock(&self.state).last_username.clone()
    }

    pub fn refuse_auth(&self, refuse: bool) {
        lock(&self.state).refuse_auth = refuse;
    }

    /// The next `n` connects fail as unreachable.
    pub fn unreachable_for(&self, n: u32) {
        lock(&self.state).unreachable_remaining = n;
    }

    /// Drop the session as a keep-alive timeout would.
    pub fn drop_session(&self) {
        let mut s = lock(&self.state);
        s.connected = false;
        s.inbound = None;
    }

    /// The next publish fails and takes the session down with it.
    pub fn fail_next_publish(&self) {
        lock(&self.state).fail_next_publish = true;
    }
}
