//! Session manager: network link plus broker session.
//!
//! ```text
//!                 connect() ok
//!   Disconnected ──▶ Connecting ──▶ Connected
//!        ▲               │              │
//!        └───────────────┴──────────────┘
//!         connect error / transport, keep-alive or link failure
//! ```
//!
//! All transport access serialises through one internal mutex, so the
//! manager is `Sync` and can be shared between the run loop and a
//! dedicated telemetry thread. Inbound messages never take that lock:
//! the transport pushes them into an [`InboundQueue`] that the run loop
//! drains.

pub mod backoff;
pub mod inbound;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::identity::Identity;
use crate::app::ports::{BrokerError, BrokerTransport, Clock, NetworkLink, PublishOutcome, Publisher};
use crate::error::{BridgeError, Result};
use crate::topics::redact;

use self::inbound::{InboundMessage, InboundQueue};

/// Smallest wait used while polling the link, so a zero poll interval
/// still lets a simulated clock reach the association deadline.
const MIN_LINK_POLL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reserved; no transition enters it.
    Degraded,
}

/// Timing knobs for one session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// How long to wait for the link to come up after `associate`.
    pub association_timeout: Duration,
    /// Delay between link polls while associating.
    pub network_poll: Duration,
    /// MQTT keep-alive handed to the transport.
    pub keep_alive: Duration,
    /// Run-loop sleep when no inbound message was waiting.
    pub loop_poll: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            association_timeout: Duration::from_secs(15),
            network_poll: Duration::from_millis(100),
            keep_alive: Duration::from_secs(60),
            loop_poll: Duration::from_millis(20),
        }
    }
}

/// Publish and session counters. Reset only by process restart.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub published: u32,
    /// Publishes attempted while not connected.
    pub dropped: u32,
    /// Publishes the transport rejected.
    pub failed: u32,
    /// Successful `connect()` calls.
    pub sessions: u32,
}

/// Cooperative stop flag shared by the supervisor, the run loop and the
/// telemetry thread.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct SessionCore<L, T> {
    link: L,
    transport: T,
    state: SessionState,
    subscriptions: Vec<String>,
    stats: SessionStats,
}

pub struct SessionManager<L, T> {
    identity: Identity,
    policy: SessionPolicy,
    core: Mutex<SessionCore<L, T>>,
    inbound: Arc<InboundQueue>,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownSignal,
}

impl<L: NetworkLink, T: BrokerTransport> SessionManager<L, T> {
    pub fn new(
        identity: Identity,
        link: L,
        transport: T,
        policy: SessionPolicy,
        clock: Arc<dyn Clock>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            identity,
            policy,
            core: Mutex::new(SessionCore {
                link,
                transport,
                state: SessionState::Disconnected,
                subscriptions: Vec::new(),
                stats: SessionStats::default(),
            }),
            inbound: Arc::new(InboundQueue::new()),
            clock,
            shutdown,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionCore<L, T>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn stats(&self) -> SessionStats {
        self.lock().stats
    }

    pub fn rssi(&self) -> Option<i8> {
        self.lock().link.rssi()
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Associate the link, then open the broker session.
    ///
    /// Calling this while connected tears the current session down first.
    /// On success every recorded subscription has been re-issued and any
    /// message left over from an earlier session has been discarded.
    pub fn connect(&self) -> Result<()> {
        let mut core = self.lock();
        if core.state == SessionState::Connected {
            info!("Session: reconnect requested, closing current session");
            core.transport.disconnect();
            core.link.disconnect();
        }
        core.state = SessionState::Connecting;

        if let Err(e) = self.associate(&mut core) {
            core.state = SessionState::Disconnected;
            return Err(e);
        }

        let stale = self.drain_inbound();
        if stale > 0 {
            debug!("Session: discarded {} stale inbound message(s)", stale);
        }

        info!(
            "Session: connecting to {} as '{}'",
            self.identity.broker_url(),
            self.identity.client_id()
        );
        let opened = core.transport.connect(
            &self.identity,
            self.policy.keep_alive,
            Arc::clone(&self.inbound),
        );
        if let Err(e) = opened {
            warn!("Session: broker handshake failed: {}", e);
            core.link.disconnect();
            core.state = SessionState::Disconnected;
            return Err(match e {
                BrokerError::AuthRejected => BridgeError::AuthRejected,
                _ => BridgeError::BrokerUnreachable,
            });
        }

        let SessionCore {
            transport,
            link,
            subscriptions,
            state,
            ..
        } = &mut *core;
        for filter in subscriptions.iter() {
            if let Err(e) = transport.subscribe(filter) {
                warn!("Session: re-subscribe to '{}' failed: {}", redact(filter), e);
                transport.disconnect();
                link.disconnect();
                *state = SessionState::Disconnected;
                return Err(BridgeError::BrokerUnreachable);
            }
            debug!("Session: subscribed to '{}'", redact(filter));
        }

        core.state = SessionState::Connected;
        core.stats.sessions += 1;
        info!("Session: connected (session #{})", core.stats.sessions);
        Ok(())
    }

    fn associate(&self, core: &mut SessionCore<L, T>) -> Result<()> {
        info!("Session: associating network link");
        core.link.associate().map_err(|e| {
            warn!("Session: link association failed: {}", e);
            BridgeError::from(e)
        })?;

        let deadline = self
            .clock
            .now_ms()
            .saturating_add(self.policy.association_timeout.as_millis() as u64);
        let poll = self.policy.network_poll.max(MIN_LINK_POLL);
        while !core.link.is_connected() {
            if self.clock.now_ms() >= deadline {
                warn!(
                    "Session: link not up after {} ms",
                    self.policy.association_timeout.as_millis()
                );
                core.link.disconnect();
                return Err(BridgeError::NetworkUnavailable);
            }
            self.clock.sleep(poll);
        }
        match core.link.rssi() {
            Some(rssi) => info!("Session: link up (RSSI {} dBm)", rssi),
            None => info!("Session: link up"),
        }
        Ok(())
    }

    fn drain_inbound(&self) -> usize {
        let mut n = 0;
        while self.inbound.try_receive().is_ok() {
            n += 1;
        }
        n
    }

    /// Record `filter` and issue it now if connected. Recorded filters
    /// are re-issued after every reconnect.
    pub fn subscribe(&self, filter: &str) -> Result<()> {
        let mut core = self.lock();
        if !core.subscriptions.iter().any(|f| f == filter) {
            core.subscriptions.push(filter.to_owned());
        }
        if core.state != SessionState::Connected {
            return Ok(());
        }
        match core.transport.subscribe(filter) {
            Ok(()) => {
                info!("Session: subscribed to '{}'", redact(filter));
                Ok(())
            }
            Err(e) => {
                warn!("Session: subscribe to '{}' failed: {}", redact(filter), e);
                core.state = SessionState::Disconnected;
                Err(BridgeError::TransportFatal)
            }
        }
    }

    /// Deliver inbound messages until the session fails or shutdown is
    /// requested.
    ///
    /// One message is delivered per iteration, in arrival order, and the
    /// liveness check runs before each one. `idle` runs on every
    /// iteration. The session lock is never held while either callback
    /// runs, so both may publish.
    pub fn run_loop(
        &self,
        mut deliver: impl FnMut(InboundMessage),
        mut idle: impl FnMut(),
    ) -> Result<()> {
        loop {
            if self.shutdown.is_requested() {
                info!("Session: shutdown requested, leaving run loop");
                return Ok(());
            }
            self.check_alive()?;

            let delivered = match self.inbound.try_receive() {
                Ok(msg) => {
                    deliver(msg);
                    true
                }
                Err(_) => false,
            };

            idle();

            if !delivered {
                self.clock.sleep(self.policy.loop_poll);
            }
        }
    }

    fn check_alive(&self) -> Result<()> {
        let mut core = self.lock();
        if core.state != SessionState::Connected {
            return Err(BridgeError::TransportFatal);
        }
        if !core.transport.is_alive() {
            warn!("Session: broker connection lost");
            core.state = SessionState::Disconnected;
            return Err(BridgeError::TransportFatal);
        }
        if !core.link.is_connected() {
            warn!("Session: network link lost");
            core.state = SessionState::Disconnected;
            return Err(BridgeError::TransportFatal);
        }
        Ok(())
    }

    /// Close the broker session and the link.
    pub fn disconnect(&self) {
        let mut core = self.lock();
        core.transport.disconnect();
        core.link.disconnect();
        core.state = SessionState::Disconnected;
        info!("Session: disconnected");
    }
}

impl<L: NetworkLink, T: BrokerTransport> Publisher for SessionManager<L, T> {
    /// Fire-and-forget. Nothing is queued for later.
    fn publish(&self, topic: &str, payload: &[u8]) -> PublishOutcome {
        let mut core = self.lock();
        if core.state != SessionState::Connected {
            core.stats.dropped += 1;
            debug!("Session: not connected, dropped publish to '{}'", redact(topic));
            return PublishOutcome::Dropped;
        }
        match core.transport.publish(topic, payload) {
            Ok(()) => {
                core.stats.published += 1;
                PublishOutcome::Sent
            }
            Err(e) => {
                core.stats.failed += 1;
                core.state = SessionState::Disconnected;
                warn!("Session: publish to '{}' failed: {}", redact(topic), e);
                PublishOutcome::Failed
            }
        }
    }
}
