//! Supervisor: the composition root and the only place that decides
//! between retry, restart and termination.
//!
//! ```text
//!            ┌──────────── backoff (connection-phase error) ───────┐
//!            ▼                                                     │
//!   ┌─▶ connect() ──ok──▶ announce ──▶ run_loop() ──Err(fatal)──┐  │
//!   │        │                              │                   │  │
//!   │        └──────────────────────────────┼───────────────────┼──┘
//!   │                                Ok (shutdown)              ▼
//!   │                                       │              teardown
//!   │                                       ▼                   │
//!   └──── Restart { delay } ◀───────── SupervisorExit     fault policy
//!                                       ▲                       │
//!                                       └──── Terminate ◀───────┘
//! ```
//!
//! Teardown order: stop the telemetry thread, release every switch, close
//! the session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info, warn};

use crate::adapters::telemetry_sink::BrokerEventSink;
use crate::app::events::AppEvent;
use crate::app::ports::{BrokerTransport, Clock, EventSink, NetworkLink, PublishOutcome, Publisher};
use crate::config::{BridgeConfig, FaultPolicy, SchedulingModel};
use crate::drivers::task_pin::{self, Core};
use crate::drivers::watchdog::Watchdog;
use crate::error::{BridgeError, Result};
use crate::measurement::MeasurementEncoding;
use crate::resources::{SharedReadable, SharedWritable};
use crate::rpc::{DispatchStats, RpcDispatcher};
use crate::scheduler::{TelemetryScheduler, TelemetryStats};
use crate::session::backoff::BackoffPolicy;
use crate::session::inbound::InboundMessage;
use crate::session::{SessionManager, ShutdownSignal};
use crate::topics::{Topics, redact};

/// Longest single sleep while waiting out a backoff or restart delay.
const WAIT_SLICE: Duration = Duration::from_millis(500);

/// Recovery knobs, split out of [`BridgeConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupervisorPolicy {
    pub backoff: BackoffPolicy,
    pub max_connect_attempts: Option<u32>,
    pub fault: FaultPolicy,
    pub scheduling: SchedulingModel,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self::from(&BridgeConfig::default())
    }
}

impl From<&BridgeConfig> for SupervisorPolicy {
    fn from(cfg: &BridgeConfig) -> Self {
        Self {
            backoff: cfg.reconnect,
            max_connect_attempts: cfg.max_connect_attempts,
            fault: cfg.on_fault,
            scheduling: cfg.scheduling,
        }
    }
}

/// Why [`Supervisor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// Shutdown was requested; everything has been torn down.
    Shutdown,
    /// The fault policy is `Terminate`; the process should exit so an
    /// external supervisor can restart it.
    Terminated(BridgeError),
}

struct TelemetryThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

fn lock_scheduler(s: &Mutex<TelemetryScheduler>) -> MutexGuard<'_, TelemetryScheduler> {
    s.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Supervisor<L, T> {
    session: Arc<SessionManager<L, T>>,
    dispatcher: RpcDispatcher,
    scheduler: Arc<Mutex<TelemetryScheduler>>,
    telemetry: Option<TelemetryThread>,
    switches: Vec<SharedWritable>,
    topics: Topics,
    clock: Arc<dyn Clock>,
    policy: SupervisorPolicy,
    watchdog: Watchdog,
    shutdown: ShutdownSignal,
}

impl<L, T> Supervisor<L, T>
where
    L: NetworkLink + 'static,
    T: BrokerTransport + 'static,
{
    pub fn new(
        session: SessionManager<L, T>,
        clock: Arc<dyn Clock>,
        policy: SupervisorPolicy,
        telemetry_period: Duration,
        encoding: MeasurementEncoding,
        watchdog: Watchdog,
    ) -> Self {
        let topics = Topics::new(session.identity().access_token());
        let shutdown = session.shutdown_signal().clone();
        let scheduler = TelemetryScheduler::new(telemetry_period, topics.measurement(), encoding);
        Self {
            session: Arc::new(session),
            dispatcher: RpcDispatcher::new(),
            scheduler: Arc::new(Mutex::new(scheduler)),
            telemetry: None,
            switches: Vec::new(),
            topics,
            clock,
            policy,
            watchdog,
            shutdown,
        }
    }

    /// Register a switch for RPC control, teardown release and the
    /// post-connect announce.
    pub fn add_switch(&mut self, switch: SharedWritable, namespaced: bool) {
        if namespaced {
            self.dispatcher.register_switch_namespaced(Arc::clone(&switch));
        } else {
            self.dispatcher.register_switch(Arc::clone(&switch));
        }
        self.switches.push(switch);
    }

    pub fn add_sensor(&mut self, sensor: SharedReadable) {
        lock_scheduler(&self.scheduler).add_sensor(sensor);
    }

    /// For registering methods beyond the switch set.
    pub fn dispatcher_mut(&mut self) -> &mut RpcDispatcher {
        &mut self.dispatcher
    }

    pub fn session(&self) -> &Arc<SessionManager<L, T>> {
        &self.session
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Blocks while the telemetry thread is running.
    pub fn telemetry_stats(&self) -> TelemetryStats {
        lock_scheduler(&self.scheduler).stats()
    }

    // ───────────────────────────────────────────────────────────
    // Supervision loop
    // ───────────────────────────────────────────────────────────

    /// Run until shutdown or until the fault policy says terminate.
    pub fn run(&mut self) -> SupervisorExit {
        info!(
            "Supervisor: starting ({} switch(es), {} sensor(s), {:?})",
            self.switches.len(),
            lock_scheduler(&self.scheduler).sensor_count(),
            self.policy.scheduling
        );
        // Recorded now, issued by every connect.
        if let Err(e) = self.session.subscribe(self.topics.rpc_request_filter()) {
            warn!("Supervisor: recording RPC subscription failed: {}", e);
        }

        let mut failures: u32 = 0;
        loop {
            if self.shutdown.is_requested() {
                self.teardown();
                return SupervisorExit::Shutdown;
            }

            let err = match self.run_session(&mut failures) {
                Ok(()) => {
                    self.teardown();
                    return SupervisorExit::Shutdown;
                }
                Err(e) => e,
            };

            if err.is_connection_phase() {
                failures = failures.saturating_add(1);
                let capped = self
                    .policy
                    .max_connect_attempts
                    .is_some_and(|max| failures >= max);
                if !capped {
                    let delay = self.policy.backoff.next(failures - 1);
                    warn!(
                        "Supervisor: {} (attempt {}), retrying in {} ms",
                        err,
                        failures,
                        delay.as_millis()
                    );
                    if !self.wait(delay) {
                        self.teardown();
                        return SupervisorExit::Shutdown;
                    }
                    continue;
                }
                error!("Supervisor: giving up after {} failed connect(s)", failures);
            } else {
                error!("Supervisor: {}", err);
            }

            failures = 0;
            self.teardown();
            match self.policy.fault.restart_delay() {
                Some(delay) => {
                    info!("Supervisor: restarting in {} ms", delay.as_millis());
                    if !self.wait(delay) {
                        return SupervisorExit::Shutdown;
                    }
                }
                None => {
                    error!("Supervisor: terminating");
                    return SupervisorExit::Terminated(err);
                }
            }
        }
    }

    /// One session from connect to the end of the run loop.
    fn run_session(&mut self, failures: &mut u32) -> Result<()> {
        self.session.connect()?;
        *failures = 0;
        self.announce();
        lock_scheduler(&self.scheduler).reset();

        match self.policy.scheduling {
            SchedulingModel::Cooperative => self.run_cooperative(),
            SchedulingModel::Threaded {
                core,
                priority,
                stack_kb,
            } => self.run_threaded(core, priority, stack_kb),
        }
    }

    fn run_cooperative(&mut self) -> Result<()> {
        let session = Arc::clone(&self.session);
        let scheduler = Arc::clone(&self.scheduler);
        let attributes = self.topics.attributes();
        let dispatcher = &mut self.dispatcher;
        let clock = &self.clock;
        let watchdog = &self.watchdog;

        session.run_loop(
            |msg| handle_inbound(dispatcher, &*session, attributes, &msg),
            || {
                lock_scheduler(&scheduler).poll(clock.now_ms(), &*session);
                watchdog.feed();
            },
        )
    }

    fn run_threaded(&mut self, core: Core, priority: u8, stack_kb: u16) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            let session = Arc::clone(&self.session);
            let scheduler = Arc::clone(&self.scheduler);
            let clock = Arc::clone(&self.clock);
            task_pin::spawn_on_core(core, priority, stack_kb.into(), "telemetry\0", move || {
                lock_scheduler(&scheduler).run_until(&*session, &*clock, &stop);
            })
        }
        .map_err(|e| {
            error!("Supervisor: telemetry thread spawn failed: {}", e);
            BridgeError::TransportFatal
        })?;
        self.telemetry = Some(TelemetryThread { stop, handle });

        let session = Arc::clone(&self.session);
        let attributes = self.topics.attributes();
        let dispatcher = &mut self.dispatcher;
        let watchdog = &self.watchdog;
        session.run_loop(
            |msg| handle_inbound(dispatcher, &*session, attributes, &msg),
            || watchdog.feed(),
        )
    }

    /// Publish every switch's current status as an attribute.
    fn announce(&self) {
        let mut sink = BrokerEventSink::new(&*self.session, self.topics.attributes());
        for switch in &self.switches {
            let event = {
                let s = switch.lock().unwrap_or_else(PoisonError::into_inner);
                AppEvent::StateChanged {
                    resource: s.name().to_owned(),
                    attribute: s.attribute().to_owned(),
                    status: s.current(),
                }
            };
            sink.emit(&event);
        }
    }

    fn teardown(&mut self) {
        if let Some(t) = self.telemetry.take() {
            t.stop.store(true, Ordering::Release);
            if t.handle.join().is_err() {
                error!("Supervisor: telemetry thread panicked");
            }
        }

        for switch in &self.switches {
            switch
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .release();
        }

        self.session.disconnect();

        let session = self.session.stats();
        let telemetry = lock_scheduler(&self.scheduler).stats();
        let rpc = self.dispatcher.stats();
        info!(
            "Supervisor: teardown complete (sessions={} published={} dropped={} failed={} \
             ticks={} sensor_faults={} rpc={} rpc_errors={})",
            session.sessions,
            session.published,
            session.dropped,
            session.failed,
            telemetry.ticks,
            telemetry.sensor_faults,
            rpc.handled,
            rpc.errors
        );
    }

    /// Sleep for `delay` in slices, feeding the watchdog. Returns `false`
    /// if shutdown was requested meanwhile.
    fn wait(&self, delay: Duration) -> bool {
        let deadline = self
            .clock
            .now_ms()
            .saturating_add(delay.as_millis() as u64);
        loop {
            self.watchdog.feed();
            if self.shutdown.is_requested() {
                return false;
            }
            let now = self.clock.now_ms();
            if now >= deadline {
                return true;
            }
            let left = Duration::from_millis(deadline - now);
            self.clock.sleep(left.min(WAIT_SLICE));
        }
    }
}

/// Dispatch one inbound message and publish its reply before returning.
fn handle_inbound<P: Publisher + ?Sized>(
    dispatcher: &mut RpcDispatcher,
    publisher: &P,
    attributes_topic: &str,
    msg: &InboundMessage,
) {
    let mut sink = BrokerEventSink::new(publisher, attributes_topic);
    let Some(reply) = dispatcher.dispatch_inbound(msg, &mut sink) else {
        return;
    };
    let outcome = publisher.publish(&reply.topic, &reply.payload);
    if outcome != PublishOutcome::Sent {
        warn!(
            "Supervisor: reply on '{}' not delivered ({:?})",
            redact(&reply.topic),
            outcome
        );
    }
}
