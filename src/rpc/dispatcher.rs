//! RPC dispatcher: method registry and synchronous dispatch.
//!
//! Every inbound request yields exactly one reply, success or error, on
//! the response topic derived from the request topic. Correlation is
//! purely by topic; no request table is kept.
//!
//! Handlers run on the session loop's thread, one at a time, and the
//! caller publishes the reply before taking the next inbound message.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde_json::Value;

use crate::app::events::Status;
use crate::app::ports::{EventSink, Writable};
use crate::error::ActuatorError;
use crate::resources::SharedWritable;
use crate::session::inbound::{InboundMessage, MAX_PAYLOAD_LEN, Rejection};
use crate::topics::{redact, response_topic};

use super::codec::{
    Params, RpcErrorKind, encode_error, encode_result, parse_request, topic_id,
};

/// A registered method. Handlers close over the resource they act on.
pub type Handler =
    Box<dyn FnMut(&Params, &mut dyn EventSink) -> Result<Value, RpcErrorKind> + Send>;

/// Reply ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcReply {
    pub topic: String,
    pub payload: Vec<u8>,
    pub outcome: Result<(), RpcErrorKind>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: u32,
    /// Requests answered with an error response.
    pub errors: u32,
    /// Messages with no derivable response topic (not answered).
    pub unroutable: u32,
}

#[derive(Default)]
pub struct RpcDispatcher {
    handlers: BTreeMap<String, Handler>,
    stats: DispatchStats,
}

fn status_value(status: Status) -> Value {
    match status {
        Status::Bool(b) => Value::Bool(b),
        Status::Number(n) => serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number),
    }
}

fn handler_error(e: ActuatorError) -> RpcErrorKind {
    RpcErrorKind::HandlerError(e.to_string())
}

impl RpcDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method`. Registering a name twice replaces the old handler.
    pub fn register<F>(&mut self, method: impl Into<String>, handler: F)
    where
        F: FnMut(&Params, &mut dyn EventSink) -> Result<Value, RpcErrorKind> + Send + 'static,
    {
        let method = method.into();
        if self.handlers.insert(method.clone(), Box::new(handler)).is_some() {
            warn!("RPC: handler for '{}' replaced", method);
        } else {
            debug!("RPC: registered '{}'", method);
        }
    }

    /// Bind `get_status`, `set_status` and `toggle` to `switch`.
    pub fn register_switch(&mut self, switch: SharedWritable) {
        self.bind_switch(None, switch);
    }

    /// Like [`register_switch`](Self::register_switch) but under
    /// `{resource}.{method}`, for devices with several switches.
    pub fn register_switch_namespaced(&mut self, switch: SharedWritable) {
        let name = match switch.lock() {
            Ok(s) => s.name().to_owned(),
            Err(poisoned) => poisoned.into_inner().name().to_owned(),
        };
        self.bind_switch(Some(&name), switch);
    }

    fn bind_switch(&mut self, prefix: Option<&str>, switch: SharedWritable) {
        let method = |m: &str| match prefix {
            Some(p) => format!("{p}.{m}"),
            None => m.to_owned(),
        };

        let sw = switch.clone();
        self.register(method("get_status"), move |_params, _sink| {
            let s = sw.lock().map_err(|_| handler_error(ActuatorError::Unavailable))?;
            Ok(status_value(s.current()))
        });

        let sw = switch.clone();
        self.register(method("set_status"), move |params, sink| {
            let status = params.status_arg()?;
            let mut s = sw.lock().map_err(|_| handler_error(ActuatorError::Unavailable))?;
            match s.set_status(status, sink) {
                Ok(applied) => Ok(status_value(applied)),
                Err(ActuatorError::UnsupportedStatus) => Err(RpcErrorKind::InvalidParams(
                    format!("status {status} not supported by '{}'", s.name()),
                )),
                Err(e) => Err(handler_error(e)),
            }
        });

        let sw = switch;
        self.register(method("toggle"), move |_params, sink| {
            let mut s = sw.lock().map_err(|_| handler_error(ActuatorError::Unavailable))?;
            s.toggle(sink).map(status_value).map_err(handler_error)
        });
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Handle one message from the inbound queue. A message that lost its
    /// payload is answered with an error and never reaches a handler.
    pub fn dispatch_inbound(
        &mut self,
        msg: &InboundMessage,
        sink: &mut dyn EventSink,
    ) -> Option<RpcReply> {
        match msg.rejected {
            None => self.dispatch(&msg.topic, &msg.payload, sink),
            Some(Rejection::TooLarge) => self.refuse(
                &msg.topic,
                RpcErrorKind::MalformedRequest(format!(
                    "payload too large (max {MAX_PAYLOAD_LEN} bytes)"
                )),
            ),
            Some(Rejection::Busy) => {
                self.refuse(&msg.topic, RpcErrorKind::HandlerError("busy".into()))
            }
        }
    }

    /// Handle one inbound message.
    ///
    /// Returns `None` only when no response topic can be derived from
    /// `topic`; every other outcome, including a malformed payload, is
    /// answered.
    pub fn dispatch(
        &mut self,
        topic: &str,
        payload: &[u8],
        sink: &mut dyn EventSink,
    ) -> Option<RpcReply> {
        let reply_topic = self.reply_topic(topic)?;

        let (id, result) = match parse_request(topic, payload) {
            Err((id, e)) => (id, Err(e)),
            Ok(req) => {
                let result = match self.handlers.get_mut(&req.method) {
                    Some(handler) => handler(&req.params, sink),
                    None => Err(RpcErrorKind::MethodNotFound(req.method.clone())),
                };
                debug!("RPC: '{}' (request {})", req.method, req.request_id);
                (req.id, result)
            }
        };
        Some(self.reply(reply_topic, id, result))
    }

    /// Answer `topic` with `err` without parsing its payload.
    pub fn refuse(&mut self, topic: &str, err: RpcErrorKind) -> Option<RpcReply> {
        let reply_topic = self.reply_topic(topic)?;
        Some(self.reply(reply_topic, topic_id(topic), Err(err)))
    }

    fn reply_topic(&mut self, topic: &str) -> Option<String> {
        let found = response_topic(topic);
        if found.is_none() {
            warn!("RPC: no response topic for '{}', ignoring", redact(topic));
            self.stats.unroutable += 1;
        }
        found
    }

    fn reply(&mut self, topic: String, id: Value, result: Result<Value, RpcErrorKind>) -> RpcReply {
        self.stats.handled += 1;
        let (payload, outcome) = match result {
            Ok(value) => (encode_result(&id, value), Ok(())),
            Err(e) => {
                self.stats.errors += 1;
                info!("RPC: request {} failed: {}", id, e);
                (encode_error(&id, &e), Err(e))
            }
        };

        RpcReply {
            topic,
            payload,
            outcome,
        }
    }
}
