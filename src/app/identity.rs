//! Device identity presented to the broker.

use core::fmt;

/// Immutable connection identity, created once at startup.
///
/// The access token doubles as the MQTT username and as the topic
/// prefix, so it is never logged in full: `Debug` masks it here and
/// topics are logged through [`crate::topics::redact`].
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    client_id: String,
    access_token: String,
    broker_host: String,
    broker_port: u16,
}

impl Identity {
    pub fn new(
        client_id: impl Into<String>,
        access_token: impl Into<String>,
        broker_host: impl Into<String>,
        broker_port: u16,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            access_token: access_token.into(),
            broker_host: broker_host.into(),
            broker_port,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn broker_host(&self) -> &str {
        &self.broker_host
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    /// `mqtt://host:port` form used by the ESP-IDF client.
    pub fn broker_url(&self) -> String {
        format!("mqtt://{}:{}", self.broker_host, self.broker_port)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.access_token.get(..4).unwrap_or("");
        f.debug_struct("Identity")
            .field("client_id", &self.client_id)
            .field("access_token", &format_args!("{shown}…"))
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .finish()
    }
}
