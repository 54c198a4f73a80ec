//! Topic layout and MQTT topic-filter matching.
//!
//! ```text
//!   api/v1/{token}/me/measurement     telemetry (out)
//!   api/v1/{token}/me/attributes      state changes (out)
//!   {token}/me/rpc/request/{id}       commands (in)
//!   {token}/me/rpc/response/{id}      replies (out)
//! ```
//!
//! Log lines print topics through [`redact`], which masks the token level.

use core::fmt;

/// Topic names derived from the access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    measurement: String,
    attributes: String,
    rpc_request_filter: String,
}

impl Topics {
    pub fn new(access_token: &str) -> Self {
        Self {
            measurement: format!("api/v1/{access_token}/me/measurement"),
            attributes: format!("api/v1/{access_token}/me/attributes"),
            rpc_request_filter: format!("{access_token}/me/rpc/request/+"),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn attributes(&self) -> &str {
        &self.attributes
    }

    /// Filter matching every RPC request addressed to this device.
    pub fn rpc_request_filter(&self) -> &str {
        &self.rpc_request_filter
    }
}

/// Derive the reply topic by swapping every `request` level for `response`.
///
/// Only whole levels are replaced, so a token that happens to contain the
/// substring `request` stays intact. Returns `None` when the topic has no
/// `request` level at all.
pub fn response_topic(request_topic: &str) -> Option<String> {
    if !request_topic.split('/').any(|level| level == "request") {
        return None;
    }
    let levels: Vec<&str> = request_topic
        .split('/')
        .map(|level| if level == "request" { "response" } else { level })
        .collect();
    Some(levels.join("/"))
}

/// Display adapter returned by [`redact`].
pub struct Redacted<'a>(&'a str);

/// Show `topic` with its token level cut to the first four characters.
pub fn redact(topic: &str) -> Redacted<'_> {
    Redacted(topic)
}

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token_level = if self.0.starts_with("api/v1/") { 2 } else { 0 };
        for (i, level) in self.0.split('/').enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            if i == token_level {
                write!(f, "{}…", level.get(..4).unwrap_or(""))?;
            } else {
                f.write_str(level)?;
            }
        }
        Ok(())
    }
}

/// Correlation id carried as the last topic level.
pub fn request_id(request_topic: &str) -> &str {
    request_topic.rsplit('/').next().unwrap_or("")
}

/// MQTT 3.1.1 filter matching (`+` single level, `#` multi level).
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
