//! Measurement payload encodings.
//!
//! The default is the line-protocol shape the broker's time-series store
//! ingests directly:
//!
//! ```text
//!   dht,measure=temp value=22
//! ```

use serde::{Deserialize, Serialize};

use crate::app::events::Measurement;

/// Wire format of a [`Measurement`] on the measurement topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementEncoding {
    /// `{resource},measure={metric} value={value}`
    #[default]
    LineProtocol,
    /// `{"resource":..,"metric":..,"value":..,"timestamp_ms":..}`
    Json,
}

impl MeasurementEncoding {
    pub fn encode(self, m: &Measurement) -> Vec<u8> {
        match self {
            Self::LineProtocol => {
                format!("{},measure={} value={}", m.resource, m.metric, m.value).into_bytes()
            }
            // Serializing a plain struct of strings and numbers cannot fail;
            // non-finite floats become `null`.
            Self::Json => serde_json::to_vec(m).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::events::Metric;

    #[test]
    fn line_protocol_shape() {
        let m = Measurement::new("dht", Metric::new("temp", 22.0), 2000);
        assert_eq!(
            MeasurementEncoding::LineProtocol.encode(&m),
            b"dht,measure=temp value=22".to_vec()
        );
    }

    #[test]
    fn line_protocol_keeps_fraction() {
        let m = Measurement::new("dht", Metric::new("humi", 40.5), 0);
        assert_eq!(
            MeasurementEncoding::LineProtocol.encode(&m),
            b"dht,measure=humi value=40.5".to_vec()
        );
    }

    #[test]
    fn json_carries_timestamp() {
        let m = Measurement::new("pin17", Metric::new("status", true), 1234);
        let v: serde_json::Value =
            serde_json::from_slice(&MeasurementEncoding::Json.encode(&m)).unwrap();
        assert_eq!(v["resource"], "pin17");
        assert_eq!(v["metric"], "status");
        assert_eq!(v["value"], true);
        assert_eq!(v["timestamp_ms"], 1234);
    }

    #[test]
    fn encoding_config_names() {
        let e: MeasurementEncoding = serde_json::from_str("\"line_protocol\"").unwrap();
        assert_eq!(e, MeasurementEncoding::LineProtocol);
        let e: MeasurementEncoding = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(e, MeasurementEncoding::Json);
    }
}
