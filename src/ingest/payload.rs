use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::{
    db::models::{Channels, NewReading, DEFAULT_DEVICE_ID},
    error::IngestError,
};

/// Where the bridge nests the reading inside an oneM2M notification.
const M2M_CONTENT_POINTER: &str = "/m2m:sgn/m2m:nev/m2m:rep/m2m:cin/con";

/// Channel values as reported by the bridge. Unknown fields are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SensorValues {
    pub current_in: Option<f64>,
    pub current_out: Option<f64>,
    pub voltage_in: Option<f64>,
    pub voltage_out: Option<f64>,
    pub temperature: Option<f64>,
    pub battery_percentage: Option<f64>,
}

/// A single reading in its direct form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IngestPayload {
    pub device_id: Option<String>,
    pub sensors: SensorValues,
    /// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC. Defaults to the
    /// time of receipt.
    pub timestamp: Option<String>,
}

impl IngestPayload {
    /// Pull the reading out of any of the accepted envelopes:
    /// a direct `{sensors: ...}` object, an oneM2M notification whose `con`
    /// holds the reading (as an object or a JSON string), or a
    /// `{content: ...}` wrapper of the same.
    pub fn from_envelope(body: Value) -> Result<Self, IngestError> {
        let inner = if body.get("sensors").is_some() {
            body
        } else if let Some(con) = body.pointer(M2M_CONTENT_POINTER) {
            unwrap_content(con.clone())?
        } else if let Some(content) = body.get("content") {
            unwrap_content(content.clone())?
        } else {
            return Err(IngestError::Payload("unrecognised webhook format".into()));
        };

        if inner.get("sensors").is_none() {
            return Err(IngestError::Payload("missing sensors data".into()));
        }
        Ok(serde_json::from_value(inner)?)
    }

    /// Build the row to insert. Missing channels are stored as zero.
    pub fn into_new_reading(self, received_at: DateTime<Utc>) -> Result<NewReading, IngestError> {
        let timestamp = match self.timestamp.as_deref() {
            None => received_at,
            Some(raw) => parse_timestamp(raw)?,
        };
        let s = self.sensors;
        let channels = Channels {
            current_in: s.current_in,
            current_out: s.current_out,
            voltage_in: s.voltage_in,
            voltage_out: s.voltage_out,
            temperature: s.temperature,
            battery_percentage: s.battery_percentage,
        }
        .zero_filled();

        Ok(NewReading {
            device_id: self
                .device_id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_owned()),
            timestamp,
            channels,
        })
    }
}

fn unwrap_content(content: Value) -> Result<Value, IngestError> {
    match content {
        Value::String(s) => Ok(serde_json::from_str(&s)?),
        other => Ok(other),
    }
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| IngestError::Timestamp(raw.to_owned()))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn direct_payload() {
        let p = IngestPayload::from_envelope(json!({
            "device_id": "NANO_002",
            "sensors": { "temperature": 24.5, "lux": 300.0 },
            "timestamp": "2025-07-19 10:30:00"
        }))
        .unwrap();
        let r = p.into_new_reading(received()).unwrap();

        assert_eq!(r.device_id, "NANO_002");
        assert_eq!(r.timestamp, Utc.with_ymd_and_hms(2025, 7, 19, 10, 30, 0).unwrap());
        assert_eq!(r.channels.temperature, Some(24.5));
        assert_eq!(r.channels.current_in, Some(0.0));
    }

    #[test]
    fn m2m_notification_with_string_content() {
        let con = json!({ "sensors": { "voltage_in": 229.7 } }).to_string();
        let body = json!({
            "m2m:sgn": { "m2m:nev": { "m2m:rep": { "m2m:cin": { "con": con } } } }
        });
        let r = IngestPayload::from_envelope(body)
            .unwrap()
            .into_new_reading(received())
            .unwrap();

        assert_eq!(r.device_id, DEFAULT_DEVICE_ID);
        assert_eq!(r.timestamp, received());
        assert_eq!(r.channels.voltage_in, Some(229.7));
    }

    #[test]
    fn m2m_notification_with_object_content() {
        let body = json!({
            "m2m:sgn": { "m2m:nev": { "m2m:rep": { "m2m:cin": {
                "con": { "sensors": { "battery_percentage": 88.0 } }
            } } } }
        });
        let p = IngestPayload::from_envelope(body).unwrap();
        assert_eq!(p.sensors.battery_percentage, Some(88.0));
    }

    #[test]
    fn content_wrapper() {
        let body = json!({ "content": "{\"device_id\":\"X\",\"sensors\":{}}" });
        let p = IngestPayload::from_envelope(body).unwrap();
        assert_eq!(p.device_id.as_deref(), Some("X"));
    }

    #[test]
    fn rejects_unknown_shapes() {
        let err = IngestPayload::from_envelope(json!({ "hello": "world" })).unwrap_err();
        assert!(matches!(err, IngestError::Payload(_)));

        let err = IngestPayload::from_envelope(json!({ "content": { "device_id": "X" } })).unwrap_err();
        assert!(err.to_string().contains("missing sensors"));

        let err = IngestPayload::from_envelope(json!({ "content": "not json" })).unwrap_err();
        assert!(matches!(err, IngestError::Payload(_)));
    }

    #[test]
    fn timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 7, 19, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-07-19T10:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-07-19T08:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2025-07-19 08:00:00").unwrap(), expected);
        assert!(matches!(parse_timestamp("yesterday"), Err(IngestError::Timestamp(_))));
    }

    #[test]
    fn blank_device_id_uses_default() {
        let p = IngestPayload {
            device_id: Some("  ".into()),
            sensors: SensorValues::default(),
            timestamp: None,
        };
        assert_eq!(p.into_new_reading(received()).unwrap().device_id, DEFAULT_DEVICE_ID);
    }
}
