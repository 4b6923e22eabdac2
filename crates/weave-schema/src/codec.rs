//! Per-field value codecs.
//!
//! A codec converts a plain field between the form a typed document
//! serializes to and the form kept in the store. Codecs run on encode (typed
//! to stored) and in reverse on decode.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{json, Value};

/// Converts one field between its typed and stored forms.
pub trait FieldCodec: Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &'static str;

    /// Typed form to stored form.
    fn encode(&self, value: &Value) -> Result<Value, String>;

    /// Stored form to typed form.
    fn decode(&self, value: &Value) -> Result<Value, String>;
}

/// Stores an RFC 3339 timestamp as `{"$date": <milliseconds since epoch>}`.
///
/// Sub-millisecond precision is dropped on encode.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimestampMillis;

const DATE_KEY: &str = "$date";

impl FieldCodec for TimestampMillis {
    fn name(&self) -> &'static str {
        "timestamp_millis"
    }

    fn encode(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::String(s) => {
                let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| format!("{s}: {e}"))?;
                Ok(json!({ DATE_KEY: parsed.with_timezone(&Utc).timestamp_millis() }))
            }
            other => Err(format!("expected an RFC 3339 string, got {other}")),
        }
    }

    fn decode(&self, value: &Value) -> Result<Value, String> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Object(map) => {
                let millis = map
                    .get(DATE_KEY)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| format!("expected {{\"{DATE_KEY}\": millis}}, got {value}"))?;
                let at = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| format!("timestamp out of range: {millis}"))?;
                Ok(Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)))
            }
            other => Err(format!("expected a stored date, got {other}")),
        }
    }
}
