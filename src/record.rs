use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Key under which [`Payload::Raw`] fields are nested inside `data`.
pub const RAW_PAYLOAD_KEY: &str = "general";

/// Key under which the network-log shape is nested inside `data`.
pub const NETWORK_PAYLOAD_KEY: &str = "net";

/// Severity of a single emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// `tracing` has no fatal level; fatal records mirror as ERROR.
    pub fn as_tracing(&self) -> tracing::Level {
        match self {
            Level::Info => tracing::Level::INFO,
            Level::Warn => tracing::Level::WARN,
            Level::Error | Level::Fatal => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log line as handed to a [`LogSink`](crate::sink::LogSink).
///
/// `data` and `error` are always present: an absent payload is `{}` and an
/// absent error is `""`, so every record of a given level has the same
/// field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub app: String,
    pub event: String,
    pub tracker_id: String,
    pub caller: String,
    pub timer_start: DateTime<Utc>,
    pub timer_end: DateTime<Utc>,
    /// Whole milliseconds between `timer_start` and `timer_end`, truncated.
    pub processing_time: i64,
    pub data: Map<String, Value>,
    pub error: String,
}

/// Payload attached to an emission.
///
/// Adapters that already know the shape they want in `data` use
/// [`Payload::Shaped`]; ad-hoc maps use [`Payload::Raw`] and end up under
/// [`RAW_PAYLOAD_KEY`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Raw(Map<String, Value>),
    Shaped(Map<String, Value>),
}

impl Payload {
    pub fn empty() -> Self {
        Payload::Raw(Map::new())
    }

    /// Standard network-log shape: `{"net": fields}`.
    pub fn network(fields: Map<String, Value>) -> Self {
        let mut shaped = Map::new();
        shaped.insert(NETWORK_PAYLOAD_KEY.to_string(), Value::Object(fields));
        Payload::Shaped(shaped)
    }

    /// Render the payload into the record's `data` object.
    pub fn into_data(self) -> Map<String, Value> {
        match self {
            Payload::Shaped(fields) => fields,
            Payload::Raw(fields) if fields.is_empty() => Map::new(),
            Payload::Raw(fields) => {
                let mut data = Map::new();
                data.insert(RAW_PAYLOAD_KEY.to_string(), Value::Object(fields));
                data
            }
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::empty()
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(fields: Map<String, Value>) -> Self {
        Payload::Raw(fields)
    }
}

/// Build a field map from `key => value` pairs.
///
/// ```
/// let fields = event_log::fields! { "rows" => 3, "query" => "SELECT 1" };
/// assert_eq!(fields["rows"], 3);
/// ```
#[macro_export]
macro_rules! fields {
    () => { ::serde_json::Map::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = ::serde_json::Map::new();
        $( map.insert(::std::string::String::from($key), ::serde_json::json!($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_payload_is_nested_under_default_key() {
        let data = Payload::Raw(crate::fields! { "any" => "any" }).into_data();
        assert_eq!(Value::Object(data), json!({ "general": { "any": "any" } }));
    }

    #[test]
    fn shaped_payload_is_merged_verbatim() {
        let data = Payload::network(crate::fields! { "method" => "GET" }).into_data();
        assert_eq!(Value::Object(data), json!({ "net": { "method": "GET" } }));
    }

    #[test]
    fn empty_payload_still_yields_an_object() {
        assert!(Payload::empty().into_data().is_empty());
        assert!(Payload::Shaped(Map::new()).into_data().is_empty());
    }

    #[test]
    fn levels_serialize_lowercase() {
        assert_eq!(serde_json::to_value(Level::Fatal).unwrap(), json!("fatal"));
        assert_eq!(Level::Fatal.as_tracing(), tracing::Level::ERROR);
    }
}
