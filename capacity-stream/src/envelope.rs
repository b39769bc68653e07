use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use data_encoding::BASE64;
use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Integers arrive either as JSON numbers or, for 64-bit fields, as decimal strings.
fn int_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IntOrString<T> {
        Int(T),
        String(String),
    }

    match IntOrString::<T>::deserialize(deserializer)? {
        IntOrString::Int(value) => Ok(value),
        IntOrString::String(value) => value.parse().map_err(de::Error::custom),
    }
}

fn base64_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    BASE64.decode(encoded.as_bytes()).map_err(de::Error::custom)
}

/// The stream a log line was written to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub enum LogType {
    /// Standard output.
    #[default]
    #[serde(rename = "OUT")]
    Out,
    /// Standard error.
    #[serde(rename = "ERR")]
    Err,
}

/// A log line.
#[derive(Clone, Debug, Deserialize)]
pub struct Log {
    /// The raw line.
    #[serde(default, deserialize_with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// The stream the line was written to.
    #[serde(default, rename = "type")]
    pub ty: LogType,
}

/// A counter increment.
#[derive(Clone, Debug, Deserialize)]
pub struct Counter {
    /// The counter name.
    #[serde(default)]
    pub name: String,
    /// The increment since the last envelope.
    #[serde(default, deserialize_with = "int_or_string")]
    pub delta: u64,
    /// The running total.
    #[serde(default, deserialize_with = "int_or_string")]
    pub total: u64,
}

/// A single gauge measurement.
#[derive(Clone, Debug, Deserialize)]
pub struct GaugeValue {
    /// The unit of the value.
    #[serde(default)]
    pub unit: String,
    /// The measured value.
    #[serde(default)]
    pub value: f64,
}

/// A set of gauge measurements.
#[derive(Clone, Debug, Deserialize)]
pub struct Gauge {
    /// Measurements by name.
    #[serde(default)]
    pub metrics: BTreeMap<String, GaugeValue>,
}

/// A timing measurement.
#[derive(Clone, Debug, Deserialize)]
pub struct Timer {
    /// The timer name.
    #[serde(default)]
    pub name: String,
    /// Start timestamp in nanoseconds.
    #[serde(default, deserialize_with = "int_or_string")]
    pub start: i64,
    /// Stop timestamp in nanoseconds.
    #[serde(default, deserialize_with = "int_or_string")]
    pub stop: i64,
}

/// A structured event record.
#[derive(Clone, Debug, Deserialize)]
pub struct Event {
    /// The event title.
    #[serde(default)]
    pub title: String,
    /// The event body.
    #[serde(default)]
    pub body: String,
}

/// A legacy tag value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TagValue {
    /// The text value, if the tag is textual.
    #[serde(default)]
    pub text: Option<String>,
}

/// One unit from the event stream.
///
/// Exactly one of the payload fields is normally set. Envelopes are classified and discarded
/// immediately.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StreamEnvelope {
    /// Creation time in nanoseconds since the epoch.
    #[serde(default, deserialize_with = "int_or_string")]
    pub timestamp: i64,
    /// The emitting source.
    #[serde(default)]
    pub source_id: String,
    /// The instance of the emitting source.
    #[serde(default)]
    pub instance_id: String,
    /// Tags attached by the emitter.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Tags in the legacy format.
    #[serde(default)]
    pub deprecated_tags: BTreeMap<String, TagValue>,
    /// Set for log envelopes.
    #[serde(default)]
    pub log: Option<Log>,
    /// Set for counter envelopes.
    #[serde(default)]
    pub counter: Option<Counter>,
    /// Set for gauge envelopes.
    #[serde(default)]
    pub gauge: Option<Gauge>,
    /// Set for timer envelopes.
    #[serde(default)]
    pub timer: Option<Timer>,
    /// Set for event envelopes.
    #[serde(default)]
    pub event: Option<Event>,
}

impl StreamEnvelope {
    /// Returns the value of a tag, looking at the legacy tags if the tag is not set.
    pub fn tag(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.tags.get(name) {
            return Some(value);
        }

        self.deprecated_tags.get(name)?.text.as_deref()
    }

    /// Returns the `origin` tag.
    pub fn origin(&self) -> Option<&str> {
        self.tag("origin")
    }
}
