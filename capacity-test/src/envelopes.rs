//! Builders for envelopes in the JSON shape served by the log stream gateway.

use data_encoding::BASE64;
use serde_json::{Value, json};

/// A log envelope with the given payload text.
pub fn log(payload: &str) -> Value {
    json!({
        "timestamp": "1700000000000000000",
        "source_id": "app-guid",
        "instance_id": "0",
        "tags": {},
        "log": {
            "payload": BASE64.encode(payload.as_bytes()),
            "type": "OUT",
        },
    })
}

/// A counter envelope emitted by `origin`.
pub fn counter(origin: &str, name: &str, delta: u64) -> Value {
    json!({
        "timestamp": "1700000000000000000",
        "source_id": "doppler",
        "tags": { "origin": origin },
        "counter": {
            "name": name,
            "delta": delta.to_string(),
            "total": delta.to_string(),
        },
    })
}

/// A counter envelope that carries its origin only in the deprecated tags.
pub fn legacy_counter(origin: &str, name: &str) -> Value {
    json!({
        "timestamp": "1700000000000000000",
        "source_id": "doppler",
        "deprecated_tags": { "origin": { "text": origin } },
        "counter": { "name": name, "delta": "1", "total": "1" },
    })
}

/// A gauge envelope, which none of the classifiers count.
pub fn gauge(name: &str, value: f64) -> Value {
    json!({
        "timestamp": "1700000000000000000",
        "source_id": "doppler",
        "gauge": {
            "metrics": { name: { "unit": "bytes", "value": value } },
        },
    })
}

/// An event envelope with the given title.
pub fn event(title: &str, body: &str) -> Value {
    json!({
        "timestamp": "1700000000000000000",
        "source_id": "event-emitter",
        "event": { "title": title, "body": body },
    })
}
