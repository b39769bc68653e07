use serde::Serialize;

/// How the backend interprets the value of a point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum MetricKind {
    /// The value as observed at the timestamp.
    #[default]
    #[serde(rename = "gauge")]
    Gauge,
    /// The number of occurrences since the previous point.
    #[serde(rename = "count")]
    Counter,
}

impl MetricKind {
    /// The name of the kind in the series payload.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "count",
        }
    }
}

/// A single sample bound for the metrics backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricPoint {
    /// The metric name.
    pub name: String,
    /// The sampled value.
    pub value: i64,
    /// How the value is interpreted.
    pub kind: MetricKind,
    /// Tags in `key:value` form.
    pub tags: Vec<String>,
}

impl MetricPoint {
    /// Creates an untagged gauge point.
    pub fn gauge(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
            kind: MetricKind::Gauge,
            tags: Vec::new(),
        }
    }

    /// Appends a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(MetricKind::Gauge.as_str(), "gauge");
        assert_eq!(MetricKind::Counter.as_str(), "count");
        assert_eq!(
            serde_json::to_string(&MetricKind::Counter).unwrap(),
            "\"count\""
        );
    }

    #[test]
    fn test_gauge() {
        let point = MetricPoint::gauge("capacity_planning.sent", 3).with_tag("event_type:logs");

        assert_eq!(point.kind, MetricKind::Gauge);
        assert_eq!(point.tags, ["event_type:logs"]);
    }
}
