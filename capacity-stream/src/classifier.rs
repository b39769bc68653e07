use crate::StreamEnvelope;

/// Counter buckets used by the built-in classifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Bucket {
    /// Log lines.
    Logs,
    /// Counter events from the configured origin.
    Metrics,
    /// Structured events with the configured title.
    Events,
}

impl Bucket {
    /// Returns the counter name of this bucket.
    pub fn name(self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Metrics => "metrics",
            Self::Events => "events",
        }
    }
}

/// Maps a stream envelope to zero or one counter bucket.
///
/// Classification is pure and never fails. Envelopes that match no bucket are dropped.
pub trait EventClassifier: Send + Sync {
    /// Returns the names of all buckets this classifier can produce.
    fn buckets(&self) -> Vec<&str>;

    /// Returns the bucket of the envelope, if any.
    fn classify<'a>(&'a self, envelope: &StreamEnvelope) -> Option<&'a str>;
}

/// Counts all log lines and the counter events of one origin.
#[derive(Clone, Debug)]
pub struct FirehoseClassifier {
    counter_origin: String,
}

impl FirehoseClassifier {
    /// Creates a classifier that counts counter events from `counter_origin` as metrics.
    pub fn new(counter_origin: impl Into<String>) -> Self {
        Self {
            counter_origin: counter_origin.into(),
        }
    }
}

impl EventClassifier for FirehoseClassifier {
    fn buckets(&self) -> Vec<&str> {
        vec![Bucket::Logs.name(), Bucket::Metrics.name()]
    }

    fn classify<'a>(&'a self, envelope: &StreamEnvelope) -> Option<&'a str> {
        if envelope.log.is_some() {
            return Some(Bucket::Logs.name());
        }

        if envelope.counter.is_some() && envelope.origin() == Some(self.counter_origin.as_str()) {
            return Some(Bucket::Metrics.name());
        }

        None
    }
}

/// Counts structured events with an exact title.
#[derive(Clone, Debug)]
pub struct EventTitleClassifier {
    title: String,
}

impl EventTitleClassifier {
    /// Creates a classifier for events titled `title`.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }
}

impl EventClassifier for EventTitleClassifier {
    fn buckets(&self) -> Vec<&str> {
        vec![Bucket::Events.name()]
    }

    fn classify<'a>(&'a self, envelope: &StreamEnvelope) -> Option<&'a str> {
        match &envelope.event {
            Some(event) if event.title == self.title => Some(Bucket::Events.name()),
            _ => None,
        }
    }
}

/// Counts log lines that contain a fixed text.
#[derive(Clone, Debug)]
pub struct LogContentClassifier {
    needle: Vec<u8>,
}

impl LogContentClassifier {
    /// Creates a classifier for log lines containing `needle`.
    pub fn new(needle: impl Into<Vec<u8>>) -> Self {
        Self {
            needle: needle.into(),
        }
    }
}

impl EventClassifier for LogContentClassifier {
    fn buckets(&self) -> Vec<&str> {
        vec![Bucket::Logs.name()]
    }

    fn classify<'a>(&'a self, envelope: &StreamEnvelope) -> Option<&'a str> {
        let log = envelope.log.as_ref()?;
        contains(&log.payload, &self.needle).then_some(Bucket::Logs.name())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
