use std::sync::Arc;
use std::time::Duration;

use capacity_counters::CounterBank;
use capacity_log::LogError;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{MetricPoint, SeriesPayload, SeriesSink};

/// A producer of metric points.
///
/// Every call returns the values accumulated since the previous call.
pub trait DrainsToPoints: Send + Sync {
    /// Drains the current interval into points.
    fn drain_points(&self) -> Vec<MetricPoint>;
}

/// Turns every counter of a [`CounterBank`] into one gauge point.
///
/// All points share one metric name. The counter name becomes the value of an optional tag, so
/// a bank with counters `logs` and `metrics` and the tag key `event_type` yields points tagged
/// `event_type:logs` and `event_type:metrics`.
pub struct BankPoints {
    bank: Arc<CounterBank>,
    metric: String,
    tag_key: Option<String>,
    tags: Vec<String>,
}

impl BankPoints {
    /// Reports all counters of `bank` as `metric`.
    pub fn new(bank: Arc<CounterBank>, metric: impl Into<String>) -> Self {
        Self {
            bank,
            metric: metric.into(),
            tag_key: None,
            tags: Vec::new(),
        }
    }

    /// Tags every point with `<key>:<counter name>`.
    pub fn with_tag_key(mut self, key: impl Into<String>) -> Self {
        self.tag_key = Some(key.into());
        self
    }

    /// Adds a tag to every point.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

impl DrainsToPoints for BankPoints {
    fn drain_points(&self) -> Vec<MetricPoint> {
        self.bank
            .drain_all()
            .into_iter()
            .map(|(name, value)| {
                let value = i64::try_from(value).unwrap_or(i64::MAX);
                let mut point = MetricPoint::gauge(self.metric.as_str(), value);
                point.tags.extend(self.tags.iter().cloned());
                if let Some(ref key) = self.tag_key {
                    point.tags.push(format!("{key}:{name}"));
                }
                point
            })
            .collect()
    }
}

/// Identifies the reporting process in every payload.
#[derive(Clone, Debug, Default)]
pub struct ReporterIdentity {
    /// The `host` field of every series.
    pub host: String,
    /// Appended to every point as `job_name:<job_name>`.
    pub job_name: String,
    /// Appended to every point as `instance_index:<instance_id>`.
    pub instance_id: String,
}

/// Periodically drains its sources and delivers the points.
pub struct MetricReporter<S> {
    sources: Vec<Box<dyn DrainsToPoints>>,
    sink: S,
    identity: ReporterIdentity,
    interval: Duration,
}

impl<S: SeriesSink> MetricReporter<S> {
    /// Creates a reporter without sources that ticks every `interval`.
    pub fn new(sink: S, identity: ReporterIdentity, interval: Duration) -> Self {
        Self {
            sources: Vec::new(),
            sink,
            identity,
            interval,
        }
    }

    /// Adds a source drained on every tick.
    pub fn with_source(mut self, source: impl DrainsToPoints + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Drains all sources into a payload stamped with `now`.
    pub fn collect(&self, now: i64) -> SeriesPayload {
        let job_tag = format!("job_name:{}", self.identity.job_name);
        let instance_tag = format!("instance_index:{}", self.identity.instance_id);

        let points = self
            .sources
            .iter()
            .flat_map(|source| source.drain_points())
            .map(|mut point| {
                point.tags.push(job_tag.clone());
                point.tags.push(instance_tag.clone());
                point
            })
            .collect();

        SeriesPayload::new(points, &self.identity.host, now)
    }

    /// Runs a single tick.
    ///
    /// Sources are drained before delivery, so their values are lost if delivery fails.
    pub async fn tick(&self) {
        let payload = self.collect(chrono::Utc::now().timestamp());

        match self.sink.send(&payload).await {
            Ok(()) => capacity_log::debug!(series = payload.len(), "delivered metrics"),
            Err(error) => {
                capacity_log::warn!(
                    error = %LogError(&error),
                    series = payload.len(),
                    "failed to deliver metrics"
                );
            }
        }
    }

    /// Ticks forever. The first tick happens one interval after the start.
    pub async fn run(self) {
        capacity_log::info!(
            interval = self.interval.as_secs(),
            sources = self.sources.len(),
            "metric reporter started"
        );

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}
