use std::sync::Arc;
use std::time::Duration;

use capacity_counters::CounterBank;
use capacity_log::LogError;
use tokio::time::MissedTickBehavior;

use crate::{Bucket, IngressClient, IngressError};

/// The number of distinct counter names a [`MetricEmitter`] cycles through.
pub const METRIC_NAMES: usize = 100;

/// How long a single event may take to be accepted.
pub const EVENT_EMIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Emits counter envelopes at a fixed rate and counts them.
///
/// Counters are named `capacity-planning-metric-0` through `capacity-planning-metric-99` and
/// used in turn. A reader of the log stream filtering on the emitter's origin can count them
/// again.
pub struct MetricEmitter<C> {
    client: C,
    names: Vec<String>,
    next: usize,
    metrics_per_second: u64,
    bank: Arc<CounterBank>,
}

impl<C> MetricEmitter<C>
where
    C: IngressClient,
{
    /// Creates an emitter writing `metrics_per_second` counters through `client`.
    pub fn new(client: C, metrics_per_second: u64, bank: Arc<CounterBank>) -> Self {
        let names = (0..METRIC_NAMES)
            .map(|index| format!("capacity-planning-metric-{index}"))
            .collect();

        Self {
            client,
            names,
            next: 0,
            metrics_per_second,
            bank,
        }
    }

    /// Time between two counters, or `None` if the emitter is disabled.
    pub fn period(&self) -> Option<Duration> {
        match self.metrics_per_second {
            0 => None,
            rate => Some(Duration::from_nanos((1_000_000_000 / rate).max(1))),
        }
    }

    /// Emits the next counter and counts it once it has been accepted.
    ///
    /// The next call moves on to the following name even if this one failed.
    pub async fn emit_one(&mut self) -> Result<(), IngressError> {
        let index = self.next;
        self.next = (self.next + 1) % self.names.len();

        self.client.emit_counter(&self.names[index]).await?;
        self.bank.increment(Bucket::Metrics.name());
        Ok(())
    }

    /// Emits counters forever. An emitter with a rate of zero never emits.
    pub async fn run(mut self) {
        let Some(period) = self.period() else {
            capacity_log::info!("metric emitter disabled");
            return std::future::pending().await;
        };

        capacity_log::info!(
            metrics_per_second = self.metrics_per_second,
            "metric emitter started"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(error) = self.emit_one().await {
                capacity_log::warn!(error = %LogError(&error), "failed to emit metric");
            }
        }
    }
}

/// Emits one structured event per interval and counts the accepted ones.
pub struct EventEmitter<C> {
    client: C,
    interval: Duration,
    title: String,
    body: String,
    bank: Arc<CounterBank>,
}

impl<C> EventEmitter<C>
where
    C: IngressClient,
{
    /// Creates an emitter writing an event with `title` and `body` every `interval`.
    ///
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn new(
        client: C,
        interval: Duration,
        title: impl Into<String>,
        body: impl Into<String>,
        bank: Arc<CounterBank>,
    ) -> Self {
        Self {
            client,
            interval: interval.max(Duration::from_millis(1)),
            title: title.into(),
            body: body.into(),
            bank,
        }
    }

    /// Time between two events.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Emits one event and counts it once it has been accepted.
    ///
    /// Gives up after [`EVENT_EMIT_TIMEOUT`].
    pub async fn emit_one(&self) -> Result<(), IngressError> {
        let emit = self.client.emit_event(&self.title, &self.body);
        tokio::time::timeout(EVENT_EMIT_TIMEOUT, emit)
            .await
            .map_err(|_| IngressError::Timeout)??;

        self.bank.increment(Bucket::Events.name());
        Ok(())
    }

    /// Emits events forever.
    pub async fn run(self) {
        capacity_log::info!(
            interval_ms = self.interval.as_millis() as u64,
            title = %self.title,
            "event emitter started"
        );

        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(error) = self.emit_one().await {
                capacity_log::warn!(error = %LogError(&error), "failed to emit event");
            }
        }
    }
}
