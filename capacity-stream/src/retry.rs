use std::time::Duration;

pub use backoff::ExponentialBackoff;
pub use backoff::backoff::{Backoff, Constant, Zero};

/// Waits the same delay after every failure, forever.
pub fn fixed(delay: Duration) -> Constant {
    Constant::new(delay)
}

/// Doubles the delay after every failure up to `max`, forever.
pub fn exponential(initial: Duration, max: Duration) -> ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(initial)
        .with_max_interval(max.max(initial))
        .with_max_elapsed_time(None)
        .build()
}

/// Gives up after a number of consecutive delays.
///
/// Resetting restores the full budget.
#[derive(Clone, Debug)]
pub struct Bounded<B> {
    inner: B,
    max_retries: usize,
    remaining: usize,
}

impl<B> Bounded<B> {
    /// Allows at most `max_retries` delays from `inner` between resets.
    pub fn new(inner: B, max_retries: usize) -> Self {
        Self {
            inner,
            max_retries,
            remaining: max_retries,
        }
    }
}

impl<B: Backoff> Backoff for Bounded<B> {
    fn reset(&mut self) {
        self.remaining = self.max_retries;
        self.inner.reset();
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        self.inner.next_backoff()
    }
}
