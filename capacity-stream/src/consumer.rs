use std::sync::Arc;

use capacity_auth::TokenSource;
use capacity_counters::CounterBank;
use capacity_log::LogError;
use futures::StreamExt;
use tokio::sync::watch;

use crate::{Backoff, EventClassifier, StreamConnector, StreamFrame};

/// The phase a [`StreamConsumer`] is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsumerState {
    /// Fetching a fresh token.
    Authenticating,
    /// A connection was opened with the latest token.
    Connected,
    /// Reading envelopes from the open connection.
    Draining,
}

/// How a single pass of the consumer ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No token could be obtained.
    AuthFailed,
    /// The connection could not be opened.
    ConnectFailed,
    /// The gateway sent the end-of-stream marker.
    Closed,
    /// The connection ended without the end-of-stream marker.
    Ended,
    /// Reading from the connection failed.
    Failed,
}

impl CycleOutcome {
    /// Returns `true` if the backoff policy must be consulted before the next pass.
    pub fn needs_backoff(self) -> bool {
        matches!(self, Self::AuthFailed | Self::ConnectFailed)
    }
}

/// Tallies envelopes of a reconnecting event stream into a [`CounterBank`].
///
/// Every pass fetches a new token, opens a new connection and reads until the connection ends.
/// Tokens are never reused. Failed authentication and failed connection attempts are followed by a
/// delay from the backoff policy, which is reset once a connection opens.
pub struct StreamConsumer<T, C, K, B> {
    tokens: T,
    connector: C,
    classifier: K,
    bank: Arc<CounterBank>,
    backoff: B,
    state: watch::Sender<ConsumerState>,
}

impl<T, C, K, B> StreamConsumer<T, C, K, B>
where
    T: TokenSource,
    C: StreamConnector,
    K: EventClassifier,
    B: Backoff + Send,
{
    /// Creates a consumer that counts into `bank`.
    pub fn new(tokens: T, connector: C, classifier: K, bank: Arc<CounterBank>, backoff: B) -> Self {
        let (state, _) = watch::channel(ConsumerState::Authenticating);

        Self {
            tokens,
            connector,
            classifier,
            bank,
            backoff,
            state,
        }
    }

    /// Returns a receiver that observes state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    /// Runs passes forever.
    ///
    /// Returns only once the backoff policy gives up.
    pub async fn run(mut self) {
        loop {
            let outcome = self.cycle().await;
            if !outcome.needs_backoff() {
                continue;
            }

            match self.backoff.next_backoff() {
                Some(delay) => tokio::time::sleep(delay).await,
                None => {
                    capacity_log::error!("giving up on event stream after repeated failures");
                    return;
                }
            }
        }
    }

    /// Runs a single pass: authenticate, connect and read until the connection ends.
    pub async fn cycle(&mut self) -> CycleOutcome {
        self.state.send_replace(ConsumerState::Authenticating);

        let token = match self.tokens.token().await {
            Ok(token) => token,
            Err(error) => {
                capacity_log::warn!(
                    error = %LogError(&error),
                    "failed to authenticate with token issuer"
                );
                return CycleOutcome::AuthFailed;
            }
        };

        let mut frames = match self.connector.connect(&token).await {
            Ok(frames) => frames,
            Err(error) => {
                capacity_log::warn!(
                    error = %LogError(&error),
                    "failed to connect to event stream"
                );
                return CycleOutcome::ConnectFailed;
            }
        };

        // The token is not needed past this point and must not be reused.
        drop(token);

        self.backoff.reset();
        self.state.send_replace(ConsumerState::Connected);
        capacity_log::info!("connected to event stream");
        self.state.send_replace(ConsumerState::Draining);

        while let Some(frame) = frames.next().await {
            match frame {
                Ok(StreamFrame::Batch(envelopes)) => {
                    for envelope in &envelopes {
                        if let Some(bucket) = self.classifier.classify(envelope) {
                            self.bank.increment(bucket);
                        }
                    }
                }
                Ok(StreamFrame::Heartbeat) => (),
                Ok(StreamFrame::Closing) => {
                    capacity_log::info!("event stream closed by server");
                    return CycleOutcome::Closed;
                }
                Err(error) => {
                    capacity_log::warn!(error = %LogError(&error), "event stream failed");
                    return CycleOutcome::Failed;
                }
            }
        }

        capacity_log::info!("event stream ended");
        CycleOutcome::Ended
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use capacity_auth::{AuthError, Token};
    use parking_lot::Mutex;
    use tokio::time::Instant;

    use super::*;
    use crate::{
        Bounded, FirehoseClassifier, FrameStream, StreamEnvelope, StreamError, Zero, fixed,
    };

    /// Hands out numbered tokens, failing the first `failures` calls.
    #[derive(Default)]
    struct CountingTokens {
        calls: AtomicUsize,
        failures: usize,
    }

    impl TokenSource for CountingTokens {
        fn token(&self) -> impl Future<Output = Result<Token, AuthError>> + Send {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let failed = call <= self.failures;
            async move {
                if failed {
                    Err(AuthError::UnexpectedStatus(reqwest::StatusCode::BAD_GATEWAY))
                } else {
                    Ok(Token::from_access_token(&format!("t{call}")))
                }
            }
        }
    }

    /// Replays scripted connection attempts and records the tokens it was given.
    #[derive(Default)]
    struct ScriptedConnector {
        attempts: Mutex<VecDeque<Option<Vec<Result<StreamFrame, StreamError>>>>>,
        tokens: Mutex<Vec<String>>,
    }

    impl ScriptedConnector {
        fn fail(self) -> Self {
            self.attempts.lock().push_back(None);
            self
        }

        fn succeed(self, frames: Vec<Result<StreamFrame, StreamError>>) -> Self {
            self.attempts.lock().push_back(Some(frames));
            self
        }
    }

    impl StreamConnector for ScriptedConnector {
        fn connect(
            &self,
            token: &Token,
        ) -> impl Future<Output = Result<FrameStream, StreamError>> + Send {
            self.tokens.lock().push(token.header_value().to_owned());
            let attempt = self.attempts.lock().pop_front().flatten();
            async move {
                match attempt {
                    Some(frames) => Ok(futures::stream::iter(frames).boxed()),
                    None => Err(StreamError::UnexpectedStatus(
                        reqwest::StatusCode::SERVICE_UNAVAILABLE,
                    )),
                }
            }
        }
    }

    fn log() -> StreamEnvelope {
        serde_json::from_value(capacity_test::envelopes::log("hello")).unwrap()
    }

    fn counter(origin: &str) -> StreamEnvelope {
        serde_json::from_value(capacity_test::envelopes::counter(origin, "ingress", 1)).unwrap()
    }

    fn bank() -> Arc<CounterBank> {
        Arc::new(CounterBank::new(["logs", "metrics"]))
    }

    #[tokio::test]
    async fn test_cycle_counts_envelopes() {
        let bank = bank();
        let connector = ScriptedConnector::default().succeed(vec![
            Ok(StreamFrame::Batch(vec![log(), counter("doppler"), log()])),
            Ok(StreamFrame::Heartbeat),
            Ok(StreamFrame::Batch(vec![counter("router"), log()])),
            Ok(StreamFrame::Closing),
            Ok(StreamFrame::Batch(vec![log()])),
        ]);

        let mut consumer = StreamConsumer::new(
            CountingTokens::default(),
            connector,
            FirehoseClassifier::new("doppler"),
            Arc::clone(&bank),
            fixed(Duration::ZERO),
        );

        assert_eq!(consumer.cycle().await, CycleOutcome::Closed);
        assert_eq!(*consumer.subscribe().borrow(), ConsumerState::Draining);

        let drained = bank.drain_all();
        assert_eq!(drained["logs"], 3);
        assert_eq!(drained["metrics"], 1);
    }

    #[tokio::test]
    async fn test_unclassifiable_envelopes_are_isolated() {
        let bank = bank();
        let unknown = StreamEnvelope::default();
        let connector = ScriptedConnector::default().succeed(vec![Ok(StreamFrame::Batch(vec![
            unknown.clone(),
            counter("router"),
            unknown,
            log(),
        ]))]);

        let mut consumer = StreamConsumer::new(
            CountingTokens::default(),
            connector,
            FirehoseClassifier::new("doppler"),
            Arc::clone(&bank),
            fixed(Duration::ZERO),
        );

        assert_eq!(consumer.cycle().await, CycleOutcome::Ended);
        let drained = bank.drain_all();
        assert_eq!(drained["logs"], 1);
        assert_eq!(drained["metrics"], 0);
    }

    #[tokio::test]
    async fn test_stream_error_ends_cycle() {
        let bank = bank();
        let connector = ScriptedConnector::default().succeed(vec![
            Ok(StreamFrame::Batch(vec![log()])),
            Err(StreamError::Io(std::io::Error::other("connection reset"))),
            Ok(StreamFrame::Batch(vec![log()])),
        ]);

        let (logs, _guard) = capacity_log::capture_logs();
        let mut consumer = StreamConsumer::new(
            CountingTokens::default(),
            connector,
            FirehoseClassifier::new("doppler"),
            Arc::clone(&bank),
            fixed(Duration::ZERO),
        );

        assert_eq!(consumer.cycle().await, CycleOutcome::Failed);
        assert_eq!(bank.drain_all()["logs"], 1);
        assert_eq!(logs.warnings("event stream failed"), 1);
    }

    #[tokio::test]
    async fn test_reconnect_fetches_fresh_tokens() {
        const FAILURES: usize = 3;

        let mut connector = ScriptedConnector::default();
        for _ in 0..FAILURES {
            connector = connector.fail();
        }
        let connector = Arc::new(connector.succeed(vec![Ok(StreamFrame::Closing)]));

        let tokens = Arc::new(CountingTokens::default());
        let consumer = StreamConsumer::new(
            Arc::clone(&tokens),
            ArcConnector(Arc::clone(&connector)),
            FirehoseClassifier::new("doppler"),
            bank(),
            Bounded::new(Zero {}, FAILURES),
        );

        let state = consumer.subscribe();
        consumer.run().await;

        // K failed attempts, one success, then the closed stream reconnects and exhausts the
        // budget again after the reset.
        let seen = connector.tokens.lock().clone();
        assert_eq!(&seen[..FAILURES + 1], ["bearer t1", "bearer t2", "bearer t3", "bearer t4"]);
        assert_eq!(tokens.calls.load(Ordering::SeqCst), seen.len());
        assert_eq!(seen.len(), FAILURES + 1 + FAILURES + 1);
        assert_eq!(*state.borrow(), ConsumerState::Authenticating);
    }

    #[tokio::test]
    async fn test_connected_only_after_successful_token() {
        const FAILURES: usize = 2;

        let connector = Arc::new(ScriptedConnector::default().succeed(vec![]));
        let tokens = Arc::new(CountingTokens {
            calls: AtomicUsize::new(0),
            failures: FAILURES,
        });

        let mut consumer = StreamConsumer::new(
            Arc::clone(&tokens),
            ArcConnector(Arc::clone(&connector)),
            FirehoseClassifier::new("doppler"),
            bank(),
            fixed(Duration::ZERO),
        );

        let state = consumer.subscribe();
        for _ in 0..FAILURES {
            assert_eq!(consumer.cycle().await, CycleOutcome::AuthFailed);
            assert_eq!(*state.borrow(), ConsumerState::Authenticating);
            assert!(connector.tokens.lock().is_empty());
        }

        assert_eq!(consumer.cycle().await, CycleOutcome::Ended);
        assert_eq!(tokens.calls.load(Ordering::SeqCst), FAILURES + 1);
        assert_eq!(*connector.tokens.lock(), ["bearer t3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_backoff_after_auth_failure() {
        let tokens = Arc::new(CountingTokens {
            calls: AtomicUsize::new(0),
            failures: 2,
        });
        let connector = Arc::new(ScriptedConnector::default());

        let consumer = StreamConsumer::new(
            Arc::clone(&tokens),
            ArcConnector(Arc::clone(&connector)),
            FirehoseClassifier::new("doppler"),
            bank(),
            Bounded::new(fixed(Duration::from_secs(1)), 3),
        );

        let (logs, _guard) = capacity_log::capture_logs();
        let start = Instant::now();
        consumer.run().await;

        // Two failed tokens and one failed connection wait one second each. The second failed
        // connection exhausts the policy.
        assert_eq!(logs.warnings("failed to authenticate with token issuer"), 2);
        assert_eq!(logs.warnings("failed to connect to event stream"), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 4);
    }

    struct ArcConnector(Arc<ScriptedConnector>);

    impl StreamConnector for ArcConnector {
        fn connect(
            &self,
            token: &Token,
        ) -> impl Future<Output = Result<FrameStream, StreamError>> + Send {
            self.0.connect(token)
        }
    }
}
