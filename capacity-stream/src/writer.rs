use std::io;
use std::sync::Arc;
use std::time::Duration;

use capacity_counters::CounterBank;
use capacity_log::LogError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::MissedTickBehavior;

use crate::Bucket;

/// The character synthetic log lines are made of.
const FILL: u8 = b'?';

/// Writes synthetic log lines at a fixed rate and counts them.
///
/// Every line consists of `log_bytes` question marks followed by a newline. The platform picks
/// them up from the process output, so a reader of the app's log stream can count them again.
pub struct LogWriter<W> {
    out: W,
    message: Vec<u8>,
    logs_per_second: u64,
    bank: Arc<CounterBank>,
}

impl<W> LogWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a writer emitting `logs_per_second` lines of `log_bytes` bytes into `out`.
    pub fn new(out: W, log_bytes: usize, logs_per_second: u64, bank: Arc<CounterBank>) -> Self {
        Self {
            out,
            message: vec![FILL; log_bytes],
            logs_per_second,
            bank,
        }
    }

    /// The message written on every line, without the newline.
    pub fn message(&self) -> &[u8] {
        &self.message
    }

    /// Time between two lines, or `None` if the writer is disabled.
    pub fn period(&self) -> Option<Duration> {
        match self.logs_per_second {
            0 => None,
            rate => Some(Duration::from_nanos((1_000_000_000 / rate).max(1))),
        }
    }

    /// Writes and counts a single line.
    ///
    /// A slow reader of the output delays the writer instead of blocking the runtime.
    pub async fn write_line(&mut self) -> io::Result<()> {
        self.out.write_all(&self.message).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        self.bank.increment(Bucket::Logs.name());
        Ok(())
    }

    /// Writes lines forever.
    ///
    /// Lines that could not be written are not counted. A writer with a rate of zero never writes.
    pub async fn run(mut self) {
        let Some(period) = self.period() else {
            capacity_log::info!("log writer disabled");
            return std::future::pending().await;
        };

        capacity_log::info!(
            logs_per_second = self.logs_per_second,
            log_bytes = self.message.len(),
            "log writer started"
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(error) = self.write_line().await {
                capacity_log::warn!(error = %LogError(&error), "failed to write log line");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use parking_lot::Mutex;
    use tokio::io::AsyncReadExt;

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl AsyncWrite for SharedBuffer {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.0.lock().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn bank() -> Arc<CounterBank> {
        Arc::new(CounterBank::new(["logs"]))
    }

    #[tokio::test]
    async fn test_write_line() {
        let bank = bank();
        let mut writer = LogWriter::new(Vec::new(), 4, 1, Arc::clone(&bank));

        writer.write_line().await.unwrap();
        writer.write_line().await.unwrap();

        assert_eq!(writer.message(), b"????");
        assert_eq!(writer.out, b"????\n????\n");
        assert_eq!(bank.get("logs"), Some(2));
    }

    #[tokio::test]
    async fn test_failed_write_not_counted() {
        let bank = bank();
        let mut writer = LogWriter::new(BrokenPipe, 4, 1, Arc::clone(&bank));

        assert!(writer.write_line().await.is_err());
        assert_eq!(bank.get("logs"), Some(0));
    }

    #[tokio::test]
    async fn test_full_pipe_waits_for_reader() {
        let bank = bank();
        let (out, mut reader) = tokio::io::duplex(8);
        let writer = LogWriter::new(out, 15, 1000, Arc::clone(&bank));
        let task = tokio::spawn(writer.run());

        // The pipe holds less than one line, so nothing is counted until the reader catches up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bank.get("logs"), Some(0));

        let mut line = [0; 16];
        reader.read_exact(&mut line).await.unwrap();
        assert_eq!(&line, b"???????????????\n");

        task.abort();
    }

    #[test]
    fn test_period() {
        let writer = |rate| LogWriter::new(Vec::new(), 1, rate, bank());

        assert_eq!(writer(0).period(), None);
        assert_eq!(writer(1).period(), Some(Duration::from_secs(1)));
        assert_eq!(writer(1000).period(), Some(Duration::from_millis(1)));
        assert_eq!(writer(u64::MAX).period(), Some(Duration::from_nanos(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_rate() {
        let bank = bank();
        let buffer = SharedBuffer::default();
        let writer = LogWriter::new(buffer.clone(), 3, 10, Arc::clone(&bank));

        // The first line is written immediately, then one every 100ms.
        let result = tokio::time::timeout(Duration::from_millis(1050), writer.run()).await;
        assert!(result.is_err());

        assert_eq!(bank.get("logs"), Some(11));
        assert_eq!(buffer.0.lock().len(), 11 * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_disabled() {
        let bank = bank();
        let writer = LogWriter::new(Vec::new(), 3, 0, Arc::clone(&bank));

        let result = tokio::time::timeout(Duration::from_secs(10), writer.run()).await;
        assert!(result.is_err());
        assert_eq!(bank.get("logs"), Some(0));
    }
}
