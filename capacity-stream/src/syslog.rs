use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use capacity_counters::CounterBank;
use capacity_log::LogError;
use futures::StreamExt;
use syslog_loose::{Protocol, Variant};
use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::codec::{Decoder, FramedRead};

use crate::Bucket;

/// Upper bound for a single syslog record.
const MAX_FRAME_LENGTH: usize = 1024 * 1024;

/// The longest length prefix accepted, in digits.
const MAX_LENGTH_DIGITS: usize = 10;

/// Failures of the syslog listener and its connections.
#[derive(Debug, thiserror::Error)]
pub enum SyslogError {
    /// The listener could not be bound.
    #[error("failed to bind syslog listener to {addr}")]
    Bind {
        /// The requested address.
        addr: SocketAddr,
        /// The cause.
        #[source]
        source: io::Error,
    },
    /// Reading from the connection failed.
    #[error("syslog connection failed")]
    Io(#[from] io::Error),
    /// The frame does not start with a decimal length followed by a space.
    #[error("invalid octet count")]
    InvalidLength,
    /// The frame exceeds the maximum record size.
    #[error("syslog frame of {0} bytes exceeds maximum")]
    FrameTooLarge(usize),
    /// The frame is not an RFC 5424 record.
    #[error("malformed syslog record")]
    Malformed,
}

/// Splits a byte stream into records framed by octet counting (RFC 6587).
///
/// Every frame is `<length> <record>`, where `length` is the decimal byte count of the record.
#[derive(Debug, Default)]
pub struct OctetCountingDecoder {
    _priv: (),
}

impl Decoder for OctetCountingDecoder {
    type Item = Bytes;
    type Error = SyslogError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let searched = src.len().min(MAX_LENGTH_DIGITS + 1);
        let Some(space) = src[..searched].iter().position(|b| *b == b' ') else {
            if src.len() > MAX_LENGTH_DIGITS {
                return Err(SyslogError::InvalidLength);
            }
            return Ok(None);
        };

        let digits = &src[..space];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(SyslogError::InvalidLength);
        }

        // Only ASCII digits remain, so both conversions succeed for in-range values.
        let length = std::str::from_utf8(digits)
            .ok()
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or(SyslogError::InvalidLength)?;

        if length > MAX_FRAME_LENGTH {
            return Err(SyslogError::FrameTooLarge(length));
        }

        let total = space + 1 + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total);
        Ok(Some(frame.split_off(space + 1).freeze()))
    }
}

/// Checks that a record is a valid RFC 5424 message.
pub fn parse_record(record: &[u8]) -> Result<(), SyslogError> {
    let record = std::str::from_utf8(record).map_err(|_| SyslogError::Malformed)?;
    let message = syslog_loose::parse_message(record, Variant::RFC5424);

    match message.protocol {
        Protocol::RFC5424(_) if message.facility.is_some() => Ok(()),
        _ => Err(SyslogError::Malformed),
    }
}

/// Counts every valid record of one connection until it ends or sends invalid data.
pub async fn count_records<R>(reader: R, bank: &CounterBank) -> Result<(), SyslogError>
where
    R: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(reader, OctetCountingDecoder::default());

    while let Some(frame) = frames.next().await {
        parse_record(&frame?)?;
        bank.increment(Bucket::Logs.name());
    }

    Ok(())
}

/// Accepts syslog drain connections and counts their records.
///
/// Each connection is handled by its own task. A failing connection is closed without affecting
/// the others.
pub struct SyslogListener {
    listener: TcpListener,
    bank: Arc<CounterBank>,
}

impl SyslogListener {
    /// Binds the listener to `addr`.
    pub async fn bind(addr: SocketAddr, bank: Arc<CounterBank>) -> Result<Self, SyslogError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| SyslogError::Bind { addr, source })?;

        Ok(Self { listener, bank })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            capacity_log::info!(%addr, "syslog listener started");
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    capacity_log::debug!(%peer, "syslog connection opened");
                    let bank = Arc::clone(&self.bank);
                    tokio::spawn(async move {
                        match count_records(stream, &bank).await {
                            Ok(()) => capacity_log::debug!(%peer, "syslog connection closed"),
                            Err(error) => capacity_log::debug!(
                                %peer,
                                error = %LogError(&error),
                                "syslog connection aborted"
                            ),
                        }
                    });
                }
                Err(error) => {
                    capacity_log::warn!(error = %LogError(&error), "failed to accept syslog connection");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    use super::*;

    const RECORD: &str = "<14>1 2024-01-02T03:04:05.000000+00:00 host app-guid [APP/PROC/WEB/0] - - hello";

    fn frame(record: &str) -> String {
        format!("{} {record}", record.len())
    }

    fn bank() -> Arc<CounterBank> {
        Arc::new(CounterBank::new(["logs"]))
    }

    #[test]
    fn test_decode_frames() {
        let mut decoder = OctetCountingDecoder::default();
        let mut buf = BytesMut::from("5 hello3 abc12 partial");

        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), "hello");
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), "abc");
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b" rest");
        assert_eq!(decoder.decode(&mut buf).unwrap().unwrap(), "partial rest");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_waits_for_length() {
        let mut decoder = OctetCountingDecoder::default();
        let mut buf = BytesMut::from("12");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_length() {
        let mut decoder = OctetCountingDecoder::default();
        assert!(matches!(
            decoder.decode(&mut BytesMut::from("<14>1 2024")),
            Err(SyslogError::InvalidLength)
        ));
        assert!(matches!(
            decoder.decode(&mut BytesMut::from("123456789012345")),
            Err(SyslogError::InvalidLength)
        ));
        assert!(matches!(
            decoder.decode(&mut BytesMut::from(" hello")),
            Err(SyslogError::InvalidLength)
        ));
        assert!(matches!(
            decoder.decode(&mut BytesMut::from("99999999 x")),
            Err(SyslogError::FrameTooLarge(99_999_999))
        ));
    }

    #[test]
    fn test_parse_record() {
        parse_record(RECORD.as_bytes()).unwrap();
        assert!(matches!(
            parse_record(b"definitely not syslog"),
            Err(SyslogError::Malformed)
        ));
        assert!(matches!(
            parse_record(&[0xff, 0xfe]),
            Err(SyslogError::Malformed)
        ));
    }

    #[tokio::test]
    async fn test_count_records_stops_at_malformed() {
        let bank = bank();
        let input = format!(
            "{}{}{}{}",
            frame(RECORD),
            frame(RECORD),
            frame("garbage"),
            frame(RECORD)
        );

        let result = count_records(input.as_bytes(), &bank).await;
        assert!(matches!(result, Err(SyslogError::Malformed)));
        assert_eq!(bank.get("logs"), Some(2));
    }

    #[tokio::test]
    async fn test_count_records_until_eof() {
        let bank = bank();
        let input = format!("{}{}", frame(RECORD), frame(RECORD));

        count_records(input.as_bytes(), &bank).await.unwrap();
        assert_eq!(bank.get("logs"), Some(2));
    }

    #[tokio::test]
    async fn test_listener_isolates_connections() {
        let bank = bank();
        let listener = SyslogListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)), Arc::clone(&bank))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(listener.run());

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(b"not a frame at all").await.unwrap();

        let mut good = TcpStream::connect(addr).await.unwrap();
        for _ in 0..3 {
            good.write_all(frame(RECORD).as_bytes()).await.unwrap();
        }
        good.flush().await.unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while bank.get("logs") != Some(3) {
            assert!(tokio::time::Instant::now() < deadline, "records not counted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // The listener keeps accepting after a connection failed.
        let mut late = TcpStream::connect(addr).await.unwrap();
        late.write_all(frame(RECORD).as_bytes()).await.unwrap();
        while bank.get("logs") != Some(4) {
            assert!(tokio::time::Instant::now() < deadline, "late record not counted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        server.abort();
    }
}
