use std::future::Future;
use std::io;

use bytes::BytesMut;
use capacity_auth::Token;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;
use url::Url;

use crate::StreamEnvelope;

/// Upper bound for a single line of the event stream.
const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// A terminal failure of an event stream connection.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The gateway could not be reached.
    #[error("could not connect to event stream")]
    Transport(#[from] reqwest::Error),
    /// The gateway refused the subscription.
    #[error("event stream responded with status {0}")]
    UnexpectedStatus(StatusCode),
    /// The connection failed or violated the framing while reading.
    #[error("event stream read failed")]
    Io(#[from] io::Error),
    /// The gateway address cannot be used.
    #[error("invalid event stream address")]
    InvalidAddress(#[from] url::ParseError),
}

/// One unit of an open event stream.
#[derive(Debug)]
pub enum StreamFrame {
    /// Envelopes to classify. Envelopes that could not be decoded are already dropped.
    Batch(Vec<StreamEnvelope>),
    /// A keep-alive without content.
    Heartbeat,
    /// The gateway ends the stream.
    Closing,
}

/// The frames of one open connection.
pub type FrameStream = BoxStream<'static, Result<StreamFrame, StreamError>>;

/// Opens authenticated event stream connections.
pub trait StreamConnector: Send + Sync {
    /// Opens a new connection using `token` as credential.
    fn connect(&self, token: &Token) -> impl Future<Output = Result<FrameStream, StreamError>> + Send;
}

/// Message types requested from the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    /// Log lines.
    Log,
    /// Counter events.
    Counter,
    /// Structured events.
    Event,
}

impl Selector {
    fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Counter => "counter",
            Self::Event => "event",
        }
    }
}

/// Connects to the `/v2/read` endpoint of a log stream gateway.
///
/// The gateway streams server-sent events, each carrying a JSON batch of envelopes. An event
/// named `closing` ends the stream.
#[derive(Clone, Debug)]
pub struct GatewayConnector {
    client: reqwest::Client,
    url: Url,
}

impl GatewayConnector {
    /// Creates a connector for the gateway at `gateway`.
    ///
    /// Consumers with the same `shard_id` split the stream between them. If `source_id` is set,
    /// only envelopes of that source are requested.
    pub fn new(
        client: reqwest::Client,
        gateway: &str,
        shard_id: &str,
        source_id: Option<&str>,
        selectors: &[Selector],
    ) -> Result<Self, StreamError> {
        let mut url = Url::parse(&format!("{}/v2/read", gateway.trim_end_matches('/')))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("shard_id", shard_id);
            if let Some(source_id) = source_id {
                query.append_pair("source_id", source_id);
            }
            for selector in selectors {
                query.append_key_only(selector.as_str());
            }
        }

        Ok(Self { client, url })
    }

    /// The full subscription URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn open(&self, token: &Token) -> Result<FrameStream, StreamError> {
        let response = self
            .client
            .get(self.url.clone())
            .header(AUTHORIZATION, token.header_value())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::UnexpectedStatus(status));
        }

        let reader = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
        let frames = FramedRead::new(reader, SseDecoder::default())
            .map_ok(StreamFrame::from_event)
            .map_err(StreamError::from);

        Ok(frames.boxed())
    }
}

impl StreamConnector for GatewayConnector {
    fn connect(&self, token: &Token) -> impl Future<Output = Result<FrameStream, StreamError>> + Send {
        self.open(token)
    }
}

/// A decoded server-sent event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The event name, if set.
    pub event: Option<String>,
    /// The data lines joined by newlines.
    pub data: String,
}

#[derive(Deserialize)]
struct Batch {
    #[serde(default)]
    batch: Vec<serde_json::Value>,
}

impl StreamFrame {
    /// Interprets a server-sent event of the gateway.
    pub fn from_event(event: SseEvent) -> Self {
        match event.event.as_deref() {
            Some("closing") => return Self::Closing,
            Some("heartbeat") => return Self::Heartbeat,
            _ => (),
        }

        let batch = match serde_json::from_str::<Batch>(&event.data) {
            Ok(batch) => batch.batch,
            Err(error) => {
                capacity_log::debug!(error = %error, "dropping undecodable envelope batch");
                return Self::Batch(Vec::new());
            }
        };

        let envelopes = batch
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(envelope) => Some(envelope),
                Err(error) => {
                    capacity_log::debug!(error = %error, "dropping undecodable envelope");
                    None
                }
            })
            .collect();

        Self::Batch(envelopes)
    }
}

/// Decodes a `text/event-stream` body into [`SseEvent`]s.
///
/// Lines are split by a [`LinesCodec`] capped at [`MAX_LINE_LENGTH`]. Comment lines and fields
/// other than `event` and `data` are ignored. Events without data and without a name are not
/// emitted.
#[derive(Debug)]
pub struct SseDecoder {
    lines: LinesCodec,
    event: Option<String>,
    data: Option<String>,
}

impl SseDecoder {
    /// Creates a decoder that fails on lines longer than `max_length` bytes.
    pub fn with_max_line_length(max_length: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max_length),
            event: None,
            data: None,
        }
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => {
                let data = self.data.get_or_insert_with(String::new);
                if !data.is_empty() {
                    data.push('\n');
                }
                data.push_str(value);
            }
            _ => (),
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let data = self.data.take();

        if event.is_none() && data.is_none() {
            return None;
        }

        Some(SseEvent {
            event,
            data: data.unwrap_or_default(),
        })
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }
}

fn line_error(error: LinesCodecError) -> io::Error {
    match error {
        LinesCodecError::Io(error) => error,
        LinesCodecError::MaxLineLengthExceeded => io::Error::new(
            io::ErrorKind::InvalidData,
            "event stream line exceeds maximum length",
        ),
    }
}

impl Decoder for SseDecoder {
    type Item = SseEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(line) = self.lines.decode(src).map_err(line_error)? {
            if let Some(event) = self.process_line(&line) {
                return Ok(Some(event));
            }
        }

        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A trailing line without newline still belongs to the last event.
        while let Some(line) = self.lines.decode_eof(src).map_err(line_error)? {
            if let Some(event) = self.process_line(&line) {
                return Ok(Some(event));
            }
        }

        Ok(self.dispatch())
    }
}
