use std::collections::BTreeMap;
use std::future::Future;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use url::Url;

/// Failure to hand an envelope to the ingress endpoint. The envelope is dropped.
#[derive(Debug, thiserror::Error)]
pub enum IngressError {
    /// The envelope batch could not be serialized.
    #[error("failed to serialize envelope batch")]
    Serialize(#[from] serde_json::Error),
    /// The ingress endpoint could not be reached.
    #[error("could not reach ingress endpoint")]
    Transport(#[from] reqwest::Error),
    /// The ingress endpoint responded with a status outside of `2xx`.
    #[error("ingress endpoint responded with status {0}")]
    UnexpectedStatus(StatusCode),
    /// The ingress address cannot be used.
    #[error("invalid ingress address")]
    InvalidAddress(#[from] url::ParseError),
    /// The ingress endpoint did not answer in time.
    #[error("emitting timed out")]
    Timeout,
}

/// The envelope format written to the ingress endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApiVersion {
    /// Tags are written in the legacy `deprecated_tags` form.
    V1,
    /// Tags are written as plain string tags.
    #[default]
    V2,
}

impl ApiVersion {
    /// The name of the version, as reported in the `api_version` tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

/// A legacy tag value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LegacyTag {
    /// The textual value.
    pub text: String,
}

/// The payload of an outgoing envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressMessage {
    /// A counter increment of one.
    Counter {
        /// The counter name.
        name: String,
        /// The increment, as a decimal string.
        delta: String,
    },
    /// A structured event.
    Event {
        /// The event title.
        title: String,
        /// The event body.
        body: String,
    },
}

/// An envelope written to the ingress endpoint.
///
/// The JSON shape matches the envelopes served by the log stream gateway, so emitted envelopes
/// can be counted by the stream consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IngressEnvelope {
    /// Creation time in nanoseconds since the epoch, as a decimal string.
    pub timestamp: String,
    /// The emitting source.
    pub source_id: String,
    /// Tags of [`ApiVersion::V2`] envelopes.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Tags of [`ApiVersion::V1`] envelopes.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub deprecated_tags: BTreeMap<String, LegacyTag>,
    /// The payload.
    #[serde(flatten)]
    pub message: IngressMessage,
}

#[derive(Serialize)]
struct Batch<'a> {
    batch: [&'a IngressEnvelope; 1],
}

/// Writes envelopes into the logging platform.
pub trait IngressClient: Send + Sync {
    /// Emits a counter increment of one for `name`.
    fn emit_counter(&self, name: &str) -> impl Future<Output = Result<(), IngressError>> + Send;

    /// Emits an event.
    fn emit_event(
        &self,
        title: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), IngressError>> + Send;
}

/// Posts envelopes to the `/v2/write` endpoint of an ingress gateway.
///
/// Every envelope is sent in its own request as `{"batch": [<envelope>]}`.
#[derive(Clone, Debug)]
pub struct HttpIngressClient {
    client: reqwest::Client,
    url: Url,
    source_id: String,
    version: ApiVersion,
    tags: BTreeMap<String, String>,
}

impl HttpIngressClient {
    /// Creates a client for the gateway at `ingress`, emitting as `source_id`.
    ///
    /// The client carries the request timeout.
    pub fn new(
        client: reqwest::Client,
        ingress: &str,
        source_id: impl Into<String>,
        version: ApiVersion,
    ) -> Result<Self, IngressError> {
        let url = Url::parse(&format!("{}/v2/write", ingress.trim_end_matches('/')))?;

        Ok(Self {
            client,
            url,
            source_id: source_id.into(),
            version,
            tags: BTreeMap::new(),
        })
    }

    /// Attaches a tag to every emitted envelope.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// The URL envelopes are posted to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Builds an envelope with this client's source and tags.
    pub fn envelope(&self, message: IngressMessage, timestamp: i64) -> IngressEnvelope {
        let (tags, deprecated_tags) = match self.version {
            ApiVersion::V1 => {
                let legacy = self
                    .tags
                    .iter()
                    .map(|(key, value)| (key.clone(), LegacyTag { text: value.clone() }))
                    .collect();
                (BTreeMap::new(), legacy)
            }
            ApiVersion::V2 => (self.tags.clone(), BTreeMap::new()),
        };

        IngressEnvelope {
            timestamp: timestamp.to_string(),
            source_id: self.source_id.clone(),
            tags,
            deprecated_tags,
            message,
        }
    }

    async fn write(&self, message: IngressMessage) -> Result<(), IngressError> {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let envelope = self.envelope(message, now);
        let body = serde_json::to_vec(&Batch { batch: [&envelope] })?;

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngressError::UnexpectedStatus(status));
        }

        Ok(())
    }
}

impl IngressClient for HttpIngressClient {
    fn emit_counter(&self, name: &str) -> impl Future<Output = Result<(), IngressError>> + Send {
        self.write(IngressMessage::Counter {
            name: name.to_owned(),
            delta: "1".to_owned(),
        })
    }

    fn emit_event(
        &self,
        title: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), IngressError>> + Send {
        self.write(IngressMessage::Event {
            title: title.to_owned(),
            body: body.to_owned(),
        })
    }
}
