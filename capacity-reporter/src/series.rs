use std::future::Future;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use crate::{MetricKind, MetricPoint};

/// One series of the backend payload, holding a single point.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Series {
    /// The metric name.
    pub metric: String,
    /// `[timestamp, value]` pairs.
    pub points: Vec<[i64; 2]>,
    /// The metric kind.
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// The reporting host.
    pub host: String,
    /// Tags in `key:value` form.
    pub tags: Vec<String>,
}

/// The body of a series submission.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SeriesPayload {
    /// All series of this submission.
    pub series: Vec<Series>,
}

impl SeriesPayload {
    /// Builds a payload with one series per point.
    ///
    /// Every point is stamped with `now`, the wall-clock time of the tick.
    pub fn new(points: Vec<MetricPoint>, host: &str, now: i64) -> Self {
        let series = points
            .into_iter()
            .map(|point| Series {
                metric: point.name,
                points: vec![[now, point.value]],
                kind: point.kind,
                host: host.to_owned(),
                tags: point.tags,
            })
            .collect();

        Self { series }
    }

    /// The number of series.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// Returns `true` if the payload holds no series.
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Failure to deliver a payload. The payload is dropped.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The payload could not be serialized.
    #[error("failed to serialize series payload")]
    Serialize(#[from] serde_json::Error),
    /// The backend could not be reached.
    #[error("could not reach metrics backend")]
    Transport(#[from] reqwest::Error),
    /// The backend responded with a status outside of `2xx`.
    #[error("metrics backend responded with status {status}")]
    UnexpectedStatus {
        /// The response status.
        status: StatusCode,
        /// The response body, if it could be read.
        body: String,
    },
}

/// Delivers series payloads.
pub trait SeriesSink: Send + Sync {
    /// Sends one payload. Implementations do not retry.
    fn send(&self, payload: &SeriesPayload) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Posts series to a Datadog compatible backend.
#[derive(Clone)]
pub struct DatadogSink {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl DatadogSink {
    /// Creates a sink for the backend at `backend`.
    ///
    /// The client carries the request timeout.
    pub fn new(client: reqwest::Client, backend: &str, api_key: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/v1/series", backend.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }

    /// The URL series are posted to, without the API key.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, payload: &SeriesPayload) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(payload)?;

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("api_key", &self.api_key)])
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::UnexpectedStatus { status, body });
        }

        Ok(())
    }
}

impl SeriesSink for DatadogSink {
    fn send(&self, payload: &SeriesPayload) -> impl Future<Output = Result<(), DeliveryError>> + Send {
        self.post(payload)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use capacity_test::MockUpstream;

    use super::*;

    fn payload() -> SeriesPayload {
        let points = vec![
            MetricPoint::gauge("capacity_planning.received", 5)
                .with_tag("event_type:logs")
                .with_tag("job_name:counter"),
            MetricPoint {
                kind: MetricKind::Counter,
                ..MetricPoint::gauge("capacity_planning.sent", 2)
            },
        ];

        SeriesPayload::new(points, "cell-1", 1_700_000_000)
    }

    #[test]
    fn test_payload_shape() {
        insta::assert_json_snapshot!(payload(), @r#"
        {
          "series": [
            {
              "metric": "capacity_planning.received",
              "points": [
                [
                  1700000000,
                  5
                ]
              ],
              "type": "gauge",
              "host": "cell-1",
              "tags": [
                "event_type:logs",
                "job_name:counter"
              ]
            },
            {
              "metric": "capacity_planning.sent",
              "points": [
                [
                  1700000000,
                  2
                ]
              ],
              "type": "count",
              "host": "cell-1",
              "tags": []
            }
          ]
        }
        "#);
    }

    #[test]
    fn test_points_share_tick_time() {
        let payload = payload();

        assert_eq!(payload.len(), 2);
        assert!(payload.series.iter().all(|series| series.points[0][0] == 1_700_000_000));
    }

    #[test]
    fn test_endpoint() {
        let sink = DatadogSink::new(reqwest::Client::new(), "https://app.datadoghq.com/", "key");
        assert_eq!(sink.endpoint(), "https://app.datadoghq.com/api/v1/series");
    }

    #[tokio::test]
    async fn test_send() {
        capacity_test::setup();
        let upstream = MockUpstream::start().await;
        let sink = DatadogSink::new(reqwest::Client::new(), &upstream.url(), "secret-key");

        sink.send(&payload()).await.unwrap();

        let received = upstream.wait_for_series(1, Duration::from_secs(5)).await;
        assert_eq!(received[0].query["api_key"], "secret-key");
        similar_asserts::assert_eq!(received[0].body, serde_json::to_value(payload()).unwrap());
    }

    #[tokio::test]
    async fn test_send_rejected() {
        capacity_test::setup();
        let upstream = MockUpstream::start().await;
        upstream.push_series_status(StatusCode::SERVICE_UNAVAILABLE);
        let sink = DatadogSink::new(reqwest::Client::new(), &upstream.url(), "secret-key");

        let error = sink.send(&payload()).await.unwrap_err();
        assert!(matches!(
            error,
            DeliveryError::UnexpectedStatus { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE
        ));
        assert_eq!(
            error.to_string(),
            "metrics backend responded with status 503 Service Unavailable"
        );
    }

    #[tokio::test]
    async fn test_send_unreachable() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let sink = DatadogSink::new(
            reqwest::Client::new(),
            &format!("http://127.0.0.1:{port}"),
            "key",
        );

        let error = sink.send(&payload()).await.unwrap_err();
        assert!(matches!(error, DeliveryError::Transport(_)));
    }
}
