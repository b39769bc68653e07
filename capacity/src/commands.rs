use std::sync::Arc;

use anyhow::{Context, Result};
use capacity_auth::UaaTokenSource;
use capacity_config::{Config, DEFAULT_SHARD_ID, Setting};
use capacity_counters::CounterBank;
use capacity_reporter::{BankPoints, DatadogSink, MetricReporter};
use capacity_stream::{
    EventClassifier, EventEmitter, EventTitleClassifier, FirehoseClassifier, GatewayConnector,
    HttpIngressClient, LogContentClassifier, LogWriter, MetricEmitter, Selector, StreamConsumer,
    SyslogListener,
};
use tokio::task::JoinSet;

use crate::setup::{self, RetryPolicy};

/// Tag key distinguishing the buckets of one bank.
const EVENT_TYPE: &str = "event_type";

/// The subcommands of the command line app.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    FirehoseCounter,
    EventCounter,
    SyslogCounter,
    LogEmitter,
    MetricEmitter,
    EventEmitter,
}

impl Command {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "firehose-counter" => Self::FirehoseCounter,
            "event-counter" => Self::EventCounter,
            "syslog-counter" => Self::SyslogCounter,
            "log-emitter" => Self::LogEmitter,
            "metric-emitter" => Self::MetricEmitter,
            "event-emitter" => Self::EventEmitter,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FirehoseCounter => "firehose-counter",
            Self::EventCounter => "event-counter",
            Self::SyslogCounter => "syslog-counter",
            Self::LogEmitter => "log-emitter",
            Self::MetricEmitter => "metric-emitter",
            Self::EventEmitter => "event-emitter",
        }
    }

    /// Settings that must be present to run this command.
    pub fn required_settings(self, config: &Config) -> Vec<Setting> {
        const STREAM: [Setting; 4] = [
            Setting::UaaAddr,
            Setting::ClientId,
            Setting::ClientSecret,
            Setting::GatewayUrl,
        ];
        const REPORTER: [Setting; 3] = [Setting::ApiKey, Setting::JobName, Setting::InstanceId];

        let mut settings = Vec::new();
        match self {
            Self::FirehoseCounter => {
                settings.extend(STREAM);
                settings.push(Setting::CounterOrigin);
            }
            Self::EventCounter => {
                settings.extend(STREAM);
                settings.push(Setting::EventTitle);
            }
            Self::SyslogCounter => (),
            Self::LogEmitter => {
                if config.read_own_logs() {
                    settings.extend(STREAM);
                    settings.push(Setting::SourceId);
                }
            }
            Self::MetricEmitter => settings.extend([Setting::IngressUrl, Setting::Origin]),
            Self::EventEmitter => settings.extend([Setting::IngressUrl, Setting::EventTitle]),
        }
        settings.extend(REPORTER);
        settings
    }

    /// Spawns the producer and reporter tasks of this command.
    pub async fn spawn(self, config: &Config, tasks: &mut JoinSet<()>) -> Result<()> {
        match self {
            Self::FirehoseCounter => spawn_firehose_counter(config, tasks),
            Self::EventCounter => spawn_event_counter(config, tasks),
            Self::SyslogCounter => spawn_syslog_counter(config, tasks).await,
            Self::LogEmitter => spawn_log_emitter(config, tasks),
            Self::MetricEmitter => spawn_metric_emitter(config, tasks),
            Self::EventEmitter => spawn_event_emitter(config, tasks),
        }
    }
}

fn token_source(config: &Config, client: reqwest::Client) -> Result<UaaTokenSource> {
    let issuer = config.uaa_addr().context("missing token issuer")?;
    let client_id = config.client_id().context("missing client id")?;
    let client_secret = config.client_secret().context("missing client secret")?;

    Ok(UaaTokenSource::new(
        client,
        issuer.as_str(),
        client_id,
        client_secret,
    ))
}

/// The shard of an event counter.
///
/// Without a configured shard every process gets a shard of its own, so that each instance sees
/// every event.
fn event_counter_shard(config: &Config) -> String {
    match config.shard_id() {
        Some(shard_id) => shard_id.to_owned(),
        None => {
            let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
            nanos.to_string()
        }
    }
}

fn gateway_connector(
    config: &Config,
    shard_id: &str,
    source_id: Option<&str>,
    selectors: &[Selector],
) -> Result<GatewayConnector> {
    let gateway = config.gateway_url().context("missing gateway url")?;
    let connector = GatewayConnector::new(
        setup::stream_client(config)?,
        gateway.as_str(),
        shard_id,
        source_id,
        selectors,
    )?;

    capacity_log::info!(url = %connector.url(), shard_id, "reading from log stream gateway");
    Ok(connector)
}

/// Spawns a consumer of the log stream that counts into a new bank.
fn spawn_consumer<K>(
    config: &Config,
    client: reqwest::Client,
    connector: GatewayConnector,
    classifier: K,
    tasks: &mut JoinSet<()>,
) -> Result<Arc<CounterBank>>
where
    K: EventClassifier + 'static,
{
    let bank = Arc::new(CounterBank::new(classifier.buckets()));
    let consumer = StreamConsumer::new(
        token_source(config, client)?,
        connector,
        classifier,
        Arc::clone(&bank),
        RetryPolicy::from_config(config.backoff()),
    );

    tasks.spawn(consumer.run());
    Ok(bank)
}

fn reporter(config: &Config, client: reqwest::Client) -> Result<MetricReporter<DatadogSink>> {
    let api_key = config.api_key().context("missing metrics backend api key")?;
    let sink = DatadogSink::new(client, config.backend_url(), api_key);

    Ok(MetricReporter::new(
        sink,
        setup::reporter_identity(config)?,
        config.report_interval(),
    ))
}

fn spawn_firehose_counter(config: &Config, tasks: &mut JoinSet<()>) -> Result<()> {
    let client = setup::http_client(config)?;
    let origin = config.counter_origin().context("missing counter origin")?;

    let connector = gateway_connector(
        config,
        config.shard_id().unwrap_or(DEFAULT_SHARD_ID),
        config.source_id(),
        &[Selector::Log, Selector::Counter],
    )?;
    let bank = spawn_consumer(
        config,
        client.clone(),
        connector,
        FirehoseClassifier::new(origin),
        tasks,
    )?;

    let reporter = reporter(config, client)?.with_source(
        BankPoints::new(bank, "capacity_planning.received").with_tag_key(EVENT_TYPE),
    );
    tasks.spawn(reporter.run());

    Ok(())
}

fn spawn_event_counter(config: &Config, tasks: &mut JoinSet<()>) -> Result<()> {
    let client = setup::http_client(config)?;
    let title = config.event_title().context("missing event title")?;

    let shard_id = event_counter_shard(config);
    let connector = gateway_connector(config, &shard_id, config.source_id(), &[Selector::Event])?;
    let bank = spawn_consumer(
        config,
        client.clone(),
        connector,
        EventTitleClassifier::new(title),
        tasks,
    )?;

    let reporter =
        reporter(config, client)?.with_source(BankPoints::new(bank, "v2_event_counter.read"));
    tasks.spawn(reporter.run());

    Ok(())
}

async fn spawn_syslog_counter(config: &Config, tasks: &mut JoinSet<()>) -> Result<()> {
    let client = setup::http_client(config)?;
    let bank = Arc::new(CounterBank::new(["logs"]));

    let listener = SyslogListener::bind(config.syslog_addr(), Arc::clone(&bank)).await?;
    tasks.spawn(listener.run());

    let reporter = reporter(config, client)?.with_source(
        BankPoints::new(bank, "capacity_planning.syslog-drain-received")
            .with_tag_key(EVENT_TYPE),
    );
    tasks.spawn(reporter.run());

    Ok(())
}

fn spawn_log_emitter(config: &Config, tasks: &mut JoinSet<()>) -> Result<()> {
    let client = setup::http_client(config)?;
    let app_name = config.job_name().context("missing job name")?;

    let sent = Arc::new(CounterBank::new(["logs"]));
    let writer = LogWriter::new(
        tokio::io::stdout(),
        config.log_bytes(),
        config.logs_per_second(),
        Arc::clone(&sent),
    );

    let mut reporter = reporter(config, client.clone())?.with_source(
        BankPoints::new(sent, "capacity_planning.sent")
            .with_tag(app_name)
            .with_tag_key(EVENT_TYPE),
    );

    if config.read_own_logs() {
        let needle = match config.log_filter() {
            Some(filter) => filter.as_bytes().to_vec(),
            None => writer.message().to_vec(),
        };

        let connector = gateway_connector(
            config,
            config.shard_id().unwrap_or(DEFAULT_SHARD_ID),
            config.source_id(),
            &[Selector::Log],
        )?;
        let received = spawn_consumer(
            config,
            client,
            connector,
            LogContentClassifier::new(needle),
            tasks,
        )?;

        reporter = reporter.with_source(
            BankPoints::new(received, "capacity_planning.received")
                .with_tag(app_name)
                .with_tag_key(EVENT_TYPE),
        );
    } else {
        capacity_log::info!("not reading own logs, only instance 0 reads");
    }

    tasks.spawn(writer.run());
    tasks.spawn(reporter.run());

    Ok(())
}

fn ingress_client(config: &Config, source_id: &str) -> Result<HttpIngressClient> {
    let ingress = config.ingress_url().context("missing ingress url")?;
    let client = HttpIngressClient::new(
        setup::http_client(config)?,
        ingress.as_str(),
        source_id,
        setup::api_version(config),
    )?;

    capacity_log::info!(url = %client.url(), "writing to ingress endpoint");
    Ok(client)
}

fn spawn_metric_emitter(config: &Config, tasks: &mut JoinSet<()>) -> Result<()> {
    let origin = config.origin().context("missing origin")?;
    let api_version = setup::api_version(config);

    let client = ingress_client(config, origin)?.with_tag("origin", origin);
    let sent = Arc::new(CounterBank::new(["metrics"]));
    let emitter = MetricEmitter::new(client, config.metrics_per_second(), Arc::clone(&sent));

    let reporter = reporter(config, setup::http_client(config)?)?.with_source(
        BankPoints::new(sent, "capacity_planning.sent")
            .with_tag(format!("api_version:{}", api_version.as_str()))
            .with_tag_key(EVENT_TYPE),
    );

    tasks.spawn(emitter.run());
    tasks.spawn(reporter.run());

    Ok(())
}

fn spawn_event_emitter(config: &Config, tasks: &mut JoinSet<()>) -> Result<()> {
    let title = config.event_title().context("missing event title")?;
    let job_name = config.job_name().context("missing job name")?;

    let sent = Arc::new(CounterBank::new(["events"]));
    let emitter = EventEmitter::new(
        ingress_client(config, job_name)?,
        config.emit_interval(),
        title,
        config.event_body(),
        Arc::clone(&sent),
    );

    let reporter = reporter(config, setup::http_client(config)?)?
        .with_source(BankPoints::new(sent, "event_emitter.sent"));

    tasks.spawn(emitter.run());
    tasks.spawn(reporter.run());

    Ok(())
}
