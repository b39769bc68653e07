use std::time::Duration;

use anyhow::{Context, Result};
use capacity_config::{BackoffConfig, BackoffKind, Config, IngressApi};
use capacity_reporter::ReporterIdentity;
use capacity_stream::{ApiVersion, Backoff, Constant, ExponentialBackoff};

use crate::commands::Command;

/// Validates that all settings required by `command` are present.
pub fn check_config(config: &Config, command: Command) -> Result<()> {
    config.require(&command.required_settings(config))?;
    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config, command: Command) {
    if config.path().as_os_str().is_empty() {
        capacity_log::info!("launching capacity without config folder");
    } else {
        capacity_log::info!(
            "launching capacity from config folder {}",
            config.path().display()
        );
    }
    capacity_log::info!("  command: {}", command.name());
    capacity_log::info!("  job name: {}", config.job_name().unwrap_or("-"));
    capacity_log::info!("  instance id: {}", config.instance_id().unwrap_or("-"));
    capacity_log::info!("  metrics backend: {}", config.backend_url());
    capacity_log::info!("  report interval: {}s", config.report_interval().as_secs());
    capacity_log::info!("  log level: {}", config.logging().level);
}

/// Creates the client for short requests to the token issuer and the metrics backend.
pub fn http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.http_timeout())
        .connect_timeout(config.http_connection_timeout())
        .danger_accept_invalid_certs(config.insecure_skip_verify())
        .build()
        .context("failed to create http client")
}

/// Creates the client for the long-lived event stream.
///
/// Only connecting is bounded. Once open, the stream is read until the server ends it.
pub fn stream_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.http_connection_timeout())
        .danger_accept_invalid_certs(config.insecure_skip_verify())
        .build()
        .context("failed to create stream client")
}

/// Builds the reporter's identifying tags.
pub fn reporter_identity(config: &Config) -> Result<ReporterIdentity> {
    Ok(ReporterIdentity {
        host: config.reporter_host(),
        job_name: config.job_name().context("missing job name")?.to_owned(),
        instance_id: config
            .instance_id()
            .context("missing instance id")?
            .to_owned(),
    })
}

/// The envelope format the emitters write.
pub fn api_version(config: &Config) -> ApiVersion {
    match config.ingress_api() {
        IngressApi::V1 => ApiVersion::V1,
        IngressApi::V2 => ApiVersion::V2,
    }
}

/// The configured delays between reconnection attempts of a stream consumer.
pub enum RetryPolicy {
    /// The same delay after every failure.
    Fixed(Constant),
    /// Growing delays up to a maximum.
    Exponential(ExponentialBackoff),
}

impl RetryPolicy {
    pub fn from_config(config: &BackoffConfig) -> Self {
        match config.kind {
            BackoffKind::Fixed => Self::Fixed(capacity_stream::fixed(config.initial())),
            BackoffKind::Exponential => Self::Exponential(capacity_stream::exponential(
                config.initial(),
                config.max(),
            )),
        }
    }
}

impl Backoff for RetryPolicy {
    fn reset(&mut self) {
        match self {
            Self::Fixed(policy) => policy.reset(),
            Self::Exponential(policy) => policy.reset(),
        }
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        match self {
            Self::Fixed(policy) => policy.next_backoff(),
            Self::Exponential(policy) => policy.next_backoff(),
        }
    }
}
