use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use capacity_config::{Config, OverridableConfig};
use clap::ArgMatches;
use tokio::task::JoinSet;

use crate::cliapp::make_app;
use crate::commands::Command;
use crate::setup;

/// The config folder used when none is given.
const DEFAULT_CONFIG_PATH: &str = ".capacity";

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();

    let (name, sub_matches) = matches.subcommand().context("no command given")?;
    let command = Command::from_name(name).with_context(|| format!("unknown command {name}"))?;

    let config_path = sub_matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(DEFAULT_CONFIG_PATH), PathBuf::as_path);
    let mut config = Config::from_path(config_path)?;
    config.apply_override(extract_config_args(sub_matches))?;

    capacity_log::init(config.logging());
    run(command, config)
}

/// Extract config arguments from a parsed command line arguments object.
///
/// Arguments the command does not define are treated as absent.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    let get = |id: &str| {
        matches
            .try_get_one::<String>(id)
            .ok()
            .flatten()
            .cloned()
    };

    OverridableConfig {
        uaa_addr: get("uaa_addr"),
        client_id: get("client_id"),
        client_secret: get("client_secret"),
        gateway_url: get("gateway_url"),
        shard_id: get("shard_id"),
        source_id: get("source_id"),
        counter_origin: get("counter_origin"),
        event_title: get("event_title"),
        host: get("host"),
        port: get("port"),
        backend_url: get("backend_url"),
        api_key: get("api_key"),
        interval: get("interval"),
        job_name: get("job_name"),
        instance_id: get("instance_id"),
        reporter_host: get("reporter_host"),
        logs_per_second: get("logs_per_second"),
        log_bytes: get("log_bytes"),
        ingress_url: get("ingress_url"),
        api_version: get("api_version"),
        origin: get("origin"),
        metrics_per_second: get("metrics_per_second"),
        emit_interval: get("emit_interval"),
        event_body: get("event_body"),
    }
}

/// Validates the config and runs the command until interrupted.
pub fn run(command: Command, config: Config) -> Result<()> {
    setup::check_config(&config, command)?;
    setup::dump_spawn_infos(&config, command);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("capacity")
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async {
        let mut tasks = JoinSet::new();
        command.spawn(&config, &mut tasks).await?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for interrupts")?;
                capacity_log::info!("received interrupt, shutting down");
                Ok(())
            }
            Some(result) = tasks.join_next() => {
                result.context("task failed")?;
                Err(anyhow!("{} stopped unexpectedly", command.name()))
            }
        }
    })
}
