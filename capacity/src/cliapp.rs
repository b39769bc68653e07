//! This module implements the definition of the command line app.

use clap::builder::ValueParser;
use clap::{Arg, Command, ValueHint};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Counts logs, metrics and events of a logging platform";

fn auth_args() -> [Arg; 3] {
    [
        Arg::new("uaa_addr")
            .long("uaa-addr")
            .value_name("URL")
            .value_hint(ValueHint::Url)
            .env("CAPACITY_UAA_ADDR")
            .help("The URL of the UAA token issuer."),
        Arg::new("client_id")
            .long("client-id")
            .value_name("ID")
            .env("CAPACITY_CLIENT_ID")
            .help("The client ID used to fetch tokens."),
        Arg::new("client_secret")
            .long("client-secret")
            .value_name("SECRET")
            .env("CAPACITY_CLIENT_SECRET")
            .hide_env_values(true)
            .help("The client secret used to fetch tokens."),
    ]
}

fn stream_args() -> [Arg; 3] {
    [
        Arg::new("gateway_url")
            .long("gateway-url")
            .value_name("URL")
            .value_hint(ValueHint::Url)
            .env("CAPACITY_GATEWAY_URL")
            .help("The URL of the log stream gateway."),
        Arg::new("shard_id")
            .long("shard-id")
            .value_name("ID")
            .env("CAPACITY_SHARD_ID")
            .help("Consumers sharing a shard ID split the stream between them."),
        Arg::new("source_id")
            .long("source-id")
            .value_name("ID")
            .env("CAPACITY_SOURCE_ID")
            .help("Only read envelopes of this source."),
    ]
}

fn ingress_arg() -> Arg {
    Arg::new("ingress_url")
        .long("ingress-url")
        .value_name("URL")
        .value_hint(ValueHint::Url)
        .env("CAPACITY_INGRESS_URL")
        .help("The base URL of the envelope ingress endpoint.")
}

fn event_title_arg() -> Arg {
    Arg::new("event_title")
        .long("event-title")
        .value_name("TITLE")
        .env("EVENT_TITLE")
}

fn reporter_args() -> [Arg; 6] {
    [
        Arg::new("backend_url")
            .long("backend-url")
            .value_name("URL")
            .value_hint(ValueHint::Url)
            .env("DATADOG_URL")
            .help("The base URL of the metrics backend."),
        Arg::new("api_key")
            .long("datadog-api-key")
            .value_name("KEY")
            .env("DATADOG_API_KEY")
            .hide_env_values(true)
            .help("The API key of the metrics backend."),
        Arg::new("interval")
            .long("interval")
            .value_name("SECONDS")
            .env("REPORT_INTERVAL")
            .help("Seconds between two reports."),
        Arg::new("job_name")
            .long("job-name")
            .value_name("NAME")
            .env("JOB_NAME")
            .help("The job name attached to every reported point."),
        Arg::new("instance_id")
            .long("instance-id")
            .value_name("ID")
            .env("INSTANCE_ID")
            .help("The instance index attached to every reported point."),
        Arg::new("reporter_host")
            .long("reporter-host")
            .value_name("HOST")
            .env("REPORTER_HOST")
            .help("The host sent with every series. Defaults to the machine's host name."),
    ]
}

pub fn make_app() -> Command {
    Command::new("capacity")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .propagate_version(true)
        .max_term_width(79)
        .help_expected(true)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("DIR")
                .value_hint(ValueHint::DirPath)
                .value_parser(ValueParser::path_buf())
                .env("CAPACITY_CONFIG")
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("firehose-counter")
                .about("Count logs and counter events of the log stream")
                .args(auth_args())
                .args(stream_args())
                .arg(
                    Arg::new("counter_origin")
                        .long("counter-origin")
                        .value_name("ORIGIN")
                        .env("CAPACITY_COUNTER_ORIGIN")
                        .help("Counter events from this origin are counted as metrics."),
                )
                .args(reporter_args()),
        )
        .subcommand(
            Command::new("event-counter")
                .about("Count events with a given title on the log stream")
                .args(auth_args())
                .args(stream_args())
                .arg(event_title_arg().help("Events with exactly this title are counted."))
                .args(reporter_args()),
        )
        .subcommand(
            Command::new("syslog-counter")
                .about("Count records received from syslog drains")
                .arg(
                    Arg::new("host")
                        .long("host")
                        .value_name("IP")
                        .env("SYSLOG_HOST")
                        .help("The address to listen on."),
                )
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_name("PORT")
                        .env("PORT")
                        .help("The port to listen on."),
                )
                .args(reporter_args()),
        )
        .subcommand(
            Command::new("log-emitter")
                .about("Write synthetic log lines and count them as they arrive")
                .after_help(
                    "Only the instance with ID 0 reads the log stream. All other instances \
                     only write.",
                )
                .arg(
                    Arg::new("logs_per_second")
                        .long("logs-per-second")
                        .value_name("RATE")
                        .env("LOGS_PER_SECOND")
                        .help("Lines written per second."),
                )
                .arg(
                    Arg::new("log_bytes")
                        .long("log-bytes")
                        .value_name("BYTES")
                        .env("LOG_BYTES")
                        .help("Length of each line in bytes."),
                )
                .args(auth_args())
                .args(stream_args())
                .args(reporter_args()),
        )
        .subcommand(
            Command::new("metric-emitter")
                .about("Emit counter envelopes at a fixed rate and count them")
                .arg(ingress_arg())
                .arg(
                    Arg::new("api_version")
                        .long("api-version")
                        .value_name("VERSION")
                        .value_parser(["v1", "v2"])
                        .env("API_VERSION")
                        .help("The envelope format to write."),
                )
                .arg(
                    Arg::new("origin")
                        .long("origin")
                        .value_name("ORIGIN")
                        .env("ORIGIN")
                        .help("The origin tag of every emitted counter."),
                )
                .arg(
                    Arg::new("metrics_per_second")
                        .long("metrics-per-second")
                        .value_name("RATE")
                        .env("METRICS_PER_SECOND")
                        .help("Counters emitted per second."),
                )
                .args(reporter_args()),
        )
        .subcommand(
            Command::new("event-emitter")
                .about("Emit events at a fixed interval and count them")
                .arg(ingress_arg())
                .arg(event_title_arg().help("The title of every emitted event."))
                .arg(
                    Arg::new("event_body")
                        .long("event-body")
                        .value_name("BODY")
                        .env("EVENT_BODY")
                        .help("The body of every emitted event."),
                )
                .arg(
                    Arg::new("emit_interval")
                        .long("emit-interval")
                        .value_name("MILLISECONDS")
                        .env("EMIT_INTERVAL")
                        .help("Milliseconds between two events."),
                )
                .args(reporter_args()),
        )
}
