use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use capacity_log::LogConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(&'static str),
}

/// The kind of a [`ConfigError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
    /// One or more settings required by the selected command have no value.
    #[error("missing required settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: Some(Box::new(inner)),
        }
    }

    #[inline]
    fn for_field<E>(inner: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(inner, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name);
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> &ConfigErrorKind {
        &self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {})", self.kind, name),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

trait ConfigObject: DeserializeOwned + Default {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    ///
    /// A missing file yields the default configuration.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path));
            }
        };

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables.
///
/// Empty values are treated as absent.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The URL of the UAA token issuer.
    pub uaa_addr: Option<String>,
    /// The client ID used for authentication.
    pub client_id: Option<String>,
    /// The client secret used for authentication.
    pub client_secret: Option<String>,
    /// The URL of the log stream gateway.
    pub gateway_url: Option<String>,
    /// The shard ID shared by all consumers of one subscription.
    pub shard_id: Option<String>,
    /// Restricts the stream to a single source.
    pub source_id: Option<String>,
    /// The origin whose counter events are counted as metrics.
    pub counter_origin: Option<String>,
    /// The title of events that are counted.
    pub event_title: Option<String>,
    /// The bind address of the syslog listener.
    pub host: Option<String>,
    /// The port of the syslog listener.
    pub port: Option<String>,
    /// The base URL of the metrics backend.
    pub backend_url: Option<String>,
    /// The API key of the metrics backend.
    pub api_key: Option<String>,
    /// The reporting interval in seconds.
    pub interval: Option<String>,
    /// The job name attached to all reported points.
    pub job_name: Option<String>,
    /// The instance identifier attached to all reported points.
    pub instance_id: Option<String>,
    /// The host name sent with every series.
    pub reporter_host: Option<String>,
    /// The number of synthetic log lines written per second.
    pub logs_per_second: Option<String>,
    /// The length of each synthetic log line in bytes.
    pub log_bytes: Option<String>,
    /// The base URL of the ingress endpoint.
    pub ingress_url: Option<String>,
    /// The envelope format written to the ingress endpoint, `v1` or `v2`.
    pub api_version: Option<String>,
    /// The origin tag of emitted counters.
    pub origin: Option<String>,
    /// The number of counters emitted per second.
    pub metrics_per_second: Option<String>,
    /// The time between two emitted events in milliseconds.
    pub emit_interval: Option<String>,
    /// The body of emitted events.
    pub event_body: Option<String>,
}

/// A setting that a command may require to be present.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Setting {
    /// `auth.issuer`.
    UaaAddr,
    /// `auth.client_id`.
    ClientId,
    /// `auth.client_secret`.
    ClientSecret,
    /// `stream.gateway`.
    GatewayUrl,
    /// `stream.source_id`.
    SourceId,
    /// `stream.counter_origin`.
    CounterOrigin,
    /// `stream.event_title`.
    EventTitle,
    /// `ingress.url`.
    IngressUrl,
    /// `ingress.origin`.
    Origin,
    /// `reporter.api_key`.
    ApiKey,
    /// `reporter.job_name`.
    JobName,
    /// `reporter.instance_id`.
    InstanceId,
}

impl Setting {
    /// Returns the name of the command line flag that sets this value.
    pub fn name(self) -> &'static str {
        match self {
            Self::UaaAddr => "uaa-addr",
            Self::ClientId => "client-id",
            Self::ClientSecret => "client-secret",
            Self::GatewayUrl => "gateway-url",
            Self::SourceId => "source-id",
            Self::CounterOrigin => "counter-origin",
            Self::EventTitle => "event-title",
            Self::IngressUrl => "ingress-url",
            Self::Origin => "origin",
            Self::ApiKey => "datadog-api-key",
            Self::JobName => "job-name",
            Self::InstanceId => "instance-id",
        }
    }
}

/// Controls the outbound HTTP clients.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Http {
    /// Total timeout of a request in seconds.
    pub timeout: u64,
    /// Timeout for establishing a connection in seconds.
    pub connection_timeout: u64,
    /// Accept invalid TLS certificates from the token issuer and the gateway.
    pub insecure_skip_verify: bool,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            timeout: 30,
            connection_timeout: 3,
            insecure_skip_verify: false,
        }
    }
}

/// Client credentials for the token issuer.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Auth {
    /// The URL of the UAA token issuer.
    pub issuer: Option<Url>,
    /// The client ID.
    pub client_id: Option<String>,
    /// The client secret.
    pub client_secret: Option<String>,
}

/// The retry policy of the stream consumer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Always wait `initial` between attempts.
    Fixed,
    /// Double the delay after each failure, up to `max`.
    Exponential,
}

/// Delays between reconnection attempts.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackoffConfig {
    /// The retry policy.
    pub kind: BackoffKind,
    /// The first delay in milliseconds.
    pub initial: u64,
    /// The upper bound for exponential delays in milliseconds.
    pub max: u64,
}

impl BackoffConfig {
    /// The first delay.
    pub fn initial(&self) -> Duration {
        Duration::from_millis(self.initial)
    }

    /// The upper bound for exponential delays.
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max.max(self.initial))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            kind: BackoffKind::Fixed,
            initial: 1000,
            max: 60_000,
        }
    }
}

/// The shard ID of the firehose counter and the log emitter when none is configured.
///
/// The event counter defaults to a shard of its own instead.
pub const DEFAULT_SHARD_ID: &str = "capacity-planning";

/// The event stream subscription.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Stream {
    /// The URL of the log stream gateway.
    pub gateway: Option<Url>,
    /// Consumers with the same shard ID split the stream between them.
    pub shard_id: Option<String>,
    /// Restricts the stream to a single source.
    pub source_id: Option<String>,
    /// Counter events from exactly this origin are counted as metrics.
    pub counter_origin: Option<String>,
    /// Events with exactly this title are counted.
    pub event_title: Option<String>,
    /// Logs containing this text are counted by the log emitter.
    pub log_filter: Option<String>,
    /// Delays between reconnection attempts.
    pub backoff: BackoffConfig,
}


/// The envelope format written to the ingress endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IngressApi {
    /// Tags in the legacy format.
    V1,
    /// Plain string tags.
    #[default]
    V2,
}

impl std::str::FromStr for IngressApi {
    type Err = InvalidIngressApi;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "v1" => Ok(Self::V1),
            "v2" => Ok(Self::V2),
            _ => Err(InvalidIngressApi),
        }
    }
}

/// Error returned for an unknown ingress API version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("api version must be 'v1' or 'v2'")]
pub struct InvalidIngressApi;

/// The endpoint the emitters write envelopes to.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Ingress {
    /// The base URL of the ingress endpoint.
    pub url: Option<Url>,
    /// The envelope format.
    pub api_version: IngressApi,
    /// The origin tag of emitted counters.
    pub origin: Option<String>,
}

/// The syslog drain listener.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Syslog {
    /// The address to bind to.
    pub host: IpAddr,
    /// The port to bind to.
    pub port: u16,
}

impl Default for Syslog {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

/// The metrics backend used when none is configured.
pub const DEFAULT_BACKEND: &str = "https://app.datadoghq.com";

/// Periodic delivery of counters to the metrics backend.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Reporter {
    /// The base URL of the metrics backend. Defaults to [`DEFAULT_BACKEND`].
    pub backend: Option<Url>,
    /// The API key of the metrics backend.
    pub api_key: Option<String>,
    /// The reporting interval in seconds.
    pub interval: u64,
    /// The job name attached to all points.
    pub job_name: Option<String>,
    /// The instance identifier attached to all points.
    pub instance_id: Option<String>,
    /// The host sent with every series. Defaults to the machine's host name.
    pub host: Option<String>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self {
            backend: None,
            api_key: None,
            interval: 60,
            job_name: None,
            instance_id: None,
            host: None,
        }
    }
}

/// The synthetic log, metric and event writers.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Emitter {
    /// Lines written per second.
    pub logs_per_second: u64,
    /// Length of each line in bytes.
    pub log_bytes: usize,
    /// Counters emitted per second.
    pub metrics_per_second: u64,
    /// Time between two events in milliseconds.
    pub emit_interval: u64,
    /// The body of emitted events.
    pub event_body: String,
}

impl Default for Emitter {
    fn default() -> Self {
        Self {
            logs_per_second: 1000,
            log_bytes: 1000,
            metrics_per_second: 1000,
            emit_interval: 1000,
            event_body: String::new(),
        }
    }
}

/// All values of the configuration file.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ConfigValues {
    /// Logging setup.
    pub logging: LogConfig,
    /// Outbound HTTP clients.
    pub http: Http,
    /// Client credentials.
    pub auth: Auth,
    /// Event stream subscription.
    pub stream: Stream,
    /// Envelope ingress of the emitters.
    pub ingress: Ingress,
    /// Syslog listener.
    pub syslog: Syslog,
    /// Metrics delivery.
    pub reporter: Reporter,
    /// Synthetic log writer.
    pub emitter: Emitter,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn parse_url(value: &str, field: &'static str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|err| ConfigError::for_field(err, field))
}

/// Config struct.
#[derive(Debug, Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// A folder without `config.yml` yields the default configuration.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Creates a config from already parsed values.
    ///
    /// This is mostly useful for tests.
    pub fn from_values(values: ConfigValues) -> Self {
        Self {
            values,
            path: PathBuf::new(),
        }
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let auth = &mut self.values.auth;
        if let Some(uaa_addr) = non_empty(overrides.uaa_addr) {
            auth.issuer = Some(parse_url(&uaa_addr, "uaa_addr")?);
        }
        if let Some(client_id) = non_empty(overrides.client_id) {
            auth.client_id = Some(client_id);
        }
        if let Some(client_secret) = non_empty(overrides.client_secret) {
            auth.client_secret = Some(client_secret);
        }

        let stream = &mut self.values.stream;
        if let Some(gateway_url) = non_empty(overrides.gateway_url) {
            stream.gateway = Some(parse_url(&gateway_url, "gateway_url")?);
        }
        if let Some(shard_id) = non_empty(overrides.shard_id) {
            stream.shard_id = Some(shard_id);
        }
        if let Some(source_id) = non_empty(overrides.source_id) {
            stream.source_id = Some(source_id);
        }
        if let Some(counter_origin) = non_empty(overrides.counter_origin) {
            stream.counter_origin = Some(counter_origin);
        }
        if let Some(event_title) = non_empty(overrides.event_title) {
            stream.event_title = Some(event_title);
        }

        let ingress = &mut self.values.ingress;
        if let Some(ingress_url) = non_empty(overrides.ingress_url) {
            ingress.url = Some(parse_url(&ingress_url, "ingress_url")?);
        }
        if let Some(api_version) = non_empty(overrides.api_version) {
            ingress.api_version = api_version
                .parse()
                .map_err(|err| ConfigError::for_field(err, "api_version"))?;
        }
        if let Some(origin) = non_empty(overrides.origin) {
            ingress.origin = Some(origin);
        }

        let syslog = &mut self.values.syslog;
        if let Some(host) = non_empty(overrides.host) {
            syslog.host = host
                .parse::<IpAddr>()
                .map_err(|err| ConfigError::for_field(err, "host"))?;
        }
        if let Some(port) = non_empty(overrides.port) {
            syslog.port = port
                .parse()
                .map_err(|err| ConfigError::for_field(err, "port"))?;
        }

        let reporter = &mut self.values.reporter;
        if let Some(backend_url) = non_empty(overrides.backend_url) {
            reporter.backend = Some(parse_url(&backend_url, "backend_url")?);
        }
        if let Some(api_key) = non_empty(overrides.api_key) {
            reporter.api_key = Some(api_key);
        }
        if let Some(interval) = non_empty(overrides.interval) {
            reporter.interval = interval
                .parse()
                .map_err(|err| ConfigError::for_field(err, "interval"))?;
            if reporter.interval == 0 {
                return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("interval"));
            }
        }
        if let Some(job_name) = non_empty(overrides.job_name) {
            reporter.job_name = Some(job_name);
        }
        if let Some(instance_id) = non_empty(overrides.instance_id) {
            reporter.instance_id = Some(instance_id);
        }
        if let Some(host) = non_empty(overrides.reporter_host) {
            reporter.host = Some(host);
        }

        let emitter = &mut self.values.emitter;
        if let Some(logs_per_second) = non_empty(overrides.logs_per_second) {
            emitter.logs_per_second = logs_per_second
                .parse()
                .map_err(|err| ConfigError::for_field(err, "logs_per_second"))?;
        }
        if let Some(log_bytes) = non_empty(overrides.log_bytes) {
            emitter.log_bytes = log_bytes
                .parse()
                .map_err(|err| ConfigError::for_field(err, "log_bytes"))?;
        }
        if let Some(metrics_per_second) = non_empty(overrides.metrics_per_second) {
            emitter.metrics_per_second = metrics_per_second
                .parse()
                .map_err(|err| ConfigError::for_field(err, "metrics_per_second"))?;
        }
        if let Some(emit_interval) = non_empty(overrides.emit_interval) {
            emitter.emit_interval = emit_interval
                .parse()
                .map_err(|err| ConfigError::for_field(err, "emit_interval"))?;
            if emitter.emit_interval == 0 {
                return Err(ConfigError::new(ConfigErrorKind::InvalidValue).field("emit_interval"));
            }
        }
        if let Some(event_body) = non_empty(overrides.event_body) {
            emitter.event_body = event_body;
        }

        Ok(self)
    }

    /// Checks that all given settings have a value.
    ///
    /// Fails once with the complete list of missing settings, in the given order.
    pub fn require(&self, settings: &[Setting]) -> Result<(), ConfigError> {
        let missing: Vec<_> = settings
            .iter()
            .filter(|setting| self.is_missing(**setting))
            .map(|setting| setting.name())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::new(ConfigErrorKind::MissingSettings(missing)))
        }
    }

    fn is_missing(&self, setting: Setting) -> bool {
        let value = match setting {
            Setting::UaaAddr => self.uaa_addr().map(Url::as_str),
            Setting::ClientId => self.client_id(),
            Setting::ClientSecret => self.client_secret(),
            Setting::GatewayUrl => self.gateway_url().map(Url::as_str),
            Setting::SourceId => self.source_id(),
            Setting::CounterOrigin => self.counter_origin(),
            Setting::EventTitle => self.event_title(),
            Setting::IngressUrl => self.ingress_url().map(Url::as_str),
            Setting::Origin => self.origin(),
            Setting::ApiKey => self.api_key(),
            Setting::JobName => self.job_name(),
            Setting::InstanceId => self.instance_id(),
        };

        value.is_none_or(str::is_empty)
    }

    /// The folder this config was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Total timeout of outbound HTTP requests.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.timeout)
    }

    /// Timeout for establishing outbound connections.
    pub fn http_connection_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.connection_timeout)
    }

    /// Returns `true` if invalid TLS certificates are accepted.
    pub fn insecure_skip_verify(&self) -> bool {
        self.values.http.insecure_skip_verify
    }

    /// The URL of the token issuer.
    pub fn uaa_addr(&self) -> Option<&Url> {
        self.values.auth.issuer.as_ref()
    }

    /// The client ID used for authentication.
    pub fn client_id(&self) -> Option<&str> {
        self.values.auth.client_id.as_deref()
    }

    /// The client secret used for authentication.
    pub fn client_secret(&self) -> Option<&str> {
        self.values.auth.client_secret.as_deref()
    }

    /// The URL of the log stream gateway.
    pub fn gateway_url(&self) -> Option<&Url> {
        self.values.stream.gateway.as_ref()
    }

    /// The configured stream shard ID.
    ///
    /// Commands pick their own default when this is not set, see [`DEFAULT_SHARD_ID`].
    pub fn shard_id(&self) -> Option<&str> {
        self.values.stream.shard_id.as_deref()
    }

    /// The source the stream is restricted to.
    pub fn source_id(&self) -> Option<&str> {
        self.values.stream.source_id.as_deref()
    }

    /// The origin of counted counter events.
    pub fn counter_origin(&self) -> Option<&str> {
        self.values.stream.counter_origin.as_deref()
    }

    /// The title of counted events.
    pub fn event_title(&self) -> Option<&str> {
        self.values.stream.event_title.as_deref()
    }

    /// The text that counted logs contain.
    pub fn log_filter(&self) -> Option<&str> {
        self.values.stream.log_filter.as_deref()
    }

    /// Delays between reconnection attempts.
    pub fn backoff(&self) -> &BackoffConfig {
        &self.values.stream.backoff
    }

    /// The base URL of the ingress endpoint.
    pub fn ingress_url(&self) -> Option<&Url> {
        self.values.ingress.url.as_ref()
    }

    /// The envelope format written to the ingress endpoint.
    pub fn ingress_api(&self) -> IngressApi {
        self.values.ingress.api_version
    }

    /// The origin tag of emitted counters.
    pub fn origin(&self) -> Option<&str> {
        self.values.ingress.origin.as_deref()
    }

    /// The bind address of the syslog listener.
    pub fn syslog_addr(&self) -> SocketAddr {
        SocketAddr::new(self.values.syslog.host, self.values.syslog.port)
    }

    /// The base URL of the metrics backend.
    pub fn backend_url(&self) -> &str {
        match &self.values.reporter.backend {
            Some(url) => url.as_str(),
            None => DEFAULT_BACKEND,
        }
    }

    /// The API key of the metrics backend.
    pub fn api_key(&self) -> Option<&str> {
        self.values.reporter.api_key.as_deref()
    }

    /// The reporting interval.
    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.values.reporter.interval.max(1))
    }

    /// The job name attached to all points.
    pub fn job_name(&self) -> Option<&str> {
        self.values.reporter.job_name.as_deref()
    }

    /// The instance identifier attached to all points.
    pub fn instance_id(&self) -> Option<&str> {
        self.values.reporter.instance_id.as_deref()
    }

    /// The host sent with every series.
    ///
    /// Falls back to the machine's host name, or an empty string if that cannot be determined.
    pub fn reporter_host(&self) -> String {
        if let Some(host) = &self.values.reporter.host {
            return host.clone();
        }

        hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_default()
    }

    /// Synthetic log lines written per second.
    pub fn logs_per_second(&self) -> u64 {
        self.values.emitter.logs_per_second
    }

    /// Length of each synthetic log line in bytes.
    pub fn log_bytes(&self) -> usize {
        self.values.emitter.log_bytes
    }

    /// Counters emitted per second.
    pub fn metrics_per_second(&self) -> u64 {
        self.values.emitter.metrics_per_second
    }

    /// Time between two emitted events.
    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.values.emitter.emit_interval.max(1))
    }

    /// The body of emitted events.
    pub fn event_body(&self) -> &str {
        &self.values.emitter.event_body
    }

    /// Returns `true` if this instance should read back its own logs.
    ///
    /// Only the first instance of a deployment reads, so that received counts are not multiplied.
    pub fn read_own_logs(&self) -> bool {
        self.instance_id() == Some("0")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use capacity_log::LogLevel;

    use super::*;

    fn write_config(dir: &Path, contents: &str) {
        let mut file = fs::File::create(dir.join("config.yml")).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(dir.path()).unwrap();

        assert_eq!(config.shard_id(), None);
        assert_eq!(config.report_interval(), Duration::from_secs(60));
        assert_eq!(config.backend_url(), "https://app.datadoghq.com");
        assert_eq!(config.syslog_addr(), SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.backoff().kind, BackoffKind::Fixed);
        assert_eq!(config.backoff().initial(), Duration::from_secs(1));
        assert_eq!(config.logs_per_second(), 1000);
        assert_eq!(config.log_bytes(), 1000);
        assert_eq!(config.metrics_per_second(), 1000);
        assert_eq!(config.emit_interval(), Duration::from_secs(1));
        assert_eq!(config.event_body(), "");
        assert_eq!(config.ingress_api(), IngressApi::V2);
        assert!(config.ingress_url().is_none());
        assert!(config.uaa_addr().is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "logging:\n  level: debug\n\
             auth:\n  issuer: https://uaa.example.com\n  client_id: reader\n\
             stream:\n  backoff:\n    kind: exponential\n    max: 5000\n\
             reporter:\n  interval: 10\n",
        );

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.logging().level, LogLevel::Debug);
        assert_eq!(
            config.uaa_addr().map(Url::as_str),
            Some("https://uaa.example.com/")
        );
        assert_eq!(config.client_id(), Some("reader"));
        assert_eq!(config.backoff().kind, BackoffKind::Exponential);
        assert_eq!(config.backoff().initial(), Duration::from_secs(1));
        assert_eq!(config.backoff().max(), Duration::from_secs(5));
        assert_eq!(config.report_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_bad_yaml_names_file() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "reporter: [unclosed");

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), &ConfigErrorKind::BadYaml);
        assert!(error.to_string().starts_with("could not parse yaml config file (file "));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                uaa_addr: Some("https://uaa.example.com".to_owned()),
                client_secret: Some("secret".to_owned()),
                gateway_url: Some("https://gateway.example.com".to_owned()),
                port: Some("9090".to_owned()),
                job_name: Some("".to_owned()),
                instance_id: Some("0".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.client_secret(), Some("secret"));
        assert_eq!(config.syslog_addr().port(), 9090);
        assert_eq!(config.job_name(), None);
        assert!(config.read_own_logs());
    }

    #[test]
    fn test_override_invalid_port() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                port: Some("eighty".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), &ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field port)");
    }

    #[test]
    fn test_override_zero_interval() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                interval: Some("0".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.to_string(), "invalid config value (field interval)");
    }

    #[test]
    fn test_require_lists_all_missing() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                client_id: Some("reader".to_owned()),
                ..Default::default()
            })
            .unwrap();

        let error = config
            .require(&[
                Setting::GatewayUrl,
                Setting::ApiKey,
                Setting::UaaAddr,
                Setting::ClientId,
                Setting::ClientSecret,
            ])
            .unwrap_err();

        assert_eq!(
            error.to_string(),
            "missing required settings: gateway-url, datadog-api-key, uaa-addr, client-secret"
        );
    }

    #[test]
    fn test_load_ingress_section() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "ingress:\n  url: https://ingress.example.com\n  api_version: v1\n  origin: emitter\n\
             stream:\n  shard_id: readers\n\
             emitter:\n  emit_interval: 250\n  event_body: started\n",
        );

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(
            config.ingress_url().map(Url::as_str),
            Some("https://ingress.example.com/")
        );
        assert_eq!(config.ingress_api(), IngressApi::V1);
        assert_eq!(config.origin(), Some("emitter"));
        assert_eq!(config.shard_id(), Some("readers"));
        assert_eq!(config.emit_interval(), Duration::from_millis(250));
        assert_eq!(config.event_body(), "started");
        config.require(&[Setting::IngressUrl, Setting::Origin]).unwrap();
    }

    #[test]
    fn test_override_emitters() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                ingress_url: Some("http://127.0.0.1:3458".to_owned()),
                api_version: Some("v1".to_owned()),
                metrics_per_second: Some("50".to_owned()),
                emit_interval: Some("20".to_owned()),
                shard_id: Some("readers".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.ingress_api(), IngressApi::V1);
        assert_eq!(config.metrics_per_second(), 50);
        assert_eq!(config.emit_interval(), Duration::from_millis(20));
        assert_eq!(config.shard_id(), Some("readers"));
    }

    #[test]
    fn test_override_invalid_api_version() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                api_version: Some("v3".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.to_string(), "invalid config value (field api_version)");
        assert_eq!(
            error.source().map(ToString::to_string).as_deref(),
            Some("api version must be 'v1' or 'v2'")
        );
    }

    #[test]
    fn test_override_zero_emit_interval() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                emit_interval: Some("0".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.to_string(), "invalid config value (field emit_interval)");
    }

    #[test]
    fn test_require_satisfied() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                api_key: Some("key".to_owned()),
                job_name: Some("counter".to_owned()),
                instance_id: Some("1".to_owned()),
                ..Default::default()
            })
            .unwrap();

        config
            .require(&[Setting::ApiKey, Setting::JobName, Setting::InstanceId])
            .unwrap();
        assert!(!config.read_own_logs());
    }

    #[test]
    fn test_reporter_host_override() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                reporter_host: Some("api.example.com".to_owned()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(config.reporter_host(), "api.example.com");
    }
}
