use crate::error::ConfigError;
use crate::source::object_store::DEFAULT_ENDPOINT;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Bucket holding the zone objects, or a `file://`/absolute path to a
    /// local directory
    pub bucket: String,

    /// Key prefix of zone objects; stripped to obtain the zone name
    pub prefix: String,

    /// Address the DNS listeners bind to
    pub bind_ip: IpAddr,

    /// Port for both UDP and TCP
    pub port: u16,

    /// Time between timed reload cycles
    pub update_interval: Duration,

    /// Upstream resolver used for apex CNAME flattening (`host:port`)
    pub resolver: String,

    /// Timeout for one upstream exchange
    pub upstream_timeout: Duration,

    /// Object-store API endpoint
    pub endpoint: String,

    /// Bearer token for the object store
    pub token: Option<String>,

    /// HTTP listener for health, metrics and reload (None = disabled)
    pub http_bind_addr: Option<SocketAddr>,

    /// Append logs to this file instead of stdout
    pub log_file: Option<PathBuf>,

    /// Debug logging
    pub debug: bool,

    /// Idle time after which a TCP client connection is closed
    pub tcp_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: String::new(),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 53,
            update_interval: Duration::from_secs(300),
            resolver: "8.8.8.8:53".to_string(),
            upstream_timeout: Duration::from_secs(5),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: None,
            http_bind_addr: None,
            log_file: None,
            debug: false,
            tcp_idle_timeout: Duration::from_secs(10),
        }
    }
}

/// Where zones come from, derived from `bucket`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Directory(PathBuf),
    ObjectStore { endpoint: String, bucket: String },
}

/// Optional TOML configuration file; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bucket: Option<String>,
    prefix: Option<String>,
    bind: Option<IpAddr>,
    port: Option<u16>,
    update: Option<u64>,
    resolver: Option<String>,
    upstream_timeout: Option<u64>,
    endpoint: Option<String>,
    token: Option<String>,
    http: Option<String>,
    log: Option<PathBuf>,
    debug: Option<bool>,
    tcp_idle_timeout: Option<u64>,
}

impl ServerConfig {
    /// Defaults overridden by `BUCKETDNS_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply `BUCKETDNS_*` settings read through `lookup`
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup("BUCKETDNS_BUCKET") {
            self.bucket = bucket;
        }

        if let Some(prefix) = lookup("BUCKETDNS_PREFIX") {
            self.prefix = prefix;
        }

        if let Some(bind) = lookup("BUCKETDNS_BIND") {
            self.bind_ip = bind
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(bind))?;
        }

        if let Some(port) = lookup("BUCKETDNS_PORT") {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidBindAddress(format!("port {}", port)))?;
        }

        if let Some(update) = lookup("BUCKETDNS_UPDATE") {
            self.update_interval = parse_seconds(&update)?;
        }

        if let Some(resolver) = lookup("BUCKETDNS_RESOLVER") {
            self.resolver = resolver;
        }

        if let Some(timeout) = lookup("BUCKETDNS_UPSTREAM_TIMEOUT") {
            self.upstream_timeout = parse_seconds(&timeout)?;
        }

        if let Some(endpoint) = lookup("BUCKETDNS_ENDPOINT") {
            self.endpoint = endpoint;
        }

        if let Some(token) = lookup("BUCKETDNS_TOKEN") {
            self.token = (!token.is_empty()).then_some(token);
        }

        if let Some(http) = lookup("BUCKETDNS_HTTP_BIND_ADDR") {
            self.set_http_bind_addr(&http)?;
        }

        if let Some(log) = lookup("BUCKETDNS_LOG") {
            self.log_file = (!log.is_empty()).then(|| PathBuf::from(log));
        }

        if let Some(debug) = lookup("BUCKETDNS_DEBUG") {
            self.debug = parse_bool(&debug, false);
        }

        Ok(())
    }

    /// Apply settings from TOML text
    pub fn apply_toml(&mut self, text: &str) -> Result<(), ConfigError> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(bucket) = file.bucket {
            self.bucket = bucket;
        }
        if let Some(prefix) = file.prefix {
            self.prefix = prefix;
        }
        if let Some(bind) = file.bind {
            self.bind_ip = bind;
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(update) = file.update {
            self.update_interval = Duration::from_secs(update);
        }
        if let Some(resolver) = file.resolver {
            self.resolver = resolver;
        }
        if let Some(timeout) = file.upstream_timeout {
            self.upstream_timeout = Duration::from_secs(timeout);
        }
        if let Some(endpoint) = file.endpoint {
            self.endpoint = endpoint;
        }
        if file.token.is_some() {
            self.token = file.token;
        }
        if let Some(http) = file.http {
            self.set_http_bind_addr(&http)?;
        }
        if file.log.is_some() {
            self.log_file = file.log;
        }
        if let Some(debug) = file.debug {
            self.debug = debug;
        }
        if let Some(idle) = file.tcp_idle_timeout {
            self.tcp_idle_timeout = Duration::from_secs(idle);
        }
        Ok(())
    }

    pub fn load_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        self.apply_toml(&text)
    }

    /// `"disabled"` or an empty value turns the HTTP listener off
    pub fn set_http_bind_addr(&mut self, value: &str) -> Result<(), ConfigError> {
        if value.is_empty() || value.eq_ignore_ascii_case("disabled") {
            self.http_bind_addr = None;
        } else {
            self.http_bind_addr = Some(
                value
                    .parse()
                    .map_err(|_| ConfigError::InvalidHttpBindAddress(value.to_string()))?,
            );
        }
        Ok(())
    }

    pub fn source_location(&self) -> SourceLocation {
        if let Some(path) = self.bucket.strip_prefix("file://") {
            SourceLocation::Directory(PathBuf::from(path))
        } else if self.bucket.starts_with('/') {
            SourceLocation::Directory(PathBuf::from(&self.bucket))
        } else {
            SourceLocation::ObjectStore {
                endpoint: self.endpoint.clone(),
                bucket: self.bucket.clone(),
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::InvalidSource(
                "a bucket or zone directory is required".to_string(),
            ));
        }

        if self.update_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "update interval must be greater than 0".to_string(),
            ));
        }

        if self.upstream_timeout.is_zero() || self.upstream_timeout.as_secs() > 300 {
            return Err(ConfigError::ParseError(
                "upstream timeout must be between 1 and 300 seconds".to_string(),
            ));
        }

        match self.resolver.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(ConfigError::InvalidResolver(self.resolver.clone())),
        }

        if let SourceLocation::ObjectStore { endpoint, .. } = self.source_location() {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::InvalidSource(format!(
                    "endpoint must be an http(s) URL: {}",
                    endpoint
                )));
            }
        }

        Ok(())
    }
}

fn parse_seconds(value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::InvalidInterval(value.to_string()))
}

/// Parse a boolean from a string, with a default value for invalid input
pub fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
