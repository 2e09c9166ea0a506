use bucketdns::{
    config::{ServerConfig, SourceLocation},
    flatten::CnameFlattener,
    http_server::HttpServer,
    metrics::ServerMetrics,
    query::QueryEngine,
    reload::{ReloadCoordinator, ReloadRequest},
    resolver::UdpUpstream,
    server::{run_tcp_server, run_udp_server},
    source::{DirectorySource, ObjectStoreSource, ZoneSource},
    zone::{AuthoritativeResponder, ZoneStore},
};
use clap::Parser;
use std::fs::OpenOptions;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Authoritative DNS server for zones kept in an object-store bucket
#[derive(Parser, Debug)]
#[command(name = "bucketdns", version, about)]
struct Cli {
    /// Bucket name, or file:// / absolute path of a zone directory
    bucket: Option<String>,

    /// Seconds between zone update checks
    #[arg(short = 'u', long = "update")]
    update: Option<u64>,

    /// Port to listen on (UDP and TCP)
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// IP address to bind to
    #[arg(short = 'b', long)]
    bind: Option<IpAddr>,

    /// Key prefix of zone objects in the bucket
    #[arg(short = 'f', long)]
    prefix: Option<String>,

    /// Upstream resolver for apex CNAME flattening (host:port)
    #[arg(short = 'r', long)]
    resolver: Option<String>,

    /// Append logs to this file
    #[arg(short = 'l', long)]
    log: Option<PathBuf>,

    /// Object-store API endpoint
    #[arg(short = 'e', long)]
    endpoint: Option<String>,

    /// Bearer token for the object store
    #[arg(long, env = "BUCKETDNS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Address for the health/metrics/reload HTTP listener
    #[arg(long)]
    http: Option<String>,

    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short = 'd', long)]
    debug: bool,
}

impl Cli {
    fn apply_to(&self, config: &mut ServerConfig) -> Result<(), BoxError> {
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        if let Some(update) = self.update {
            config.update_interval = Duration::from_secs(update);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind_ip = bind;
        }
        if let Some(prefix) = &self.prefix {
            config.prefix = prefix.clone();
        }
        if let Some(resolver) = &self.resolver {
            config.resolver = resolver.clone();
        }
        if let Some(log) = &self.log {
            config.log_file = Some(log.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(http) = &self.http {
            config.set_http_bind_addr(http)?;
        }
        if self.debug {
            config.debug = true;
        }
        Ok(())
    }
}

fn build_config(cli: &Cli) -> Result<ServerConfig, BoxError> {
    let mut config = ServerConfig::default();
    if let Some(path) = &cli.config {
        config.load_file(path)?;
    }
    config.apply_env()?;
    cli.apply_to(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &ServerConfig) -> Result<(), BoxError> {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}

fn build_source(config: &ServerConfig) -> Result<Arc<dyn ZoneSource>, BoxError> {
    Ok(match config.source_location() {
        SourceLocation::Directory(path) => Arc::new(DirectorySource::new(path)),
        SourceLocation::ObjectStore { endpoint, bucket } => Arc::new(ObjectStoreSource::new(
            &endpoint,
            &bucket,
            config.token.clone(),
        )?),
    })
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    init_tracing(&config)?;

    info!("Starting BucketDNS v{}", bucketdns::VERSION);

    let metrics = Arc::new(ServerMetrics::new()?);
    let store = Arc::new(ZoneStore::new());
    let source = build_source(&config)?;
    info!("Serving zones from {}", source.describe());

    let mut coordinator = ReloadCoordinator::new(
        source,
        store.clone(),
        config.prefix.clone(),
        config.update_interval,
    )
    .with_metrics(metrics.clone());

    // Nothing is served until the full catalog has loaded
    let report = coordinator.initial_load().await?;
    info!("Loaded {} zone(s): {}", report.installed.len(), report.installed.join(", "));
    let reload = coordinator.handle();

    let upstream = UdpUpstream::new(config.resolver.clone()).with_timeout(config.upstream_timeout);
    let engine = Arc::new(QueryEngine::new(
        store.clone(),
        CnameFlattener::new(Arc::new(upstream)),
    ));
    let responder = Arc::new(AuthoritativeResponder::new(engine, metrics.clone()));

    let bind_addr = config.bind_addr();
    let udp_socket = UdpSocket::bind(bind_addr).await?;
    let tcp_listener = TcpListener::bind(bind_addr).await?;

    let mut udp_task = tokio::spawn(run_udp_server(
        udp_socket,
        responder.clone(),
        metrics.clone(),
    ));
    let mut tcp_task = tokio::spawn(run_tcp_server(
        tcp_listener,
        responder,
        metrics.clone(),
        config.tcp_idle_timeout,
    ));
    let mut reload_task = tokio::spawn(coordinator.run());

    if let Some(http_addr) = config.http_bind_addr {
        let http = HttpServer::new(store.clone(), metrics.clone(), reload.clone(), http_addr);
        tokio::spawn(async move {
            if let Err(e) = http.start().await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    metrics.record_started();
    info!("BucketDNS listening on {}", bind_addr);

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                match reload.request() {
                    ReloadRequest::Queued => info!("SIGHUP received, reloading zones"),
                    ReloadRequest::Coalesced => info!("SIGHUP received, reload already pending"),
                    ReloadRequest::Stopped => warn!("SIGHUP received but reloads have stopped"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, exiting");
                return Ok(());
            }
            _ = terminate.recv() => {
                info!("Terminated, exiting");
                return Ok(());
            }
            result = &mut reload_task => {
                // Reload failures are fatal: the zone set can no longer be trusted
                return match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        error!("Zone reload failed, exiting: {}", e);
                        Err(e.into())
                    }
                    Err(e) => Err(e.into()),
                };
            }
            result = &mut udp_task => {
                error!("UDP server stopped");
                return result?;
            }
            result = &mut tcp_task => {
                error!("TCP server stopped");
                return result?;
            }
        }
    }
}
