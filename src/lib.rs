pub mod config;
pub mod dns;
pub mod error;
pub mod flatten;
pub mod http_server;
pub mod metrics;
pub mod query;
pub mod reload;
pub mod resolver;
pub mod server;
pub mod source;
pub mod zone;

pub use dns::DNSPacket;

/// Version reported by the `. TXT` probe and the health endpoint
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Product name returned alongside the version
pub const PRODUCT: &str = "BucketDNS";
