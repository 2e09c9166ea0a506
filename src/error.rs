use thiserror::Error;

use crate::dns::ParseError;

#[derive(Error, Debug, Clone)]
pub enum DnsError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid DNS packet: {0}")]
    InvalidPacket(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Response id {got} does not match query id {expected}")]
    IdMismatch { expected: u16, got: u16 },
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::Io(err.to_string())
    }
}

impl From<ParseError> for DnsError {
    fn from(err: ParseError) -> Self {
        DnsError::InvalidPacket(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;

#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid resolver address: {0}")]
    InvalidResolver(String),

    #[error("Invalid HTTP bind address: {0}")]
    InvalidHttpBindAddress(String),

    #[error("Invalid update interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid zone source: {0}")]
    InvalidSource(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}
