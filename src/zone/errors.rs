use thiserror::Error;

/// Zone-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
    /// Zone text could not be parsed; nothing from this zone is installed
    #[error("Zone {zone} line {line}: {message}")]
    Syntax {
        zone: String,
        line: usize,
        message: String,
    },

    #[error("Zone {zone} is not valid UTF-8 text")]
    InvalidEncoding { zone: String },

    #[error("Zone {zone} is {size} bytes, exceeds the maximum zone size")]
    TooLarge { zone: String, size: usize },

    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),
}

pub type Result<T> = std::result::Result<T, ZoneError>;
