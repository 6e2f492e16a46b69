//! Gateway errors

use thiserror::Error;

/// Configuration problems detected before any socket or task exists
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Gateway name must not be empty")]
    EmptyName,

    #[error("Invalid {field}: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    #[error("max_registered_connections must be at least 1")]
    NoRegisteredConnections,

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("ECU #{0} has no name")]
    UnnamedEcu(usize),

    #[error("ECU {ecu}: invalid lookup entry '{entry}': {reason}")]
    InvalidLookup {
        ecu: String,
        entry: String,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gateway already started")]
    AlreadyStarted,
}
