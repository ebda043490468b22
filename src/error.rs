//! Unified error types for virtnet

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for virtnet operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Command errors
    #[error("{action} failed on '{interface}': {output}")]
    CommandFailed {
        action: String,
        interface: String,
        output: String,
    },

    #[error("Failed to execute '{command}': {source}")]
    CommandSpawn { command: String, source: io::Error },

    // Precondition errors
    #[error("Guest '{0}' is not running; it must be running to bring its networking online")]
    GuestNotRunning(String),

    #[error("Network device '{0}' has no resolvable network")]
    NetworkUnresolved(String),

    #[error("Network '{0}' not found")]
    NetworkNotFound(String),

    #[error("Network device '{0}' not found")]
    DeviceNotFound(String),

    #[error("Network '{0}' is online; stop it first or use --force")]
    NetworkOnline(String),

    #[error("{kind} device ID {device_id} is already in use")]
    DuplicateDeviceId { kind: &'static str, device_id: u32 },

    #[error("Network name '{0}' is already in use")]
    DuplicateNetworkName(String),

    #[error("Invalid address '{0}': expected an IP address or CIDR network")]
    InvalidAddress(String),

    // Persistence errors
    #[error("Failed to read store '{path}': {source}")]
    StoreRead { path: PathBuf, source: io::Error },

    #[error("Failed to write store '{path}': {source}")]
    StoreWrite { path: PathBuf, source: io::Error },

    #[error("Failed to parse store '{path}': {source}")]
    StoreParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for virtnet operations
pub type Result<T> = std::result::Result<T, Error>;
