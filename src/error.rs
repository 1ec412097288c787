use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::handle::ObjectKind;

/// Result type for plotting session operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while talking to the plotting process
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to connect to {}: {source}", endpoint.display())]
    Connection {
        endpoint: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no plotting process named '{name}' found after {attempts} attempts")]
    ProcessNotFound { name: String, attempts: u32 },

    #[error("failed to launch plotting process: {0}")]
    LaunchFailed(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("command '{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("{message} (remote error {code})")]
    Remote { code: i32, message: String },

    #[error("session is closed")]
    SessionClosed,

    #[error("handle '{id}' belongs to a session that is no longer connected")]
    StaleHandle { id: String },

    #[error("another call is already in flight on this session")]
    CallInProgress,

    #[error("object '{id}' is a {found}, expected {expected}")]
    WrongKind {
        id: String,
        expected: ObjectKind,
        found: ObjectKind,
    },

    #[error("command '{command}' returned {found}, expected {expected}")]
    UnexpectedResult {
        command: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("invalid value for option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    #[error("export to {} failed: {message}", path.display())]
    ExportFailed { path: PathBuf, message: String },

    #[error("invalid protocol: {0}")]
    Protocol(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether this error means the underlying connection is unusable
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Error::ConnectionLost(_))
    }
}
