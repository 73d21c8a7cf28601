//! Sentinel Watch Error Hierarchy
//!
//! Defines the error types surfaced by the watcher and its collaborators,
//! categorized by the layer that produced them.

use std::time::Duration;

use config::ConfigError;

use crate::resp::ParseError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Master resolution failures (no agreed master available)
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Transport failures talking to a single sentinel
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Malformed or unexpected data on the wire
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Watcher is already initialized")]
    AlreadyInitialized,

    #[error("Watcher is not initialized")]
    NotInitialized,

    /// Release called on a resource that was already released
    #[error("{0} is already closed")]
    AlreadyClosed(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The resolver was configured without any sentinel address
    #[error("No sentinel address configured")]
    NoSentinels,

    /// Sentinels answered but none of them knows the master
    #[error("Master {master_name:?} is not monitored by any reachable sentinel")]
    MasterNotFound { master_name: String },

    /// Sentinels disagree, or too few agree on one address
    #[error("Quorum not reached for master {master_name:?} (votes: {votes}, quorum: {quorum})")]
    NoQuorum {
        master_name: String,
        votes: usize,
        quorum: usize,
    },

    #[error("All sentinels specified in configuration are unreachable (master: {master_name:?})")]
    AllSentinelsUnreachable { master_name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// TCP connection could not be established
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection timeout to {addr} after {duration:?}")]
    ConnectTimeout { addr: String, duration: Duration },

    #[error("Request to {addr} timed out after {duration:?}")]
    RequestTimeout { addr: String, duration: Duration },

    /// Peer closed the connection mid-conversation
    #[error("Connection to {addr} closed by peer")]
    ConnectionClosed { addr: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid RESP data: {0}")]
    Parse(#[from] ParseError),

    /// Error reply sent back by the sentinel (`-ERR ...`)
    #[error("Sentinel replied with error: {0}")]
    Server(String),

    #[error("Unexpected reply to {command}: {reply}")]
    UnexpectedReply { command: &'static str, reply: String },

    /// `+switch-master` payload that does not carry five fields
    #[error("Malformed +switch-master payload: {0:?}")]
    MalformedEvent(String),
}

impl Error {
    /// Whether this error means no master could be agreed on, as opposed to a
    /// transport or usage failure
    pub fn is_discovery(&self) -> bool {
        matches!(self, Error::Discovery(_))
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Protocol(ProtocolError::Parse(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Network(NetworkError::Io(e))
    }
}
