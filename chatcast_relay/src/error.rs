// Error type for the relay library.
//
// Only setup-time failures (bind, poll creation, bad configuration) and a
// failing multiplexer escape the event loop. Everything that goes wrong on a
// single connection is logged and contained inside `server.rs`, so those
// variants never show up here.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Errors surfaced by the relay's public API.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The listening endpoint could not be created.
    #[error("could not bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The readiness multiplexer failed (creation or wait).
    #[error("readiness poll failed: {0}")]
    Poll(#[source] io::Error),

    /// A source could not be added to or updated in the watched set.
    #[error("failed to register source with poll: {0}")]
    Register(#[source] io::Error),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file could not be read.
    #[error("could not read config file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid JSON for `RelayConfig`.
    #[error("could not parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The event loop is no longer running.
    #[error("relay is not running")]
    Stopped,

    #[error(transparent)]
    Io(#[from] io::Error),
}
