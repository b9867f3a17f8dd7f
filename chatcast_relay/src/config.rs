// Relay configuration.
//
// `RelayConfig` carries every knob the event loop reads at startup. Values
// come from three layers, lowest precedence first: `Default`, an optional
// JSON file (`from_json_file`, missing keys fall back to defaults), and CLI
// flags applied by `main.rs`. Capacity is fixed for the lifetime of the
// process; the connection table never resizes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use chatcast_protocol::Framing;
use serde::Deserialize;

use crate::error::RelayError;

/// Configuration for starting a relay server.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Interface to bind. Defaults to all interfaces.
    pub host: IpAddr,
    /// Listen port. 0 lets the OS pick one (see `start_relay`'s return value).
    pub port: u16,
    /// Maximum number of concurrently connected peers.
    pub capacity: usize,
    /// Upper bound on a single inbound message, in bytes.
    pub buffer_size: usize,
    pub framing: Framing,
    /// Maximum bytes queued for a slow peer before messages to it are dropped.
    pub outbox_limit: usize,
    /// Readiness events fetched per poll call.
    pub poll_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 7878,
            capacity: 5,
            buffer_size: 1024,
            framing: Framing::Lines,
            outbox_limit: 64 * 1024,
            poll_capacity: 128,
        }
    }
}

impl RelayConfig {
    /// Load a config from a JSON file. Keys that are absent keep their
    /// default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RelayError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| RelayError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject values the event loop cannot run with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.capacity == 0 {
            return Err(RelayError::Config("capacity must be at least 1".into()));
        }
        if self.buffer_size == 0 {
            return Err(RelayError::Config("buffer_size must be at least 1".into()));
        }
        if self.outbox_limit < self.buffer_size {
            return Err(RelayError::Config(format!(
                "outbox_limit ({}) must be at least buffer_size ({})",
                self.outbox_limit, self.buffer_size
            )));
        }
        if self.poll_capacity == 0 {
            return Err(RelayError::Config("poll_capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
