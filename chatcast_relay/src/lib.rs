// chatcast_relay: single-endpoint broadcast relay.
//
// The relay accepts up to `capacity` TCP connections, reads messages from any
// of them (and from a local operator channel), and writes each message to
// every connected peer, the sender included, tagged with who sent it:
//
//   from client <slot>: <text>
//   from server: <text>
//
// Module overview:
// - `table.rs`:    Fixed-capacity `ConnectionTable` (lowest-free-slot reuse).
// - `listener.rs`: Non-blocking listening endpoint, `poll_accept`.
// - `reader.rs`:   `read_once`, one bounded read, classified.
// - `peer.rs`:     Per-slot state: stream, line framer, bounded outbox.
// - `relay.rs`:    `publish`: encode once, write to every live slot.
// - `operator.rs`: Operator channel (mpsc + mio waker) and stdin glue.
// - `server.rs`:   The mio event loop, `start_relay`, `RelayHandle`.
// - `config.rs`:   `RelayConfig` defaults, JSON file loading, validation.
// - `client.rs`:   Blocking line client used by `chat` and the tests.
//
// Dependencies: `chatcast_protocol` (tags, encoding, framing), `mio` for
// readiness, `tracing` for structured logs, `thiserror` for `RelayError`.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded via
// `start_relay`.

pub mod client;
pub mod config;
pub mod error;
pub mod listener;
pub mod operator;
pub mod peer;
pub mod reader;
pub mod relay;
pub mod server;
pub mod table;

pub use config::RelayConfig;
pub use error::RelayError;
pub use server::{RelayHandle, RelayStats, start_relay};
