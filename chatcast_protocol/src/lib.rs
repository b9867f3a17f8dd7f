// chatcast_protocol: wire vocabulary for the chatcast broadcast relay.
//
// This crate defines the sender tags, the presentation encoding, and the line
// framing used by the relay (`chatcast_relay`) and its line clients. It has
// no I/O of its own: the relay owns sockets, this crate only turns bytes into
// messages and messages into bytes.
//
// Module overview:
// - `types.rs`:    `SlotId` (connection table position) and `SenderTag`
//                  (a client slot or the server operator).
// - `message.rs`:  `TaggedMessage` (payload plus sender) and its encoding
//                  to the `from client <id>: ...` / `from server: ...` text.
// - `framing.rs`:  `Framing` mode selection and `LineFramer`, a bounded
//                  newline-delimited accumulator for inbound byte streams.
//
// Design decisions:
// - **Structured tags.** The sender travels as a `SenderTag` value until the
//   moment bytes are written to a socket. Nothing parses the formatted text
//   back into an identity.
// - **Plain text on the wire.** Clients are line-oriented terminals, so the
//   outbound format stays human-readable rather than length-prefixed.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{Framing, LineFramer};
pub use message::TaggedMessage;
pub use types::{SenderTag, SlotId};
