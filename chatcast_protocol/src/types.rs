// Core identity types for the broadcast relay.
//
// `SlotId` is the position of a connection in the relay's fixed-capacity
// connection table. It is stable for the lifetime of a connection and is
// reused (lowest index first) once that connection goes away, so it is an
// identity of a *slot*, not of a peer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a live connection in the connection table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotId(pub usize);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a broadcast message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SenderTag {
    /// A connected peer, identified by its slot.
    Client(SlotId),
    /// The relay's own operator input.
    Server,
}
