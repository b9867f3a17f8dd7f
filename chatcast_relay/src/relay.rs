// Broadcast relay: fan one tagged message out to every live slot.
//
// The sender is included: echo back to the originating client is part of
// the observable behavior. Per-slot problems never abort the broadcast:
// a failed write is logged and the slot stays in the table until the event
// loop sees its read side close. Slots whose outbox went from empty to
// non-empty are reported back so the loop can add writable interest.

use std::io::Write;

use chatcast_protocol::{Framing, SlotId, TaggedMessage};
use tracing::{debug, trace, warn};

use crate::peer::{Peer, SendOutcome};
use crate::table::ConnectionTable;

/// Per-broadcast bookkeeping returned to the event loop.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Slots that received the whole message.
    pub delivered: Vec<SlotId>,
    /// Slots now holding queued output.
    pub queued: Vec<SlotId>,
    /// Slots whose outbox was full.
    pub dropped: Vec<SlotId>,
    /// Slots whose write failed (or had already failed).
    pub failed: Vec<SlotId>,
}

/// Encode `msg` once and write it to every live slot in ascending order.
pub fn publish<S: Write>(
    table: &mut ConnectionTable<Peer<S>>,
    msg: &TaggedMessage,
    framing: Framing,
) -> PublishReport {
    let bytes = msg.encode(framing);
    debug!(
        sender = ?msg.sender,
        len = bytes.len(),
        text = %msg.display_payload(),
        "broadcasting message"
    );

    let mut report = PublishReport::default();
    for id in table.live_ids() {
        let Some(peer) = table.get_mut(id) else {
            continue;
        };
        match peer.send(&bytes) {
            SendOutcome::Sent => {
                trace!(slot = %id, "sent");
                report.delivered.push(id);
            }
            SendOutcome::Queued => {
                trace!(slot = %id, pending = peer.pending_output_len(), "queued");
                report.queued.push(id);
            }
            SendOutcome::Dropped => {
                warn!(
                    slot = %id,
                    pending = peer.pending_output_len(),
                    "outbox full, dropped message for slow peer"
                );
                report.dropped.push(id);
            }
            SendOutcome::Failed(kind) => {
                warn!(slot = %id, peer = %peer.addr, err = ?kind, "send to client failed");
                report.failed.push(id);
            }
            SendOutcome::Skipped => report.failed.push(id),
        }
    }
    report
}
