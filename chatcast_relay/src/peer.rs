// Per-connection state held in a connection table slot.
//
// A `Peer` owns its transport handle exclusively, plus:
// - a `LineFramer` for reassembling inbound lines (unused under raw framing),
// - a bounded outbox for bytes a non-blocking write could not take yet.
//
// Write policy: a message is written directly when the outbox is empty. The
// unwritten tail of a short write is queued in full (a peer never sees half
// a message followed by another one). While the outbox is non-empty, new
// messages are appended only if they fit under `outbox_limit`; otherwise
// they are dropped for this peer. The tail that starts an outbox is never
// checked against the limit, so the outbox holds at most `outbox_limit`
// plus one encoded message. A hard write error marks the peer failed:
// its outbox is discarded and later writes are skipped until the read side
// reports the close.

use std::io::{ErrorKind, Write};
use std::net::SocketAddr;

use chatcast_protocol::LineFramer;

/// What happened to one message handed to `Peer::send`.
#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Fully written to the transport.
    Sent,
    /// Partly or wholly queued in the outbox.
    Queued,
    /// The outbox had no room; the message was discarded for this peer.
    Dropped,
    /// The write failed; the peer is now marked failed.
    Failed(ErrorKind),
    /// The peer was already marked failed.
    Skipped,
}

/// Result of draining the outbox on writable readiness.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    Drained,
    Pending,
    Failed(ErrorKind),
}

#[derive(Debug)]
pub struct Peer<S> {
    pub stream: S,
    pub addr: SocketAddr,
    pub framer: LineFramer,
    outbox: Vec<u8>,
    outbox_limit: usize,
    failed: bool,
    /// Whether the stream is currently registered for `WRITABLE` as well.
    pub(crate) watching_writable: bool,
}

impl<S: Write> Peer<S> {
    pub fn new(stream: S, addr: SocketAddr, buffer_size: usize, outbox_limit: usize) -> Self {
        Self {
            stream,
            addr,
            framer: LineFramer::new(buffer_size),
            outbox: Vec::new(),
            outbox_limit,
            failed: false,
            watching_writable: false,
        }
    }

    /// Write `bytes`, queueing what the transport will not take right now.
    pub fn send(&mut self, bytes: &[u8]) -> SendOutcome {
        if self.failed {
            return SendOutcome::Skipped;
        }
        if !self.outbox.is_empty() {
            if self.outbox.len() + bytes.len() > self.outbox_limit {
                return SendOutcome::Dropped;
            }
            self.outbox.extend_from_slice(bytes);
            return SendOutcome::Queued;
        }

        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => return self.fail(ErrorKind::WriteZero),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.outbox.extend_from_slice(&bytes[written..]);
                    return SendOutcome::Queued;
                }
                Err(e) => return self.fail(e.kind()),
            }
        }
        SendOutcome::Sent
    }

    /// Push queued bytes to the transport until it would block.
    pub fn flush_outbox(&mut self) -> FlushOutcome {
        if self.failed {
            return FlushOutcome::Drained;
        }
        let mut written = 0;
        let outcome = loop {
            if written == self.outbox.len() {
                break FlushOutcome::Drained;
            }
            match self.stream.write(&self.outbox[written..]) {
                Ok(0) => break FlushOutcome::Failed(ErrorKind::WriteZero),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break FlushOutcome::Pending,
                Err(e) => break FlushOutcome::Failed(e.kind()),
            }
        };
        self.outbox.drain(..written);
        if let FlushOutcome::Failed(kind) = outcome {
            self.fail(kind);
        }
        outcome
    }

    fn fail(&mut self, kind: ErrorKind) -> SendOutcome {
        self.failed = true;
        self.outbox.clear();
        SendOutcome::Failed(kind)
    }
}

impl<S> Peer<S> {
    pub fn has_pending_output(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub fn pending_output_len(&self) -> usize {
        self.outbox.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io;

    use super::*;

    /// In-memory transport that accepts at most `budget` bytes before
    /// reporting `WouldBlock`, or fails every write once `broken` is set.
    #[derive(Debug, Default)]
    pub(crate) struct MockStream {
        pub written: Vec<u8>,
        pub budget: Option<usize>,
        pub broken: bool,
    }

    impl MockStream {
        pub(crate) fn limited(budget: usize) -> Self {
            Self {
                budget: Some(budget),
                ..Self::default()
            }
        }

        pub(crate) fn broken() -> Self {
            Self {
                broken: true,
                ..Self::default()
            }
        }
    }

    impl Write for MockStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(ErrorKind::BrokenPipe.into());
            }
            let n = match self.budget {
                Some(0) => return Err(ErrorKind::WouldBlock.into()),
                Some(budget) => budget.min(buf.len()),
                None => buf.len(),
            };
            if let Some(budget) = self.budget.as_mut() {
                *budget -= n;
            }
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn unconstrained_write_is_sent() {
        let mut peer = Peer::new(MockStream::default(), addr(), 1024, 4096);
        assert_eq!(peer.send(b"hello\n"), SendOutcome::Sent);
        assert_eq!(peer.stream.written, b"hello\n");
        assert!(!peer.has_pending_output());
    }

    #[test]
    fn short_write_queues_tail_and_flush_completes_it() {
        let mut peer = Peer::new(MockStream::limited(3), addr(), 1024, 4096);
        assert_eq!(peer.send(b"abcdef"), SendOutcome::Queued);
        assert_eq!(peer.stream.written, b"abc");
        assert_eq!(peer.pending_output_len(), 3);

        // Next message lines up behind the queued tail.
        assert_eq!(peer.send(b"gh"), SendOutcome::Queued);

        peer.stream.budget = Some(2);
        assert_eq!(peer.flush_outbox(), FlushOutcome::Pending);
        assert_eq!(peer.stream.written, b"abcde");

        peer.stream.budget = None;
        assert_eq!(peer.flush_outbox(), FlushOutcome::Drained);
        assert_eq!(peer.stream.written, b"abcdefgh");
        assert!(!peer.has_pending_output());
    }

    #[test]
    fn full_outbox_drops_new_messages() {
        let mut peer = Peer::new(MockStream::limited(0), addr(), 4, 8);
        assert_eq!(peer.send(b"12345"), SendOutcome::Queued);
        assert_eq!(peer.send(b"678"), SendOutcome::Queued);
        assert_eq!(peer.send(b"9"), SendOutcome::Dropped);
        assert_eq!(peer.pending_output_len(), 8);
    }

    #[test]
    fn first_tail_may_exceed_limit_by_one_message() {
        let mut peer = Peer::new(MockStream::limited(1), addr(), 4, 4);
        assert_eq!(peer.send(b"abcdefghij"), SendOutcome::Queued);
        assert_eq!(peer.pending_output_len(), 9);
        assert_eq!(peer.send(b"k"), SendOutcome::Dropped);
        assert_eq!(peer.pending_output_len(), 9);

        peer.stream.budget = None;
        assert_eq!(peer.flush_outbox(), FlushOutcome::Drained);
        assert_eq!(peer.stream.written, b"abcdefghij");
    }

    #[test]
    fn hard_error_marks_peer_failed() {
        let mut peer = Peer::new(MockStream::broken(), addr(), 1024, 4096);
        assert_eq!(peer.send(b"x"), SendOutcome::Failed(ErrorKind::BrokenPipe));
        assert_eq!(peer.send(b"y"), SendOutcome::Skipped);
    }

    #[test]
    fn flush_failure_discards_outbox() {
        let mut peer = Peer::new(MockStream::limited(1), addr(), 1024, 4096);
        assert_eq!(peer.send(b"abc"), SendOutcome::Queued);
        peer.stream.broken = true;
        assert_eq!(
            peer.flush_outbox(),
            FlushOutcome::Failed(ErrorKind::BrokenPipe)
        );
        assert!(!peer.has_pending_output());
        assert_eq!(peer.send(b"z"), SendOutcome::Skipped);
    }
}
