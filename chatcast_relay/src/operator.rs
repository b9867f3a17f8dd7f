// Operator input channel.
//
// The operator's lines reach the event loop through an `mpsc` channel paired
// with a `mio::Waker` registered under the loop's operator token: `send`
// queues the line and wakes the poll. Wakes coalesce, so the loop drains the
// whole queue every time the operator token is ready.
//
// Operator text is cut into messages the same way client lines are: split on
// `\n` and bounded by the buffer size (`operator_messages`). Each piece is
// broadcast with its own `from server: ` tag, so embedded newlines can never
// put an untagged line on the wire.
//
// `spawn_line_reader` is the stdin glue used by the `relay` binary: a thread
// that forwards each line it reads, terminator included. It owns no relay
// state.

use std::io::{BufRead, ErrorKind};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use chatcast_protocol::LineFramer;
use mio::Waker;
use tracing::{debug, warn};

use crate::error::RelayError;

/// Clonable handle for injecting operator messages into a running relay.
#[derive(Clone, Debug)]
pub struct OperatorSender {
    tx: Sender<String>,
    waker: Arc<Waker>,
}

impl OperatorSender {
    pub(crate) fn new(tx: Sender<String>, waker: Arc<Waker>) -> Self {
        Self { tx, waker }
    }

    /// Queue text for broadcast. Every line in it goes out as its own
    /// `from server: ...` message.
    pub fn send(&self, line: impl Into<String>) -> Result<(), RelayError> {
        self.tx.send(line.into()).map_err(|_| RelayError::Stopped)?;
        self.waker.wake()?;
        Ok(())
    }

    pub(crate) fn wake(&self) -> std::io::Result<()> {
        self.waker.wake()
    }
}

/// Loop-side end of the operator channel.
#[derive(Debug)]
pub(crate) struct OperatorQueue {
    rx: Receiver<String>,
}

impl OperatorQueue {
    pub(crate) fn new(rx: Receiver<String>) -> Self {
        Self { rx }
    }

    /// Every line queued since the last drain, in submission order.
    pub(crate) fn drain(&self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(line) => lines.push(line),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        lines
    }
}

/// Cut one queued operator string into broadcastable payloads of at most
/// `max_len` bytes. Line terminators are removed and blank lines skipped.
/// Text after the last newline counts as a complete line.
pub fn operator_messages(text: &str, max_len: usize) -> Vec<Vec<u8>> {
    let mut framer = LineFramer::new(max_len);
    let mut pieces = framer.push(text.as_bytes());
    pieces.extend(framer.finish());
    pieces.retain(|piece| !piece.is_empty());
    pieces
}

/// Forward lines read from `input` until EOF or until the relay stops.
pub fn spawn_line_reader<R>(mut input: R, sender: OperatorSender) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match input.read_line(&mut line) {
                Ok(0) => {
                    debug!("operator input closed");
                    break;
                }
                Ok(_) => {
                    if sender.send(line.clone()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(err = %e, "operator input failed");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::time::Duration;

    use mio::{Events, Poll, Token};

    use super::*;

    #[test]
    fn blank_lines_are_not_broadcast() {
        assert!(operator_messages("\n", 16).is_empty());
        assert!(operator_messages("\r\n", 16).is_empty());
        assert!(operator_messages("", 16).is_empty());
        assert_eq!(operator_messages("hello\n", 16), vec![b"hello".to_vec()]);
        assert_eq!(operator_messages(" \n", 16), vec![b" ".to_vec()]);
    }

    #[test]
    fn embedded_newlines_become_separate_messages() {
        assert_eq!(
            operator_messages("hello\n\nforged\n", 16),
            vec![b"hello".to_vec(), b"forged".to_vec()]
        );
        assert_eq!(operator_messages("no newline", 16), vec![b"no newline".to_vec()]);
    }

    #[test]
    fn long_operator_line_is_cut_at_max_len() {
        assert_eq!(
            operator_messages("abcdefghijklmnop\n", 8),
            vec![b"abcdefgh".to_vec(), b"ijklmnop".to_vec()]
        );
        assert_eq!(
            operator_messages("abcdefghij", 8),
            vec![b"abcdefgh".to_vec(), b"ij".to_vec()]
        );
    }

    #[test]
    fn send_wakes_poll_and_queue_drains_in_order() {
        let mut poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(7)).unwrap());
        let (tx, rx) = mpsc::channel();
        let sender = OperatorSender::new(tx, waker);
        let queue = OperatorQueue::new(rx);

        sender.send("first\n").unwrap();
        sender.send("second\n").unwrap();

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(7)));
        assert_eq!(queue.drain(), vec!["first\n", "second\n"]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn send_after_queue_dropped_reports_stopped() {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(1)).unwrap());
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sender = OperatorSender::new(tx, waker);
        assert!(matches!(sender.send("x"), Err(RelayError::Stopped)));
    }

    #[test]
    fn line_reader_forwards_lines_with_terminators() {
        let poll = Poll::new().unwrap();
        let waker = Arc::new(Waker::new(poll.registry(), Token(1)).unwrap());
        let (tx, rx) = mpsc::channel();
        let sender = OperatorSender::new(tx, waker);

        let input = Cursor::new(b"alpha\nbeta\ngamma".to_vec());
        spawn_line_reader(input, sender).join().unwrap();

        let queue = OperatorQueue::new(rx);
        assert_eq!(queue.drain(), vec!["alpha\n", "beta\n", "gamma"]);
    }
}
