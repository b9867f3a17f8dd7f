// Message reader: one bounded read per call.
//
// `read_once` performs exactly one `read` into the caller's buffer and
// classifies the result. It never loops to drain the source. mio reports
// readiness edge-triggered, so the event loop keeps calling it until it sees
// `WouldBlock`, `Closed`, or `Error`.

use std::io::{self, ErrorKind, Read};

/// Result of a single read attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    /// `n` bytes were placed at the start of the buffer.
    Data(usize),
    /// The peer performed an orderly close.
    Closed,
    /// Nothing more to read until the next readiness notification.
    WouldBlock,
    /// The connection failed.
    Error(io::Error),
}

/// Read at most `buf.len()` bytes from `source`. An `Interrupted` read is
/// retried; it is not a distinct outcome.
pub fn read_once<R: Read>(source: &mut R, buf: &mut [u8]) -> ReadOutcome {
    loop {
        match source.read(buf) {
            Ok(0) => return ReadOutcome::Closed,
            Ok(n) => return ReadOutcome::Data(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return ReadOutcome::WouldBlock,
            Err(e) => return ReadOutcome::Error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;

    use super::*;

    /// Reader that replays a scripted sequence of results.
    struct Scripted(VecDeque<io::Result<Vec<u8>>>);

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn data_then_closed() {
        let mut source = Cursor::new(b"hello".to_vec());
        let mut buf = [0u8; 16];
        match read_once(&mut source, &mut buf) {
            ReadOutcome::Data(5) => assert_eq!(&buf[..5], b"hello"),
            other => panic!("expected Data(5), got {other:?}"),
        }
        assert!(matches!(read_once(&mut source, &mut buf), ReadOutcome::Closed));
    }

    #[test]
    fn payload_larger_than_buffer_is_cut() {
        let mut source = Cursor::new(vec![b'x'; 40]);
        let mut buf = [0u8; 16];
        assert!(matches!(read_once(&mut source, &mut buf), ReadOutcome::Data(16)));
        assert!(matches!(read_once(&mut source, &mut buf), ReadOutcome::Data(16)));
        assert!(matches!(read_once(&mut source, &mut buf), ReadOutcome::Data(8)));
    }

    #[test]
    fn interrupted_is_retried() {
        let mut source = Scripted(VecDeque::from([
            Err(ErrorKind::Interrupted.into()),
            Ok(b"ok".to_vec()),
        ]));
        let mut buf = [0u8; 8];
        assert!(matches!(read_once(&mut source, &mut buf), ReadOutcome::Data(2)));
    }

    #[test]
    fn would_block_and_errors_are_classified() {
        let mut source = Scripted(VecDeque::from([
            Err(ErrorKind::WouldBlock.into()),
            Err(ErrorKind::ConnectionReset.into()),
        ]));
        let mut buf = [0u8; 8];
        assert!(matches!(read_once(&mut source, &mut buf), ReadOutcome::WouldBlock));
        match read_once(&mut source, &mut buf) {
            ReadOutcome::Error(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
