// Inbound message framing.
//
// Peers send arbitrary byte streams; TCP gives no message boundaries. Two
// modes are supported:
//
// - `Framing::Lines`: bytes are accumulated per connection in a `LineFramer`
//   and split on `\n`. No emitted message is longer than the framer's
//   `max_len`; a run of bytes that reaches `max_len` without a newline is
//   emitted as a message of its own, so a misbehaving peer cannot grow the
//   buffer without bound.
// - `Framing::Raw`: every transport read is its own message. A payload split
//   across TCP segments arrives as several messages, and one larger than the
//   read buffer is chopped at the buffer size.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the relay cuts inbound bytes into messages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Newline-delimited messages, bounded by the buffer size.
    #[default]
    Lines,
    /// One message per transport read.
    Raw,
}

impl FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lines" => Ok(Framing::Lines),
            "raw" => Ok(Framing::Raw),
            other => Err(format!("unknown framing `{other}` (expected `lines` or `raw`)")),
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Framing::Lines => f.write_str("lines"),
            Framing::Raw => f.write_str("raw"),
        }
    }
}

/// Newline-delimited accumulator for one connection's inbound bytes.
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_len: usize,
}

impl LineFramer {
    /// `max_len` is clamped to at least 1.
    pub fn new(max_len: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_len: max_len.max(1),
        }
    }

    /// Feed newly read bytes. Returns every message completed by them, with
    /// the line terminator (`\n` or `\r\n`) removed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();

        loop {
            // A newline at index `max_len` still yields a `max_len`-byte line.
            let window = self.pending.len().min(self.max_len + 1);
            if let Some(pos) = self.pending[..window].iter().position(|&b| b == b'\n') {
                let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                out.push(line);
            } else if self.pending.len() >= self.max_len {
                out.push(self.pending.drain(..self.max_len).collect());
            } else {
                break;
            }
        }

        out
    }

    /// Take whatever partial line is buffered (used when the peer closes).
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    /// Number of buffered bytes not yet forming a complete message.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_lines() {
        let mut framer = LineFramer::new(1024);
        let lines = framer.push(b"one\ntwo\n");
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn reassembles_line_split_across_reads() {
        let mut framer = LineFramer::new(1024);
        assert!(framer.push(b"hel").is_empty());
        assert!(framer.push(b"lo wo").is_empty());
        assert_eq!(framer.push(b"rld\nnext"), vec![b"hello world".to_vec()]);
        assert_eq!(framer.pending_len(), 4);
        assert_eq!(framer.finish(), Some(b"next".to_vec()));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn strips_carriage_return() {
        let mut framer = LineFramer::new(64);
        assert_eq!(framer.push(b"telnet\r\n"), vec![b"telnet".to_vec()]);
    }

    #[test]
    fn overlong_run_is_cut_at_max_len() {
        let mut framer = LineFramer::new(4);
        let out = framer.push(b"abcdefghij\n");
        assert_eq!(
            out,
            vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]
        );
    }

    #[test]
    fn line_of_exactly_max_len_is_not_split() {
        let mut framer = LineFramer::new(4);
        assert_eq!(framer.push(b"abcd\n"), vec![b"abcd".to_vec()]);
        assert_eq!(framer.pending_len(), 0);
    }

    #[test]
    fn empty_lines_are_messages() {
        let mut framer = LineFramer::new(16);
        assert_eq!(framer.push(b"\n\n"), vec![Vec::<u8>::new(), Vec::<u8>::new()]);
    }

    #[test]
    fn framing_parses_case_insensitively() {
        assert_eq!("RAW".parse::<Framing>(), Ok(Framing::Raw));
        assert_eq!("lines".parse::<Framing>(), Ok(Framing::Lines));
        assert!("json".parse::<Framing>().is_err());
        assert_eq!(Framing::default(), Framing::Lines);
        assert_eq!(Framing::Raw.to_string(), "raw");
    }
}
