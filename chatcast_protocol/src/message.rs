// Tagged messages and their presentation encoding.
//
// A `TaggedMessage` lives for the duration of one broadcast. The relay builds
// it from a framed inbound chunk (or an operator line), hands it to the
// broadcast step, and `encode` produces the bytes written to every peer:
//
//   from client <id>: <content>
//   from server: <content>
//
// Under `Framing::Lines` the encoded form always ends in exactly one `\n`.
// Under `Framing::Raw` the content is passed through untouched, so the output
// is newline-terminated only when the source bytes were.

use crate::framing::Framing;
use crate::types::SenderTag;

/// A payload annotated with its sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaggedMessage {
    pub sender: SenderTag,
    pub payload: Vec<u8>,
}

impl TaggedMessage {
    pub fn new(sender: SenderTag, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            sender,
            payload: payload.into(),
        }
    }

    /// The human-readable attribution prefix, including the trailing `": "`.
    pub fn prefix(&self) -> String {
        match self.sender {
            SenderTag::Client(id) => format!("from client {id}: "),
            SenderTag::Server => "from server: ".to_string(),
        }
    }

    /// Produce the bytes written to each peer.
    pub fn encode(&self, framing: Framing) -> Vec<u8> {
        let prefix = self.prefix();
        let content: &[u8] = match framing {
            Framing::Lines => {
                let line = self.payload.strip_suffix(b"\n").unwrap_or(&self.payload[..]);
                line.strip_suffix(b"\r").unwrap_or(line)
            }
            Framing::Raw => &self.payload,
        };
        let mut out = Vec::with_capacity(prefix.len() + content.len() + 1);
        out.extend_from_slice(prefix.as_bytes());
        out.extend_from_slice(content);
        if framing == Framing::Lines {
            out.push(b'\n');
        }
        out
    }

    /// Payload as text for log output. Invalid UTF-8 is replaced.
    pub fn display_payload(&self) -> String {
        String::from_utf8_lossy(&self.payload)
            .trim_end_matches(['\r', '\n'])
            .to_string()
    }
}
