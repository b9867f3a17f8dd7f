// TCP line client for talking to a relay.
//
// Architecture mirrors how a terminal user sees the relay:
// - `connect()` opens a blocking `std::net::TcpStream` and spawns a reader
//   thread.
// - The reader thread reads `\n`-terminated lines and pushes them into an
//   `mpsc` inbox, followed by a single `ClientEvent::Closed` when the relay
//   hangs up.
// - The caller keeps the write half and sends lines synchronously.
//
// Used by the `chat` binary and by the integration tests, so both exercise
// the same code path.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Something the reader thread observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// One received line, terminator removed.
    Line(String),
    /// The relay closed the connection (or the read failed).
    Closed,
}

/// Line-oriented relay client.
pub struct RelayClient {
    writer: TcpStream,
    inbox: Receiver<ClientEvent>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl RelayClient {
    pub fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let writer = TcpStream::connect(addr)?;
        let reader = BufReader::new(writer.try_clone()?);

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || reader_loop(reader, tx));

        Ok(Self {
            writer,
            inbox: rx,
            _reader_thread: Some(reader_thread),
        })
    }

    /// Send `text` followed by a newline (unless it already ends in one).
    pub fn send_line(&mut self, text: &str) -> std::io::Result<()> {
        self.writer.write_all(text.as_bytes())?;
        if !text.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }

    /// Send bytes exactly as given.
    pub fn send_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes)?;
        self.writer.flush()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ClientEvent> {
        match self.inbox.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(ClientEvent::Closed),
        }
    }

    /// Drain all queued events (non-blocking).
    pub fn poll(&self) -> Vec<ClientEvent> {
        self.inbox.try_iter().collect()
    }

    /// Close our write side; the relay sees an orderly close.
    pub fn disconnect(&mut self) {
        let _ = self.writer.shutdown(Shutdown::Write);
    }
}

/// Reader thread: push lines until EOF or error, then `Closed`.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ClientEvent>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(ClientEvent::Line(line)).is_err() {
                    return; // Caller dropped the client
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    let _ = tx.send(ClientEvent::Closed);
}
