// Listening endpoint.
//
// Wraps a non-blocking `mio::net::TcpListener`. `poll_accept` is only called
// after the poll reports the listener readable, and the event loop keeps
// calling it until `WouldBlock` because readiness is edge-triggered.
// Admission (table insert or capacity rejection) is the event loop's job;
// this module only turns accept results into `Accept` values.

use std::io::{self, ErrorKind};
use std::net::SocketAddr;

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};

use crate::error::RelayError;

/// Result of one accept attempt.
#[derive(Debug)]
pub enum Accept {
    New(TcpStream, SocketAddr),
    WouldBlock,
    Error(io::Error),
}

impl Accept {
    /// Accept errors that only affect the aborted connection attempt.
    pub fn is_transient(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            ErrorKind::ConnectionAborted | ErrorKind::ConnectionReset
        )
    }
}

#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind the endpoint. A failure here is fatal to relay startup.
    pub fn bind(addr: SocketAddr) -> Result<Self, RelayError> {
        let inner = TcpListener::bind(addr).map_err(|source| RelayError::Bind { addr, source })?;
        let local_addr = inner.local_addr()?;
        Ok(Self { inner, local_addr })
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> Result<(), RelayError> {
        registry
            .register(&mut self.inner, token, Interest::READABLE)
            .map_err(RelayError::Register)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn poll_accept(&self) -> Accept {
        loop {
            match self.inner.accept() {
                Ok((stream, addr)) => return Accept::New(stream, addr),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Accept::WouldBlock,
                Err(e) => return Accept::Error(e),
            }
        }
    }
}
