// TCP server and readiness-driven event loop.
//
// Architecture: one thread, one `mio::Poll`, no locks.
//
// - **Watched sources**: the listener (`LISTENER`), the operator waker
//   (`OPERATOR`), and every live slot's stream (`SLOT_BASE + slot`). The
//   registry is updated incrementally: `admit` registers, `on_closed`
//   deregisters, so the registered streams always match the live slots.
// - **Loop**: block in `poll` (the only blocking call), then dispatch the
//   batch in a fixed order: listener, operator, then slots by ascending
//   `SlotId`. Broadcast order within a batch is therefore reproducible.
// - **Fairness**: readiness is edge-triggered, so a readable slot must be
//   read until `WouldBlock`. Each dispatch gives a slot at most
//   `READ_BUDGET` reads; a slot that still has data is carried into the next
//   batch (polled without blocking) so one busy peer cannot starve the
//   listener or the other slots.
// - **Writes**: non-blocking. A peer that cannot take a whole message gets
//   an outbox (see `peer.rs`) and temporary `WRITABLE` interest.
//
// The loop owns the connection table, the poll, and every stream. Other
// threads reach it only through the operator channel and the
// `keep_running` flag, both of which wake the poll.
//
// Termination: the loop runs until the poll fails (fatal, returned from
// `RelayHandle::wait`) or `RelayHandle::stop` is called. There are no
// per-connection timeouts.

use std::collections::{BTreeMap, BTreeSet};
use std::net::{Shutdown, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chatcast_protocol::{Framing, SenderTag, SlotId, TaggedMessage};
use mio::event::Event;
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, info_span, trace, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::listener::{Accept, Listener};
use crate::operator::{OperatorQueue, OperatorSender, operator_messages};
use crate::peer::{FlushOutcome, Peer};
use crate::reader::{ReadOutcome, read_once};
use crate::relay::publish;
use crate::table::{ConnectionTable, TableFull};

const LISTENER: Token = Token(0);
const OPERATOR: Token = Token(1);
const SLOT_BASE: usize = 2;

/// Reads one slot may take per dispatch before yielding to the others.
const READ_BUDGET: usize = 32;

fn slot_token(id: SlotId) -> Token {
    Token(SLOT_BASE + id.0)
}

fn token_slot(token: Token) -> Option<SlotId> {
    token.0.checked_sub(SLOT_BASE).map(SlotId)
}

/// Counters published by the event loop for observers on other threads.
#[derive(Debug, Default)]
pub struct RelayStats {
    occupancy: AtomicUsize,
    accepted: AtomicU64,
    rejected: AtomicU64,
    relayed: AtomicU64,
}

impl RelayStats {
    /// Live slots right now.
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::SeqCst)
    }

    /// Connections admitted into a slot since startup.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Connections closed because the table was full.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Messages broadcast (client and operator).
    pub fn relayed(&self) -> u64 {
        self.relayed.load(Ordering::SeqCst)
    }
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    local_addr: SocketAddr,
    operator: OperatorSender,
    stats: Arc<RelayStats>,
    keep_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), RelayError>>>,
}

impl RelayHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A sender for operator messages, broadcast as `from server: ...`.
    pub fn operator(&self) -> OperatorSender {
        self.operator.clone()
    }

    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Signal the relay to stop, wait for it, and return how the loop ended.
    pub fn stop(self) -> Result<(), RelayError> {
        self.keep_running.store(false, Ordering::SeqCst);
        // The loop may already have exited on a fatal error; `wait` reports it.
        let _ = self.operator.wake();
        self.wait()
    }

    /// Block until the event loop ends on its own (fatal poll error).
    pub fn wait(mut self) -> Result<(), RelayError> {
        match self.thread.take() {
            Some(handle) => handle.join().unwrap_or(Err(RelayError::Stopped)),
            None => Ok(()),
        }
    }
}

/// Bind the listener and start the event loop on a background thread.
/// Returns the handle and the actual bound address (useful with port 0).
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, SocketAddr), RelayError> {
    config.validate()?;

    let mut listener = Listener::bind(config.bind_addr())?;
    let local_addr = listener.local_addr();
    let poll = Poll::new().map_err(RelayError::Poll)?;
    listener.register(poll.registry(), LISTENER)?;
    let waker = Arc::new(Waker::new(poll.registry(), OPERATOR).map_err(RelayError::Register)?);

    let (tx, rx) = mpsc::channel();
    let operator = OperatorSender::new(tx, waker);
    let stats = Arc::new(RelayStats::default());
    let keep_running = Arc::new(AtomicBool::new(true));

    info!(
        addr = %local_addr,
        capacity = config.capacity,
        framing = %config.framing,
        "relay listening"
    );

    let event_loop = EventLoop {
        read_buf: vec![0; config.buffer_size],
        backlog: BTreeSet::new(),
        table: ConnectionTable::new(config.capacity),
        poll,
        listener,
        operator: OperatorQueue::new(rx),
        config,
        stats: Arc::clone(&stats),
        keep_running: Arc::clone(&keep_running),
    };

    let thread = thread::Builder::new()
        .name("chatcast-relay".into())
        .spawn(move || event_loop.run())?;

    Ok((
        RelayHandle {
            local_addr,
            operator,
            stats,
            keep_running,
            thread: Some(thread),
        },
        local_addr,
    ))
}

/// The readiness bits of one event that the loop cares about.
#[derive(Clone, Copy, Debug, Default)]
struct EventFlags {
    readable: bool,
    read_closed: bool,
    error: bool,
    writable: bool,
}

impl EventFlags {
    fn of(event: &Event) -> Self {
        Self {
            readable: event.is_readable(),
            read_closed: event.is_read_closed(),
            error: event.is_error(),
            writable: event.is_writable(),
        }
    }
}

/// Readiness of one slot within a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SlotReadiness {
    readable: bool,
    writable: bool,
}

/// One unit of work in a dispatch, in the order it runs.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Accept,
    Operator,
    Slot(SlotId, SlotReadiness),
}

/// One poll result, regrouped into dispatch order.
#[derive(Debug, Default)]
struct Batch {
    listener: bool,
    operator: bool,
    slots: BTreeMap<SlotId, SlotReadiness>,
}

impl Batch {
    fn collect(events: impl IntoIterator<Item = (Token, EventFlags)>) -> Self {
        let mut batch = Batch::default();
        for (token, flags) in events {
            match token {
                LISTENER => batch.listener = true,
                OPERATOR => batch.operator = true,
                token => {
                    let Some(id) = token_slot(token) else {
                        continue;
                    };
                    let entry = batch.slots.entry(id).or_default();
                    // Errors and hangups are surfaced by the next read.
                    entry.readable |= flags.readable || flags.read_closed || flags.error;
                    entry.writable |= flags.writable;
                }
            }
        }
        batch
    }

    /// Mark slots left over from a spent read budget as readable.
    fn carry_over(&mut self, backlog: impl IntoIterator<Item = SlotId>) {
        for id in backlog {
            self.slots.entry(id).or_default().readable = true;
        }
    }

    /// Listener first, then the operator, then slots by ascending id.
    fn steps(self) -> Vec<Step> {
        let mut steps = Vec::with_capacity(self.slots.len() + 2);
        if self.listener {
            steps.push(Step::Accept);
        }
        if self.operator {
            steps.push(Step::Operator);
        }
        steps.extend(
            self.slots
                .into_iter()
                .map(|(id, readiness)| Step::Slot(id, readiness)),
        );
        steps
    }
}

struct EventLoop {
    poll: Poll,
    listener: Listener,
    table: ConnectionTable<Peer<TcpStream>>,
    operator: OperatorQueue,
    config: RelayConfig,
    stats: Arc<RelayStats>,
    keep_running: Arc<AtomicBool>,
    read_buf: Vec<u8>,
    /// Slots that still had data when their read budget ran out.
    backlog: BTreeSet<SlotId>,
}

impl EventLoop {
    fn run(mut self) -> Result<(), RelayError> {
        let span = info_span!("relay", addr = %self.listener.local_addr());
        let _enter = span.enter();

        let mut events = Events::with_capacity(self.config.poll_capacity);
        let result = loop {
            if !self.keep_running.load(Ordering::SeqCst) {
                break Ok(());
            }

            // Carried-over slots must not wait for an edge that already fired.
            let timeout = (!self.backlog.is_empty()).then_some(Duration::ZERO);
            trace!(
                state = "blocked",
                live = self.table.occupancy(),
                backlog = self.backlog.len()
            );
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                error!(err = %e, "readiness poll failed");
                break Err(RelayError::Poll(e));
            }

            let mut batch =
                Batch::collect(events.iter().map(|e| (e.token(), EventFlags::of(e))));
            batch.carry_over(std::mem::take(&mut self.backlog));
            trace!(
                state = "dispatching",
                listener = batch.listener,
                operator = batch.operator,
                slots = batch.slots.len()
            );
            self.dispatch(batch);
            trace!(state = "idle");
        };

        self.close_all();
        info!("relay stopped");
        result
    }

    fn dispatch(&mut self, batch: Batch) {
        for step in batch.steps() {
            match step {
                Step::Accept => self.accept_pending(),
                Step::Operator => self.drain_operator(),
                Step::Slot(id, readiness) => {
                    if !self.table.contains(id) {
                        continue;
                    }
                    if readiness.writable {
                        self.flush_slot(id);
                    }
                    if readiness.readable {
                        self.read_slot(id);
                    }
                }
            }
        }
    }

    /// Accept until the listener would block.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.poll_accept() {
                Accept::New(stream, addr) => self.admit(stream, addr),
                Accept::WouldBlock => break,
                Accept::Error(e) if Accept::is_transient(&e) => {
                    warn!(err = %e, "transient accept error");
                }
                Accept::Error(e) => {
                    error!(err = %e, "error on accept");
                    break;
                }
            }
        }
    }

    /// Place an accepted stream in a slot, or close it if the table is full.
    fn admit(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %addr, err = %e, "could not set TCP_NODELAY");
        }
        let peer = Peer::new(
            stream,
            addr,
            self.config.buffer_size,
            self.config.outbox_limit,
        );

        let id = match self.table.try_insert(peer) {
            Ok(id) => id,
            Err(TableFull(peer)) => {
                self.stats.rejected.fetch_add(1, Ordering::SeqCst);
                let _ = peer.stream.shutdown(Shutdown::Both);
                warn!(
                    peer = %addr,
                    capacity = self.table.capacity(),
                    "too many clients, connection closed"
                );
                return;
            }
        };

        let registered = match self.table.get_mut(id) {
            Some(peer) => self
                .poll
                .registry()
                .register(&mut peer.stream, slot_token(id), Interest::READABLE),
            None => return,
        };
        if let Err(e) = registered {
            warn!(slot = %id, peer = %addr, err = %e, "could not watch new client");
            self.table.remove(id);
            return;
        }

        self.stats.accepted.fetch_add(1, Ordering::SeqCst);
        self.publish_occupancy();
        info!(slot = %id, peer = %addr, "new client connected");
    }

    fn drain_operator(&mut self) {
        for text in self.operator.drain() {
            let pieces = operator_messages(&text, self.config.buffer_size);
            if pieces.is_empty() {
                trace!("ignoring blank operator line");
            }
            for payload in pieces {
                let msg = TaggedMessage::new(SenderTag::Server, payload);
                info!(text = %msg.display_payload(), "operator message");
                // Operator input is line-shaped whatever the client framing.
                self.broadcast(&msg, Framing::Lines);
            }
        }
    }

    /// Read a readable slot until it would block or its budget runs out,
    /// broadcasting every message it yields.
    fn read_slot(&mut self, id: SlotId) {
        let framing = self.config.framing;
        for _ in 0..READ_BUDGET {
            let Some(peer) = self.table.get_mut(id) else {
                return;
            };
            match read_once(&mut peer.stream, &mut self.read_buf) {
                ReadOutcome::Data(n) => {
                    let chunk = &self.read_buf[..n];
                    let payloads = match framing {
                        Framing::Raw => vec![chunk.to_vec()],
                        Framing::Lines => peer.framer.push(chunk),
                    };
                    for payload in payloads {
                        self.relay_from(id, payload);
                    }
                }
                ReadOutcome::WouldBlock => return,
                ReadOutcome::Closed => {
                    if let Some(tail) = peer.framer.finish() {
                        self.relay_from(id, tail);
                    }
                    self.on_closed(id);
                    return;
                }
                ReadOutcome::Error(e) => {
                    warn!(slot = %id, err = %e, "read from client failed");
                    self.on_closed(id);
                    return;
                }
            }
        }
        trace!(slot = %id, "read budget spent, carrying over");
        self.backlog.insert(id);
    }

    fn relay_from(&mut self, id: SlotId, payload: Vec<u8>) {
        let msg = TaggedMessage::new(SenderTag::Client(id), payload);
        info!(slot = %id, text = %msg.display_payload(), "received message");
        self.broadcast(&msg, self.config.framing);
    }

    fn broadcast(&mut self, msg: &TaggedMessage, framing: Framing) {
        let report = publish(&mut self.table, msg, framing);
        self.stats.relayed.fetch_add(1, Ordering::SeqCst);
        for id in report.queued {
            self.watch_writable(id, true);
        }
    }

    fn flush_slot(&mut self, id: SlotId) {
        let Some(peer) = self.table.get_mut(id) else {
            return;
        };
        match peer.flush_outbox() {
            FlushOutcome::Drained => self.watch_writable(id, false),
            FlushOutcome::Pending => {}
            FlushOutcome::Failed(kind) => {
                warn!(slot = %id, err = ?kind, "send to client failed");
                self.watch_writable(id, false);
            }
        }
    }

    /// Toggle `WRITABLE` interest on a slot's registration.
    fn watch_writable(&mut self, id: SlotId, on: bool) {
        let Some(peer) = self.table.get_mut(id) else {
            return;
        };
        if peer.watching_writable == on {
            return;
        }
        let interest = if on {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        match self
            .poll
            .registry()
            .reregister(&mut peer.stream, slot_token(id), interest)
        {
            Ok(()) => peer.watching_writable = on,
            Err(e) => warn!(slot = %id, err = %e, "could not update client interest"),
        }
    }

    /// Remove a slot from the table and the watched set. No-op when the slot
    /// is already empty.
    fn on_closed(&mut self, id: SlotId) {
        let Some(mut peer) = self.table.remove(id) else {
            return;
        };
        if let Err(e) = self.poll.registry().deregister(&mut peer.stream) {
            debug!(slot = %id, err = %e, "deregister failed");
        }
        let _ = peer.stream.shutdown(Shutdown::Both);
        self.publish_occupancy();
        info!(slot = %id, peer = %peer.addr, "client disconnected");
    }

    fn close_all(&mut self) {
        for (id, mut peer) in self.table.drain() {
            let _ = self.poll.registry().deregister(&mut peer.stream);
            let _ = peer.stream.shutdown(Shutdown::Both);
            debug!(slot = %id, peer = %peer.addr, "closed on shutdown");
        }
        self.publish_occupancy();
    }

    fn publish_occupancy(&self) {
        self.stats
            .occupancy
            .store(self.table.occupancy(), Ordering::SeqCst);
    }
}
