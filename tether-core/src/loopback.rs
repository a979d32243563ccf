//! In-process loopback backend.
//!
//! A [`Backend`] that keeps every frame inside the process, for hosts that
//! run without libzmq and for deterministic tests of the binding layer.
//!
//! # Features
//!
//! - **inproc only**: endpoints use the `inproc://` scheme and live in a
//!   per-context registry protected by `DashMap`, as with libzmq
//! - **Mailboxes**: every socket owns a `flume` mailbox; connected peers hold
//!   its sender
//! - **Instrumented**: counts native calls, records the timeout of every poll
//!   and can inject interruptions or failures into upcoming polls
//!
//! Frames are not filtered by SUB topics and there is no high-water mark;
//! the option values are stored and reported back but do not change routing.
//! `ZMQ_RCVTIMEO` is honoured by blocking receives.
//!
//! # Usage
//!
//! ```rust
//! use tether_core::loopback::LoopbackBackend;
//! use tether_core::native::Backend;
//! use tether_core::socket_type::SocketKind;
//!
//! let backend = LoopbackBackend::new();
//! let ctx = backend.context(1).unwrap();
//! let server = backend.socket(&ctx, SocketKind::Pair).unwrap();
//! let client = backend.socket(&ctx, SocketKind::Pair).unwrap();
//! backend.bind(&server, "inproc://echo").unwrap();
//! backend.connect(&client, "inproc://echo").unwrap();
//!
//! backend.send(&client, backend.frame(b"ping"), false).unwrap();
//! let frame = backend.recv(&server, true).unwrap();
//! assert_eq!(&frame[..], b"ping");
//! ```

use crate::native::{Backend, Events, NativeError, NativeResult, PollItem, Release, Version};
use crate::options::{Access, OptionValue, SocketOption};
use crate::socket_type::SocketKind;
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

const ENOENT: i32 = 2;
const EBUSY: i32 = 16;
const EINVAL: i32 = 22;
const EPROTONOSUPPORT: i32 = 93;
const EADDRINUSE: i32 = 98;
const ECONNREFUSED: i32 = 111;

const INPROC_PREFIX: &str = "inproc://";
const RECV_SLICE: Duration = Duration::from_millis(10);
const POLL_SLICE: Duration = Duration::from_millis(1);

/// A fault injected into an upcoming loopback poll.
#[derive(Debug, Clone)]
pub enum PollFault {
    /// Wait up to `after` (never beyond the poll's timeout), then fail with EINTR
    Interrupt { after: Duration },
    /// Fail immediately with the given error
    Fail(NativeError),
}

struct Envelope {
    data: Bytes,
    more: bool,
}

#[derive(Default)]
struct Shared {
    calls: AtomicUsize,
    next_socket: AtomicU64,
    released_sockets: AtomicUsize,
    released_contexts: AtomicUsize,
    poll_timeouts: Mutex<Vec<i64>>,
    poll_faults: Mutex<VecDeque<PollFault>>,
}

/// In-process backend. Clones share counters and fault queues.
#[derive(Clone, Default)]
pub struct LoopbackBackend {
    shared: Arc<Shared>,
}

struct ContextState {
    endpoints: DashMap<String, Arc<SocketState>>,
    live_sockets: AtomicUsize,
    terminated: AtomicBool,
}

/// Loopback context: an endpoint registry.
pub struct LoopbackContext {
    io_threads: i32,
    state: Arc<ContextState>,
    shared: Arc<Shared>,
}

#[derive(Clone)]
struct Peer {
    id: u64,
    endpoint: String,
    inbox: Sender<Envelope>,
}

struct SocketState {
    id: u64,
    kind: SocketKind,
    inbox_tx: Sender<Envelope>,
    inbox_rx: Receiver<Envelope>,
    peers: Mutex<Vec<Peer>>,
    cursor: AtomicUsize,
    bound: Mutex<Vec<String>>,
    options: Mutex<HashMap<SocketOption, OptionValue>>,
    rcvmore: AtomicBool,
    last_endpoint: Mutex<String>,
}

/// Loopback socket.
pub struct LoopbackSocket {
    state: Arc<SocketState>,
    context: Arc<ContextState>,
    shared: Arc<Shared>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of native calls made through this backend (and its clones).
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    /// Timeout passed to every poll so far, in call order.
    pub fn poll_timeouts(&self) -> Vec<i64> {
        self.shared.poll_timeouts.lock().clone()
    }

    /// Queue a fault for the next poll that has not consumed one yet.
    pub fn inject_poll_fault(&self, fault: PollFault) {
        self.shared.poll_faults.lock().push_back(fault);
    }

    pub fn released_sockets(&self) -> usize {
        self.shared.released_sockets.load(Ordering::SeqCst)
    }

    pub fn released_contexts(&self) -> usize {
        self.shared.released_contexts.load(Ordering::SeqCst)
    }

    fn count(&self) {
        self.shared.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl LoopbackContext {
    pub fn io_threads(&self) -> i32 {
        self.io_threads
    }

    /// Names of endpoints currently bound in this context.
    pub fn endpoints(&self) -> Vec<String> {
        self.state
            .endpoints
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Release for LoopbackContext {
    fn release(self) -> NativeResult<()> {
        self.state.terminated.store(true, Ordering::SeqCst);
        self.shared.released_contexts.fetch_add(1, Ordering::SeqCst);
        let live = self.state.live_sockets.load(Ordering::SeqCst);
        if live > 0 {
            return Err(NativeError::other(
                EBUSY,
                format!("context terminated with {live} open sockets"),
            ));
        }
        Ok(())
    }
}

impl LoopbackSocket {
    pub fn kind(&self) -> SocketKind {
        self.state.kind
    }

    fn ensure_open(&self) -> NativeResult<()> {
        if self.context.terminated.load(Ordering::SeqCst) {
            Err(NativeError::Terminated)
        } else {
            Ok(())
        }
    }

    fn live_peers(&self) -> Vec<Peer> {
        let mut peers = self.state.peers.lock();
        peers.retain(|peer| !peer.inbox.is_disconnected());
        peers.clone()
    }

    fn readiness(&self) -> Events {
        let mut revents = Events::NONE;
        if !self.state.inbox_rx.is_empty() {
            revents |= Events::READ;
        }
        if self.state.kind.is_broadcast() || !self.live_peers().is_empty() {
            revents |= Events::WRITE;
        }
        revents
    }

    fn recv_timeout(&self) -> Option<Duration> {
        match self.state.options.lock().get(&SocketOption::RcvTimeo) {
            Some(OptionValue::Int(ms)) if *ms >= 0 => Some(Duration::from_millis(u64::from(ms.unsigned_abs()))),
            _ => None,
        }
    }

    fn deliver(&self, envelope: Envelope) -> Bytes {
        self.state.rcvmore.store(envelope.more, Ordering::SeqCst);
        envelope.data
    }
}

impl Release for LoopbackSocket {
    fn release(self) -> NativeResult<()> {
        for endpoint in self.state.bound.lock().drain(..) {
            self.context
                .endpoints
                .remove_if(&endpoint, |_, bound| bound.id == self.state.id);
        }
        self.state.peers.lock().clear();
        self.context.live_sockets.fetch_sub(1, Ordering::SeqCst);
        self.shared.released_sockets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn endpoint_name(endpoint: &str) -> NativeResult<&str> {
    let name = endpoint
        .strip_prefix(INPROC_PREFIX)
        .ok_or_else(|| NativeError::other(EPROTONOSUPPORT, "Protocol not supported"))?;
    if name.is_empty() {
        return Err(NativeError::other(EINVAL, "Invalid argument"));
    }
    Ok(name)
}

fn default_option(option: SocketOption) -> OptionValue {
    match option {
        SocketOption::Affinity => OptionValue::Long(0),
        SocketOption::Identity => OptionValue::Bytes(Vec::new()),
        SocketOption::Rate => OptionValue::Int(100),
        SocketOption::RecoveryIvl => OptionValue::Int(10_000),
        SocketOption::ReconnectIvl => OptionValue::Int(100),
        SocketOption::SndHwm | SocketOption::RcvHwm => OptionValue::Int(1000),
        SocketOption::Linger | SocketOption::RcvTimeo | SocketOption::SndTimeo => OptionValue::Int(-1),
        _ => OptionValue::Int(0),
    }
}

impl Backend for LoopbackBackend {
    type Context = LoopbackContext;
    type Socket = LoopbackSocket;
    type Frame = Bytes;

    fn version(&self) -> Version {
        Version {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }

    fn context(&self, io_threads: i32) -> NativeResult<LoopbackContext> {
        self.count();
        if io_threads < 0 {
            return Err(NativeError::other(EINVAL, "Invalid argument"));
        }
        Ok(LoopbackContext {
            io_threads,
            state: Arc::new(ContextState {
                endpoints: DashMap::new(),
                live_sockets: AtomicUsize::new(0),
                terminated: AtomicBool::new(false),
            }),
            shared: self.shared.clone(),
        })
    }

    fn socket(&self, context: &LoopbackContext, kind: SocketKind) -> NativeResult<LoopbackSocket> {
        self.count();
        if context.state.terminated.load(Ordering::SeqCst) {
            return Err(NativeError::Terminated);
        }
        let (inbox_tx, inbox_rx) = flume::unbounded();
        context.state.live_sockets.fetch_add(1, Ordering::SeqCst);
        Ok(LoopbackSocket {
            state: Arc::new(SocketState {
                id: self.shared.next_socket.fetch_add(1, Ordering::SeqCst),
                kind,
                inbox_tx,
                inbox_rx,
                peers: Mutex::new(Vec::new()),
                cursor: AtomicUsize::new(0),
                bound: Mutex::new(Vec::new()),
                options: Mutex::new(HashMap::new()),
                rcvmore: AtomicBool::new(false),
                last_endpoint: Mutex::new(String::new()),
            }),
            context: context.state.clone(),
            shared: self.shared.clone(),
        })
    }

    fn bind(&self, socket: &LoopbackSocket, endpoint: &str) -> NativeResult<()> {
        self.count();
        socket.ensure_open()?;
        let name = endpoint_name(endpoint)?;
        match socket.context.endpoints.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(NativeError::other(EADDRINUSE, "Address already in use")),
            Entry::Vacant(slot) => {
                slot.insert(socket.state.clone());
            }
        }
        socket.state.bound.lock().push(name.to_string());
        *socket.state.last_endpoint.lock() = endpoint.to_string();
        Ok(())
    }

    fn unbind(&self, socket: &LoopbackSocket, endpoint: &str) -> NativeResult<()> {
        self.count();
        socket.ensure_open()?;
        let name = endpoint_name(endpoint)?;
        let removed = socket
            .context
            .endpoints
            .remove_if(name, |_, bound| bound.id == socket.state.id);
        if removed.is_none() {
            return Err(NativeError::other(ENOENT, "No such file or directory"));
        }
        socket.state.bound.lock().retain(|bound| bound != name);
        Ok(())
    }

    fn connect(&self, socket: &LoopbackSocket, endpoint: &str) -> NativeResult<()> {
        self.count();
        socket.ensure_open()?;
        let name = endpoint_name(endpoint)?;
        let target = socket
            .context
            .endpoints
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| NativeError::other(ECONNREFUSED, "Connection refused"))?;
        if !socket.state.kind.is_compatible(target.kind) {
            return Err(NativeError::other(
                EINVAL,
                format!("{} cannot connect to {}", socket.state.kind, target.kind),
            ));
        }

        socket.state.peers.lock().push(Peer {
            id: target.id,
            endpoint: name.to_string(),
            inbox: target.inbox_tx.clone(),
        });
        target.peers.lock().push(Peer {
            id: socket.state.id,
            endpoint: name.to_string(),
            inbox: socket.state.inbox_tx.clone(),
        });
        *socket.state.last_endpoint.lock() = endpoint.to_string();
        Ok(())
    }

    fn disconnect(&self, socket: &LoopbackSocket, endpoint: &str) -> NativeResult<()> {
        self.count();
        socket.ensure_open()?;
        let name = endpoint_name(endpoint)?;
        let mut removed = Vec::new();
        socket.state.peers.lock().retain(|peer| {
            if peer.endpoint == name {
                removed.push(peer.id);
                false
            } else {
                true
            }
        });
        if removed.is_empty() {
            return Err(NativeError::other(ENOENT, "No such file or directory"));
        }
        if let Some(target) = socket.context.endpoints.get(name) {
            target
                .peers
                .lock()
                .retain(|peer| peer.id != socket.state.id);
        }
        Ok(())
    }

    fn frame(&self, data: &[u8]) -> Bytes {
        self.count();
        Bytes::copy_from_slice(data)
    }

    fn empty_frame(&self) -> Bytes {
        self.count();
        Bytes::new()
    }

    fn copy_frame(&self, frame: &Bytes) -> Bytes {
        self.count();
        Bytes::copy_from_slice(frame)
    }

    fn send(&self, socket: &LoopbackSocket, frame: Bytes, more: bool) -> NativeResult<()> {
        self.count();
        socket.ensure_open()?;
        let peers = socket.live_peers();
        if socket.state.kind.is_broadcast() {
            for peer in &peers {
                let _ = peer.inbox.send(Envelope {
                    data: frame.clone(),
                    more,
                });
            }
            return Ok(());
        }
        if peers.is_empty() {
            return Err(NativeError::Again);
        }

        // Parts of one message stay on one peer; the cursor moves on the last part.
        let index = if more {
            socket.state.cursor.load(Ordering::SeqCst)
        } else {
            socket.state.cursor.fetch_add(1, Ordering::SeqCst)
        } % peers.len();
        peers[index]
            .inbox
            .send(Envelope { data: frame, more })
            .map_err(|_| NativeError::Again)
    }

    fn recv(&self, socket: &LoopbackSocket, dont_wait: bool) -> NativeResult<Bytes> {
        self.count();
        socket.ensure_open()?;
        let timeout = socket.recv_timeout();
        if dont_wait || timeout == Some(Duration::ZERO) {
            return match socket.state.inbox_rx.try_recv() {
                Ok(envelope) => Ok(socket.deliver(envelope)),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => Err(NativeError::Again),
            };
        }

        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        loop {
            let slice = deadline.map_or(RECV_SLICE, |deadline| {
                deadline.saturating_duration_since(Instant::now()).min(RECV_SLICE)
            });
            match socket.state.inbox_rx.recv_timeout(slice) {
                Ok(envelope) => return Ok(socket.deliver(envelope)),
                Err(RecvTimeoutError::Timeout) => {
                    socket.ensure_open()?;
                    if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                        return Err(NativeError::Again);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(NativeError::Terminated),
            }
        }
    }

    fn poll(&self, items: &mut [PollItem<'_, LoopbackSocket>], timeout_ms: i64) -> NativeResult<usize> {
        self.count();
        self.shared.poll_timeouts.lock().push(timeout_ms);

        let fault = self.shared.poll_faults.lock().pop_front();
        match fault {
            Some(PollFault::Interrupt { after }) => {
                let wait = match u64::try_from(timeout_ms) {
                    Ok(ms) => after.min(Duration::from_millis(ms)),
                    Err(_) => after,
                };
                thread::sleep(wait);
                trace!("[LOOPBACK] Poll interrupted after {:?}", wait);
                return Err(NativeError::Interrupted);
            }
            Some(PollFault::Fail(err)) => return Err(err),
            None => {}
        }

        let deadline = u64::try_from(timeout_ms)
            .ok()
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        loop {
            let mut ready = 0;
            for item in items.iter_mut() {
                item.socket.ensure_open()?;
                let available = item.socket.readiness();
                item.revents = Events::NONE;
                for event in [Events::READ, Events::WRITE, Events::ERROR] {
                    if item.events.contains(event) && available.contains(event) {
                        item.revents |= event;
                    }
                }
                if !item.revents.is_empty() {
                    ready += 1;
                }
            }
            if ready > 0 || deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(ready);
            }
            thread::sleep(POLL_SLICE);
        }
    }

    fn get_option(&self, socket: &LoopbackSocket, option: SocketOption) -> NativeResult<OptionValue> {
        self.count();
        socket.ensure_open()?;
        match option {
            SocketOption::RcvMore => Ok(OptionValue::Bool(socket.state.rcvmore.load(Ordering::SeqCst))),
            SocketOption::LastEndpoint => Ok(OptionValue::Text(socket.state.last_endpoint.lock().clone())),
            _ if option.access() == Access::WriteOnly => Err(NativeError::other(EINVAL, "Invalid argument")),
            _ => Ok(socket
                .state
                .options
                .lock()
                .get(&option)
                .cloned()
                .unwrap_or_else(|| default_option(option))),
        }
    }

    fn set_option(&self, socket: &LoopbackSocket, option: SocketOption, value: &OptionValue) -> NativeResult<()> {
        self.count();
        socket.ensure_open()?;
        if option.check_set(value).is_err() {
            return Err(NativeError::other(EINVAL, "Invalid argument"));
        }
        if option.access() == Access::ReadWrite {
            socket.state.options.lock().insert(option, value.clone());
        }
        Ok(())
    }
}
