//! The native messaging library seam.
//!
//! Everything the binding layer needs from a ZeroMQ-style library is expressed
//! by the [`Backend`] trait. The bridge never touches native state except
//! through it, which keeps handle validation, lifecycle and polling logic
//! independent of libzmq itself.

use crate::options::{OptionValue, SocketOption};
use crate::socket_type::SocketKind;
use std::fmt;
use std::ops::{BitOr, BitOrAssign, Deref};
use thiserror::Error;

/// Errno conditions the binding layer distinguishes.
///
/// Codes follow Linux errno numbering, with libzmq's own codes for `ETERM`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    /// EAGAIN: non-blocking operation could not complete
    #[error("Resource temporarily unavailable")]
    Again,

    /// EINTR: interrupted by delivery of a signal
    #[error("Interrupted system call")]
    Interrupted,

    /// ETERM: the owning context was terminated
    #[error("Context was terminated")]
    Terminated,

    /// EFAULT: invalid argument table
    #[error("Bad address")]
    Fault,

    /// Any other native failure
    #[error("{message}")]
    Other { code: i32, message: String },
}

const EINTR: i32 = 4;
const EAGAIN: i32 = 11;
const EFAULT: i32 = 14;
const ETERM: i32 = 156_384_765;

impl NativeError {
    /// Create an error from a native code and its description.
    pub fn other(code: i32, message: impl Into<String>) -> Self {
        Self::Other {
            code,
            message: message.into(),
        }
    }

    /// Native errno value for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::Again => EAGAIN,
            Self::Interrupted => EINTR,
            Self::Terminated => ETERM,
            Self::Fault => EFAULT,
            Self::Other { code, .. } => *code,
        }
    }
}

/// Result type for native calls
pub type NativeResult<T> = std::result::Result<T, NativeError>;

/// Native library version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: i32,
    pub minor: i32,
    pub patch: i32,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Poll event bitmask (ZMQ_POLLIN / ZMQ_POLLOUT / ZMQ_POLLERR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Events(u8);

impl Events {
    /// No events
    pub const NONE: Self = Self(0);
    /// At least one frame can be received without blocking
    pub const READ: Self = Self(1);
    /// At least one frame can be sent without blocking
    pub const WRITE: Self = Self(2);
    /// Error condition on the socket
    pub const ERROR: Self = Self(4);

    /// Raw bitmask
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `other` is set in `self`
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// True when no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Events {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Events {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One entry of the native poll table.
#[derive(Debug)]
pub struct PollItem<'a, S> {
    /// Socket to poll
    pub socket: &'a S,
    /// Requested events
    pub events: Events,
    /// Events reported by the last native poll
    pub revents: Events,
}

impl<'a, S> PollItem<'a, S> {
    pub fn new(socket: &'a S, events: Events) -> Self {
        Self {
            socket,
            events,
            revents: Events::NONE,
        }
    }
}

/// Native resources that need an explicit close.
///
/// `release` consumes the resource, so the type system already rules out a
/// second close of the same value.
pub trait Release {
    fn release(self) -> NativeResult<()>;
}

/// A ZeroMQ-style native messaging library.
///
/// Implementations must not retry interrupted calls themselves; `poll` in
/// particular has to surface [`NativeError::Interrupted`] so the caller can
/// consult the host before retrying.
pub trait Backend {
    /// Native context (I/O thread pool)
    type Context: Release;
    /// Native socket bound to one context
    type Socket: Release;
    /// Native message frame
    type Frame: Deref<Target = [u8]>;

    /// Library version
    fn version(&self) -> Version;

    /// Create a context with `io_threads` I/O worker threads.
    fn context(&self, io_threads: i32) -> NativeResult<Self::Context>;

    /// Create a socket of `kind` inside `context`.
    fn socket(&self, context: &Self::Context, kind: SocketKind) -> NativeResult<Self::Socket>;

    fn bind(&self, socket: &Self::Socket, endpoint: &str) -> NativeResult<()>;

    fn unbind(&self, socket: &Self::Socket, endpoint: &str) -> NativeResult<()>;

    fn connect(&self, socket: &Self::Socket, endpoint: &str) -> NativeResult<()>;

    fn disconnect(&self, socket: &Self::Socket, endpoint: &str) -> NativeResult<()>;

    /// Allocate a frame holding a copy of `data`.
    fn frame(&self, data: &[u8]) -> Self::Frame;

    /// Allocate a zero-length frame.
    fn empty_frame(&self) -> Self::Frame;

    /// Copy a frame so the original stays usable after the copy is sent.
    fn copy_frame(&self, frame: &Self::Frame) -> Self::Frame;

    /// Send one frame; `more` marks it as a non-terminal part.
    fn send(&self, socket: &Self::Socket, frame: Self::Frame, more: bool) -> NativeResult<()>;

    /// Receive one frame; with `dont_wait` an empty queue yields [`NativeError::Again`].
    fn recv(&self, socket: &Self::Socket, dont_wait: bool) -> NativeResult<Self::Frame>;

    /// Poll the item table once.
    ///
    /// `timeout_ms` is negative for an infinite wait. Returns the number of
    /// items with events and fills in each item's `revents`.
    fn poll(&self, items: &mut [PollItem<'_, Self::Socket>], timeout_ms: i64) -> NativeResult<usize>;

    fn get_option(&self, socket: &Self::Socket, option: SocketOption) -> NativeResult<OptionValue>;

    fn set_option(
        &self,
        socket: &Self::Socket,
        option: SocketOption,
        value: &OptionValue,
    ) -> NativeResult<()>;
}
