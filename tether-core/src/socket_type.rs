//! Socket kind enumeration for ZeroMQ socket types.
//!
//! Hosts name socket kinds with the libzmq constant names (`"ZMQ_PAIR"`,
//! `"ZMQ_DEALER"`, ...). This module maps those names onto [`SocketKind`].

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// ZeroMQ socket kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketKind {
    /// PAIR socket for exclusive bidirectional communication
    Pair = 0,

    /// PUB socket for publishing messages to subscribers
    Pub = 1,

    /// SUB socket for subscribing to published messages
    Sub = 2,

    /// REQ socket for synchronous request-reply client
    Req = 3,

    /// REP socket for synchronous request-reply server
    Rep = 4,

    /// DEALER socket for asynchronous request-reply patterns
    Dealer = 5,

    /// ROUTER socket for routing messages by identity
    Router = 6,

    /// PULL socket for receiving messages from pushers
    Pull = 7,

    /// PUSH socket for sending messages to pullers
    Push = 8,

    /// XPUB socket for extended publisher with subscription awareness
    XPub = 9,

    /// XSUB socket for extended subscriber with dynamic subscriptions
    XSub = 10,
}

/// A socket kind name that is not in the catalogue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("socket type not found: {0}")]
pub struct UnknownSocketKind(pub String);

impl SocketKind {
    /// All kinds, in native constant order.
    pub const ALL: [Self; 11] = [
        Self::Pair,
        Self::Pub,
        Self::Sub,
        Self::Req,
        Self::Rep,
        Self::Dealer,
        Self::Router,
        Self::Pull,
        Self::Push,
        Self::XPub,
        Self::XSub,
    ];

    /// Get the socket kind as a string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pair => "PAIR",
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Req => "REQ",
            Self::Rep => "REP",
            Self::Dealer => "DEALER",
            Self::Router => "ROUTER",
            Self::Pull => "PULL",
            Self::Push => "PUSH",
            Self::XPub => "XPUB",
            Self::XSub => "XSUB",
        }
    }

    /// Check if this socket kind is compatible with the given peer kind.
    pub fn is_compatible(&self, peer: SocketKind) -> bool {
        matches!(
            (self, peer),
            (Self::Pair, Self::Pair)
                | (Self::Pub | Self::XPub, Self::Sub | Self::XSub)
                | (Self::Sub | Self::XSub, Self::Pub | Self::XPub)
                | (Self::Req, Self::Rep | Self::Router)
                | (Self::Rep, Self::Req | Self::Dealer)
                | (Self::Dealer, Self::Rep | Self::Router | Self::Dealer)
                | (Self::Router, Self::Req | Self::Dealer | Self::Router)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
        )
    }

    /// True for kinds that fan every outgoing frame out to all peers.
    pub fn is_broadcast(&self) -> bool {
        matches!(self, Self::Pub | Self::XPub)
    }
}

impl FromStr for SocketKind {
    type Err = UnknownSocketKind;

    /// Parse a libzmq constant name. The `ZMQ_` prefix is optional and the
    /// legacy `XREQ`/`XREP` aliases map to DEALER/ROUTER.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.strip_prefix("ZMQ_").unwrap_or(s);
        match name {
            "XREQ" => return Ok(Self::Dealer),
            "XREP" => return Ok(Self::Router),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| UnknownSocketKind(s.to_string()))
    }
}

impl fmt::Display for SocketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
