//! # Tether
//!
//! Safe handle lifecycle and interruptible polling for hosts that drive
//! ZeroMQ from a garbage-collected runtime.
//!
//! ## Architecture
//!
//! Tether is structured as a **binding kernel** with clean layering:
//!
//! - **`tether-core`**: handle table, exactly-once teardown, copying message
//!   transfer, budgeted polling and the native [`Backend`](native::Backend) seam
//! - **Backend crates**: adapters from the seam to a concrete library
//! - **`tether`**: Public API surface (this crate)
//!
//! ## Backends (opt-in via features)
//!
//! - **loopback** (always available) - in-process frames, no libzmq needed
//! - **`zmq`** - libzmq through the `zmq` crate
//!
//! ```toml
//! [dependencies]
//! tether = { version = "0.1", features = ["zmq"] }
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tether::prelude::*;
//! use tether::LoopbackBridge;
//!
//! # fn main() -> tether::Result<()> {
//! let mut bridge = LoopbackBridge::new(Default::default());
//! let ctx = bridge.init_default_context().expect("context");
//! let rep = bridge.init_socket(&ctx, "ZMQ_REP")?.expect("socket");
//! let req = bridge.init_socket(&ctx, "ZMQ_REQ")?.expect("socket");
//! bridge.bind(&rep, "inproc://hello")?;
//! bridge.connect(&req, "inproc://hello")?;
//!
//! bridge.send_str(&req, "hello", false)?;
//! let ready = bridge.poll(&[PollRequest::new(rep, ["read"])], 1000)?;
//! assert_eq!(ready[0].get(PollEvent::Read), Some(true));
//! assert_eq!(bridge.receive_string(&rep)?.as_deref(), Some("hello"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Host integration
//!
//! - Hand [`Handle`](handle::Handle) values to the host and convert them back
//!   with `TryFrom`; every call revalidates them.
//! - Give the host collector a [`Finalizer`](lifecycle::Finalizer); queued
//!   teardowns run on the bridge's thread.
//! - Install an [`InterruptProbe`](interrupt::InterruptProbe) so that a user
//!   interrupt unwinds a blocking poll.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export core types
pub use bytes::Bytes;
pub use tracing;
pub use tether_core::{
    bridge, codec, config, error, handle, interrupt, lifecycle, loopback, native, options, poll,
    socket_type, timeout, transfer,
};
pub use tether_core::bridge::Bridge;
pub use tether_core::error::{BridgeError, Result};

pub mod dev_tracing;

/// Common imports for hosts.
pub mod prelude {
    pub use tether_core::prelude::*;

    #[cfg(feature = "zmq")]
    pub use crate::ZmqBridge;
    pub use crate::LoopbackBridge;
}

/// Bridge over the in-process loopback backend.
pub type LoopbackBridge = Bridge<loopback::LoopbackBackend>;

/// libzmq backend.
#[cfg(feature = "zmq")]
pub use tether_zmq::{ZmqBackend, ZmqContext, ZmqSocket};

/// Bridge over libzmq.
#[cfg(feature = "zmq")]
pub type ZmqBridge = Bridge<tether_zmq::ZmqBackend>;
