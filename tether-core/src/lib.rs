//! Tether Core
//!
//! Backend-agnostic building blocks for binding a garbage-collected host to
//! a native messaging library:
//! - Tagged handles and the slot table behind them (`handle`)
//! - Exactly-once teardown and collector finalizers (`lifecycle`)
//! - Copying message transfer and fixed-width decoding (`transfer`, `codec`)
//! - Interruptible, budgeted multi-socket polling (`poll`, `timeout`, `interrupt`)
//! - The native seam (`native`) and an in-process backend (`loopback`)
//! - Error types (`error`)

#![cfg_attr(not(test), deny(unsafe_code))]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod interrupt;
pub mod lifecycle;
pub mod loopback;
pub mod native;
pub mod options;
pub mod poll;
pub mod socket_type;
pub mod timeout;
pub mod transfer;

// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::bridge::Bridge;
    pub use crate::codec::{Codec, Utf8Codec};
    pub use crate::config::BridgeConfig;
    pub use crate::error::{BridgeError, HandleError, Result};
    pub use crate::handle::{ContextHandle, Handle, MessageHandle, SocketHandle, Tag};
    pub use crate::interrupt::{InterruptFlag, InterruptProbe, NeverInterrupted};
    pub use crate::lifecycle::Finalizer;
    pub use crate::native::{Backend, NativeError, Version};
    pub use crate::options::{OptionValue, SocketOption};
    pub use crate::poll::{PollEvent, PollOutcome, PollRequest};
    pub use crate::socket_type::SocketKind;
    pub use crate::transfer::Scalar;
}
