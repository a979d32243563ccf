//! Bridge configuration
//!
//! Settings that apply to one [`Bridge`](crate::bridge::Bridge) for its whole
//! life: how new contexts and sockets are created, when queued finalizers run,
//! and how the poll loop reacts to interruptions.

use crate::interrupt::{InterruptProbe, NeverInterrupted};
use crate::options::{OptionValue, SocketOption};
use std::fmt;
use std::sync::Arc;

/// Bridge configuration.
///
/// # Examples
///
/// ```
/// use tether_core::config::BridgeConfig;
/// use tether_core::interrupt::InterruptFlag;
/// use tether_core::options::{OptionValue, SocketOption};
///
/// let flag = InterruptFlag::new();
/// let config = BridgeConfig::new()
///     .with_io_threads(2)
///     .with_interrupt_probe(flag.clone())
///     .with_socket_default(SocketOption::Linger, OptionValue::Int(0));
/// assert_eq!(config.io_threads, 2);
/// ```
#[derive(Clone)]
pub struct BridgeConfig {
    /// I/O thread count used by [`Bridge::init_default_context`](crate::bridge::Bridge::init_default_context)
    ///
    /// - Default: 1 (libzmq default)
    pub io_threads: i32,

    /// Run queued finalizers before every new context, socket or message.
    ///
    /// - `true` (default): allocation points double as collection points
    /// - `false`: finalizers only run from `Bridge::collect()`
    pub collect_on_attach: bool,

    /// Cap on retries after spurious interruptions of an infinite poll.
    ///
    /// Finite polls are bounded by their timeout budget and ignore this.
    /// - `None` (default): retry until an event or a real interrupt arrives
    /// - `Some(n)`: fail with `BridgeError::Interrupted` after n retries
    pub max_poll_retries: Option<u32>,

    /// Host interrupt check consulted when a poll is interrupted.
    ///
    /// - Default: `NeverInterrupted`
    pub interrupt_probe: Arc<dyn InterruptProbe + Send + Sync>,

    /// Options applied to every new socket, in order.
    ///
    /// A failing option is reported but does not fail socket creation.
    pub socket_defaults: Vec<(SocketOption, OptionValue)>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            io_threads: 1,
            collect_on_attach: true,
            max_poll_retries: None,
            interrupt_probe: Arc::new(NeverInterrupted),
            socket_defaults: Vec::new(),
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default I/O thread count.
    pub fn with_io_threads(mut self, io_threads: i32) -> Self {
        self.io_threads = io_threads;
        self
    }

    /// Enable or disable running finalizers on allocation.
    pub fn with_collect_on_attach(mut self, collect: bool) -> Self {
        self.collect_on_attach = collect;
        self
    }

    /// Cap retries of infinite polls after spurious interruptions.
    pub fn with_max_poll_retries(mut self, retries: Option<u32>) -> Self {
        self.max_poll_retries = retries;
        self
    }

    /// Set the host interrupt probe.
    pub fn with_interrupt_probe(mut self, probe: impl InterruptProbe + Send + Sync + 'static) -> Self {
        self.interrupt_probe = Arc::new(probe);
        self
    }

    /// Add an option applied to every new socket.
    pub fn with_socket_default(mut self, option: SocketOption, value: OptionValue) -> Self {
        self.socket_defaults.push((option, value));
        self
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("io_threads", &self.io_threads)
            .field("collect_on_attach", &self.collect_on_attach)
            .field("max_poll_retries", &self.max_poll_retries)
            .field("socket_defaults", &self.socket_defaults)
            .finish_non_exhaustive()
    }
}
