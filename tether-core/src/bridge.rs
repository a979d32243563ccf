//! The binding bridge.
//!
//! A [`Bridge`] owns every native object a host created through it. Hosts
//! only ever see typed handles; each call validates its handles against the
//! bridge's [`HandleTable`] before touching the native layer.
//!
//! Failures come in two flavours:
//! - programming errors (bad handles, unknown names, wrong option values)
//!   return `Err` before any native call
//! - soft native failures (EAGAIN, refused connects, busy endpoints) are
//!   logged, recorded in [`Bridge::last_error`] and reported as `false` or
//!   `None`
//!
//! A bridge is driven from one thread at a time; concurrent native use of a
//! single socket is undefined, so every mutating call takes `&mut self` and
//! only the [`Finalizer`](crate::lifecycle::Finalizer) crosses threads.
//!
//! Message transfer, polling and teardown live in their own modules as
//! further `impl Bridge` blocks.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::handle::{ContextHandle, HandleTable, Resource, SocketHandle, Tag};
use crate::lifecycle::{FinalizerQueue, Owned};
use crate::native::{Backend, NativeError, NativeResult, Version};
use crate::options::{OptionValue, SocketOption};
use crate::socket_type::SocketKind;
use tracing::{debug, error, trace, warn};

type EndpointCall<B> = fn(&B, &<B as Backend>::Socket, &str) -> NativeResult<()>;

/// Binding layer between a host and one native backend.
pub struct Bridge<B: Backend> {
    pub(crate) backend: B,
    pub(crate) handles: HandleTable<B>,
    pub(crate) finalizers: FinalizerQueue,
    pub(crate) config: BridgeConfig,
    pub(crate) last_error: Option<NativeError>,
}

impl<B: Backend> Bridge<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, BridgeConfig::default())
    }

    pub fn with_config(backend: B, config: BridgeConfig) -> Self {
        debug!("[BRIDGE] Created with {:?}", config);
        Self {
            backend,
            handles: HandleTable::new(),
            finalizers: FinalizerQueue::new(),
            config,
            last_error: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn handles(&self) -> &HandleTable<B> {
        &self.handles
    }

    /// Number of live resources of kind `tag`.
    pub fn live(&self, tag: Tag) -> usize {
        self.handles.live(tag)
    }

    /// Native library version.
    pub fn version(&self) -> Version {
        self.backend.version()
    }

    /// The most recent soft native failure, if any.
    pub fn last_error(&self) -> Option<&NativeError> {
        self.last_error.as_ref()
    }

    pub fn clear_last_error(&mut self) {
        self.last_error = None;
    }

    pub(crate) fn soft_failure(&mut self, op: &str, detail: impl std::fmt::Display, err: NativeError) {
        warn!("[{}] {}: {}", op, detail, err);
        self.last_error = Some(err);
    }

    /// Allocation points double as collection points.
    pub(crate) fn before_attach(&mut self) {
        if self.config.collect_on_attach && self.finalizers.pending() > 0 {
            let released = self.run_finalizers();
            trace!("[LIFECYCLE] Released {} resources before attach", released);
        }
        let pruned = self.handles.prune_if_full();
        if pruned > 0 {
            trace!("[LIFECYCLE] Pruned {} tombstones before attach", pruned);
        }
    }

    /// Create a native context with `io_threads` I/O threads.
    ///
    /// Returns `None` if the native layer refuses (the reason is logged and
    /// kept in [`last_error`](Self::last_error)).
    pub fn init_context(&mut self, io_threads: i32) -> Option<ContextHandle> {
        self.before_attach();
        match self.backend.context(io_threads) {
            Ok(context) => {
                let raw = self
                    .handles
                    .attach(Resource::Context(Owned::new(context, Tag::Context)));
                debug!("[CONTEXT] Created {} with {} I/O threads", raw, io_threads);
                Some(ContextHandle::new(raw))
            }
            Err(err) => {
                self.soft_failure("CONTEXT", "init failed", err);
                None
            }
        }
    }

    /// Create a context with the configured I/O thread count.
    pub fn init_default_context(&mut self) -> Option<ContextHandle> {
        self.init_context(self.config.io_threads)
    }

    /// Create a socket of the named kind (`"ZMQ_REQ"`, `"PUB"`, ...).
    ///
    /// An unknown kind name is logged and yields `Ok(None)`.
    pub fn init_socket(&mut self, context: &ContextHandle, kind: &str) -> Result<Option<SocketHandle>> {
        self.handles.validate(Some(&context.raw()), Tag::Context)?;
        match kind.parse::<SocketKind>() {
            Ok(kind) => self.open_socket(context, kind),
            Err(err) => {
                warn!("[SOCKET] {}", err);
                Ok(None)
            }
        }
    }

    /// Create a socket of a known kind and apply the configured defaults.
    pub fn open_socket(&mut self, context: &ContextHandle, kind: SocketKind) -> Result<Option<SocketHandle>> {
        self.before_attach();
        let native_context = self.handles.context(context)?;
        let socket = match self.backend.socket(native_context, kind) {
            Ok(socket) => socket,
            Err(err) => {
                self.soft_failure("SOCKET", kind, err);
                return Ok(None);
            }
        };

        for (option, value) in &self.config.socket_defaults {
            if let Err(err) = self.backend.set_option(&socket, *option, value) {
                warn!("[SOCKET] Default {} = {:?} rejected: {}", option, value, err);
            }
        }

        let raw = self.handles.attach(Resource::Socket {
            socket: Owned::new(socket, Tag::Socket),
            context: context.raw().slot(),
        });
        debug!("[SOCKET] Created {} socket {} in {}", kind, raw, context);
        Ok(Some(SocketHandle::new(raw)))
    }

    pub fn bind(&mut self, socket: &SocketHandle, endpoint: &str) -> Result<bool> {
        self.endpoint_call("BIND", socket, endpoint, B::bind)
    }

    pub fn unbind(&mut self, socket: &SocketHandle, endpoint: &str) -> Result<bool> {
        self.endpoint_call("UNBIND", socket, endpoint, B::unbind)
    }

    pub fn connect(&mut self, socket: &SocketHandle, endpoint: &str) -> Result<bool> {
        self.endpoint_call("CONNECT", socket, endpoint, B::connect)
    }

    pub fn disconnect(&mut self, socket: &SocketHandle, endpoint: &str) -> Result<bool> {
        self.endpoint_call("DISCONNECT", socket, endpoint, B::disconnect)
    }

    fn endpoint_call(
        &mut self,
        op: &str,
        socket: &SocketHandle,
        endpoint: &str,
        call: EndpointCall<B>,
    ) -> Result<bool> {
        let native = self.handles.socket(socket)?;
        match call(&self.backend, native, endpoint) {
            Ok(()) => {
                debug!("[{}] {} {}", op, socket, endpoint);
                Ok(true)
            }
            Err(err) => {
                self.soft_failure(op, endpoint, err);
                Ok(false)
            }
        }
    }

    /// Read a socket option.
    ///
    /// Reading a write-only option is an argument error; a native refusal
    /// yields `Ok(None)`.
    pub fn get_option(&mut self, socket: &SocketHandle, option: SocketOption) -> Result<Option<OptionValue>> {
        let native = self.handles.socket(socket)?;
        option.check_get().map_err(BridgeError::InvalidArgument)?;
        match self.backend.get_option(native, option) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                self.soft_failure("OPTION", option, err);
                Ok(None)
            }
        }
    }

    /// Write a socket option.
    pub fn set_option(&mut self, socket: &SocketHandle, option: SocketOption, value: OptionValue) -> Result<bool> {
        let native = self.handles.socket(socket)?;
        option.check_set(&value).map_err(BridgeError::InvalidArgument)?;
        match self.backend.set_option(native, option, &value) {
            Ok(()) => {
                trace!("[OPTION] {} {} = {:?}", socket, option, value);
                Ok(true)
            }
            Err(err) => {
                self.soft_failure("OPTION", option, err);
                Ok(false)
            }
        }
    }
}

impl<B: Backend> Drop for Bridge<B> {
    fn drop(&mut self) {
        self.run_finalizers();
        for (tag, err) in self.handles.release_all() {
            error!("[LIFECYCLE] Releasing {} on shutdown failed: {}", tag, err);
        }
        trace!("[BRIDGE] Dropped");
    }
}
