//! Exactly-once release of native resources.
//!
//! # The Problem
//!
//! A garbage-collected host decides on its own when a handle is unreachable.
//! Its collector may run late, twice, or from another thread, and the host
//! may also close a resource explicitly long before the collector notices.
//! A native object must nevertheless be destroyed exactly once, and a handle
//! whose object is gone must fail validation instead of dangling.
//!
//! # The Solution
//!
//! - [`Owned`] holds the native object in an `Option`. `close()` takes it out
//!   and releases it; a second `close()` finds nothing and reports `false`.
//!   `Drop` releases whatever is left as a safety net.
//! - The bridge keeps the emptied `Owned` in its handle table as a tombstone,
//!   so stale handles fail with [`HandleError::Released`](crate::error::HandleError).
//! - The host collector does not call into the bridge directly. It schedules
//!   teardown through a [`Finalizer`], which only enqueues the handle; the
//!   bridge drains the queue in [`Bridge::collect`] and before each new
//!   allocation, on its own thread.
//!
//! Do not rely on collector timing where the native resource is scarce
//! (for example an endpoint that must be free before it is bound again):
//! call [`Bridge::close`] deterministically.

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, Tag};
use crate::native::{Backend, NativeResult, Release};
use flume::{Receiver, Sender};
use tracing::{debug, error, trace, warn};

/// Owned native resource with an "already closed" guard.
pub struct Owned<R: Release> {
    resource: Option<R>,
    tag: Tag,
}

impl<R: Release> Owned<R> {
    pub fn new(resource: R, tag: Tag) -> Self {
        Self {
            resource: Some(resource),
            tag,
        }
    }

    /// The resource, unless it was released.
    pub fn get(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.resource.is_none()
    }

    /// Release the resource now.
    ///
    /// Returns `Ok(false)` if it was already released. A native error is
    /// returned as-is; the resource counts as released either way.
    pub fn close(&mut self) -> NativeResult<bool> {
        match self.resource.take() {
            Some(resource) => resource.release().map(|()| true),
            None => Ok(false),
        }
    }
}

impl<R: Release> Drop for Owned<R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            if let Err(err) = resource.release() {
                warn!("[LIFECYCLE] Releasing {} on drop failed: {}", self.tag, err);
            }
        }
    }
}

/// Frame held by a message handle. Releasing it just drops the frame.
pub struct HeldFrame<F>(pub F);

impl<F> Release for HeldFrame<F> {
    fn release(self) -> NativeResult<()> {
        Ok(())
    }
}

/// Collector-side entry point for scheduling teardown.
///
/// Cheap to clone and `Send` so a host finalizer running on any thread can
/// hold one.
#[derive(Debug, Clone)]
pub struct Finalizer {
    tx: Sender<Handle>,
}

impl Finalizer {
    /// Schedule `handle` for teardown.
    ///
    /// Returns `false` if the bridge is gone, in which case its drop has
    /// already released everything.
    pub fn schedule(&self, handle: impl Into<Handle>) -> bool {
        self.tx.send(handle.into()).is_ok()
    }
}

/// Bridge-side end of the finalizer channel.
pub(crate) struct FinalizerQueue {
    tx: Sender<Handle>,
    rx: Receiver<Handle>,
}

impl FinalizerQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub(crate) fn finalizer(&self) -> Finalizer {
        Finalizer { tx: self.tx.clone() }
    }

    pub(crate) fn drain(&self) -> Vec<Handle> {
        self.rx.try_iter().collect()
    }

    pub(crate) fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl<B: Backend> Bridge<B> {
    /// Tear down the resource behind `handle` deterministically.
    ///
    /// Returns `Ok(true)` if the native resource was released by this call
    /// and `Ok(false)` if it had already been released. Closing a context
    /// while sockets created from it are still live is logged; if the native
    /// layer then reports a close error it is returned, not recovered.
    pub fn close(&mut self, handle: impl Into<Handle>) -> Result<bool> {
        self.teardown(handle.into())
    }

    /// A handle the host collector can use to schedule teardown.
    pub fn finalizer(&self) -> Finalizer {
        self.finalizers.finalizer()
    }

    /// Number of teardown requests waiting in the finalizer queue.
    pub fn pending_finalizers(&self) -> usize {
        self.finalizers.pending()
    }

    /// Run scheduled finalizers, then drop the tombstones of released
    /// resources. Returns the number of resources released.
    pub fn collect(&mut self) -> usize {
        let released = self.run_finalizers();
        let pruned = self.handles.prune();
        trace!("[LIFECYCLE] Collected {} resources, pruned {} tombstones", released, pruned);
        released
    }

    pub(crate) fn run_finalizers(&mut self) -> usize {
        let mut released = 0;
        for handle in self.finalizers.drain() {
            match self.teardown(handle) {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(err) => error!("[LIFECYCLE] Finalizer for {} failed: {}", handle, err),
            }
        }
        released
    }

    /// Sockets still open on the context behind `handle`, counted only when
    /// that context is live and a close would release it.
    pub(crate) fn orphaned_sockets(&mut self, handle: &Handle) -> Result<usize> {
        if handle.tag() != Tag::Context {
            return Ok(0);
        }
        let live = matches!(self.handles.resource_mut(handle)?, Some(resource) if !resource.is_released());
        if live {
            Ok(self.handles.live_sockets_of(handle.slot()))
        } else {
            Ok(0)
        }
    }

    fn teardown(&mut self, handle: Handle) -> Result<bool> {
        let orphans = self.orphaned_sockets(&handle)?;
        if orphans > 0 {
            warn!(
                "[LIFECYCLE] Closing {} while {} of its sockets are still open",
                handle, orphans
            );
        }

        let Some(resource) = self.handles.resource_mut(&handle)? else {
            trace!("[LIFECYCLE] {} already collected", handle);
            return Ok(false);
        };
        let closed = resource.close();
        if !matches!(closed, Ok(false)) {
            self.handles.note_released();
        }
        match closed {
            Ok(true) => {
                debug!("[LIFECYCLE] Released {}", handle);
                Ok(true)
            }
            Ok(false) => {
                trace!("[LIFECYCLE] {} already released", handle);
                Ok(false)
            }
            Err(err) => {
                error!("[LIFECYCLE] Native close of {} failed: {}", handle, err);
                self.last_error = Some(err.clone());
                Err(BridgeError::Native(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeError;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counted {
        releases: Rc<Cell<u32>>,
        fail: bool,
    }

    impl Release for Counted {
        fn release(self) -> NativeResult<()> {
            self.releases.set(self.releases.get() + 1);
            if self.fail {
                Err(NativeError::other(16, "Device or resource busy"))
            } else {
                Ok(())
            }
        }
    }

    fn counted(fail: bool) -> (Owned<Counted>, Rc<Cell<u32>>) {
        let releases = Rc::new(Cell::new(0));
        let owned = Owned::new(
            Counted {
                releases: releases.clone(),
                fail,
            },
            Tag::Socket,
        );
        (owned, releases)
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut owned, releases) = counted(false);
        assert_eq!(owned.close(), Ok(true));
        assert_eq!(owned.close(), Ok(false));
        assert!(owned.is_closed());
        drop(owned);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_drop_releases_once() {
        let (owned, releases) = counted(false);
        drop(owned);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_failed_close_still_consumes() {
        let (mut owned, releases) = counted(true);
        assert!(owned.close().is_err());
        assert!(owned.is_closed());
        assert!(owned.get().is_none());
        drop(owned);
        assert_eq!(releases.get(), 1);
    }

    #[test]
    fn test_finalizer_queue_drains_in_order() {
        let queue = FinalizerQueue::new();
        let finalizer = queue.finalizer();
        let mut table: crate::handle::HandleTable<crate::loopback::LoopbackBackend> =
            crate::handle::HandleTable::new();
        let a = table.attach(crate::handle::Resource::Message(Owned::new(
            HeldFrame(bytes::Bytes::new()),
            Tag::Message,
        )));
        let b = table.attach(crate::handle::Resource::Message(Owned::new(
            HeldFrame(bytes::Bytes::new()),
            Tag::Message,
        )));

        let remote = finalizer.clone();
        std::thread::spawn(move || assert!(remote.schedule(a)))
            .join()
            .unwrap();
        assert!(finalizer.schedule(b));

        assert_eq!(queue.pending(), 2);
        assert_eq!(queue.drain(), vec![a, b]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_orphans_counted_only_for_live_context() {
        let mut bridge = Bridge::new(crate::loopback::LoopbackBackend::new());
        let ctx = bridge.init_context(1).unwrap();
        let _socket = bridge.init_socket(&ctx, "PAIR").unwrap().unwrap();
        assert_eq!(bridge.orphaned_sockets(&ctx.raw()).unwrap(), 1);

        let mut other = Bridge::new(crate::loopback::LoopbackBackend::new());
        assert!(other.orphaned_sockets(&ctx.raw()).is_err());

        assert!(bridge.close(ctx).is_err());
        assert_eq!(bridge.orphaned_sockets(&ctx.raw()).unwrap(), 0);
        assert!(!bridge.close(ctx).unwrap());
    }
}
