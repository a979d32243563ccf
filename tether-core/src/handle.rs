//! Host-visible handles and the table that validates them.
//!
//! A host holds plain [`Handle`] values (or their typed wrappers) in its own
//! objects. Every operation looks its handle up in the bridge's
//! [`HandleTable`] before touching native state: the lookup rejects handles
//! that are absent, foreign, of the wrong kind, unknown, or already released.
//! The table is the one place where resources of different kinds live side by
//! side, so it is the only place a runtime tag is compared.

use crate::error::HandleError;
use crate::lifecycle::{HeldFrame, Owned};
use crate::native::{Backend, NativeResult};
use hashbrown::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_TABLE_ID: AtomicU32 = AtomicU32::new(1);

/// Resource kind carried by a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Context,
    Socket,
    Message,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Socket => "socket",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped handle as stored by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    table: u32,
    slot: u64,
    tag: Tag,
}

impl Handle {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.tag, self.table, self.slot)
    }
}

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident => $tag:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(Handle);

        impl $name {
            pub const TAG: Tag = $tag;

            pub(crate) fn new(handle: Handle) -> Self {
                debug_assert_eq!(handle.tag, Self::TAG);
                Self(handle)
            }

            /// The untyped handle, for storage in heterogeneous host values.
            pub fn raw(&self) -> Handle {
                self.0
            }
        }

        impl From<$name> for Handle {
            fn from(handle: $name) -> Handle {
                handle.0
            }
        }

        impl From<&$name> for Handle {
            fn from(handle: &$name) -> Handle {
                handle.0
            }
        }

        impl TryFrom<Handle> for $name {
            type Error = HandleError;

            fn try_from(handle: Handle) -> Result<Self, HandleError> {
                if handle.tag == Self::TAG {
                    Ok(Self(handle))
                } else {
                    Err(HandleError::TagMismatch {
                        expected: Self::TAG,
                        found: handle.tag,
                    })
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

typed_handle!(
    /// Handle to a native context.
    ContextHandle => Tag::Context
);
typed_handle!(
    /// Handle to a native socket.
    SocketHandle => Tag::Socket
);
typed_handle!(
    /// Handle to a host-referenced message frame.
    MessageHandle => Tag::Message
);

/// A native resource owned by the table.
pub(crate) enum Resource<B: Backend> {
    Context(Owned<B::Context>),
    Socket {
        socket: Owned<B::Socket>,
        context: u64,
    },
    Message(Owned<HeldFrame<B::Frame>>),
}

impl<B: Backend> Resource<B> {
    pub(crate) fn tag(&self) -> Tag {
        match self {
            Self::Context(_) => Tag::Context,
            Self::Socket { .. } => Tag::Socket,
            Self::Message(_) => Tag::Message,
        }
    }

    pub(crate) fn is_released(&self) -> bool {
        match self {
            Self::Context(owned) => owned.is_closed(),
            Self::Socket { socket, .. } => socket.is_closed(),
            Self::Message(owned) => owned.is_closed(),
        }
    }

    /// Release the native resource; `Ok(false)` if it was already released.
    pub(crate) fn close(&mut self) -> NativeResult<bool> {
        match self {
            Self::Context(owned) => owned.close(),
            Self::Socket { socket, .. } => socket.close(),
            Self::Message(owned) => owned.close(),
        }
    }
}

/// Slot table mapping handles to owned native resources.
///
/// Released resources leave a tombstone so that stale handles keep failing
/// with [`HandleError::Released`] until [`HandleTable::prune`] drops them.
/// At most [`TOMBSTONE_LIMIT`] tombstones accumulate between attachments;
/// past that, stale handles fail with [`HandleError::Unknown`] instead.
pub struct HandleTable<B: Backend> {
    id: u32,
    next_slot: u64,
    slots: HashMap<u64, Resource<B>>,
    tombstones: usize,
}

/// Tombstones kept before an attachment prunes them.
pub const TOMBSTONE_LIMIT: usize = 64;

impl<B: Backend> HandleTable<B> {
    pub fn new() -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            next_slot: 1,
            slots: HashMap::new(),
            tombstones: 0,
        }
    }

    pub(crate) fn attach(&mut self, resource: Resource<B>) -> Handle {
        let slot = self.next_slot;
        self.next_slot += 1;
        let handle = Handle {
            table: self.id,
            slot,
            tag: resource.tag(),
        };
        self.slots.insert(slot, resource);
        handle
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of released resources still occupying a slot.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    pub(crate) fn note_released(&mut self) {
        self.tombstones += 1;
    }

    /// Prune once the tombstone count reaches [`TOMBSTONE_LIMIT`].
    pub(crate) fn prune_if_full(&mut self) -> usize {
        if self.tombstones >= TOMBSTONE_LIMIT {
            self.prune()
        } else {
            0
        }
    }

    /// Check that `handle` names a live resource of kind `expected`.
    pub fn validate(&self, handle: Option<&Handle>, expected: Tag) -> Result<(), HandleError> {
        self.lookup(handle, expected).map(|_| ())
    }

    fn lookup(&self, handle: Option<&Handle>, expected: Tag) -> Result<&Resource<B>, HandleError> {
        let handle = handle.ok_or(HandleError::Absent)?;
        if handle.table != self.id {
            return Err(HandleError::Foreign);
        }
        if handle.tag != expected {
            return Err(HandleError::TagMismatch {
                expected,
                found: handle.tag,
            });
        }
        let resource = self
            .slots
            .get(&handle.slot)
            .ok_or(HandleError::Unknown(expected))?;
        if resource.tag() != expected {
            return Err(HandleError::TagMismatch {
                expected,
                found: resource.tag(),
            });
        }
        if resource.is_released() {
            return Err(HandleError::Released(expected));
        }
        Ok(resource)
    }

    pub(crate) fn context(&self, handle: &ContextHandle) -> Result<&B::Context, HandleError> {
        match self.lookup(Some(&handle.0), Tag::Context)? {
            Resource::Context(owned) => owned.get().ok_or(HandleError::Released(Tag::Context)),
            other => Err(mismatch(Tag::Context, other.tag())),
        }
    }

    pub(crate) fn socket(&self, handle: &SocketHandle) -> Result<&B::Socket, HandleError> {
        match self.lookup(Some(&handle.0), Tag::Socket)? {
            Resource::Socket { socket, .. } => socket.get().ok_or(HandleError::Released(Tag::Socket)),
            other => Err(mismatch(Tag::Socket, other.tag())),
        }
    }

    pub(crate) fn message(&self, handle: &MessageHandle) -> Result<&B::Frame, HandleError> {
        match self.lookup(Some(&handle.0), Tag::Message)? {
            Resource::Message(owned) => owned
                .get()
                .map(|held| &held.0)
                .ok_or(HandleError::Released(Tag::Message)),
            other => Err(mismatch(Tag::Message, other.tag())),
        }
    }

    /// Resolve a raw handle for teardown.
    ///
    /// Unknown slots yield `Ok(None)`: a pruned handle has nothing left to
    /// release.
    pub(crate) fn resource_mut(&mut self, handle: &Handle) -> Result<Option<&mut Resource<B>>, HandleError> {
        if handle.table != self.id {
            return Err(HandleError::Foreign);
        }
        match self.slots.get_mut(&handle.slot) {
            None => Ok(None),
            Some(resource) if resource.tag() != handle.tag => Err(HandleError::TagMismatch {
                expected: handle.tag,
                found: resource.tag(),
            }),
            Some(resource) => Ok(Some(resource)),
        }
    }

    /// Number of live sockets created from the context in `context_slot`.
    pub(crate) fn live_sockets_of(&self, context_slot: u64) -> usize {
        self.slots
            .values()
            .filter(|resource| match resource {
                Resource::Socket { socket, context } => *context == context_slot && !socket.is_closed(),
                _ => false,
            })
            .count()
    }

    /// Number of live (unreleased) resources of kind `tag`.
    pub fn live(&self, tag: Tag) -> usize {
        self.slots
            .values()
            .filter(|resource| resource.tag() == tag && !resource.is_released())
            .count()
    }

    /// Drop tombstones of released resources. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, resource| !resource.is_released());
        self.tombstones = 0;
        before - self.slots.len()
    }

    /// Release every resource, messages first, then sockets, then contexts.
    ///
    /// Returns the errors reported by the native layer, in release order.
    pub(crate) fn release_all(&mut self) -> Vec<(Tag, crate::native::NativeError)> {
        let mut errors = Vec::new();
        for tag in [Tag::Message, Tag::Socket, Tag::Context] {
            for resource in self.slots.values_mut().filter(|r| r.tag() == tag) {
                if let Err(err) = resource.close() {
                    errors.push((tag, err));
                }
            }
        }
        self.slots.clear();
        self.tombstones = 0;
        errors
    }
}

impl<B: Backend> Default for HandleTable<B> {
    fn default() -> Self {
        Self::new()
    }
}

fn mismatch(expected: Tag, found: Tag) -> HandleError {
    HandleError::TagMismatch { expected, found }
}
