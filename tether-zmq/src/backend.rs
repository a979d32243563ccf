//! [`Backend`] implementation over the `zmq` crate.

use crate::error::native_error;
use crate::options;
use tether_core::native::{Backend, Events, NativeResult, PollItem, Release, Version};
use tether_core::options::{OptionValue, SocketOption};
use tether_core::socket_type::SocketKind;
use tracing::trace;

/// libzmq context.
pub struct ZmqContext {
    inner: zmq::Context,
}

impl ZmqContext {
    pub fn io_threads(&self) -> i32 {
        self.inner.get_io_threads().unwrap_or(-1)
    }
}

/// Dropping the last reference terminates the context. Sockets hold their
/// own reference, so termination waits until they are released.
impl Release for ZmqContext {
    fn release(self) -> NativeResult<()> {
        drop(self.inner);
        Ok(())
    }
}

/// libzmq socket.
pub struct ZmqSocket {
    inner: zmq::Socket,
    kind: SocketKind,
}

impl ZmqSocket {
    pub fn kind(&self) -> SocketKind {
        self.kind
    }
}

impl Release for ZmqSocket {
    fn release(self) -> NativeResult<()> {
        trace!("[ZMQ] Closing {} socket", self.kind);
        drop(self.inner);
        Ok(())
    }
}

fn socket_type(kind: SocketKind) -> zmq::SocketType {
    match kind {
        SocketKind::Pair => zmq::PAIR,
        SocketKind::Pub => zmq::PUB,
        SocketKind::Sub => zmq::SUB,
        SocketKind::Req => zmq::REQ,
        SocketKind::Rep => zmq::REP,
        SocketKind::Dealer => zmq::DEALER,
        SocketKind::Router => zmq::ROUTER,
        SocketKind::Pull => zmq::PULL,
        SocketKind::Push => zmq::PUSH,
        SocketKind::XPub => zmq::XPUB,
        SocketKind::XSub => zmq::XSUB,
    }
}

fn poll_events(events: Events) -> zmq::PollEvents {
    let mut native = zmq::PollEvents::empty();
    if events.contains(Events::READ) {
        native |= zmq::POLLIN;
    }
    if events.contains(Events::WRITE) {
        native |= zmq::POLLOUT;
    }
    if events.contains(Events::ERROR) {
        native |= zmq::POLLERR;
    }
    native
}

fn events(native: zmq::PollEvents) -> Events {
    let mut events = Events::NONE;
    if native.contains(zmq::POLLIN) {
        events |= Events::READ;
    }
    if native.contains(zmq::POLLOUT) {
        events |= Events::WRITE;
    }
    if native.contains(zmq::POLLERR) {
        events |= Events::ERROR;
    }
    events
}

/// Backend backed by the system libzmq.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZmqBackend;

impl ZmqBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for ZmqBackend {
    type Context = ZmqContext;
    type Socket = ZmqSocket;
    type Frame = zmq::Message;

    fn version(&self) -> Version {
        let (major, minor, patch) = zmq::version();
        Version { major, minor, patch }
    }

    fn context(&self, io_threads: i32) -> NativeResult<ZmqContext> {
        let inner = zmq::Context::new();
        inner.set_io_threads(io_threads).map_err(native_error)?;
        Ok(ZmqContext { inner })
    }

    fn socket(&self, context: &ZmqContext, kind: SocketKind) -> NativeResult<ZmqSocket> {
        let inner = context.inner.socket(socket_type(kind)).map_err(native_error)?;
        Ok(ZmqSocket { inner, kind })
    }

    fn bind(&self, socket: &ZmqSocket, endpoint: &str) -> NativeResult<()> {
        socket.inner.bind(endpoint).map_err(native_error)
    }

    fn unbind(&self, socket: &ZmqSocket, endpoint: &str) -> NativeResult<()> {
        socket.inner.unbind(endpoint).map_err(native_error)
    }

    fn connect(&self, socket: &ZmqSocket, endpoint: &str) -> NativeResult<()> {
        socket.inner.connect(endpoint).map_err(native_error)
    }

    fn disconnect(&self, socket: &ZmqSocket, endpoint: &str) -> NativeResult<()> {
        socket.inner.disconnect(endpoint).map_err(native_error)
    }

    fn frame(&self, data: &[u8]) -> zmq::Message {
        zmq::Message::from(data)
    }

    fn empty_frame(&self) -> zmq::Message {
        zmq::Message::new()
    }

    fn copy_frame(&self, frame: &zmq::Message) -> zmq::Message {
        zmq::Message::from(&frame[..])
    }

    fn send(&self, socket: &ZmqSocket, frame: zmq::Message, more: bool) -> NativeResult<()> {
        let flags = if more { zmq::SNDMORE } else { 0 };
        socket.inner.send(frame, flags).map_err(native_error)
    }

    fn recv(&self, socket: &ZmqSocket, dont_wait: bool) -> NativeResult<zmq::Message> {
        let flags = if dont_wait { zmq::DONTWAIT } else { 0 };
        socket.inner.recv_msg(flags).map_err(native_error)
    }

    fn poll(&self, items: &mut [PollItem<'_, ZmqSocket>], timeout_ms: i64) -> NativeResult<usize> {
        let mut native: Vec<zmq::PollItem<'_>> = items
            .iter()
            .map(|item| {
                let socket = item.socket;
                socket.inner.as_poll_item(poll_events(item.events))
            })
            .collect();
        let ready = zmq::poll(&mut native, timeout_ms).map_err(native_error)?;
        for (item, polled) in items.iter_mut().zip(&native) {
            item.revents = events(polled.get_revents());
        }
        Ok(usize::try_from(ready).unwrap_or(0))
    }

    fn get_option(&self, socket: &ZmqSocket, option: SocketOption) -> NativeResult<OptionValue> {
        options::get(&socket.inner, option).map_err(native_error)
    }

    fn set_option(&self, socket: &ZmqSocket, option: SocketOption, value: &OptionValue) -> NativeResult<()> {
        options::set(&socket.inner, option, value).map_err(native_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_masks_round_trip() {
        for mask in [
            Events::NONE,
            Events::READ,
            Events::WRITE | Events::ERROR,
            Events::READ | Events::WRITE | Events::ERROR,
        ] {
            assert_eq!(events(poll_events(mask)), mask);
        }
    }

    #[test]
    fn test_every_kind_maps() {
        let backend = ZmqBackend::new();
        let ctx = backend.context(1).unwrap();
        for kind in SocketKind::ALL {
            let socket = backend.socket(&ctx, kind).unwrap();
            assert_eq!(socket.inner.get_socket_type().unwrap(), socket_type(kind));
            socket.release().unwrap();
        }
    }
}
