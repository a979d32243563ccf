//! Message transfer between host buffers and native frames.
//!
//! Every payload crossing the boundary is copied: outbound bytes into a
//! fresh native frame, inbound frames into an owned [`Bytes`]. The host never
//! aliases memory the native layer may still use, and the bridge never keeps
//! a reference into host memory after a call returns.
//!
//! Zero-length frames ("null messages") are sent through the native empty
//! frame constructor and recognised on receipt by
//! [`Bridge::receive_null`].

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::{MessageHandle, Resource, SocketHandle, Tag};
use crate::lifecycle::{HeldFrame, Owned};
use crate::native::{Backend, NativeError, NativeResult};
use crate::options::{OptionValue, SocketOption};
use bytes::Bytes;
use std::borrow::Cow;
use tracing::{debug, trace};

/// Fixed-width value decoded from a frame in native byte order.
pub trait Scalar: Copy {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Decode `bytes`, `None` unless exactly `WIDTH` long.
    fn from_native(bytes: &[u8]) -> Option<Self>;

    fn to_native(self) -> Vec<u8>;
}

macro_rules! impl_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn from_native(bytes: &[u8]) -> Option<Self> {
                    bytes.try_into().ok().map(<$ty>::from_ne_bytes)
                }

                fn to_native(self) -> Vec<u8> {
                    self.to_ne_bytes().to_vec()
                }
            }
        )*
    };
}

impl_scalar!(i32, i64, u32, u64, f32, f64);

/// Decode a frame as text: bytes up to the first NUL, invalid UTF-8 replaced.
pub fn decode_string(bytes: &[u8]) -> Cow<'_, str> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
}

fn transmit<B: Backend>(backend: &B, socket: &B::Socket, data: &[u8], more: bool) -> NativeResult<()> {
    let frame = if data.is_empty() {
        backend.empty_frame()
    } else {
        backend.frame(data)
    };
    backend.send(socket, frame, more)
}

impl<B: Backend> Bridge<B> {
    fn send_outcome(&mut self, socket: &SocketHandle, len: usize, result: NativeResult<()>) -> bool {
        match result {
            Ok(()) => {
                trace!("[SEND] {} bytes on {}", len, socket);
                true
            }
            Err(NativeError::Again) => {
                trace!("[SEND] {} would block", socket);
                self.last_error = Some(NativeError::Again);
                false
            }
            Err(err) => {
                self.soft_failure("SEND", socket, err);
                false
            }
        }
    }

    /// Send `data` as one frame; `more` marks further frames of the same
    /// message. An empty `data` sends a null message.
    ///
    /// Returns `Ok(false)` when the native layer did not accept the frame.
    pub fn send(&mut self, socket: &SocketHandle, data: &[u8], more: bool) -> Result<bool> {
        let native = self.handles.socket(socket)?;
        let result = transmit(&self.backend, native, data, more);
        Ok(self.send_outcome(socket, data.len(), result))
    }

    /// Send a zero-length frame.
    pub fn send_null(&mut self, socket: &SocketHandle, more: bool) -> Result<bool> {
        self.send(socket, &[], more)
    }

    /// Send the UTF-8 bytes of `text` (no terminator).
    pub fn send_str(&mut self, socket: &SocketHandle, text: &str, more: bool) -> Result<bool> {
        self.send(socket, text.as_bytes(), more)
    }

    /// Send a fixed-width value in native byte order.
    pub fn send_scalar<T: Scalar>(&mut self, socket: &SocketHandle, value: T, more: bool) -> Result<bool> {
        self.send(socket, &value.to_native(), more)
    }

    /// Copy `data` into a native frame owned by the bridge.
    ///
    /// The frame can be sent any number of times with
    /// [`send_message`](Self::send_message) and is released like any other
    /// resource.
    pub fn init_message(&mut self, data: &[u8]) -> MessageHandle {
        self.before_attach();
        let frame = if data.is_empty() {
            self.backend.empty_frame()
        } else {
            self.backend.frame(data)
        };
        let raw = self
            .handles
            .attach(Resource::Message(Owned::new(HeldFrame(frame), Tag::Message)));
        debug!("[MESSAGE] Created {} ({} bytes)", raw, data.len());
        MessageHandle::new(raw)
    }

    /// Send a copy of a held message frame; the held frame stays intact.
    pub fn send_message(&mut self, socket: &SocketHandle, message: &MessageHandle, more: bool) -> Result<bool> {
        let native = self.handles.socket(socket)?;
        let held = self.handles.message(message)?;
        let len = held.len();
        let copy = self.backend.copy_frame(held);
        let result = self.backend.send(native, copy, more);
        Ok(self.send_outcome(socket, len, result))
    }

    /// Bytes of a held message frame.
    pub fn message_bytes(&self, message: &MessageHandle) -> Result<Bytes> {
        let held = self.handles.message(message)?;
        Ok(Bytes::copy_from_slice(held))
    }

    fn receive_frame(&mut self, socket: &SocketHandle, blocking: bool) -> Result<Option<B::Frame>> {
        let native = self.handles.socket(socket)?;
        match self.backend.recv(native, !blocking) {
            Ok(frame) => {
                trace!("[RECV] {} bytes on {}", frame.len(), socket);
                Ok(Some(frame))
            }
            Err(NativeError::Again) => {
                trace!("[RECV] Nothing pending on {}", socket);
                self.last_error = Some(NativeError::Again);
                Ok(None)
            }
            Err(err) => {
                self.soft_failure("RECV", socket, err);
                Ok(None)
            }
        }
    }

    /// Receive one frame as raw bytes.
    ///
    /// With `blocking == false`, an empty queue yields `Ok(None)`. A
    /// zero-length frame is `Ok(Some(empty))`, distinct from nothing received.
    pub fn receive(&mut self, socket: &SocketHandle, blocking: bool) -> Result<Option<Bytes>> {
        Ok(self
            .receive_frame(socket, blocking)?
            .map(|frame| Bytes::copy_from_slice(&frame)))
    }

    /// Receive one frame and report whether it was a null message.
    ///
    /// A non-empty frame is consumed and yields `false`.
    pub fn receive_null(&mut self, socket: &SocketHandle) -> Result<bool> {
        Ok(self
            .receive_frame(socket, true)?
            .is_some_and(|frame| frame.is_empty()))
    }

    /// Receive one frame as text, up to the first NUL byte.
    pub fn receive_string(&mut self, socket: &SocketHandle) -> Result<Option<String>> {
        Ok(self
            .receive_frame(socket, true)?
            .map(|frame| decode_string(&frame).into_owned()))
    }

    /// Receive one fixed-width value.
    ///
    /// A frame of any other length is consumed and reported as
    /// [`BridgeError::SizeMismatch`].
    pub fn receive_scalar<T: Scalar>(&mut self, socket: &SocketHandle) -> Result<Option<T>> {
        let Some(frame) = self.receive_frame(socket, true)? else {
            return Ok(None);
        };
        T::from_native(&frame).map(Some).ok_or(BridgeError::SizeMismatch {
            expected: T::WIDTH,
            actual: frame.len(),
        })
    }

    pub fn receive_int(&mut self, socket: &SocketHandle) -> Result<Option<i32>> {
        self.receive_scalar(socket)
    }

    pub fn receive_double(&mut self, socket: &SocketHandle) -> Result<Option<f64>> {
        self.receive_scalar(socket)
    }

    /// Receive every frame of the next message.
    ///
    /// Stops after the frame whose RCVMORE flag is clear. A failure part way
    /// through returns the frames received so far.
    pub fn receive_multipart(&mut self, socket: &SocketHandle) -> Result<Option<Vec<Bytes>>> {
        let mut parts = Vec::new();
        loop {
            let Some(part) = self.receive(socket, true)? else {
                return Ok((!parts.is_empty()).then_some(parts));
            };
            parts.push(part);
            match self.get_option(socket, SocketOption::RcvMore)? {
                Some(OptionValue::Bool(true)) => {}
                _ => return Ok(Some(parts)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::LoopbackBackend;

    fn connected_pair() -> (Bridge<LoopbackBackend>, SocketHandle, SocketHandle) {
        let mut bridge = Bridge::new(LoopbackBackend::new());
        let ctx = bridge.init_default_context().unwrap();
        let server = bridge.init_socket(&ctx, "ZMQ_PAIR").unwrap().unwrap();
        let client = bridge.init_socket(&ctx, "ZMQ_PAIR").unwrap().unwrap();
        assert!(bridge.bind(&server, "inproc://transfer").unwrap());
        assert!(bridge.connect(&client, "inproc://transfer").unwrap());
        (bridge, server, client)
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(decode_string(b"hello"), "hello");
        assert_eq!(decode_string(b"hello\0world"), "hello");
        assert_eq!(decode_string(b""), "");
        assert_eq!(decode_string(b"\xffok"), "\u{fffd}ok");
    }

    #[test]
    fn test_scalar_width() {
        assert_eq!(<i32 as Scalar>::WIDTH, 4);
        assert_eq!(<f64 as Scalar>::WIDTH, 8);
        assert_eq!(i32::from_native(&7i32.to_ne_bytes()), Some(7));
        assert_eq!(i32::from_native(&[0u8; 8]), None);
        assert_eq!(f64::from_native(&2.5f64.to_native()), Some(2.5));
    }

    #[test]
    fn test_send_receive_bytes() {
        let (mut bridge, server, client) = connected_pair();
        assert!(bridge.send(&client, b"payload", false).unwrap());
        assert_eq!(
            bridge.receive(&server, true).unwrap(),
            Some(Bytes::from_static(b"payload"))
        );
    }

    #[test]
    fn test_null_message_is_distinct_from_nothing() {
        let (mut bridge, server, client) = connected_pair();
        assert_eq!(bridge.receive(&server, false).unwrap(), None);

        assert!(bridge.send_null(&client, false).unwrap());
        assert_eq!(bridge.receive(&server, false).unwrap(), Some(Bytes::new()));

        assert!(bridge.send_null(&client, false).unwrap());
        assert!(bridge.receive_null(&server).unwrap());

        assert!(bridge.send_str(&client, "x", false).unwrap());
        assert!(!bridge.receive_null(&server).unwrap());
    }

    #[test]
    fn test_receive_scalar_size_mismatch() {
        let (mut bridge, server, client) = connected_pair();
        assert!(bridge.send_scalar(&client, 42i32, false).unwrap());
        assert_eq!(bridge.receive_int(&server).unwrap(), Some(42));

        assert!(bridge.send_scalar(&client, 42i32, false).unwrap());
        let err = bridge.receive_double(&server).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::SizeMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_held_message_is_reusable() {
        let (mut bridge, server, client) = connected_pair();
        let message = bridge.init_message(b"again");
        for _ in 0..3 {
            assert!(bridge.send_message(&client, &message, false).unwrap());
        }
        for _ in 0..3 {
            assert_eq!(
                bridge.receive_string(&server).unwrap().as_deref(),
                Some("again")
            );
        }
        assert_eq!(bridge.message_bytes(&message).unwrap(), Bytes::from_static(b"again"));
    }

    #[test]
    fn test_send_without_peer_is_soft() {
        let mut bridge = Bridge::new(LoopbackBackend::new());
        let ctx = bridge.init_default_context().unwrap();
        let push = bridge.init_socket(&ctx, "ZMQ_PUSH").unwrap().unwrap();
        assert!(!bridge.send(&push, b"lost", false).unwrap());
        assert_eq!(bridge.last_error(), Some(&NativeError::Again));
    }

    #[test]
    fn test_multipart() {
        let (mut bridge, server, client) = connected_pair();
        assert!(bridge.send_str(&client, "header", true).unwrap());
        assert!(bridge.send_null(&client, true).unwrap());
        assert!(bridge.send_str(&client, "body", false).unwrap());

        let parts = bridge.receive_multipart(&server).unwrap().unwrap();
        assert_eq!(
            parts,
            vec![
                Bytes::from_static(b"header"),
                Bytes::new(),
                Bytes::from_static(b"body")
            ]
        );
    }
}
