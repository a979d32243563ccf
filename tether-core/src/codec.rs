//! Host value serialization.
//!
//! The bridge moves bytes; turning host values into bytes and back is the
//! host's business. A [`Codec`] plugs the host serializer into
//! [`Bridge::send_value`] and [`Bridge::receive_value`].

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::{SocketHandle, Tag};
use crate::native::Backend;
use std::fmt;

/// Host serializer.
pub trait Codec {
    type Value;
    type Error: fmt::Display;

    fn serialize(&self, value: &Self::Value) -> std::result::Result<Vec<u8>, Self::Error>;

    fn deserialize(&self, bytes: &[u8]) -> std::result::Result<Self::Value, Self::Error>;
}

/// Codec for UTF-8 text; decoding rejects invalid sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Codec;

impl Codec for Utf8Codec {
    type Value = String;
    type Error = std::string::FromUtf8Error;

    fn serialize(&self, value: &String) -> std::result::Result<Vec<u8>, Self::Error> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> std::result::Result<String, Self::Error> {
        String::from_utf8(bytes.to_vec())
    }
}

impl<B: Backend> Bridge<B> {
    /// Serialize `value` with `codec` and send it as one frame.
    pub fn send_value<C: Codec>(
        &mut self,
        socket: &SocketHandle,
        codec: &C,
        value: &C::Value,
        more: bool,
    ) -> Result<bool> {
        self.handles.validate(Some(&socket.raw()), Tag::Socket)?;
        let bytes = codec.serialize(value).map_err(BridgeError::codec)?;
        self.send(socket, &bytes, more)
    }

    /// Receive one frame and deserialize it with `codec`.
    pub fn receive_value<C: Codec>(
        &mut self,
        socket: &SocketHandle,
        codec: &C,
        blocking: bool,
    ) -> Result<Option<C::Value>> {
        match self.receive(socket, blocking)? {
            Some(bytes) => codec.deserialize(&bytes).map(Some).map_err(BridgeError::codec),
            None => Ok(None),
        }
    }
}
