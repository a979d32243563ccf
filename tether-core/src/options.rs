//! Socket option catalogue
//!
//! The bridge passes socket options straight through to the native library
//! (zmq_setsockopt/zmq_getsockopt). This module only describes each option:
//! its native id, the shape of its value and whether it can be read, written
//! or both, so that malformed requests are rejected before the native call.

use std::fmt;

/// Value shape of a socket option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Int,
    Long,
    Bool,
    Bytes,
    Text,
}

/// Whether an option can be read, written or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

/// A socket option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Int(i32),
    Long(u64),
    Bool(bool),
    Bytes(Vec<u8>),
    Text(String),
}

impl OptionValue {
    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Int(_) => OptionKind::Int,
            Self::Long(_) => OptionKind::Long,
            Self::Bool(_) => OptionKind::Bool,
            Self::Bytes(_) => OptionKind::Bytes,
            Self::Text(_) => OptionKind::Text,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<u64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Byte payload of a `Bytes` or `Text` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            Self::Text(v) => Some(v.as_bytes()),
            _ => None,
        }
    }
}

/// Socket options exposed to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketOption {
    /// I/O thread affinity bitmask (ZMQ_AFFINITY)
    Affinity,
    /// Socket identity / routing id (ZMQ_IDENTITY)
    Identity,
    /// Add a SUB topic filter (ZMQ_SUBSCRIBE)
    Subscribe,
    /// Remove a SUB topic filter (ZMQ_UNSUBSCRIBE)
    Unsubscribe,
    /// Multicast data rate in kbps (ZMQ_RATE)
    Rate,
    /// Multicast recovery interval in ms (ZMQ_RECOVERY_IVL)
    RecoveryIvl,
    /// Kernel send buffer size (ZMQ_SNDBUF)
    SndBuf,
    /// Kernel receive buffer size (ZMQ_RCVBUF)
    RcvBuf,
    /// More frames of the current message follow (ZMQ_RCVMORE)
    RcvMore,
    /// Linger period in ms, -1 waits forever (ZMQ_LINGER)
    Linger,
    /// Reconnect interval in ms (ZMQ_RECONNECT_IVL)
    ReconnectIvl,
    /// Maximum reconnect interval in ms (ZMQ_RECONNECT_IVL_MAX)
    ReconnectIvlMax,
    /// Outbound high water mark (ZMQ_SNDHWM)
    SndHwm,
    /// Inbound high water mark (ZMQ_RCVHWM)
    RcvHwm,
    /// Receive timeout in ms (ZMQ_RCVTIMEO)
    RcvTimeo,
    /// Send timeout in ms (ZMQ_SNDTIMEO)
    SndTimeo,
    /// Endpoint of the last bind or connect (ZMQ_LAST_ENDPOINT)
    LastEndpoint,
}

impl SocketOption {
    /// Native option id.
    pub fn native_id(&self) -> i32 {
        match self {
            Self::Affinity => 4,
            Self::Identity => 5,
            Self::Subscribe => 6,
            Self::Unsubscribe => 7,
            Self::Rate => 8,
            Self::RecoveryIvl => 9,
            Self::SndBuf => 11,
            Self::RcvBuf => 12,
            Self::RcvMore => 13,
            Self::Linger => 17,
            Self::ReconnectIvl => 18,
            Self::ReconnectIvlMax => 21,
            Self::SndHwm => 23,
            Self::RcvHwm => 24,
            Self::RcvTimeo => 27,
            Self::SndTimeo => 28,
            Self::LastEndpoint => 32,
        }
    }

    pub fn kind(&self) -> OptionKind {
        match self {
            Self::Affinity => OptionKind::Long,
            Self::Identity | Self::Subscribe | Self::Unsubscribe => OptionKind::Bytes,
            Self::RcvMore => OptionKind::Bool,
            Self::LastEndpoint => OptionKind::Text,
            _ => OptionKind::Int,
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Self::Subscribe | Self::Unsubscribe => Access::WriteOnly,
            Self::RcvMore | Self::LastEndpoint => Access::ReadOnly,
            _ => Access::ReadWrite,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Affinity => "ZMQ_AFFINITY",
            Self::Identity => "ZMQ_IDENTITY",
            Self::Subscribe => "ZMQ_SUBSCRIBE",
            Self::Unsubscribe => "ZMQ_UNSUBSCRIBE",
            Self::Rate => "ZMQ_RATE",
            Self::RecoveryIvl => "ZMQ_RECOVERY_IVL",
            Self::SndBuf => "ZMQ_SNDBUF",
            Self::RcvBuf => "ZMQ_RCVBUF",
            Self::RcvMore => "ZMQ_RCVMORE",
            Self::Linger => "ZMQ_LINGER",
            Self::ReconnectIvl => "ZMQ_RECONNECT_IVL",
            Self::ReconnectIvlMax => "ZMQ_RECONNECT_IVL_MAX",
            Self::SndHwm => "ZMQ_SNDHWM",
            Self::RcvHwm => "ZMQ_RCVHWM",
            Self::RcvTimeo => "ZMQ_RCVTIMEO",
            Self::SndTimeo => "ZMQ_SNDTIMEO",
            Self::LastEndpoint => "ZMQ_LAST_ENDPOINT",
        }
    }

    /// Check that `value` may be written to this option.
    ///
    /// Byte options also accept text values.
    pub fn check_set(&self, value: &OptionValue) -> Result<(), String> {
        if self.access() == Access::ReadOnly {
            return Err(format!("{self} is read-only"));
        }
        let accepted = match (self.kind(), value.kind()) {
            (OptionKind::Bytes, OptionKind::Text) => true,
            (expected, given) => expected == given,
        };
        if accepted {
            Ok(())
        } else {
            Err(format!(
                "{self} expects a {:?} value, got {:?}",
                self.kind(),
                value.kind()
            ))
        }
    }

    /// Check that this option may be read.
    pub fn check_get(&self) -> Result<(), String> {
        if self.access() == Access::WriteOnly {
            Err(format!("{self} is write-only"))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for SocketOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_ids() {
        assert_eq!(SocketOption::Linger.native_id(), 17);
        assert_eq!(SocketOption::Subscribe.native_id(), 6);
        assert_eq!(SocketOption::LastEndpoint.native_id(), 32);
    }

    #[test]
    fn test_check_set() {
        assert!(SocketOption::Linger.check_set(&OptionValue::Int(0)).is_ok());
        assert!(SocketOption::Affinity.check_set(&OptionValue::Long(3)).is_ok());
        assert!(SocketOption::Subscribe
            .check_set(&OptionValue::Text("topic".into()))
            .is_ok());
        assert!(SocketOption::Identity
            .check_set(&OptionValue::Bytes(b"peer-1".to_vec()))
            .is_ok());

        assert!(SocketOption::Linger.check_set(&OptionValue::Bool(true)).is_err());
        assert!(SocketOption::RcvMore.check_set(&OptionValue::Bool(true)).is_err());
        assert!(SocketOption::LastEndpoint
            .check_set(&OptionValue::Text("tcp://x".into()))
            .is_err());
    }

    #[test]
    fn test_check_get() {
        assert!(SocketOption::RcvTimeo.check_get().is_ok());
        assert!(SocketOption::RcvMore.check_get().is_ok());
        assert!(SocketOption::Subscribe.check_get().is_err());
        assert!(SocketOption::Unsubscribe.check_get().is_err());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(OptionValue::Int(5).as_int(), Some(5));
        assert_eq!(OptionValue::Int(5).as_long(), None);
        assert_eq!(OptionValue::Text("ab".into()).as_bytes(), Some(&b"ab"[..]));
        assert_eq!(OptionValue::Bool(true).as_bool(), Some(true));
    }
}
