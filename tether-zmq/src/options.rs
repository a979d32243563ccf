//! Socket option dispatch onto the typed `zmq` setters and getters.

use tether_core::options::{OptionValue, SocketOption};

fn int(value: &OptionValue) -> zmq::Result<i32> {
    value.as_int().ok_or(zmq::Error::EINVAL)
}

fn bytes(value: &OptionValue) -> zmq::Result<&[u8]> {
    value.as_bytes().ok_or(zmq::Error::EINVAL)
}

pub(crate) fn set(socket: &zmq::Socket, option: SocketOption, value: &OptionValue) -> zmq::Result<()> {
    match option {
        SocketOption::Affinity => socket.set_affinity(value.as_long().ok_or(zmq::Error::EINVAL)?),
        SocketOption::Identity => socket.set_identity(bytes(value)?),
        SocketOption::Subscribe => socket.set_subscribe(bytes(value)?),
        SocketOption::Unsubscribe => socket.set_unsubscribe(bytes(value)?),
        SocketOption::Rate => socket.set_rate(int(value)?),
        SocketOption::RecoveryIvl => socket.set_recovery_ivl(int(value)?),
        SocketOption::SndBuf => socket.set_sndbuf(int(value)?),
        SocketOption::RcvBuf => socket.set_rcvbuf(int(value)?),
        SocketOption::Linger => socket.set_linger(int(value)?),
        SocketOption::ReconnectIvl => socket.set_reconnect_ivl(int(value)?),
        SocketOption::ReconnectIvlMax => socket.set_reconnect_ivl_max(int(value)?),
        SocketOption::SndHwm => socket.set_sndhwm(int(value)?),
        SocketOption::RcvHwm => socket.set_rcvhwm(int(value)?),
        SocketOption::RcvTimeo => socket.set_rcvtimeo(int(value)?),
        SocketOption::SndTimeo => socket.set_sndtimeo(int(value)?),
        SocketOption::RcvMore | SocketOption::LastEndpoint => Err(zmq::Error::EINVAL),
    }
}

pub(crate) fn get(socket: &zmq::Socket, option: SocketOption) -> zmq::Result<OptionValue> {
    match option {
        SocketOption::Affinity => socket.get_affinity().map(OptionValue::Long),
        SocketOption::Identity => socket.get_identity().map(OptionValue::Bytes),
        SocketOption::Rate => socket.get_rate().map(OptionValue::Int),
        SocketOption::RecoveryIvl => socket.get_recovery_ivl().map(OptionValue::Int),
        SocketOption::SndBuf => socket.get_sndbuf().map(OptionValue::Int),
        SocketOption::RcvBuf => socket.get_rcvbuf().map(OptionValue::Int),
        SocketOption::RcvMore => socket.get_rcvmore().map(OptionValue::Bool),
        SocketOption::Linger => socket.get_linger().map(OptionValue::Int),
        SocketOption::ReconnectIvl => socket.get_reconnect_ivl().map(OptionValue::Int),
        SocketOption::ReconnectIvlMax => socket.get_reconnect_ivl_max().map(OptionValue::Int),
        SocketOption::SndHwm => socket.get_sndhwm().map(OptionValue::Int),
        SocketOption::RcvHwm => socket.get_rcvhwm().map(OptionValue::Int),
        SocketOption::RcvTimeo => socket.get_rcvtimeo().map(OptionValue::Int),
        SocketOption::SndTimeo => socket.get_sndtimeo().map(OptionValue::Int),
        SocketOption::LastEndpoint => socket.get_last_endpoint().map(|endpoint| {
            OptionValue::Text(match endpoint {
                Ok(text) => text,
                Err(raw) => String::from_utf8_lossy(&raw).into_owned(),
            })
        }),
        SocketOption::Subscribe | SocketOption::Unsubscribe => Err(zmq::Error::EINVAL),
    }
}
