//! libzmq error translation.

use tether_core::native::NativeError;

/// Map a libzmq error onto the conditions the bridge distinguishes.
pub(crate) fn native_error(err: zmq::Error) -> NativeError {
    match err {
        zmq::Error::EAGAIN => NativeError::Again,
        zmq::Error::EINTR => NativeError::Interrupted,
        zmq::Error::ETERM => NativeError::Terminated,
        zmq::Error::EFAULT => NativeError::Fault,
        other => NativeError::other(other.to_raw(), other.message()),
    }
}
