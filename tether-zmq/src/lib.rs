//! # Tether ZMQ
//!
//! libzmq backend for the Tether binding layer.
//!
//! ## Overview
//!
//! [`ZmqBackend`] implements [`tether_core::native::Backend`] on top of the
//! `zmq` crate, so a [`tether_core::bridge::Bridge`] can drive real libzmq
//! contexts and sockets:
//! - contexts honour the requested I/O thread count
//! - every socket kind in the catalogue maps onto its libzmq constant
//! - EAGAIN, EINTR, ETERM and EFAULT surface as distinct conditions
//! - options go through the typed `zmq` setters and getters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether_core::bridge::Bridge;
//! use tether_zmq::ZmqBackend;
//!
//! let mut bridge = Bridge::new(ZmqBackend::new());
//! let ctx = bridge.init_default_context().unwrap();
//! let rep = bridge.init_socket(&ctx, "ZMQ_REP").unwrap().unwrap();
//! bridge.bind(&rep, "tcp://127.0.0.1:5555").unwrap();
//! let request = bridge.receive_string(&rep).unwrap();
//! bridge.send_str(&rep, "world", false).unwrap();
//! # let _ = request;
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod backend;
mod error;
mod options;

pub use backend::{ZmqBackend, ZmqContext, ZmqSocket};
