//! Integration tests for handles, teardown and message transfer

use bytes::Bytes;
use tether_core::handle::TOMBSTONE_LIMIT;
use tether_core::loopback::LoopbackBackend;
use tether_core::prelude::*;

fn setup() -> (LoopbackBackend, Bridge<LoopbackBackend>) {
    let backend = LoopbackBackend::new();
    (backend.clone(), Bridge::new(backend))
}

fn pair(bridge: &mut Bridge<LoopbackBackend>, endpoint: &str) -> (SocketHandle, SocketHandle) {
    let ctx = bridge.init_default_context().unwrap();
    let server = bridge.init_socket(&ctx, "ZMQ_PAIR").unwrap().unwrap();
    let client = bridge.init_socket(&ctx, "ZMQ_PAIR").unwrap().unwrap();
    assert!(bridge.bind(&server, endpoint).unwrap());
    assert!(bridge.connect(&client, endpoint).unwrap());
    (server, client)
}

#[test]
fn test_round_trip_preserves_bytes() {
    let (_backend, mut bridge) = setup();
    let (server, client) = pair(&mut bridge, "inproc://round-trip");

    let payloads: [&[u8]; 4] = [b"", b"\0", b"hello\0world", &[0xff; 4096]];
    for payload in payloads {
        assert!(bridge.send(&client, payload, false).unwrap());
        let received = bridge.receive(&server, true).unwrap().unwrap();
        assert_eq!(received, Bytes::copy_from_slice(payload));
    }
}

#[test]
fn test_request_reply() {
    let (_backend, mut bridge) = setup();
    let ctx = bridge.init_default_context().unwrap();
    let rep = bridge.init_socket(&ctx, "ZMQ_REP").unwrap().unwrap();
    let req = bridge.init_socket(&ctx, "ZMQ_REQ").unwrap().unwrap();
    assert!(bridge.bind(&rep, "inproc://rpc").unwrap());
    assert!(bridge.connect(&req, "inproc://rpc").unwrap());

    assert!(bridge.send_scalar(&req, 21i64, false).unwrap());
    let n: i64 = bridge.receive_scalar(&rep).unwrap().unwrap();
    assert!(bridge.send_scalar(&rep, n * 2, false).unwrap());
    assert_eq!(bridge.receive_scalar::<i64>(&req).unwrap(), Some(42));
}

#[test]
fn test_invalid_handles_never_reach_native_layer() {
    let (backend, mut bridge) = setup();
    let (server, client) = pair(&mut bridge, "inproc://guard");
    let (_other_backend, mut other) = setup();
    let ctx = other.init_default_context().unwrap();
    let foreign = other.init_socket(&ctx, "ZMQ_PAIR").unwrap().unwrap();

    assert!(bridge.close(server).unwrap());
    let calls = backend.calls();

    let closed = bridge.send(&server, b"x", false).unwrap_err();
    assert!(matches!(
        closed,
        BridgeError::InvalidHandle(HandleError::Released(Tag::Socket))
    ));
    assert!(closed.is_programming_error());

    assert!(matches!(
        bridge.receive(&foreign, false),
        Err(BridgeError::InvalidHandle(HandleError::Foreign))
    ));
    assert!(matches!(
        bridge.bind(&foreign, "inproc://x"),
        Err(BridgeError::InvalidHandle(HandleError::Foreign))
    ));

    let message = bridge.init_message(b"m");
    let calls_after_message = backend.calls();
    assert!(calls_after_message > calls);
    assert!(matches!(
        bridge.send_message(&server, &message, false),
        Err(BridgeError::InvalidHandle(_))
    ));
    assert!(bridge.close(message).unwrap());
    assert!(matches!(
        bridge.send_message(&client, &message, false),
        Err(BridgeError::InvalidHandle(HandleError::Released(Tag::Message)))
    ));
    assert_eq!(backend.calls(), calls_after_message);
}

#[test]
fn test_mismatched_raw_handle_is_rejected() {
    let (_backend, mut bridge) = setup();
    let ctx = bridge.init_default_context().unwrap();
    let raw: Handle = ctx.into();

    assert_eq!(
        SocketHandle::try_from(raw).unwrap_err(),
        HandleError::TagMismatch {
            expected: Tag::Socket,
            found: Tag::Context,
        }
    );
    assert_eq!(ContextHandle::try_from(raw).unwrap(), ctx);
}

#[test]
fn test_close_is_idempotent() {
    let (backend, mut bridge) = setup();
    let (server, client) = pair(&mut bridge, "inproc://idempotent");

    assert!(bridge.close(server).unwrap());
    assert!(!bridge.close(server).unwrap());
    assert!(bridge.close(client).unwrap());
    assert_eq!(backend.released_sockets(), 2);

    // Collected tombstones are not released again either.
    bridge.collect();
    assert!(!bridge.close(server).unwrap());
    assert_eq!(backend.released_sockets(), 2);
}

#[test]
fn test_endpoint_reusable_after_close() {
    let (_backend, mut bridge) = setup();
    let ctx = bridge.init_default_context().unwrap();
    let first = bridge.init_socket(&ctx, "ZMQ_PAIR").unwrap().unwrap();
    assert!(bridge.bind(&first, "inproc://reuse").unwrap());
    assert!(bridge.close(first).unwrap());

    let second = bridge.init_socket(&ctx, "ZMQ_PAIR").unwrap().unwrap();
    assert!(bridge.bind(&second, "inproc://reuse").unwrap());
}

#[test]
fn test_finalizers_run_on_collect_from_any_thread() {
    let config = BridgeConfig::new().with_collect_on_attach(false);
    let backend = LoopbackBackend::new();
    let mut bridge = Bridge::with_config(backend.clone(), config);
    let (server, client) = pair(&mut bridge, "inproc://gc");
    let message = bridge.init_message(b"held");

    let finalizer = bridge.finalizer();
    let handles: Vec<Handle> = vec![server.into(), client.into(), message.into(), server.into()];
    std::thread::spawn(move || {
        for handle in handles {
            assert!(finalizer.schedule(handle));
        }
    })
    .join()
    .unwrap();

    assert_eq!(bridge.pending_finalizers(), 4);
    assert_eq!(backend.released_sockets(), 0);
    assert_eq!(bridge.collect(), 3);
    assert_eq!(bridge.pending_finalizers(), 0);
    assert_eq!(backend.released_sockets(), 2);
    assert_eq!(bridge.live(Tag::Message), 0);
}

#[test]
fn test_finalizers_run_before_new_allocations() {
    let backend = LoopbackBackend::new();
    let mut bridge = Bridge::new(backend.clone());
    let ctx = bridge.init_default_context().unwrap();
    let socket = bridge.init_socket(&ctx, "ZMQ_PUB").unwrap().unwrap();

    assert!(bridge.finalizer().schedule(socket));
    assert_eq!(backend.released_sockets(), 0);
    let _message = bridge.init_message(b"trigger");
    assert_eq!(backend.released_sockets(), 1);
}

#[test]
fn test_finalized_resources_do_not_accumulate() {
    let backend = LoopbackBackend::new();
    let mut bridge = Bridge::new(backend.clone());
    let ctx = bridge.init_default_context().unwrap();
    let finalizer = bridge.finalizer();

    for _ in 0..1000 {
        let socket = bridge.init_socket(&ctx, "ZMQ_PUB").unwrap().unwrap();
        let message = bridge.init_message(b"garbage");
        assert!(finalizer.schedule(socket));
        assert!(finalizer.schedule(message));
        assert!(bridge.handles().len() <= TOMBSTONE_LIMIT + 3);
    }
    let _trigger = bridge.init_message(b"trigger");

    assert_eq!(backend.released_sockets(), 1000);
    assert_eq!(bridge.live(Tag::Socket), 0);
    assert_eq!(bridge.live(Tag::Message), 1);
    assert!(bridge.handles().tombstones() < TOMBSTONE_LIMIT);
    assert!(bridge.handles().len() < TOMBSTONE_LIMIT + 2);
}

#[test]
fn test_closed_handles_pruned_without_collect() {
    let (_backend, mut bridge) = setup();
    let ctx = bridge.init_default_context().unwrap();
    let first = bridge.init_message(b"first");
    assert!(bridge.close(first).unwrap());
    assert_eq!(bridge.handles().tombstones(), 1);

    for _ in 1..TOMBSTONE_LIMIT {
        let message = bridge.init_message(b"m");
        assert!(bridge.close(message).unwrap());
    }
    let _next = bridge.init_message(b"next");

    assert_eq!(bridge.handles().tombstones(), 0);
    assert_eq!(bridge.handles().len(), 2);
    assert!(!bridge.close(first).unwrap());
    assert!(bridge.handles().validate(Some(&ctx.raw()), Tag::Context).is_ok());
}

#[test]
fn test_finalizer_outlives_bridge() {
    let backend = LoopbackBackend::new();
    let mut bridge = Bridge::new(backend.clone());
    let ctx = bridge.init_default_context().unwrap();
    let finalizer = bridge.finalizer();
    drop(bridge);

    assert_eq!(backend.released_contexts(), 1);
    assert!(!finalizer.schedule(ctx));
}

#[test]
fn test_string_and_null_messages() {
    let (_backend, mut bridge) = setup();
    let (server, client) = pair(&mut bridge, "inproc://strings");

    assert!(bridge.send(&client, b"abc\0def", false).unwrap());
    assert_eq!(bridge.receive_string(&server).unwrap().as_deref(), Some("abc"));

    assert!(bridge.send_null(&client, false).unwrap());
    assert!(bridge.receive_null(&server).unwrap());

    assert!(bridge.send_str(&client, "not null", false).unwrap());
    assert!(!bridge.receive_null(&server).unwrap());
    assert_eq!(bridge.receive(&server, false).unwrap(), None);
}

#[test]
fn test_scalar_size_mismatch_consumes_frame() {
    let (_backend, mut bridge) = setup();
    let (server, client) = pair(&mut bridge, "inproc://scalar");

    assert!(bridge.send(&client, &[1, 2, 3], false).unwrap());
    assert!(bridge.send_scalar(&client, 1.5f64, false).unwrap());

    assert!(matches!(
        bridge.receive_int(&server),
        Err(BridgeError::SizeMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert_eq!(bridge.receive_double(&server).unwrap(), Some(1.5));
}

#[test]
fn test_socket_defaults_and_options() {
    let config = BridgeConfig::new()
        .with_socket_default(SocketOption::Linger, OptionValue::Int(0))
        .with_socket_default(SocketOption::RcvTimeo, OptionValue::Int(10));
    let mut bridge = Bridge::with_config(LoopbackBackend::new(), config);
    let ctx = bridge.init_default_context().unwrap();
    let socket = bridge.init_socket(&ctx, "ZMQ_DEALER").unwrap().unwrap();

    assert_eq!(
        bridge.get_option(&socket, SocketOption::Linger).unwrap(),
        Some(OptionValue::Int(0))
    );
    // The receive timeout turns a blocking receive into a soft failure.
    assert_eq!(bridge.receive(&socket, true).unwrap(), None);
    assert_eq!(bridge.last_error(), Some(&NativeError::Again));
}

#[test]
fn test_version() {
    let (_backend, bridge) = setup();
    assert_eq!(bridge.version().to_string(), env!("CARGO_PKG_VERSION"));
}
