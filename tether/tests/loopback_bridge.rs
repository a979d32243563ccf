//! End-to-end host scenarios over the loopback backend

use std::time::Duration;
use tether::loopback::{LoopbackBackend, PollFault};
use tether::prelude::*;

#[test]
fn test_collector_thread_schedules_teardown() {
    tether::dev_tracing::init_tracing();

    let backend = LoopbackBackend::new();
    let mut bridge = LoopbackBridge::with_config(
        backend.clone(),
        BridgeConfig::new().with_collect_on_attach(false),
    );
    let ctx = bridge.init_default_context().unwrap();
    let sockets: Vec<SocketHandle> = (0..4)
        .map(|_| bridge.init_socket(&ctx, "ZMQ_PUB").unwrap().unwrap())
        .collect();

    // The host hands unreachable handles to its collector thread.
    let (unreachable_tx, unreachable_rx) = flume::unbounded::<Handle>();
    let finalizer = bridge.finalizer();
    let collector = std::thread::spawn(move || {
        let mut scheduled = 0;
        for handle in unreachable_rx.iter() {
            assert!(finalizer.schedule(handle));
            scheduled += 1;
        }
        scheduled
    });

    for socket in &sockets[..3] {
        unreachable_tx.send(socket.raw()).unwrap();
    }
    drop(unreachable_tx);
    assert_eq!(collector.join().unwrap(), 3);

    assert_eq!(bridge.collect(), 3);
    assert_eq!(backend.released_sockets(), 3);
    assert_eq!(bridge.live(Tag::Socket), 1);
    assert!(bridge.send_str(&sockets[3], "still alive", false).unwrap());
    assert!(matches!(
        bridge.send_str(&sockets[0], "gone", false),
        Err(BridgeError::InvalidHandle(HandleError::Unknown(Tag::Socket)))
    ));
}

#[test]
fn test_host_interrupt_during_infinite_poll() {
    let backend = LoopbackBackend::new();
    let flag = InterruptFlag::new();
    let mut bridge = LoopbackBridge::with_config(
        backend.clone(),
        BridgeConfig::new().with_interrupt_probe(flag.clone()),
    );
    let ctx = bridge.init_default_context().unwrap();
    let pull = bridge.init_socket(&ctx, "ZMQ_PULL").unwrap().unwrap();

    // Unrelated signals first, then the user's interrupt.
    for _ in 0..50 {
        backend.inject_poll_fault(PollFault::Interrupt {
            after: Duration::from_millis(20),
        });
    }
    let raiser = {
        let flag = flag.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.raise();
        })
    };

    let err = bridge
        .poll(&[PollRequest::new(pull, ["read"])], -1)
        .unwrap_err();
    raiser.join().unwrap();

    assert!(matches!(err, BridgeError::Interrupted));
    let timeouts = backend.poll_timeouts();
    assert!(timeouts.len() >= 3 && timeouts.len() < 50, "{timeouts:?}");
    assert!(timeouts.iter().all(|&t| t == -1));
}

#[test]
fn test_codec_values_between_sockets() {
    let mut bridge = LoopbackBridge::new(LoopbackBackend::new());
    let ctx = bridge.init_default_context().unwrap();
    let sub = bridge.init_socket(&ctx, "ZMQ_SUB").unwrap().unwrap();
    let publisher = bridge.init_socket(&ctx, "ZMQ_PUB").unwrap().unwrap();
    assert!(bridge.bind(&publisher, "inproc://feed").unwrap());
    assert!(bridge.connect(&sub, "inproc://feed").unwrap());
    assert!(bridge
        .set_option(&sub, SocketOption::Subscribe, OptionValue::Text(String::new()))
        .unwrap());

    assert!(bridge
        .send_value(&publisher, &Utf8Codec, &"tick".to_string(), false)
        .unwrap());
    assert_eq!(
        bridge.receive_value(&sub, &Utf8Codec, false).unwrap().as_deref(),
        Some("tick")
    );
}

#[test]
fn test_host_spans_wrap_bridge_calls() {
    tether::dev_tracing::init_with("tether_core=trace");

    let mut bridge = LoopbackBridge::new(LoopbackBackend::new());
    let span = tether::tracing::info_span!("host_call", op = "echo");
    let echoed = span.in_scope(|| {
        let ctx = bridge.init_default_context()?;
        let server = bridge.init_socket(&ctx, "PAIR").ok()??;
        let client = bridge.init_socket(&ctx, "PAIR").ok()??;
        bridge.bind(&server, "inproc://spans").ok()?;
        bridge.connect(&client, "inproc://spans").ok()?;
        bridge.send_str(&client, "traced", false).ok()?;
        bridge.receive_string(&server).ok()?
    });
    assert_eq!(echoed.as_deref(), Some("traced"));
}
