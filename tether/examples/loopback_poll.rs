//! Poll several loopback sockets and drain whatever is ready.
//!
//! Run with `RUST_LOG=tether_core=trace cargo run --example loopback_poll`.

use tether::prelude::*;
use tether::loopback::LoopbackBackend;

fn main() -> tether::Result<()> {
    tether::dev_tracing::init_tracing();

    let mut bridge = LoopbackBridge::new(LoopbackBackend::new());
    let ctx = bridge.init_default_context().expect("loopback context");

    let jobs = bridge.init_socket(&ctx, "ZMQ_PULL")?.expect("pull socket");
    let events = bridge.init_socket(&ctx, "ZMQ_SUB")?.expect("sub socket");
    let producer = bridge.init_socket(&ctx, "ZMQ_PUSH")?.expect("push socket");
    let publisher = bridge.init_socket(&ctx, "ZMQ_PUB")?.expect("pub socket");

    bridge.bind(&jobs, "inproc://jobs")?;
    bridge.connect(&producer, "inproc://jobs")?;
    bridge.bind(&publisher, "inproc://events")?;
    bridge.connect(&events, "inproc://events")?;
    bridge.set_option(&events, SocketOption::Subscribe, OptionValue::Text(String::new()))?;

    bridge.send_str(&producer, "job-1", false)?;
    bridge.send_str(&publisher, "started", false)?;

    let requests = [
        PollRequest::new(jobs, ["read"]),
        PollRequest::new(events, ["read"]),
    ];
    loop {
        let outcomes = bridge.poll(&requests, 100)?;
        if !outcomes.iter().any(PollOutcome::any) {
            break;
        }
        for (request, outcome) in requests.iter().zip(&outcomes) {
            if outcome.get(PollEvent::Read) == Some(true) {
                let text = bridge.receive_string(request.socket())?;
                println!("{}: {:?}", request.socket(), text);
            }
        }
    }
    Ok(())
}
