//! Interruptible, budgeted polling.
//!
//! [`Bridge::poll`] waits for events on several sockets at once. The host
//! names the events it wants per socket (`"read"`, `"write"`, `"error"`) and
//! gets back, per socket and in the same order, one flag per requested event.
//!
//! A native poll can be interrupted by any signal delivered to the process.
//! The [`PollCoordinator`] asks the host's [`InterruptProbe`] whether the
//! interruption was meant for it. If so the poll fails with
//! [`BridgeError::Interrupted`]; otherwise it is retried with whatever is left
//! of the original timeout, so repeated interruptions can never extend the
//! total wait.

use crate::bridge::Bridge;
use crate::error::{BridgeError, Result};
use crate::handle::SocketHandle;
use crate::interrupt::InterruptProbe;
use crate::native::{Backend, Events, NativeError, PollItem};
use crate::timeout::{Budget, PollTimeout};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

/// An event a host can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollEvent {
    Read,
    Write,
    Error,
}

impl PollEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Error => "error",
        }
    }

    pub fn mask(&self) -> Events {
        match self {
            Self::Read => Events::READ,
            Self::Write => Events::WRITE,
            Self::Error => Events::ERROR,
        }
    }
}

impl FromStr for PollEvent {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "error" => Ok(Self::Error),
            other => Err(BridgeError::invalid_argument(format!(
                "unrecognized poll event '{other}', expected read, write or error"
            ))),
        }
    }
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One socket and the event names to wait for on it.
#[derive(Debug, Clone)]
pub struct PollRequest {
    socket: SocketHandle,
    events: Vec<String>,
}

impl PollRequest {
    pub fn new<I, S>(socket: SocketHandle, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            socket,
            events: events.into_iter().map(Into::into).collect(),
        }
    }

    pub fn socket(&self) -> &SocketHandle {
        &self.socket
    }

    pub fn events(&self) -> &[String] {
        &self.events
    }
}

type EventList = SmallVec<[PollEvent; 3]>;

/// Per-socket poll result: one flag per requested event, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollOutcome {
    entries: SmallVec<[(PollEvent, bool); 3]>,
}

impl PollOutcome {
    fn assemble(requested: &[PollEvent], revents: Events) -> Self {
        Self {
            entries: requested
                .iter()
                .map(|event| (*event, revents.contains(event.mask())))
                .collect(),
        }
    }

    /// Flag for `event`, `None` if it was not requested.
    pub fn get(&self, event: PollEvent) -> Option<bool> {
        self.entries
            .iter()
            .find(|(requested, _)| *requested == event)
            .map(|(_, fired)| *fired)
    }

    /// Flag for the event named `name`, `None` if it was not requested.
    pub fn get_named(&self, name: &str) -> Option<bool> {
        name.parse().ok().and_then(|event| self.get(event))
    }

    pub fn keys(&self) -> impl Iterator<Item = PollEvent> + '_ {
        self.entries.iter().map(|(event, _)| *event)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PollEvent, bool)> + '_ {
        self.entries.iter().copied()
    }

    /// True if any requested event fired.
    pub fn any(&self) -> bool {
        self.entries.iter().any(|(_, fired)| *fired)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Parse event names, keeping the first occurrence of each.
fn parse_events(names: &[String]) -> Result<(EventList, Events)> {
    let mut events = EventList::new();
    let mut mask = Events::NONE;
    for name in names {
        let event: PollEvent = name.parse()?;
        if !mask.contains(event.mask()) {
            events.push(event);
            mask |= event.mask();
        }
    }
    Ok((events, mask))
}

/// Runs one native poll to completion across spurious interruptions.
pub struct PollCoordinator<'a> {
    probe: &'a dyn InterruptProbe,
    max_retries: Option<u32>,
}

impl<'a> PollCoordinator<'a> {
    pub fn new(probe: &'a dyn InterruptProbe, max_retries: Option<u32>) -> Self {
        Self { probe, max_retries }
    }

    /// Poll `items` until an event fires, the budget runs out, or a real
    /// error or interrupt occurs. Returns the number of ready items.
    ///
    /// An exhausted budget returns `Ok(0)` with every `revents` cleared.
    pub fn run<B: Backend>(
        &self,
        backend: &B,
        items: &mut [PollItem<'_, B::Socket>],
        timeout: PollTimeout,
    ) -> Result<usize> {
        let budget = Budget::start(timeout);
        let mut retries: u32 = 0;
        loop {
            let wait = budget.native_millis();
            match backend.poll(items, wait) {
                Ok(ready) => return Ok(ready),
                Err(NativeError::Interrupted) => {
                    if self.probe.interrupt_pending() {
                        debug!("[POLL] Interrupted by the host after {} retries", retries);
                        return Err(BridgeError::Interrupted);
                    }
                    retries = retries.saturating_add(1);
                    match budget.remaining() {
                        Some(left) if left.is_zero() => {
                            trace!("[POLL] Budget exhausted after {} retries", retries);
                            for item in items.iter_mut() {
                                item.revents = Events::NONE;
                            }
                            return Ok(0);
                        }
                        Some(left) => {
                            trace!("[POLL] Spurious interruption, retrying with {:?} left", left);
                        }
                        None => {
                            if self.max_retries.is_some_and(|max| retries > max) {
                                debug!("[POLL] Giving up after {} interruptions", retries);
                                return Err(BridgeError::Interrupted);
                            }
                            trace!("[POLL] Spurious interruption, retrying");
                        }
                    }
                }
                Err(NativeError::Terminated) => return Err(BridgeError::ContextTerminated),
                Err(NativeError::Fault) => return Err(BridgeError::InvalidPollItems),
                Err(err) => return Err(BridgeError::Native(err)),
            }
        }
    }
}

impl<B: Backend> Bridge<B> {
    /// Wait for events on several sockets.
    ///
    /// `timeout_ms` is negative to wait forever, zero to check readiness
    /// only. Every handle and event name is validated before the native poll
    /// runs. The result holds one [`PollOutcome`] per request, in request
    /// order.
    pub fn poll(&mut self, requests: &[PollRequest], timeout_ms: i64) -> Result<Vec<PollOutcome>> {
        if requests.is_empty() {
            return Err(BridgeError::invalid_argument("a non-empty list of sockets is required"));
        }

        let mut wanted = Vec::with_capacity(requests.len());
        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            let socket = self.handles.socket(&request.socket)?;
            let (events, mask) = parse_events(&request.events)?;
            items.push(PollItem::new(socket, mask));
            wanted.push(events);
        }

        let coordinator = PollCoordinator::new(
            self.config.interrupt_probe.as_ref(),
            self.config.max_poll_retries,
        );
        let outcome = coordinator
            .run(&self.backend, &mut items, PollTimeout::from_millis(timeout_ms))
            .map(|ready| {
                trace!("[POLL] {} of {} sockets ready", ready, items.len());
                wanted
                    .iter()
                    .zip(&items)
                    .map(|(events, item)| PollOutcome::assemble(events, item.revents))
                    .collect::<Vec<_>>()
            });

        if let Err(BridgeError::Native(err)) = &outcome {
            self.last_error = Some(err.clone());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{LoopbackBackend, PollFault};
    use std::time::Duration;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_events_dedupes() {
        let (events, mask) = parse_events(&names(&["write", "read", "write"])).unwrap();
        assert_eq!(events.as_slice(), &[PollEvent::Write, PollEvent::Read]);
        assert_eq!(mask, Events::READ | Events::WRITE);

        assert!(matches!(
            parse_events(&names(&["read", "readable"])),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_outcome_lookup() {
        let outcome = PollOutcome::assemble(&[PollEvent::Error, PollEvent::Read], Events::READ);
        assert_eq!(outcome.keys().collect::<Vec<_>>(), vec![PollEvent::Error, PollEvent::Read]);
        assert_eq!(outcome.get(PollEvent::Read), Some(true));
        assert_eq!(outcome.get(PollEvent::Error), Some(false));
        assert_eq!(outcome.get(PollEvent::Write), None);
        assert_eq!(outcome.get_named("read"), Some(true));
        assert_eq!(outcome.get_named("bogus"), None);
        assert!(outcome.any());
    }

    #[test]
    fn test_coordinator_maps_native_errors() {
        let backend = LoopbackBackend::new();
        let ctx = backend.context(1).unwrap();
        let socket = backend.socket(&ctx, crate::socket_type::SocketKind::Pull).unwrap();
        let never = crate::interrupt::NeverInterrupted;
        let coordinator = PollCoordinator::new(&never, None);

        for (fault, expected) in [
            (NativeError::Terminated, "ContextTerminated"),
            (NativeError::Fault, "InvalidPollItems"),
            (NativeError::other(9, "Bad file descriptor"), "Native"),
        ] {
            backend.inject_poll_fault(PollFault::Fail(fault));
            let mut items = [PollItem::new(&socket, Events::READ)];
            let err = coordinator
                .run(&backend, &mut items, PollTimeout::from_millis(0))
                .unwrap_err();
            assert!(format!("{err:?}").starts_with(expected), "{err:?}");
        }
    }

    #[test]
    fn test_infinite_poll_retry_cap() {
        let backend = LoopbackBackend::new();
        let ctx = backend.context(1).unwrap();
        let socket = backend.socket(&ctx, crate::socket_type::SocketKind::Pull).unwrap();
        for _ in 0..3 {
            backend.inject_poll_fault(PollFault::Interrupt {
                after: Duration::from_millis(1),
            });
        }
        let never = crate::interrupt::NeverInterrupted;
        let coordinator = PollCoordinator::new(&never, Some(2));
        let mut items = [PollItem::new(&socket, Events::READ)];
        let err = coordinator
            .run(&backend, &mut items, PollTimeout::Infinite)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Interrupted));
        assert_eq!(backend.poll_timeouts(), vec![-1, -1, -1]);
    }
}
