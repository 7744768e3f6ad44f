mod common;

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use parking_lot::Mutex;
use statsd_client::{DeliveryStrategy, EventHandler, LifecycleState, StatsdError};

use self::common::{collect_errors, init_tracing, DummyServer};

#[test]
fn default_handler_sends_datagrams() {
    init_tracing();
    let server = DummyServer::start();
    let client = server
        .client()
        .with_prefix("my.prefix")
        .with_delivery_strategy(DeliveryStrategy::Ring)
        .build()
        .unwrap();

    client.count("mycount", 24, &[]);
    assert_eq!(server.next_message(), "my.prefix.mycount:24|c");

    client.gauge("mygauge", 0.423, &["foo:bar"]);
    assert_eq!(server.next_message(), "my.prefix.mygauge:0.423|g|#foo:bar");

    client.close();
    assert_eq!(client.state(), LifecycleState::Closed);
}

#[test]
fn several_consumers_deliver_every_line() {
    init_tracing();
    let server = DummyServer::start();
    let client = server
        .client()
        .with_delivery_strategy(DeliveryStrategy::Ring)
        .with_ring_consumers(4)
        .build()
        .unwrap();

    // Every consumer flushes at the end of its own run, so nothing waits for close to go out.
    for round in 0..10 {
        for i in 0..200 {
            client.count("spread", round * 1000 + i, &[]);
        }

        let received = server.next_messages(200).into_iter().collect::<BTreeSet<_>>();
        let expected = (0..200).map(|i| format!("spread:{}|c", round * 1000 + i)).collect::<BTreeSet<_>>();
        assert_eq!(received, expected);
    }

    client.close();
    server.assert_silent(Duration::from_millis(100));
}

type Seen = Arc<Mutex<Vec<(String, u64, bool)>>>;

struct Collecting {
    seen: Seen,
}

impl EventHandler<String> for Collecting {
    fn on_event(&mut self, line: &String, sequence: u64, end_of_batch: bool) -> Result<(), StatsdError> {
        self.seen.lock().push((line.clone(), sequence, end_of_batch));
        Ok(())
    }
}

#[test]
fn custom_handler_receives_lines() {
    let server = DummyServer::start();
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let client = {
        let seen = Arc::clone(&seen);
        server
            .client()
            .with_event_handler(move || Collecting { seen: Arc::clone(&seen) })
            .build()
            .unwrap()
    };

    for i in 0..20 {
        client.count("custom", i, &[]);
    }
    client.close();

    let seen = seen.lock();
    let lines = seen.iter().map(|(line, _, _)| line.clone()).collect::<Vec<_>>();
    assert_eq!(lines, (0..20).map(|i| format!("custom:{i}|c")).collect::<Vec<_>>());
    let sequences = seen.iter().map(|(_, sequence, _)| *sequence).collect::<Vec<_>>();
    assert_eq!(sequences, (0..20).collect::<Vec<_>>());
    assert!(seen.last().unwrap().2);

    // The custom handler replaces the datagram handler entirely.
    server.assert_silent(Duration::from_millis(200));
}

struct Failing;

impl EventHandler<String> for Failing {
    fn on_start(&mut self) -> Result<(), StatsdError> {
        Err(StatsdError::handler("not ready"))
    }

    fn on_event(&mut self, line: &String, _: u64, _: bool) -> Result<(), StatsdError> {
        Err(StatsdError::handler(format!("rejected {line}")))
    }

    fn on_shutdown(&mut self) -> Result<(), StatsdError> {
        Err(StatsdError::handler("not stopping"))
    }
}

#[test]
fn handler_errors_reach_the_error_handler() {
    let server = DummyServer::start();
    let (errors, seen) = collect_errors();
    let client = server.client().with_error_handler(errors).with_event_handler(|| Failing).build().unwrap();

    client.increment("a", &[]);
    client.increment("b", &[]);
    client.close();

    let messages = seen.lock().iter().map(ToString::to_string).collect::<Vec<_>>();
    assert_eq!(
        messages,
        vec![
            "event handler failed: not ready",
            "event handler failed: rejected a:1|c",
            "event handler failed: rejected b:1|c",
            "event handler failed: not stopping",
        ]
    );
}

struct Explodes;

impl EventHandler<String> for Explodes {
    fn on_event(&mut self, _: &String, _: u64, _: bool) -> Result<(), StatsdError> {
        panic!("handler exploded");
    }
}

#[test]
fn panicking_handler_does_not_reach_the_caller() {
    let server = DummyServer::start();
    let (errors, seen) = collect_errors();
    let client = server
        .client()
        .with_error_handler(errors)
        .with_ring_capacity(4)
        .with_event_handler(|| Explodes)
        .build()
        .unwrap();

    client.increment("first", &[]);
    std::thread::sleep(Duration::from_millis(100));

    // The only consumer is gone, so the ring fills up and further lines are reported as dropped.
    for _ in 0..10 {
        client.increment("more", &[]);
    }
    client.close();

    let dropped = seen.lock().iter().filter(|e| matches!(e, StatsdError::InsufficientCapacity)).count();
    assert_eq!(dropped, 6);
    assert_eq!(client.telemetry().lines_dropped, 6);
    assert_eq!(client.state(), LifecycleState::Closed);
}
