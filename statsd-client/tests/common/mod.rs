#![allow(dead_code)]

use std::{
    collections::VecDeque,
    net::{Ipv4Addr, SocketAddr, UdpSocket},
    sync::Arc,
    thread,
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use statsd_client::{StatsdClient, StatsdClientBuilder, StatsdError};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A UDP server standing in for the collector, collecting every datagram it receives.
pub struct DummyServer {
    addr: SocketAddr,
    sender: Arc<Mutex<Option<SocketAddr>>>,
    payloads: Receiver<String>,
    pending: Mutex<VecDeque<String>>,
}

impl DummyServer {
    pub fn start() -> Self {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let addr = socket.local_addr().unwrap();
        let (tx, rx) = unbounded();
        let sender = Arc::new(Mutex::new(None));

        let last_sender = Arc::clone(&sender);
        thread::spawn(move || {
            let mut buf = vec![0u8; 65536];
            while let Ok((len, from)) = socket.recv_from(&mut buf) {
                *last_sender.lock() = Some(from);
                let payload = String::from_utf8_lossy(&buf[..len]).into_owned();
                if tx.send(payload).is_err() {
                    break;
                }
            }
        });

        DummyServer { addr, sender, payloads: rx, pending: Mutex::new(VecDeque::new()) }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Source address of the latest datagram.
    pub fn last_sender(&self) -> Option<SocketAddr> {
        *self.sender.lock()
    }

    /// Builder pointed at this server.
    pub fn client(&self) -> StatsdClientBuilder {
        StatsdClient::builder().with_remote_address(self.addr.to_string()).unwrap()
    }

    /// Next whole datagram, ignoring any lines already split off by `next_message`.
    pub fn next_payload(&self) -> String {
        self.payloads.recv_timeout(RECV_TIMEOUT).expect("no payload received")
    }

    /// Next line, whichever datagram it arrived in.
    pub fn next_message(&self) -> String {
        let mut pending = self.pending.lock();
        while pending.is_empty() {
            let payload = self.next_payload();
            pending.extend(payload.split('\n').map(str::to_string));
        }
        pending.pop_front().unwrap()
    }

    pub fn next_messages(&self, count: usize) -> Vec<String> {
        (0..count).map(|_| self.next_message()).collect()
    }

    /// Asserts that nothing arrives within `wait`.
    pub fn assert_silent(&self, wait: Duration) {
        assert!(self.pending.lock().is_empty());
        match self.payloads.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}

/// Error handler that keeps every error it is given.
pub fn collect_errors() -> (impl Fn(StatsdError) + Send + Sync + 'static, Arc<Mutex<Vec<StatsdError>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let errors = Arc::clone(&errors);
        move |e: StatsdError| errors.lock().push(e)
    };
    (handler, errors)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
