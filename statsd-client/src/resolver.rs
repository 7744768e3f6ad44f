use std::{
    io,
    net::{SocketAddr, ToSocketAddrs as _},
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{error::StatsdError, sink::SharedErrorHandler};

/// Default period between two scheduled address refreshes.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(60);

/// How the collector address is resolved over the lifetime of a client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AddressResolution {
    /// Resolve once while building the client and never again.
    #[default]
    Static,

    /// Resolve once while building the client, then again every `period` on a background thread.
    ///
    /// A failed refresh keeps the previously resolved address in effect.
    Scheduled {
        /// Time between refreshes.
        period: Duration,
    },
}

impl AddressResolution {
    /// Scheduled resolution with the default refresh period of one minute.
    pub const fn scheduled() -> Self {
        AddressResolution::Scheduled { period: DEFAULT_REFRESH_PERIOD }
    }
}

/// Turns a hostname and port into a socket address.
pub trait Lookup: Send + Sync {
    /// Looks up `host`, returning one address to send to.
    fn lookup(&self, host: &str, port: u16) -> io::Result<SocketAddr>;
}

/// [`Lookup`] backed by the operating system resolver.
///
/// The first address returned by the system is used.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLookup;

impl Lookup for SystemLookup {
    fn lookup(&self, host: &str, port: u16) -> io::Result<SocketAddr> {
        (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses found for '{host}'"))
        })
    }
}

/// Holds the currently effective collector address.
///
/// The address is an immutable value behind an [`ArcSwap`]: a refresh publishes a whole new value and
/// readers on the send path load it without taking a lock.
pub(crate) struct Resolver {
    host: String,
    port: u16,
    lookup: Arc<dyn Lookup>,
    current: ArcSwap<SocketAddr>,
}

impl Resolver {
    /// Performs the initial resolution.
    pub fn new(host: String, port: u16, lookup: Arc<dyn Lookup>) -> Result<Self, StatsdError> {
        let initial = resolve(lookup.as_ref(), &host, port)?;
        debug!(%host, port, addr = %initial, "Resolved collector address.");

        Ok(Resolver { host, port, lookup, current: ArcSwap::from_pointee(initial) })
    }

    /// Returns the address sends should currently target.
    pub fn current(&self) -> SocketAddr {
        **self.current.load()
    }

    /// Resolves the hostname again, replacing the current address on success.
    ///
    /// On failure the current address is left untouched.
    pub fn refresh(&self) -> Result<SocketAddr, StatsdError> {
        let addr = resolve(self.lookup.as_ref(), &self.host, self.port)?;
        let previous = self.current.swap(Arc::new(addr));
        if *previous != addr {
            debug!(host = %self.host, old = %previous, new = %addr, "Collector address changed.");
        }

        Ok(addr)
    }
}

/// Resolves `host:port` through the given lookup.
pub(crate) fn resolve(lookup: &dyn Lookup, host: &str, port: u16) -> Result<SocketAddr, StatsdError> {
    lookup
        .lookup(host, port)
        .map_err(|source| StatsdError::Resolution { host: host.to_string(), port, source })
}

/// Background thread refreshing a [`Resolver`] at a fixed rate.
///
/// Dropping the stop sender wakes the thread immediately, so stopping never waits for a full period.
/// A lookup already in flight is not interrupted; the thread exits as soon as it returns.
pub(crate) struct RefreshTask {
    stop: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshTask {
    pub fn spawn(
        resolver: Arc<Resolver>,
        period: Duration,
        errors: SharedErrorHandler,
    ) -> io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new().name("statsd-dns-resolver".to_string()).spawn(move || {
            let mut next_refresh = Instant::now().checked_add(period);
            loop {
                let signal = match next_refresh {
                    Some(deadline) => stop_rx.recv_deadline(deadline),
                    // Too far out to represent, so the next refresh never comes.
                    None => stop_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };

                match signal {
                    Err(RecvTimeoutError::Timeout) => {
                        next_refresh = next_refresh.and_then(|deadline| deadline.checked_add(period));
                        match resolver.refresh() {
                            Ok(addr) => trace!(%addr, "Refreshed collector address."),
                            Err(e) => errors.handle(e),
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            debug!("Address refresh task stopped.");
        })?;

        Ok(RefreshTask { stop: Mutex::new(Some(stop_tx)), handle: Mutex::new(Some(handle)) })
    }

    /// Signals the task to stop.
    ///
    /// The thread is only joined if it has already finished, so this never blocks on a slow lookup.
    pub fn stop(&self) {
        drop(self.stop.lock().take());

        let mut handle = self.handle.lock();
        if handle.as_ref().is_some_and(|h| h.is_finished()) {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        io,
        net::{Ipv4Addr, SocketAddr},
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use parking_lot::Mutex;

    use super::*;
    use crate::sink::{NoopErrorHandler, SharedErrorHandler};

    /// Lookup whose answer and failure mode can be changed between calls.
    pub(crate) struct FakeLookup {
        pub addr: Mutex<SocketAddr>,
        pub failing: AtomicBool,
        pub calls: AtomicUsize,
    }

    impl FakeLookup {
        pub fn new(addr: SocketAddr) -> Arc<Self> {
            Arc::new(FakeLookup {
                addr: Mutex::new(addr),
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Lookup for FakeLookup {
        fn lookup(&self, _: &str, _: u16) -> io::Result<SocketAddr> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(io::Error::new(io::ErrorKind::NotFound, "lookup disabled"))
            } else {
                Ok(*self.addr.lock())
            }
        }
    }

    fn addr(last: u8, port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::new(10, 0, 0, last), port))
    }

    #[test]
    fn system_lookup_resolves_localhost() {
        let addr = SystemLookup.lookup("localhost", 8125).unwrap();
        assert_eq!(addr.port(), 8125);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn initial_failure_is_an_error() {
        let lookup = FakeLookup::new(addr(1, 8125));
        lookup.failing.store(true, Ordering::SeqCst);

        let result = Resolver::new("host-a".to_string(), 8125, lookup);
        assert!(matches!(result, Err(StatsdError::Resolution { port: 8125, .. })));
    }

    #[test]
    fn failed_refresh_keeps_previous_address() {
        let lookup = FakeLookup::new(addr(1, 8125));
        let resolver = Resolver::new("host-a".to_string(), 8125, lookup.clone()).unwrap();
        assert_eq!(resolver.current(), addr(1, 8125));

        lookup.failing.store(true, Ordering::SeqCst);
        *lookup.addr.lock() = addr(2, 8125);

        assert!(resolver.refresh().is_err());
        assert_eq!(resolver.current(), addr(1, 8125));
    }

    #[test]
    fn successful_refresh_swaps_address() {
        let lookup = FakeLookup::new(addr(1, 8125));
        let resolver = Resolver::new("host-a".to_string(), 8125, lookup.clone()).unwrap();

        *lookup.addr.lock() = addr(3, 8125);
        assert_eq!(resolver.refresh().unwrap(), addr(3, 8125));
        assert_eq!(resolver.current(), addr(3, 8125));
    }

    #[test]
    fn refresh_task_reports_failures_and_stops() {
        let lookup = FakeLookup::new(addr(1, 8125));
        let resolver = Arc::new(Resolver::new("host-a".to_string(), 8125, lookup.clone()).unwrap());
        lookup.failing.store(true, Ordering::SeqCst);

        let failures = Arc::new(AtomicUsize::new(0));
        let errors: SharedErrorHandler = {
            let failures = Arc::clone(&failures);
            Arc::new(move |_: StatsdError| {
                failures.fetch_add(1, Ordering::SeqCst);
            })
        };

        let task =
            RefreshTask::spawn(Arc::clone(&resolver), Duration::from_millis(10), errors).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        task.stop();

        assert!(failures.load(Ordering::SeqCst) > 0);
        assert_eq!(resolver.current(), addr(1, 8125));

        // Give the thread a moment to observe the disconnect; no further lookups should happen.
        std::thread::sleep(Duration::from_millis(50));
        let calls = lookup.calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn refresh_task_with_unrepresentable_period_only_waits_for_stop() {
        let lookup = FakeLookup::new(addr(1, 8125));
        let resolver = Arc::new(Resolver::new("host-a".to_string(), 8125, lookup.clone()).unwrap());

        let task = RefreshTask::spawn(resolver, Duration::MAX, Arc::new(NoopErrorHandler)).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        // Still waiting, and only the initial resolution ran.
        assert!(task.handle.lock().as_ref().is_some_and(|h| !h.is_finished()));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        task.stop();
        std::thread::sleep(Duration::from_millis(50));
        task.stop();
        assert!(task.handle.lock().is_none());
    }

    #[test]
    fn refresh_task_picks_up_new_address() {
        let lookup = FakeLookup::new(addr(1, 8125));
        let resolver = Arc::new(Resolver::new("host-a".to_string(), 8125, lookup.clone()).unwrap());
        *lookup.addr.lock() = addr(9, 8125);

        let task = RefreshTask::spawn(
            Arc::clone(&resolver),
            Duration::from_millis(10),
            Arc::new(NoopErrorHandler),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(100));
        task.stop();

        assert_eq!(resolver.current(), addr(9, 8125));
    }
}
