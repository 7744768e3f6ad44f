//! Fixed-capacity ring of events with pluggable consumers.
//!
//! Producers publish into a lock-free [`ArrayQueue`] and never block: when every slot is taken the
//! publish fails and the caller decides what to do with the event. Each registered [`EventHandler`]
//! gets its own consumer thread. Consumers take events off the ring, so an event is seen by exactly one
//! handler. Each consumer takes one event ahead of the one it hands out, and marks the event as the end
//! of a batch when that look-ahead came back empty. A handler therefore always sees the end of its own
//! run of events, however the ring's contents were split between consumers.
//!
//! Idle consumers spin with a backoff, then park. Producers unpark parked consumers after publishing,
//! and parking is always bounded, so a missed wakeup costs latency, never progress.
use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, OnceLock,
    },
    thread::{self, JoinHandle, Thread},
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_queue::ArrayQueue;
use crossbeam_utils::Backoff;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{
    error::{panic_message, StatsdError},
    sink::SharedErrorHandler,
};

/// Default number of slots in the ring.
pub const DEFAULT_RING_CAPACITY: usize = 16384;

/// Default number of consumer threads draining the ring.
pub const DEFAULT_RING_CONSUMERS: usize = 1;

const IDLE_PARK_TIMEOUT: Duration = Duration::from_millis(10);

/// Consumes events taken off the ring.
///
/// A handler is owned by a single consumer thread for its whole life, so it can hold mutable state
/// such as a packet buffer without any synchronization.
pub trait EventHandler<T>: Send {
    /// Called once on the consumer thread before the first event.
    fn on_start(&mut self) -> Result<(), StatsdError> {
        Ok(())
    }

    /// Handles one event.
    ///
    /// `sequence` counts the events seen by this handler, starting at zero. `end_of_batch` is `true` when
    /// this handler's consumer found no further event waiting after this one; the consumer goes idle
    /// after an event flagged this way unless more are published.
    fn on_event(&mut self, event: &T, sequence: u64, end_of_batch: bool) -> Result<(), StatsdError>;

    /// Called once on the consumer thread after the ring has been drained during shutdown.
    fn on_shutdown(&mut self) -> Result<(), StatsdError> {
        Ok(())
    }
}

/// Receives the errors returned by [`EventHandler`] callbacks.
///
/// A returned error never stops the consumer: the event is considered handled and the next one is
/// taken. A handler that panics, on the other hand, takes its consumer thread down with it; that
/// failure is logged and then left to unwind.
pub trait ExceptionHandler: Send + Sync {
    /// An event could not be handled.
    fn handle_event_error(&self, error: StatsdError, sequence: u64);

    /// The handler failed to start. The consumer keeps running.
    fn handle_start_error(&self, error: StatsdError);

    /// The handler failed to shut down.
    fn handle_shutdown_error(&self, error: StatsdError);
}

/// Forwards every handler error to the client's error handler.
pub(crate) struct ErrorSinkAdapter {
    errors: SharedErrorHandler,
}

impl ErrorSinkAdapter {
    pub fn new(errors: SharedErrorHandler) -> Self {
        ErrorSinkAdapter { errors }
    }
}

impl ExceptionHandler for ErrorSinkAdapter {
    fn handle_event_error(&self, error: StatsdError, _sequence: u64) {
        self.errors.handle(error);
    }

    fn handle_start_error(&self, error: StatsdError) {
        self.errors.handle(error);
    }

    fn handle_shutdown_error(&self, error: StatsdError) {
        self.errors.handle(error);
    }
}

struct Shared<T> {
    slots: ArrayQueue<T>,
    halted: AtomicBool,
    sleepers: AtomicUsize,
    consumers: OnceLock<Vec<Thread>>,
}

impl<T> Shared<T> {
    fn wake_all(&self) {
        if let Some(consumers) = self.consumers.get() {
            for consumer in consumers {
                consumer.unpark();
            }
        }
    }
}

/// Why an event was handed back by [`Ring::try_publish`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PublishError<T> {
    /// Every slot is taken.
    Full(T),

    /// The ring is shutting down and accepts nothing more.
    Halted(T),
}

/// A running ring and its consumer threads.
pub(crate) struct Ring<T> {
    shared: Arc<Shared<T>>,
    done: Receiver<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> Ring<T> {
    /// Starts one consumer thread per handler.
    pub fn start(
        capacity: usize,
        handlers: Vec<Box<dyn EventHandler<T>>>,
        exceptions: Arc<dyn ExceptionHandler>,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            slots: ArrayQueue::new(capacity),
            halted: AtomicBool::new(false),
            sleepers: AtomicUsize::new(0),
            consumers: OnceLock::new(),
        });
        let (done_tx, done_rx) = bounded::<()>(0);

        let mut handles = Vec::with_capacity(handlers.len());
        for (index, handler) in handlers.into_iter().enumerate() {
            let consumer = Consumer {
                shared: Arc::clone(&shared),
                handler,
                exceptions: Arc::clone(&exceptions),
                _done: done_tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(format!("statsd-ring-consumer-{index}"))
                .spawn(move || consumer.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Let whatever already started wind down on its own.
                    shared.halted.store(true, Ordering::SeqCst);
                    for handle in &handles {
                        handle.thread().unpark();
                    }
                    return Err(e);
                }
            }
        }

        let _ = shared.consumers.set(handles.iter().map(|h| h.thread().clone()).collect());
        debug!(capacity, consumers = handles.len(), "Ring started.");

        Ok(Ring { shared, done: done_rx, handles: Mutex::new(handles) })
    }

    /// Publishes an event without blocking.
    ///
    /// Hands the event back if the ring is full or shutting down.
    pub fn try_publish(&self, event: T) -> Result<(), PublishError<T>> {
        if self.shared.halted.load(Ordering::Acquire) {
            return Err(PublishError::Halted(event));
        }

        self.shared.slots.push(event).map_err(PublishError::Full)?;
        if self.shared.sleepers.load(Ordering::SeqCst) > 0 {
            self.shared.wake_all();
        }
        Ok(())
    }

    /// Stops the consumers once the ring has been drained, waiting at most `timeout` for them.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), StatsdError> {
        self.shared.halted.store(true, Ordering::SeqCst);
        self.shared.wake_all();

        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(StatsdError::ShutdownTimeout { timeout }),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                for handle in self.handles.lock().drain(..) {
                    // A consumer that died from a handler panic has already been logged.
                    let _ = handle.join();
                }
                Ok(())
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.shared.slots.len()
    }
}

struct Consumer<T> {
    shared: Arc<Shared<T>>,
    handler: Box<dyn EventHandler<T>>,
    exceptions: Arc<dyn ExceptionHandler>,
    _done: Sender<()>,
}

impl<T> Consumer<T> {
    fn run(mut self) {
        match panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_start())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.exceptions.handle_start_error(e),
            Err(payload) => fatal(payload, "start"),
        }

        let backoff = Backoff::new();
        let mut sequence = 0u64;
        let mut next = None;
        loop {
            if let Some(event) = next.take().or_else(|| self.shared.slots.pop()) {
                backoff.reset();
                next = self.shared.slots.pop();
                let end_of_batch = next.is_none();

                let handler = &mut self.handler;
                match panic::catch_unwind(AssertUnwindSafe(|| {
                    handler.on_event(&event, sequence, end_of_batch)
                })) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => self.exceptions.handle_event_error(e, sequence),
                    Err(payload) => fatal(payload, "event"),
                }
                sequence += 1;
                continue;
            }

            // Only stop once the ring is empty, so everything published before shutdown is handled.
            if self.shared.halted.load(Ordering::SeqCst) {
                break;
            }

            if backoff.is_completed() {
                self.shared.sleepers.fetch_add(1, Ordering::SeqCst);
                if self.shared.slots.is_empty() && !self.shared.halted.load(Ordering::SeqCst) {
                    thread::park_timeout(IDLE_PARK_TIMEOUT);
                }
                self.shared.sleepers.fetch_sub(1, Ordering::SeqCst);
            } else {
                backoff.snooze();
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.handler.on_shutdown())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.exceptions.handle_shutdown_error(e),
            Err(payload) => fatal(payload, "shutdown"),
        }

        debug!(handled = sequence, "Ring consumer stopped.");
    }
}

/// Logs an unrecoverable handler failure and lets it finish unwinding the consumer thread.
fn fatal(payload: Box<dyn Any + Send>, phase: &'static str) -> ! {
    error!(
        phase,
        panic = %panic_message(payload.as_ref()),
        "Ring event handler panicked, consumer thread is halting."
    );
    panic::resume_unwind(payload)
}
