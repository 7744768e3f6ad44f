use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{Delivery, Forwarder};
use crate::{
    error::{panic_message, StatsdError},
    sink::{ErrorHandler, SharedErrorHandler},
    telemetry::Telemetry,
};

/// Default number of lines the delivery queue holds before dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16384;

/// Bounded queue drained by a single consumer thread.
///
/// Producers never block: a full queue drops the line and reports [`StatsdError::QueueFull`]. The
/// consumer flushes eagerly whenever the queue looks empty after taking a line, which keeps latency low
/// under light load and still packs datagrams when lines arrive faster than they can be sent.
pub(crate) struct QueueDelivery {
    lines: Sender<String>,
    shutdown: Mutex<Option<Sender<()>>>,
    done: Receiver<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    errors: SharedErrorHandler,
    telemetry: Arc<Telemetry>,
}

impl QueueDelivery {
    /// Starts the consumer thread.
    pub fn spawn(
        capacity: usize,
        forwarder: Forwarder,
        errors: SharedErrorHandler,
        telemetry: Arc<Telemetry>,
    ) -> io::Result<Self> {
        let (lines_tx, lines_rx) = bounded(capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (done_tx, done_rx) = bounded::<()>(0);

        let consumer = Consumer {
            lines: lines_rx,
            shutdown: shutdown_rx,
            forwarder,
            errors: Arc::clone(&errors),
            _done: done_tx,
        };
        let handle = thread::Builder::new()
            .name("statsd-queue-consumer".to_string())
            .spawn(move || consumer.run())?;

        Ok(QueueDelivery {
            lines: lines_tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            done: done_rx,
            handle: Mutex::new(Some(handle)),
            errors,
            telemetry,
        })
    }
}

impl Delivery for QueueDelivery {
    fn submit(&self, line: String) {
        match self.lines.try_send(line) {
            Ok(()) => self.telemetry.track_line_submitted(),
            Err(TrySendError::Full(_)) => {
                self.telemetry.track_line_dropped();
                self.errors.handle(StatsdError::QueueFull);
            }
            Err(TrySendError::Disconnected(_)) => trace!("Queue consumer gone, discarding line."),
        }
    }

    fn shutdown(&self, timeout: Duration) -> Result<(), StatsdError> {
        drop(self.shutdown.lock().take());

        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => Err(StatsdError::ShutdownTimeout { timeout }),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.lock().take() {
                    let _ = handle.join();
                }
                Ok(())
            }
        }
    }
}

struct Consumer {
    lines: Receiver<String>,
    shutdown: Receiver<()>,
    forwarder: Forwarder,
    errors: SharedErrorHandler,

    // Dropped when the thread exits, which is what `shutdown` waits for.
    _done: Sender<()>,
}

impl Consumer {
    fn run(self) {
        let Consumer { lines, shutdown, mut forwarder, errors, _done } = self;
        debug!("Queue consumer started.");

        loop {
            select! {
                recv(lines) -> line => match line {
                    Ok(line) => process(&lines, &mut forwarder, errors.as_ref(), &line),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }

        // Whatever was accepted before shutdown began still goes out.
        let mut drained = 0usize;
        while let Ok(line) = lines.try_recv() {
            process(&lines, &mut forwarder, errors.as_ref(), &line);
            drained += 1;
        }
        if let Err(e) = forwarder.flush() {
            errors.handle(e);
        }

        debug!(drained, "Queue consumer stopped.");
    }
}

fn process(
    lines: &Receiver<String>,
    forwarder: &mut Forwarder,
    errors: &dyn ErrorHandler,
    line: &str,
) {
    let end_of_batch = lines.is_empty();
    match panic::catch_unwind(AssertUnwindSafe(|| forwarder.process(line, end_of_batch))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => errors.handle(e),
        Err(payload) => {
            errors.handle(StatsdError::ConsumerPanicked { message: panic_message(payload.as_ref()) })
        }
    }
}
