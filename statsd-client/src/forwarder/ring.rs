use std::{io, sync::Arc, time::Duration};

use tracing::trace;

use super::{Delivery, Forwarder};
use crate::{
    error::StatsdError,
    ring::{EventHandler, ExceptionHandler, PublishError, Ring},
    sink::SharedErrorHandler,
    telemetry::Telemetry,
};

/// Default ring handler: batches lines into datagrams and sends them.
///
/// The payload goes out as soon as this consumer finds no further line waiting, or earlier if it fills up. Whatever is still
/// buffered is sent when the consumer shuts down.
pub(crate) struct DatagramHandler {
    forwarder: Forwarder,
}

impl DatagramHandler {
    pub fn new(forwarder: Forwarder) -> Self {
        DatagramHandler { forwarder }
    }
}

impl EventHandler<String> for DatagramHandler {
    fn on_event(&mut self, line: &String, _: u64, end_of_batch: bool) -> Result<(), StatsdError> {
        self.forwarder.process(line, end_of_batch)
    }

    fn on_shutdown(&mut self) -> Result<(), StatsdError> {
        self.forwarder.flush()
    }
}

/// Lock-free ring drained by one consumer thread per handler.
pub(crate) struct RingDelivery {
    ring: Ring<String>,
    errors: SharedErrorHandler,
    telemetry: Arc<Telemetry>,
}

impl RingDelivery {
    pub fn start(
        capacity: usize,
        handlers: Vec<Box<dyn EventHandler<String>>>,
        exceptions: Arc<dyn ExceptionHandler>,
        errors: SharedErrorHandler,
        telemetry: Arc<Telemetry>,
    ) -> io::Result<Self> {
        let ring = Ring::start(capacity, handlers, exceptions)?;
        Ok(RingDelivery { ring, errors, telemetry })
    }
}

impl Delivery for RingDelivery {
    fn submit(&self, line: String) {
        match self.ring.try_publish(line) {
            Ok(()) => self.telemetry.track_line_submitted(),
            Err(PublishError::Full(line)) => {
                trace!(len = line.len(), "Ring full, dropping line.");
                self.telemetry.track_line_dropped();
                self.errors.handle(StatsdError::InsufficientCapacity);
            }
            // Lost a race with shutdown; late lines are dropped without a report.
            Err(PublishError::Halted(line)) => trace!(len = line.len(), "Ring halted, dropping line."),
        }
    }

    fn shutdown(&self, timeout: Duration) -> Result<(), StatsdError> {
        self.ring.shutdown(timeout)
    }
}
