use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    error::StatsdError, resolver::Resolver, telemetry::Telemetry, transport::Transport,
    writer::PayloadWriter,
};

pub mod queue;
pub mod ring;

/// A delivery strategy: takes finished lines from producers and gets them to consumer threads.
pub(crate) trait Delivery: Send + Sync {
    /// Hands a line over for delivery.
    ///
    /// Never blocks beyond a bounded enqueue. A full channel drops the line and reports it.
    fn submit(&self, line: String);

    /// Stops the consumers, letting them drain what is already queued.
    ///
    /// Waits at most `timeout`; the caller closes the transport afterwards whatever the outcome.
    fn shutdown(&self, timeout: Duration) -> Result<(), StatsdError>;
}

/// Ships finished payloads to the collector's current address.
#[derive(Clone)]
pub(crate) struct PayloadSender {
    pub transport: Arc<Transport>,
    pub resolver: Arc<Resolver>,
    pub telemetry: Arc<Telemetry>,
}

impl PayloadSender {
    fn send(&self, payload: &[u8]) -> Result<(), StatsdError> {
        let addr = self.resolver.current();
        match self.transport.send(payload, addr) {
            Ok(()) => {
                self.telemetry.track_packet_send_succeeded(payload.len());
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, len = payload.len(), "Dropped payload.");
                self.telemetry.track_packet_send_failed(payload.len());
                Err(e)
            }
        }
    }
}

/// Per-consumer batching pipeline.
///
/// Each consumer thread owns exactly one `Forwarder`, and with it the only reference to its packet
/// buffer.
pub(crate) struct Forwarder {
    writer: PayloadWriter,
    sender: PayloadSender,
}

impl Forwarder {
    pub fn new(max_payload_len: usize, sender: PayloadSender) -> Self {
        Forwarder { writer: PayloadWriter::new(max_payload_len), sender }
    }

    /// Batches a line, sending the current payload when it fills up or when `end_of_batch` is set.
    pub fn process(&mut self, line: &str, end_of_batch: bool) -> Result<(), StatsdError> {
        let sender = &self.sender;
        self.writer.append(line.as_bytes(), end_of_batch, |payload| sender.send(payload))
    }

    /// Sends whatever is pending.
    pub fn flush(&mut self) -> Result<(), StatsdError> {
        let sender = &self.sender;
        self.writer.flush(|payload| sender.send(payload))
    }
}
