use std::{io, net::SocketAddr, time::Duration};

use thiserror::Error;

/// Errors raised inside the delivery pipeline.
///
/// None of these are ever returned from a recording method. They are handed to the configured
/// [`ErrorHandler`](crate::ErrorHandler) instead, exactly once per failure, and the affected data is
/// dropped.
#[derive(Debug, Error)]
pub enum StatsdError {
    /// Resolving the collector's hostname failed.
    #[error("failed to resolve '{host}:{port}': {source}")]
    Resolution {
        /// Hostname being resolved.
        host: String,

        /// Port being resolved.
        port: u16,

        /// Underlying lookup error.
        #[source]
        source: io::Error,
    },

    /// Sending a datagram failed.
    #[error("failed to send {len} byte payload to {addr}: {source}")]
    Send {
        /// Destination of the payload.
        addr: SocketAddr,

        /// Payload length in bytes.
        len: usize,

        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The socket accepted fewer bytes than the payload contained.
    #[error("could not send entire payload to {addr}: only sent {sent} bytes out of {len} bytes")]
    ShortSend {
        /// Destination of the payload.
        addr: SocketAddr,

        /// Bytes actually sent.
        sent: usize,

        /// Payload length in bytes.
        len: usize,
    },

    /// The delivery queue was full and the line was dropped.
    #[error("delivery queue is full, line dropped")]
    QueueFull,

    /// The delivery ring had no free slot and the line was dropped.
    #[error("insufficient ring capacity, line dropped")]
    InsufficientCapacity,

    /// Consumers did not finish draining within the shutdown timeout.
    #[error("consumers did not stop within {timeout:?}")]
    ShutdownTimeout {
        /// The configured shutdown bound.
        timeout: Duration,
    },

    /// The queue consumer panicked while processing a line.
    #[error("queue consumer panicked: {message}")]
    ConsumerPanicked {
        /// Panic payload, when it was a string.
        message: String,
    },

    /// A ring event handler reported a failure.
    #[error("event handler failed: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StatsdError {
    /// Wraps an arbitrary error raised by a custom ring event handler.
    pub fn handler<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        StatsdError::Handler(error.into())
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
