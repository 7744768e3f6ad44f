use std::sync::Arc;

use crate::error::StatsdError;

/// Receives every failure that happens inside the client after it has been built.
///
/// Handlers are invoked from consumer threads, the address refresh thread, and from the thread
/// calling [`StatsdClient::close`](crate::StatsdClient::close), so they must be cheap and must never
/// block for long. Whatever a handler does, the failure is never propagated back to the code that
/// recorded the metric.
///
/// Any `Fn(StatsdError) + Send + Sync` closure is an `ErrorHandler`.
pub trait ErrorHandler: Send + Sync {
    /// Handles a single failure.
    fn handle(&self, error: StatsdError);
}

impl<F> ErrorHandler for F
where
    F: Fn(StatsdError) + Send + Sync,
{
    fn handle(&self, error: StatsdError) {
        (self)(error);
    }
}

/// An [`ErrorHandler`] that discards every error.
///
/// This is the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopErrorHandler;

impl ErrorHandler for NoopErrorHandler {
    fn handle(&self, _: StatsdError) {}
}

pub(crate) type SharedErrorHandler = Arc<dyn ErrorHandler>;
