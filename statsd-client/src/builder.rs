use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::{
    client::{ClientCore, Pipeline, StatsdClient},
    error::StatsdError,
    format::LineFormatter,
    forwarder::{
        queue::{QueueDelivery, DEFAULT_QUEUE_CAPACITY},
        ring::{DatagramHandler, RingDelivery},
        Delivery, Forwarder, PayloadSender,
    },
    lifecycle::Lifecycle,
    resolver::{AddressResolution, Lookup, RefreshTask, Resolver, SystemLookup},
    ring::{
        ErrorSinkAdapter, EventHandler, ExceptionHandler, DEFAULT_RING_CAPACITY,
        DEFAULT_RING_CONSUMERS,
    },
    sink::{ErrorHandler, NoopErrorHandler, SharedErrorHandler},
    telemetry::Telemetry,
    transport::Transport,
    writer::DEFAULT_MAX_PAYLOAD_LEN,
};

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8125;
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that could occur while building a StatsD client or installing its recorder.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Failed to bind or configure the UDP socket.
    #[error("failed to set up socket: {0}")]
    Io(#[source] std::io::Error),

    /// Failed to resolve the collector address.
    #[error("failed to resolve collector address: {0}")]
    Resolution(#[source] StatsdError),

    /// Failed to parse the remote address.
    #[error("invalid remote address: {reason}")]
    InvalidRemoteAddress {
        /// Details about the parsing failure.
        reason: String,
    },

    /// A size or count was configured as zero.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Which setting was rejected.
        reason: String,
    },

    /// Failed to spawn a background thread.
    #[error("failed to spawn background thread: {0}")]
    Backend(#[source] std::io::Error),

    /// Failed to install the recorder due to an existing global recorder already being installed.
    #[error("failed to install recorder as global recorder")]
    FailedToInstall,
}

/// How formatted lines travel from the recording thread to the socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeliveryStrategy {
    /// A bounded queue drained by a single consumer thread.
    #[default]
    Queue,

    /// A fixed-size lock-free ring drained by one consumer thread per event handler.
    Ring,
}

type HandlerFactory = Arc<dyn Fn() -> Box<dyn EventHandler<String>> + Send + Sync>;

/// Builder for a StatsD client.
pub struct StatsdClientBuilder {
    host: String,
    port: u16,
    prefix: Option<String>,
    constant_tags: Vec<String>,
    strategy: DeliveryStrategy,
    queue_capacity: usize,
    ring_capacity: usize,
    ring_consumers: usize,
    handler_factory: Option<HandlerFactory>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
    error_handler: SharedErrorHandler,
    resolution: AddressResolution,
    lookup: Arc<dyn Lookup>,
    max_payload_len: usize,
    write_timeout: Duration,
    shutdown_timeout: Duration,
}

impl StatsdClientBuilder {
    /// Set the remote address to send metrics to.
    ///
    /// The address must be in the format of `<host>:<port>`, where the host is a hostname or an IP address.
    /// IPv6 addresses may be wrapped in brackets, as in `[::1]:8125`.
    ///
    /// Defaults to `localhost:8125`.
    ///
    /// # Errors
    ///
    /// If the given address is not able to be parsed as a valid address, an error will be returned indicating
    /// the reason.
    pub fn with_remote_address<A>(mut self, addr: A) -> Result<Self, BuildError>
    where
        A: AsRef<str>,
    {
        let (host, port) = parse_remote_address(addr.as_ref())
            .map_err(|reason| BuildError::InvalidRemoteAddress { reason })?;
        self.host = host;
        self.port = port;
        Ok(self)
    }

    /// Set the prefix prepended to every metric name and event title.
    ///
    /// The prefix is separated from the name by a `.`. An empty prefix is the same as no prefix.
    ///
    /// Defaults to no prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set tags sent with every metric, event and service check, ahead of any per-call tags.
    ///
    /// Defaults to no tags.
    #[must_use]
    pub fn with_constant_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constant_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the delivery strategy.
    ///
    /// Defaults to [`DeliveryStrategy::Queue`].
    #[must_use]
    pub fn with_delivery_strategy(mut self, strategy: DeliveryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set how many lines the delivery queue holds.
    ///
    /// When the queue is full, new lines are dropped and reported to the error handler.
    ///
    /// Defaults to 16,384.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set how many slots the delivery ring has.
    ///
    /// When every slot is taken, new lines are dropped and reported to the error handler.
    ///
    /// Defaults to 16,384.
    #[must_use]
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    /// Set how many consumer threads drain the delivery ring.
    ///
    /// Each consumer runs its own event handler with its own packet buffer.
    ///
    /// Defaults to 1.
    #[must_use]
    pub fn with_ring_consumers(mut self, consumers: usize) -> Self {
        self.ring_consumers = consumers;
        self
    }

    /// Set the event handler run by each ring consumer, and switch to the ring strategy.
    ///
    /// `factory` is called once per consumer. Handlers replace the built-in datagram handler, so they are
    /// responsible for delivering the lines they receive.
    ///
    /// Defaults to a handler that batches lines into datagrams and sends them to the remote address.
    #[must_use]
    pub fn with_event_handler<F, H>(mut self, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
        H: EventHandler<String> + 'static,
    {
        let factory: HandlerFactory =
            Arc::new(move || -> Box<dyn EventHandler<String>> { Box::new(factory()) });
        self.handler_factory = Some(factory);
        self.strategy = DeliveryStrategy::Ring;
        self
    }

    /// Set the handler for errors returned by ring event handlers.
    ///
    /// Defaults to forwarding them to the error handler.
    #[must_use]
    pub fn with_exception_handler<H>(mut self, handler: H) -> Self
    where
        H: ExceptionHandler + 'static,
    {
        self.exception_handler = Some(Arc::new(handler));
        self
    }

    /// Set the handler that receives every error raised inside the client.
    ///
    /// Defaults to discarding errors.
    #[must_use]
    pub fn with_error_handler<H>(mut self, handler: H) -> Self
    where
        H: ErrorHandler + 'static,
    {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Set how the remote address is resolved over time.
    ///
    /// A scheduled resolution with a zero period is rejected when the client is built.
    ///
    /// Defaults to [`AddressResolution::Static`].
    #[must_use]
    pub fn with_address_resolution(mut self, resolution: AddressResolution) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the lookup used to resolve the remote host.
    ///
    /// Defaults to [`SystemLookup`].
    #[must_use]
    pub fn with_lookup<L>(mut self, lookup: L) -> Self
    where
        L: Lookup + 'static,
    {
        self.lookup = Arc::new(lookup);
        self
    }

    /// Set the maximum payload length.
    ///
    /// This controls the maximum size of a single datagram. Lines are packed into datagrams up to this size,
    /// and a line that would not fit even in an empty datagram is truncated.
    ///
    /// Defaults to 1,400 bytes, which stays under the MTU of most networks.
    #[must_use]
    pub fn with_maximum_payload_length(mut self, max_payload_len: usize) -> Self {
        self.max_payload_len = max_payload_len;
        self
    }

    /// Set the write timeout for sending datagrams.
    ///
    /// When the write timeout is reached, the datagram being sent is dropped without retrying.
    ///
    /// Defaults to 1 second.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set how long closing the client waits for the consumers to drain.
    ///
    /// Defaults to 30 seconds.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<(), BuildError> {
        let checks = [
            (self.max_payload_len, "maximum payload length"),
            (self.queue_capacity, "queue capacity"),
            (self.ring_capacity, "ring capacity"),
            (self.ring_consumers, "ring consumer count"),
        ];
        for (value, what) in checks {
            if value == 0 {
                return Err(BuildError::InvalidConfiguration {
                    reason: format!("{what} must be greater than zero"),
                });
            }
        }

        if let AddressResolution::Scheduled { period } = self.resolution {
            if period.is_zero() {
                return Err(BuildError::InvalidConfiguration {
                    reason: "address refresh period must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Builds the client.
    ///
    /// The remote address is resolved, the socket is bound and the delivery threads are started.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, the remote address cannot be resolved, the socket cannot be set up,
    /// or a background thread cannot be spawned, an error will be returned.
    pub fn build(self) -> Result<StatsdClient, BuildError> {
        self.validate()?;

        let formatter = LineFormatter::new(self.prefix.as_deref(), &self.constant_tags);
        let resolver = Arc::new(
            Resolver::new(self.host, self.port, self.lookup).map_err(BuildError::Resolution)?,
        );
        let transport =
            Arc::new(Transport::bind(resolver.current(), self.write_timeout).map_err(BuildError::Io)?);
        let telemetry = Arc::new(Telemetry::default());
        let errors = self.error_handler;

        let sender = PayloadSender {
            transport: Arc::clone(&transport),
            resolver: Arc::clone(&resolver),
            telemetry: Arc::clone(&telemetry),
        };
        let max_payload_len = self.max_payload_len;

        let delivery: Box<dyn Delivery> = match self.strategy {
            DeliveryStrategy::Queue => Box::new(
                QueueDelivery::spawn(
                    self.queue_capacity,
                    Forwarder::new(max_payload_len, sender),
                    Arc::clone(&errors),
                    Arc::clone(&telemetry),
                )
                .map_err(BuildError::Backend)?,
            ),
            DeliveryStrategy::Ring => {
                let handlers = (0..self.ring_consumers)
                    .map(|_| match &self.handler_factory {
                        Some(factory) => factory(),
                        None => Box::new(DatagramHandler::new(Forwarder::new(
                            max_payload_len,
                            sender.clone(),
                        ))) as Box<dyn EventHandler<String>>,
                    })
                    .collect();
                let exceptions: Arc<dyn ExceptionHandler> = match self.exception_handler {
                    Some(handler) => handler,
                    None => Arc::new(ErrorSinkAdapter::new(Arc::clone(&errors))),
                };

                Box::new(
                    RingDelivery::start(
                        self.ring_capacity,
                        handlers,
                        exceptions,
                        Arc::clone(&errors),
                        Arc::clone(&telemetry),
                    )
                    .map_err(BuildError::Backend)?,
                )
            }
        };

        let refresh = match self.resolution {
            AddressResolution::Static => None,
            AddressResolution::Scheduled { period } => {
                match RefreshTask::spawn(Arc::clone(&resolver), period, Arc::clone(&errors)) {
                    Ok(task) => Some(task),
                    Err(e) => {
                        let _ = delivery.shutdown(self.shutdown_timeout);
                        return Err(BuildError::Backend(e));
                    }
                }
            }
        };

        let pipeline = Pipeline {
            delivery,
            transport,
            refresh,
            lifecycle: Lifecycle::new(),
            errors,
            telemetry,
            shutdown_timeout: self.shutdown_timeout,
        };

        Ok(StatsdClient::from_core(ClientCore::new(formatter, Some(pipeline))))
    }

    /// Builds the client and installs its recorder as the global recorder.
    ///
    /// The returned client shares its pipeline with the installed recorder and can be used to record events,
    /// service checks and sets, which have no `metrics` equivalent, or to close the pipeline on exit.
    ///
    /// # Errors
    ///
    /// If the client cannot be built, or if a global recorder is already installed, an error will be
    /// returned.
    pub fn install(self) -> Result<StatsdClient, BuildError> {
        let client = self.build()?;

        metrics::set_global_recorder(client.recorder()).map_err(|_| BuildError::FailedToInstall)?;
        Ok(client)
    }
}

impl Default for StatsdClientBuilder {
    fn default() -> Self {
        StatsdClientBuilder {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            prefix: None,
            constant_tags: Vec::new(),
            strategy: DeliveryStrategy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            ring_capacity: DEFAULT_RING_CAPACITY,
            ring_consumers: DEFAULT_RING_CONSUMERS,
            handler_factory: None,
            exception_handler: None,
            error_handler: Arc::new(NoopErrorHandler),
            resolution: AddressResolution::default(),
            lookup: Arc::new(SystemLookup),
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Splits `<host>:<port>` into its parts, unwrapping a bracketed IPv6 host.
fn parse_remote_address(addr: &str) -> Result<(String, u16), String> {
    let (host, port) =
        addr.rsplit_once(':').ok_or_else(|| format!("missing port in '{addr}'"))?;
    let port = port.parse::<u16>().map_err(|e| format!("invalid port '{port}': {e}"))?;
    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if host.is_empty() {
        return Err(format!("missing host in '{addr}'"));
    }

    Ok((host.to_string(), port))
}
