//! A client for sending metrics, events and service checks to a [StatsD][statsd]/[DogStatsD][dsd] server.
//!
//! [statsd]: https://github.com/statsd/statsd
//! [dsd]: https://docs.datadoghq.com/developers/dogstatsd/
//!
//! # Usage
//!
//! ```no_run
//! # use statsd_client::StatsdClient;
//! // First, create a builder.
//! //
//! // The builder configures the remote address, the prefix and constant tags applied to every line, the
//! // delivery strategy, error handling, and so on.
//! let client = StatsdClient::builder()
//!     .with_remote_address("localhost:8125")
//!     .expect("failed to parse remote address")
//!     .with_prefix("my.app")
//!     .with_constant_tags(["env:prod"])
//!     .build()
//!     .expect("failed to build client");
//!
//! // Recording never blocks and never fails: lines are handed to a background thread which batches them into
//! // datagrams and sends them.
//! client.increment("requests", &["route:/"]);
//! client.gauge("queue.depth", 42, &[]);
//! client.histogram("request.size", 0.423, &[]);
//!
//! // Closing delivers whatever is still pending, then closes the socket.
//! client.close();
//! ```
//!
//! The client can also be installed as the global [`metrics`] recorder, so that the `metrics` macros emit
//! through it:
//!
//! ```no_run
//! # use statsd_client::StatsdClient;
//! let client = StatsdClient::builder().install().expect("failed to install recorder");
//!
//! metrics::counter!("requests", "route" => "/").increment(1);
//! # client.close();
//! ```
//!
//! # Features
//!
//! ## Non-blocking delivery
//!
//! Recording methods format a single line and hand it to a bounded channel. When the channel is full, the
//! line is dropped and the error handler is told about it: the calling thread never waits on the network.
//!
//! Two delivery strategies are available:
//!
//! - [`DeliveryStrategy::Queue`] (the default): a bounded queue drained by one consumer thread.
//! - [`DeliveryStrategy::Ring`]: a fixed-size lock-free ring drained by one or more consumer threads, each
//!   running an [`EventHandler`]. Custom handlers can be plugged in with
//!   [`StatsdClientBuilder::with_event_handler`].
//!
//! ## Batching
//!
//! Consumers pack lines into datagrams of up to 1,400 bytes by default, and send a datagram as soon as no
//! more lines are waiting. Under light load every line goes out right away; under heavy load datagrams fill
//! up.
//!
//! ## Address refresh
//!
//! With [`AddressResolution::Scheduled`], the remote hostname is resolved again every minute by a background
//! thread, which lets the client follow a collector whose address changes. A failed lookup keeps the previous
//! address.
//!
//! ## Error handling
//!
//! Everything that can go wrong after the client is built (send failures, a full queue, a failed address
//! refresh, a slow shutdown) is reported to an [`ErrorHandler`] as a [`StatsdError`], once, and the affected
//! data is dropped.
//!
//! ## Telemetry
//!
//! The client counts lines submitted and dropped, and datagrams and bytes sent and dropped. See
//! [`StatsdClient::telemetry`].
//!
//! # Missing
//!
//! There is no delivery guarantee, no client-side aggregation and no retry: the transport is UDP only.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{BuildError, DeliveryStrategy, StatsdClientBuilder};

mod client;
pub use self::client::StatsdClient;

mod error;
pub use self::error::StatsdError;

mod event;
pub use self::event::{AlertType, Event, Priority, ServiceCheck, ServiceCheckStatus};

mod format;
pub use self::format::MetricValue;

mod forwarder;
pub use self::forwarder::queue::DEFAULT_QUEUE_CAPACITY;

mod lifecycle;
pub use self::lifecycle::LifecycleState;

mod recorder;
pub use self::recorder::StatsdRecorder;

mod resolver;
pub use self::resolver::{AddressResolution, Lookup, SystemLookup, DEFAULT_REFRESH_PERIOD};

mod ring;
pub use self::ring::{EventHandler, ExceptionHandler, DEFAULT_RING_CAPACITY, DEFAULT_RING_CONSUMERS};

mod sink;
pub use self::sink::{ErrorHandler, NoopErrorHandler};

mod telemetry;
pub use self::telemetry::TelemetrySnapshot;

mod transport;

mod writer;
pub use self::writer::DEFAULT_MAX_PAYLOAD_LEN;
