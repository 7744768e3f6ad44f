use std::time::{SystemTime, UNIX_EPOCH};

/// Priority of an [`Event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Low priority.
    Low,

    /// Normal priority.
    Normal,
}

impl Priority {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
        }
    }
}

/// Alert type of an [`Event`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertType {
    /// Error.
    Error,

    /// Warning.
    Warning,

    /// Informational.
    Info,

    /// Success.
    Success,
}

impl AlertType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AlertType::Error => "error",
            AlertType::Warning => "warning",
            AlertType::Info => "info",
            AlertType::Success => "success",
        }
    }
}

/// An event, rendered with the `_e{..}` extension.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub(crate) title: String,
    pub(crate) text: String,
    pub(crate) date_millis: Option<u64>,
    pub(crate) hostname: Option<String>,
    pub(crate) aggregation_key: Option<String>,
    pub(crate) priority: Option<Priority>,
    pub(crate) alert_type: Option<AlertType>,
}

impl Event {
    /// Creates an event with the given title and text.
    ///
    /// The title is prefixed with the client's prefix when sent.
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Event {
            title: title.into(),
            text: text.into(),
            date_millis: None,
            hostname: None,
            aggregation_key: None,
            priority: None,
            alert_type: None,
        }
    }

    /// Sets when the event happened, in milliseconds since the Unix epoch.
    ///
    /// Only whole seconds are sent.
    #[must_use]
    pub fn with_date_millis(mut self, millis: u64) -> Self {
        self.date_millis = Some(millis);
        self
    }

    /// Sets when the event happened.
    ///
    /// Times before the Unix epoch are ignored.
    #[must_use]
    pub fn with_date(mut self, date: SystemTime) -> Self {
        if let Ok(since_epoch) = date.duration_since(UNIX_EPOCH) {
            self.date_millis = u64::try_from(since_epoch.as_millis()).ok();
        }
        self
    }

    /// Sets the host the event originates from.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Sets the key used to group this event with others.
    #[must_use]
    pub fn with_aggregation_key(mut self, key: impl Into<String>) -> Self {
        self.aggregation_key = Some(key.into());
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Sets the alert type.
    #[must_use]
    pub fn with_alert_type(mut self, alert_type: AlertType) -> Self {
        self.alert_type = Some(alert_type);
        self
    }
}

/// Status reported by a [`ServiceCheck`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceCheckStatus {
    /// The service is healthy.
    Ok,

    /// The service is degraded.
    Warning,

    /// The service is down.
    Critical,

    /// The state of the service is not known.
    Unknown,
}

impl ServiceCheckStatus {
    pub(crate) fn as_code(self) -> u8 {
        match self {
            ServiceCheckStatus::Ok => 0,
            ServiceCheckStatus::Warning => 1,
            ServiceCheckStatus::Critical => 2,
            ServiceCheckStatus::Unknown => 3,
        }
    }
}

/// A service check, rendered with the `_sc` extension.
///
/// Unlike metric names and event titles, the check name is sent as is, without the client prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceCheck {
    pub(crate) name: String,
    pub(crate) status: ServiceCheckStatus,
    pub(crate) timestamp: Option<u64>,
    pub(crate) hostname: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) message: Option<String>,
}

impl ServiceCheck {
    /// Creates a service check with the given name and status.
    pub fn new(name: impl Into<String>, status: ServiceCheckStatus) -> Self {
        ServiceCheck {
            name: name.into(),
            status,
            timestamp: None,
            hostname: None,
            tags: Vec::new(),
            message: None,
        }
    }

    /// Sets when the check ran, in seconds since the Unix epoch.
    ///
    /// A timestamp of zero is not sent.
    #[must_use]
    pub fn with_timestamp(mut self, seconds: u64) -> Self {
        self.timestamp = Some(seconds);
        self
    }

    /// Sets the host the check ran on.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    /// Adds tags to the check.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Sets a message describing the status.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
