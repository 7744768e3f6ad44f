use std::fmt::Write as _;

use crate::event::{Event, ServiceCheck};

/// Floating-point values never carry more than this many fractional digits.
const MAX_FRACTION_DIGITS: usize = 6;

/// A numeric metric value.
///
/// Integers are written as is. Floating-point values are written in plain decimal notation, never
/// in exponent form, with at most six fractional digits and no trailing zeros; NaN is written as
/// `NaN`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// Signed integer.
    Signed(i64),

    /// Unsigned integer.
    Unsigned(u64),

    /// Floating-point number.
    Float(f64),
}

impl MetricValue {
    pub(crate) fn write_to(self, out: &mut String) {
        match self {
            MetricValue::Signed(v) => out.push_str(itoa::Buffer::new().format(v)),
            MetricValue::Unsigned(v) => out.push_str(itoa::Buffer::new().format(v)),
            MetricValue::Float(v) => write_float(out, v),
        }
    }
}

macro_rules! impl_from {
    ($variant:ident as $target:ty: $($source:ty),+) => {
        $(
            impl From<$source> for MetricValue {
                fn from(value: $source) -> Self {
                    MetricValue::$variant(<$target>::from(value))
                }
            }
        )+
    };
}

impl_from!(Signed as i64: i8, i16, i32, i64);
impl_from!(Unsigned as u64: u8, u16, u32, u64);
impl_from!(Float as f64: f32, f64);

/// The kind of a metric line, which decides its type suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MetricKind {
    Counter,
    Gauge,
    Timer,
    Histogram,
    Set,
}

impl MetricKind {
    fn suffix(self) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Gauge => "g",
            MetricKind::Timer => "ms",
            MetricKind::Histogram => "h",
            MetricKind::Set => "s",
        }
    }
}

/// Renders lines with a client's prefix and constant tags applied.
#[derive(Clone, Debug, Default)]
pub(crate) struct LineFormatter {
    prefix: String,
    constant_tags: Vec<String>,
}

impl LineFormatter {
    /// Creates a formatter.
    ///
    /// A non-empty prefix is followed by a `.` separator; empty constant tags are ignored.
    pub fn new(prefix: Option<&str>, constant_tags: &[String]) -> Self {
        let prefix = match prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}."),
            _ => String::new(),
        };
        let constant_tags = constant_tags.iter().filter(|tag| !tag.is_empty()).cloned().collect();

        LineFormatter { prefix, constant_tags }
    }

    /// Renders `<prefix><name>:<value>|<type>[|@<rate>][|#<tags>]`.
    pub fn metric<T: AsRef<str>>(
        &self,
        name: &str,
        value: MetricValue,
        kind: MetricKind,
        sample_rate: Option<f64>,
        tags: &[T],
    ) -> String {
        self.metric_with(name, |out| value.write_to(out), kind, sample_rate, tags)
    }

    /// Like [`metric`](Self::metric), with a value that has already been rendered.
    pub fn metric_raw<T: AsRef<str>>(
        &self,
        name: &str,
        value: &str,
        kind: MetricKind,
        sample_rate: Option<f64>,
        tags: &[T],
    ) -> String {
        self.metric_with(name, |out| out.push_str(value), kind, sample_rate, tags)
    }

    fn metric_with<T: AsRef<str>>(
        &self,
        name: &str,
        write_value: impl FnOnce(&mut String),
        kind: MetricKind,
        sample_rate: Option<f64>,
        tags: &[T],
    ) -> String {
        let mut out = String::with_capacity(self.prefix.len() + name.len() + 32);
        out.push_str(&self.prefix);
        out.push_str(name);
        out.push(':');
        write_value(&mut out);
        out.push('|');
        out.push_str(kind.suffix());

        if let Some(rate) = sample_rate {
            let _ = write!(out, "|@{rate:.6}");
        }

        self.write_tags(&mut out, tags);
        out
    }

    /// Renders `_e{<title len>,<text len>}:<title>|<text>` followed by the optional event fields.
    ///
    /// Newlines in the title and text are escaped, and the lengths are those of the escaped strings, in
    /// bytes.
    pub fn event<T: AsRef<str>>(&self, event: &Event, tags: &[T]) -> String {
        let title = escape_newlines(&format!("{}{}", self.prefix, event.title));
        let text = escape_newlines(&event.text);

        let mut out = String::with_capacity(title.len() + text.len() + 32);
        let _ = write!(out, "_e{{{},{}}}:{}|{}", title.len(), text.len(), title, text);

        if let Some(millis) = event.date_millis {
            let _ = write!(out, "|d:{}", millis / 1000);
        }
        if let Some(hostname) = &event.hostname {
            let _ = write!(out, "|h:{hostname}");
        }
        if let Some(key) = &event.aggregation_key {
            let _ = write!(out, "|k:{key}");
        }
        if let Some(priority) = event.priority {
            let _ = write!(out, "|p:{}", priority.as_str());
        }
        if let Some(alert_type) = event.alert_type {
            let _ = write!(out, "|t:{}", alert_type.as_str());
        }

        self.write_tags(&mut out, tags);
        out
    }

    /// Renders `_sc|<name>|<status>` followed by the optional check fields.
    ///
    /// The message comes last and is escaped so that it cannot be mistaken for another field.
    pub fn service_check(&self, check: &ServiceCheck) -> String {
        let mut out = String::with_capacity(check.name.len() + 32);
        let _ = write!(out, "_sc|{}|{}", check.name, check.status.as_code());

        if let Some(timestamp) = check.timestamp.filter(|ts| *ts > 0) {
            let _ = write!(out, "|d:{timestamp}");
        }
        if let Some(hostname) = &check.hostname {
            let _ = write!(out, "|h:{hostname}");
        }
        self.write_tags(&mut out, &check.tags);
        if let Some(message) = &check.message {
            out.push_str("|m:");
            out.push_str(&escape_message(message));
        }

        out
    }

    /// Appends `|#` and the constant tags followed by `tags`, comma separated, skipping empty tags.
    ///
    /// Nothing is appended when there are no tags at all.
    fn write_tags<T: AsRef<str>>(&self, out: &mut String, tags: &[T]) {
        let all = self
            .constant_tags
            .iter()
            .map(String::as_str)
            .chain(tags.iter().map(AsRef::<str>::as_ref))
            .filter(|tag| !tag.is_empty());

        for (i, tag) in all.enumerate() {
            out.push_str(if i == 0 { "|#" } else { "," });
            out.push_str(tag);
        }
    }
}

/// Writes `value` in plain decimal notation with at most six fractional digits.
pub(crate) fn write_float(out: &mut String, value: f64) {
    if value.is_nan() {
        out.push_str("NaN");
        return;
    }
    if value.is_infinite() {
        out.push_str(if value > 0.0 { "Infinity" } else { "-Infinity" });
        return;
    }

    // `Display` gives the shortest representation that round-trips, without exponents.
    let shortest = value.to_string();
    match shortest.split_once('.') {
        Some((_, fraction)) if fraction.len() > MAX_FRACTION_DIGITS => {
            let rounded = format!("{:.*}", MAX_FRACTION_DIGITS, value);
            out.push_str(rounded.trim_end_matches('0').trim_end_matches('.'));
        }
        _ => out.push_str(&shortest),
    }
}

fn escape_newlines(s: &str) -> String {
    s.replace('\n', "\\n")
}

fn escape_message(s: &str) -> String {
    escape_newlines(s).replace("m:", "m\\:")
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::event::{AlertType, Priority, ServiceCheckStatus};

    const NO_TAGS: &[&str] = &[];

    fn prefixed() -> LineFormatter {
        LineFormatter::new(Some("my.prefix"), &[])
    }

    fn float(value: f64) -> String {
        let mut out = String::new();
        write_float(&mut out, value);
        out
    }

    #[test]
    fn counter() {
        let line = prefixed().metric("mycount", MetricValue::from(24), MetricKind::Counter, None, NO_TAGS);
        assert_eq!(line, "my.prefix.mycount:24|c");
    }

    #[test]
    fn counter_with_tags_and_rate() {
        let line = prefixed().metric(
            "mycount",
            MetricValue::from(24),
            MetricKind::Counter,
            Some(1.0),
            &["foo:bar", "baz"],
        );
        assert_eq!(line, "my.prefix.mycount:24|c|@1.000000|#foo:bar,baz");
    }

    #[test]
    fn gauges() {
        let f = prefixed();
        assert_eq!(
            f.metric("mygauge", MetricValue::from(0.423), MetricKind::Gauge, None, NO_TAGS),
            "my.prefix.mygauge:0.423|g"
        );
        assert_eq!(
            f.metric("mygauge", MetricValue::from(123456789012345.67), MetricKind::Gauge, None, NO_TAGS),
            "my.prefix.mygauge:123456789012345.67|g"
        );
        assert_eq!(
            f.metric("mygauge", MetricValue::from(423), MetricKind::Gauge, None, NO_TAGS),
            "my.prefix.mygauge:423|g"
        );
        assert_eq!(
            f.metric("mygauge", MetricValue::from(f64::NAN), MetricKind::Gauge, None, NO_TAGS),
            "my.prefix.mygauge:NaN|g"
        );
    }

    #[test]
    fn other_kinds() {
        let f = prefixed();
        assert_eq!(
            f.metric("mytime", 123u64.into(), MetricKind::Timer, None, &["foo:bar"]),
            "my.prefix.mytime:123|ms|#foo:bar"
        );
        assert_eq!(
            f.metric("myhistogram", MetricValue::from(0.423), MetricKind::Histogram, None, &["foo:bar"]),
            "my.prefix.myhistogram:0.423|h|#foo:bar"
        );
        assert_eq!(
            f.metric_raw("myset", "myuserid", MetricKind::Set, None, &["foo:bar"]),
            "my.prefix.myset:myuserid|s|#foo:bar"
        );
    }

    #[test]
    fn constant_tags_come_first_and_empties_are_skipped() {
        let f = LineFormatter::new(
            Some("my.prefix"),
            &["instance:foo".to_string(), String::new(), "app:bar".to_string()],
        );
        assert_eq!(
            f.metric("value", MetricValue::from(423), MetricKind::Gauge, None, &["", "baz"]),
            "my.prefix.value:423|g|#instance:foo,app:bar,baz"
        );
        assert_eq!(
            f.metric("value", MetricValue::from(423), MetricKind::Gauge, None, NO_TAGS),
            "my.prefix.value:423|g|#instance:foo,app:bar"
        );
    }

    #[test]
    fn empty_prefix_is_not_separated() {
        let f = LineFormatter::new(Some(""), &[]);
        assert_eq!(
            f.metric("top.level.value", MetricValue::from(423), MetricKind::Gauge, None, NO_TAGS),
            "top.level.value:423|g"
        );
        let f = LineFormatter::new(None, &[]);
        assert_eq!(
            f.metric("top.level.value", MetricValue::from(423), MetricKind::Gauge, None, NO_TAGS),
            "top.level.value:423|g"
        );
    }

    #[test]
    fn event_with_every_field() {
        let event = Event::new("title1", "text1\nline2")
            .with_date_millis(1_234_567_000)
            .with_hostname("host1")
            .with_aggregation_key("key1")
            .with_priority(Priority::Low)
            .with_alert_type(AlertType::Error);

        assert_eq!(
            prefixed().event(&event, NO_TAGS),
            "_e{16,12}:my.prefix.title1|text1\\nline2|d:1234567|h:host1|k:key1|p:low|t:error"
        );
    }

    #[test]
    fn event_with_tags_only() {
        let event = Event::new("title1", "text1");
        assert_eq!(
            prefixed().event(&event, &["foo:bar", "baz"]),
            "_e{16,5}:my.prefix.title1|text1|#foo:bar,baz"
        );
    }

    #[test]
    fn service_check_with_every_field() {
        let check = ServiceCheck::new("my_check.name", ServiceCheckStatus::Warning)
            .with_message("♬ †øU \n†øU ¥ºu|m: T0µ ♪")
            .with_hostname("i-abcd1234")
            .with_tags(["key1:val1", "key2:val2"])
            .with_timestamp(1_420_740_000);

        assert_eq!(
            prefixed().service_check(&check),
            concat!(
                "_sc|my_check.name|1|d:1420740000|h:i-abcd1234|#key1:val1,key2:val2",
                "|m:♬ †øU \\n†øU ¥ºu|m\\: T0µ ♪",
            )
        );
    }

    #[test]
    fn service_check_zero_timestamp_is_omitted() {
        let check = ServiceCheck::new("check", ServiceCheckStatus::Ok).with_timestamp(0);
        assert_eq!(LineFormatter::default().service_check(&check), "_sc|check|0");
    }

    #[test]
    fn floats() {
        assert_eq!(float(0.0), "0");
        assert_eq!(float(-0.5), "-0.5");
        assert_eq!(float(1.0), "1");
        assert_eq!(float(1e15), "1000000000000000");
        assert_eq!(float(0.1234567), "0.123457");
        assert_eq!(float(0.0000001), "0");
        assert_eq!(float(2.5000004), "2.5");
        assert_eq!(float(f64::INFINITY), "Infinity");
    }

    proptest! {
        #[test]
        fn floats_are_plain_and_bounded(value in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
            let rendered = float(value);
            prop_assert!(!rendered.contains('e'));
            prop_assert!(!rendered.contains('E'));
            if let Some((_, fraction)) = rendered.split_once('.') {
                prop_assert!(fraction.len() <= MAX_FRACTION_DIGITS);
                prop_assert!(!fraction.ends_with('0'));
            }
        }
    }
}
