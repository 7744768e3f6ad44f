use std::sync::atomic::{AtomicU64, Ordering};

/// Client telemetry.
///
/// `Telemetry` collects information about the delivery pipeline: how many lines were accepted or
/// dropped on submission, and how many datagrams and bytes made it onto the wire. Counters are updated
/// with relaxed atomics from producers and consumers alike, and read back through [`snapshot`].
///
/// [`snapshot`]: Telemetry::snapshot
#[derive(Default)]
pub(crate) struct Telemetry {
    lines_submitted: AtomicU64,
    lines_dropped: AtomicU64,
    packets_sent: AtomicU64,
    packets_dropped: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_dropped: AtomicU64,
}

impl Telemetry {
    /// Tracks a line accepted by the delivery channel.
    pub fn track_line_submitted(&self) {
        self.lines_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Tracks a line rejected because the delivery channel was full.
    pub fn track_line_dropped(&self) {
        self.lines_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Tracks a successful packet send.
    pub fn track_packet_send_succeeded(&self, bytes_len: usize) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes_len as u64, Ordering::Relaxed);
    }

    /// Tracks a failed or partial packet send.
    pub fn track_packet_send_failed(&self, bytes_len: usize) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
        self.bytes_dropped.fetch_add(bytes_len as u64, Ordering::Relaxed);
    }

    /// Returns the current value of every counter.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            lines_submitted: self.lines_submitted.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_dropped: self.bytes_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the client's delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Lines accepted into the delivery queue or ring.
    pub lines_submitted: u64,

    /// Lines dropped because the delivery queue or ring was full.
    pub lines_dropped: u64,

    /// Datagrams sent in full.
    pub packets_sent: u64,

    /// Datagrams that failed to send or were only partially sent.
    pub packets_dropped: u64,

    /// Bytes sent in full datagrams.
    pub bytes_sent: u64,

    /// Bytes in datagrams that failed to send.
    pub bytes_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let telemetry = Telemetry::default();
        telemetry.track_line_submitted();
        telemetry.track_line_submitted();
        telemetry.track_line_dropped();
        telemetry.track_packet_send_succeeded(10);
        telemetry.track_packet_send_failed(4);

        assert_eq!(
            telemetry.snapshot(),
            TelemetrySnapshot {
                lines_submitted: 2,
                lines_dropped: 1,
                packets_sent: 1,
                packets_dropped: 1,
                bytes_sent: 10,
                bytes_dropped: 4,
            }
        );
    }
}
