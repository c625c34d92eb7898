//! Traffic statistics
//!
//! The socket owns one statistics record; every channel borrows it through
//! a shared handle and accumulates its own row. Formatting helpers are for
//! front-ends that print periodic summaries.

use parking_lot::RwLock;
use std::sync::Arc;

/// Per-channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStatistic {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// Aggregated socket statistics.
#[derive(Debug, Clone, Default)]
pub struct Statistic {
    channels: Vec<ChannelStatistic>,
}

impl Statistic {
    /// A record with one row per configured channel.
    pub fn new(channel_count: usize) -> Self {
        Statistic {
            channels: vec![ChannelStatistic::default(); channel_count],
        }
    }

    /// Counters for one channel.
    pub fn channel(&self, index: usize) -> ChannelStatistic {
        self.channels.get(index).copied().unwrap_or_default()
    }

    /// Number of channel rows.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Sum over all channels.
    pub fn total(&self) -> ChannelStatistic {
        let mut total = ChannelStatistic::default();
        for row in &self.channels {
            total.messages_sent += row.messages_sent;
            total.messages_received += row.messages_received;
            total.bytes_sent += row.bytes_sent;
            total.bytes_received += row.bytes_received;
        }
        total
    }

    pub(crate) fn record_sent(&mut self, channel: usize, bytes: usize) {
        if let Some(row) = self.channels.get_mut(channel) {
            row.messages_sent += 1;
            row.bytes_sent += bytes as u64;
        }
    }

    pub(crate) fn record_received(&mut self, channel: usize, bytes: usize) {
        if let Some(row) = self.channels.get_mut(channel) {
            row.messages_received += 1;
            row.bytes_received += bytes as u64;
        }
    }
}

/// Shared handle to the socket-owned statistics record.
pub type SharedStatistic = Arc<RwLock<Statistic>>;

/// Format a byte count in human-readable form.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a nanosecond round-trip time in human-readable form.
pub fn format_rtt(rtt_ns: i64) -> String {
    if rtt_ns >= 1_000_000_000 {
        format!("{:.2}s", rtt_ns as f64 / 1_000_000_000.0)
    } else if rtt_ns >= 1_000_000 {
        format!("{:.2}ms", rtt_ns as f64 / 1_000_000.0)
    } else if rtt_ns >= 1_000 {
        format!("{}µs", rtt_ns / 1_000)
    } else {
        format!("{}ns", rtt_ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_channel_accounting() {
        let mut stats = Statistic::new(2);
        stats.record_sent(0, 10);
        stats.record_sent(0, 5);
        stats.record_received(1, 7);

        assert_eq!(stats.channel(0).messages_sent, 2);
        assert_eq!(stats.channel(0).bytes_sent, 15);
        assert_eq!(stats.channel(1).bytes_received, 7);
        assert_eq!(stats.total().bytes_sent, 15);
        assert_eq!(stats.total().bytes_received, 7);
    }

    #[test]
    fn test_out_of_range_channel_ignored() {
        let mut stats = Statistic::new(1);
        stats.record_sent(5, 10);
        assert_eq!(stats.total().bytes_sent, 0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_format_rtt() {
        assert_eq!(format_rtt(500), "500ns");
        assert_eq!(format_rtt(25_000), "25µs");
        assert_eq!(format_rtt(12_500_000), "12.50ms");
    }
}
