//! Round-trip time estimation over in-flight pings
//!
//! Outstanding ping send times live in a small ring indexed by sequence
//! number modulo the ring size. A slot is consumed by the matching pong or
//! silently reclaimed when a later ping wraps onto it, so a response that
//! arrives after more than one full lap of the ring is treated as lost.

use crate::sampling::{SampleSet, SampleStats};

/// Number of in-flight ping slots.
pub const RTT_RING_SIZE: usize = 20;

/// Number of round-trip samples in the averaging window.
pub const RTT_SAMPLE_WINDOW: usize = 10;

/// One outstanding ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttEntry {
    /// Monotonic send time in nanoseconds.
    pub sent_time: u64,
    /// Ping sequence number.
    pub sequence: u16,
    /// Cleared once the matching pong has been consumed.
    pub valid: bool,
}

/// Sequence-indexed ring of in-flight pings feeding a sample window.
#[derive(Debug, Clone)]
pub struct RttCalculator {
    next_sequence: u16,
    entries: [RttEntry; RTT_RING_SIZE],
    samples: SampleSet,
    stats: SampleStats,
}

impl Default for RttCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl RttCalculator {
    pub fn new() -> Self {
        RttCalculator {
            next_sequence: 0,
            entries: [RttEntry {
                sent_time: 0,
                sequence: 0,
                valid: false,
            }; RTT_RING_SIZE],
            samples: SampleSet::new(RTT_SAMPLE_WINDOW),
            stats: SampleStats::default(),
        }
    }

    /// Register a ping sent at `now`, returning the assigned entry.
    ///
    /// The slot for the new sequence is overwritten unconditionally; a prior
    /// occupant that never saw its pong is forgotten.
    pub fn next(&mut self, now: u64) -> RttEntry {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let entry = RttEntry {
            sent_time: now,
            sequence,
            valid: true,
        };
        self.entries[sequence as usize % RTT_RING_SIZE] = entry;
        entry
    }

    /// Look up the outstanding entry for `sequence`.
    ///
    /// Returns `None` when the slot was already consumed or has been reused
    /// by a later sequence that wrapped onto it.
    pub fn entry(&self, sequence: u16) -> Option<RttEntry> {
        let slot = self.entries[sequence as usize % RTT_RING_SIZE];
        (slot.valid && slot.sequence == sequence).then_some(slot)
    }

    /// Consume the entry for `sequence` with the pong receive time.
    ///
    /// `delta_time` is subtracted from the raw round trip (peer hold time,
    /// when known). Returns false when the entry is absent or stale.
    pub fn submit(&mut self, sequence: u16, recv_time: u64, delta_time: i64) -> bool {
        let slot = &mut self.entries[sequence as usize % RTT_RING_SIZE];
        if !slot.valid || slot.sequence != sequence {
            return false;
        }
        slot.valid = false;

        let rtt = recv_time as i128 - slot.sent_time as i128 - delta_time as i128;
        self.samples.submit(rtt as i64);
        self.stats = self.samples.calc();
        true
    }

    /// Mean round-trip time in nanoseconds over the sample window.
    pub fn mean(&self) -> i64 {
        self.stats.mean
    }

    /// Round-trip variance in squared nanoseconds over the sample window.
    pub fn variance(&self) -> i64 {
        self.stats.variance
    }

    /// Mean and variance as one record.
    pub fn stats(&self) -> SampleStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_then_entry() {
        let mut rtt = RttCalculator::new();
        let entry = rtt.next(1_000);

        assert_eq!(entry.sequence, 0);
        assert_eq!(entry.sent_time, 1_000);
        assert_eq!(rtt.entry(0), Some(entry));
    }

    #[test]
    fn test_submit_consumes_entry() {
        let mut rtt = RttCalculator::new();
        let entry = rtt.next(1_000);

        assert!(rtt.submit(entry.sequence, 6_000, 0));
        assert_eq!(rtt.entry(entry.sequence), None);
        assert!(!rtt.submit(entry.sequence, 6_000, 0));
        assert_eq!(rtt.mean(), 5_000);
        assert_eq!(rtt.variance(), 0);
    }

    #[test]
    fn test_delta_time_subtracted() {
        let mut rtt = RttCalculator::new();
        let entry = rtt.next(0);
        assert!(rtt.submit(entry.sequence, 10_000, 4_000));
        assert_eq!(rtt.mean(), 6_000);
    }

    #[test]
    fn test_wrap_invalidates_stale_entry() {
        let mut rtt = RttCalculator::new();
        let first = rtt.next(0);

        // One full lap of the ring reuses slot 0 for sequence 20.
        for i in 1..=RTT_RING_SIZE {
            rtt.next(i as u64);
        }

        assert_eq!(rtt.entry(first.sequence), None);
        assert!(!rtt.submit(first.sequence, 99, 0));
        assert!(rtt.entry(RTT_RING_SIZE as u16).is_some());
    }

    #[test]
    fn test_sequence_wraps_at_u16() {
        let mut rtt = RttCalculator::new();
        // Drive the counter to the wrap boundary.
        for _ in 0..=u16::MAX {
            rtt.next(0);
        }
        let entry = rtt.next(7);
        assert_eq!(entry.sequence, 0);
    }

    #[test]
    fn test_mean_over_window() {
        let mut rtt = RttCalculator::new();
        for i in 0..4u64 {
            let entry = rtt.next(i * 100);
            assert!(rtt.submit(entry.sequence, i * 100 + 1_000 + i, 0));
        }
        // Window was primed by the first sample then shifted; mean tracks
        // the last RTT_SAMPLE_WINDOW samples.
        assert!(rtt.mean() >= 1_000);
        assert!(rtt.mean() < 1_010);
    }
}
