//! Adaptive peer clock synchronization
//!
//! Estimates the offset between the peer clock and the local monotonic
//! clock from ping/pong timestamps. A three-level state machine becomes
//! progressively less willing to move the offset as the round-trip time
//! stabilizes: HIGH adopts aggressively while the link is being measured,
//! MEDIUM requires larger deviations, and LOW only follows the windowed
//! mean of recent samples.

use crate::sampling::SampleSet;

const MILLISECOND: i64 = 1_000_000;

/// Squared-nanosecond variance gate per level.
const HIGH_RTT_VARIANCE_CAP: i64 = (10 * MILLISECOND) * (10 * MILLISECOND);
const MEDIUM_RTT_VARIANCE_CAP: i64 = (5 * MILLISECOND) * (5 * MILLISECOND);
const LOW_RTT_VARIANCE_CAP: i64 = (5 * MILLISECOND) * (5 * MILLISECOND);

/// Pings observed at HIGH before a downgrade is considered.
const HIGH_MIN_SYNC_COUNT: u32 = 20;
const HIGH_DOWNGRADE_RTT_VARIANCE: i64 = (5 * MILLISECOND) * (5 * MILLISECOND);
const HIGH_MIN_DELTA: i64 = 5 * MILLISECOND;

const MEDIUM_RECENT_VARIANCE_THRESHOLD: i64 = (5 * MILLISECOND) * (5 * MILLISECOND);
const MEDIUM_MIN_DELTA: i64 = 10 * MILLISECOND;

const LOW_MIN_MEAN_DELTA: i64 = 10 * MILLISECOND;

/// Offset samples kept for the windowed mean.
const RECENT_OFFSET_WINDOW: usize = 10;

/// Confidence tier of the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLevel {
    High,
    Medium,
    Low,
}

/// Peer clock offset estimator.
///
/// The offset is peer time minus local time; the peer-aligned view of the
/// local clock is `local_now + offset`.
#[derive(Debug, Clone)]
pub struct Clock {
    offset: i64,
    level: SyncLevel,
    high_sync_count: u32,
    recent_offsets: SampleSet,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Clock {
            offset: 0,
            level: SyncLevel::High,
            high_sync_count: 0,
            recent_offsets: SampleSet::new(RECENT_OFFSET_WINDOW),
        }
    }

    /// Current offset (peer − local) in nanoseconds.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Current confidence tier.
    pub fn level(&self) -> SyncLevel {
        self.level
    }

    /// Local time shifted into the peer clock domain.
    pub fn time(&self, local_now: u64) -> u64 {
        (local_now as i128 + self.offset as i128).max(0) as u64
    }

    /// Hard-seed the offset from an authoritative peer timestamp.
    pub fn set(&mut self, peer_time: u64, local_now: u64) {
        self.offset = (peer_time as i128 - local_now as i128) as i64;
    }

    /// Fold one request/response timestamp quadruple into the estimate.
    ///
    /// `req_send` and `res_recv` are local times, `req_recv` and `res_send`
    /// peer times. `rtt_variance` gates the sample: an unstable round trip
    /// rejects it outright and nothing is recorded. Returns true iff the
    /// offset moved.
    pub fn sync(
        &mut self,
        req_send: u64,
        req_recv: u64,
        res_send: u64,
        res_recv: u64,
        rtt_variance: i64,
    ) -> bool {
        let outbound = req_recv as i128 - req_send as i128;
        let inbound = res_send as i128 - res_recv as i128;
        let sample = ((outbound + inbound) / 2) as i64;

        match self.level {
            SyncLevel::High => {
                if rtt_variance > HIGH_RTT_VARIANCE_CAP {
                    return false;
                }
                self.recent_offsets.submit(sample);

                self.high_sync_count += 1;
                if self.high_sync_count >= HIGH_MIN_SYNC_COUNT
                    && rtt_variance < HIGH_DOWNGRADE_RTT_VARIANCE
                {
                    self.level = SyncLevel::Medium;
                }

                if (sample - self.offset).abs() > HIGH_MIN_DELTA {
                    self.offset = sample;
                    return true;
                }
                false
            }
            SyncLevel::Medium => {
                if rtt_variance > MEDIUM_RTT_VARIANCE_CAP {
                    return false;
                }
                self.recent_offsets.submit(sample);

                if self.recent_offsets.calc().variance < MEDIUM_RECENT_VARIANCE_THRESHOLD {
                    self.level = SyncLevel::Low;
                }

                if (sample - self.offset).abs() > MEDIUM_MIN_DELTA {
                    self.offset = sample;
                    return true;
                }
                false
            }
            SyncLevel::Low => {
                if rtt_variance > LOW_RTT_VARIANCE_CAP {
                    return false;
                }
                self.recent_offsets.submit(sample);

                let mean = self.recent_offsets.calc().mean;
                if (mean - sample).abs() > LOW_MIN_MEAN_DELTA {
                    self.offset = mean;
                    return true;
                }
                false
            }
        }
    }
}
