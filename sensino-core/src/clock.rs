//! Time Management Without a Reliable RTC
//!
//! The node has no battery-backed clock: at boot it only knows "zero
//! milliseconds ago". Wall-clock time is recovered by asking the
//! collector's HTTP time endpoint and remembering the delta between
//! remote epoch time and the local uptime counter.
//!
//! Two kinds of time flow through the crate:
//!
//! - [`Timestamp`]: monotonic milliseconds since boot, produced by a
//!   [`TimeSource`]. All scheduling (sample periods, backoff,
//!   calibration warm-up) runs on this axis and never jumps.
//! - [`EpochSeconds`]: wall-clock seconds attached to readings for the
//!   collector. Derived from the monotonic axis plus a [`DeviceClock`]
//!   offset; readings taken before the first sync carry the
//!   [`UNSYNCED_TIMESTAMP`] sentinel rather than a fabricated time.
//!
//! A re-sync overwrites the offset (last-write-wins, no averaging), so
//! wall-clock time may step in either direction. Delivery order is
//! buffer order, not timestamp order, so a step never reorders data.

use crate::errors::UplinkError;

/// Monotonic milliseconds since boot.
pub type Timestamp = u64;

/// Wall-clock seconds since the Unix epoch.
pub type EpochSeconds = u32;

/// Sentinel for readings sampled before the first successful sync.
///
/// `u32::MAX` rather than zero so downstream consumers can tell
/// "unknown time" apart from "time zero".
pub const UNSYNCED_TIMESTAMP: EpochSeconds = EpochSeconds::MAX;

/// Source of monotonic time for the control loop.
///
/// Implementations wrap a hardware timer; [`FixedTime`] is the test
/// implementation.
pub trait TimeSource {
    /// Milliseconds since boot. Must never go backwards.
    fn now(&self) -> Timestamp;
}

/// Fixed time source for testing.
#[derive(Debug, Clone)]
pub struct FixedTime {
    timestamp: Timestamp,
}

impl FixedTime {
    /// Create a source stuck at `timestamp`.
    pub fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// Jump to an absolute value.
    pub fn set(&mut self, timestamp: Timestamp) {
        self.timestamp = timestamp;
    }

    /// Move forward by `ms`.
    pub fn advance(&mut self, ms: u64) {
        self.timestamp += ms;
    }
}

impl TimeSource for FixedTime {
    fn now(&self) -> Timestamp {
        self.timestamp
    }
}

/// Process-uptime source for host builds.
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct HostTime {
    started: std::time::Instant,
}

#[cfg(feature = "std")]
impl HostTime {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            started: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for HostTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl TimeSource for HostTime {
    fn now(&self) -> Timestamp {
        self.started.elapsed().as_millis() as Timestamp
    }
}

/// Remote source of wall-clock time.
///
/// The HTTP implementation lives in `sensino-connectors`; failures are
/// transient and the node keeps stamping readings with the sentinel
/// until a fetch succeeds.
pub trait TimeAuthority {
    /// Current wall-clock time as seen by the remote end.
    fn fetch_now(&mut self) -> Result<EpochSeconds, UplinkError>;
}

/// Wall-clock state derived from sync results.
///
/// Stores the signed delta between remote epoch seconds and the local
/// uptime counter. Absent until the first successful sync; every later
/// sync overwrites it.
#[derive(Debug, Clone, Default)]
pub struct DeviceClock {
    /// remote epoch seconds minus local uptime seconds.
    offset: Option<i64>,
    syncs: u32,
}

impl DeviceClock {
    /// Unsynced clock.
    pub const fn new() -> Self {
        Self {
            offset: None,
            syncs: 0,
        }
    }

    /// Whether at least one sync has succeeded.
    pub fn is_synced(&self) -> bool {
        self.offset.is_some()
    }

    /// Number of successful syncs so far.
    pub fn sync_count(&self) -> u32 {
        self.syncs
    }

    /// Record a successful sync observed at local time `now`.
    ///
    /// Last-write-wins: no averaging, no smoothing. A later sync that
    /// disagrees with an earlier one simply replaces it.
    pub fn apply_sync(&mut self, now: Timestamp, remote: EpochSeconds) {
        let local_secs = (now / 1000) as i64;
        self.offset = Some(remote as i64 - local_secs);
        self.syncs = self.syncs.saturating_add(1);
    }

    /// Wall-clock time for local time `now`, or the sentinel while
    /// unsynced.
    pub fn wall_clock(&self, now: Timestamp) -> EpochSeconds {
        match self.offset {
            None => UNSYNCED_TIMESTAMP,
            Some(offset) => {
                let secs = (now / 1000) as i64 + offset;
                // Clamp below the sentinel so a synced clock can never
                // be mistaken for an unsynced one.
                secs.clamp(0, (UNSYNCED_TIMESTAMP - 1) as i64) as EpochSeconds
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_time_advances() {
        let mut time = FixedTime::new(1000);
        assert_eq!(time.now(), 1000);

        time.advance(500);
        assert_eq!(time.now(), 1500);
    }

    #[test]
    fn unsynced_uses_sentinel() {
        let clock = DeviceClock::new();
        assert!(!clock.is_synced());
        assert_eq!(clock.wall_clock(0), UNSYNCED_TIMESTAMP);
        assert_eq!(clock.wall_clock(123_456), UNSYNCED_TIMESTAMP);
    }

    #[test]
    fn sync_offsets_uptime() {
        let mut clock = DeviceClock::new();
        // Synced at 90s uptime, remote says 1_600_000_000.
        clock.apply_sync(90_000, 1_600_000_000);
        assert!(clock.is_synced());
        assert_eq!(clock.wall_clock(90_000), 1_600_000_000);
        // One minute later.
        assert_eq!(clock.wall_clock(150_000), 1_600_000_060);
    }

    #[test]
    fn resync_overwrites() {
        let mut clock = DeviceClock::new();
        clock.apply_sync(10_000, 1_600_000_000);
        // Second sync says we were 100s fast; it wins outright.
        clock.apply_sync(20_000, 1_599_999_910);
        assert_eq!(clock.sync_count(), 2);
        assert_eq!(clock.wall_clock(20_000), 1_599_999_910);
    }

    #[test]
    fn wall_clock_never_hits_sentinel() {
        let mut clock = DeviceClock::new();
        clock.apply_sync(0, UNSYNCED_TIMESTAMP);
        assert_eq!(clock.wall_clock(0), UNSYNCED_TIMESTAMP - 1);
    }
}
