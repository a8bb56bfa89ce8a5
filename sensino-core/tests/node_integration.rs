//! End-to-end node scenarios
//!
//! Drives a full `Node` — scripted sensor, scripted collector, scripted
//! time authority — through realistic tick sequences: connectivity
//! outages with eviction, recovery draining the backlog in order,
//! button-triggered calibration, and collector rejection alerts.

use sensino_core::clock::EpochSeconds;
use sensino_core::delivery::{Ack, Collector};
use sensino_core::errors::UplinkError;
use sensino_core::sensor::ScriptedSensor;
use sensino_core::{
    CalibrationState, DeliveryOutcome, Node, NodeConfig, Reading, TimeAuthority,
    UNSYNCED_TIMESTAMP,
};

fn test_config() -> NodeConfig {
    NodeConfig {
        sample_period_ms: 1000,
        calibration_wait_ms: 10_000,
        calibration_cooldown_ms: 2000,
        debounce_ms: 50,
        backoff_base_ms: 500,
        backoff_max_ms: 4000,
        clock_sync_period_ms: 60_000,
        clock_sync_retry_ms: 1000,
    }
}

/// Collector whose availability tests flip at will; records every
/// batch it acknowledged.
struct FlakyCollector {
    online: bool,
    reject_with: Option<u16>,
    acked: Vec<Vec<Reading>>,
    attempts: u32,
}

impl FlakyCollector {
    fn offline() -> Self {
        Self {
            online: false,
            reject_with: None,
            acked: Vec::new(),
            attempts: 0,
        }
    }

    fn online() -> Self {
        Self {
            online: true,
            ..Self::offline()
        }
    }
}

impl Collector for FlakyCollector {
    fn send_batch(&mut self, readings: &[Reading]) -> Result<Ack, UplinkError> {
        self.attempts += 1;
        if let Some(status) = self.reject_with {
            return Err(UplinkError::Rejected { status });
        }
        if !self.online {
            return Err(UplinkError::Transport);
        }
        self.acked.push(readings.to_vec());
        Ok(Ack::default())
    }
}

struct FixedAuthority(EpochSeconds);
impl TimeAuthority for FixedAuthority {
    fn fetch_now(&mut self) -> Result<EpochSeconds, UplinkError> {
        Ok(self.0)
    }
}

struct NoAuthority;
impl TimeAuthority for NoAuthority {
    fn fetch_now(&mut self) -> Result<EpochSeconds, UplinkError> {
        Err(UplinkError::Timeout)
    }
}

#[test]
fn outage_evicts_oldest_then_recovery_drains_in_order() {
    let mut node: Node<4, 4> = Node::new(test_config());
    let mut sensor = ScriptedSensor::new();
    let mut collector = FlakyCollector::offline();
    let mut authority = FixedAuthority(1_700_000_000);

    // Twelve sample periods while the collector is down. Distinct CO2
    // values tell the readings apart later.
    for n in 0..12u16 {
        sensor.feed_reading(400 + n, 21, true);
    }
    let mut now = 0;
    for _ in 0..120 {
        node.tick(now, false, &mut sensor, &mut collector, &mut authority);
        now += 100;
    }

    // Capacity 4: eight oldest readings were evicted, and counted.
    assert_eq!(node.stats().samples, 12);
    assert_eq!(node.buffered(), 4);
    assert_eq!(node.dropped_count(), 8);
    assert!(collector.attempts > 0);

    // Collector comes back; ride past the backoff ceiling and drain.
    collector.online = true;
    for _ in 0..100 {
        node.tick(now, false, &mut sensor, &mut collector, &mut authority);
        now += 100;
    }
    assert_eq!(node.buffered(), 0);

    // Exactly the four newest readings arrived, oldest-first.
    let delivered: Vec<u16> = collector
        .acked
        .iter()
        .flatten()
        .map(|r| r.co2_ppm)
        .collect();
    assert_eq!(delivered, vec![408, 409, 410, 411]);
    assert_eq!(node.delivery_stats().readings_sent, 4);
}

#[test]
fn no_partial_commit_across_repeated_failures() {
    let mut node: Node<8, 8> = Node::new(test_config());
    let mut sensor = ScriptedSensor::new();
    let mut collector = FlakyCollector::offline();
    let mut authority = NoAuthority;

    for n in 0..5u16 {
        sensor.feed_reading(500 + n, 22, false);
    }
    // Five sample periods of failed attempts.
    let mut now = 0;
    while now < 5000 {
        node.tick(now, false, &mut sensor, &mut collector, &mut authority);
        now += 100;
    }
    assert_eq!(node.buffered(), 5);
    assert_eq!(node.delivery_stats().readings_sent, 0);
    // Backoff spaced the attempts out; each one saw the whole prefix.
    assert!(node.delivery_stats().transport_failures >= 4);

    // One success delivers the entire queue in a single commit.
    collector.online = true;
    let mut delivered = 0;
    while now < 20_000 {
        if let DeliveryOutcome::Delivered(n) =
            node.tick(now, false, &mut sensor, &mut collector, &mut authority)
        {
            delivered += n;
        }
        now += 100;
    }
    assert_eq!(delivered, 5);
    assert_eq!(collector.acked.len(), 1);
    assert_eq!(collector.acked[0].len(), 5);
}

#[test]
fn timestamps_switch_from_sentinel_to_wall_clock_after_sync() {
    let mut node: Node<8, 8> = Node::new(test_config());
    let mut sensor = ScriptedSensor::new();
    let mut collector = FlakyCollector::online();

    sensor.feed_reading(450, 21, true);
    sensor.feed_reading(451, 21, true);

    // First sample lands before any successful sync.
    let mut authority = NoAuthority;
    node.tick(0, false, &mut sensor, &mut collector, &mut authority);

    // Sync succeeds on the next sync retry; the second sample gets a
    // real timestamp.
    let mut authority = FixedAuthority(1_700_000_000);
    node.tick(1000, false, &mut sensor, &mut collector, &mut authority);

    let delivered: Vec<Reading> = collector.acked.iter().flatten().copied().collect();
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[0].timestamp, UNSYNCED_TIMESTAMP);
    // Synced at 1s uptime: wall clock is the authority's time.
    assert_eq!(delivered[1].timestamp, 1_700_000_000);
}

#[test]
fn button_calibration_round_trip() {
    let cfg = test_config();
    let mut node: Node<8, 8> = Node::new(cfg);
    let mut sensor = ScriptedSensor::new();
    let mut collector = FlakyCollector::online();
    let mut authority = FixedAuthority(1_700_000_000);

    node.tick(0, false, &mut sensor, &mut collector, &mut authority);

    // A press long before warm-up does nothing, ever.
    node.tick(1000, true, &mut sensor, &mut collector, &mut authority);
    node.tick(1000 + cfg.debounce_ms, true, &mut sensor, &mut collector, &mut authority);
    node.tick(1200, false, &mut sensor, &mut collector, &mut authority);
    node.tick(1300, false, &mut sensor, &mut collector, &mut authority);
    assert_eq!(sensor.calibrations(), 0);
    assert!(!sensor.fan_on());

    // Hold the button across the debounce window after warm-up.
    let t = cfg.calibration_wait_ms + 1000;
    node.tick(t, true, &mut sensor, &mut collector, &mut authority);
    node.tick(t + cfg.debounce_ms, true, &mut sensor, &mut collector, &mut authority);
    assert_eq!(node.calibration_state(), CalibrationState::Calibrating);
    assert!(sensor.fan_on());
    assert!(!node.ota_safe_point());

    // Command goes out, cooldown runs, fan stops, back to idle.
    let t2 = t + cfg.debounce_ms + 100;
    node.tick(t2, false, &mut sensor, &mut collector, &mut authority);
    assert_eq!(sensor.calibrations(), 1);
    node.tick(
        t2 + cfg.calibration_cooldown_ms,
        false,
        &mut sensor,
        &mut collector,
        &mut authority,
    );
    assert_eq!(node.calibration_state(), CalibrationState::Idle);
    assert!(!sensor.fan_on());
    assert!(node.ota_safe_point());
}

#[test]
fn rejection_halts_delivery_until_cleared() {
    let mut node: Node<8, 8> = Node::new(test_config());
    let mut sensor = ScriptedSensor::new();
    let mut collector = FlakyCollector::online();
    collector.reject_with = Some(401);
    let mut authority = NoAuthority;

    sensor.feed_reading(450, 21, true);
    node.tick(0, false, &mut sensor, &mut collector, &mut authority);
    assert_eq!(node.rejection(), Some(401));
    let attempts_at_latch = collector.attempts;

    // Readings keep accumulating but no requests go out.
    sensor.feed_reading(451, 21, true);
    node.tick(1000, false, &mut sensor, &mut collector, &mut authority);
    node.tick(60_000, false, &mut sensor, &mut collector, &mut authority);
    assert_eq!(collector.attempts, attempts_at_latch);
    assert_eq!(node.buffered(), 2);

    // Operator fixes the credential and clears the latch.
    collector.reject_with = None;
    node.clear_rejection();
    node.tick(61_000, false, &mut sensor, &mut collector, &mut authority);
    assert_eq!(node.buffered(), 0);
    assert_eq!(node.rejection(), None);
}
