//! Cooperative Control Loop
//!
//! ## Overview
//!
//! One `Node` owns every piece of mutable state in the system — the
//! reading buffer, the device clock, the calibration machine, the
//! delivery pipeline — and advances all of them from a single `tick`.
//! There are no locks because there is exactly one logical thread of
//! control; external capabilities (sensor, collector, time authority)
//! are threaded through `tick` as parameters, so tests drive the whole
//! node with scripted doubles and a [`FixedTime`] clock.
//!
//! ## Tick anatomy
//!
//! Called once per short interval from the firmware main loop:
//!
//! 1. **Clock**: when the sync period (or the retry interval, while
//!    never-synced) has elapsed, ask the time authority and overwrite
//!    the offset on success.
//! 2. **Button + calibration**: debounce the raw level, drain the ISR
//!    press latch, advance the calibration machine.
//! 3. **Sampling**: on the record period, poll the sensor. A reading
//!    is stamped from the device clock (sentinel while unsynced) and
//!    pushed; not-ready and faults are counted and sampling carries on
//!    next period.
//! 4. **Delivery**: let the pipeline make at most one bounded upload
//!    attempt.
//!
//! Every step is a non-blocking poll or a call bounded by its own
//! timeout, so a tick always returns promptly and no component can be
//! re-entered before it returns.
//!
//! [`FixedTime`]: crate::clock::FixedTime

use crate::buffer::{Reading, ReadingBuffer};
use crate::calibration::{CalibrationMachine, CalibrationState, Debouncer, PressLatch};
use crate::clock::{DeviceClock, TimeAuthority, Timestamp};
use crate::config;
use crate::delivery::{Collector, DeliveryOutcome, DeliveryPipeline, DeliveryStats};
use crate::sensor::SensorGateway;

/// Loop timing knobs, defaulting to the build-time configuration.
///
/// Tests shrink these to drive hour-scale behavior in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    /// Interval between sensor samples (ms).
    pub sample_period_ms: u64,
    /// Minimum powered-on time before calibration (ms).
    pub calibration_wait_ms: u64,
    /// Settle interval after calibration (ms).
    pub calibration_cooldown_ms: u64,
    /// Button debounce hold (ms).
    pub debounce_ms: u64,
    /// First retry delay after a failed upload (ms).
    pub backoff_base_ms: u64,
    /// Retry delay ceiling (ms).
    pub backoff_max_ms: u64,
    /// Re-sync interval once the clock is synced (ms).
    pub clock_sync_period_ms: u64,
    /// Retry interval while the clock has never synced (ms).
    pub clock_sync_retry_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sample_period_ms: config::RECORD_PERIOD_MS,
            calibration_wait_ms: config::CALIBRATION_WAIT_MS,
            calibration_cooldown_ms: config::CALIBRATION_COOLDOWN_MS,
            debounce_ms: config::BUTTON_DEBOUNCE_MS,
            backoff_base_ms: config::BACKOFF_BASE_MS,
            backoff_max_ms: config::BACKOFF_MAX_MS,
            clock_sync_period_ms: config::CLOCK_SYNC_PERIOD_MS,
            clock_sync_retry_ms: config::CLOCK_SYNC_RETRY_MS,
        }
    }
}

/// Per-boot health counters.
#[derive(Debug, Clone, Default)]
pub struct NodeStats {
    /// Measurements pushed into the buffer.
    pub samples: u32,
    /// Polls answered "still warming up".
    pub sensor_not_ready: u32,
    /// Sensor peripheral faults.
    pub sensor_faults: u32,
    /// Failed clock sync attempts.
    pub sync_failures: u32,
}

/// The node: owner of all shared state, advanced by `tick`.
///
/// `N` is the buffer capacity, `BATCH` the upload batch bound; use
/// [`DefaultNode`] for the deployed configuration.
pub struct Node<const N: usize, const BATCH: usize> {
    config: NodeConfig,
    clock: DeviceClock,
    buffer: ReadingBuffer<N>,
    calibration: CalibrationMachine,
    delivery: DeliveryPipeline<BATCH>,
    debouncer: Debouncer,
    presses: PressLatch,
    next_sample_at: Timestamp,
    next_sync_at: Timestamp,
    started: bool,
    stats: NodeStats,
}

/// Node with the deployed buffer capacity and batch size.
pub type DefaultNode = Node<{ config::BUFFER_CAPACITY }, { config::DELIVERY_BATCH }>;

impl<const N: usize, const BATCH: usize> Node<N, BATCH> {
    /// Node with the given timing configuration.
    pub fn new(config: NodeConfig) -> Self {
        Self {
            clock: DeviceClock::new(),
            buffer: ReadingBuffer::new(),
            calibration: CalibrationMachine::new(
                config.calibration_wait_ms,
                config.calibration_cooldown_ms,
            ),
            delivery: DeliveryPipeline::new(config.backoff_base_ms, config.backoff_max_ms),
            debouncer: Debouncer::new(config.debounce_ms),
            presses: PressLatch::new(),
            next_sample_at: 0,
            next_sync_at: 0,
            started: false,
            stats: NodeStats::default(),
            config,
        }
    }

    /// Advance the whole node one tick.
    ///
    /// `now` comes from the platform's monotonic [`TimeSource`];
    /// `button_level` is the raw (active) button level this tick.
    /// Returns what the delivery pipeline did, the one outcome the
    /// firmware loop typically reacts to (LED, alert).
    ///
    /// [`TimeSource`]: crate::clock::TimeSource
    pub fn tick<S, C, A>(
        &mut self,
        now: Timestamp,
        button_level: bool,
        sensor: &mut S,
        collector: &mut C,
        time_authority: &mut A,
    ) -> DeliveryOutcome
    where
        S: SensorGateway,
        C: Collector,
        A: TimeAuthority,
    {
        if !self.started {
            self.started = true;
            self.calibration.power_on(now);
            self.next_sample_at = now;
            self.next_sync_at = now;
            log::info!("node started");
        }

        if now >= self.next_sync_at {
            match time_authority.fetch_now() {
                Ok(remote) => {
                    self.clock.apply_sync(now, remote);
                    self.next_sync_at = now + self.config.clock_sync_period_ms;
                    log::info!("clock synced to {}", remote);
                }
                Err(err) => {
                    self.stats.sync_failures = self.stats.sync_failures.saturating_add(1);
                    self.next_sync_at = now + self.config.clock_sync_retry_ms;
                    log::debug!("clock sync failed: {}", err);
                }
            }
        }

        let pressed = self.debouncer.update(now, button_level) | (self.presses.take() > 0);
        self.calibration.tick(now, pressed, sensor);

        if now >= self.next_sample_at {
            self.next_sample_at = now + self.config.sample_period_ms;
            match sensor.sample() {
                Ok(m) => {
                    self.stats.samples = self.stats.samples.saturating_add(1);
                    self.buffer.push(Reading {
                        timestamp: self.clock.wall_clock(now),
                        co2_ppm: m.co2_ppm,
                        temperature_c: m.temperature_c,
                        calibrated: m.calibrated,
                    });
                }
                Err(nb::Error::WouldBlock) => {
                    self.stats.sensor_not_ready =
                        self.stats.sensor_not_ready.saturating_add(1);
                }
                Err(nb::Error::Other(fault)) => {
                    self.stats.sensor_faults = self.stats.sensor_faults.saturating_add(1);
                    log::warn!("sample failed: {}", fault);
                }
            }
        }

        self.delivery.tick(now, &mut self.buffer, collector)
    }

    /// Whether an external OTA check may run right now without
    /// corrupting in-flight state.
    ///
    /// Between ticks no upload is mid-flight (requests complete within
    /// the tick that issued them), so the only thing to protect is an
    /// active calibration sequence.
    pub fn ota_safe_point(&self) -> bool {
        !self.calibration.is_active()
    }

    /// Firmware version the collector advertised, if it differs from
    /// ours and an update could start right now.
    pub fn pending_firmware(&self) -> Option<u32> {
        if !self.ota_safe_point() {
            return None;
        }
        self.delivery
            .hints()
            .firmware_version
            .filter(|v| *v != config::FIRMWARE_VERSION)
    }

    /// Press latch for interrupt-driven button wiring.
    pub fn press_latch(&self) -> &PressLatch {
        &self.presses
    }

    /// Current calibration state.
    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    /// Whether the clock has synced at least once.
    pub fn clock_synced(&self) -> bool {
        self.clock.is_synced()
    }

    /// Readings awaiting delivery.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Readings evicted since boot.
    pub fn dropped_count(&self) -> u32 {
        self.buffer.dropped_count()
    }

    /// Latched collector rejection, if delivery is halted.
    pub fn rejection(&self) -> Option<u16> {
        self.delivery.rejection()
    }

    /// Clear a latched rejection after the credential problem is fixed.
    pub fn clear_rejection(&mut self) {
        self.delivery.clear_rejection();
    }

    /// Node health counters.
    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }

    /// Delivery health counters.
    pub fn delivery_stats(&self) -> &DeliveryStats {
        self.delivery.stats()
    }
}
