//! Time-Gated Calibration State Machine
//!
//! ## Overview
//!
//! Zero-point calibration tells the sensor "what you see right now is
//! 400 ppm". Done before the sensor has thermally stabilized, it bakes
//! warm-up drift into the zero point and silently skews every reading
//! until the next calibration. This machine makes that impossible: the
//! button is only honored after a configured warm-up interval,
//! regardless of how or when it is pressed.
//!
//! ## States
//!
//! ```text
//!            power_on          warm-up elapsed        debounced press
//!  Idle ───────────────▶ WarmingUp ───────────▶ Ready ───────────────▶ Calibrating
//!                                                                          │
//!                              settle elapsed                      ack │ fault
//!  Idle ◀──────────────────────────────────────── Cooldown ◀──────────┘   │
//!  (fan off)                                      (fan on)                ▼
//!                                                                      Faulted
//!                                                                   (terminal)
//! ```
//!
//! Button presses in any state but `Ready` are ignored. `Faulted` is
//! terminal until restart — a sensor that rejects its calibration
//! command is not retried automatically. The fan runs from the moment
//! the sequence starts until cooldown completes, forcing fresh outside
//! air through the enclosure while the zero point is taken.
//!
//! ## Input handling
//!
//! Two helpers adapt physical buttons to the machine:
//!
//! - [`Debouncer`] filters raw level samples: a level must hold for a
//!   minimum window before it counts, so bounces and accidental taps
//!   are dropped.
//! - [`PressLatch`] is an atomic edge counter for interrupt-driven
//!   wiring: the ISR records edges, the control loop consumes them
//!   atomically once per tick.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::clock::Timestamp;
use crate::sensor::SensorGateway;

/// Calibration sequence state. One instance per node, mutated only by
/// [`CalibrationMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationState {
    /// No sequence pending. Presses are ignored.
    Idle,
    /// Warm-up running since `since`; presses are ignored.
    WarmingUp {
        /// When the warm-up started (power-on time).
        since: Timestamp,
    },
    /// Warm-up elapsed; a debounced press starts calibration.
    Ready,
    /// Fan is on; the calibration command goes out this tick.
    Calibrating,
    /// Command acknowledged; letting the reading settle, fan still on.
    Cooldown {
        /// When the cooldown started.
        since: Timestamp,
    },
    /// The gateway faulted mid-sequence. Terminal until restart.
    Faulted,
}

#[cfg(feature = "defmt")]
impl defmt::Format for CalibrationState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Idle => defmt::write!(fmt, "idle"),
            Self::WarmingUp { since } => defmt::write!(fmt, "warming-up since {}", since),
            Self::Ready => defmt::write!(fmt, "ready"),
            Self::Calibrating => defmt::write!(fmt, "calibrating"),
            Self::Cooldown { since } => defmt::write!(fmt, "cooldown since {}", since),
            Self::Faulted => defmt::write!(fmt, "faulted"),
        }
    }
}

/// Drives the calibration sequence against a [`SensorGateway`].
pub struct CalibrationMachine {
    state: CalibrationState,
    warmup_ms: u64,
    cooldown_ms: u64,
    powered_on: bool,
}

impl CalibrationMachine {
    /// Machine in `Idle`; call [`power_on`](Self::power_on) once the
    /// loop starts.
    pub const fn new(warmup_ms: u64, cooldown_ms: u64) -> Self {
        Self {
            state: CalibrationState::Idle,
            warmup_ms,
            cooldown_ms,
            powered_on: false,
        }
    }

    /// Record power-on and start the warm-up. Later calls are no-ops,
    /// so the warm-up start is recorded exactly once.
    pub fn power_on(&mut self, now: Timestamp) {
        if !self.powered_on {
            self.powered_on = true;
            self.state = CalibrationState::WarmingUp { since: now };
            log::info!("calibration warm-up started");
        }
    }

    /// Current state.
    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// Whether a calibration sequence is in flight (fan running).
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            CalibrationState::Calibrating | CalibrationState::Cooldown { .. }
        )
    }

    /// Advance the machine one tick.
    ///
    /// `pressed` is a debounced press event for this tick. The gate is
    /// inclusive: a press on the exact tick the warm-up elapses is
    /// accepted; one tick earlier it is ignored.
    pub fn tick<G: SensorGateway>(
        &mut self,
        now: Timestamp,
        pressed: bool,
        gateway: &mut G,
    ) -> CalibrationState {
        match self.state {
            CalibrationState::Idle | CalibrationState::Faulted => {}
            CalibrationState::WarmingUp { since } => {
                if now.saturating_sub(since) >= self.warmup_ms {
                    log::info!("calibration warm-up elapsed, button armed");
                    self.state = CalibrationState::Ready;
                    if pressed {
                        self.start(gateway);
                    }
                }
                // Presses during warm-up are dropped, not queued.
            }
            CalibrationState::Ready => {
                if pressed {
                    self.start(gateway);
                }
            }
            CalibrationState::Calibrating => match gateway.begin_calibration() {
                Ok(()) => {
                    log::info!("zero-point calibration accepted, settling");
                    self.state = CalibrationState::Cooldown { since: now };
                }
                Err(fault) => {
                    log::warn!("calibration command failed: {}", fault);
                    let _ = gateway.set_fan(false);
                    self.state = CalibrationState::Faulted;
                }
            },
            CalibrationState::Cooldown { since } => {
                if now.saturating_sub(since) >= self.cooldown_ms {
                    if let Err(fault) = gateway.set_fan(false) {
                        log::warn!("fan off failed after cooldown: {}", fault);
                    }
                    log::info!("calibration sequence complete");
                    self.state = CalibrationState::Idle;
                }
            }
        }
        self.state
    }

    fn start<G: SensorGateway>(&mut self, gateway: &mut G) {
        match gateway.set_fan(true) {
            Ok(()) => {
                log::info!("calibration requested, fan on");
                self.state = CalibrationState::Calibrating;
            }
            Err(fault) => {
                log::warn!("fan on failed, aborting calibration: {}", fault);
                self.state = CalibrationState::Faulted;
            }
        }
    }
}

/// Level-sampling debouncer with a minimum-hold window.
///
/// Feed it the raw pin level once per tick; it reports a press event
/// only after the level has held for the configured window. Bounces
/// restart the window, and a press released before the window elapses
/// never counts.
pub struct Debouncer {
    hold_ms: u64,
    stable: bool,
    candidate: bool,
    candidate_since: Timestamp,
}

impl Debouncer {
    /// Debouncer requiring `hold_ms` of stable level, initially
    /// released.
    pub const fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms,
            stable: false,
            candidate: false,
            candidate_since: 0,
        }
    }

    /// Feed one raw level sample (`true` = pressed). Returns `true`
    /// exactly once per debounced press edge.
    pub fn update(&mut self, now: Timestamp, pressed: bool) -> bool {
        if pressed != self.candidate {
            self.candidate = pressed;
            self.candidate_since = now;
        }
        if self.candidate != self.stable
            && now.saturating_sub(self.candidate_since) >= self.hold_ms
        {
            self.stable = self.candidate;
            return self.stable;
        }
        false
    }

    /// Current debounced level.
    pub fn is_pressed(&self) -> bool {
        self.stable
    }
}

/// Atomic press counter bridging an ISR to the control loop.
///
/// The ISR calls [`record`](Self::record) on each (hardware-debounced)
/// falling edge; the loop calls [`take`](Self::take) once per tick and
/// observes every press exactly once. Single consumer.
#[derive(Debug, Default)]
pub struct PressLatch(AtomicU32);

impl PressLatch {
    /// Empty latch.
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Record one press edge. Safe to call from interrupt context.
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Consume all recorded presses since the last call.
    pub fn take(&self) -> u32 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::ScriptedSensor;
    use crate::errors::SensorFault;

    const WARMUP: u64 = 1_800_000;
    const COOLDOWN: u64 = 60_000;

    fn machine() -> CalibrationMachine {
        let mut m = CalibrationMachine::new(WARMUP, COOLDOWN);
        m.power_on(0);
        m
    }

    #[test]
    fn press_during_warmup_ignored() {
        let mut m = machine();
        let mut sensor = ScriptedSensor::new();

        assert_eq!(m.tick(0, true, &mut sensor), CalibrationState::WarmingUp { since: 0 });
        assert_eq!(
            m.tick(WARMUP / 2, true, &mut sensor),
            CalibrationState::WarmingUp { since: 0 }
        );
        assert!(!sensor.fan_on());
    }

    #[test]
    fn warmup_boundary_is_inclusive() {
        // One tick before the gate: still warming up, press dropped.
        let mut m = machine();
        let mut sensor = ScriptedSensor::new();
        assert_eq!(
            m.tick(WARMUP - 1, true, &mut sensor),
            CalibrationState::WarmingUp { since: 0 }
        );
        assert!(!sensor.fan_on());

        // Exactly at the gate: accepted, fan turns on.
        let mut m = machine();
        let mut sensor = ScriptedSensor::new();
        assert_eq!(m.tick(WARMUP, true, &mut sensor), CalibrationState::Calibrating);
        assert!(sensor.fan_on());
    }

    #[test]
    fn full_sequence_reaches_idle() {
        let mut m = machine();
        let mut sensor = ScriptedSensor::new();

        assert_eq!(m.tick(WARMUP, false, &mut sensor), CalibrationState::Ready);
        assert_eq!(m.tick(WARMUP + 10, true, &mut sensor), CalibrationState::Calibrating);
        assert!(m.is_active());

        // Next tick issues the command and moves to cooldown.
        let t0 = WARMUP + 20;
        assert_eq!(
            m.tick(t0, false, &mut sensor),
            CalibrationState::Cooldown { since: t0 }
        );
        assert_eq!(sensor.calibrations(), 1);
        assert!(sensor.fan_on());

        // Fan stays on through the cooldown, then off at the end.
        assert_eq!(
            m.tick(t0 + COOLDOWN - 1, false, &mut sensor),
            CalibrationState::Cooldown { since: t0 }
        );
        assert!(sensor.fan_on());
        assert_eq!(m.tick(t0 + COOLDOWN, false, &mut sensor), CalibrationState::Idle);
        assert!(!sensor.fan_on());
        assert!(!m.is_active());
    }

    #[test]
    fn gateway_fault_is_terminal() {
        let mut m = machine();
        let mut sensor = ScriptedSensor::new();
        sensor.fail_calibration(SensorFault::Timeout);

        m.tick(WARMUP, true, &mut sensor);
        assert_eq!(m.tick(WARMUP + 10, false, &mut sensor), CalibrationState::Faulted);
        // Fan was shut off on the way down.
        assert!(!sensor.fan_on());

        // Further presses do nothing.
        assert_eq!(m.tick(WARMUP + 20, true, &mut sensor), CalibrationState::Faulted);
        assert_eq!(sensor.calibrations(), 0);
    }

    #[test]
    fn presses_after_cooldown_ignored() {
        let mut m = machine();
        let mut sensor = ScriptedSensor::new();

        m.tick(WARMUP, true, &mut sensor);
        m.tick(WARMUP + 10, false, &mut sensor);
        m.tick(WARMUP + 10 + COOLDOWN, false, &mut sensor);
        assert_eq!(m.state(), CalibrationState::Idle);

        // One calibration per boot: Idle no longer arms.
        assert_eq!(
            m.tick(WARMUP + 10 + COOLDOWN + 100, true, &mut sensor),
            CalibrationState::Idle
        );
        assert_eq!(sensor.calibrations(), 1);
    }

    #[test]
    fn debouncer_drops_bounces() {
        let mut d = Debouncer::new(50);

        // Contact bounce: rapid flips never settle.
        assert!(!d.update(0, true));
        assert!(!d.update(10, false));
        assert!(!d.update(20, true));
        assert!(!d.update(30, false));
        assert!(!d.is_pressed());

        // Held press fires once, exactly at the hold boundary.
        assert!(!d.update(100, true));
        assert!(!d.update(149, true));
        assert!(d.update(150, true));
        assert!(d.is_pressed());
        // Still held: no repeat event.
        assert!(!d.update(200, true));

        // Release, then a second full press fires again.
        assert!(!d.update(300, false));
        assert!(!d.update(350, false));
        assert!(!d.is_pressed());
        assert!(!d.update(400, true));
        assert!(d.update(450, true));
    }

    #[test]
    fn press_latch_counts_once() {
        let latch = PressLatch::new();
        latch.record();
        latch.record();
        assert_eq!(latch.take(), 2);
        assert_eq!(latch.take(), 0);
    }
}
