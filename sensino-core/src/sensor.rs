//! Sensor Gateway Capability
//!
//! The physical CO2 sensor (an MH-Z19 behind a software UART) is an
//! external collaborator. This module defines the capability the rest
//! of the node programs against, so the control loop, the calibration
//! machine and every test can run against a simulated sensor.
//!
//! The gateway surfaces three things:
//!
//! - `sample()` as a non-blocking poll in the `nb` idiom:
//!   `WouldBlock` while the sensor's own warm-up is running (distinct
//!   from the node-level calibration warm-up), a [`Measurement`] when
//!   one is available, a [`SensorFault`] when the peripheral times out
//!   or answers garbage. A fault never corrupts buffer state — the
//!   caller simply records it and polls again next period.
//! - `begin_calibration()`, the zero-point command. Only the
//!   calibration state machine may call it, and only after the warm-up
//!   gate it enforces; the gateway does not re-check the gate.
//! - `set_fan()`, driving the fan that forces fresh air through the
//!   enclosure during measurement and calibration.

use crate::errors::SensorFault;

/// One raw sensor response; the node attaches the wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// CO2 concentration in parts per million.
    pub co2_ppm: u16,
    /// Sensor die temperature in whole degrees Celsius.
    pub temperature_c: i16,
    /// Whether the sensor has been zero-point calibrated.
    pub calibrated: bool,
}

/// Capability interface over the physical sensor and its actuators.
pub trait SensorGateway {
    /// Poll for a measurement.
    ///
    /// - `Ok(m)`: a fresh measurement
    /// - `Err(nb::Error::WouldBlock)`: sensor warm-up not elapsed,
    ///   retry next period
    /// - `Err(nb::Error::Other(fault))`: peripheral fault
    fn sample(&mut self) -> nb::Result<Measurement, SensorFault>;

    /// Trigger zero-point calibration.
    ///
    /// Caller contract: the configured calibration warm-up must have
    /// elapsed. The calibration state machine is the only permitted
    /// caller.
    fn begin_calibration(&mut self) -> Result<(), SensorFault>;

    /// Switch the enclosure fan.
    fn set_fan(&mut self, on: bool) -> Result<(), SensorFault>;
}

/// Scripted sensor for tests and host builds.
///
/// Plays back a queue of responses and records every command it
/// receives, so tests can assert on fan and calibration activity.
pub struct ScriptedSensor {
    script: heapless::Deque<nb::Result<Measurement, SensorFault>, 32>,
    calibration_result: Result<(), SensorFault>,
    fan_result: Result<(), SensorFault>,
    fan_on: bool,
    calibrations: u32,
}

impl ScriptedSensor {
    /// A sensor with an empty script; polls report `WouldBlock`.
    pub fn new() -> Self {
        Self {
            script: heapless::Deque::new(),
            calibration_result: Ok(()),
            fan_result: Ok(()),
            fan_on: false,
            calibrations: 0,
        }
    }

    /// Queue a measurement response.
    pub fn feed_reading(&mut self, co2_ppm: u16, temperature_c: i16, calibrated: bool) {
        let _ = self.script.push_back(Ok(Measurement {
            co2_ppm,
            temperature_c,
            calibrated,
        }));
    }

    /// Queue a "still warming up" response.
    pub fn feed_not_ready(&mut self) {
        let _ = self.script.push_back(Err(nb::Error::WouldBlock));
    }

    /// Queue a fault response.
    pub fn feed_fault(&mut self, fault: SensorFault) {
        let _ = self.script.push_back(Err(nb::Error::Other(fault)));
    }

    /// Make `begin_calibration` fail from now on.
    pub fn fail_calibration(&mut self, fault: SensorFault) {
        self.calibration_result = Err(fault);
    }

    /// Make `set_fan` fail from now on.
    pub fn fail_fan(&mut self, fault: SensorFault) {
        self.fan_result = Err(fault);
    }

    /// Current fan state as last commanded.
    pub fn fan_on(&self) -> bool {
        self.fan_on
    }

    /// Number of calibration commands accepted.
    pub fn calibrations(&self) -> u32 {
        self.calibrations
    }
}

impl Default for ScriptedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorGateway for ScriptedSensor {
    fn sample(&mut self) -> nb::Result<Measurement, SensorFault> {
        self.script.pop_front().unwrap_or(Err(nb::Error::WouldBlock))
    }

    fn begin_calibration(&mut self) -> Result<(), SensorFault> {
        self.calibration_result?;
        self.calibrations += 1;
        Ok(())
    }

    fn set_fan(&mut self, on: bool) -> Result<(), SensorFault> {
        self.fan_result?;
        self.fan_on = on;
        Ok(())
    }
}
