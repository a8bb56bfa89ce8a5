//! Error Types for Node Failure Paths
//!
//! ## Design Philosophy
//!
//! Nothing in this crate is fatal to the process. Every error here maps
//! to a degraded-but-running mode:
//!
//! - `SensorFault`: the peripheral misbehaved — calibration halts,
//!   sampling keeps polling and the buffer is never corrupted.
//! - `UplinkError::Transport` / `Timeout`: transient network trouble —
//!   readings stay buffered and delivery retries with backoff.
//! - `UplinkError::Rejected`: the collector refused us (bad credential,
//!   unknown device) — latched as an alert condition instead of a
//!   retry storm.
//!
//! Errors are small `Copy` values with inline payloads only — no heap,
//! no `String` — since they are returned on the sampling and delivery
//! hot paths and may be held across ticks.

use thiserror_no_std::Error;

/// Faults reported by the CO2 sensor peripheral.
///
/// "Not ready" (warm-up still running) is not a fault; the gateway
/// reports it as `nb::Error::WouldBlock` instead.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFault {
    /// No response within the UART timeout.
    #[error("sensor did not answer within timeout")]
    Timeout,

    /// A response frame arrived with a bad checksum.
    #[error("sensor response failed checksum")]
    Checksum,
}

/// Failures when talking to the collector or time endpoint.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkError {
    /// Connection-level failure (DNS, TCP, TLS, socket I/O).
    #[error("transport failure")]
    Transport,

    /// The request went out but no acknowledgment arrived in time.
    ///
    /// The batch may or may not have been stored; retrying can produce
    /// a duplicate, which the collector tolerates.
    #[error("request timed out")]
    Timeout,

    /// The collector answered with a non-retryable status.
    #[error("collector rejected request with status {status}")]
    Rejected {
        /// HTTP status code returned by the collector.
        status: u16,
    },
}

impl UplinkError {
    /// Whether delivery should retry after this error.
    ///
    /// Rejections are persistent: retrying with the same credential and
    /// payload cannot succeed and only burns radio time.
    pub const fn is_transient(&self) -> bool {
        !matches!(self, UplinkError::Rejected { .. })
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SensorFault {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Timeout => defmt::write!(fmt, "sensor timeout"),
            Self::Checksum => defmt::write!(fmt, "sensor checksum"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for UplinkError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::Transport => defmt::write!(fmt, "transport failure"),
            Self::Timeout => defmt::write!(fmt, "request timeout"),
            Self::Rejected { status } => defmt::write!(fmt, "rejected ({})", status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_is_persistent() {
        assert!(UplinkError::Transport.is_transient());
        assert!(UplinkError::Timeout.is_transient());
        assert!(!UplinkError::Rejected { status: 401 }.is_transient());
    }
}
