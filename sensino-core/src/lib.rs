//! Core engine for sensino CO2 nodes
//!
//! Everything between the sensor pins and the HTTP socket: periodic
//! sampling, bounded buffering under intermittent connectivity, batch
//! delivery with commit-on-ack, HTTP clock synchronization without an
//! RTC, and the time-gated calibration state machine.
//!
//! Key constraints:
//! - Single cooperative control loop, no locks, no re-entrant ticks
//! - No heap allocation: buffers are const-generic and inline
//! - Every failure path degrades instead of halting
//!
//! ```no_run
//! use sensino_core::{DefaultNode, NodeConfig};
//! use sensino_core::clock::{HostTime, TimeSource};
//! # use sensino_core::sensor::ScriptedSensor;
//! # use sensino_core::delivery::{Ack, Collector};
//! # use sensino_core::clock::{EpochSeconds, TimeAuthority};
//! # use sensino_core::errors::UplinkError;
//! # struct C; impl Collector for C { fn send_batch(&mut self, _: &[sensino_core::Reading]) -> Result<Ack, UplinkError> { Ok(Ack::default()) } }
//! # struct A; impl TimeAuthority for A { fn fetch_now(&mut self) -> Result<EpochSeconds, UplinkError> { Ok(0) } }
//!
//! let time = HostTime::new();
//! let mut node = DefaultNode::new(NodeConfig::default());
//! # let (mut sensor, mut collector, mut authority) = (ScriptedSensor::new(), C, A);
//! loop {
//!     let now = time.now();
//!     node.tick(now, read_button(), &mut sensor, &mut collector, &mut authority);
//!     sleep_ms(100);
//! }
//! # fn read_button() -> bool { false }
//! # fn sleep_ms(_: u32) {}
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod errors;
pub mod node;
pub mod sensor;

// Public API
pub use buffer::{Reading, ReadingBuffer};
pub use calibration::{CalibrationMachine, CalibrationState, Debouncer, PressLatch};
pub use clock::{
    DeviceClock, EpochSeconds, TimeAuthority, TimeSource, Timestamp, UNSYNCED_TIMESTAMP,
};
pub use delivery::{Ack, Collector, DeliveryOutcome, DeliveryPipeline};
pub use errors::{SensorFault, UplinkError};
pub use node::{DefaultNode, Node, NodeConfig, NodeStats};
pub use sensor::{Measurement, SensorGateway};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
