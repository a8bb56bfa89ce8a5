//! Batch Delivery Pipeline with Commit-on-Ack
//!
//! ## Overview
//!
//! Drains the [`ReadingBuffer`] to the collector, one bounded attempt
//! per tick. The pipeline owns the unreliable half of the system, so
//! its contract is strict:
//!
//! - **At most one request per tick**, never blocking the loop beyond
//!   the transport's own timeout.
//! - **Commit only on acknowledgment.** A transport failure or timeout
//!   commits nothing; the batch stays in the buffer and the same
//!   prefix is retried. An unacknowledged request that the collector
//!   did in fact store produces a duplicate on retry — accepted, the
//!   collector deduplicates.
//! - **Backoff on transient failure.** Retry delays double from a base
//!   up to a cap, bounding radio duty cycle through long outages while
//!   the buffer absorbs new readings.
//! - **Rejection latches.** A non-retryable collector response (bad
//!   credential, unknown device) is a configuration problem, not
//!   weather. It sets a persistent fault that stops further attempts
//!   until explicitly cleared, instead of hammering the collector.
//!
//! Sampling is never backpressured: when the buffer is full and
//! delivery keeps failing, new readings evict the oldest (the buffer's
//! policy), and the pipeline just keeps trying.
//!
//! ## Server hints
//!
//! The collector's acknowledgment may carry advisory payload: a pending
//! firmware version and a revised acquisition period. The pipeline
//! remembers the most recent hints; the node turns the firmware hint
//! into an OTA check at its next safe point.

use heapless::Vec;

use crate::buffer::{Reading, ReadingBuffer};
use crate::clock::Timestamp;
use crate::errors::UplinkError;

/// Collector acknowledgment with optional server hints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ack {
    /// Firmware version the server wants this device to run.
    pub firmware_version: Option<u32>,
    /// Acquisition period the server wants, in seconds.
    pub acq_period_s: Option<u32>,
}

/// Capability to submit one ordered batch of readings.
///
/// Implemented over HTTP in `sensino-connectors`; tests script it.
/// The implementation must bound its own run time (request timeout)
/// and report [`UplinkError::Timeout`] rather than blocking the loop.
pub trait Collector {
    /// Submit `readings` as one request, in order.
    fn send_batch(&mut self, readings: &[Reading]) -> Result<Ack, UplinkError>;
}

/// Exponential retry delay, doubling from `base_ms` up to `max_ms`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl Backoff {
    /// Backoff starting at `base_ms`, capped at `max_ms`.
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            attempt: 0,
        }
    }

    /// Delay before the next attempt, then advance the schedule.
    pub fn next_delay(&mut self) -> u64 {
        // Cap the shift so the multiply cannot overflow long before
        // the delay cap takes over anyway.
        let shift = self.attempt.min(16);
        let delay = self.base_ms.saturating_mul(1u64 << shift).min(self.max_ms);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Back to the base delay after a success.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Counters for delivery health, reported alongside buffer stats.
#[derive(Debug, Clone, Default)]
pub struct DeliveryStats {
    /// Batches acknowledged by the collector.
    pub batches_sent: u32,
    /// Readings acknowledged in total.
    pub readings_sent: u32,
    /// Transient transport failures and timeouts.
    pub transport_failures: u32,
    /// Non-retryable rejections observed.
    pub rejections: u32,
}

/// What a delivery tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Buffer empty, nothing to do.
    Idle,
    /// Waiting out the backoff interval; no request made.
    Deferred,
    /// This many readings acknowledged and committed.
    Delivered(usize),
    /// Transient failure; batch retained, retry scheduled.
    TransportFailed,
    /// Rejection latched; delivery halted until cleared.
    Rejected,
}

/// Tick-driven uploader over a [`Collector`].
///
/// `BATCH` bounds the readings per request, keeping request bodies
/// small enough for constrained links.
pub struct DeliveryPipeline<const BATCH: usize> {
    next_attempt_at: Timestamp,
    backoff: Backoff,
    rejected_status: Option<u16>,
    hints: Ack,
    stats: DeliveryStats,
}

impl<const BATCH: usize> DeliveryPipeline<BATCH> {
    /// Pipeline with the given backoff schedule, ready to send
    /// immediately.
    pub const fn new(backoff_base_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            next_attempt_at: 0,
            backoff: Backoff::new(backoff_base_ms, backoff_max_ms),
            rejected_status: None,
            hints: Ack {
                firmware_version: None,
                acq_period_s: None,
            },
            stats: DeliveryStats {
                batches_sent: 0,
                readings_sent: 0,
                transport_failures: 0,
                rejections: 0,
            },
        }
    }

    /// Attempt delivery of up to `BATCH` readings. At most one request
    /// per call.
    pub fn tick<const N: usize, C: Collector>(
        &mut self,
        now: Timestamp,
        buffer: &mut ReadingBuffer<N>,
        collector: &mut C,
    ) -> DeliveryOutcome {
        if self.rejected_status.is_some() {
            return DeliveryOutcome::Rejected;
        }
        if buffer.is_empty() {
            return DeliveryOutcome::Idle;
        }
        if now < self.next_attempt_at {
            return DeliveryOutcome::Deferred;
        }

        let mut batch: Vec<Reading, BATCH> = Vec::new();
        for reading in buffer.peek_batch(BATCH) {
            // Cannot overflow: peek_batch yields at most BATCH items.
            let _ = batch.push(*reading);
        }

        match collector.send_batch(&batch) {
            Ok(ack) => {
                buffer.commit(batch.len());
                self.backoff.reset();
                self.next_attempt_at = now;
                self.merge_hints(ack);
                self.stats.batches_sent = self.stats.batches_sent.saturating_add(1);
                self.stats.readings_sent =
                    self.stats.readings_sent.saturating_add(batch.len() as u32);
                log::debug!("delivered {} readings", batch.len());
                DeliveryOutcome::Delivered(batch.len())
            }
            Err(UplinkError::Rejected { status }) => {
                self.rejected_status = Some(status);
                self.stats.rejections = self.stats.rejections.saturating_add(1);
                log::warn!("collector rejected upload (status {}), delivery halted", status);
                DeliveryOutcome::Rejected
            }
            Err(err) => {
                let delay = self.backoff.next_delay();
                self.next_attempt_at = now + delay;
                self.stats.transport_failures =
                    self.stats.transport_failures.saturating_add(1);
                log::debug!("upload failed ({}), retrying in {} ms", err, delay);
                DeliveryOutcome::TransportFailed
            }
        }
    }

    /// Latched rejection status, if delivery is halted.
    pub fn rejection(&self) -> Option<u16> {
        self.rejected_status
    }

    /// Clear a latched rejection and resume delivery from scratch.
    pub fn clear_rejection(&mut self) {
        self.rejected_status = None;
        self.backoff.reset();
        self.next_attempt_at = 0;
    }

    /// Most recent server hints seen in an acknowledgment.
    pub fn hints(&self) -> Ack {
        self.hints
    }

    /// Delivery counters.
    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    fn merge_hints(&mut self, ack: Ack) {
        if ack.firmware_version.is_some() {
            self.hints.firmware_version = ack.firmware_version;
        }
        if ack.acq_period_s.is_some() {
            self.hints.acq_period_s = ack.acq_period_s;
        }
    }
}
