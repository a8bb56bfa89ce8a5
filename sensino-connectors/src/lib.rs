//! HTTP Integrations for sensino Nodes
//!
//! ## Overview
//!
//! `sensino-core` is deliberately transport-agnostic: the delivery
//! pipeline talks to a [`Collector`] and the clock to a
//! [`TimeAuthority`], both plain traits. This crate provides the real
//! implementations over HTTP for platforms with a standard library
//! (bridge firmware, gateways, soak-test rigs):
//!
//! - [`http::HttpCollector`] — batch upload to the collector's
//!   `/store` endpoint plus one-time device registration, speaking the
//!   collector's header and payload dialect.
//! - [`time::HttpTimeSource`] — wall-clock time from the collector's
//!   `/now` endpoint, for networks where NTP is blocked.
//!
//! ## Why plain blocking HTTP?
//!
//! The node runs a single cooperative loop and performs at most one
//! request per tick, so an async runtime would buy nothing. `ureq`
//! gives a small blocking client with per-request timeouts; a request
//! that cannot complete in time surfaces as a transient uplink error
//! and the loop moves on.
//!
//! ## Failure mapping
//!
//! Every transport gets collapsed into the core's [`UplinkError`]
//! taxonomy: connection-level trouble and 5xx/429 responses are
//! transient (retried with backoff by the pipeline), other status
//! codes are rejections (latched as an alert).
//!
//! [`Collector`]: sensino_core::delivery::Collector
//! [`TimeAuthority`]: sensino_core::clock::TimeAuthority
//! [`UplinkError`]: sensino_core::errors::UplinkError

pub mod http;
pub mod time;

pub use http::{CollectorConfig, HttpCollector, HttpError};
pub use time::HttpTimeSource;

/// Request statistics common to the HTTP clients.
#[derive(Debug, Default, Clone)]
pub struct UplinkStats {
    /// Requests that completed with an acknowledgment.
    pub requests_sent: u64,
    /// Requests that failed or were rejected.
    pub requests_failed: u64,
    /// Total body bytes sent.
    pub bytes_sent: u64,
}
