//! HTTP Time Source
//!
//! The deployment networks frequently block NTP, so the collector
//! exposes `GET /now` returning its current wall-clock time as plain
//! epoch seconds in the response body. This module turns that into the
//! core's [`TimeAuthority`] capability.
//!
//! Any failure — transport, bad status, unparseable body — collapses
//! into a transient [`UplinkError::Transport`]: the node keeps
//! stamping readings with the unsynced sentinel and retries on its
//! sync schedule.

use std::time::Duration;

use sensino_core::clock::{EpochSeconds, TimeAuthority};
use sensino_core::config;
use sensino_core::errors::UplinkError;

/// Client for the collector's `/now` endpoint.
pub struct HttpTimeSource {
    url: String,
    agent: ureq::Agent,
}

impl HttpTimeSource {
    /// Time source against the build-time endpoint.
    pub fn new() -> Self {
        Self::with_url(config::TIME_ENDPOINT)
    }

    /// Time source against a specific URL.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_millis(config::HTTP_TIMEOUT_MS))
                .build(),
        }
    }
}

impl Default for HttpTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeAuthority for HttpTimeSource {
    fn fetch_now(&mut self) -> Result<EpochSeconds, UplinkError> {
        match self.agent.get(&self.url).call() {
            Ok(resp) => {
                let text = resp.into_string().map_err(|_| UplinkError::Transport)?;
                parse_epoch(&text).ok_or_else(|| {
                    log::warn!("time endpoint returned unparseable body");
                    UplinkError::Transport
                })
            }
            Err(ureq::Error::Status(status, _)) => {
                log::debug!("time endpoint answered {}", status);
                Err(UplinkError::Transport)
            }
            Err(ureq::Error::Transport(t)) => {
                log::debug!("time fetch transport failure: {}", t);
                Err(UplinkError::Transport)
            }
        }
    }
}

/// Parse the `/now` body: integer epoch seconds, with tolerance for a
/// fractional form some server stacks emit.
fn parse_epoch(body: &str) -> Option<EpochSeconds> {
    let trimmed = body.trim();
    if let Ok(secs) = trimmed.parse::<EpochSeconds>() {
        return Some(secs);
    }
    let float = trimmed.parse::<f64>().ok()?;
    if float.is_finite() && float >= 0.0 && float < EpochSeconds::MAX as f64 {
        Some(float as EpochSeconds)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integer_body() {
        assert_eq!(parse_epoch("1700000000"), Some(1_700_000_000));
        assert_eq!(parse_epoch("  1700000000\n"), Some(1_700_000_000));
    }

    #[test]
    fn tolerates_fractional_seconds() {
        assert_eq!(parse_epoch("1700000000.25"), Some(1_700_000_000));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_epoch(""), None);
        assert_eq!(parse_epoch("yesterday"), None);
        assert_eq!(parse_epoch("-5"), None);
        assert_eq!(parse_epoch("99999999999999999999"), None);
    }
}
