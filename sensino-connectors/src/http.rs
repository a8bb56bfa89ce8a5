//! HTTP Collector Client
//!
//! ## Overview
//!
//! Speaks the collector's device dialect: every request carries the
//! device identity and state as `SNO-*` headers, measurement batches go
//! to `POST /store`, and a device announces itself once at boot with
//! `POST /register`.
//!
//! ## Request shape
//!
//! Headers on every request:
//!
//! ```text
//! SNO-API-KEY:                static credential
//! SNO-SERIAL-NUMBER:          device serial
//! SNO-ACQ-PERIOD:             sample period (seconds)
//! SNO-USER-lastCalibration:   epoch of last calibration, NO_CAL if never
//! SNO-USER-firmwareVersion:   running firmware version
//! ```
//!
//! A `/store` body is one ordered batch:
//!
//! ```json
//! { "count": 2,
//!   "readings": [
//!     { "timestamp": 1700000000, "co2": 450, "temperature": 21, "calibrated": true },
//!     { "timestamp": 1700000060, "co2": 452, "temperature": 21, "calibrated": true } ] }
//! ```
//!
//! The collector's acknowledgment may carry advisory payload
//! (`acqPeriod`, `userServerPayload.firmwareVersion`), surfaced through
//! [`Ack`] so the node can schedule an OTA check at its next safe
//! point.
//!
//! ## Failure mapping
//!
//! - connection-level failure, timeout, 5xx, 429 → transient
//!   ([`UplinkError::Transport`]), retried with backoff by the pipeline
//! - any other status → [`UplinkError::Rejected`], latched by the
//!   pipeline as an alert

use std::time::Duration;

use sensino_core::buffer::Reading;
use sensino_core::config;
use sensino_core::delivery::{Ack, Collector};
use sensino_core::errors::UplinkError;
use thiserror::Error;

use crate::UplinkStats;

/// Errors from the configuration and registration paths.
///
/// The [`Collector`] impl never returns these; it collapses everything
/// into the core [`UplinkError`] taxonomy for the pipeline.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or I/O failure.
    #[error("request failed: {0}")]
    Request(String),

    /// Server answered with an error status.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, if readable.
        message: String,
    },
}

/// Collector client configuration.
///
/// Defaults come from the build-time configuration; the builder
/// methods exist for bridges that proxy several devices and for tests.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Collector base URL (`/store` and `/register` are appended).
    pub base_url: String,
    /// Static API key sent with every request.
    pub api_key: String,
    /// Device serial number.
    pub serial_number: u32,
    /// Advertised sample period in seconds.
    pub acq_period_s: u32,
    /// Epoch of the last calibration, or `NO_CAL` if never calibrated.
    pub last_calibration: u32,
    /// Firmware version reported to the collector.
    pub firmware_version: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl CollectorConfig {
    /// Configuration for a device with the given serial, defaulting
    /// everything else from the build-time constants.
    pub fn new(serial_number: u32) -> Self {
        Self {
            base_url: config::COLLECTOR_ENDPOINT.to_string(),
            api_key: config::API_KEY.to_string(),
            serial_number,
            acq_period_s: (config::RECORD_PERIOD_MS / 1000) as u32,
            last_calibration: config::NO_CAL,
            firmware_version: config::FIRMWARE_VERSION,
            timeout: Duration::from_millis(config::HTTP_TIMEOUT_MS),
            user_agent: format!("sensino/{}", sensino_core::VERSION),
        }
    }

    /// Override the collector base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    /// Override the per-request timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Set the last-calibration epoch reported in headers.
    pub fn last_calibration(mut self, epoch: u32) -> Self {
        self.last_calibration = epoch;
        self
    }
}

/// Blocking HTTP client for the collector, one request per call.
pub struct HttpCollector {
    config: CollectorConfig,
    agent: ureq::Agent,
    stats: UplinkStats,
}

impl HttpCollector {
    /// Build a client, validating the configured URL.
    pub fn new(config: CollectorConfig) -> Result<Self, HttpError> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(HttpError::Config(
                "base URL must start with http:// or https://".into(),
            ));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();

        Ok(Self {
            config,
            agent,
            stats: UplinkStats::default(),
        })
    }

    /// Announce the device to the collector (`POST /register`).
    ///
    /// Called once at boot, best-effort. `hardware_info` is an
    /// arbitrary description of the board (model, pins, radio).
    /// Returns the firmware version the server wants this device to
    /// run, if it said so.
    pub fn register<T: serde::Serialize>(
        &mut self,
        hardware_info: &T,
    ) -> Result<Option<u32>, HttpError> {
        let body = register_body(hardware_info);
        let url = format!("{}/register", self.config.base_url);
        match self.request(self.agent.post(&url)).send_string(&body) {
            Ok(resp) => {
                self.stats.requests_sent += 1;
                let text = resp.into_string().unwrap_or_default();
                Ok(parse_ack(&text).firmware_version)
            }
            Err(ureq::Error::Status(status, resp)) => {
                self.stats.requests_failed += 1;
                Err(HttpError::Server {
                    status,
                    message: resp.into_string().unwrap_or_default(),
                })
            }
            Err(ureq::Error::Transport(t)) => {
                self.stats.requests_failed += 1;
                Err(HttpError::Request(t.to_string()))
            }
        }
    }

    /// Record that the device recalibrated at `epoch`; later uploads
    /// report it in the `SNO-USER-lastCalibration` header.
    pub fn set_last_calibration(&mut self, epoch: u32) {
        self.config.last_calibration = epoch;
    }

    /// Request statistics.
    pub fn stats(&self) -> &UplinkStats {
        &self.stats
    }

    /// Attach the device identity headers.
    fn request(&self, request: ureq::Request) -> ureq::Request {
        request
            .set("SNO-API-KEY", &self.config.api_key)
            .set("SNO-SERIAL-NUMBER", &self.config.serial_number.to_string())
            .set("SNO-ACQ-PERIOD", &self.config.acq_period_s.to_string())
            .set(
                "SNO-USER-lastCalibration",
                &self.config.last_calibration.to_string(),
            )
            .set(
                "SNO-USER-firmwareVersion",
                &self.config.firmware_version.to_string(),
            )
            .set("Content-Type", "application/json")
            .set("Accept", "application/json")
    }
}

impl Collector for HttpCollector {
    fn send_batch(&mut self, readings: &[Reading]) -> Result<Ack, UplinkError> {
        let body = batch_body(readings);
        let url = format!("{}/store", self.config.base_url);

        match self.request(self.agent.post(&url)).send_string(&body) {
            Ok(resp) => {
                self.stats.requests_sent += 1;
                self.stats.bytes_sent += body.len() as u64;
                // A 2xx is the ack; an unreadable body just means no
                // hints this time.
                let text = resp.into_string().unwrap_or_default();
                Ok(parse_ack(&text))
            }
            Err(ureq::Error::Status(status, _)) => {
                self.stats.requests_failed += 1;
                log::warn!("collector answered {} for /store", status);
                Err(classify_status(status))
            }
            Err(ureq::Error::Transport(t)) => {
                // Socket timeouts land here too; the pipeline treats
                // timeout and transport failure identically.
                self.stats.requests_failed += 1;
                log::debug!("upload transport failure: {}", t);
                Err(UplinkError::Transport)
            }
        }
    }
}

/// Serialize the registration envelope the way `/register` expects it.
fn register_body<T: serde::Serialize>(hardware_info: &T) -> String {
    serde_json::json!({
        "userRecord": { "hardwareInfo": hardware_info }
    })
    .to_string()
}

/// Serialize one ordered batch the way `/store` expects it.
fn batch_body(readings: &[Reading]) -> String {
    serde_json::json!({
        "count": readings.len(),
        "readings": readings,
    })
    .to_string()
}

/// Split collector statuses into transient trouble and rejection.
fn classify_status(status: u16) -> UplinkError {
    if status >= 500 || status == 429 {
        UplinkError::Transport
    } else {
        UplinkError::Rejected { status }
    }
}

/// Extract server hints from an acknowledgment body, tolerating
/// anything that is not the expected JSON.
fn parse_ack(body: &str) -> Ack {
    let value: serde_json::Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => return Ack::default(),
    };

    Ack {
        firmware_version: value
            .get("userServerPayload")
            .and_then(|p| p.get("firmwareVersion"))
            .and_then(serde_json::Value::as_u64)
            .map(|v| v as u32),
        acq_period_s: value
            .get("acqPeriod")
            .and_then(serde_json::Value::as_u64)
            .map(|v| v as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(ts: u32, co2: u16) -> Reading {
        Reading {
            timestamp: ts,
            co2_ppm: co2,
            temperature_c: 21,
            calibrated: true,
        }
    }

    #[test]
    fn config_defaults_and_builder() {
        let cfg = CollectorConfig::new(1042);
        assert_eq!(cfg.serial_number, 1042);
        assert_eq!(cfg.last_calibration, config::NO_CAL);
        assert_eq!(cfg.acq_period_s, 60);

        let cfg = cfg
            .base_url("https://collector.test")
            .api_key("k")
            .timeout_secs(2)
            .last_calibration(1_700_000_000);
        assert_eq!(cfg.base_url, "https://collector.test");
        assert_eq!(cfg.api_key, "k");
        assert_eq!(cfg.timeout, Duration::from_secs(2));
        assert_eq!(cfg.last_calibration, 1_700_000_000);
    }

    #[test]
    fn url_validation() {
        let result = HttpCollector::new(CollectorConfig::new(1).base_url("not-a-url"));
        assert!(result.is_err());

        let result = HttpCollector::new(CollectorConfig::new(1).base_url("https://valid.url"));
        assert!(result.is_ok());
    }

    #[test]
    fn batch_body_shape() {
        let body = batch_body(&[reading(100, 450), reading(160, 452)]);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(value["count"], 2);
        let readings = value["readings"].as_array().unwrap();
        assert_eq!(readings.len(), 2);
        // Order and field names are part of the wire contract.
        assert_eq!(readings[0]["timestamp"], 100);
        assert_eq!(readings[0]["co2"], 450);
        assert_eq!(readings[0]["temperature"], 21);
        assert_eq!(readings[0]["calibrated"], true);
        assert_eq!(readings[1]["co2"], 452);
    }

    #[test]
    fn register_body_shape() {
        #[derive(serde::Serialize)]
        struct HardwareInfo {
            model: &'static str,
            fan_pin: u8,
        }

        let body = register_body(&HardwareInfo {
            model: "wemos-d1",
            fan_pin: 2,
        });
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["userRecord"]["hardwareInfo"]["model"], "wemos-d1");
        assert_eq!(value["userRecord"]["hardwareInfo"]["fan_pin"], 2);
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(500), UplinkError::Transport);
        assert_eq!(classify_status(503), UplinkError::Transport);
        assert_eq!(classify_status(429), UplinkError::Transport);
        assert_eq!(classify_status(401), UplinkError::Rejected { status: 401 });
        assert_eq!(classify_status(404), UplinkError::Rejected { status: 404 });
    }

    #[test]
    fn ack_parsing() {
        // Full payload.
        let ack = parse_ack(
            r#"{"acqPeriod": 120, "userServerPayload": {"firmwareVersion": 11, "lastCalibration": 42}}"#,
        );
        assert_eq!(ack.firmware_version, Some(11));
        assert_eq!(ack.acq_period_s, Some(120));

        // Empty ack: no hints.
        assert_eq!(parse_ack("{}"), Ack::default());

        // Not JSON at all: still an ack, no hints.
        assert_eq!(parse_ack(""), Ack::default());
        assert_eq!(parse_ack("<html>proxy error</html>"), Ack::default());
    }
}
