//! Build-Time Configuration for the Node
//!
//! Every tunable of the node is a compile-time constant collected here:
//! buffer sizing, periods, calibration gates, pin wiring and network
//! endpoints. There is no runtime reconfiguration surface — a node is
//! flashed with its configuration, matching how the devices are
//! deployed and audited in the field.
//!
//! ## Usage Guidelines
//!
//! 1. Always use these constants instead of magic numbers
//! 2. When adding new constants, document purpose and units in the name
//! 3. Values that must agree with the collector (sentinels, endpoints)
//!    are marked as such

// ===== TIME UNIT CONVERSIONS =====

/// Milliseconds per second.
pub const MS_PER_SECOND: u64 = 1000;

/// Milliseconds per minute.
pub const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;

// ===== MEASUREMENT =====

/// Readings held while the collector is unreachable.
///
/// 1000 readings at one per minute is roughly 16 hours of outage
/// before the oldest data starts being evicted.
pub const BUFFER_CAPACITY: usize = 1000;

/// Interval between CO2 samples (milliseconds).
pub const RECORD_PERIOD_MS: u64 = 60 * MS_PER_SECOND;

// ===== CALIBRATION =====

/// Minimum powered-on time before zero-point calibration is allowed
/// (milliseconds).
///
/// The MH-Z19 drifts while its emitter warms up; calibrating earlier
/// would bake the drift into the zero point and skew every subsequent
/// reading.
pub const CALIBRATION_WAIT_MS: u64 = 30 * MS_PER_MINUTE;

/// Settle interval after a calibration command before the node returns
/// to normal operation and the fan stops (milliseconds).
pub const CALIBRATION_COOLDOWN_MS: u64 = 60 * MS_PER_SECOND;

/// Minimum stable level before a button edge counts (milliseconds).
pub const BUTTON_DEBOUNCE_MS: u64 = 50;

// ===== DELIVERY =====

/// Maximum readings per upload request.
pub const DELIVERY_BATCH: usize = 10;

/// First retry delay after a failed upload (milliseconds).
pub const BACKOFF_BASE_MS: u64 = 5 * MS_PER_SECOND;

/// Retry delay ceiling (milliseconds).
///
/// Caps radio duty cycle during sustained outages; the buffer absorbs
/// the readings in the meantime.
pub const BACKOFF_MAX_MS: u64 = 5 * MS_PER_MINUTE;

// ===== CLOCK =====

/// Interval between clock re-syncs once synced (milliseconds).
pub const CLOCK_SYNC_PERIOD_MS: u64 = 60 * MS_PER_MINUTE;

/// Retry interval while the clock has never been synced (milliseconds).
pub const CLOCK_SYNC_RETRY_MS: u64 = MS_PER_MINUTE;

/// Timeout for any single HTTP request (milliseconds).
pub const HTTP_TIMEOUT_MS: u64 = 5 * MS_PER_SECOND;

// ===== SENSOR WIRING =====

/// MH-Z19 serial baudrate. Fixed by the sensor, do not change.
pub const CO2SENSOR_BAUDRATE: u32 = 9600;

/// Rx pin attached to the sensor's Tx pin.
pub const CO2SENSOR_RX_PIN: u8 = 13;

/// Tx pin attached to the sensor's Rx pin.
pub const CO2SENSOR_TX_PIN: u8 = 12;

/// Calibration button input pin.
pub const BUTTON_PIN: u8 = 0;

/// Fan output pin.
pub const FAN_PIN: u8 = 2;

// ===== COLLECTOR PROTOCOL =====

/// Last-calibration value reported before the device was ever
/// calibrated. Must match the collector's `NO_CAL`.
pub const NO_CAL: u32 = 42;

/// Firmware version reported in upload headers.
pub const FIRMWARE_VERSION: u32 = 10;

/// Base URL of the collector; uploads go to `/store`, registration to
/// `/register`.
pub const COLLECTOR_ENDPOINT: &str = "http://collector.example.org";

/// HTTP time endpoint, used instead of NTP on networks that block it.
pub const TIME_ENDPOINT: &str = "http://collector.example.org/now";

/// API key sent with every request. Replace before flashing.
pub const API_KEY: &str = "CHANGE-ME";

// ===== OTA =====

/// Host serving firmware images.
pub const OTA_HOST: &str = "collector.example.org";

/// Port of the firmware update service.
pub const OTA_PORT: u16 = 80;

/// Path template for firmware images, completed with a version number.
pub const OTA_PATH: &str = "/updates";
