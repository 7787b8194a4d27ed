//! The canonical decoded record produced by every dialect decoder.

use serde::{Deserialize, Serialize};

use crate::types::{CellTower, GeoPoint, StatusCode};

/// One normalized location/telemetry sample decoded from a raw packet.
///
/// Produced once per decoded packet and consumed immediately by the
/// post-processing pipeline; never persisted directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedFix {
    /// Device-supplied mobile/modem identifier.
    pub modem_id: String,
    /// Sample time, seconds UTC. Zero or negative means "unknown";
    /// the pipeline substitutes the current time.
    pub timestamp: i64,
    /// Event classification; `StatusCode::None` when the dialect
    /// supplied no specific code.
    pub status: StatusCode,
    /// Position. Invalid fixes carry 0/0 and `valid == false`.
    pub point: GeoPoint,
    /// GPS validity as reported and arbitrated.
    pub valid: bool,
    /// Ground speed, km/h, never negative.
    pub speed_kmh: f64,
    /// Heading in degrees [0, 360); `None` means unknown.
    pub heading: Option<f64>,
    /// Altitude in meters.
    pub altitude_m: f64,
    /// Dialect-supplied odometer, km.
    pub odometer_km: Option<f64>,
    /// Digital-input bit mask, absent when the dialect carries none.
    pub input_mask: Option<u32>,
    /// Main battery voltage.
    pub battery_volts: Option<f64>,
    /// Battery level fraction in [0, 1].
    pub battery_level: Option<f64>,
    /// Serving-cell-tower descriptor.
    pub cell: Option<CellTower>,
    /// Engine temperature, Celsius.
    pub engine_temp_c: Option<f64>,
    /// Diagnostic fault codes.
    pub fault_codes: Vec<String>,
    /// Seconds since the position was actually measured; non-zero only
    /// after last-valid-fix substitution.
    pub gps_age_secs: i64,
    /// True when the position was substituted from the device's last
    /// known valid fix rather than decoded from this packet.
    pub derived: bool,
}

impl NormalizedFix {
    /// Create an empty fix for the given modem id.
    pub fn new(modem_id: impl Into<String>) -> Self {
        Self {
            modem_id: modem_id.into(),
            timestamp: 0,
            status: StatusCode::None,
            point: GeoPoint::ZERO,
            valid: false,
            speed_kmh: 0.0,
            heading: None,
            altitude_m: 0.0,
            odometer_km: None,
            input_mask: None,
            battery_volts: None,
            battery_level: None,
            cell: None,
            engine_temp_c: None,
            fault_codes: Vec::new(),
            gps_age_secs: 0,
            derived: false,
        }
    }

    /// Check if the device is moving.
    pub fn is_moving(&self) -> bool {
        self.speed_kmh > 0.0
    }

    /// Mark the fix invalid, zeroing position, speed and heading.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.point = GeoPoint::ZERO;
        self.speed_kmh = 0.0;
        self.heading = None;
    }

    /// Apply the minimum-speed clamp: any speed below `min_kmh` zeroes
    /// both speed and heading. Speed and heading are corrected as a
    /// pair, never independently.
    pub fn clamp_min_speed(&mut self, min_kmh: f64) {
        if self.speed_kmh < min_kmh {
            self.speed_kmh = 0.0;
            self.heading = None;
        }
    }
}
