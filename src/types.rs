//! Core types used throughout Fleetwire.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enumerated event classification for a persisted event.
///
/// Every decoded packet carries one status code; the pipeline may
/// synthesize additional codes (geofence transitions, input edges).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusCode {
    /// No specific code supplied by the dialect; the pipeline retargets
    /// this to `Location` or `InMotion` during arbitration.
    None,
    /// Plain GPS location report.
    Location,
    /// Location report while moving.
    InMotion,
    /// Location derived from a serving cell tower, not GPS.
    CellLocation,
    /// Synthesized geozone entry.
    GeofenceEnter,
    /// Synthesized geozone exit.
    GeofenceExit,
    /// Digital input bit turned on.
    InputOn(u8),
    /// Digital input bit turned off.
    InputOff(u8),
    /// Ignition sense on.
    IgnitionOn,
    /// Ignition sense off.
    IgnitionOff,
    /// Driver panic / SOS.
    Panic,
    /// Battery below threshold.
    LowBattery,
    /// Explicitly discarded by configuration.
    Ignore,
}

impl StatusCode {
    /// The explicit, named default applied when a dialect event code has
    /// no entry in the translation table.
    pub const UNMAPPED_DEFAULT: StatusCode = StatusCode::Location;

    /// Check if this is the generic "no specific code" case.
    pub fn is_generic(self) -> bool {
        matches!(self, Self::None)
    }

    /// Check if this code describes a location-kind event.
    pub fn is_location_kind(self) -> bool {
        matches!(self, Self::Location | Self::InMotion | Self::CellLocation)
    }

    /// Check if this code is produced by pipeline synthesis rather than
    /// by a decoder.
    pub fn is_synthesized_kind(self) -> bool {
        matches!(
            self,
            Self::GeofenceEnter | Self::GeofenceExit | Self::InputOn(_) | Self::InputOff(_)
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Location => write!(f, "location"),
            Self::InMotion => write!(f, "in-motion"),
            Self::CellLocation => write!(f, "cell-location"),
            Self::GeofenceEnter => write!(f, "geofence-enter"),
            Self::GeofenceExit => write!(f, "geofence-exit"),
            Self::InputOn(bit) => write!(f, "input-on-{bit}"),
            Self::InputOff(bit) => write!(f, "input-off-{bit}"),
            Self::IgnitionOn => write!(f, "ignition-on"),
            Self::IgnitionOff => write!(f, "ignition-off"),
            Self::Panic => write!(f, "panic"),
            Self::LowBattery => write!(f, "low-battery"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// A WGS-84 latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Origin point carried by invalid fixes.
    pub const ZERO: Self = Self { lat: 0.0, lon: 0.0 };

    /// Sentinel substituted by decoders for unparseable coordinates.
    pub const INVALID: Self = Self {
        lat: 90.0,
        lon: 180.0,
    };

    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Validity predicate: finite, inside ±90/±180 exclusive of the
    /// sentinel boundary, and not the 0/0 origin.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && self.lat.abs() < 90.0
            && self.lon.abs() < 180.0
            && !(self.lat == 0.0 && self.lon == 0.0)
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}/{:.5}", self.lat, self.lon)
    }
}

/// Persisted device addressing: account plus device id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceKey {
    pub account: String,
    pub device: String,
}

impl DeviceKey {
    pub fn new(account: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            device: device.into(),
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.device)
    }
}

/// Serving-cell-tower descriptor reported by some dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellTower {
    /// Mobile country code.
    pub mcc: u16,
    /// Mobile network code.
    pub mnc: u16,
    /// Location area code.
    pub lac: u16,
    /// Cell id.
    pub cid: u32,
}

impl fmt::Display for CellTower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}/{:04X}:{:08X}", self.mcc, self.mnc, self.lac, self.cid)
    }
}

/// Unique identifier for one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_validity() {
        assert!(GeoPoint::new(35.3640, -142.2958).is_valid());
        assert!(!GeoPoint::ZERO.is_valid());
        assert!(!GeoPoint::INVALID.is_valid());
        assert!(!GeoPoint::new(90.0, 10.0).is_valid());
        assert!(!GeoPoint::new(10.0, -180.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(StatusCode::InputOn(3).to_string(), "input-on-3");
        assert_eq!(StatusCode::CellLocation.to_string(), "cell-location");
    }

    #[test]
    fn test_unmapped_default_is_location() {
        assert_eq!(StatusCode::UNMAPPED_DEFAULT, StatusCode::Location);
    }
}
