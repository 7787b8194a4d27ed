//! Degrees-minutes-hemisphere coordinate fields.
//!
//! ASCII dialects encode latitude as `DDmm.mmmm` and longitude as
//! `DDDmm.mmmm`, with the sign carried by a paired hemisphere letter.
//! Devices without a fix emit an out-of-range value; that decodes to
//! the axis sentinel (90 / 180 degrees), never to garbage degrees.

use crate::error::DecodeError;

/// Which axis a coordinate field describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    /// Whole-degree bound for this axis.
    fn max_degrees(self) -> f64 {
        match self {
            Self::Latitude => 90.0,
            Self::Longitude => 180.0,
        }
    }

    /// Invalid-coordinate sentinel for this axis.
    pub fn sentinel(self) -> f64 {
        self.max_degrees()
    }

    fn hemispheres(self) -> (char, char) {
        match self {
            Self::Latitude => ('N', 'S'),
            Self::Longitude => ('E', 'W'),
        }
    }
}

/// Decode a `DDmm.mmmm` / `DDDmm.mmmm` field plus hemisphere letter
/// into signed decimal degrees.
///
/// A syntactically valid but out-of-range value (the "no fix" sentinel
/// many devices emit) decodes to the axis sentinel. A malformed field
/// is a decode error.
pub fn parse_degrees_minutes(field: &str, hemi: char, axis: Axis) -> Result<f64, DecodeError> {
    let raw: f64 = field.trim().parse().map_err(|_| DecodeError::InvalidField {
        field: "coordinate",
        value: field.to_string(),
    })?;

    let (pos, neg) = axis.hemispheres();
    let sign = match hemi.to_ascii_uppercase() {
        h if h == pos => 1.0,
        h if h == neg => -1.0,
        _ => {
            return Err(DecodeError::InvalidField {
                field: "hemisphere",
                value: hemi.to_string(),
            })
        }
    };

    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;

    if raw < 0.0 || minutes >= 60.0 || degrees >= axis.max_degrees() {
        return Ok(axis.sentinel());
    }

    Ok(sign * (degrees + minutes / 60.0))
}

/// Encode signed decimal degrees into the dialect field representation.
/// Used by tests to drive the round-trip property.
pub fn format_degrees_minutes(value: f64, axis: Axis) -> (String, char) {
    let (pos, neg) = axis.hemispheres();
    let hemi = if value < 0.0 { neg } else { pos };
    let abs = value.abs();
    let degrees = abs.trunc();
    let minutes = (abs - degrees) * 60.0;

    let field = match axis {
        Axis::Latitude => format!("{:02}{:07.4}", degrees as u32, minutes),
        Axis::Longitude => format!("{:03}{:07.4}", degrees as u32, minutes),
    };
    (field, hemi)
}
