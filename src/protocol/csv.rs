//! Comma-delimited ASCII dialect (digit lead byte, line-oriented).
//!
//! ```text
//! <modemid>,<YYYY/MM/DD>,<hh:mm:ss>,<lat>,<lon>,<speedKmh>,<heading>[,<alt>[,<code>]]
//! ```
//!
//! Timestamp fields are GMT; coordinates are signed decimal degrees.
//! The dialect sends no acknowledgement.

use super::timeparse::{parse_hms_colon, parse_ymd_slash};
use super::{translate_or_default, Decoded, RawPacket, StatusTranslator};
use crate::config::DialectConfig;
use crate::error::DecodeError;
use crate::fix::NormalizedFix;
use crate::types::{GeoPoint, StatusCode};

pub fn decode_csv(
    raw: &RawPacket,
    config: &DialectConfig,
    translator: &dyn StatusTranslator,
) -> Result<Decoded, DecodeError> {
    let text = raw.as_ascii()?;
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();

    if fields.len() < 7 {
        return Err(DecodeError::MissingField("heading"));
    }

    let modem_id = fields[0];
    if modem_id.is_empty() || !modem_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(DecodeError::InvalidField {
            field: "modem_id",
            value: fields[0].to_string(),
        });
    }

    let date = parse_ymd_slash(fields[1])?;
    let time = parse_hms_colon(fields[2])?;
    let timestamp = date.and_time(time).and_utc().timestamp();

    let lat = parse_f64("latitude", fields[3])?;
    let lon = parse_f64("longitude", fields[4])?;
    let speed = parse_f64("speed", fields[5])?.max(0.0);
    let heading = parse_f64("heading", fields[6])?;

    let mut fix = NormalizedFix::new(modem_id);
    fix.timestamp = timestamp;
    fix.point = GeoPoint::new(lat, lon);
    fix.valid = fix.point.is_valid();
    fix.speed_kmh = speed;
    fix.heading = (heading >= 0.0).then_some(heading % 360.0);
    fix.clamp_min_speed(config.minimum_speed_kmh);

    if let Some(alt) = fields.get(7) {
        fix.altitude_m = parse_f64("altitude", alt)?;
    }

    // An absent trailing code defaults to a plain location report.
    fix.status = match fields.get(8) {
        Some(code) if !code.is_empty() => {
            translate_or_default(translator, raw.dialect, code)
        }
        _ => StatusCode::Location,
    };

    Ok(Decoded { fix, ack: None })
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidField {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Dialect;
    use chrono::{TimeZone, Utc};

    struct NoTable;

    impl StatusTranslator for NoTable {
        fn translate_status(&self, _dialect: Dialect, _code: &str) -> Option<StatusCode> {
            None
        }
    }

    fn packet(text: &str) -> RawPacket {
        RawPacket::new(Dialect::Csv, text.as_bytes())
    }

    #[test]
    fn test_decode_minimal_report() {
        let raw = packet("123456789012345,2006/09/05,07:47:26,35.3640,-142.2958,27.0,224.8");
        let decoded = decode_csv(&raw, &DialectConfig::default(), &NoTable).unwrap();
        let fix = decoded.fix;

        let expected = Utc.with_ymd_and_hms(2006, 9, 5, 7, 47, 26).unwrap();
        assert_eq!(fix.modem_id, "123456789012345");
        assert_eq!(fix.timestamp, expected.timestamp());
        assert!(fix.valid);
        assert!((fix.point.lat - 35.3640).abs() < 1e-9);
        assert!((fix.point.lon - (-142.2958)).abs() < 1e-9);
        assert_eq!(fix.speed_kmh, 27.0);
        assert_eq!(fix.heading, Some(224.8));
        assert_eq!(fix.status, StatusCode::Location);
        assert!(decoded.ack.is_none());
    }

    #[test]
    fn test_optional_altitude_and_code() {
        let raw = packet("3512,2024/01/15,10:00:00,47.6097,-122.3331,0.0,-1,86.5,PANIC");
        let decoded = decode_csv(&raw, &DialectConfig::default(), &NoTable).unwrap();

        assert_eq!(decoded.fix.altitude_m, 86.5);
        // Unmapped code falls back to the named default, not to "none".
        assert_eq!(decoded.fix.status, StatusCode::UNMAPPED_DEFAULT);
        // Negative heading field means unknown.
        assert_eq!(decoded.fix.heading, None);
    }

    #[test]
    fn test_slow_speed_zeroes_heading_too() {
        let raw = packet("3512,2024/01/15,10:00:00,47.6097,-122.3331,2.5,118.0");
        let decoded = decode_csv(&raw, &DialectConfig::default(), &NoTable).unwrap();

        assert_eq!(decoded.fix.speed_kmh, 0.0);
        assert_eq!(decoded.fix.heading, None);
    }

    #[test]
    fn test_missing_mandatory_field() {
        let raw = packet("3512,2024/01/15,10:00:00,47.6097,-122.3331,2.5");
        assert!(decode_csv(&raw, &DialectConfig::default(), &NoTable).is_err());
    }

    #[test]
    fn test_garbage_coordinates_are_an_error() {
        let raw = packet("3512,2024/01/15,10:00:00,north,-122.3331,2.5,0.0");
        assert!(decode_csv(&raw, &DialectConfig::default(), &NoTable).is_err());
    }
}
