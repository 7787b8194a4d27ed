//! Dollar-prefixed fixed-length binary dialect.
//!
//! 48-byte big-endian frames:
//!
//! ```text
//!  0      '$'
//!  1..9   modem id, BCD, 16 digits
//!  9      flags: bit0 = GPS valid, bit1 = cell descriptor present
//! 10..16  YYMMDDhhmmss, BCD, GMT
//! 16..20  latitude  i32, 1e-6 deg
//! 20..24  longitude i32, 1e-6 deg
//! 24..26  speed u16, 0.1 km/h
//! 26..28  heading u16, 0.1 deg (0xFFFF = unknown)
//! 28..30  altitude i16, m
//! 30..34  odometer u32, 0.1 km (0 = absent)
//! 34      input mask
//! 35      event code (0 = none)
//! 36..38  battery u16, 0.01 V (0 = absent)
//! 38..44  MCC / MNC / LAC u16
//! 44..48  CID u32
//! ```
//!
//! Framing is fixed-length, so a short packet cannot reach the
//! decoder. No acknowledgement is sent.

use byteorder::{BigEndian, ByteOrder};

use super::timeparse::utc_from_ymd_hms;
use super::{translate_or_default, Decoded, RawPacket, StatusTranslator, DOLLAR_PACKET_LEN};
use crate::config::DialectConfig;
use crate::error::DecodeError;
use crate::fix::NormalizedFix;
use crate::types::{CellTower, GeoPoint, StatusCode};

const FLAG_GPS_VALID: u8 = 0x01;
const FLAG_HAS_CELL: u8 = 0x02;

/// Heading field value meaning "unknown".
const HEADING_UNKNOWN: u16 = 0xFFFF;

pub fn decode_dollar(
    raw: &RawPacket,
    config: &DialectConfig,
    translator: &dyn StatusTranslator,
) -> Result<Decoded, DecodeError> {
    let buf = &raw.bytes;
    if buf.len() != DOLLAR_PACKET_LEN || buf[0] != b'$' {
        return Err(DecodeError::BadLength {
            have: buf.len(),
            need: DOLLAR_PACKET_LEN,
        });
    }

    let modem_id = bcd_string(&buf[1..9])?;
    let flags = buf[9];

    let yy = bcd_value(buf[10])?;
    let month = bcd_value(buf[11])?;
    let day = bcd_value(buf[12])?;
    let hour = bcd_value(buf[13])?;
    let minute = bcd_value(buf[14])?;
    let second = bcd_value(buf[15])?;
    let timestamp = utc_from_ymd_hms(
        2000 + i32::from(yy),
        u32::from(month),
        u32::from(day),
        u32::from(hour),
        u32::from(minute),
        u32::from(second),
    )?;

    let lat = f64::from(BigEndian::read_i32(&buf[16..20])) * 1e-6;
    let lon = f64::from(BigEndian::read_i32(&buf[20..24])) * 1e-6;
    let speed = f64::from(BigEndian::read_u16(&buf[24..26])) / 10.0;
    let heading_raw = BigEndian::read_u16(&buf[26..28]);
    let altitude = f64::from(BigEndian::read_i16(&buf[28..30]));
    let odometer_raw = BigEndian::read_u32(&buf[30..34]);
    let input_mask = buf[34];
    let code = buf[35];
    let battery_raw = BigEndian::read_u16(&buf[36..38]);

    let mut fix = NormalizedFix::new(modem_id);
    fix.timestamp = timestamp;
    fix.point = GeoPoint::new(lat, lon);
    fix.valid = flags & FLAG_GPS_VALID != 0 && fix.point.is_valid();
    fix.speed_kmh = speed;
    fix.heading = (heading_raw != HEADING_UNKNOWN)
        .then(|| f64::from(heading_raw) / 10.0)
        .filter(|h| (0.0..360.0).contains(h));
    fix.altitude_m = altitude;
    fix.odometer_km = (odometer_raw != 0).then(|| f64::from(odometer_raw) / 10.0);
    fix.input_mask = Some(u32::from(input_mask));
    fix.battery_volts = (battery_raw != 0).then(|| f64::from(battery_raw) / 100.0);
    fix.clamp_min_speed(config.minimum_speed_kmh);

    if flags & FLAG_HAS_CELL != 0 {
        fix.cell = Some(CellTower {
            mcc: BigEndian::read_u16(&buf[38..40]),
            mnc: BigEndian::read_u16(&buf[40..42]),
            lac: BigEndian::read_u16(&buf[42..44]),
            cid: BigEndian::read_u32(&buf[44..48]),
        });
    }

    fix.status = if code == 0 {
        StatusCode::None
    } else {
        translate_or_default(translator, raw.dialect, &format!("{code:02X}"))
    };

    Ok(Decoded { fix, ack: None })
}

/// Decode one BCD byte into its two-digit value.
fn bcd_value(b: u8) -> Result<u8, DecodeError> {
    let high = b >> 4;
    let low = b & 0x0F;
    if high > 9 || low > 9 {
        return Err(DecodeError::InvalidBcd(b));
    }
    Ok(high * 10 + low)
}

/// Decode a BCD digit run into a decimal string, leading zeros
/// stripped (modem ids are zero-padded on the wire).
fn bcd_string(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        let value = bcd_value(b)?;
        out.push(char::from(b'0' + value / 10));
        out.push(char::from(b'0' + value % 10));
    }
    let trimmed = out.trim_start_matches('0');
    Ok(if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    })
}
