//! Parenthesis-delimited dialect, packed and list sub-variants.
//!
//! Both sub-variants share the `(` lead byte and `)` terminator; a
//! comma anywhere in the body selects the list layout. The packed
//! layout reports a local timestamp plus a separate GMT time-of-day
//! and needs day reconciliation; the list layout is plain GMT.
//!
//! This is the one dialect whose protocol mandates a negative
//! acknowledgement (`(AE01)`) on decode failure.

use super::coords::{parse_degrees_minutes, Axis};
use super::timeparse::{parse_hhmmss, parse_yymmdd, reconcile_day};
use super::{translate_or_default, Decoded, RawPacket, StatusTranslator};
use crate::config::DialectConfig;
use crate::error::DecodeError;
use crate::fix::NormalizedFix;
use crate::types::GeoPoint;

/// Login command answered with an `AP05` acknowledgement.
const CMD_LOGIN: &str = "BP05";

/// Packed body length without and with the trailing input-mask field.
const PACKED_LEN: usize = 67;
const PACKED_LEN_IO: usize = 75;

pub fn decode_paren(
    raw: &RawPacket,
    config: &DialectConfig,
    translator: &dyn StatusTranslator,
) -> Result<Decoded, DecodeError> {
    let text = raw.as_ascii()?;
    let body = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or(DecodeError::MissingField("frame delimiters"))?;

    // Sub-variant disambiguation: a comma before the closing delimiter
    // selects the list layout.
    if body.contains(',') {
        decode_list(raw, body, config, translator)
    } else {
        decode_packed(raw, body, config, translator)
    }
}

fn decode_packed(
    raw: &RawPacket,
    body: &str,
    config: &DialectConfig,
    translator: &dyn StatusTranslator,
) -> Result<Decoded, DecodeError> {
    if body.len() != PACKED_LEN && body.len() != PACKED_LEN_IO {
        return Err(DecodeError::BadLength {
            have: body.len(),
            need: PACKED_LEN,
        });
    }

    let modem_id = &body[0..12];
    if !modem_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidField {
            field: "modem_id",
            value: modem_id.to_string(),
        });
    }

    let cmd = &body[12..16];
    let local_date = parse_yymmdd(&body[16..22])?;
    let local_tod = parse_hhmmss(&body[22..28])?;
    let validity = parse_validity(&body[28..29])?;
    let lat = parse_degrees_minutes(&body[29..38], char_at(body, 38), Axis::Latitude)?;
    let lon = parse_degrees_minutes(&body[39..49], char_at(body, 49), Axis::Longitude)?;
    let speed = parse_implied_decimal(&body[50..55])?;
    let gmt_tod = parse_hhmmss(&body[55..61])?;
    let heading: f64 = body[61..67].parse().map_err(|_| DecodeError::InvalidField {
        field: "heading",
        value: body[61..67].to_string(),
    })?;

    let mut fix = NormalizedFix::new(modem_id);
    fix.timestamp = reconcile_day(local_date, local_tod, gmt_tod);
    fix.point = GeoPoint::new(lat, lon);
    fix.valid = validity && fix.point.is_valid();
    fix.speed_kmh = speed;
    fix.heading = (0.0..360.0).contains(&heading).then_some(heading);
    fix.clamp_min_speed(config.minimum_speed_kmh);
    fix.status = translate_or_default(translator, raw.dialect, cmd);

    if body.len() == PACKED_LEN_IO {
        fix.input_mask = Some(parse_hex_u32("input_mask", &body[67..75])?);
    }

    let ack = (cmd == CMD_LOGIN).then(|| format!("({modem_id}AP05)").into_bytes());
    Ok(Decoded { fix, ack })
}

fn decode_list(
    raw: &RawPacket,
    body: &str,
    config: &DialectConfig,
    translator: &dyn StatusTranslator,
) -> Result<Decoded, DecodeError> {
    let fields: Vec<&str> = body.split(',').map(str::trim).collect();
    if fields.len() < 11 {
        return Err(DecodeError::MissingField("heading"));
    }

    let modem_id = fields[0];
    if modem_id.is_empty() || !modem_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidField {
            field: "modem_id",
            value: modem_id.to_string(),
        });
    }

    let cmd = fields[1];
    let date = parse_yymmdd(fields[2])?;
    let tod = parse_hhmmss(fields[3])?;
    let validity = parse_validity(fields[4])?;
    let lat = parse_degrees_minutes(fields[5], single_char(fields[6], "lat_hemisphere")?, Axis::Latitude)?;
    let lon = parse_degrees_minutes(fields[7], single_char(fields[8], "lon_hemisphere")?, Axis::Longitude)?;
    let speed: f64 = fields[9].parse().map_err(|_| DecodeError::InvalidField {
        field: "speed",
        value: fields[9].to_string(),
    })?;
    let heading: f64 = fields[10].parse().map_err(|_| DecodeError::InvalidField {
        field: "heading",
        value: fields[10].to_string(),
    })?;

    let mut fix = NormalizedFix::new(modem_id);
    fix.timestamp = date.and_time(tod).and_utc().timestamp();
    fix.point = GeoPoint::new(lat, lon);
    fix.valid = validity && fix.point.is_valid();
    fix.speed_kmh = speed.max(0.0);
    fix.heading = (0.0..360.0).contains(&heading).then_some(heading);
    fix.clamp_min_speed(config.minimum_speed_kmh);
    fix.status = translate_or_default(translator, raw.dialect, cmd);

    if let Some(io) = fields.get(11) {
        fix.input_mask = Some(parse_hex_u32("input_mask", io)?);
    }
    if let Some(odom) = fields.get(12) {
        fix.odometer_km = Some(odom.parse().map_err(|_| DecodeError::InvalidField {
            field: "odometer",
            value: (*odom).to_string(),
        })?);
    }
    if let Some(temp) = fields.get(13) {
        fix.engine_temp_c = Some(temp.parse().map_err(|_| DecodeError::InvalidField {
            field: "engine_temp",
            value: (*temp).to_string(),
        })?);
    }
    // OBD fault codes, pipe-separated.
    if let Some(faults) = fields.get(14) {
        fix.fault_codes = faults
            .split('|')
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect();
    }

    Ok(Decoded {
        fix,
        ack: Some(b"(OK)".to_vec()),
    })
}

fn parse_validity(s: &str) -> Result<bool, DecodeError> {
    match s {
        "A" => Ok(true),
        "V" => Ok(false),
        other => Err(DecodeError::InvalidField {
            field: "validity",
            value: other.to_string(),
        }),
    }
}

fn parse_implied_decimal(s: &str) -> Result<f64, DecodeError> {
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidField {
            field: "speed",
            value: s.to_string(),
        });
    }
    Ok(s.parse::<f64>().unwrap_or(0.0) / 10.0)
}

fn parse_hex_u32(field: &'static str, s: &str) -> Result<u32, DecodeError> {
    u32::from_str_radix(s, 16).map_err(|_| DecodeError::InvalidField {
        field,
        value: s.to_string(),
    })
}

fn single_char(s: &str, field: &'static str) -> Result<char, DecodeError> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(DecodeError::InvalidField {
            field,
            value: s.to_string(),
        }),
    }
}

fn char_at(s: &str, idx: usize) -> char {
    s.as_bytes()[idx] as char
}
