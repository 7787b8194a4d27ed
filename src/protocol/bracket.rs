//! Bracket-delimited dialect: ASCII fields with hex subfields, an XOR
//! frame checksum and a sequenced acknowledgement.
//!
//! ```text
//! [PT<seq>,<modem>,<hhmmss>,<A|V>,<DDmm.mmmmN>,<DDDmm.mmmmE>,<speed>,<heading>,<alt>,<io>,<code>*<ck>]
//! ```
//!
//! `<ck>` is the XOR of every byte after `[` up to (not including)
//! `*`, as two uppercase hex digits. Only a GMT time-of-day is
//! reported; the UTC day is inferred from the current day. Every
//! successfully decoded packet is answered with `[ACK<seq>*<ck>]`,
//! echoing the sequence number.

use chrono::Utc;

use super::checksum::xor_checksum_hex;
use super::coords::{parse_degrees_minutes, Axis};
use super::timeparse::{parse_hhmmss, utc_day_for_time_of_day};
use super::{translate_or_default, Decoded, RawPacket, StatusTranslator};
use crate::config::DialectConfig;
use crate::error::DecodeError;
use crate::fix::NormalizedFix;
use crate::types::{GeoPoint, StatusCode};

/// Position-report packet type tag.
const TYPE_POSITION: &str = "PT";

pub fn decode_bracket(
    raw: &RawPacket,
    config: &DialectConfig,
    translator: &dyn StatusTranslator,
) -> Result<Decoded, DecodeError> {
    let text = raw.as_ascii()?;
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .ok_or(DecodeError::MissingField("frame delimiters"))?;

    let (body, carried) = inner
        .rsplit_once('*')
        .ok_or(DecodeError::MissingField("checksum"))?;

    let computed = xor_checksum_hex(body.as_bytes());
    if !carried.eq_ignore_ascii_case(&computed) {
        return Err(DecodeError::ChecksumMismatch {
            carried: carried.to_string(),
            computed,
        });
    }

    let fields: Vec<&str> = body.split(',').collect();
    if fields.len() < 11 {
        return Err(DecodeError::MissingField("event code"));
    }

    let head = fields[0];
    if head.len() != 4 || !head.starts_with(TYPE_POSITION) {
        return Err(DecodeError::InvalidField {
            field: "packet type",
            value: head.to_string(),
        });
    }
    let seq = u8::from_str_radix(&head[2..4], 16).map_err(|_| DecodeError::InvalidField {
        field: "sequence",
        value: head[2..4].to_string(),
    })?;

    let modem_id = fields[1];
    if modem_id.is_empty() || !modem_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidField {
            field: "modem_id",
            value: modem_id.to_string(),
        });
    }

    let tod = parse_hhmmss(fields[2])?;
    let validity = match fields[3] {
        "A" => true,
        "V" => false,
        other => {
            return Err(DecodeError::InvalidField {
                field: "validity",
                value: other.to_string(),
            })
        }
    };

    let (lat_field, lat_hemi) = split_trailing_hemisphere(fields[4])?;
    let (lon_field, lon_hemi) = split_trailing_hemisphere(fields[5])?;
    let lat = parse_degrees_minutes(lat_field, lat_hemi, Axis::Latitude)?;
    let lon = parse_degrees_minutes(lon_field, lon_hemi, Axis::Longitude)?;

    let speed = parse_f64("speed", fields[6])?.max(0.0);
    let heading = parse_f64("heading", fields[7])?;
    let altitude = parse_f64("altitude", fields[8])?;
    let io = u32::from_str_radix(fields[9], 16).map_err(|_| DecodeError::InvalidField {
        field: "input_mask",
        value: fields[9].to_string(),
    })?;
    let code = fields[10];

    let mut fix = NormalizedFix::new(modem_id);
    fix.timestamp = utc_day_for_time_of_day(Utc::now(), tod);
    fix.point = GeoPoint::new(lat, lon);
    fix.valid = validity && fix.point.is_valid();
    fix.speed_kmh = speed;
    fix.heading = (0.0..360.0).contains(&heading).then_some(heading);
    fix.altitude_m = altitude;
    fix.input_mask = Some(io);
    fix.clamp_min_speed(config.minimum_speed_kmh);

    // Code 00 is this dialect's "no specific event" marker.
    fix.status = if code == "00" {
        StatusCode::None
    } else {
        translate_or_default(translator, raw.dialect, code)
    };

    Ok(Decoded {
        fix,
        ack: Some(ack_for_sequence(seq)),
    })
}

/// Build the `[ACK<seq>*<ck>]` reply for a sequence number.
pub fn ack_for_sequence(seq: u8) -> Vec<u8> {
    let body = format!("ACK{seq:02X}");
    let ck = xor_checksum_hex(body.as_bytes());
    format!("[{body}*{ck}]").into_bytes()
}

fn split_trailing_hemisphere(s: &str) -> Result<(&str, char), DecodeError> {
    let hemi = s.chars().last().ok_or(DecodeError::MissingField("coordinate"))?;
    if !hemi.is_ascii_alphabetic() {
        return Err(DecodeError::InvalidField {
            field: "hemisphere",
            value: s.to_string(),
        });
    }
    Ok((&s[..s.len() - 1], hemi))
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidField {
        field,
        value: value.to_string(),
    })
}
