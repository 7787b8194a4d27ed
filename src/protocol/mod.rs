//! Wire protocols for the supported tracker dialects.
//!
//! Four vendor dialects are unified behind one framing contract and one
//! decode contract:
//!
//! ```text
//! lead byte   dialect   framing                      ack
//! 0-9         Csv       line-terminated (or EOF)     none
//! (           Paren     read until ')'               literal / NAK
//! [           Bracket   read until ']'               checksum + seq echo
//! $           Dollar    fixed length (48 bytes)      none
//! ```
//!
//! Dialect recognition is by leading byte; the first unambiguous byte
//! on a connection fixes the dialect for the rest of the session.

mod bracket;
mod checksum;
mod coords;
mod csv;
mod dollar;
mod framer;
mod paren;
mod timeparse;

pub use bracket::decode_bracket;
pub use checksum::{xor_checksum, xor_checksum_hex};
pub use coords::{format_degrees_minutes, parse_degrees_minutes, Axis};
pub use csv::decode_csv;
pub use dollar::decode_dollar;
pub use framer::{decide_boundary, Boundary, PacketCodec};
pub use paren::decode_paren;
pub use timeparse::{reconcile_day, utc_day_for_time_of_day};

use std::fmt;

use crate::config::DialectConfig;
use crate::error::DecodeError;
use crate::fix::NormalizedFix;
use crate::types::StatusCode;

/// Fixed length of one Dollar-dialect binary packet.
pub const DOLLAR_PACKET_LEN: usize = 48;

/// Closed set of recognized vendor dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Comma-delimited ASCII, line-oriented, digit lead byte.
    Csv,
    /// Parenthesis-delimited ASCII, packed and list sub-variants.
    Paren,
    /// Bracket-delimited ASCII with hex subfields and XOR checksum.
    Bracket,
    /// Dollar-prefixed fixed-length binary.
    Dollar,
}

impl Dialect {
    /// Every recognized dialect, in sniffing-precedence order.
    pub const ALL: [Dialect; 4] = [
        Dialect::Csv,
        Dialect::Paren,
        Dialect::Bracket,
        Dialect::Dollar,
    ];

    /// Recognize a dialect from the first byte of a packet.
    pub fn sniff(lead: u8) -> Option<Self> {
        match lead {
            b'0'..=b'9' => Some(Self::Csv),
            b'(' => Some(Self::Paren),
            b'[' => Some(Self::Bracket),
            b'$' => Some(Self::Dollar),
            _ => None,
        }
    }

    /// Decode one complete raw packet of this dialect.
    pub fn decode(
        self,
        raw: &RawPacket,
        config: &DialectConfig,
        translator: &dyn StatusTranslator,
    ) -> Result<Decoded, DecodeError> {
        match self {
            Self::Csv => decode_csv(raw, config, translator),
            Self::Paren => decode_paren(raw, config, translator),
            Self::Bracket => decode_bracket(raw, config, translator),
            Self::Dollar => decode_dollar(raw, config, translator),
        }
    }

    /// The negative-acknowledgement token mandated by this dialect's
    /// protocol, if it defines one. Returned to the device when a
    /// packet of this dialect fails to decode.
    pub fn nak(self) -> Option<Vec<u8>> {
        match self {
            Self::Paren => Some(b"(AE01)".to_vec()),
            Self::Csv | Self::Bracket | Self::Dollar => None,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Paren => write!(f, "paren"),
            Self::Bracket => write!(f, "bracket"),
            Self::Dollar => write!(f, "dollar"),
        }
    }
}

/// One complete raw packet as delimited by the framer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Dialect the packet was framed under.
    pub dialect: Dialect,
    /// Packet bytes. Line framing strips the terminator; delimiter
    /// framing keeps the closing byte.
    pub bytes: Vec<u8>,
}

impl RawPacket {
    pub fn new(dialect: Dialect, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            dialect,
            bytes: bytes.into(),
        }
    }

    /// View the packet as ASCII text.
    pub fn as_ascii(&self) -> Result<&str, DecodeError> {
        if !self.bytes.is_ascii() {
            return Err(DecodeError::NotAscii);
        }
        std::str::from_utf8(&self.bytes).map_err(|_| DecodeError::NotAscii)
    }
}

/// Decode result: one normalized fix plus an optional immediate
/// response for the device.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub fix: NormalizedFix,
    pub ack: Option<Vec<u8>>,
}

/// External event-code translation table.
///
/// Maps a dialect-specific code (string or stringified byte) to the
/// shared status-code enumeration. `None` means "unmapped"; callers
/// apply [`StatusCode::UNMAPPED_DEFAULT`] explicitly.
pub trait StatusTranslator: Send + Sync {
    fn translate_status(&self, dialect: Dialect, code: &str) -> Option<StatusCode>;
}

/// Translate a dialect event code, falling back to the named default
/// for unmapped codes.
pub fn translate_or_default(
    translator: &dyn StatusTranslator,
    dialect: Dialect,
    code: &str,
) -> StatusCode {
    translator
        .translate_status(dialect, code)
        .unwrap_or(StatusCode::UNMAPPED_DEFAULT)
}
