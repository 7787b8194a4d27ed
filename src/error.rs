//! Error types for Fleetwire.

use std::io;
use std::net::IpAddr;

use thiserror::Error;

/// Result type alias for Fleetwire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Fleetwire.
#[derive(Error, Debug)]
pub enum Error {
    // Packet-framing errors
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    // Dialect decode errors
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    // Device identity errors
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    // Persistence errors
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Packet framing errors.
#[derive(Error, Debug)]
pub enum FramingError {
    #[error("packet exceeds maximum length: {size} bytes (max {max})")]
    Oversized { size: usize, max: usize },

    #[error("no terminator within packet span")]
    MissingTerminator,

    #[error("unrecognized leading byte {0:#04x}")]
    UnknownLeadByte(u8),
}

/// Dialect decode errors.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("missing mandatory field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("checksum mismatch: frame carries {carried}, computed {computed}")]
    ChecksumMismatch { carried: String, computed: String },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid BCD nibble in byte {0:#04x}")]
    InvalidBcd(u8),

    #[error("packet is not valid ASCII")]
    NotAscii,

    #[error("packet length {have} does not match dialect layout ({need})")]
    BadLength { have: usize, need: usize },
}

/// Device identity resolution errors.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("unknown modem id {0:?}")]
    UnknownModem(String),

    #[error("unknown device {account}/{device}")]
    UnknownDevice { account: String, device: String },

    #[error("IP {ip} not authorized for device {device}")]
    IpNotAuthorized { device: String, ip: IpAddr },
}

/// Persistence collaborator errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("event write failed: {0}")]
    WriteFailed(String),

    #[error("device write-back failed: {0}")]
    WriteBackFailed(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Check if this error should flag the session for termination.
    ///
    /// Only an IP-authorization rejection is session-fatal; every other
    /// error drops at most the current packet.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            Error::Identity(IdentityError::IpNotAuthorized { .. })
        )
    }

    /// Check if the session may continue after this error.
    pub fn drops_packet_only(&self) -> bool {
        !self.is_session_fatal()
    }
}
