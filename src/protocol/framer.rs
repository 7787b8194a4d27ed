//! Packet framing: boundary decisions over an in-progress byte buffer.
//!
//! The framer is a pure function of the accumulated buffer and the
//! connection's sniffed-dialect state. The first unambiguous byte on a
//! connection fixes the dialect; later decisions default to that
//! dialect's rule.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

use super::{Dialect, RawPacket, DOLLAR_PACKET_LEN};
use crate::config::Config;
use crate::error::FramingError;

/// Boundary decision for an in-progress packet buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// At least `n` more bytes are required before a decision.
    NeedMore(usize),
    /// The packet spans exactly the first `len` buffered bytes; the
    /// transport waits until that many are available.
    Complete(usize),
    /// The first `n` bytes are inter-packet noise; drop them.
    Discard(usize),
    /// Line-oriented dialect: the packet ends at the next line
    /// terminator, which is consumed and stripped.
    ReadLine,
    /// Datagram-style framing: the packet is everything up to
    /// end-of-stream.
    ReadUntilEof,
}

/// Decide the boundary of the packet at the head of `buf`.
///
/// `sniffed` is the connection's device-type state: it is set on the
/// first recognizable byte and left untouched afterwards.
pub fn decide_boundary(buf: &[u8], sniffed: &mut Option<Dialect>, config: &Config) -> Boundary {
    let Some(&lead) = buf.first() else {
        return Boundary::NeedMore(1);
    };

    // Bytes below printable space between packets are noise, dropped
    // one at a time.
    if lead < b' ' {
        return Boundary::Discard(1);
    }

    let dialect = match *sniffed {
        Some(dialect) => dialect,
        None => match Dialect::sniff(lead) {
            Some(dialect) => {
                *sniffed = Some(dialect);
                dialect
            }
            None => {
                debug!(lead, "discarding unrecognized lead byte");
                return Boundary::Discard(1);
            }
        },
    };

    match dialect {
        Dialect::Csv => {
            if config.dialect(dialect).frame_to_eof {
                Boundary::ReadUntilEof
            } else {
                Boundary::ReadLine
            }
        }
        Dialect::Paren => until_terminator(buf, b')'),
        Dialect::Bracket => until_terminator(buf, b']'),
        Dialect::Dollar => Boundary::Complete(DOLLAR_PACKET_LEN),
    }
}

/// Terminator-delimited framing. The closing byte is part of the
/// packet span.
fn until_terminator(buf: &[u8], term: u8) -> Boundary {
    // Never test a single buffered byte for the terminator; requiring
    // two bytes first rules out a false-positive empty frame.
    if buf.len() < 2 {
        return Boundary::NeedMore(1);
    }
    match buf[1..].iter().position(|&b| b == term) {
        Some(i) => Boundary::Complete(i + 2),
        None => Boundary::NeedMore(1),
    }
}

/// Tokio codec adapter: applies [`decide_boundary`] to a stream buffer
/// and yields complete [`RawPacket`] values.
pub struct PacketCodec {
    config: Config,
    sniffed: Option<Dialect>,
    max_packet_len: usize,
}

impl PacketCodec {
    pub fn new(config: Config) -> Self {
        let max_packet_len = config.server.max_packet_len;
        Self {
            config,
            sniffed: None,
            max_packet_len,
        }
    }

    /// The dialect sniffed from the first recognizable byte, if any.
    pub fn sniffed(&self) -> Option<Dialect> {
        self.sniffed
    }

    fn check_len(&self, len: usize) -> Result<(), FramingError> {
        if len > self.max_packet_len {
            return Err(FramingError::Oversized {
                size: len,
                max: self.max_packet_len,
            });
        }
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = RawPacket;
    type Error = crate::Error;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            match decide_boundary(src, &mut self.sniffed, &self.config) {
                Boundary::Discard(n) => {
                    src.advance(n);
                }
                Boundary::NeedMore(_) => {
                    self.check_len(src.len())?;
                    return Ok(None);
                }
                Boundary::Complete(len) => {
                    self.check_len(len)?;
                    if src.len() < len {
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    let dialect = self.sniffed.expect("complete boundary without dialect");
                    let bytes = src.split_to(len).to_vec();
                    return Ok(Some(RawPacket::new(dialect, bytes)));
                }
                Boundary::ReadLine => {
                    let Some(end) = src.iter().position(|&b| b == b'\n') else {
                        self.check_len(src.len())?;
                        return Ok(None);
                    };
                    let mut line = src.split_to(end).to_vec();
                    src.advance(1);
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if line.is_empty() {
                        continue;
                    }
                    let dialect = self.sniffed.expect("line boundary without dialect");
                    return Ok(Some(RawPacket::new(dialect, line)));
                }
                Boundary::ReadUntilEof => {
                    // Finalized in decode_eof.
                    self.check_len(src.len())?;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(
        &mut self,
        src: &mut BytesMut,
    ) -> std::result::Result<Option<Self::Item>, Self::Error> {
        if let Some(packet) = self.decode(src)? {
            return Ok(Some(packet));
        }
        if src.is_empty() {
            return Ok(None);
        }

        match self.sniffed {
            // End-of-stream finalizes line/EOF framing: the remainder
            // is one packet, trailing terminator bytes stripped.
            Some(Dialect::Csv) => {
                let mut bytes = src.split_to(src.len()).to_vec();
                while matches!(bytes.last(), Some(b'\r' | b'\n')) {
                    bytes.pop();
                }
                if bytes.is_empty() {
                    return Ok(None);
                }
                Ok(Some(RawPacket::new(Dialect::Csv, bytes)))
            }
            // A delimited or fixed-length packet cut off mid-stream is
            // dropped as a framing error.
            Some(_) => {
                src.clear();
                Err(FramingError::MissingTerminator.into())
            }
            None => {
                src.clear();
                Ok(None)
            }
        }
    }
}
