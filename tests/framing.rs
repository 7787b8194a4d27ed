//! Framer boundary properties across the recognized dialects.

use bytes::BytesMut;
use fleetwire::config::Config;
use fleetwire::protocol::{
    decide_boundary, xor_checksum_hex, Boundary, Dialect, PacketCodec, DOLLAR_PACKET_LEN,
};
use tokio_util::codec::Decoder;

/// Feed a packet one byte at a time: every recognized dialect must
/// eventually produce a boundary covering exactly the packet span.
#[test]
fn byte_at_a_time_framing_terminates() {
    let config = Config::default();
    let cases: [(&[u8], Dialect); 2] = [
        (b"(013612345678BR00ABCDEF)", Dialect::Paren),
        (b"[PT01,861,074726,A,1N,1E,0,0,0,00,00*5A]", Dialect::Bracket),
    ];

    for (packet, dialect) in cases {
        let mut sniffed = None;
        let mut complete = None;
        for end in 1..=packet.len() {
            match decide_boundary(&packet[..end], &mut sniffed, &config) {
                Boundary::Complete(len) => {
                    complete = Some(len);
                    break;
                }
                Boundary::NeedMore(n) => assert!(n >= 1),
                other => panic!("unexpected boundary {other:?} for {dialect}"),
            }
        }
        assert_eq!(sniffed, Some(dialect));
        // The span covers the whole packet including its terminator.
        assert_eq!(complete, Some(packet.len()), "dialect {dialect}");
    }
}

/// The fixed-length dialect decides its boundary from the first byte,
/// and binary payload bytes that look like other dialects' terminators
/// must not end the packet early.
#[test]
fn dollar_framing_ignores_embedded_delimiters() {
    let config = Config::default();
    let mut sniffed = None;

    let mut packet = vec![b'$'];
    packet.extend_from_slice(b")]\r\n(");
    assert_eq!(
        decide_boundary(&packet, &mut sniffed, &config),
        Boundary::Complete(DOLLAR_PACKET_LEN)
    );
    assert_eq!(sniffed, Some(Dialect::Dollar));
}

/// A codec over a single stream must carve out back-to-back packets of
/// the sniffed dialect, skipping inter-packet line noise.
#[test]
fn stream_of_packets_with_noise() {
    let mut codec = PacketCodec::new(Config::default());
    let mut buf = BytesMut::new();

    buf.extend_from_slice(b"\r\n(first)\r\n(second)\x01(third)");
    let mut seen = Vec::new();
    while let Some(packet) = codec.decode(&mut buf).unwrap() {
        seen.push(packet.bytes);
    }
    assert_eq!(
        seen,
        vec![b"(first)".to_vec(), b"(second)".to_vec(), b"(third)".to_vec()]
    );
}

/// Line framing excludes the terminator from the packet; delimiter
/// framing includes it.
#[test]
fn terminator_inclusion_contract_per_dialect() {
    let mut codec = PacketCodec::new(Config::default());
    let mut buf = BytesMut::from(&b"123,abc\r\n"[..]);
    let line = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(line.bytes, b"123,abc");

    let mut codec = PacketCodec::new(Config::default());
    let mut buf = BytesMut::from(&b"[body*00]"[..]);
    let framed = codec.decode(&mut buf).unwrap().unwrap();
    assert!(framed.bytes.ends_with(b"]"));
}

/// A well-formed frame built with the library checksum must carry the
/// checksum the decoder computes.
#[test]
fn checksum_round_trip_on_synthetic_frame() {
    let body = "PT07,8613001234,074726,A,3536.2400N,14217.7480W,27.0,224.8,15.0,03,01";
    let frame = format!("[{body}*{}]", xor_checksum_hex(body.as_bytes()));

    let inner = frame.strip_prefix('[').unwrap().strip_suffix(']').unwrap();
    let (payload, carried) = inner.rsplit_once('*').unwrap();
    assert_eq!(carried, xor_checksum_hex(payload.as_bytes()));
}
