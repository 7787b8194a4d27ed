//! End-to-end scenarios through the session controller, the in-memory
//! store and the TCP/UDP front-ends.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use chrono::{TimeZone, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use fleetwire::config::Config;
use fleetwire::protocol::{xor_checksum_hex, DOLLAR_PACKET_LEN};
use fleetwire::server::Server;
use fleetwire::session::SessionController;
use fleetwire::store::{DeviceIdentity, MemoryStore, PersistedEvent};
use fleetwire::types::{DeviceKey, GeoPoint, StatusCode};

fn remote() -> SocketAddr {
    "203.0.113.7:40001".parse().unwrap()
}

fn store_with(modem: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.register(
        DeviceIdentity::new(DeviceKey::new("acme", "truck-7"), modem),
        Vec::new(),
    );
    store
}

fn controller(
    store: &Arc<MemoryStore>,
    config: Config,
) -> SessionController<MemoryStore> {
    SessionController::new(remote(), Arc::new(config), Arc::clone(store))
}

/// Scenario A: a comma-delimited ASCII report decodes to a valid fix at
/// the given UTC timestamp and persists exactly one location event.
#[tokio::test]
async fn scenario_a_csv_location_report() {
    let store = store_with("123456789012345");
    let mut controller = controller(&store, Config::default());

    let ack = controller
        .on_packet(b"123456789012345,2006/09/05,07:47:26,35.3640,-142.2958,27.0,224.8")
        .await
        .unwrap();
    assert!(ack.is_none());

    let events = store.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];

    let expected = Utc.with_ymd_and_hms(2006, 9, 5, 7, 47, 26).unwrap();
    assert_eq!(event.timestamp, expected.timestamp());
    assert_eq!(event.status, StatusCode::Location);
    assert!(event.fix.valid);
    assert_eq!(event.fix.speed_kmh, 27.0);
    assert_eq!(event.fix.heading, Some(224.8));
}

/// Scenario A with the location-to-in-motion translation enabled: the
/// same packet persists an in-motion event instead.
#[tokio::test]
async fn scenario_a_with_in_motion_translation() {
    let store = store_with("123456789012345");
    let mut config = Config::default();
    config.dialect.defaults.location_to_in_motion = true;
    let mut controller = controller(&store, config);

    controller
        .on_packet(b"123456789012345,2006/09/05,07:47:26,35.3640,-142.2958,27.0,224.8")
        .await
        .unwrap();

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, StatusCode::InMotion);
}

/// Scenario B: local 23:58 with GMT 00:02 resolves to the GMT day
/// being one day after the local day.
#[tokio::test]
async fn scenario_b_day_rollover() {
    let store = store_with("013612345678");
    let mut controller = controller(&store, Config::default());

    let packet = b"(013612345678BR00240310235800A3536.2400N14217.7480W002700002000224.8)";
    controller.on_packet(packet).await.unwrap();

    let events = store.events();
    assert_eq!(events.len(), 1);
    let expected = Utc.with_ymd_and_hms(2024, 3, 11, 0, 2, 0).unwrap();
    assert_eq!(events[0].timestamp, expected.timestamp());
}

fn bracket_packet(seq: u8, io: u8, lat: &str) -> Vec<u8> {
    let body = format!(
        "PT{seq:02X},8613001234,074726,A,{lat}N,14217.7480W,50.0,90.0,10.0,{io:02X},01"
    );
    format!("[{body}*{}]", xor_checksum_hex(body.as_bytes())).into_bytes()
}

/// Scenario C: an input mask changing 0x01 -> 0x03 with interest mask
/// 0xFF synthesizes exactly one input-on event for bit 1 and stores
/// the new mask.
#[tokio::test]
async fn scenario_c_input_edge() {
    let store = store_with("8613001234");
    let mut controller = controller(&store, Config::default());

    controller
        .on_packet(&bracket_packet(1, 0x01, "3536.2400"))
        .await
        .unwrap();
    controller
        .on_packet(&bracket_packet(2, 0x03, "4536.2400"))
        .await
        .unwrap();

    let input_events: Vec<PersistedEvent> = store
        .events()
        .into_iter()
        .filter(|e| matches!(e.status, StatusCode::InputOn(_) | StatusCode::InputOff(_)))
        .collect();

    assert_eq!(input_events.len(), 1);
    assert_eq!(input_events[0].status, StatusCode::InputOn(1));
    assert_eq!(input_events[0].timestamp, input_events[0].fix.timestamp);

    let device = store
        .device(&DeviceKey::new("acme", "truck-7"))
        .unwrap();
    assert_eq!(device.input_mask, Some(0x03));
}

fn dollar_packet(modem: &str, flags: u8, code: u8) -> Vec<u8> {
    let mut buf = vec![0u8; DOLLAR_PACKET_LEN];
    buf[0] = b'$';
    let digits = format!("{modem:0>16}");
    for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
        buf[1 + i] = ((pair[0] - b'0') << 4) | (pair[1] - b'0');
    }
    buf[9] = flags;
    for (i, pair) in b"240310074726".chunks(2).enumerate() {
        buf[10 + i] = ((pair[0] - b'0') << 4) | (pair[1] - b'0');
    }
    // Zeroed coordinates, speed, heading unknown.
    BigEndian::write_u16(&mut buf[26..28], 0xFFFF);
    buf[35] = code;
    // Cell descriptor fields.
    BigEndian::write_u16(&mut buf[38..40], 310);
    BigEndian::write_u16(&mut buf[40..42], 410);
    BigEndian::write_u16(&mut buf[42..44], 0x1A2B);
    BigEndian::write_u32(&mut buf[44..48], 0x00C3D4E5);
    buf
}

/// Scenario D: an invalid-GPS fix with fallback disabled and a serving
/// cell tower present persists a cell-location event with zeroed
/// coordinates.
#[tokio::test]
async fn scenario_d_cell_tower_fallback() {
    let store = store_with("861300123456789");
    let mut config = Config::default();
    config.dialect.defaults.use_last_valid_fix = false;
    let mut controller = controller(&store, config);

    // flags: bit1 = cell present, GPS not valid.
    controller
        .on_packet(&dollar_packet("861300123456789", 0x02, 0))
        .await
        .unwrap();

    let events = store.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.status, StatusCode::CellLocation);
    assert_eq!(event.fix.point, GeoPoint::ZERO);
    assert!(!event.fix.valid);
    let cell = event.fix.cell.unwrap();
    assert_eq!((cell.mcc, cell.mnc), (310, 410));
}

/// Full TCP round trip: framed bracket packet in, sequenced ack out,
/// event persisted.
#[tokio::test]
async fn tcp_round_trip_with_ack() {
    let store = store_with("8613001234");
    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1:0".parse().unwrap();

    let server = Server::bind(config, Arc::clone(&store)).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&bracket_packet(0x2A, 0x00, "3536.2400"))
        .await
        .unwrap();

    let mut ack = vec![0u8; 64];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut ack))
        .await
        .unwrap()
        .unwrap();
    let expected = format!("[ACK2A*{}]", xor_checksum_hex(b"ACK2A"));
    assert_eq!(&ack[..n], expected.as_bytes());

    drop(stream);
    // The connection task persists before acking, but give the event
    // log a moment on slow runners.
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.events().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(store.events().len(), 1);

    shutdown.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}

/// UDP datagrams are complete packet buffers with per-datagram
/// sessions.
#[tokio::test]
async fn udp_datagram_session() {
    let store = store_with("123456789012345");
    let mut config = Config::default();
    config.server.listen_addr = "127.0.0.1:0".parse().unwrap();
    config.server.udp_addr = Some("127.0.0.1:0".parse().unwrap());

    // Rebind the UDP socket on a known port by asking the OS first.
    let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let udp_addr = probe.local_addr().unwrap();
    drop(probe);
    config.server.udp_addr = Some(udp_addr);

    let server = Server::bind(config, Arc::clone(&store)).await.unwrap();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(
            b"123456789012345,2006/09/05,07:47:26,35.3640,-142.2958,27.0,224.8\r\n",
            udp_addr,
        )
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.events().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, StatusCode::Location);

    shutdown.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
}

/// Determinism property: replaying the identical packet sequence
/// against a freshly seeded store yields the identical ordered event
/// stream.
#[tokio::test]
async fn replay_determinism() {
    let run_once = || async {
        let store = store_with("8613001234");
        let mut controller = controller(&store, Config::default());
        controller
            .on_packet(&bracket_packet(1, 0x00, "3536.2400"))
            .await
            .unwrap();
        controller
            .on_packet(&bracket_packet(2, 0x07, "4536.2400"))
            .await
            .unwrap();
        store
            .events()
            .into_iter()
            .map(|e| (e.timestamp, e.status))
            .collect::<Vec<_>>()
    };

    let first = run_once().await;
    let second = run_once().await;
    assert_eq!(first, second);
    assert!(!first.is_empty());
}
