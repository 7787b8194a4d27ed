//! TCP/UDP front-end for the device communication server.
//!
//! Each TCP connection is handled by one task for its entire lifetime;
//! packet handling within a connection is strictly sequential (frame,
//! decode, pipeline, respond, await next bytes). UDP treats every
//! datagram as one complete packet buffer with its own short-lived
//! session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::protocol::PacketCodec;
use crate::session::SessionController;
use crate::store::TelemetryStore;

/// The device communication server.
pub struct Server<S> {
    listener: TcpListener,
    udp: Option<UdpSocket>,
    config: Arc<Config>,
    store: Arc<S>,
    shutdown_tx: broadcast::Sender<()>,
    active: Arc<AtomicUsize>,
}

/// Handle for stopping a running server.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }
}

impl<S: TelemetryStore + 'static> Server<S> {
    /// Bind the configured listen addresses.
    pub async fn bind(config: Config, store: Arc<S>) -> Result<Self> {
        let listener = create_listener(config.server.listen_addr)?;
        let udp = match config.server.udp_addr {
            Some(addr) => Some(UdpSocket::bind(addr).await?),
            None => None,
        };
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            listener,
            udp,
            config: Arc::new(config),
            store,
            shutdown_tx,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound TCP address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Obtain a shutdown handle before starting the accept loop.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Accept connections until shut down.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "device server listening");

        if let Some(udp) = self.udp {
            let config = Arc::clone(&self.config);
            let store = Arc::clone(&self.store);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            tokio::spawn(async move {
                tokio::select! {
                    result = run_udp(udp, config, store) => {
                        if let Err(e) = result {
                            warn!("UDP handler stopped: {e}");
                        }
                    }
                    _ = shutdown_rx.recv() => {}
                }
            });
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            let (stream, remote) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = shutdown_rx.recv() => break,
            };

            if self.active.load(Ordering::Relaxed) >= self.config.server.max_connections {
                warn!(%remote, "connection limit reached, dropping connection");
                continue;
            }

            if self.config.server.tcp_nodelay {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%remote, "failed to set nodelay: {e}");
                }
            }

            let config = Arc::clone(&self.config);
            let store = Arc::clone(&self.store);
            let active = Arc::clone(&self.active);
            active.fetch_add(1, Ordering::Relaxed);

            tokio::spawn(async move {
                let mut controller = SessionController::new(remote, Arc::clone(&config), store);
                let result = handle_connection(stream, &config, &mut controller).await;
                match result {
                    Ok((read, written)) => controller.on_session_end(None, read, written),
                    Err(e) => controller.on_session_end(Some(&e), 0, 0),
                }
                active.fetch_sub(1, Ordering::Relaxed);
            });
        }

        info!("device server stopped");
        Ok(())
    }
}

/// Read, frame and handle packets for one connection. Returns the
/// packet read/write counts for the session-end log.
async fn handle_connection<S: TelemetryStore>(
    mut stream: TcpStream,
    config: &Config,
    controller: &mut SessionController<S>,
) -> Result<(u64, u64)> {
    let idle = config.server.idle_timeout;
    let mut codec = PacketCodec::new(config.clone());
    let mut buf = BytesMut::with_capacity(1024);
    let mut read_count = 0u64;
    let mut write_count = 0u64;
    let mut eof = false;

    'session: loop {
        // Drain every complete packet currently buffered.
        loop {
            let packet = if eof {
                codec.decode_eof(&mut buf)?
            } else {
                codec.decode(&mut buf)?
            };
            let Some(packet) = packet else { break };

            read_count += 1;
            match controller.on_packet(&packet.bytes).await {
                Ok(Some(ack)) => {
                    stream.write_all(&ack).await?;
                    write_count += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    // Packet-level failure: drop and continue unless the
                    // error is session-fatal.
                    warn!("packet dropped: {e}");
                    if e.is_session_fatal() {
                        break 'session;
                    }
                }
            }
            if controller.should_terminate() {
                break 'session;
            }
        }

        if eof {
            break;
        }

        match timeout(idle, stream.read_buf(&mut buf)).await {
            Ok(Ok(0)) => eof = true,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                debug!("idle timeout, closing session");
                break;
            }
        }
    }

    Ok((read_count, write_count))
}

/// Handle datagrams: each one is a complete packet buffer with a
/// short-lived session of its own.
async fn run_udp<S: TelemetryStore>(
    socket: UdpSocket,
    config: Arc<Config>,
    store: Arc<S>,
) -> Result<()> {
    info!(addr = %socket.local_addr()?, "UDP handler listening");
    let mut buf = vec![0u8; 65536];

    loop {
        let (len, remote) = socket.recv_from(&mut buf).await?;
        let mut controller = SessionController::new(remote, Arc::clone(&config), Arc::clone(&store));
        let mut codec = PacketCodec::new(config.as_ref().clone());
        let mut bytes = BytesMut::from(&buf[..len]);
        let mut read_count = 0u64;
        let mut write_count = 0u64;

        loop {
            let packet = match codec.decode(&mut bytes) {
                Ok(Some(packet)) => Some(packet),
                Ok(None) => match codec.decode_eof(&mut bytes) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!(%remote, "datagram framing failed: {e}");
                        None
                    }
                },
                Err(e) => {
                    warn!(%remote, "datagram framing failed: {e}");
                    None
                }
            };
            let Some(packet) = packet else { break };

            read_count += 1;
            match controller.on_packet(&packet.bytes).await {
                Ok(Some(ack)) => {
                    let _ = socket.send_to(&ack, remote).await;
                    write_count += 1;
                }
                Ok(None) => {}
                Err(e) => warn!(%remote, "datagram packet dropped: {e}"),
            }
            if controller.should_terminate() {
                break;
            }
        }

        controller.on_session_end(None, read_count, write_count);
    }
}

/// Create a TCP listener with reuse-addr set, non-blocking, ready for
/// tokio.
fn create_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;

    Ok(TcpListener::from_std(socket.into())?)
}
