//! Per-connection session state and the controller that sequences
//! Framer -> Decoder -> Pipeline -> Response for each packet.
//!
//! A `Session` is owned exclusively by its connection handler and
//! never shared across connections, so none of its state needs
//! locking.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, FramingError, IdentityError, Result};
use crate::pipeline::Pipeline;
use crate::protocol::{decide_boundary, Boundary, Dialect, RawPacket};
use crate::store::TelemetryStore;
use crate::types::SessionId;

/// Ephemeral per-connection state.
#[derive(Debug)]
pub struct Session {
    /// Session identifier.
    pub id: SessionId,
    /// Remote peer address.
    pub remote: SocketAddr,
    /// Device type sniffed from the first recognizable byte.
    pub dialect: Option<Dialect>,
    /// Modem id seen in the most recent decoded packet.
    pub last_modem_id: Option<String>,
    /// Account/device-scoped label, set once the device resolves.
    pub device_label: Option<String>,
    /// Events persisted over the connection's lifetime.
    pub event_count: u64,
    /// Set when the session must be dropped after the current packet.
    pub terminate: bool,
    /// Connection start time.
    pub started_at: Instant,
}

impl Session {
    pub fn new(remote: SocketAddr) -> Self {
        Self {
            id: SessionId::generate(),
            remote,
            dialect: None,
            last_modem_id: None,
            device_label: None,
            event_count: 0,
            terminate: false,
            started_at: Instant::now(),
        }
    }
}

/// Sequences packet handling for one connection.
pub struct SessionController<S> {
    session: Session,
    config: Arc<Config>,
    store: Arc<S>,
    pipeline: Pipeline<S>,
}

impl<S: TelemetryStore> SessionController<S> {
    /// Session start: called once per connection (or per datagram).
    pub fn new(remote: SocketAddr, config: Arc<Config>, store: Arc<S>) -> Self {
        let session = Session::new(remote);
        info!(session = %session.id, %remote, "session started");
        Self {
            session,
            config,
            pipeline: Pipeline::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Check the termination flag set by identity rejection.
    pub fn should_terminate(&self) -> bool {
        self.session.terminate
    }

    /// Packet-boundary query over the accumulated buffer.
    pub fn boundary(&mut self, buf: &[u8]) -> Boundary {
        decide_boundary(buf, &mut self.session.dialect, &self.config)
    }

    /// Handle one complete packet; returns the bytes to send back, if
    /// any.
    ///
    /// Every error here is contained: a framing/decode failure drops
    /// the packet (answering with the dialect NAK where one is
    /// mandated), an identity failure drops the packet and may flag
    /// the session for termination. None of them ends the process.
    pub async fn on_packet(&mut self, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        let dialect = match self.session.dialect {
            Some(dialect) => dialect,
            // Datagram transports hand packets in without a prior
            // boundary query; sniff here.
            None => match bytes.first().copied().and_then(Dialect::sniff) {
                Some(dialect) => {
                    self.session.dialect = Some(dialect);
                    dialect
                }
                None => {
                    return Err(FramingError::UnknownLeadByte(
                        bytes.first().copied().unwrap_or_default(),
                    )
                    .into())
                }
            },
        };

        let raw = RawPacket::new(dialect, bytes);
        let dialect_config = self.config.dialect(dialect);

        let decoded = match dialect.decode(&raw, dialect_config, self.store.as_ref()) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    session = %self.session.id,
                    %dialect,
                    "decode failed, dropping packet: {e}"
                );
                return Ok(dialect.nak());
            }
        };

        let fix = decoded.fix;
        self.session.last_modem_id = Some(fix.modem_id.clone());

        let identity = match self.store.resolve_by_modem(&fix.modem_id).await? {
            Some(identity) => identity,
            None => {
                let e = Error::from(IdentityError::UnknownModem(fix.modem_id));
                warn!(session = %self.session.id, "dropping packet: {e}");
                return Ok(None);
            }
        };

        if !identity.ip_authorized(self.session.remote.ip()) {
            warn!(
                session = %self.session.id,
                device = %identity.key,
                ip = %self.session.remote.ip(),
                "IP not authorized, dropping packet and flagging session"
            );
            self.session.terminate = true;
            return Ok(None);
        }

        self.session.device_label = Some(identity.key.to_string());

        let events = self
            .pipeline
            .process(dialect_config, &identity, self.session.remote, fix)
            .await?;
        self.session.event_count += events.len() as u64;

        debug!(
            session = %self.session.id,
            device = %identity.key,
            events = events.len(),
            "packet handled"
        );

        Ok(decoded.ack)
    }

    /// Session end: log the connection summary.
    pub fn on_session_end(&self, error: Option<&Error>, read_count: u64, write_count: u64) {
        match error {
            Some(e) => warn!(
                session = %self.session.id,
                device = self.session.device_label.as_deref().unwrap_or("-"),
                read_count,
                write_count,
                events = self.session.event_count,
                "session ended with error: {e}"
            ),
            None => info!(
                session = %self.session.id,
                device = self.session.device_label.as_deref().unwrap_or("-"),
                read_count,
                write_count,
                events = self.session.event_count,
                "session ended"
            ),
        }
    }
}
