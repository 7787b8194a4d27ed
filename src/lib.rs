//! # Fleetwire
//!
//! Device communication server for fleet telematics.
//!
//! Fleetwire accepts raw byte streams from heterogeneous GPS tracking
//! hardware, frames them into discrete packets, decodes each vendor
//! dialect into a normalized fix, runs a shared correction-and-synthesis
//! pipeline and emits protocol-specific acknowledgements.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Transport (TCP stream / UDP datagram)          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │        Packet Framer (leading-byte sniff, boundary decision)    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Dialect Decoders (Csv / Paren / Bracket / Dollar variants)    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   Post-Processing Pipeline (validity, fallback, geofences,      │
//! │   input edges, status arbitration, persistence hand-off)        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │       Telemetry Store (device identity, events, geozones)       │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]      // Many functions can't be const due to trait bounds
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::unreadable_literal)]        // Numeric literals are clear
#![allow(clippy::cast_possible_truncation)]  // Intentional field-width conversions
#![allow(clippy::cast_sign_loss)]            // Masks and counters are non-negative
#![allow(clippy::cast_precision_loss)]       // Acceptable for geodesic math
#![allow(clippy::suboptimal_flops)]          // Clarity over micro-optimization
#![allow(clippy::option_if_let_else)]        // More readable in context
#![allow(clippy::use_self)]                  // Explicit type names in matches
#![allow(clippy::cognitive_complexity)]      // Decoder field walks
#![allow(clippy::too_many_lines)]            // Complete implementations
#![allow(clippy::struct_excessive_bools)]    // Boolean config fields are appropriate
#![allow(clippy::match_same_arms)]           // Explicit arm per variant is clearer

pub mod config;
pub mod error;
pub mod fix;
pub mod geo;
pub mod pipeline;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use fix::NormalizedFix;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default TCP listen port for the device server
pub const DEFAULT_PORT: u16 = 31200;

/// Default upper bound on a single framed packet
pub const DEFAULT_MAX_PACKET_LEN: usize = 600;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DialectConfig, ServerConfig};
    pub use crate::error::{Error, Result};
    pub use crate::fix::NormalizedFix;
    pub use crate::pipeline::Pipeline;
    pub use crate::protocol::{Boundary, Dialect, RawPacket};
    pub use crate::server::Server;
    pub use crate::session::{Session, SessionController};
    pub use crate::store::{DeviceIdentity, MemoryStore, TelemetryStore};
    pub use crate::types::*;
}
