//! Event post-processing pipeline: the common handler applied after
//! every successful decode, regardless of dialect.
//!
//! Steps, in order: timestamp sanity, GPS validity arbitration,
//! last-valid-fix fallback, heading backfill, odometer
//! estimation/bounds-check, geofence synthesis, digital-input edge
//! synthesis, status-code arbitration, persistence hand-off.
//!
//! A resolver failure or IP mismatch aborts the cycle upstream, before
//! any event is built. Persistence failures are logged and never abort
//! the session.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::DialectConfig;
use crate::error::Result;
use crate::fix::NormalizedFix;
use crate::geo;
use crate::store::{DeviceIdentity, DeviceUpdate, PersistedEvent, TelemetryStore};
use crate::types::StatusCode;

/// The shared post-processing pipeline.
pub struct Pipeline<S> {
    store: Arc<S>,
}

impl<S> Clone for Pipeline<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TelemetryStore> Pipeline<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Run one fix through the full pipeline and hand surviving events
    /// to persistence. Returns the events in emission order.
    ///
    /// The device write-back (connect metadata, last-valid fields,
    /// odometer, input mask) happens exactly once, after all events.
    pub async fn process(
        &self,
        config: &DialectConfig,
        identity: &DeviceIdentity,
        remote: SocketAddr,
        mut fix: NormalizedFix,
    ) -> Result<Vec<PersistedEvent>> {
        let now = Utc::now().timestamp();

        // 1. Timestamp sanity.
        if fix.timestamp <= 0 {
            fix.timestamp = now;
        }

        // 2. GPS validity arbitration.
        if !(fix.valid && fix.point.is_valid()) {
            fix.invalidate();
        }

        // 3. Invalid-fix handling: cell-tower retarget, else the
        //    policy-gated last-valid fallback.
        if !fix.valid {
            if fix.cell.is_some() {
                if matches!(fix.status, StatusCode::None | StatusCode::Location) {
                    fix.status = StatusCode::CellLocation;
                }
            } else if config.use_last_valid_fix {
                if let Some(last) = identity.last_valid_point {
                    if last.is_valid() {
                        fix.point = last;
                        fix.speed_kmh = identity.last_valid_speed;
                        fix.heading = identity.last_valid_heading;
                        fix.derived = true;
                        fix.gps_age_secs = (fix.timestamp - identity.last_valid_ts).max(0);
                    }
                }
            }
        }

        // 4. Heading backfill from the last known valid location.
        if fix.valid && fix.heading.is_none() && fix.is_moving() {
            if let Some(last) = identity.last_valid_point {
                if last.is_valid() && geo::distance_meters(last, fix.point) > 0.0 {
                    fix.heading = Some(geo::bearing_degrees(last, fix.point));
                }
            }
        }

        // 5. Odometer: bounds-check a supplied value, estimate an
        //    absent one from great-circle travel.
        let odometer_km = self.arbitrate_odometer(config, identity, &fix);
        fix.odometer_km = Some(odometer_km);

        let mut events: Vec<PersistedEvent> = Vec::new();
        let mut synthesized: HashSet<StatusCode> = HashSet::new();
        let mut seen_keys: HashSet<(i64, StatusCode)> = HashSet::new();

        // 6. Geofence-transition synthesis.
        if config.simulate_geozones && fix.valid {
            match self
                .store
                .evaluate_geozones(&identity.key, fix.timestamp, fix.point)
                .await
            {
                Ok(transitions) => {
                    for transition in transitions {
                        synthesized.insert(transition.status);
                        push_event(
                            &mut events,
                            &mut seen_keys,
                            identity,
                            &fix,
                            transition.status,
                            transition.timestamp,
                        );
                    }
                }
                Err(e) => warn!(device = %identity.key, "geozone evaluation failed: {e}"),
            }
        }

        // 7. Digital-input edge synthesis. The stored mask updates
        //    unconditionally, even for bits outside the interest set.
        if let (Some(mask), Some(last_mask)) = (fix.input_mask, identity.input_mask) {
            let changed = (mask ^ last_mask) & config.input_mask_of_interest;
            for bit in 0..u32::BITS as u8 {
                if changed & (1 << bit) == 0 {
                    continue;
                }
                let status = if mask & (1 << bit) != 0 {
                    StatusCode::InputOn(bit)
                } else {
                    StatusCode::InputOff(bit)
                };
                synthesized.insert(status);
                push_event(
                    &mut events,
                    &mut seen_keys,
                    identity,
                    &fix,
                    status,
                    fix.timestamp,
                );
            }
        }

        // 8. Status-code arbitration for the primary event.
        if let Some(status) =
            arbitrate_primary(config, identity, &fix, &synthesized, events.is_empty())
        {
            push_event(
                &mut events,
                &mut seen_keys,
                identity,
                &fix,
                status,
                fix.timestamp,
            );
        }

        // 9. Persistence hand-off, then one write-back. Write failures
        //    are logged; the session continues.
        for event in &events {
            if let Err(e) = self.store.persist_event(event.clone()).await {
                warn!(device = %identity.key, status = %event.status, "event persist failed: {e}");
            }
        }

        let update = DeviceUpdate {
            connect: Some((remote.ip(), remote.port(), now)),
            last_valid: fix
                .valid
                .then_some((fix.point, fix.speed_kmh, fix.heading, fix.timestamp)),
            odometer_km: Some(odometer_km),
            input_mask: fix.input_mask.or(identity.input_mask),
        };
        if let Err(e) = self.store.write_back(&identity.key, update).await {
            warn!(device = %identity.key, "device write-back failed: {e}");
        }

        Ok(events)
    }

    /// Step 5: resolve the odometer value for this cycle.
    fn arbitrate_odometer(
        &self,
        config: &DialectConfig,
        identity: &DeviceIdentity,
        fix: &NormalizedFix,
    ) -> f64 {
        match fix.odometer_km {
            Some(supplied) => {
                let delta = supplied - identity.odometer_km;
                if (0.0..=config.max_odometer_jump_km).contains(&delta) {
                    supplied
                } else {
                    debug!(
                        device = %identity.key,
                        supplied,
                        stored = identity.odometer_km,
                        "implausible odometer delta, keeping stored value"
                    );
                    identity.odometer_km
                }
            }
            None => {
                if config.estimate_odometer && fix.valid {
                    if let Some(last) = identity.last_valid_point {
                        if last.is_valid() {
                            return identity.odometer_km + geo::distance_km(last, fix.point);
                        }
                    }
                }
                identity.odometer_km
            }
        }
    }
}

/// Step 8: ordered precedence, first match wins.
fn arbitrate_primary(
    config: &DialectConfig,
    identity: &DeviceIdentity,
    fix: &NormalizedFix,
    synthesized: &HashSet<StatusCode>,
    no_synthesized_events: bool,
) -> Option<StatusCode> {
    match fix.status {
        // Explicit ignore: suppressed entirely.
        StatusCode::Ignore => {
            debug!(device = %identity.key, "ignore-coded event suppressed");
            None
        }
        // Already synthesized this cycle: skip the duplicate primary.
        status if synthesized.contains(&status) => None,
        // Generic "no specific code": retarget by motion, but only
        // when nothing was synthesized for this cycle.
        StatusCode::None => {
            if no_synthesized_events {
                Some(if fix.is_moving() {
                    StatusCode::InMotion
                } else {
                    StatusCode::Location
                })
            } else {
                None
            }
        }
        // Plain location: optional in-motion translation, then the
        // minimum-moved-distance gate.
        StatusCode::Location => {
            if config.location_to_in_motion && fix.is_moving() {
                return Some(StatusCode::InMotion);
            }
            let moved = identity
                .last_valid_point
                .filter(|last| last.is_valid())
                .map_or(f64::INFINITY, |last| geo::distance_meters(last, fix.point));
            if moved >= config.minimum_moved_meters {
                Some(StatusCode::Location)
            } else {
                debug!(
                    device = %identity.key,
                    moved,
                    "location below minimum-move threshold, not persisted"
                );
                None
            }
        }
        // Any non-location code is always persisted.
        status => Some(status),
    }
}

/// Append one event unless its natural key was already emitted this
/// cycle.
fn push_event(
    events: &mut Vec<PersistedEvent>,
    seen: &mut HashSet<(i64, StatusCode)>,
    identity: &DeviceIdentity,
    fix: &NormalizedFix,
    status: StatusCode,
    timestamp: i64,
) {
    if !seen.insert((timestamp, status)) {
        debug!(device = %identity.key, %status, timestamp, "duplicate event key dropped");
        return;
    }
    let mut snapshot = fix.clone();
    snapshot.status = status;
    snapshot.timestamp = timestamp;
    events.push(PersistedEvent {
        key: identity.key.clone(),
        timestamp,
        status,
        fix: snapshot,
    });
}
