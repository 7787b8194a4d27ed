//! External persistence collaborator: device identity resolution,
//! event persistence, geozone evaluation and event-code translation.
//!
//! The core only speaks to the [`TelemetryStore`] trait. [`MemoryStore`]
//! is the in-process implementation used by tests and small
//! deployments; a relational backend implements the same contract.

use std::collections::HashSet;
use std::net::IpAddr;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fix::NormalizedFix;
use crate::geo;
use crate::protocol::{Dialect, StatusTranslator};
use crate::types::{DeviceKey, GeoPoint, StatusCode};

/// Persisted device record and its last-known state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Account + device addressing.
    pub key: DeviceKey,
    /// Device-supplied unique/modem id bound to this record.
    pub modem_id: String,
    /// Connecting-IP allow-list; empty means any address is accepted.
    pub allowed_ips: Vec<IpAddr>,
    /// Last known valid location, if any.
    pub last_valid_point: Option<GeoPoint>,
    /// Speed at the last valid fix, km/h.
    pub last_valid_speed: f64,
    /// Heading at the last valid fix.
    pub last_valid_heading: Option<f64>,
    /// Timestamp of the last valid fix, seconds UTC (0 = never).
    pub last_valid_ts: i64,
    /// Cumulative odometer, km.
    pub odometer_km: f64,
    /// Last stored digital-input mask.
    pub input_mask: Option<u32>,
    /// Last connect metadata: IP, port, timestamp.
    pub last_connect: Option<(IpAddr, u16, i64)>,
}

impl DeviceIdentity {
    pub fn new(key: DeviceKey, modem_id: impl Into<String>) -> Self {
        Self {
            key,
            modem_id: modem_id.into(),
            allowed_ips: Vec::new(),
            last_valid_point: None,
            last_valid_speed: 0.0,
            last_valid_heading: None,
            last_valid_ts: 0,
            odometer_km: 0.0,
            input_mask: None,
            last_connect: None,
        }
    }

    /// Check the connecting address against the allow-list. An empty
    /// list authorizes every address.
    pub fn ip_authorized(&self, ip: IpAddr) -> bool {
        self.allowed_ips.is_empty() || self.allowed_ips.contains(&ip)
    }
}

/// Write-back fields applied to a device record once per packet cycle.
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    /// Current connect metadata: IP, port, timestamp.
    pub connect: Option<(IpAddr, u16, i64)>,
    /// New last-valid fix: point, speed, heading, timestamp.
    pub last_valid: Option<(GeoPoint, f64, Option<f64>, i64)>,
    /// New odometer value, km.
    pub odometer_km: Option<f64>,
    /// New digital-input mask.
    pub input_mask: Option<u32>,
}

/// The unit handed to persistence: one event derived from a fix.
///
/// `(key, timestamp, status)` is the natural key; the pipeline never
/// emits two events with the same key in one packet cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub key: DeviceKey,
    pub timestamp: i64,
    pub status: StatusCode,
    pub fix: NormalizedFix,
}

/// A geozone boundary crossing detected during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeozoneTransition {
    pub timestamp: i64,
    /// `GeofenceEnter` or `GeofenceExit`.
    pub status: StatusCode,
    /// The crossed zone.
    pub zone: String,
}

/// Persistence collaborator contract consumed by the core.
#[async_trait]
pub trait TelemetryStore: StatusTranslator + Send + Sync {
    /// Resolve a device by its protocol-supplied modem id.
    async fn resolve_by_modem(&self, modem_id: &str) -> Result<Option<DeviceIdentity>>;

    /// Resolve a device by explicit account + device ids.
    async fn resolve(&self, key: &DeviceKey) -> Result<Option<DeviceIdentity>>;

    /// Apply write-back fields to a device record.
    async fn write_back(&self, key: &DeviceKey, update: DeviceUpdate) -> Result<()>;

    /// Persist one event.
    async fn persist_event(&self, event: PersistedEvent) -> Result<()>;

    /// Evaluate the device's configured geozones against a new point,
    /// returning boundary crossings since the previous evaluation.
    async fn evaluate_geozones(
        &self,
        key: &DeviceKey,
        timestamp: i64,
        point: GeoPoint,
    ) -> Result<Vec<GeozoneTransition>>;
}

/// A circular geozone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geozone {
    pub id: String,
    pub center: GeoPoint,
    pub radius_m: f64,
}

impl Geozone {
    pub fn new(id: impl Into<String>, center: GeoPoint, radius_m: f64) -> Self {
        Self {
            id: id.into(),
            center,
            radius_m,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        geo::distance_meters(self.center, point) <= self.radius_m
    }
}

struct DeviceRecord {
    identity: DeviceIdentity,
    zones: Vec<Geozone>,
    /// Zones the device was inside at the last evaluation.
    inside: HashSet<String>,
}

/// In-memory [`TelemetryStore`] implementation.
pub struct MemoryStore {
    devices: DashMap<DeviceKey, DeviceRecord>,
    by_modem: DashMap<String, DeviceKey>,
    events: Mutex<Vec<PersistedEvent>>,
    translations: RwLock<std::collections::HashMap<(Dialect, String), StatusCode>>,
}

impl MemoryStore {
    /// Create an empty store with the stock per-dialect translation
    /// table.
    pub fn new() -> Self {
        let store = Self {
            devices: DashMap::new(),
            by_modem: DashMap::new(),
            events: Mutex::new(Vec::new()),
            translations: RwLock::new(std::collections::HashMap::new()),
        };
        store.seed_translations();
        store
    }

    /// Register a device and its geozones.
    pub fn register(&self, identity: DeviceIdentity, zones: Vec<Geozone>) {
        self.by_modem
            .insert(identity.modem_id.clone(), identity.key.clone());
        self.devices.insert(
            identity.key.clone(),
            DeviceRecord {
                identity,
                zones,
                inside: HashSet::new(),
            },
        );
    }

    /// Add or override one translation entry.
    pub fn map_status(&self, dialect: Dialect, code: impl Into<String>, status: StatusCode) {
        self.translations
            .write()
            .insert((dialect, code.into()), status);
    }

    /// Snapshot of every persisted event, in persistence order.
    pub fn events(&self) -> Vec<PersistedEvent> {
        self.events.lock().clone()
    }

    /// Current state of one device record.
    pub fn device(&self, key: &DeviceKey) -> Option<DeviceIdentity> {
        self.devices.get(key).map(|r| r.identity.clone())
    }

    fn seed_translations(&self) {
        use StatusCode::*;

        let mut map = self.translations.write();
        for (code, status) in [
            ("PANIC", Panic),
            ("IGN_ON", IgnitionOn),
            ("IGN_OFF", IgnitionOff),
            ("LOWBATT", LowBattery),
            ("IGNORE", Ignore),
        ] {
            map.insert((Dialect::Csv, code.to_string()), status);
        }
        for (code, status) in [
            ("BP05", Location),
            ("BR00", Location),
            ("BO01", Panic),
            ("BO02", LowBattery),
        ] {
            map.insert((Dialect::Paren, code.to_string()), status);
        }
        for (code, status) in [
            ("01", Location),
            ("02", InMotion),
            ("11", IgnitionOn),
            ("12", IgnitionOff),
            ("21", Panic),
            ("7F", Ignore),
        ] {
            map.insert((Dialect::Bracket, code.to_string()), status);
        }
        for (code, status) in [
            ("21", Panic),
            ("22", LowBattery),
            ("30", IgnitionOn),
            ("31", IgnitionOff),
            ("7F", Ignore),
        ] {
            map.insert((Dialect::Dollar, code.to_string()), status);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusTranslator for MemoryStore {
    fn translate_status(&self, dialect: Dialect, code: &str) -> Option<StatusCode> {
        self.translations
            .read()
            .get(&(dialect, code.to_string()))
            .copied()
    }
}

#[async_trait]
impl TelemetryStore for MemoryStore {
    async fn resolve_by_modem(&self, modem_id: &str) -> Result<Option<DeviceIdentity>> {
        let Some(key) = self.by_modem.get(modem_id) else {
            return Ok(None);
        };
        Ok(self.device(&key))
    }

    async fn resolve(&self, key: &DeviceKey) -> Result<Option<DeviceIdentity>> {
        Ok(self.device(key))
    }

    async fn write_back(&self, key: &DeviceKey, update: DeviceUpdate) -> Result<()> {
        if let Some(mut record) = self.devices.get_mut(key) {
            let identity = &mut record.identity;
            if let Some(connect) = update.connect {
                identity.last_connect = Some(connect);
            }
            if let Some((point, speed, heading, ts)) = update.last_valid {
                identity.last_valid_point = Some(point);
                identity.last_valid_speed = speed;
                identity.last_valid_heading = heading;
                identity.last_valid_ts = ts;
            }
            if let Some(odometer) = update.odometer_km {
                identity.odometer_km = odometer;
            }
            if let Some(mask) = update.input_mask {
                identity.input_mask = Some(mask);
            }
        }
        Ok(())
    }

    async fn persist_event(&self, event: PersistedEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }

    async fn evaluate_geozones(
        &self,
        key: &DeviceKey,
        timestamp: i64,
        point: GeoPoint,
    ) -> Result<Vec<GeozoneTransition>> {
        let Some(mut record) = self.devices.get_mut(key) else {
            return Ok(Vec::new());
        };

        let mut transitions = Vec::new();
        let mut now_inside = HashSet::new();

        // Configured order keeps the transition list deterministic.
        for zone in &record.zones {
            let contains = zone.contains(point);
            let was_inside = record.inside.contains(&zone.id);
            if contains {
                now_inside.insert(zone.id.clone());
            }
            if contains && !was_inside {
                transitions.push(GeozoneTransition {
                    timestamp,
                    status: StatusCode::GeofenceEnter,
                    zone: zone.id.clone(),
                });
            } else if !contains && was_inside {
                transitions.push(GeozoneTransition {
                    timestamp,
                    status: StatusCode::GeofenceExit,
                    zone: zone.id.clone(),
                });
            }
        }

        record.inside = now_inside;
        Ok(transitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(modem: &str) -> DeviceIdentity {
        DeviceIdentity::new(DeviceKey::new("acme", "truck-7"), modem)
    }

    #[tokio::test]
    async fn test_resolve_by_modem() {
        let store = MemoryStore::new();
        store.register(identity("8613001234"), Vec::new());

        let found = store.resolve_by_modem("8613001234").await.unwrap();
        assert_eq!(found.unwrap().key, DeviceKey::new("acme", "truck-7"));
        assert!(store.resolve_by_modem("000000").await.unwrap().is_none());

        // Explicit account/device addressing resolves the same record.
        let found = store.resolve(&DeviceKey::new("acme", "truck-7")).await.unwrap();
        assert_eq!(found.unwrap().modem_id, "8613001234");
    }

    #[test]
    fn test_ip_allow_list() {
        let mut id = identity("1");
        assert!(id.ip_authorized("10.0.0.1".parse().unwrap()));

        id.allowed_ips.push("10.0.0.1".parse().unwrap());
        assert!(id.ip_authorized("10.0.0.1".parse().unwrap()));
        assert!(!id.ip_authorized("10.0.0.2".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_geozone_enter_then_exit() {
        let store = MemoryStore::new();
        let depot = GeoPoint::new(47.6000, -122.3300);
        store.register(
            identity("1"),
            vec![Geozone::new("depot", depot, 500.0)],
        );
        let key = DeviceKey::new("acme", "truck-7");

        // Approach from far away: no transition yet.
        let far = GeoPoint::new(47.7000, -122.3300);
        assert!(store
            .evaluate_geozones(&key, 1000, far)
            .await
            .unwrap()
            .is_empty());

        // Inside the radius: one enter.
        let transitions = store.evaluate_geozones(&key, 1060, depot).await.unwrap();
        assert_eq!(
            transitions,
            vec![GeozoneTransition {
                timestamp: 1060,
                status: StatusCode::GeofenceEnter,
                zone: "depot".into(),
            }]
        );

        // Still inside: no repeat.
        assert!(store
            .evaluate_geozones(&key, 1120, depot)
            .await
            .unwrap()
            .is_empty());

        // Back out: one exit.
        let transitions = store.evaluate_geozones(&key, 1180, far).await.unwrap();
        assert_eq!(transitions[0].status, StatusCode::GeofenceExit);
    }

    #[tokio::test]
    async fn test_write_back_applies_fields() {
        let store = MemoryStore::new();
        store.register(identity("1"), Vec::new());
        let key = DeviceKey::new("acme", "truck-7");

        let update = DeviceUpdate {
            connect: Some(("10.0.0.9".parse().unwrap(), 40001, 5000)),
            last_valid: Some((GeoPoint::new(1.0, 2.0), 30.0, Some(90.0), 4990)),
            odometer_km: Some(1234.5),
            input_mask: Some(0x03),
        };
        store.write_back(&key, update).await.unwrap();

        let device = store.device(&key).unwrap();
        assert_eq!(device.last_valid_point, Some(GeoPoint::new(1.0, 2.0)));
        assert_eq!(device.last_valid_ts, 4990);
        assert_eq!(device.odometer_km, 1234.5);
        assert_eq!(device.input_mask, Some(0x03));
        assert_eq!(device.last_connect.unwrap().1, 40001);
    }

    #[test]
    fn test_stock_translation_table() {
        let store = MemoryStore::new();
        assert_eq!(
            store.translate_status(Dialect::Paren, "BO01"),
            Some(StatusCode::Panic)
        );
        assert_eq!(store.translate_status(Dialect::Paren, "ZZ99"), None);
        assert_eq!(
            store.translate_status(Dialect::Bracket, "7F"),
            Some(StatusCode::Ignore)
        );
    }
}
