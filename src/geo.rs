//! Geodesic helpers: great-circle distance and initial bearing.
//!
//! All distance comparisons in the pipeline (minimum-move checks,
//! odometer estimation, geozone containment) use the haversine formula
//! on a spherical earth for consistency.

use crate::types::GeoPoint;

/// Mean earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (haversine).
pub fn distance_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Great-circle distance in kilometers.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    distance_meters(a, b) / 1000.0
}

/// Initial bearing from `a` to `b` in degrees, normalized to [0, 360).
pub fn bearing_degrees(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let y = d_lon.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}
