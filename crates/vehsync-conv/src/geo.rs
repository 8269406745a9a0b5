//! Great-circle distance for the `is_home` capability

use vehsync_core::GeoPoint;

/// Mean Earth radius used by the haversine formula
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A vehicle within this distance of the reference location is home
pub const HOME_RADIUS_KM: f64 = 1.0;

/// Telemetry positions are integer degrees × 1e6
pub const MICRO_DEGREES: f64 = 1e6;

/// Convert a telemetry position to degrees
pub fn from_micro_degrees(latitude: f64, longitude: f64) -> GeoPoint {
    GeoPoint::new(latitude / MICRO_DEGREES, longitude / MICRO_DEGREES)
}

/// Haversine distance between two points, in kilometers
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + (d_lon / 2.0).sin().powi(2) * lat1.cos() * lat2.cos();
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Whether `position` lies within [`HOME_RADIUS_KM`] of `home`
pub fn is_home(home: GeoPoint, position: GeoPoint) -> bool {
    distance_km(home, position) <= HOME_RADIUS_KM
}
