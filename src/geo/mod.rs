pub mod selector;

use crate::models::location::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.min(1.0).sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Coarse bucket key used for `area:<cell>` rooms. Cells are a square grid of
/// `cell_degrees` on each axis.
pub fn area_cell(point: &GeoPoint, cell_degrees: f64) -> String {
    let row = (point.lat / cell_degrees).floor() as i64;
    let col = (point.lng / cell_degrees).floor() as i64;
    format!("{row}:{col}")
}

/// Minutes to cover `distance_km` at `speed_kmh`, rounded up.
pub fn eta_minutes(distance_km: f64, speed_kmh: f64) -> Option<u32> {
    if speed_kmh <= 0.0 || !distance_km.is_finite() {
        return None;
    }
    Some(((distance_km / speed_kmh) * 60.0).ceil().max(0.0) as u32)
}
