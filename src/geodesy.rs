//! Great-circle geometry over WGS84 coordinates.
//!
//! Pure math, no failure modes. Distances use the haversine formula with
//! the mean Earth radius; segment projection uses a local planar frame
//! scaled by cos(latitude), accurate to well under a meter at the
//! segment lengths a route step spans.

use crate::types::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine great-circle distance between two points in meters.
pub fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b` in degrees [0, 360).
pub fn initial_bearing_deg(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Project `p` onto the segment from `seg_start` to `seg_end`.
///
/// The perpendicular foot is clamped to the nearer endpoint when it falls
/// outside the segment. A degenerate zero-length segment projects onto
/// `seg_start`.
///
/// # Returns
/// The snapped point (carrying `p`'s timestamp) and the distance from `p`
/// to it in meters.
pub fn project_onto_segment(
    p: &GeoPoint,
    seg_start: &GeoPoint,
    seg_end: &GeoPoint,
) -> (GeoPoint, f64) {
    // Local planar frame around the segment, degrees scaled to a common
    // metric by cos of the mean latitude.
    let cos_lat = ((seg_start.latitude + seg_end.latitude) / 2.0)
        .to_radians()
        .cos();

    let dx = (seg_end.longitude - seg_start.longitude) * cos_lat;
    let dy = seg_end.latitude - seg_start.latitude;
    let px = (p.longitude - seg_start.longitude) * cos_lat;
    let py = p.latitude - seg_start.latitude;

    let seg_len_sq = dx * dx + dy * dy;

    if seg_len_sq < 1e-20 {
        // Degenerate segment (start == end)
        let snapped = GeoPoint::new(seg_start.latitude, seg_start.longitude, p.timestamp);
        let dist = haversine_m(p, &snapped);
        return (snapped, dist);
    }

    let t = ((px * dx + py * dy) / seg_len_sq).clamp(0.0, 1.0);

    let snapped = GeoPoint::new(
        seg_start.latitude + t * (seg_end.latitude - seg_start.latitude),
        seg_start.longitude + t * (seg_end.longitude - seg_start.longitude),
        p.timestamp,
    );
    let dist = haversine_m(p, &snapped);
    (snapped, dist)
}

/// Point reached by traveling `distance_m` from `origin` on `bearing_deg`.
///
/// Spherical forward solution; used to lay out synthetic routes and test
/// fixtures.
pub fn destination_point(origin: &GeoPoint, bearing_deg: f64, distance_m: f64) -> GeoPoint {
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();
    let bearing = bearing_deg.to_radians();
    let angular = distance_m / EARTH_RADIUS_M;

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos())
            .atan2(angular.cos() - lat1.sin() * lat2.sin());

    GeoPoint::new(lat2.to_degrees(), lon2.to_degrees(), origin.timestamp)
}
