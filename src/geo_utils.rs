//! Geographic utilities: great-circle distance, path length and line
//! simplification over [`GpsPoint`]s.

use geo::{algorithm::simplify::Simplify, Coord, LineString};

use crate::GpsPoint;

/// Mean Earth radius used by every distance in this crate, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points in meters (Haversine formula).
///
/// Symmetric, zero for identical points. NaN coordinates produce NaN.
///
/// # Example
/// ```
/// use fleet_track::GpsPoint;
/// use fleet_track::geo_utils::haversine_distance;
///
/// let a = GpsPoint::new(0.0, 0.0);
/// let b = GpsPoint::new(0.0, 0.008993);
/// let d = haversine_distance(&a, &b);
/// assert!((d - 1000.0).abs() < 10.0);
/// ```
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let d_lat = (p2.latitude - p1.latitude).to_radians();
    let d_lng = (p2.longitude - p1.longitude).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

/// Approximate conversion of a ground distance to degrees of latitude.
pub fn meters_to_degrees(meters: f64) -> f64 {
    (meters / EARTH_RADIUS_M).to_degrees()
}

/// Douglas-Peucker line simplification.
///
/// `tolerance` is in coordinate units (degrees); see [`meters_to_degrees`].
/// Inputs with fewer than 3 points are returned as-is.
pub fn douglas_peucker(points: &[GpsPoint], tolerance: f64) -> Vec<GpsPoint> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let coords: Vec<Coord<f64>> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    LineString::new(coords)
        .simplify(&tolerance)
        .coords()
        .map(|c| GpsPoint::new(c.y, c.x))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let points = [
            GpsPoint::new(0.0, 0.0),
            GpsPoint::new(-23.5505, -46.6333),
            GpsPoint::new(51.5074, -0.1278),
            GpsPoint::new(89.9, 179.9),
        ];
        for p in &points {
            assert_eq!(haversine_distance(p, p), 0.0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        let sao_paulo = GpsPoint::new(-23.5505, -46.6333);
        let rio = GpsPoint::new(-22.9068, -43.1729);
        let ab = haversine_distance(&sao_paulo, &rio);
        let ba = haversine_distance(&rio, &sao_paulo);
        assert!((ab - ba).abs() < 1e-6);
        // ~360 km apart
        assert!(ab > 350_000.0 && ab < 370_000.0);
    }

    #[test]
    fn test_one_kilometer_at_equator() {
        let a = GpsPoint::new(0.0, 0.0);
        let b = GpsPoint::new(0.0, 0.008993);
        let d = haversine_distance(&a, &b);
        assert!((d - 1000.0).abs() / 1000.0 < 0.01, "got {d}");
    }

    #[test]
    fn test_nan_propagates() {
        let a = GpsPoint::new(f64::NAN, 0.0);
        let b = GpsPoint::new(0.0, 0.0);
        assert!(haversine_distance(&a, &b).is_nan());
    }

    #[test]
    fn test_polyline_length() {
        let step = meters_to_degrees(100.0);
        let line: Vec<GpsPoint> = (0..5)
            .map(|i| GpsPoint::new(i as f64 * step, 0.0))
            .collect();
        let length = polyline_length(&line);
        assert!((length - 400.0).abs() < 0.5, "got {length}");
        assert_eq!(polyline_length(&line[..1]), 0.0);
    }

    #[test]
    fn test_douglas_peucker_drops_collinear_points() {
        let line: Vec<GpsPoint> = (0..10)
            .map(|i| GpsPoint::new(0.0, i as f64 * 0.0001))
            .collect();
        let simplified = douglas_peucker(&line, 0.00001);
        assert_eq!(simplified.len(), 2);
        assert_eq!(simplified[0], line[0]);
        assert_eq!(simplified[1], line[9]);
    }
}
