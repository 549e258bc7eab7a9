//! Coordinates and great-circle distance on a spherical Earth

use geo::{Coord, Point};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Earth's mean radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Maximum absolute latitude in degrees
pub const MAX_LATITUDE: f64 = 90.0;

/// Maximum absolute longitude in degrees
pub const MAX_LONGITUDE: f64 = 180.0;

/// A WGS84 position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Coordinate {
    #[inline]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite and within range
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= MAX_LATITUDE
            && self.longitude.abs() <= MAX_LONGITUDE
    }

    /// Point reached by travelling `distance_m` meters from here along the initial
    /// `bearing_deg` (clockwise from north) on a great circle.
    ///
    /// The resulting longitude is normalized to [-180, 180].
    pub fn destination(&self, bearing_deg: f64, distance_m: f64) -> Self {
        let angular = distance_m / EARTH_RADIUS_M;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        let longitude = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
        Self::new(lat2.to_degrees(), longitude)
    }
}

impl From<Coordinate> for Coord<f64> {
    fn from(c: Coordinate) -> Self {
        Coord {
            x: c.longitude,
            y: c.latitude,
        }
    }
}

impl From<Coordinate> for Point<f64> {
    fn from(c: Coordinate) -> Self {
        Point::new(c.longitude, c.latitude)
    }
}

impl From<Point<f64>> for Coordinate {
    fn from(p: Point<f64>) -> Self {
        Coordinate::new(p.y(), p.x())
    }
}

/// Great-circle distance between two coordinates in meters (haversine formula)
///
/// Returns exactly `0.0` for identical coordinates and is symmetric in its arguments.
#[inline]
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }

    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push h marginally past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_points_are_zero() {
        let p = Coordinate::new(51.5074, -0.1278);
        assert_eq!(distance(p, p), 0.0);
    }

    #[test]
    fn test_thousandth_degree_at_equator() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 0.001);
        let d = distance(a, b);
        assert!((d - 111.19).abs() < 0.5, "got {d}");
    }

    #[test]
    fn test_symmetry() {
        let a = Coordinate::new(40.4168, -3.7038);
        let b = Coordinate::new(48.8566, 2.3522);
        let ab = distance(a, b);
        let ba = distance(b, a);
        assert!((ab - ba).abs() < 1e-6);
        // Madrid - Paris is roughly 1050 km
        assert!((ab - 1_053_000.0).abs() < 10_000.0, "got {ab}");
    }

    #[test]
    fn test_antipodal_points() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 180.0);
        let d = distance(a, b);
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_M).abs() < 1.0);
    }

    #[test]
    fn test_validity() {
        assert!(Coordinate::new(90.0, 180.0).is_valid());
        assert!(Coordinate::new(-90.0, -180.0).is_valid());
        assert!(!Coordinate::new(90.0001, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, f64::INFINITY).is_valid());
    }

    #[test]
    fn test_destination_matches_distance() {
        let start = Coordinate::new(51.5074, -0.1278);
        let end = start.destination(45.0, 250.0);
        assert!((distance(start, end) - 250.0).abs() < 0.01);
        assert!(end.latitude > start.latitude);
        assert!(end.longitude > start.longitude);
    }

    #[test]
    fn test_destination_wraps_longitude() {
        let start = Coordinate::new(0.0, 179.9999);
        let end = start.destination(90.0, 1_000.0);
        assert!(end.is_valid());
        assert!(end.longitude < 0.0);
    }

    #[test]
    fn test_geo_conversions() {
        let c = Coordinate::new(10.0, 20.0);
        let p: Point<f64> = c.into();
        assert_eq!(p.x(), 20.0);
        assert_eq!(p.y(), 10.0);
        assert_eq!(Coordinate::from(p), c);

        let coord: Coord<f64> = c.into();
        assert_eq!((coord.x, coord.y), (20.0, 10.0));
    }
}
