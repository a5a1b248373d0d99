use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters per second to kilometers per hour.
pub const MPS_TO_KMH: f64 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self, other)
    }

    pub fn bearing_to(&self, other: &Coordinate) -> f64 {
        bearing(self, other)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self::new(latitude, longitude)
    }
}

fn to_radians(degrees: f64) -> f64 {
    degrees * std::f64::consts::PI / 180.0
}

fn to_degrees(radians: f64) -> f64 {
    radians * 180.0 / std::f64::consts::PI
}

/// Great-circle distance in meters. NaN coordinates yield NaN.
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1_rad = to_radians(a.latitude);
    let lon1_rad = to_radians(a.longitude);
    let lat2_rad = to_radians(b.latitude);
    let lon2_rad = to_radians(b.longitude);

    let dlat = lat2_rad - lat1_rad;
    let dlon = lon2_rad - lon1_rad;

    let h = (dlat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial compass bearing from `a` towards `b`, in `[0, 360)`.
pub fn bearing(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1_rad = to_radians(a.latitude);
    let lat2_rad = to_radians(b.latitude);
    let dlon = to_radians(b.longitude - a.longitude);

    let y = dlon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin()
        - lat1_rad.sin() * lat2_rad.cos() * dlon.cos();

    let degrees = to_degrees(y.atan2(x)).rem_euclid(360.0);
    // rem_euclid may round up to exactly 360 for tiny negative angles
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}

/// Average speed in km/h, or `None` if no time has passed.
pub fn speed_kmh(distance_m: f64, elapsed_seconds: f64) -> Option<f64> {
    if elapsed_seconds <= 0.0 || !elapsed_seconds.is_finite() {
        return None;
    }
    Some(distance_m / elapsed_seconds * MPS_TO_KMH)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn distance_of_one_millidegree_on_equator() {
        let a = Coordinate::new(0.0, 0.0);
        let b = Coordinate::new(0.0, 0.001);
        assert!(approx(haversine_distance(&a, &b), 111.194_9, 1e-3));
        assert!(approx(a.distance_to(&b), b.distance_to(&a), 1e-9));
    }

    #[test]
    fn distance_to_self_is_zero() {
        let kiel = Coordinate::new(54.3233, 10.1228);
        assert_eq!(haversine_distance(&kiel, &kiel), 0.0);
    }

    #[test]
    fn known_city_distance() {
        // Kiel Hbf to Hamburg Hbf, roughly 86 km as the crow flies
        let kiel = Coordinate::new(54.3149, 10.1320);
        let hamburg = Coordinate::new(53.5530, 10.0069);
        let distance = haversine_distance(&kiel, &hamburg);
        assert!(distance > 84_000.0 && distance < 86_000.0, "{distance}");
    }

    #[test]
    fn nan_propagates() {
        let a = Coordinate::new(f64::NAN, 0.0);
        let b = Coordinate::new(0.0, 0.0);
        assert!(haversine_distance(&a, &b).is_nan());
    }

    #[test]
    fn cardinal_bearings() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!(approx(bearing(&origin, &Coordinate::new(1.0, 0.0)), 0.0, 1e-9));
        assert!(approx(bearing(&origin, &Coordinate::new(0.0, 1.0)), 90.0, 1e-9));
        assert!(approx(bearing(&origin, &Coordinate::new(-1.0, 0.0)), 180.0, 1e-9));
        assert!(approx(bearing(&origin, &Coordinate::new(0.0, -1.0)), 270.0, 1e-9));
    }

    #[test]
    fn bearing_stays_in_range() {
        let a = Coordinate::new(54.3, 10.1);
        for (lat, lon) in [(54.2, 10.0), (54.4, 10.0), (54.3, 9.0), (-10.0, -170.0)] {
            let value = bearing(&a, &Coordinate::new(lat, lon));
            assert!((0.0..360.0).contains(&value), "{value}");
        }
    }

    #[test]
    fn speed_requires_elapsed_time() {
        assert_eq!(speed_kmh(100.0, 0.0), None);
        assert_eq!(speed_kmh(100.0, -1.0), None);
        assert!(approx(speed_kmh(100.0, 10.0).unwrap(), 36.0, 1e-9));
    }

    #[test]
    fn coordinate_serializes_camel_case() {
        let json = serde_json::to_string(&Coordinate::new(1.5, 2.5)).unwrap();
        assert_eq!(json, r#"{"latitude":1.5,"longitude":2.5}"#);
    }
}
