use serde::{Deserialize, Serialize};

const AVERAGE_EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Geographic point in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance in meters.
    #[must_use]
    pub fn haversine_distance(&self, other: &Self) -> f64 {
        let latitude_delta = (self.latitude - other.latitude).to_radians();
        let longitude_delta = (self.longitude - other.longitude).to_radians();
        let a = (latitude_delta / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (longitude_delta / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        AVERAGE_EARTH_RADIUS_METERS * c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_distance_ok() {
        let singapore = Point::new(1.3521, 103.8198);
        let jakarta = Point::new(-6.2088, 106.8456);
        let distance = singapore.haversine_distance(&jakarta);
        assert!((distance - 905_354.0).abs() < 1.0, "{}", distance);
    }

    #[test]
    fn haversine_distance_zero_ok() {
        let point = Point::new(10.8042, 106.695736);
        assert_eq!(point.haversine_distance(&point), 0.0);
    }
}
