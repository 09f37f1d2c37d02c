//! Great-circle geometry for proximity lookups

use serde::Deserialize;
use serde::Serialize;

/// Mean radius of the earth in miles
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// A location on earth
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    longitude: f64,
    latitude: f64,
}

/// Unchecked shape of a point, before range validation
#[derive(Deserialize)]
struct RawPoint {
    longitude: f64,
    latitude: f64,
}

impl Point {
    /// Create a point, `None` when the coordinates are out of range
    pub fn new(longitude: f64, latitude: f64) -> Option<Self> {
        let valid = (-180.0..=180.0).contains(&longitude) && (-90.0..=90.0).contains(&latitude);

        valid.then_some(Self {
            longitude,
            latitude,
        })
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Haversine distance to another point
    pub fn distance_miles(&self, other: &Point) -> f64 {
        let lat_one = self.latitude.to_radians();
        let lat_two = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lng = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat_one.cos() * lat_two.cos() * (delta_lng / 2.0).sin().powi(2);

        2.0 * EARTH_RADIUS_MILES * a.sqrt().min(1.0).asin()
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPoint::deserialize(deserializer)?;

        Point::new(raw.longitude, raw.latitude).ok_or_else(|| {
            serde::de::Error::custom(
                "longitude must be within [-180, 180], latitude within [-90, 90]",
            )
        })
    }
}
