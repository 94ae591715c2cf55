//! Latitude/longitude boxes used to build the region mask.

use serde::{Deserialize, Serialize};

/// A closed longitude/latitude box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLonBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl LatLonBox {
    /// Create a new box from corner coordinates.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Check if a point lies inside the box (bounds inclusive).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }

    /// A box with min > max on either axis can never match a cell.
    pub fn is_valid(&self) -> bool {
        self.min_lon <= self.max_lon
            && self.min_lat <= self.max_lat
            && [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
                .iter()
                .all(|v| v.is_finite())
    }

    /// Mainland Alaska plus four panhandle strips.
    pub fn alaska() -> Vec<LatLonBox> {
        vec![
            LatLonBox::new(-170.0, 50.0, -141.0, 75.0),
            LatLonBox::new(-135.0, 54.5, -130.0, 56.5),
            LatLonBox::new(-137.0, 56.5, -131.5, 57.5),
            LatLonBox::new(-139.0, 57.5, -132.5, 59.0),
            LatLonBox::new(-141.0, 59.0, -134.5, 61.0),
        ]
    }
}
