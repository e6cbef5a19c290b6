//! Great-circle distance helpers for drift detection.

use haversine::{Location as HaversineLocation, Units, distance};

use crate::models::Coordinates;

/// Distance in kilometers between two coordinate pairs, computed with the
/// haversine formula over an Earth radius of 6371 km.
#[must_use]
pub fn distance_km(from: Coordinates, to: Coordinates) -> f64 {
    let from = HaversineLocation {
        latitude: from.latitude,
        longitude: from.longitude,
    };
    let to = HaversineLocation {
        latitude: to.latitude,
        longitude: to.longitude,
    };
    distance(from, to, Units::Kilometers)
}
