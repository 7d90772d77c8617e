//! Great-circle distance and travel-time estimation.
//!
//! Straight-line distance ignores roads, so it underestimates real travel,
//! but it is always available and fully deterministic.

use crate::error::{Result, RouteError};
use crate::model::LatLng;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Average driving speed assumption for time estimation.
pub const DEFAULT_SPEED_KMH: f64 = 40.0;

/// Reject coordinates outside `|lat| <= 90`, `|lng| <= 180`.
pub fn validate(point: LatLng) -> Result<LatLng> {
    let valid = point.lat.is_finite()
        && point.lng.is_finite()
        && point.lat.abs() <= 90.0
        && point.lng.abs() <= 180.0;
    if valid {
        Ok(point)
    } else {
        Err(RouteError::InvalidCoordinate {
            lat: point.lat,
            lng: point.lng,
        })
    }
}

/// Haversine distance between two points in meters.
pub fn distance_meters(from: LatLng, to: LatLng) -> Result<f64> {
    validate(from)?;
    validate(to)?;
    Ok(haversine_m(from, to))
}

/// Travel time in minutes at an assumed average speed.
pub fn estimated_travel_minutes(from: LatLng, to: LatLng, avg_speed_kmh: f64) -> Result<f64> {
    let meters = distance_meters(from, to)?;
    Ok(meters_to_minutes(meters, avg_speed_kmh))
}

pub fn meters_to_minutes(meters: f64, avg_speed_kmh: f64) -> f64 {
    let hours = (meters / 1000.0) / avg_speed_kmh;
    hours * 60.0
}

fn haversine_m(from: LatLng, to: LatLng) -> f64 {
    let lat1_rad = from.lat.to_radians();
    let lat2_rad = to.lat.to_radians();
    let delta_lat = (to.lat - from.lat).to_radians();
    let delta_lng = (to.lng - from.lng).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Pairwise great-circle distances for a fixed location set.
///
/// Coordinates are validated once on construction so lookups are infallible.
#[derive(Debug, Clone)]
pub struct HaversineMatrix {
    meters: Vec<Vec<f64>>,
}

impl HaversineMatrix {
    pub fn for_locations(locations: &[LatLng]) -> Result<Self> {
        for location in locations {
            validate(*location)?;
        }

        let n = locations.len();
        let mut meters = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = haversine_m(locations[i], locations[j]);
                meters[i][j] = d;
                meters[j][i] = d;
            }
        }

        Ok(Self { meters })
    }

    pub fn get(&self, from: usize, to: usize) -> f64 {
        self.meters[from][to]
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }
}
