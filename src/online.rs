//! Online route optimization through an external routing service.
//!
//! The adapter makes exactly one provider call per invocation and never
//! retries; retry and fallback are the coordinator's job. Provider answers are
//! checked against great-circle distances before they are trusted.

use serde::Deserialize;
use thiserror::Error as ThisError;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{Result, RouteError};
use crate::haversine;
use crate::model::{LatLng, Method, OptimizationMode, RouteData, Stop};
use crate::schedule::{schedule_route, Leg};
use crate::traits::{RouteOptimizer, RouteOrigin};

/// A provider leg may undercut the straight line by this factor (rounding,
/// snapping to the road network) before it is considered bogus.
const MIN_LEG_TO_GREAT_CIRCLE: f64 = 0.9;
const LEG_SLACK_METERS: f64 = 25.0;
/// No single hop of a day plan takes longer than a day.
const MAX_LEG_SECONDS: f64 = 86_400.0;
/// Roughly 250 km/h; anything faster is not a road answer.
const MAX_SPEED_MPS: f64 = 70.0;

/// One trip request. `waypoints[0]` is the fixed start of the trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub waypoints: Vec<LatLng>,
    pub mode: OptimizationMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderLeg {
    pub distance_meters: f64,
    pub duration_seconds: f64,
}

/// Provider answer: the visiting order as indices into the request's
/// waypoints, and one leg per hop.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderTrip {
    pub waypoint_order: Vec<usize>,
    pub legs: Vec<ProviderLeg>,
}

#[derive(Debug, ThisError)]
pub enum ProviderError {
    #[error("provider call timed out")]
    Timeout,
    #[error("provider request failed: {0}")]
    Http(reqwest::Error),
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Http(err)
        }
    }
}

/// Client for an external trip-optimization service.
pub trait RoutingProviderClient {
    fn optimize_route(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderTrip, ProviderError>;
}

impl<T: RoutingProviderClient + ?Sized> RoutingProviderClient for Box<T> {
    fn optimize_route(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderTrip, ProviderError> {
        (**self).optimize_route(request)
    }
}

/// OSRM `trip` service client.
///
/// OSRM always minimizes duration; the requested mode is only recorded on the
/// resulting route.
#[derive(Debug, Clone)]
pub struct OsrmTripClient {
    config: ProviderConfig,
    client: reqwest::blocking::Client,
}

impl OsrmTripClient {
    pub fn new(config: ProviderConfig) -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self { config, client })
    }

    fn trip_url(&self, waypoints: &[LatLng]) -> String {
        let coords = waypoints
            .iter()
            .map(|point| format!("{:.6},{:.6}", point.lng, point.lat))
            .collect::<Vec<_>>()
            .join(";");

        format!(
            "{}/trip/v1/{}/{}?roundtrip=false&source=first&destination=any\
             &overview=false&steps=false",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            coords
        )
    }
}

impl RoutingProviderClient for OsrmTripClient {
    fn optimize_route(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<ProviderTrip, ProviderError> {
        let response = self.client.get(self.trip_url(&request.waypoints)).send()?;
        let status = response.status();
        let body = response.json::<OsrmTripResponse>()?;

        if body.code != "Ok" {
            return Err(ProviderError::Rejected(format!(
                "{} ({})",
                body.code,
                body.message.unwrap_or_default()
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::Rejected(format!("HTTP {}", status)));
        }

        body.into_trip(request.waypoints.len())
    }
}

#[derive(Debug, Deserialize)]
struct OsrmTripResponse {
    code: String,
    message: Option<String>,
    #[serde(default)]
    waypoints: Vec<OsrmWaypoint>,
    #[serde(default)]
    trips: Vec<OsrmTrip>,
}

#[derive(Debug, Deserialize)]
struct OsrmWaypoint {
    waypoint_index: usize,
    trips_index: usize,
}

#[derive(Debug, Deserialize)]
struct OsrmTrip {
    legs: Vec<OsrmLeg>,
}

#[derive(Debug, Deserialize)]
struct OsrmLeg {
    distance: f64,
    duration: f64,
}

impl OsrmTripResponse {
    /// OSRM reports, for each input coordinate, its position in the trip.
    /// Invert that into a visiting order.
    fn into_trip(self, expected: usize) -> std::result::Result<ProviderTrip, ProviderError> {
        if self.waypoints.len() != expected {
            return Err(ProviderError::Malformed(format!(
                "expected {} waypoints, got {}",
                expected,
                self.waypoints.len()
            )));
        }
        if self.trips.len() != 1 || self.waypoints.iter().any(|w| w.trips_index != 0) {
            return Err(ProviderError::Malformed("expected a single trip".to_string()));
        }

        let mut order: Vec<Option<usize>> = vec![None; expected];
        for (input_index, waypoint) in self.waypoints.iter().enumerate() {
            let slot = order.get_mut(waypoint.waypoint_index).ok_or_else(|| {
                ProviderError::Malformed(format!(
                    "waypoint_index {} out of range",
                    waypoint.waypoint_index
                ))
            })?;
            if slot.replace(input_index).is_some() {
                return Err(ProviderError::Malformed(format!(
                    "duplicate waypoint_index {}",
                    waypoint.waypoint_index
                )));
            }
        }

        let waypoint_order = order.into_iter().flatten().collect();
        let legs = self
            .trips
            .into_iter()
            .flat_map(|trip| trip.legs)
            .map(|leg| ProviderLeg {
                distance_meters: leg.distance,
                duration_seconds: leg.duration,
            })
            .collect();

        Ok(ProviderTrip { waypoint_order, legs })
    }
}

/// Adapts a routing provider to the [`RouteOptimizer`] seam.
///
/// `max_stops` bounds the stops of one call; the start point is sent as an
/// extra waypoint on top.
#[derive(Debug, Clone)]
pub struct OnlineRouteOptimizer<C> {
    client: C,
    max_stops: usize,
}

impl<C> OnlineRouteOptimizer<C> {
    pub fn new(client: C, max_stops: usize) -> Self {
        Self { client, max_stops }
    }

    pub fn max_stops(&self) -> usize {
        self.max_stops
    }

    pub fn client(&self) -> &C {
        &self.client
    }
}

impl<C: RoutingProviderClient> RouteOptimizer for OnlineRouteOptimizer<C> {
    fn optimize(
        &self,
        stops: &[Stop],
        origin: &RouteOrigin,
        mode: OptimizationMode,
    ) -> Result<RouteData> {
        if stops.is_empty() {
            return Err(RouteError::EmptyStopSet);
        }
        if stops.len() > self.max_stops {
            return Err(RouteError::provider(format!(
                "{} stops exceed the per-call limit of {}",
                stops.len(),
                self.max_stops
            )));
        }

        let mut waypoints = Vec::with_capacity(stops.len() + 1);
        if let Some(location) = origin.location {
            waypoints.push(haversine::validate(location)?);
        }
        let offset = waypoints.len();
        for stop in stops {
            waypoints.push(haversine::validate(stop.location)?);
        }

        if waypoints.len() == 1 {
            return schedule_route(
                &[&stops[0]],
                &[Leg::ZERO],
                origin.departure,
                mode,
                Method::Online,
            );
        }

        let request = ProviderRequest { waypoints, mode };
        let trip = self
            .client
            .optimize_route(&request)
            .map_err(|err| RouteError::provider(err.to_string()))?;

        let legs = validate_trip(&trip, &request.waypoints)?;
        debug!(stops = stops.len(), "online: provider trip accepted");

        let mut ordered = Vec::with_capacity(stops.len());
        let mut stop_legs = Vec::with_capacity(stops.len());
        for (&node, leg) in trip.waypoint_order.iter().zip(legs) {
            if node >= offset {
                ordered.push(&stops[node - offset]);
                stop_legs.push(leg);
            }
        }

        schedule_route(&ordered, &stop_legs, origin.departure, mode, Method::Online)
            .map_err(|err| malformed(err.to_string()))
    }
}

/// Check a provider trip against the request and return one leg per visited
/// waypoint (a zero leg for the start).
fn validate_trip(trip: &ProviderTrip, waypoints: &[LatLng]) -> Result<Vec<Leg>> {
    let n = waypoints.len();
    let order = &trip.waypoint_order;

    if order.len() != n {
        return Err(malformed(format!("order has {} entries for {} waypoints", order.len(), n)));
    }
    if order.first() != Some(&0) {
        return Err(malformed("trip does not start at the source waypoint".to_string()));
    }
    let mut seen = vec![false; n];
    for &index in order {
        match seen.get_mut(index) {
            Some(flag) if !*flag => *flag = true,
            _ => return Err(malformed(format!("waypoint {} missing or repeated", index))),
        }
    }
    if trip.legs.len() != n - 1 {
        return Err(malformed(format!("{} legs for {} waypoints", trip.legs.len(), n)));
    }

    let mut legs = Vec::with_capacity(n);
    legs.push(Leg::ZERO);
    for (hop, leg) in order.windows(2).zip(&trip.legs) {
        let sane = leg.distance_meters.is_finite()
            && leg.duration_seconds.is_finite()
            && leg.distance_meters >= 0.0
            && (0.0..=MAX_LEG_SECONDS).contains(&leg.duration_seconds);
        if !sane {
            return Err(malformed(format!("invalid leg metrics {:?}", leg)));
        }

        let straight = haversine::distance_meters(waypoints[hop[0]], waypoints[hop[1]])?;
        if leg.distance_meters < straight * MIN_LEG_TO_GREAT_CIRCLE - LEG_SLACK_METERS {
            return Err(malformed(format!(
                "leg {}->{} of {:.0} m is shorter than the {:.0} m straight line",
                hop[0], hop[1], leg.distance_meters, straight
            )));
        }

        if leg.distance_meters > leg.duration_seconds * MAX_SPEED_MPS + LEG_SLACK_METERS {
            return Err(malformed(format!(
                "leg {}->{} covers {:.0} m in {:.0} s",
                hop[0], hop[1], leg.distance_meters, leg.duration_seconds
            )));
        }

        legs.push(Leg {
            distance_meters: leg.distance_meters,
            travel_minutes: leg.duration_seconds / 60.0,
        });
    }

    Ok(legs)
}

fn malformed(detail: String) -> RouteError {
    RouteError::provider(ProviderError::Malformed(detail).to_string())
}
