//! Data model shared by the optimizers, the batch planner and the coordinator.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A WGS84 coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<(f64, f64)> for LatLng {
    fn from((lat, lng): (f64, f64)) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.earliest && at <= self.latest
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
}

/// A single visit in a day plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stop {
    pub id: String,
    pub location: LatLng,
    pub service_duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    #[serde(default)]
    pub status: StopStatus,
}

impl Stop {
    pub fn new(id: impl Into<String>, location: LatLng, service_duration_minutes: u32) -> Self {
        Self {
            id: id.into(),
            location,
            service_duration_minutes,
            time_window: None,
            status: StopStatus::Pending,
        }
    }

    pub fn with_time_window(mut self, earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Self {
        self.time_window = Some(TimeWindow { earliest, latest });
        self
    }

    pub fn with_status(mut self, status: StopStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == StopStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Planned,
    Active,
    Completed,
}

/// The stops assigned to one worker for one calendar day.
///
/// Owned by the external store; the planner only reads pending stops from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPlan {
    pub id: String,
    pub worker_id: String,
    pub date: NaiveDate,
    pub stops: Vec<Stop>,
    pub status: PlanStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMode {
    #[default]
    Time,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Online,
    Offline,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Online => f.write_str("online"),
            Method::Offline => f.write_str("offline"),
        }
    }
}

/// The offline stage that produced the final order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    #[serde(rename = "nearest_neighbor")]
    NearestNeighbor,
    #[serde(rename = "nearest_neighbor+2opt")]
    NearestNeighborTwoOpt,
}

impl Algorithm {
    /// Combine the stage reports of independently optimized batches.
    pub fn merge(self, other: Algorithm) -> Algorithm {
        if self == Algorithm::NearestNeighborTwoOpt || other == Algorithm::NearestNeighborTwoOpt {
            Algorithm::NearestNeighborTwoOpt
        } else {
            Algorithm::NearestNeighbor
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::NearestNeighbor => f.write_str("nearest_neighbor"),
            Algorithm::NearestNeighborTwoOpt => f.write_str("nearest_neighbor+2opt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    JobCompleted,
    Manual,
    LocationDrift,
}

impl Trigger {
    /// Automatic triggers are coalesced when the plan is busy; manual ones
    /// fail fast so a person can re-request.
    pub fn is_automatic(self) -> bool {
        matches!(self, Trigger::JobCompleted | Trigger::LocationDrift)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::JobCompleted => f.write_str("job_completed"),
            Trigger::Manual => f.write_str("manual"),
            Trigger::LocationDrift => f.write_str("location_drift"),
        }
    }
}

/// One stop in a computed route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteStop {
    pub stop_id: String,
    pub sequence: usize,
    pub estimated_arrival: DateTime<Utc>,
    pub travel_minutes_from_previous: f64,
    pub distance_meters_from_previous: f64,
    pub violates_window: bool,
}

/// The computed schedule for a day plan. Every run replaces the previous one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteData {
    pub optimized: bool,
    pub optimization_mode: OptimizationMode,
    pub stops: Vec<RouteStop>,
    pub total_distance_meters: f64,
    pub total_duration_minutes: f64,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<Algorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batches: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub re_optimized_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RouteData {
    /// An empty route, used when the last pending stop has been completed.
    pub fn empty(mode: OptimizationMode, method: Method) -> Self {
        Self {
            optimized: true,
            optimization_mode: mode,
            stops: Vec::new(),
            total_distance_meters: 0.0,
            total_duration_minutes: 0.0,
            method,
            algorithm: None,
            batches: None,
            re_optimized_at: None,
            trigger: None,
            note: None,
        }
    }

    pub fn stop_ids(&self) -> Vec<&str> {
        self.stops.iter().map(|stop| stop.stop_id.as_str()).collect()
    }
}

/// One request to (re)optimize a day plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRequest {
    pub day_plan_id: String,
    #[serde(default)]
    pub mode: OptimizationMode,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub current_location: Option<LatLng>,
    #[serde(default, alias = "completedEventId")]
    pub completed_stop_id: Option<String>,
    #[serde(default)]
    pub force_offline: bool,
    #[serde(default, alias = "forceBatchOptimization")]
    pub force_batch: bool,
    /// When the worker leaves the origin. Defaults to the coordinator clock.
    #[serde(default)]
    pub departure_at: Option<DateTime<Utc>>,
}

impl OptimizationRequest {
    pub fn new(day_plan_id: impl Into<String>) -> Self {
        Self {
            day_plan_id: day_plan_id.into(),
            mode: OptimizationMode::Time,
            trigger: None,
            current_location: None,
            completed_stop_id: None,
            force_offline: false,
            force_batch: false,
            departure_at: None,
        }
    }

    pub fn mode(mut self, mode: OptimizationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn current_location(mut self, location: LatLng) -> Self {
        self.current_location = Some(location);
        self
    }

    pub fn completed_stop(mut self, stop_id: impl Into<String>) -> Self {
        self.completed_stop_id = Some(stop_id.into());
        self
    }

    pub fn force_offline(mut self) -> Self {
        self.force_offline = true;
        self
    }

    pub fn force_batch(mut self) -> Self {
        self.force_batch = true;
        self
    }

    pub fn departure_at(mut self, at: DateTime<Utc>) -> Self {
        self.departure_at = Some(at);
        self
    }

    /// The trigger in effect: a completed stop implies `job_completed`.
    pub fn effective_trigger(&self) -> Option<Trigger> {
        match (self.trigger, &self.completed_stop_id) {
            (Some(trigger), _) => Some(trigger),
            (None, Some(_)) => Some(Trigger::JobCompleted),
            (None, None) => None,
        }
    }
}
