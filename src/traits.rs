//! Seams between the planner and its collaborators.
//!
//! The day-plan store, the routing provider, the clock and the connectivity
//! signal are all supplied by the host application.

use chrono::{DateTime, Utc};
use thiserror::Error as ThisError;

use crate::error::{Result, RouteError};
use crate::model::{LatLng, OptimizationMode, PlanStatus, RouteData, Stop};

/// Where and when a route starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteOrigin {
    /// Worker position. When `None`, the route starts at the first stop.
    pub location: Option<LatLng>,
    pub departure: DateTime<Utc>,
}

impl RouteOrigin {
    pub fn new(location: Option<LatLng>, departure: DateTime<Utc>) -> Self {
        Self { location, departure }
    }
}

/// Orders a set of stops into a timed route.
///
/// Implemented by the offline heuristic and the online provider adapter, and
/// consumed by the batch planner.
pub trait RouteOptimizer {
    fn optimize(
        &self,
        stops: &[Stop],
        origin: &RouteOrigin,
        mode: OptimizationMode,
    ) -> Result<RouteData>;
}

impl<T: RouteOptimizer + ?Sized> RouteOptimizer for &T {
    fn optimize(
        &self,
        stops: &[Stop],
        origin: &RouteOrigin,
        mode: OptimizationMode,
    ) -> Result<RouteData> {
        (**self).optimize(stops, origin, mode)
    }
}

#[derive(Debug, Clone, ThisError)]
pub enum StoreError {
    /// The plan does not exist or is not visible to the caller.
    #[error("day plan not found")]
    NotFound,
    #[error("{0}")]
    Backend(String),
}

/// Persistence for day plans. Tenant and ownership checks live here.
pub trait DayPlanStore {
    /// Stops of the plan whose status is still pending, in plan order.
    fn pending_stops(&self, day_plan_id: &str) -> std::result::Result<Vec<Stop>, StoreError>;

    fn plan_status(&self, day_plan_id: &str) -> std::result::Result<PlanStatus, StoreError>;

    /// Replace the plan's route data wholesale.
    fn persist_route_data(
        &self,
        day_plan_id: &str,
        route: &RouteData,
    ) -> std::result::Result<(), StoreError>;

    /// Look up any stop of the plan, whatever its status.
    fn find_stop(
        &self,
        day_plan_id: &str,
        stop_id: &str,
    ) -> std::result::Result<Option<Stop>, StoreError>;
}

pub(crate) fn store_error(day_plan_id: &str, err: StoreError) -> RouteError {
    match err {
        StoreError::NotFound => RouteError::NotFound {
            day_plan_id: day_plan_id.to_string(),
        },
        StoreError::Backend(message) => RouteError::Store(message),
    }
}

/// Whether the host currently has network connectivity.
pub trait Connectivity {
    fn is_online(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl Connectivity for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant, for reproducible runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
