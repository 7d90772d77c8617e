//! Mid-day re-optimization triggers and the per-plan phase machine.
//!
//! ```text
//! Planned -> Active -> { ReoptimizationPending -> Active }* -> Completed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{Result, RouteError};
use crate::haversine;
use crate::model::{LatLng, OptimizationRequest, PlanStatus, RouteData, Stop, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    Planned,
    Active,
    ReoptimizationPending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// The worker started the first stop.
    Started,
    Triggered,
    Recomputed { remaining: usize },
}

impl PlanPhase {
    pub fn apply(self, event: PhaseEvent) -> PlanPhase {
        use PlanPhase::*;

        match (self, event) {
            (Planned, PhaseEvent::Started) => Active,
            (Planned | Active, PhaseEvent::Triggered) => ReoptimizationPending,
            (ReoptimizationPending, PhaseEvent::Recomputed { remaining: 0 }) => Completed,
            (ReoptimizationPending, PhaseEvent::Recomputed { .. }) => Active,
            (phase, _) => phase,
        }
    }

    /// Bring the locally tracked phase in line with the store's status.
    pub fn reconcile(self, status: PlanStatus) -> PlanPhase {
        match status {
            PlanStatus::Planned => self,
            PlanStatus::Active => self.apply(PhaseEvent::Started),
            PlanStatus::Completed => PlanPhase::Completed,
        }
    }
}

impl From<PlanStatus> for PlanPhase {
    fn from(status: PlanStatus) -> Self {
        PlanPhase::Planned.reconcile(status)
    }
}

/// Stops and start point for one recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplanInput {
    pub stops: Vec<Stop>,
    pub start: Option<LatLng>,
    /// The completed stop was the last pending one.
    pub exhausted: bool,
}

/// Derive the stops and start point for a run.
///
/// A completed stop is always removed from the pending set. For
/// `job_completed` the route starts at the supplied current location, else at
/// the completed stop; `find_stop` resolves a stop the store no longer
/// reports as pending.
pub fn prepare<F>(
    request: &OptimizationRequest,
    mut pending: Vec<Stop>,
    find_stop: F,
) -> Result<ReplanInput>
where
    F: FnOnce(&str) -> Result<Option<Stop>>,
{
    let trigger = request.effective_trigger();
    let completed = match request.completed_stop_id.as_deref() {
        Some(stop_id) => {
            let removed = pending
                .iter()
                .position(|stop| stop.id == stop_id)
                .map(|index| pending.remove(index));
            Some((stop_id, removed))
        }
        None => None,
    };

    let start = match (trigger, completed) {
        (Some(Trigger::JobCompleted), None) => {
            return Err(RouteError::invalid_request("job_completed requires a completed stop id"));
        }
        (Some(Trigger::JobCompleted), Some((stop_id, removed))) => match request.current_location {
            Some(location) => Some(location),
            None => {
                let stop = match removed {
                    Some(stop) => stop,
                    None => find_stop(stop_id)?.ok_or_else(|| {
                        RouteError::invalid_request(format!(
                            "completed stop {} is not part of the plan",
                            stop_id
                        ))
                    })?,
                };
                Some(stop.location)
            }
        },
        _ => request.current_location,
    };

    let exhausted = pending.is_empty() && trigger == Some(Trigger::JobCompleted);
    Ok(ReplanInput {
        stops: pending,
        start,
        exhausted,
    })
}

/// Mark a replacement route with the trigger that produced it.
pub fn stamp(route: &mut RouteData, trigger: Option<Trigger>, now: DateTime<Utc>) {
    if let Some(trigger) = trigger {
        route.trigger = Some(trigger);
        route.re_optimized_at = Some(now);
    }
}

/// Threshold check callers can use before sending a `location_drift` trigger.
#[derive(Debug, Clone, Copy)]
pub struct LocationDrift {
    threshold_meters: f64,
}

impl LocationDrift {
    pub fn new(threshold_meters: f64) -> Self {
        Self { threshold_meters }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.drift_threshold_meters)
    }

    pub fn exceeds(&self, planned: LatLng, actual: LatLng) -> Result<bool> {
        Ok(haversine::distance_meters(planned, actual)? > self.threshold_meters)
    }
}
