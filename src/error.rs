//! Error taxonomy for the route planner.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error as ThisError;

use crate::model::{Method, Trigger};

#[derive(Debug, ThisError)]
pub enum RouteError {
    /// Malformed latitude/longitude, rejected before any computation.
    #[error("invalid coordinate lat={lat} lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("no pending stops to optimize")]
    EmptyStopSet,

    /// Transient provider failure. Recovered by the coordinator via retry and
    /// offline fallback; only escapes from the online optimizer itself.
    #[error("routing provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("day plan {day_plan_id} not found")]
    NotFound { day_plan_id: String },

    /// Another optimization holds the plan's gate. `retry_after` is set for
    /// manual requests and `None` for coalesced automatic triggers.
    #[error("optimization already in flight for day plan {day_plan_id}")]
    Busy {
        day_plan_id: String,
        retry_after: Option<Duration>,
    },

    /// An arrival time that cannot be represented, from absurd leg durations
    /// or a departure at the edge of the calendar.
    #[error("schedule overflow: {minutes} minutes after {departure}")]
    ScheduleOverflow { departure: DateTime<Utc>, minutes: f64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("day plan store failure: {0}")]
    Store(String),

    /// Unrecoverable failure after a method was chosen. The caller should keep
    /// the last known order.
    #[error(
        "could not re-plan day plan {day_plan_id} (trigger={}, method={method}): {source}",
        display_trigger(.trigger)
    )]
    Replan {
        day_plan_id: String,
        trigger: Option<Trigger>,
        method: Method,
        #[source]
        source: Box<RouteError>,
    },
}

pub type Result<T> = std::result::Result<T, RouteError>;

impl RouteError {
    pub fn provider(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable(message.into())
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

fn display_trigger(trigger: &Option<Trigger>) -> String {
    trigger
        .map(|t| t.to_string())
        .unwrap_or_else(|| "none".to_string())
}
