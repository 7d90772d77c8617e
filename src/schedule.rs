//! Turns an ordered stop list plus per-hop legs into a timed route.

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, RouteError};
use crate::model::{Method, OptimizationMode, RouteData, RouteStop, Stop};

/// Travel from the previous point of the route to a stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leg {
    pub distance_meters: f64,
    pub travel_minutes: f64,
}

impl Leg {
    pub const ZERO: Leg = Leg {
        distance_meters: 0.0,
        travel_minutes: 0.0,
    };
}

/// `at` plus `minutes`, or `ScheduleOverflow` when the result does not fit
/// the calendar.
pub(crate) fn advance(at: DateTime<Utc>, minutes: f64) -> Result<DateTime<Utc>> {
    let millis = minutes * 60_000.0;
    (millis.is_finite() && millis.abs() < i64::MAX as f64)
        .then(|| Duration::try_milliseconds(millis.round() as i64))
        .flatten()
        .and_then(|offset| at.checked_add_signed(offset))
        .ok_or(RouteError::ScheduleOverflow { departure: at, minutes })
}

/// Build route data for stops visited in the given order.
///
/// `legs[k]` is the hop arriving at `ordered[k]`. No waiting time is inserted:
/// an arrival outside the stop's window is flagged, and service starts on
/// arrival.
pub fn schedule_route(
    ordered: &[&Stop],
    legs: &[Leg],
    departure: DateTime<Utc>,
    mode: OptimizationMode,
    method: Method,
) -> Result<RouteData> {
    debug_assert_eq!(ordered.len(), legs.len());

    let mut elapsed = 0.0;
    let mut total_distance_meters = 0.0;
    let mut stops = Vec::with_capacity(ordered.len());

    for (sequence, (stop, leg)) in ordered.iter().zip(legs).enumerate() {
        elapsed += leg.travel_minutes;
        total_distance_meters += leg.distance_meters;

        let estimated_arrival = advance(departure, elapsed)?;
        let violates_window = stop
            .time_window
            .is_some_and(|window| !window.contains(estimated_arrival));

        stops.push(RouteStop {
            stop_id: stop.id.clone(),
            sequence,
            estimated_arrival,
            travel_minutes_from_previous: leg.travel_minutes,
            distance_meters_from_previous: leg.distance_meters,
            violates_window,
        });

        elapsed += f64::from(stop.service_duration_minutes);
    }

    Ok(RouteData {
        optimized: true,
        optimization_mode: mode,
        stops,
        total_distance_meters,
        total_duration_minutes: elapsed,
        method,
        algorithm: None,
        batches: None,
        re_optimized_at: None,
        trigger: None,
        note: None,
    })
}
