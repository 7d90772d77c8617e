//! Test fixtures for field-route-planner.
//!
//! Provides:
//! - Real Las Vegas / Henderson service sites
//! - An in-memory day-plan store, plus a variant that parks inside the store
//!   so tests can hold a plan's gate
//! - Scripted routing providers

#![allow(dead_code)]

pub mod las_vegas_locations;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};

use field_route_planner::haversine;
use field_route_planner::model::{PlanStatus, RouteData, StopStatus};
use field_route_planner::online::{
    ProviderError, ProviderLeg, ProviderRequest, ProviderTrip, RoutingProviderClient,
};
use field_route_planner::traits::{Connectivity, DayPlanStore, StoreError};
use field_route_planner::{EngineConfig, LatLng, Stop};

pub use las_vegas_locations::*;

// ============================================================================
// Builders
// ============================================================================

pub fn morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

/// Engine config with no retry pause so fallback tests stay fast.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.provider.retry_backoff_ms = 0;
    config
}

/// `n` stops on a 0.01 degree grid around the Strip, seven per row.
pub fn grid_stops(n: usize) -> Vec<Stop> {
    (0..n)
        .map(|i| {
            Stop::new(
                format!("grid-{:02}", i),
                LatLng::new(36.10 + (i % 7) as f64 * 0.01, -115.17 + (i / 7) as f64 * 0.01),
                15,
            )
        })
        .collect()
}

pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting until {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Day-plan store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredPlan {
    status: PlanStatus,
    stops: Vec<Stop>,
    route: Option<RouteData>,
    writes: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    plans: Mutex<HashMap<String, StoredPlan>>,
    fail_persist: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, day_plan_id: &str, status: PlanStatus, stops: Vec<Stop>) -> Self {
        self.plans.lock().unwrap().insert(
            day_plan_id.to_string(),
            StoredPlan {
                status,
                stops,
                route: None,
                writes: 0,
            },
        );
        self
    }

    pub fn set_status(&self, day_plan_id: &str, status: PlanStatus) {
        if let Some(plan) = self.plans.lock().unwrap().get_mut(day_plan_id) {
            plan.status = status;
        }
    }

    pub fn mark_completed(&self, day_plan_id: &str, stop_id: &str) {
        if let Some(plan) = self.plans.lock().unwrap().get_mut(day_plan_id) {
            for stop in plan.stops.iter_mut().filter(|stop| stop.id == stop_id) {
                stop.status = StopStatus::Completed;
            }
        }
    }

    pub fn fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    pub fn route(&self, day_plan_id: &str) -> Option<RouteData> {
        self.plans
            .lock()
            .unwrap()
            .get(day_plan_id)
            .and_then(|plan| plan.route.clone())
    }

    pub fn writes(&self, day_plan_id: &str) -> usize {
        self.plans
            .lock()
            .unwrap()
            .get(day_plan_id)
            .map_or(0, |plan| plan.writes)
    }
}

impl DayPlanStore for MemoryStore {
    fn pending_stops(&self, day_plan_id: &str) -> Result<Vec<Stop>, StoreError> {
        let plans = self.plans.lock().unwrap();
        let plan = plans.get(day_plan_id).ok_or(StoreError::NotFound)?;
        Ok(plan.stops.iter().filter(|stop| stop.is_pending()).cloned().collect())
    }

    fn plan_status(&self, day_plan_id: &str) -> Result<PlanStatus, StoreError> {
        let plans = self.plans.lock().unwrap();
        plans
            .get(day_plan_id)
            .map(|plan| plan.status)
            .ok_or(StoreError::NotFound)
    }

    fn persist_route_data(&self, day_plan_id: &str, route: &RouteData) -> Result<(), StoreError> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        let mut plans = self.plans.lock().unwrap();
        let plan = plans.get_mut(day_plan_id).ok_or(StoreError::NotFound)?;
        plan.route = Some(route.clone());
        plan.writes += 1;
        Ok(())
    }

    fn find_stop(&self, day_plan_id: &str, stop_id: &str) -> Result<Option<Stop>, StoreError> {
        let plans = self.plans.lock().unwrap();
        let plan = plans.get(day_plan_id).ok_or(StoreError::NotFound)?;
        Ok(plan.stops.iter().find(|stop| stop.id == stop_id).cloned())
    }
}

/// A store whose `pending_stops` reports entry and then parks until the test
/// releases it, keeping the caller inside the plan's gate.
pub struct HeldStore {
    inner: MemoryStore,
    entered: Mutex<Sender<String>>,
    release: Mutex<Receiver<()>>,
}

pub struct StoreHandle {
    pub entered: Receiver<String>,
    release: Sender<()>,
}

impl StoreHandle {
    pub fn release(&self) {
        self.release.send(()).unwrap();
    }

    pub fn wait_entered(&self) -> String {
        self.entered.recv_timeout(Duration::from_secs(5)).unwrap()
    }
}

impl HeldStore {
    pub fn new(inner: MemoryStore) -> (Self, StoreHandle) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Self {
            inner,
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        };
        let handle = StoreHandle {
            entered: entered_rx,
            release: release_tx,
        };
        (store, handle)
    }

    pub fn writes(&self, day_plan_id: &str) -> usize {
        self.inner.writes(day_plan_id)
    }
}

impl DayPlanStore for HeldStore {
    fn pending_stops(&self, day_plan_id: &str) -> Result<Vec<Stop>, StoreError> {
        let _ = self.entered.lock().unwrap().send(day_plan_id.to_string());
        self.release
            .lock()
            .unwrap()
            .recv()
            .map_err(|_| StoreError::Backend("test released the store".to_string()))?;
        self.inner.pending_stops(day_plan_id)
    }

    fn plan_status(&self, day_plan_id: &str) -> Result<PlanStatus, StoreError> {
        self.inner.plan_status(day_plan_id)
    }

    fn persist_route_data(&self, day_plan_id: &str, route: &RouteData) -> Result<(), StoreError> {
        self.inner.persist_route_data(day_plan_id, route)
    }

    fn find_stop(&self, day_plan_id: &str, stop_id: &str) -> Result<Option<Stop>, StoreError> {
        self.inner.find_stop(day_plan_id, stop_id)
    }
}

// ============================================================================
// Routing providers
// ============================================================================

/// Provider that visits waypoints in request order with road legs 30% longer
/// than the straight line at 10 m/s, after failing a set number of calls.
#[derive(Default)]
pub struct ScriptedProvider {
    failures_left: AtomicUsize,
    calls: AtomicUsize,
    /// Fixed duration reported for every leg instead of the 10 m/s estimate.
    leg_seconds: Option<f64>,
}

impl ScriptedProvider {
    pub fn healthy() -> Self {
        Self::default()
    }

    pub fn failing_first(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            ..Self::default()
        }
    }

    pub fn with_leg_seconds(leg_seconds: f64) -> Self {
        Self {
            leg_seconds: Some(leg_seconds),
            ..Self::default()
        }
    }

    pub fn down() -> Self {
        Self::failing_first(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProviderClient for ScriptedProvider {
    fn optimize_route(&self, request: &ProviderRequest) -> Result<ProviderTrip, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProviderError::Timeout);
        }

        let legs = request
            .waypoints
            .windows(2)
            .map(|pair| {
                let straight = haversine::distance_meters(pair[0], pair[1]).unwrap();
                ProviderLeg {
                    distance_meters: straight * 1.3,
                    duration_seconds: self.leg_seconds.unwrap_or(straight * 1.3 / 10.0),
                }
            })
            .collect();

        Ok(ProviderTrip {
            waypoint_order: (0..request.waypoints.len()).collect(),
            legs,
        })
    }
}

impl RoutingProviderClient for &ScriptedProvider {
    fn optimize_route(&self, request: &ProviderRequest) -> Result<ProviderTrip, ProviderError> {
        (**self).optimize_route(request)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NoNetwork;

impl Connectivity for NoNetwork {
    fn is_online(&self) -> bool {
        false
    }
}
