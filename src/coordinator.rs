//! Public entry point of the planner.
//!
//! The coordinator picks online or offline optimization, batches oversized
//! stop sets, falls back to the offline optimizer when the provider fails, and
//! keeps at most one optimization in flight per day plan.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::batch::BatchPlanner;
use crate::config::EngineConfig;
use crate::error::{Result, RouteError};
use crate::haversine;
use crate::model::{Method, OptimizationMode, OptimizationRequest, RouteData, Stop, Trigger};
use crate::offline::OfflineRouteOptimizer;
use crate::online::{OnlineRouteOptimizer, OsrmTripClient, RoutingProviderClient};
use crate::traits::{
    store_error, Clock, Connectivity, DayPlanStore, RouteOptimizer, RouteOrigin, SystemClock,
};
use crate::trigger::{self, PhaseEvent, PlanPhase};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-plan slot in the coordinator's arena.
#[derive(Default)]
struct PlanSlot {
    state: Mutex<SlotState>,
    released: Condvar,
}

#[derive(Default)]
struct SlotState {
    running: bool,
    /// Ticket of the single automatic request waiting for the gate.
    queued: Option<u64>,
    next_ticket: u64,
    phase: Option<PlanPhase>,
    latest: Option<RouteData>,
}

/// Holds a plan's gate; releasing wakes any queued request.
struct PlanGuard<'a> {
    slot: &'a PlanSlot,
}

impl PlanGuard<'_> {
    fn state(&self) -> MutexGuard<'_, SlotState> {
        lock(&self.slot.state)
    }
}

impl Drop for PlanGuard<'_> {
    fn drop(&mut self) {
        lock(&self.slot.state).running = false;
        self.slot.released.notify_all();
    }
}

/// Retries a failed provider call once after a pause.
struct WithRetry<'a, O: ?Sized> {
    inner: &'a O,
    backoff: Duration,
}

impl<O: RouteOptimizer + ?Sized> RouteOptimizer for WithRetry<'_, O> {
    fn optimize(
        &self,
        stops: &[Stop],
        origin: &RouteOrigin,
        mode: OptimizationMode,
    ) -> Result<RouteData> {
        match self.inner.optimize(stops, origin, mode) {
            Err(RouteError::ProviderUnavailable(reason)) => {
                debug!(
                    %reason,
                    backoff_ms = self.backoff.as_millis() as u64,
                    "provider call failed, retrying once"
                );
                std::thread::sleep(self.backoff);
                self.inner.optimize(stops, origin, mode)
            }
            other => other,
        }
    }
}

pub struct RouteOptimizationCoordinator<S, P = OsrmTripClient> {
    store: S,
    online: Option<OnlineRouteOptimizer<P>>,
    offline: OfflineRouteOptimizer,
    batcher: BatchPlanner,
    /// Host-supplied network signal; without one every run is offline.
    connectivity: Option<Box<dyn Connectivity + Send + Sync>>,
    clock: Box<dyn Clock + Send + Sync>,
    config: EngineConfig,
    plans: Mutex<HashMap<String, Arc<PlanSlot>>>,
}

impl<S: DayPlanStore> RouteOptimizationCoordinator<S, OsrmTripClient> {
    /// Coordinator without a routing provider; every run is offline.
    pub fn offline(store: S, config: EngineConfig) -> Self {
        Self::new(store, config)
    }

    /// Coordinator backed by the OSRM server named in `config.provider`. It
    /// still runs offline until a connectivity signal reports online.
    pub fn with_osrm(
        store: S,
        config: EngineConfig,
    ) -> std::result::Result<Self, reqwest::Error> {
        let client = OsrmTripClient::new(config.provider.clone())?;
        Ok(Self::new(store, config).with_provider(client))
    }
}

impl<S, P> RouteOptimizationCoordinator<S, P>
where
    S: DayPlanStore,
    P: RoutingProviderClient,
{
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            online: None,
            offline: OfflineRouteOptimizer::from_config(&config),
            batcher: BatchPlanner::new(config.provider_limit),
            connectivity: None,
            clock: Box::new(SystemClock),
            config,
            plans: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_provider(mut self, client: P) -> Self {
        self.online = Some(OnlineRouteOptimizer::new(client, self.config.provider_limit));
        self
    }

    pub fn with_connectivity(
        mut self,
        connectivity: impl Connectivity + Send + Sync + 'static,
    ) -> Self {
        self.connectivity = Some(Box::new(connectivity));
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Optimize (or re-optimize) one day plan and persist the result.
    #[instrument(level = "info", skip_all, fields(day_plan_id = %request.day_plan_id))]
    pub fn optimize(&self, request: &OptimizationRequest) -> Result<RouteData> {
        if let Some(location) = request.current_location {
            haversine::validate(location)?;
        }

        let trigger = request.effective_trigger();
        let slot = self.slot(&request.day_plan_id);
        let guard = self.acquire(&slot, &request.day_plan_id, trigger)?;
        self.run(&guard, request, trigger)
    }

    /// Optimize several plans in parallel. Requests for the same plan still
    /// go through that plan's gate.
    pub fn optimize_all(&self, requests: &[OptimizationRequest]) -> Vec<Result<RouteData>>
    where
        Self: Sync,
    {
        requests.par_iter().map(|request| self.optimize(request)).collect()
    }

    /// The route most recently produced for a plan by this coordinator.
    pub fn latest_route(&self, day_plan_id: &str) -> Option<RouteData> {
        self.existing_slot(day_plan_id)
            .and_then(|slot| {
                let state = lock(&slot.state);
                state.latest.clone()
            })
    }

    pub fn phase(&self, day_plan_id: &str) -> Option<PlanPhase> {
        self.existing_slot(day_plan_id)
            .and_then(|slot| {
                let state = lock(&slot.state);
                state.phase
            })
    }

    pub fn is_running(&self, day_plan_id: &str) -> bool {
        self.existing_slot(day_plan_id)
            .is_some_and(|slot| {
                let state = lock(&slot.state);
                state.running
            })
    }

    /// Whether an automatic request is waiting for the plan's gate.
    pub fn is_queued(&self, day_plan_id: &str) -> bool {
        self.existing_slot(day_plan_id)
            .is_some_and(|slot| {
                let state = lock(&slot.state);
                state.queued.is_some()
            })
    }

    fn existing_slot(&self, day_plan_id: &str) -> Option<Arc<PlanSlot>> {
        lock(&self.plans).get(day_plan_id).cloned()
    }

    fn slot(&self, day_plan_id: &str) -> Arc<PlanSlot> {
        lock(&self.plans)
            .entry(day_plan_id.to_string())
            .or_default()
            .clone()
    }

    /// Take the plan's gate. Manual and untriggered requests fail fast when it
    /// is held or claimed by a queued request; automatic triggers wait in a
    /// depth-1 queue where a newer request supersedes an older waiting one.
    fn acquire<'a>(
        &self,
        slot: &'a PlanSlot,
        day_plan_id: &str,
        trigger: Option<Trigger>,
    ) -> Result<PlanGuard<'a>> {
        let mut state = lock(&slot.state);
        if !state.running && state.queued.is_none() {
            state.running = true;
            return Ok(PlanGuard { slot });
        }

        if !trigger.is_some_and(Trigger::is_automatic) {
            return Err(RouteError::Busy {
                day_plan_id: day_plan_id.to_string(),
                retry_after: Some(self.config.busy_retry_after()),
            });
        }

        state.next_ticket += 1;
        let ticket = state.next_ticket;
        if let Some(previous) = state.queued.replace(ticket) {
            debug!(superseded = previous, ticket, "coalescing queued re-optimization");
        }
        slot.released.notify_all();

        // The gate may already be free with the superseded waiter not yet awake.
        loop {
            if state.queued != Some(ticket) {
                return Err(RouteError::Busy {
                    day_plan_id: day_plan_id.to_string(),
                    retry_after: None,
                });
            }
            if !state.running {
                state.running = true;
                state.queued = None;
                return Ok(PlanGuard { slot });
            }
            state = slot.released.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn run(
        &self,
        guard: &PlanGuard<'_>,
        request: &OptimizationRequest,
        trigger: Option<Trigger>,
    ) -> Result<RouteData> {
        let day_plan_id = request.day_plan_id.as_str();
        let status = self
            .store
            .plan_status(day_plan_id)
            .map_err(|err| store_error(day_plan_id, err))?;
        let pending = self
            .store
            .pending_stops(day_plan_id)
            .map_err(|err| store_error(day_plan_id, err))?;

        let input = trigger::prepare(request, pending, |stop_id| {
            self.store
                .find_stop(day_plan_id, stop_id)
                .map_err(|err| store_error(day_plan_id, err))
        })?;
        if input.stops.is_empty() && !input.exhausted {
            return Err(RouteError::EmptyStopSet);
        }
        for stop in &input.stops {
            haversine::validate(stop.location)?;
        }

        let before = {
            let mut state = guard.state();
            let before = state
                .phase
                .map_or_else(|| PlanPhase::from(status), |phase| phase.reconcile(status));
            let during = if trigger.is_some() {
                before.apply(PhaseEvent::Triggered)
            } else {
                before
            };
            state.phase = Some(during);
            before
        };

        let now = self.clock.now();
        let origin = RouteOrigin::new(input.start, request.departure_at.unwrap_or(now));
        let outcome = if input.exhausted {
            Ok(RouteData::empty(request.mode, Method::Offline))
        } else {
            self.compute(request, &input.stops, &origin, trigger)
        };

        let persisted = outcome.and_then(|mut route| {
            trigger::stamp(&mut route, trigger, now);
            self.store
                .persist_route_data(day_plan_id, &route)
                .map_err(|err| RouteError::Replan {
                    day_plan_id: day_plan_id.to_string(),
                    trigger,
                    method: route.method,
                    source: Box::new(store_error(day_plan_id, err)),
                })?;
            Ok(route)
        });

        let mut state = guard.state();
        match persisted {
            Ok(route) => {
                let during = state.phase.unwrap_or(before);
                state.phase = Some(during.apply(PhaseEvent::Recomputed {
                    remaining: route.stops.len(),
                }));
                state.latest = Some(route.clone());
                info!(
                    trigger = ?trigger,
                    method = %route.method,
                    stops = route.stops.len(),
                    batches = route.batches.unwrap_or(1),
                    distance_m = route.total_distance_meters,
                    duration_min = route.total_duration_minutes,
                    "route optimized"
                );
                Ok(route)
            }
            Err(err) => {
                state.phase = Some(before);
                Err(err)
            }
        }
    }

    fn online_optimizer(
        &self,
        request: &OptimizationRequest,
    ) -> Option<&OnlineRouteOptimizer<P>> {
        let online = self.online.as_ref()?;
        if request.force_offline {
            return None;
        }
        match &self.connectivity {
            Some(signal) if signal.is_online() => Some(online),
            Some(_) => {
                debug!("connectivity reports offline, using offline optimizer");
                None
            }
            None => {
                debug!("no connectivity signal, using offline optimizer");
                None
            }
        }
    }

    fn plan_with<O>(
        &self,
        optimizer: &O,
        stops: &[Stop],
        origin: &RouteOrigin,
        request: &OptimizationRequest,
    ) -> Result<RouteData>
    where
        O: RouteOptimizer + ?Sized,
    {
        if request.force_batch || self.batcher.needs_batching(stops.len()) {
            self.batcher.plan(optimizer, stops, origin, request.mode)
        } else {
            optimizer.optimize(stops, origin, request.mode)
        }
    }

    fn compute(
        &self,
        request: &OptimizationRequest,
        stops: &[Stop],
        origin: &RouteOrigin,
        trigger: Option<Trigger>,
    ) -> Result<RouteData> {
        let replan_error = |method: Method, source: RouteError| RouteError::Replan {
            day_plan_id: request.day_plan_id.clone(),
            trigger,
            method,
            source: Box::new(source),
        };

        if let Some(online) = self.online_optimizer(request) {
            let retrying = WithRetry {
                inner: online,
                backoff: self.config.provider.retry_backoff(),
            };
            match self.plan_with(&retrying, stops, origin, request) {
                Ok(route) => return Ok(route),
                Err(RouteError::ProviderUnavailable(reason)) => {
                    warn!(
                        %reason,
                        "routing provider unavailable, falling back to offline optimizer"
                    );
                    let mut route = self
                        .plan_with(&self.offline, stops, origin, request)
                        .map_err(|source| replan_error(Method::Offline, source))?;
                    route.note = Some(format!(
                        "routing provider unavailable ({}); offline optimizer used",
                        reason
                    ));
                    return Ok(route);
                }
                Err(other) => return Err(replan_error(Method::Online, other)),
            }
        }

        self.plan_with(&self.offline, stops, origin, request)
            .map_err(|source| replan_error(Method::Offline, source))
    }
}
