//! Offline route optimizer: nearest-neighbor construction followed by 2-opt.
//!
//! Needs no network. Paths are open (the worker does not return to the
//! origin) and always start at node 0 of the distance matrix, which is either
//! the worker's current location or the first stop.

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{Result, RouteError};
use crate::haversine::{self, HaversineMatrix};
use crate::model::{Algorithm, Method, OptimizationMode, RouteData, Stop};
use crate::schedule::{schedule_route, Leg};
use crate::traits::{RouteOptimizer, RouteOrigin};

/// Default cap on full 2-opt passes.
pub const DEFAULT_MAX_PASSES: usize = 200;

const IMPROVEMENT_EPSILON: f64 = 1e-9;

/// Outcome of a 2-opt run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwoOptStats {
    pub passes: usize,
    pub swaps: usize,
}

/// Greedy tour construction from node 0.
///
/// `keys[i]` breaks distance ties (ascending), so equal inputs always give
/// the same path.
pub fn nearest_neighbor(matrix: &HaversineMatrix, keys: &[&str]) -> Vec<usize> {
    let n = matrix.len();
    if n == 0 {
        return Vec::new();
    }

    let mut visited = vec![false; n];
    let mut path = Vec::with_capacity(n);
    let mut current = 0;
    visited[0] = true;
    path.push(0);

    while path.len() < n {
        let next = (0..n)
            .filter(|&candidate| !visited[candidate])
            .min_by(|&a, &b| {
                matrix
                    .get(current, a)
                    .total_cmp(&matrix.get(current, b))
                    .then_with(|| keys[a].cmp(keys[b]))
                    .then_with(|| a.cmp(&b))
            });

        match next {
            Some(node) => {
                visited[node] = true;
                path.push(node);
                current = node;
            }
            None => break,
        }
    }

    path
}

/// Improve an open path in place by reversing segments, keeping `path[0]`
/// fixed. Stops after a pass with no improving move or after `max_passes`.
pub fn two_opt(path: &mut [usize], matrix: &HaversineMatrix, max_passes: usize) -> TwoOptStats {
    let mut stats = TwoOptStats::default();
    let n = path.len();
    if n < 3 {
        return stats;
    }

    for _ in 0..max_passes {
        stats.passes += 1;
        let mut improved = false;

        for i in 0..n - 2 {
            for j in i + 2..n {
                let a = path[i];
                let b = path[i + 1];
                let c = path[j];

                // Open tail: reversing up to the last node drops edge (j, j+1).
                let (before, after) = match path.get(j + 1) {
                    Some(&d) => (
                        matrix.get(a, b) + matrix.get(c, d),
                        matrix.get(a, c) + matrix.get(b, d),
                    ),
                    None => (matrix.get(a, b), matrix.get(a, c)),
                };

                if after - before < -IMPROVEMENT_EPSILON {
                    path[i + 1..=j].reverse();
                    stats.swaps += 1;
                    improved = true;
                }
            }
        }

        if !improved {
            break;
        }
    }

    stats
}

/// Total length of an open path in meters.
pub fn path_length(path: &[usize], matrix: &HaversineMatrix) -> f64 {
    path.windows(2).map(|pair| matrix.get(pair[0], pair[1])).sum()
}

#[derive(Debug, Clone)]
pub struct OfflineRouteOptimizer {
    /// Assumed average driving speed in km/h.
    pub speed_kmh: f64,
    pub max_passes: usize,
}

impl Default for OfflineRouteOptimizer {
    fn default() -> Self {
        Self {
            speed_kmh: haversine::DEFAULT_SPEED_KMH,
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

impl OfflineRouteOptimizer {
    pub fn new(speed_kmh: f64, max_passes: usize) -> Self {
        Self { speed_kmh, max_passes }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.avg_speed_kmh, config.two_opt_max_passes)
    }
}

impl RouteOptimizer for OfflineRouteOptimizer {
    /// Great-circle meters are the cost in both modes. With one average
    /// speed, minimizing time and distance give the same order.
    fn optimize(
        &self,
        stops: &[Stop],
        origin: &RouteOrigin,
        mode: OptimizationMode,
    ) -> Result<RouteData> {
        if stops.is_empty() {
            return Err(RouteError::EmptyStopSet);
        }

        let mut points = Vec::with_capacity(stops.len() + 1);
        let mut keys: Vec<&str> = Vec::with_capacity(stops.len() + 1);
        if let Some(location) = origin.location {
            points.push(location);
            keys.push("");
        }
        let offset = points.len();
        for stop in stops {
            points.push(stop.location);
            keys.push(stop.id.as_str());
        }

        let matrix = HaversineMatrix::for_locations(&points)?;

        let mut path = nearest_neighbor(&matrix, &keys);
        let constructed = path_length(&path, &matrix);
        let stats = two_opt(&mut path, &matrix, self.max_passes);
        let improved = path_length(&path, &matrix);

        debug!(
            stops = stops.len(),
            passes = stats.passes,
            swaps = stats.swaps,
            constructed_m = constructed,
            improved_m = improved,
            "offline: 2-opt finished"
        );

        let algorithm = if stats.swaps > 0 {
            Algorithm::NearestNeighborTwoOpt
        } else {
            Algorithm::NearestNeighbor
        };

        let mut ordered = Vec::with_capacity(stops.len());
        let mut legs = Vec::with_capacity(stops.len());
        let mut previous: Option<usize> = None;
        for &node in &path {
            if node >= offset {
                let leg = match previous {
                    Some(from) => {
                        let distance_meters = matrix.get(from, node);
                        Leg {
                            distance_meters,
                            travel_minutes: haversine::meters_to_minutes(
                                distance_meters,
                                self.speed_kmh,
                            ),
                        }
                    }
                    None => Leg::ZERO,
                };
                ordered.push(&stops[node - offset]);
                legs.push(leg);
            }
            previous = Some(node);
        }

        let mut route = schedule_route(&ordered, &legs, origin.departure, mode, Method::Offline)?;
        route.algorithm = Some(algorithm);
        Ok(route)
    }
}
