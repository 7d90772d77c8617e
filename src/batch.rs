//! Batch planning for stop sets larger than one provider call allows.
//!
//! Chunks follow input order rather than geography so results stay
//! deterministic. Each chunk is optimized on its own and the results are
//! stitched into a single route.

use tracing::debug;

use crate::error::{Result, RouteError};
use crate::model::{OptimizationMode, RouteData, Stop};
use crate::schedule::advance;
use crate::traits::{RouteOptimizer, RouteOrigin};

#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    batch_size: usize,
}

impl BatchPlanner {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn needs_batching(&self, stop_count: usize) -> bool {
        stop_count > self.batch_size
    }

    /// Optimize `stops` chunk by chunk with `optimizer`.
    ///
    /// Chunk `k > 0` starts at the last stop of chunk `k - 1` and departs when
    /// that chunk ends. The first error aborts the whole plan.
    pub fn plan<O>(
        &self,
        optimizer: &O,
        stops: &[Stop],
        origin: &RouteOrigin,
        mode: OptimizationMode,
    ) -> Result<RouteData>
    where
        O: RouteOptimizer + ?Sized,
    {
        if stops.is_empty() {
            return Err(RouteError::EmptyStopSet);
        }

        let mut results = Vec::new();
        let mut chunk_origin = *origin;

        for (index, chunk) in stops.chunks(self.batch_size).enumerate() {
            let route = optimizer.optimize(chunk, &chunk_origin, mode)?;

            let last_location = route
                .stops
                .last()
                .and_then(|last| chunk.iter().find(|stop| stop.id == last.stop_id))
                .map(|stop| stop.location);
            debug!(
                batch = index,
                stops = chunk.len(),
                distance_m = route.total_distance_meters,
                "batch: chunk optimized"
            );

            chunk_origin = RouteOrigin::new(
                last_location.or(chunk_origin.location),
                advance(chunk_origin.departure, route.total_duration_minutes)?,
            );
            results.push(route);
        }

        stitch(results)
    }
}

/// Concatenate per-batch routes into one with contiguous sequence numbers and
/// summed totals.
pub fn stitch(batches: Vec<RouteData>) -> Result<RouteData> {
    let count = batches.len();
    let mut iter = batches.into_iter();
    let mut stitched = iter.next().ok_or(RouteError::EmptyStopSet)?;

    for route in iter {
        let offset = stitched.stops.len();
        stitched.total_distance_meters += route.total_distance_meters;
        stitched.total_duration_minutes += route.total_duration_minutes;
        stitched.algorithm = match (stitched.algorithm, route.algorithm) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => a.or(b),
        };
        stitched.stops.extend(route.stops.into_iter().map(|mut stop| {
            stop.sequence += offset;
            stop
        }));
    }

    stitched.batches = Some(count);
    Ok(stitched)
}
