//! field-route-planner
//!
//! Orders and times the stops of one worker's day plan, online through a
//! routing provider or offline with nearest-neighbor + 2-opt, and recomputes
//! the remaining plan when the day changes.

pub mod batch;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod haversine;
pub mod logging;
pub mod model;
pub mod offline;
pub mod online;
pub mod schedule;
pub mod traits;
pub mod trigger;

pub use config::{EngineConfig, ProviderConfig};
pub use coordinator::RouteOptimizationCoordinator;
pub use error::{Result, RouteError};
pub use model::{LatLng, OptimizationMode, OptimizationRequest, RouteData, Stop, Trigger};
