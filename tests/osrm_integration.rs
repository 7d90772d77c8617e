//! Trip optimization against a real OSRM server.
//!
//! Needs Docker and a Nevada extract already prepared for the MLD pipeline
//! (`nevada-latest.osrm*`) in `OSRM_DATA_DIR`. Run with
//! `cargo test --test osrm_integration -- --ignored`.

mod fixtures;

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use testcontainers::core::{IntoContainerPort, Mount};
use testcontainers::runners::SyncRunner;
use testcontainers::{Container, GenericImage, ImageExt, ReuseDirective, TestcontainersError};

use field_route_planner::model::{Method, PlanStatus};
use field_route_planner::online::{OsrmTripClient, ProviderRequest, RoutingProviderClient};
use field_route_planner::traits::AlwaysOnline;
use field_route_planner::{
    OptimizationMode, OptimizationRequest, ProviderConfig, RouteOptimizationCoordinator,
};

use fixtures::*;

fn osrm_container() -> Result<(Container<GenericImage>, String), TestcontainersError> {
    let data_dir =
        PathBuf::from(env::var("OSRM_DATA_DIR").unwrap_or_else(|_| "osrm-data".to_string()));
    let dataset = data_dir.join("nevada-latest.osrm.partition");
    if !dataset.exists() {
        return Err(TestcontainersError::other(format!(
            "no prepared OSRM dataset at {}",
            dataset.display()
        )));
    }
    let data_dir = data_dir
        .canonicalize()
        .map_err(|err| TestcontainersError::other(format!("OSRM data dir: {}", err)))?;

    let image = GenericImage::new("osrm/osrm-backend", "latest")
        .with_exposed_port(5000.tcp())
        .with_mount(Mount::bind_mount(data_dir.to_string_lossy().to_string(), "/data"))
        .with_cmd(vec!["osrm-routed", "--algorithm", "mld", "/data/nevada-latest.osrm"])
        .with_container_name("osrm-nevada-trip")
        .with_startup_timeout(Duration::from_secs(30))
        .with_reuse(ReuseDirective::Always);

    let container = image.start()?;
    let port = container.get_host_port_ipv4(5000.tcp())?;
    Ok((container, format!("http://127.0.0.1:{}", port)))
}

fn provider_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        timeout_secs: 10,
        ..ProviderConfig::default()
    }
}

#[test]
#[ignore = "needs docker and a prepared OSRM dataset"]
fn osrm_trip_orders_henderson_calls() {
    let (container, base_url) = osrm_container().expect("start OSRM container");
    let client = OsrmTripClient::new(provider_config(&base_url)).expect("build OSRM client");

    let mut waypoints = vec![SHOPS[1].lat_lng()];
    waypoints.extend(HENDERSON_CALLS.iter().map(|location| location.lat_lng()));
    let request = ProviderRequest {
        waypoints,
        mode: OptimizationMode::Time,
    };

    // The server may still be loading the dataset right after start.
    let start = Instant::now();
    let trip = loop {
        match client.optimize_route(&request) {
            Ok(trip) => break trip,
            Err(err) if start.elapsed() < Duration::from_secs(15) => {
                eprintln!("OSRM not ready: {}", err);
                std::thread::sleep(Duration::from_millis(500));
            }
            Err(err) => {
                if let Ok(stderr) = container.stderr_to_vec() {
                    eprintln!("OSRM stderr:\n{}", String::from_utf8_lossy(&stderr));
                }
                panic!("OSRM trip failed: {}", err);
            }
        }
    };

    assert_eq!(trip.waypoint_order.len(), HENDERSON_CALLS.len() + 1);
    assert_eq!(trip.waypoint_order[0], 0);
    let mut visited = trip.waypoint_order.clone();
    visited.sort_unstable();
    assert_eq!(visited, (0..=HENDERSON_CALLS.len()).collect::<Vec<_>>());
    assert_eq!(trip.legs.len(), HENDERSON_CALLS.len());

    let mut engine = test_config();
    engine.provider = provider_config(&base_url);
    let store =
        MemoryStore::new().with_plan("plan-1", PlanStatus::Active, stops_from(HENDERSON_CALLS, 45));
    let coordinator = RouteOptimizationCoordinator::with_osrm(store, engine)
        .expect("build coordinator")
        .with_connectivity(AlwaysOnline);

    let route = coordinator
        .optimize(&OptimizationRequest::new("plan-1").current_location(SHOPS[1].lat_lng()))
        .expect("optimize plan");

    assert_eq!(route.method, Method::Online);
    assert_eq!(route.stops.len(), HENDERSON_CALLS.len());
    assert!(route.total_distance_meters > 0.0);

    drop(container);
}
