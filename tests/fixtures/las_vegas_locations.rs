//! Real Las Vegas / Henderson addresses used as service-call sites.
//!
//! Coordinates sourced from OpenStreetMap. They are routable with the OSRM
//! Nevada extract.

use field_route_planner::{LatLng, Stop};

/// A named site with coordinates.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(name: &'static str, lat: f64, lng: f64) -> Self {
        Self { name, lat, lng }
    }

    pub fn lat_lng(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

// ============================================================================
// Shops (worker start locations)
// ============================================================================

pub const SHOPS: &[Location] = &[
    Location::new("Paradise Road Shop", 36.1263781, -115.1658180),
    Location::new("Henderson Yard", 36.0308, -115.0825),
];

// ============================================================================
// Strip Corridor Service Calls
// ============================================================================

pub const STRIP_CALLS: &[Location] = &[
    Location::new("Koval Ln Condo Boiler", 36.1041592, -115.1722166),
    Location::new("Harmon Ave Kitchen Hood", 36.1107195, -115.1720818),
    Location::new("Flamingo Rd Walk-in Cooler", 36.1163982, -115.1763053),
    Location::new("Audrie St Ice Machine", 36.1175388, -115.1695094),
    Location::new("Sands Ave Rooftop Unit", 36.1231219, -115.1684514),
    Location::new("Tropicana Ave Grease Trap", 36.1024474, -115.1740110),
    Location::new("Reno Ave Backflow Test", 36.0910624, -115.1743364),
    Location::new("Las Vegas Blvd Fire Panel", 36.1139368, -115.1741462),
];

// ============================================================================
// Henderson Service Calls
// ============================================================================

pub const HENDERSON_CALLS: &[Location] = &[
    Location::new("Sunset Rd Water Heater", 36.0614, -115.0631),
    Location::new("Green Valley Pkwy Split System", 36.0335058, -114.9856162),
    Location::new("Stephanie St Thermostat", 36.0137634, -114.9928676),
    Location::new("Eastern Ave Condenser", 35.9949754, -115.0999810),
    Location::new("Horizon Ridge Heat Pump", 36.0090449, -114.9917034),
];

/// Pending stops for `locations`, ids `job-01`, `job-02`, ... in order.
pub fn stops_from(locations: &[Location], service_minutes: u32) -> Vec<Stop> {
    locations
        .iter()
        .enumerate()
        .map(|(i, location)| {
            Stop::new(format!("job-{:02}", i + 1), location.lat_lng(), service_minutes)
        })
        .collect()
}
