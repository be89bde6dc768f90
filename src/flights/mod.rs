pub mod curve;
pub mod tiles;
pub mod viewport;

use log::{ debug, warn };
use serde::Serialize;
use std::collections::HashMap;

use crate::config::data::AirportTable;
use crate::models::flight::{ Airport, FlightRecord, LatLng };
use self::viewport::Viewport;

pub const MIN_OPACITY: f64 = 0.3;
pub const MAX_OPACITY: f64 = 1.0;
pub const MIN_WEIGHT: f64 = 1.0;
pub const MAX_WEIGHT: f64 = 4.0;

/// Unordered airport pair; `RouteKey::new("A", "B") == RouteKey::new("B", "A")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey(String, String);

impl RouteKey {
    pub fn new(a: &str, b: &str) -> Self {
        let (a, b) = (a.to_uppercase(), b.to_uppercase());
        if a <= b { RouteKey(a, b) } else { RouteKey(b, a) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
    pub count: usize,
    pub flights: Vec<FlightRecord>,
    pub path: Vec<LatLng>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouteStyle {
    pub opacity: f64,
    pub weight: f64,
}

impl RouteStyle {
    pub fn for_count(count: usize, max_count: usize) -> Self {
        let ratio = if max_count == 0 {
            0.0
        } else {
            ((count as f64) / (max_count as f64)).clamp(0.0, 1.0)
        };
        Self {
            opacity: MIN_OPACITY + (MAX_OPACITY - MIN_OPACITY) * ratio,
            weight: MIN_WEIGHT + (MAX_WEIGHT - MIN_WEIGHT) * ratio,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AirportSummary {
    #[serde(flatten)]
    pub airport: Airport,
    pub flight_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouteView<'a> {
    #[serde(flatten)]
    pub route: &'a Route,
    #[serde(flatten)]
    pub style: RouteStyle,
}

/// Routes in first-seen order, with the airport table they were built from.
#[derive(Debug, Clone)]
pub struct RouteSet<'a> {
    airports: &'a AirportTable,
    routes: Vec<Route>,
    index: HashMap<RouteKey, usize>,
    skipped: usize,
}

impl<'a> RouteSet<'a> {
    pub fn new(airports: &'a AirportTable) -> Self {
        Self {
            airports,
            routes: Vec::new(),
            index: HashMap::new(),
            skipped: 0,
        }
    }

    /// Adds one flight, merging it into the route for its airport pair.
    /// Returns false if the flight was skipped.
    pub fn add(&mut self, flight: FlightRecord) -> bool {
        let (from, to) = match (self.airports.get(&flight.origin), self.airports.get(&flight.destination)) {
            (Some(from), Some(to)) => (from.position(), to.position()),
            (from, _) => {
                let missing = if from.is_none() { &flight.origin } else { &flight.destination };
                warn!(
                    "Skipping flight {} {} -> {} on {}: unknown airport '{}'",
                    flight.flight_number,
                    flight.origin,
                    flight.destination,
                    flight.date,
                    missing
                );
                self.skipped += 1;
                return false;
            }
        };

        let key = RouteKey::new(&flight.origin, &flight.destination);
        if key.0 == key.1 {
            warn!("Skipping flight {} on {}: origin equals destination ({})", flight.flight_number, flight.date, key.0);
            self.skipped += 1;
            return false;
        }

        match self.index.get(&key) {
            Some(&i) => {
                let route = &mut self.routes[i];
                route.count += 1;
                route.flights.push(flight);
            }
            None => {
                debug!("New route {} <-> {}", key.0, key.1);
                self.index.insert(key, self.routes.len());
                self.routes.push(Route {
                    origin: flight.origin.to_uppercase(),
                    destination: flight.destination.to_uppercase(),
                    count: 1,
                    path: curve::route_path(from, to),
                    flights: vec![flight],
                });
            }
        }
        true
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn get(&self, a: &str, b: &str) -> Option<&Route> {
        self.index.get(&RouteKey::new(a, b)).map(|&i| &self.routes[i])
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn max_count(&self) -> usize {
        self.routes.iter().map(|r| r.count).max().unwrap_or(0)
    }

    pub fn style(&self, route: &Route) -> RouteStyle {
        RouteStyle::for_count(route.count, self.max_count())
    }

    pub fn views(&self) -> Vec<RouteView<'_>> {
        let max = self.max_count();
        self.routes
            .iter()
            .map(|route| RouteView {
                route,
                style: RouteStyle::for_count(route.count, max),
            })
            .collect()
    }

    /// Airports touched by at least one accepted flight, busiest first.
    pub fn airports(&self) -> Vec<AirportSummary> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for route in &self.routes {
            *counts.entry(route.origin.as_str()).or_default() += route.count;
            *counts.entry(route.destination.as_str()).or_default() += route.count;
        }
        let mut summaries: Vec<AirportSummary> = counts
            .into_iter()
            .filter_map(|(code, flight_count)| {
                self.airports.get(code).map(|airport| AirportSummary {
                    airport: airport.clone(),
                    flight_count,
                })
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.flight_count.cmp(&a.flight_count).then_with(|| a.airport.code.cmp(&b.airport.code))
        });
        summaries
    }

    /// Route endpoints as given in the airport table (not unwrapped).
    pub fn endpoints(&self) -> Vec<LatLng> {
        self.routes
            .iter()
            .flat_map(|route| [&route.origin, &route.destination])
            .filter_map(|code| self.airports.get(code))
            .map(Airport::position)
            .collect()
    }

    pub fn viewport(&self) -> Viewport {
        Viewport::fit(&self.endpoints())
    }
}

pub fn aggregate<I>(airports: &AirportTable, flights: I) -> RouteSet<'_>
    where I: IntoIterator<Item = FlightRecord>
{
    let mut set = RouteSet::new(airports);
    for flight in flights {
        set.add(flight);
    }
    if set.skipped > 0 {
        warn!("Skipped {} flight records during aggregation", set.skipped);
    }
    set
}
