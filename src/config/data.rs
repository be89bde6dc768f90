use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use log::info;

use crate::models::flight::{ Airport, FlightRecord };

#[derive(Debug)]
pub enum DataError {
    DuplicateAirport(String),
    InvalidCoordinate(String),
    IoError(String, std::io::Error),
    JsonError(String, serde_json::Error),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::DuplicateAirport(code) => write!(f, "Airport '{}' is defined twice", code),
            DataError::InvalidCoordinate(code) =>
                write!(f, "Airport '{}' has coordinates outside lat [-90, 90] / lng [-180, 180]", code),
            DataError::IoError(path, e) => write!(f, "Failed to read data file '{}': {}", path, e),
            DataError::JsonError(path, e) => write!(f, "Failed to parse data file '{}': {}", path, e),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DataError::IoError(_, e) => Some(e),
            DataError::JsonError(_, e) => Some(e),
            _ => None,
        }
    }
}

/// Static airport reference table keyed by code.
#[derive(Debug, Clone, Default)]
pub struct AirportTable {
    airports: HashMap<String, Airport>,
}

impl AirportTable {
    pub fn new(airports: Vec<Airport>) -> Result<Self, DataError> {
        let mut table = HashMap::with_capacity(airports.len());
        for airport in airports {
            if !(-90.0..=90.0).contains(&airport.lat) || !(-180.0..=180.0).contains(&airport.lng) {
                return Err(DataError::InvalidCoordinate(airport.code));
            }
            let code = airport.code.to_uppercase();
            if table.contains_key(&code) {
                return Err(DataError::DuplicateAirport(code));
            }
            table.insert(code, airport);
        }
        Ok(Self { airports: table })
    }

    pub fn get(&self, code: &str) -> Option<&Airport> {
        self.airports.get(&code.to_uppercase())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AirportFile {
    List(Vec<Airport>),
    Keyed(HashMap<String, KeyedAirport>),
}

#[derive(Deserialize)]
struct KeyedAirport {
    lat: f64,
    lng: f64,
    name: String,
    city: String,
    country: String,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|e| DataError::IoError(display.clone(), e))?;
    serde_json::from_str(&content).map_err(|e| DataError::JsonError(display, e))
}

pub fn parse_airports(json: &str) -> Result<AirportTable, DataError> {
    let file: AirportFile = serde_json
        ::from_str(json)
        .map_err(|e| DataError::JsonError("<inline>".to_string(), e))?;
    airports_from_file(file)
}

fn airports_from_file(file: AirportFile) -> Result<AirportTable, DataError> {
    let airports = match file {
        AirportFile::List(list) => list,
        AirportFile::Keyed(map) =>
            map
                .into_iter()
                .map(|(code, a)| Airport {
                    code,
                    lat: a.lat,
                    lng: a.lng,
                    name: a.name,
                    city: a.city,
                    country: a.country,
                })
                .collect(),
    };
    AirportTable::new(airports)
}

/// Accepts either a JSON array of airports or an object keyed by airport code.
pub fn load_airports<P: AsRef<Path>>(path: P) -> Result<AirportTable, DataError> {
    let file: AirportFile = read_json(path.as_ref())?;
    let table = airports_from_file(file)?;
    info!("Loaded {} airports from {}", table.len(), path.as_ref().display());
    Ok(table)
}

pub fn load_flights<P: AsRef<Path>>(path: P) -> Result<Vec<FlightRecord>, DataError> {
    let flights: Vec<FlightRecord> = read_json(path.as_ref())?;
    info!("Loaded {} flight records from {}", flights.len(), path.as_ref().display());
    Ok(flights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_and_list_forms_are_equivalent() {
        let keyed = parse_airports(
            r#"{"HEL": {"lat": 60.3, "lng": 24.9, "name": "Helsinki-Vantaa", "city": "Helsinki", "country": "Finland"}}"#
        ).unwrap();
        let list = parse_airports(
            r#"[{"code": "HEL", "lat": 60.3, "lng": 24.9, "name": "Helsinki-Vantaa", "city": "Helsinki", "country": "Finland"}]"#
        ).unwrap();
        assert_eq!(keyed.get("HEL"), list.get("HEL"));
        assert!(keyed.contains("hel"));
    }

    #[test]
    fn duplicate_codes_are_rejected() {
        let result = parse_airports(
            r#"[{"code": "AMS", "lat": 52.3, "lng": 4.7, "name": "a", "city": "b", "country": "c"},
                {"code": "ams", "lat": 52.3, "lng": 4.7, "name": "a", "city": "b", "country": "c"}]"#
        );
        assert!(matches!(result, Err(DataError::DuplicateAirport(code)) if code == "AMS"));
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let result = parse_airports(
            r#"[{"code": "XXX", "lat": 95.0, "lng": 0.0, "name": "a", "city": "b", "country": "c"}]"#
        );
        assert!(matches!(result, Err(DataError::InvalidCoordinate(_))));
    }
}
