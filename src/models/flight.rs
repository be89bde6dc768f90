use serde::{ Serialize, Deserialize };

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightRecord {
    pub origin: String,
    pub destination: String,
    pub date: String,
    #[serde(default)]
    pub flight_number: String,
    #[serde(default)]
    pub airline: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub code: String,
    pub lat: f64,
    pub lng: f64,
    pub name: String,
    pub city: String,
    pub country: String,
}

impl Airport {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}
