use serde::Serialize;

use crate::models::flight::LatLng;

pub const MAX_LAT: f64 = 85.0;
pub const MAX_LNG: f64 = 180.0;
const LNG_PADDING_RATIO: f64 = 0.2;
const LAT_PADDING_RATIO: f64 = 0.1;
const MIN_LNG_PADDING: f64 = 5.0;
const MIN_LAT_PADDING: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomTier {
    Global,
    Continental,
    Regional,
    Country,
    Local,
}

impl ZoomTier {
    pub fn for_spread(spread: f64) -> Self {
        if spread >= 150.0 {
            ZoomTier::Global
        } else if spread >= 60.0 {
            ZoomTier::Continental
        } else if spread >= 20.0 {
            ZoomTier::Regional
        } else if spread >= 5.0 {
            ZoomTier::Country
        } else {
            ZoomTier::Local
        }
    }

    pub fn zoom(self) -> u8 {
        match self {
            ZoomTier::Global => 2,
            ZoomTier::Continental => 3,
            ZoomTier::Regional => 4,
            ZoomTier::Country => 5,
            ZoomTier::Local => 7,
        }
    }

    /// Furthest the user may zoom out.
    pub fn min_zoom(self) -> u8 {
        match self {
            ZoomTier::Global => 1,
            ZoomTier::Continental => 2,
            ZoomTier::Regional => 3,
            ZoomTier::Country => 4,
            ZoomTier::Local => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn world() -> Self {
        Self {
            south_west: LatLng::new(-MAX_LAT, -MAX_LNG),
            north_east: LatLng::new(MAX_LAT, MAX_LNG),
        }
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0
        )
    }

    pub fn contains(&self, point: LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&point.lat) &&
            (self.south_west.lng..=self.north_east.lng).contains(&point.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: u8,
    pub min_zoom: u8,
    pub tier: ZoomTier,
    pub bounds: Bounds,
}

impl Viewport {
    pub fn world() -> Self {
        let tier = ZoomTier::Global;
        Self {
            center: LatLng::new(20.0, 0.0),
            zoom: tier.zoom(),
            min_zoom: tier.min_zoom(),
            tier,
            bounds: Bounds::world(),
        }
    }

    /// Frames every point. Intended for route endpoints, not curve samples.
    pub fn fit(points: &[LatLng]) -> Self {
        let Some(first) = points.first() else {
            return Self::world();
        };

        let mut sw = *first;
        let mut ne = *first;
        for p in &points[1..] {
            sw.lat = sw.lat.min(p.lat);
            sw.lng = sw.lng.min(p.lng);
            ne.lat = ne.lat.max(p.lat);
            ne.lng = ne.lng.max(p.lng);
        }

        let lat_spread = ne.lat - sw.lat;
        let lng_spread = ne.lng - sw.lng;
        let tier = ZoomTier::for_spread(lat_spread.max(lng_spread));

        let lat_pad = (lat_spread * LAT_PADDING_RATIO).max(MIN_LAT_PADDING);
        let lng_pad = (lng_spread * LNG_PADDING_RATIO).max(MIN_LNG_PADDING);
        let bounds = Bounds {
            south_west: LatLng::new(
                (sw.lat - lat_pad).max(-MAX_LAT),
                (sw.lng - lng_pad).max(-MAX_LNG)
            ),
            north_east: LatLng::new((ne.lat + lat_pad).min(MAX_LAT), (ne.lng + lng_pad).min(MAX_LNG)),
        };

        Self {
            center: bounds.center(),
            zoom: tier.zoom(),
            min_zoom: tier.min_zoom(),
            tier,
            bounds,
        }
    }

    /// Clamps a requested map center into the padded bounds.
    pub fn constrain(&self, center: LatLng) -> LatLng {
        LatLng::new(
            center.lat.clamp(self.bounds.south_west.lat, self.bounds.north_east.lat),
            center.lng.clamp(self.bounds.south_west.lng, self.bounds.north_east.lng)
        )
    }

    pub fn clamp_zoom(&self, zoom: u8) -> u8 {
        zoom.max(self.min_zoom)
    }
}
