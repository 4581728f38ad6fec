use serde::{Deserialize, Serialize};

/// Longitude/latitude pair in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InvalidCoordinate {
    pub lng: f64,
    pub lat: f64,
}

impl std::fmt::Display for InvalidCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid coordinate: lng={} lat={}", self.lng, self.lat)
    }
}

impl std::error::Error for InvalidCoordinate {}

impl LngLat {
    /// Latitude must lie in [-90, 90]; longitude may wrap but must be finite.
    pub fn new(lng: f64, lat: f64) -> Result<Self, InvalidCoordinate> {
        if !lng.is_finite() || !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(InvalidCoordinate { lng, lat });
        }
        Ok(LngLat { lng, lat })
    }
}

/// Geographic rectangle. `west > east` means the box crosses the antimeridian.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LngLatBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl LngLatBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        LngLatBounds {
            west,
            south,
            east,
            north,
        }
    }

    pub fn contains(&self, p: LngLat) -> bool {
        if p.lat < self.south || p.lat > self.north {
            return false;
        }
        if self.west <= self.east {
            p.lng >= self.west && p.lng <= self.east
        } else {
            p.lng >= self.west || p.lng <= self.east
        }
    }
}

/// Camera position of the map view.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom: f64,
}

impl ViewState {
    pub const fn new(longitude: f64, latitude: f64, zoom: f64) -> Self {
        Self {
            longitude,
            latitude,
            zoom,
        }
    }

    pub fn center(&self) -> Result<LngLat, InvalidCoordinate> {
        LngLat::new(self.longitude, self.latitude)
    }
}
