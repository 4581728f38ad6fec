use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bounds::LngLat;
use crate::ids::FeatureId;

/// GeoJSON-shaped geometry, positions as `[lng, lat]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point([f64; 2]),
    LineString(Vec<[f64; 2]>),
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    pub fn point(&self) -> Option<LngLat> {
        match self {
            Geometry::Point([lng, lat]) => Some(LngLat {
                lng: *lng,
                lat: *lat,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<u64> for PropertyValue {
    fn from(n: u64) -> Self {
        PropertyValue::Number(n as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

/// Named attribute bag attached to a feature.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropertyValue::as_f64)
    }

    /// A non-negative integral number, as produced by cluster aggregation.
    pub fn count(&self, key: &str) -> Option<u64> {
        let n = self.number(key)?;
        // `u64::MAX as f64` rounds up to 2^64, which is already out of range.
        if n < 0.0 || n.fract() != 0.0 || n >= u64::MAX as f64 {
            return None;
        }
        Some(n as u64)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }
}

/// A feature as materialized by the map engine for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: Option<FeatureId>,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: Properties,
}

impl Feature {
    pub fn point(id: impl Into<FeatureId>, lng: f64, lat: f64, properties: Properties) -> Self {
        Self {
            id: Some(id.into()),
            geometry: Geometry::Point([lng, lat]),
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Feature, FeatureId, Geometry, Properties, PropertyValue};

    #[test]
    fn count_requires_non_negative_integer() {
        let props = Properties::new()
            .with("a", 3.0)
            .with("b", -1.0)
            .with("c", 2.5)
            .with("d", "3");
        assert_eq!(props.count("a"), Some(3));
        assert_eq!(props.count("b"), None);
        assert_eq!(props.count("c"), None);
        assert_eq!(props.count("d"), None);
        assert_eq!(props.count("missing"), None);
    }

    #[test]
    fn count_rejects_values_past_u64() {
        let props = Properties::new()
            .with("max", 18_446_744_073_709_551_616.0)
            .with("big", 1e19);
        assert_eq!(props.count("max"), None);
        assert_eq!(props.count("big"), Some(10_000_000_000_000_000_000));
    }

    #[test]
    fn negative_feature_id_parses() {
        let json = r#"{"id": -3, "geometry": {"type": "Point", "coordinates": [0, 0]}}"#;
        let f: Feature = serde_json::from_str(json).unwrap();
        assert_eq!(f.id, Some(FeatureId::Signed(-3)));
    }

    #[test]
    fn parses_geojson_feature() {
        let json = r#"{
            "id": 12,
            "geometry": {"type": "Point", "coordinates": [-151.5, 63.1]},
            "properties": {"cluster": true, "mag1": 4, "name": null}
        }"#;
        let f: Feature = serde_json::from_str(json).unwrap();
        assert_eq!(f.id, Some(FeatureId::Unsigned(12)));
        assert_eq!(f.geometry, Geometry::Point([-151.5, 63.1]));
        assert_eq!(f.properties.get("cluster"), Some(&PropertyValue::Bool(true)));
        assert_eq!(f.properties.count("mag1"), Some(4));
        assert!(f.properties.get("name").is_some_and(PropertyValue::is_null));
    }

    #[test]
    fn missing_id_deserializes_as_none() {
        let json = r#"{"geometry": {"type": "Point", "coordinates": [0, 0]}}"#;
        let f: Feature = serde_json::from_str(json).unwrap();
        assert_eq!(f.id, None);
        assert!(f.properties.is_empty());
    }
}
