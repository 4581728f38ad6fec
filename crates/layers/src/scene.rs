use std::collections::BTreeMap;

use foundation::bounds::ViewState;
use serde_json::{Map, Value, json};

use crate::expression::Expression;
use crate::labels::LabelRule;
use crate::layer::{CirclePaint, LayerId, LayerKind, LayerSpec, SymbolLayout, SymbolPaint};
use crate::symbology::Classification;

pub const EARTHQUAKE_SOURCE_ID: &str = "earthquakes";
pub const EARTHQUAKE_DATA_URL: &str =
    "https://maplibre.org/maplibre-gl-js/docs/assets/earthquakes.geojson";

/// Clustered GeoJSON source with per-category aggregate counters.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoJsonSource {
    pub data: String,
    pub cluster: bool,
    pub cluster_radius: u32,
    pub cluster_properties: BTreeMap<String, Expression>,
}

impl GeoJsonSource {
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".into(), json!("geojson"));
        out.insert("data".into(), json!(self.data));
        out.insert("cluster".into(), json!(self.cluster));
        if self.cluster {
            out.insert("clusterRadius".into(), json!(self.cluster_radius));
            let props: Map<String, Value> = self
                .cluster_properties
                .iter()
                .map(|(k, e)| (k.clone(), e.to_json()))
                .collect();
            out.insert("clusterProperties".into(), Value::Object(props));
        }
        Value::Object(out)
    }
}

/// Declarative description handed to the map engine at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescription {
    pub style_url: String,
    pub view: ViewState,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub sources: BTreeMap<String, GeoJsonSource>,
    pub layers: Vec<LayerSpec>,
}

impl SceneDescription {
    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id.as_str() == id)
    }

    pub fn to_json(&self) -> Value {
        let sources: Map<String, Value> = self
            .sources
            .iter()
            .map(|(id, s)| (id.clone(), s.to_json()))
            .collect();
        json!({
            "style": self.style_url,
            "center": [self.view.longitude, self.view.latitude],
            "zoom": self.view.zoom,
            "minZoom": self.min_zoom,
            "maxZoom": self.max_zoom,
            "sources": sources,
            "layers": self.layers.iter().map(LayerSpec::to_json).collect::<Vec<_>>(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneSettings {
    pub style_url: String,
    pub view: ViewState,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub source_id: String,
    pub data_url: String,
    pub cluster_radius: u32,
    pub classification: Classification,
    pub labels: LabelRule,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            style_url: "https://demotiles.maplibre.org/style.json".to_string(),
            view: ViewState::new(0.0, 20.0, 0.3),
            min_zoom: 2.0,
            max_zoom: 22.0,
            source_id: EARTHQUAKE_SOURCE_ID.to_string(),
            data_url: EARTHQUAKE_DATA_URL.to_string(),
            cluster_radius: 80,
            classification: Classification::earthquakes(),
            labels: LabelRule::default(),
        }
    }
}

/// Features the engine synthesized by clustering.
pub fn cluster_filter() -> Expression {
    Expression::get("cluster").equal_to(true)
}

/// Individual events that were not absorbed into a cluster.
pub fn non_cluster_filter() -> Expression {
    Expression::get("cluster").not_equal_to(true)
}

/// Circle + magnitude label layers for single events; clusters are drawn as overlays.
pub fn earthquake_scene(settings: &SceneSettings) -> SceneDescription {
    let source = GeoJsonSource {
        data: settings.data_url.clone(),
        cluster: true,
        cluster_radius: settings.cluster_radius,
        cluster_properties: settings.classification.cluster_properties(),
    };

    let circle = LayerSpec {
        id: LayerId("earthquake_circle".to_string()),
        source: settings.source_id.clone(),
        filter: Some(non_cluster_filter()),
        kind: LayerKind::Circle(CirclePaint {
            color: settings.classification.color_expression(),
            opacity: 0.6,
            radius: 12.0,
        }),
    };

    let label = LayerSpec {
        id: LayerId("earthquake_label".to_string()),
        source: settings.source_id.clone(),
        filter: Some(non_cluster_filter()),
        kind: LayerKind::Symbol {
            layout: SymbolLayout {
                text_field: settings.labels.text_field(),
                text_font: settings.labels.fonts.clone(),
                text_size: settings.labels.text_size,
            },
            paint: SymbolPaint {
                text_color: settings.labels.text_color(),
            },
        },
    };

    SceneDescription {
        style_url: settings.style_url.clone(),
        view: settings.view,
        min_zoom: settings.min_zoom,
        max_zoom: settings.max_zoom,
        sources: BTreeMap::from([(settings.source_id.clone(), source)]),
        layers: vec![circle, label],
    }
}
