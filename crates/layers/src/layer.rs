use serde_json::{Map, Value, json};

use crate::expression::Expression;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CirclePaint {
    pub color: Expression,
    pub opacity: f64,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolLayout {
    pub text_field: Expression,
    pub text_font: Vec<String>,
    pub text_size: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolPaint {
    pub text_color: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Circle(CirclePaint),
    Symbol {
        layout: SymbolLayout,
        paint: SymbolPaint,
    },
}

/// One styled layer drawn by the engine from a source.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: LayerId,
    pub source: String,
    pub filter: Option<Expression>,
    pub kind: LayerKind,
}

impl LayerSpec {
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            LayerKind::Circle(_) => "circle",
            LayerKind::Symbol { .. } => "symbol",
        }
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".into(), json!(self.id.as_str()));
        out.insert("type".into(), json!(self.type_name()));
        out.insert("source".into(), json!(self.source));
        if let Some(filter) = &self.filter {
            out.insert("filter".into(), filter.to_json());
        }
        match &self.kind {
            LayerKind::Circle(paint) => {
                out.insert(
                    "paint".into(),
                    json!({
                        "circle-color": paint.color.to_json(),
                        "circle-opacity": paint.opacity,
                        "circle-radius": paint.radius,
                    }),
                );
            }
            LayerKind::Symbol { layout, paint } => {
                out.insert(
                    "layout".into(),
                    json!({
                        "text-field": layout.text_field.to_json(),
                        "text-font": layout.text_font,
                        "text-size": layout.text_size,
                    }),
                );
                out.insert(
                    "paint".into(),
                    json!({ "text-color": paint.text_color.to_json() }),
                );
            }
        }
        Value::Object(out)
    }
}
