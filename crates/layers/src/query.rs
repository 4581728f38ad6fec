use foundation::feature::Feature;
use serde_json::Value;

use crate::expression::{Expression, ExpressionError};

/// Parameters of a "query source features" call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub filter: Option<Expression>,
    /// Required for vector tile sources, ignored for GeoJSON sources.
    pub source_layer: Option<String>,
    /// Engine-side validation of `filter`; already-typed filters are valid by construction.
    pub validate: bool,
}

impl QueryOptions {
    pub fn filtered(filter: Expression) -> Self {
        Self {
            filter: Some(filter),
            source_layer: None,
            validate: true,
        }
    }

    /// Builds options from a JSON filter, validating it when `validate` is set.
    ///
    /// With validation off, a filter that fails to parse is dropped and the
    /// query matches everything, which is what an unvalidated engine would do
    /// with an expression it cannot compile.
    pub fn from_filter_json(filter: &Value, validate: bool) -> Result<Self, ExpressionError> {
        let filter = match Expression::from_json(filter) {
            Ok(expr) => Some(expr),
            Err(e) if validate => return Err(e),
            Err(_) => None,
        };
        Ok(Self {
            filter,
            source_layer: None,
            validate,
        })
    }

    pub fn with_source_layer(mut self, layer: impl Into<String>) -> Self {
        self.source_layer = Some(layer.into());
        self
    }

    pub fn accepts(&self, feature: &Feature) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|f| f.matches(&feature.properties))
    }
}

pub fn filter_features<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
    options: &QueryOptions,
) -> Vec<Feature> {
    features
        .into_iter()
        .filter(|f| options.accepts(f))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{QueryOptions, filter_features};
    use crate::expression::Expression;
    use foundation::feature::{Feature, Properties};
    use serde_json::json;

    fn features() -> Vec<Feature> {
        vec![
            Feature::point(1u64, 0.0, 0.0, Properties::new().with("cluster", true)),
            Feature::point(2u64, 1.0, 1.0, Properties::new().with("mag", 2.5)),
            Feature::point(3u64, 2.0, 2.0, Properties::new().with("cluster", true)),
        ]
    }

    #[test]
    fn no_filter_returns_everything() {
        let all = features();
        assert_eq!(filter_features(&all, &QueryOptions::default()).len(), 3);
    }

    #[test]
    fn cluster_filter_selects_clusters() {
        let all = features();
        let opts = QueryOptions::filtered(Expression::get("cluster").equal_to(true));
        let hits = filter_features(&all, &opts);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|f| f.properties.get("cluster").is_some()));
    }

    #[test]
    fn json_filter_validation() {
        let bad = json!(["~=", ["get", "cluster"], true]);
        assert!(QueryOptions::from_filter_json(&bad, true).is_err());
        let lax = QueryOptions::from_filter_json(&bad, false).unwrap();
        assert_eq!(lax.filter, None);

        let good = json!(["==", ["get", "cluster"], true]);
        let opts = QueryOptions::from_filter_json(&good, true).unwrap();
        assert_eq!(filter_features(&features(), &opts).len(), 2);
    }
}
