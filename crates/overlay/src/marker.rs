use foundation::bounds::LngLat;
use foundation::feature::Feature;
use layers::symbology::Classification;

use crate::donut::{ClusterGlyph, GlyphError};

/// An element pinned to a geographic position; the engine keeps it placed
/// on screen as the camera moves.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker<T> {
    pub position: LngLat,
    pub element: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    UnsupportedGeometry(&'static str),
    Glyph(GlyphError),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::UnsupportedGeometry(kind) => {
                write!(f, "cannot place a marker on a {kind} geometry")
            }
            RenderError::Glyph(e) => write!(f, "glyph: {e}"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Glyph(e) => Some(e),
            RenderError::UnsupportedGeometry(_) => None,
        }
    }
}

impl From<GlyphError> for RenderError {
    fn from(e: GlyphError) -> Self {
        RenderError::Glyph(e)
    }
}

/// Builds the overlay element for one newly visible feature.
pub trait OverlayFactory {
    type Element;

    fn render(&mut self, feature: &Feature) -> Result<Self::Element, RenderError>;
}

/// Adapts a closure into an [`OverlayFactory`].
pub struct FromFn<C>(C);

pub fn from_fn<T, C>(render: C) -> FromFn<C>
where
    C: FnMut(&Feature) -> Result<T, RenderError>,
{
    FromFn(render)
}

impl<T, C> OverlayFactory for FromFn<C>
where
    C: FnMut(&Feature) -> Result<T, RenderError>,
{
    type Element = T;

    fn render(&mut self, feature: &Feature) -> Result<T, RenderError> {
        (self.0)(feature)
    }
}

/// Donut-chart markers for cluster features.
#[derive(Debug, Clone)]
pub struct ClusterMarkerFactory {
    classification: Classification,
}

impl ClusterMarkerFactory {
    pub fn new(classification: Classification) -> Self {
        Self { classification }
    }
}

impl OverlayFactory for ClusterMarkerFactory {
    type Element = Marker<ClusterGlyph>;

    fn render(&mut self, feature: &Feature) -> Result<Self::Element, RenderError> {
        let position = feature
            .geometry
            .point()
            .ok_or(RenderError::UnsupportedGeometry(feature.geometry.type_name()))?;
        let element = ClusterGlyph::from_properties(&feature.properties, &self.classification)?;
        Ok(Marker { position, element })
    }
}

#[cfg(test)]
mod tests {
    use super::{ClusterMarkerFactory, OverlayFactory, RenderError};
    use crate::donut::GlyphError;
    use foundation::feature::{Feature, Geometry, Properties};
    use layers::symbology::Classification;
    use pretty_assertions::assert_eq;

    fn cluster_props(counts: [f64; 5]) -> Properties {
        let mut props = Properties::new().with("cluster", true);
        for (i, c) in counts.iter().enumerate() {
            props.insert(format!("mag{}", i + 1), *c);
        }
        props
    }

    #[test]
    fn places_glyph_at_cluster_point() {
        let mut factory = ClusterMarkerFactory::new(Classification::earthquakes());
        let feature = Feature::point(9u64, -120.5, 36.25, cluster_props([1.0, 2.0, 3.0, 4.0, 5.0]));
        let marker = factory.render(&feature).unwrap();
        assert_eq!((marker.position.lng, marker.position.lat), (-120.5, 36.25));
        assert_eq!(marker.element.total, 15);
    }

    #[test]
    fn rejects_non_point_geometry() {
        let mut factory = ClusterMarkerFactory::new(Classification::earthquakes());
        let feature = Feature {
            id: None,
            geometry: Geometry::LineString(vec![[0.0, 0.0], [1.0, 1.0]]),
            properties: cluster_props([1.0; 5]),
        };
        assert_eq!(
            factory.render(&feature),
            Err(RenderError::UnsupportedGeometry("LineString"))
        );
    }

    #[test]
    fn surfaces_empty_cluster() {
        let mut factory = ClusterMarkerFactory::new(Classification::earthquakes());
        let feature = Feature::point(1u64, 0.0, 0.0, cluster_props([0.0; 5]));
        assert_eq!(
            factory.render(&feature),
            Err(RenderError::Glyph(GlyphError::EmptyCluster))
        );
    }
}
