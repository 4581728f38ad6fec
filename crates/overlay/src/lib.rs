//! Map overlays that track the engine's visible features.
//!
//! The [`Reconciler`] keeps one overlay element per visible feature identity
//! and reuses elements across viewport changes; [`ClusterGlyph`] draws the
//! donut chart placed on each cluster.

pub mod donut;
pub mod engine;
pub mod marker;
pub mod reconciler;
pub mod retained;

pub use donut::*;
pub use engine::*;
pub use marker::*;
pub use reconciler::*;
pub use retained::*;
