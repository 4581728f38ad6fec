pub mod bounds;
pub mod feature;
pub mod ids;

// Foundation crate: small, well-tested primitives only.
pub use bounds::*;
pub use feature::*;
pub use ids::*;
