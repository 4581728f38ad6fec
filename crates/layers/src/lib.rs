pub mod expression;
pub mod labels;
pub mod layer;
pub mod query;
pub mod scene;
pub mod symbology;

pub use expression::*;
pub use layer::*;
