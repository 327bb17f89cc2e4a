pub mod expression;
pub mod layer;
pub mod legend;
pub mod query;
pub mod schema;
pub mod symbology;
pub mod threshold;

pub use expression::{Comparison, Curve, Expression};
pub use layer::*;
pub use legend::{Legend, LegendEntry, legend_for};
pub use schema::{SchemaProfile, filter_for, profile};
pub use threshold::{Direction, Thresholds};
