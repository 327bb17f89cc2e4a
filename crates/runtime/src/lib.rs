pub mod animation;
pub mod metrics;

pub use animation::*;
pub use metrics::{Counter, Metrics, MetricsSnapshot};
