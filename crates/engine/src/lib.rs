pub mod binding;
pub mod engine;
pub mod marker;
pub mod recording;

pub use binding::{BindingPhase, MapBinding, Reconcile};
pub use engine::*;
pub use marker::{MarkerPresentation, MarkerStyle, marker_presentation};
pub use recording::{EngineCommand, EngineProbe, RecordingEngine, RecordingEngineFactory};
