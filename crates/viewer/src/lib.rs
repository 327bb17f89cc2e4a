//! Selection, playback and view state for the wildfire footprint map.
//!
//! [`ViewerSession`] is the entry point for hosts: it mounts a map through
//! an [`engine::EngineFactory`] and exposes the UI handlers. The
//! [`controller::MapController`] underneath is synchronous and can be driven
//! directly in tests.

pub mod config;
pub mod controller;
pub mod picker;
pub mod session;
pub mod state;
pub mod view;

pub use config::{CameraPolicy, ViewerConfig};
pub use controller::{MapController, PlaybackChange};
pub use picker::PickerChange;
pub use session::{ViewerError, ViewerSession};
pub use state::SelectionState;
pub use view::{SelectedView, ViewSnapshot};
