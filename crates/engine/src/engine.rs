//! The rendering-engine surface the binding drives.
//!
//! This mirrors the subset of a vector-tile map library the viewer needs:
//! keyed sources, circle layers referencing a source, per-layer filters and
//! visibility, DOM-style markers, and camera control. Engine-originated
//! events are pushed into the channel handed over at creation.

use foundation::geo::{Camera, LngLat};
use layers::{Expression, LayerSpec, SourceSpec, Visibility};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::marker::MarkerStyle;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("style is not done loading")]
    StyleNotLoaded,
    #[error("there is already a source with id `{0}`")]
    DuplicateSource(String),
    #[error("there is no source with id `{0}`")]
    UnknownSource(String),
    #[error("source `{source_id}` cannot be removed while layer `{layer}` is using it")]
    SourceInUse { source_id: String, layer: String },
    #[error("there is already a layer with id `{0}`")]
    DuplicateLayer(String),
    #[error("there is no layer with id `{0}`")]
    UnknownLayer(String),
    #[error("marker {0:?} does not exist")]
    UnknownMarker(MarkerId),
    #[error("map instance has been removed")]
    Removed,
    #[error("failed to create map: {0}")]
    Create(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    StyleLoad,
    Zoom,
    Click,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EngineEvent {
    StyleLoaded,
    ZoomChanged { zoom: f64 },
    MarkerClicked { marker: MarkerId },
    MapClicked { at: LngLat },
}

impl EngineEvent {
    /// Listener kind that gates delivery; marker clicks are wired per marker.
    pub fn kind(&self) -> Option<EngineEventKind> {
        match self {
            EngineEvent::StyleLoaded => Some(EngineEventKind::StyleLoad),
            EngineEvent::ZoomChanged { .. } => Some(EngineEventKind::Zoom),
            EngineEvent::MapClicked { .. } => Some(EngineEventKind::Click),
            EngineEvent::MarkerClicked { .. } => None,
        }
    }
}

pub trait MapEngine: Send + 'static {
    fn is_style_loaded(&self) -> bool;
    /// Subscribes the event channel to `kind`; `once` listeners fire a single time.
    fn listen(&mut self, kind: EngineEventKind, once: bool) -> Result<(), EngineError>;

    fn has_source(&self, id: &str) -> bool;
    fn add_source(&mut self, id: &str, spec: &SourceSpec) -> Result<(), EngineError>;
    fn remove_source(&mut self, id: &str) -> Result<(), EngineError>;

    fn has_layer(&self, id: &str) -> bool;
    fn add_layer(&mut self, spec: &LayerSpec) -> Result<(), EngineError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError>;
    fn set_filter(&mut self, layer_id: &str, filter: &Expression) -> Result<(), EngineError>;
    fn set_visibility(&mut self, layer_id: &str, visibility: Visibility) -> Result<(), EngineError>;

    fn add_marker(&mut self, at: LngLat, style: &MarkerStyle) -> Result<MarkerId, EngineError>;
    fn restyle_marker(&mut self, marker: MarkerId, style: &MarkerStyle) -> Result<(), EngineError>;
    /// Detached markers stay known to the engine but are not shown.
    fn set_marker_attached(&mut self, marker: MarkerId, attached: bool) -> Result<(), EngineError>;
    fn remove_marker(&mut self, marker: MarkerId) -> Result<(), EngineError>;

    fn camera(&self) -> Camera;
    /// Animated transition.
    fn fly_to(&mut self, camera: Camera) -> Result<(), EngineError>;
    fn jump_to(&mut self, camera: Camera) -> Result<(), EngineError>;
    fn zoom_by(&mut self, delta: f64) -> Result<(), EngineError>;

    /// Releases the instance; every later call fails with [`EngineError::Removed`].
    fn remove(&mut self);
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Host element id.
    pub container: String,
    pub style_url: String,
    pub access_token: String,
    pub camera: Camera,
    pub events: mpsc::UnboundedSender<EngineEvent>,
}

pub trait EngineFactory {
    type Engine: MapEngine;

    fn create(&mut self, options: EngineOptions) -> Result<Self::Engine, EngineError>;
}
