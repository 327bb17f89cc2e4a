//! In-memory [`MapEngine`] that applies the same rules a real map library
//! enforces and records every mutation it accepts.
//!
//! The engine half is handed to the binding; the [`EngineProbe`] half stays
//! with the caller to drive readiness, simulate clicks, inject faults and
//! inspect the resulting source/layer/marker set.

use std::collections::BTreeMap;
use std::sync::Arc;

use foundation::geo::{Camera, LngLat};
use layers::query::{FeatureProperties, matches};
use layers::{Expression, LayerSpec, SourceSpec, Visibility};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::engine::{
    EngineError, EngineEvent, EngineEventKind, EngineFactory, EngineOptions, MapEngine, MarkerId,
};
use crate::marker::MarkerStyle;

/// A mutation the engine accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    Listen { kind: EngineEventKind, once: bool },
    AddSource { id: String, url: String },
    RemoveSource(String),
    AddLayer { id: String, source: String },
    RemoveLayer(String),
    SetFilter { layer: String, filter: Expression },
    SetVisibility { layer: String, visibility: Visibility },
    AddMarker { marker: MarkerId, at: LngLat },
    RestyleMarker { marker: MarkerId, style: MarkerStyle },
    AttachMarker { marker: MarkerId, attached: bool },
    RemoveMarker(MarkerId),
    FlyTo(Camera),
    JumpTo(Camera),
    ZoomBy(f64),
    Remove,
}

impl EngineCommand {
    /// True for commands that touch sources or layers.
    pub fn is_data_mutation(&self) -> bool {
        matches!(
            self,
            EngineCommand::AddSource { .. }
                | EngineCommand::RemoveSource(_)
                | EngineCommand::AddLayer { .. }
                | EngineCommand::RemoveLayer(_)
                | EngineCommand::SetFilter { .. }
                | EngineCommand::SetVisibility { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLayer {
    pub spec: LayerSpec,
    pub filter: Expression,
    pub visibility: Visibility,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RecordedMarker {
    pub at: LngLat,
    pub style: MarkerStyle,
    pub attached: bool,
}

struct EngineState {
    style_loaded: bool,
    removed: bool,
    listeners: Vec<(EngineEventKind, bool)>,
    sources: BTreeMap<String, SourceSpec>,
    // Draw order.
    layers: Vec<RecordedLayer>,
    markers: BTreeMap<MarkerId, RecordedMarker>,
    next_marker: u64,
    camera: Camera,
    commands: Vec<EngineCommand>,
    rejected: usize,
    fail_next: Option<EngineError>,
    fail_data: Option<EngineError>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl EngineState {
    fn new(camera: Camera, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            style_loaded: false,
            removed: false,
            listeners: Vec::new(),
            sources: BTreeMap::new(),
            layers: Vec::new(),
            markers: BTreeMap::new(),
            next_marker: 1,
            camera,
            commands: Vec::new(),
            rejected: 0,
            fail_next: None,
            fail_data: None,
            events,
        }
    }

    /// Delivers `event` if a listener for its kind is registered.
    fn emit(&mut self, event: EngineEvent) -> bool {
        if let Some(kind) = event.kind() {
            let Some(pos) = self.listeners.iter().position(|(k, _)| *k == kind) else {
                return false;
            };
            if self.listeners[pos].1 {
                self.listeners.remove(pos);
            }
        }
        self.events.send(event).is_ok()
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut RecordedLayer, EngineError> {
        self.layers
            .iter_mut()
            .find(|l| l.spec.id == id)
            .ok_or_else(|| EngineError::UnknownLayer(id.to_string()))
    }

    fn marker_mut(&mut self, marker: MarkerId) -> Result<&mut RecordedMarker, EngineError> {
        self.markers
            .get_mut(&marker)
            .ok_or(EngineError::UnknownMarker(marker))
    }

    fn require_style(&self) -> Result<(), EngineError> {
        if self.style_loaded {
            Ok(())
        } else {
            Err(EngineError::StyleNotLoaded)
        }
    }

    fn set_camera(&mut self, camera: Camera) {
        let zoom_changed = camera.zoom != self.camera.zoom;
        self.camera = camera;
        if zoom_changed {
            self.emit(EngineEvent::ZoomChanged { zoom: camera.zoom });
        }
    }
}

pub struct RecordingEngine {
    state: Arc<Mutex<EngineState>>,
}

impl RecordingEngine {
    pub fn new(camera: Camera, events: mpsc::UnboundedSender<EngineEvent>) -> (Self, EngineProbe) {
        let state = Arc::new(Mutex::new(EngineState::new(camera, events)));
        let probe = EngineProbe {
            state: state.clone(),
        };
        (Self { state }, probe)
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut EngineState) -> Result<(T, EngineCommand), EngineError>,
    ) -> Result<T, EngineError> {
        let mut state = self.state.lock();
        let outcome = if state.removed {
            Err(EngineError::Removed)
        } else if let Some(err) = state.fail_next.take() {
            Err(err)
        } else {
            f(&mut *state)
        };
        match outcome {
            Ok((value, command)) => {
                state.commands.push(command);
                Ok(value)
            }
            Err(err) => {
                state.rejected += 1;
                Err(err)
            }
        }
    }
}

impl RecordingEngine {
    /// Like `mutate`, but also honours a fault aimed at source and layer calls.
    fn mutate_data<T>(
        &self,
        f: impl FnOnce(&mut EngineState) -> Result<(T, EngineCommand), EngineError>,
    ) -> Result<T, EngineError> {
        {
            let mut state = self.state.lock();
            if !state.removed {
                if let Some(err) = state.fail_data.take() {
                    state.rejected += 1;
                    return Err(err);
                }
            }
        }
        self.mutate(f)
    }
}

impl MapEngine for RecordingEngine {
    fn is_style_loaded(&self) -> bool {
        let state = self.state.lock();
        state.style_loaded && !state.removed
    }

    fn listen(&mut self, kind: EngineEventKind, once: bool) -> Result<(), EngineError> {
        self.mutate(|s| {
            s.listeners.push((kind, once));
            Ok(((), EngineCommand::Listen { kind, once }))
        })
    }

    fn has_source(&self, id: &str) -> bool {
        self.state.lock().sources.contains_key(id)
    }

    fn add_source(&mut self, id: &str, spec: &SourceSpec) -> Result<(), EngineError> {
        self.mutate_data(|s| {
            s.require_style()?;
            if s.sources.contains_key(id) {
                return Err(EngineError::DuplicateSource(id.to_string()));
            }
            s.sources.insert(id.to_string(), spec.clone());
            let command = EngineCommand::AddSource {
                id: id.to_string(),
                url: spec.url.clone(),
            };
            Ok(((), command))
        })
    }

    fn remove_source(&mut self, id: &str) -> Result<(), EngineError> {
        self.mutate_data(|s| {
            s.require_style()?;
            if !s.sources.contains_key(id) {
                return Err(EngineError::UnknownSource(id.to_string()));
            }
            if let Some(user) = s.layers.iter().find(|l| l.spec.source == id) {
                return Err(EngineError::SourceInUse {
                    source_id: id.to_string(),
                    layer: user.spec.id.to_string(),
                });
            }
            s.sources.remove(id);
            Ok(((), EngineCommand::RemoveSource(id.to_string())))
        })
    }

    fn has_layer(&self, id: &str) -> bool {
        self.state.lock().layers.iter().any(|l| l.spec.id == id)
    }

    fn add_layer(&mut self, spec: &LayerSpec) -> Result<(), EngineError> {
        self.mutate_data(|s| {
            s.require_style()?;
            if s.layers.iter().any(|l| l.spec.id == spec.id) {
                return Err(EngineError::DuplicateLayer(spec.id.to_string()));
            }
            if !s.sources.contains_key(spec.source) {
                return Err(EngineError::UnknownSource(spec.source.to_string()));
            }
            s.layers.push(RecordedLayer {
                spec: spec.clone(),
                filter: spec.filter.clone(),
                visibility: spec.layout.visibility,
            });
            let command = EngineCommand::AddLayer {
                id: spec.id.to_string(),
                source: spec.source.to_string(),
            };
            Ok(((), command))
        })
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), EngineError> {
        self.mutate_data(|s| {
            s.require_style()?;
            let before = s.layers.len();
            s.layers.retain(|l| l.spec.id != id);
            if s.layers.len() == before {
                return Err(EngineError::UnknownLayer(id.to_string()));
            }
            Ok(((), EngineCommand::RemoveLayer(id.to_string())))
        })
    }

    fn set_filter(&mut self, layer_id: &str, filter: &Expression) -> Result<(), EngineError> {
        self.mutate_data(|s| {
            s.require_style()?;
            s.layer_mut(layer_id)?.filter = filter.clone();
            let command = EngineCommand::SetFilter {
                layer: layer_id.to_string(),
                filter: filter.clone(),
            };
            Ok(((), command))
        })
    }

    fn set_visibility(&mut self, layer_id: &str, visibility: Visibility) -> Result<(), EngineError> {
        self.mutate_data(|s| {
            s.require_style()?;
            s.layer_mut(layer_id)?.visibility = visibility;
            let command = EngineCommand::SetVisibility {
                layer: layer_id.to_string(),
                visibility,
            };
            Ok(((), command))
        })
    }

    fn add_marker(&mut self, at: LngLat, style: &MarkerStyle) -> Result<MarkerId, EngineError> {
        self.mutate(|s| {
            let marker = MarkerId(s.next_marker);
            s.next_marker += 1;
            s.markers.insert(
                marker,
                RecordedMarker {
                    at,
                    style: *style,
                    attached: true,
                },
            );
            Ok((marker, EngineCommand::AddMarker { marker, at }))
        })
    }

    fn restyle_marker(&mut self, marker: MarkerId, style: &MarkerStyle) -> Result<(), EngineError> {
        self.mutate(|s| {
            s.marker_mut(marker)?.style = *style;
            let command = EngineCommand::RestyleMarker {
                marker,
                style: *style,
            };
            Ok(((), command))
        })
    }

    fn set_marker_attached(&mut self, marker: MarkerId, attached: bool) -> Result<(), EngineError> {
        self.mutate(|s| {
            s.marker_mut(marker)?.attached = attached;
            Ok(((), EngineCommand::AttachMarker { marker, attached }))
        })
    }

    fn remove_marker(&mut self, marker: MarkerId) -> Result<(), EngineError> {
        self.mutate(|s| {
            s.markers
                .remove(&marker)
                .ok_or(EngineError::UnknownMarker(marker))?;
            Ok(((), EngineCommand::RemoveMarker(marker)))
        })
    }

    fn camera(&self) -> Camera {
        self.state.lock().camera
    }

    fn fly_to(&mut self, camera: Camera) -> Result<(), EngineError> {
        self.mutate(|s| {
            s.set_camera(camera);
            Ok(((), EngineCommand::FlyTo(camera)))
        })
    }

    fn jump_to(&mut self, camera: Camera) -> Result<(), EngineError> {
        self.mutate(|s| {
            s.set_camera(camera);
            Ok(((), EngineCommand::JumpTo(camera)))
        })
    }

    fn zoom_by(&mut self, delta: f64) -> Result<(), EngineError> {
        self.mutate(|s| {
            let camera = Camera::new(s.camera.center, s.camera.zoom + delta);
            s.set_camera(camera);
            Ok(((), EngineCommand::ZoomBy(delta)))
        })
    }

    fn remove(&mut self) {
        let mut state = self.state.lock();
        if state.removed {
            return;
        }
        state.removed = true;
        state.listeners.clear();
        state.layers.clear();
        state.sources.clear();
        state.markers.clear();
        state.commands.push(EngineCommand::Remove);
    }
}

/// Caller-side handle onto a [`RecordingEngine`].
#[derive(Clone)]
pub struct EngineProbe {
    state: Arc<Mutex<EngineState>>,
}

impl EngineProbe {
    /// Marks the base style as loaded and fires the style-load listener.
    /// Returns whether an event was delivered.
    pub fn finish_style_load(&self) -> bool {
        let mut state = self.state.lock();
        if state.removed || state.style_loaded {
            return false;
        }
        state.style_loaded = true;
        state.emit(EngineEvent::StyleLoaded)
    }

    /// Simulates a user click on `marker`; only attached markers receive clicks.
    pub fn click_marker(&self, marker: MarkerId) -> bool {
        let mut state = self.state.lock();
        let clickable = !state.removed && state.markers.get(&marker).is_some_and(|m| m.attached);
        clickable && state.emit(EngineEvent::MarkerClicked { marker })
    }

    pub fn click_map(&self, at: LngLat) -> bool {
        let mut state = self.state.lock();
        !state.removed && state.emit(EngineEvent::MapClicked { at })
    }

    /// Simulates a user zoom gesture.
    pub fn zoom_gesture(&self, zoom: f64) -> bool {
        let mut state = self.state.lock();
        if state.removed {
            return false;
        }
        state.camera.zoom = zoom;
        state.emit(EngineEvent::ZoomChanged { zoom })
    }

    /// The next mutation fails with `err` without touching state.
    pub fn fail_next(&self, err: EngineError) {
        self.state.lock().fail_next = Some(err);
    }

    /// The next source or layer call fails with `err`. Marker and camera
    /// calls are unaffected.
    pub fn fail_next_layer_call(&self, err: EngineError) {
        self.state.lock().fail_data = Some(err);
    }

    /// Indices of `features` that `layer_id` would draw: the layer exists,
    /// is visible and its filter accepts the feature.
    pub fn rendered_features(&self, layer_id: &str, features: &[FeatureProperties]) -> Vec<usize> {
        let state = self.state.lock();
        let Some(layer) = state.layers.iter().find(|l| l.spec.id == layer_id) else {
            return Vec::new();
        };
        if layer.visibility != Visibility::Visible {
            return Vec::new();
        }
        features
            .iter()
            .enumerate()
            .filter(|(_, props)| matches(&layer.filter, props))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.state.lock().sources.keys().cloned().collect()
    }

    pub fn source_url(&self, id: &str) -> Option<String> {
        self.state.lock().sources.get(id).map(|s| s.url.clone())
    }

    pub fn layer_ids(&self) -> Vec<String> {
        let state = self.state.lock();
        state.layers.iter().map(|l| l.spec.id.to_string()).collect()
    }

    pub fn layer(&self, id: &str) -> Option<RecordedLayer> {
        let state = self.state.lock();
        state.layers.iter().find(|l| l.spec.id == id).cloned()
    }

    pub fn filter(&self, layer_id: &str) -> Option<Expression> {
        self.layer(layer_id).map(|l| l.filter)
    }

    pub fn visibility(&self, layer_id: &str) -> Option<Visibility> {
        self.layer(layer_id).map(|l| l.visibility)
    }

    pub fn markers(&self) -> Vec<(MarkerId, RecordedMarker)> {
        let state = self.state.lock();
        state.markers.iter().map(|(id, m)| (*id, *m)).collect()
    }

    pub fn marker_at(&self, at: LngLat) -> Option<MarkerId> {
        let state = self.state.lock();
        state
            .markers
            .iter()
            .find(|(_, m)| m.at.same_point(&at))
            .map(|(id, _)| *id)
    }

    pub fn attached_markers(&self) -> usize {
        self.state.lock().markers.values().filter(|m| m.attached).count()
    }

    pub fn camera(&self) -> Camera {
        self.state.lock().camera
    }

    pub fn listener_count(&self, kind: EngineEventKind) -> usize {
        let state = self.state.lock();
        state.listeners.iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn commands(&self) -> Vec<EngineCommand> {
        self.state.lock().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Calls the engine rejected with an error.
    pub fn rejected(&self) -> usize {
        self.state.lock().rejected
    }
}

/// Creates [`RecordingEngine`]s and keeps a probe for each.
#[derive(Clone, Default)]
pub struct RecordingEngineFactory {
    preloaded: bool,
    probes: Arc<Mutex<Vec<EngineProbe>>>,
}

impl RecordingEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines report their style as loaded from creation on.
    pub fn preloaded() -> Self {
        Self {
            preloaded: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.probes.lock().len()
    }

    pub fn last_probe(&self) -> Option<EngineProbe> {
        self.probes.lock().last().cloned()
    }
}

impl EngineFactory for RecordingEngineFactory {
    type Engine = RecordingEngine;

    fn create(&mut self, options: EngineOptions) -> Result<RecordingEngine, EngineError> {
        if options.container.trim().is_empty() {
            return Err(EngineError::Create("container id is empty".to_string()));
        }
        let (engine, probe) = RecordingEngine::new(options.camera, options.events);
        if self.preloaded {
            probe.state.lock().style_loaded = true;
        }
        self.probes.lock().push(probe);
        Ok(engine)
    }
}
