//! The only component that talks to the rendering engine.
//!
//! Lifecycle: `Uninitialized -> Initializing -> StyleLoading -> Ready`, and
//! `TornDown` once the engine has been released. Marker and data-layer
//! requests that arrive before `Ready` are parked (latest request per kind)
//! and replayed in arrival order when the style finishes loading.
//!
//! Engine failures never escape: they are logged, counted, and reported as
//! [`Reconcile::Failed`]. The next state change simply tries again.

use std::collections::VecDeque;

use catalog::{Location, SchemaKind};
use foundation::geo::{Camera, LngLat};
use foundation::time::DateKey;
use layers::{DATA_SOURCE_ID, LayerKind, LayerRequest, Visibility, filter_for};
use runtime::metrics::{Counter, Metrics};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineError, EngineEventKind, EngineFactory, EngineOptions, MapEngine, MarkerId};
use crate::marker::marker_presentation;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingPhase {
    Uninitialized,
    Initializing,
    StyleLoading,
    Ready,
    TornDown,
}

/// What happened to a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reconcile {
    Applied,
    /// Parked until the style is loaded.
    Deferred,
    /// Nothing to do in the current state.
    Skipped,
    /// The engine rejected a call; logged and counted.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
enum Deferred {
    PlaceMarkers(Vec<Location>),
    Selection(Option<Location>),
    Layers(LayerRequest),
    ClearLayers,
    ActiveKind(LayerKind),
}

impl Deferred {
    /// Requests sharing a slot replace each other.
    fn slot(&self) -> u8 {
        match self {
            Deferred::PlaceMarkers(_) => 0,
            Deferred::Selection(_) => 1,
            Deferred::Layers(_) | Deferred::ClearLayers => 2,
            Deferred::ActiveKind(_) => 3,
        }
    }
}

#[derive(Debug, Clone)]
struct PlacedMarker {
    id: MarkerId,
    location: Location,
}

pub struct MapBinding<E: MapEngine> {
    phase: BindingPhase,
    engine: Option<E>,
    markers: Vec<PlacedMarker>,
    selected: Option<Location>,
    loaded: Option<LayerRequest>,
    /// Wanted layers the engine failed to install; rebuilt on the next change.
    unsynced: Option<LayerRequest>,
    pending: VecDeque<Deferred>,
    metrics: Metrics,
}

impl<E: MapEngine> Default for MapBinding<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: MapEngine> MapBinding<E> {
    pub fn new() -> Self {
        Self {
            phase: BindingPhase::Uninitialized,
            engine: None,
            markers: Vec::new(),
            selected: None,
            loaded: None,
            unsynced: None,
            pending: VecDeque::new(),
            metrics: Metrics::new(),
        }
    }

    pub fn phase(&self) -> BindingPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == BindingPhase::Ready
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// The request whose layers are currently installed.
    pub fn loaded(&self) -> Option<&LayerRequest> {
        self.loaded.as_ref()
    }

    /// True when the installed layers lag behind the last request.
    pub fn needs_reload(&self) -> bool {
        self.unsynced.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn location_for_marker(&self, marker: MarkerId) -> Option<&Location> {
        self.markers
            .iter()
            .find(|m| m.id == marker)
            .map(|m| &m.location)
    }

    pub fn camera(&self) -> Option<Camera> {
        self.engine.as_ref().map(|e| e.camera())
    }

    /// Creates the engine once. Later calls are no-ops.
    pub fn initialize<F>(&mut self, factory: &mut F, options: EngineOptions) -> Result<Reconcile, EngineError>
    where
        F: EngineFactory<Engine = E>,
    {
        if self.engine.is_some() || self.phase != BindingPhase::Uninitialized {
            debug!(phase = ?self.phase, "map already initialized");
            return Ok(Reconcile::Skipped);
        }
        self.phase = BindingPhase::Initializing;
        let container = options.container.clone();
        let mut engine = match factory.create(options) {
            Ok(engine) => engine,
            Err(err) => {
                error!(%err, container = %container, "map creation failed");
                self.metrics.inc(Counter::EngineErrors);
                self.phase = BindingPhase::Uninitialized;
                return Err(err);
            }
        };

        for (kind, once) in [
            (EngineEventKind::StyleLoad, true),
            (EngineEventKind::Zoom, false),
            (EngineEventKind::Click, false),
        ] {
            let result = engine.listen(kind, once);
            check(&mut self.metrics, "listen", result);
        }

        let preloaded = engine.is_style_loaded();
        self.engine = Some(engine);
        self.phase = BindingPhase::StyleLoading;
        info!(container = %container, "map created");
        if preloaded {
            self.handle_style_loaded();
        }
        Ok(Reconcile::Applied)
    }

    /// Enters `Ready` and replays parked requests.
    pub fn handle_style_loaded(&mut self) -> Reconcile {
        if self.phase != BindingPhase::StyleLoading {
            return Reconcile::Skipped;
        }
        self.phase = BindingPhase::Ready;
        info!(queued = self.pending.len(), "map style loaded");

        let mut overall = Reconcile::Applied;
        while let Some(request) = self.pending.pop_front() {
            let result = match request {
                Deferred::PlaceMarkers(locations) => self.place_markers(&locations),
                Deferred::Selection(selected) => self.set_marker_selection(selected.as_ref()),
                Deferred::Layers(request) => self.load_location_layers(request),
                Deferred::ClearLayers => self.clear_location_layers(),
                Deferred::ActiveKind(kind) => self.set_active_kind(kind),
            };
            if result == Reconcile::Failed {
                overall = Reconcile::Failed;
            }
        }
        overall
    }

    fn defer(&mut self, request: Deferred) -> Reconcile {
        if self.phase == BindingPhase::TornDown {
            return Reconcile::Skipped;
        }
        let slot = request.slot();
        self.pending.retain(|p| p.slot() != slot);
        debug!(?request, phase = ?self.phase, "engine not ready, deferring");
        self.pending.push_back(request);
        self.metrics.inc(Counter::Deferred);
        Reconcile::Deferred
    }

    fn pending_layers_mut(&mut self) -> Option<&mut LayerRequest> {
        self.pending.iter_mut().find_map(|p| match p {
            Deferred::Layers(request) => Some(request),
            _ => None,
        })
    }

    /// One marker per location, styled for the current selection.
    pub fn place_markers(&mut self, locations: &[Location]) -> Reconcile {
        if !self.is_ready() {
            return self.defer(Deferred::PlaceMarkers(locations.to_vec()));
        }
        let Some(engine) = self.engine.as_mut() else {
            return Reconcile::Skipped;
        };

        let mut ok = true;
        for placed in self.markers.drain(..) {
            let result = engine.remove_marker(placed.id);
            ok &= check(&mut self.metrics, "remove_marker", result).is_some();
        }
        for location in locations {
            let presentation = marker_presentation(location, self.selected.as_ref());
            let result = engine.add_marker(location.position, &presentation.style);
            let Some(id) = check(&mut self.metrics, "add_marker", result) else {
                ok = false;
                continue;
            };
            if !presentation.attached {
                let result = engine.set_marker_attached(id, false);
                ok &= check(&mut self.metrics, "set_marker_attached", result).is_some();
            }
            self.markers.push(PlacedMarker {
                id,
                location: location.clone(),
            });
        }
        self.metrics.add(Counter::MarkersPlaced, self.markers.len() as u64);
        debug!(count = self.markers.len(), "markers placed");
        outcome(ok)
    }

    /// Restyles every marker for `selected`; `None` restores the overview.
    pub fn set_marker_selection(&mut self, selected: Option<&Location>) -> Reconcile {
        self.selected = selected.cloned();
        if !self.is_ready() {
            return self.defer(Deferred::Selection(self.selected.clone()));
        }
        let Some(engine) = self.engine.as_mut() else {
            return Reconcile::Skipped;
        };

        let mut ok = true;
        for placed in &self.markers {
            let presentation = marker_presentation(&placed.location, selected);
            let result = engine.restyle_marker(placed.id, &presentation.style);
            ok &= check(&mut self.metrics, "restyle_marker", result).is_some();
            let result = engine.set_marker_attached(placed.id, presentation.attached);
            ok &= check(&mut self.metrics, "set_marker_attached", result).is_some();
        }
        outcome(ok)
    }

    /// Replaces the data source and both circle layers.
    ///
    /// Existing layers are removed before their source, and both before the
    /// new source is added. On failure the request is kept and the next
    /// filter or visibility change rebuilds from it.
    pub fn load_location_layers(&mut self, request: LayerRequest) -> Reconcile {
        if !self.is_ready() {
            return self.defer(Deferred::Layers(request));
        }
        let Some(engine) = self.engine.as_mut() else {
            return Reconcile::Skipped;
        };

        self.loaded = None;
        self.unsynced = None;
        if !install_layers(engine, &request, &mut self.metrics) {
            warn!(location = %request.location.display_name, "data layers not installed, will rebuild on next change");
            self.unsynced = Some(request);
            return Reconcile::Failed;
        }

        info!(
            location = %request.location.display_name,
            schema = ?request.location.schema,
            active = ?request.active,
            date = %request.date,
            "data layers loaded"
        );
        self.metrics.inc(Counter::LayersLoaded);
        self.loaded = Some(request);
        Reconcile::Applied
    }

    /// Reapplies only the filter of `kind`'s layer.
    ///
    /// `schema` must match the installed location; a mismatch means the
    /// caller is working from a previous selection and the call is skipped.
    pub fn update_filter_only(
        &mut self,
        kind: LayerKind,
        threshold: f64,
        date: DateKey,
        schema: SchemaKind,
    ) -> Reconcile {
        if !self.is_ready() {
            return match self.pending_layers_mut() {
                Some(pending) if pending.location.schema == schema => {
                    pending.thresholds.set(kind, threshold);
                    pending.date = date;
                    Reconcile::Deferred
                }
                _ => Reconcile::Skipped,
            };
        }
        if let Some(unsynced) = self.unsynced.as_mut() {
            if unsynced.location.schema != schema {
                return Reconcile::Skipped;
            }
            unsynced.thresholds.set(kind, threshold);
            unsynced.date = date;
            return self.reload();
        }
        let Some(engine) = self.engine.as_mut() else {
            return Reconcile::Skipped;
        };
        let Some(loaded) = self.loaded.as_mut() else {
            return Reconcile::Skipped;
        };
        if loaded.location.schema != schema {
            warn!(
                requested = ?schema,
                installed = ?loaded.location.schema,
                "filter update for a different schema ignored"
            );
            return Reconcile::Skipped;
        }
        let layer_id = kind.layer_id();
        if !engine.has_layer(layer_id) {
            return Reconcile::Skipped;
        }

        let filter = filter_for(schema, kind, threshold, date);
        let result = engine.set_filter(layer_id, &filter);
        loaded.thresholds.set(kind, threshold);
        loaded.date = date;
        if check(&mut self.metrics, "set_filter", result).is_none() {
            self.unsynced = self.loaded.take();
            return Reconcile::Failed;
        }
        self.metrics.inc(Counter::FiltersApplied);
        debug!(layer = layer_id, threshold, date = %date, "filter applied");
        Reconcile::Applied
    }

    /// Shows `kind`'s layer and hides the other.
    pub fn set_active_kind(&mut self, kind: LayerKind) -> Reconcile {
        if !self.is_ready() {
            if let Some(pending) = self.pending_layers_mut() {
                pending.active = kind;
                return Reconcile::Deferred;
            }
            return self.defer(Deferred::ActiveKind(kind));
        }
        if let Some(unsynced) = self.unsynced.as_mut() {
            unsynced.active = kind;
            return self.reload();
        }
        let Some(engine) = self.engine.as_mut() else {
            return Reconcile::Skipped;
        };
        let Some(loaded) = self.loaded.as_mut() else {
            return Reconcile::Skipped;
        };

        let mut ok = true;
        for layer in LayerKind::ALL {
            if !engine.has_layer(layer.layer_id()) {
                continue;
            }
            let result = engine.set_visibility(layer.layer_id(), Visibility::for_layer(layer, kind));
            ok &= check(&mut self.metrics, "set_visibility", result).is_some();
        }
        loaded.active = kind;
        if !ok {
            self.unsynced = self.loaded.take();
        }
        outcome(ok)
    }

    fn reload(&mut self) -> Reconcile {
        match self.unsynced.take() {
            Some(request) => {
                debug!("rebuilding data layers after earlier failure");
                self.load_location_layers(request)
            }
            None => Reconcile::Skipped,
        }
    }

    pub fn clear_location_layers(&mut self) -> Reconcile {
        if !self.is_ready() {
            return self.defer(Deferred::ClearLayers);
        }
        let Some(engine) = self.engine.as_mut() else {
            return Reconcile::Skipped;
        };
        self.loaded = None;
        self.unsynced = None;
        let ok = remove_data_layers(engine, &mut self.metrics);
        if ok {
            debug!("data layers cleared");
        }
        outcome(ok)
    }

    pub fn fly_to(&mut self, center: LngLat, zoom: f64) -> Reconcile {
        self.camera_call("fly_to", |e| e.fly_to(Camera::new(center, zoom)))
    }

    pub fn jump_to(&mut self, camera: Camera) -> Reconcile {
        self.camera_call("jump_to", |e| e.jump_to(camera))
    }

    pub fn zoom_by(&mut self, delta: f64) -> Reconcile {
        self.camera_call("zoom_by", |e| e.zoom_by(delta))
    }

    fn camera_call(
        &mut self,
        op: &'static str,
        call: impl FnOnce(&mut E) -> Result<(), EngineError>,
    ) -> Reconcile {
        let Some(engine) = self.engine.as_mut() else {
            return Reconcile::Skipped;
        };
        outcome(check(&mut self.metrics, op, call(engine)).is_some())
    }

    /// Releases the engine. Returns `false` if there was nothing to release.
    pub fn teardown(&mut self) -> bool {
        let Some(mut engine) = self.engine.take() else {
            self.phase = BindingPhase::TornDown;
            return false;
        };
        engine.remove();
        self.phase = BindingPhase::TornDown;
        self.pending.clear();
        self.markers.clear();
        self.loaded = None;
        self.unsynced = None;
        info!("map removed");
        true
    }
}

impl<E: MapEngine> Drop for MapBinding<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn install_layers<E: MapEngine>(engine: &mut E, request: &LayerRequest, metrics: &mut Metrics) -> bool {
    if !remove_data_layers(engine, metrics) {
        return false;
    }
    let result = engine.add_source(DATA_SOURCE_ID, &request.source());
    if check(metrics, "add_source", result).is_none() {
        return false;
    }
    request.layers().iter().all(|layer| {
        let result = engine.add_layer(layer);
        check(metrics, "add_layer", result).is_some()
    })
}

fn outcome(ok: bool) -> Reconcile {
    if ok { Reconcile::Applied } else { Reconcile::Failed }
}

fn check<T>(metrics: &mut Metrics, op: &'static str, result: Result<T, EngineError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            error!(op, %err, "engine call failed");
            metrics.inc(Counter::EngineErrors);
            None
        }
    }
}

/// Layers first, then the source they reference.
fn remove_data_layers<E: MapEngine>(engine: &mut E, metrics: &mut Metrics) -> bool {
    for kind in LayerKind::ALL {
        let id = kind.layer_id();
        if engine.has_layer(id) {
            let result = engine.remove_layer(id);
            if check(metrics, "remove_layer", result).is_none() {
                return false;
            }
        }
    }
    if engine.has_source(DATA_SOURCE_ID) {
        let result = engine.remove_source(DATA_SOURCE_ID);
        return check(metrics, "remove_source", result).is_some();
    }
    true
}
