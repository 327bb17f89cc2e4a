//! Translates UI and engine events into [`SelectionState`] transitions and
//! the matching [`MapBinding`] calls.
//!
//! Playback is guarded by a generation counter. It is bumped synchronously
//! on every start and every stop, and a tick is only honoured when it
//! carries the current generation while `is_playing` still holds. A tick
//! scheduled before a stop therefore cannot touch the map after it.

use catalog::{Location, SchemaKind, all_locations};
use engine::{EngineError, EngineEvent, EngineFactory, EngineOptions, MapBinding, MapEngine, Reconcile};
use foundation::geo::{Camera, round_zoom};
use foundation::time::{AnimationRange, DateKey, RANGE_START, parse_initial};
use layers::threshold::{Direction, from_slider};
use layers::{LayerKind, profile};
use runtime::animation::{Tick, TickOutcome};
use runtime::metrics::{Counter, Metrics, MetricsSnapshot};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{CameraPolicy, ViewerConfig};
use crate::picker::{PickerChange, apply_change};
use crate::state::SelectionState;
use crate::view::ViewSnapshot;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PlaybackChange {
    Started { generation: u64 },
    Stopped,
    /// The selection cannot animate; nothing changed.
    Unchanged,
}

pub struct MapController<E: MapEngine> {
    config: ViewerConfig,
    state: SelectionState,
    binding: MapBinding<E>,
    range: AnimationRange,
    generation: u64,
    resume_camera: Option<Camera>,
    metrics: Metrics,
}

impl<E: MapEngine> MapController<E> {
    pub fn new(config: ViewerConfig) -> Self {
        let state = SelectionState::new(
            config.thresholds,
            parse_initial(&config.initial_timestamp),
            config.overview.zoom,
        );
        Self {
            config,
            state,
            binding: MapBinding::new(),
            range: AnimationRange::default(),
            generation: 0,
            resume_camera: None,
            metrics: Metrics::new(),
        }
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn binding(&self) -> &MapBinding<E> {
        &self.binding
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Current playback generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Controller and map binding counters combined.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        let mut all = self.metrics.clone();
        all.merge(self.binding.metrics());
        all.snapshot()
    }

    pub fn view(&self) -> ViewSnapshot {
        ViewSnapshot::capture(&self.state, self.binding.phase())
    }

    /// Creates the map and requests the catalog markers.
    pub fn mount<F>(&mut self, factory: &mut F, events: mpsc::UnboundedSender<EngineEvent>) -> Result<(), EngineError>
    where
        F: EngineFactory<Engine = E>,
    {
        let options = EngineOptions {
            container: self.config.container.clone(),
            style_url: self.config.style_url.clone(),
            access_token: self.config.access_token.clone(),
            camera: self.config.overview,
            events,
        };
        if self.binding.initialize(factory, options)? == Reconcile::Skipped {
            return Ok(());
        }
        self.binding.place_markers(all_locations());
        Ok(())
    }

    pub fn unmount(&mut self) {
        self.stop_playback();
        self.binding.teardown();
    }

    pub fn on_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::StyleLoaded => {
                self.binding.handle_style_loaded();
            }
            EngineEvent::ZoomChanged { zoom } => {
                self.state.zoom = round_zoom(zoom);
            }
            EngineEvent::MarkerClicked { marker } => {
                match self.binding.location_for_marker(marker).cloned() {
                    Some(location) => self.on_marker_clicked(&location),
                    None => warn!(?marker, "click on unknown marker"),
                }
            }
            EngineEvent::MapClicked { at } => {
                debug!(lng = at.lng, lat = at.lat, "map clicked");
            }
        }
    }

    pub fn on_marker_clicked(&mut self, location: &Location) {
        self.stop_playback();
        if location.is_time_series() {
            self.state.current_date = RANGE_START;
        }
        self.state.selected = Some(location.clone());
        info!(location = %location.display_name, schema = ?location.schema, "location selected");

        self.binding.fly_to(location.position, self.config.selection_zoom);
        self.binding.set_marker_selection(Some(location));
        if let Some(request) = self.state.layer_request() {
            self.binding.load_location_layers(request);
        }
    }

    pub fn on_layer_kind_changed(&mut self, kind: LayerKind) {
        if self.state.layer_kind == kind {
            return;
        }
        self.state.layer_kind = kind;
        if self.state.selected.is_some() {
            self.binding.set_active_kind(kind);
            self.refresh_filters(&[kind]);
        }
    }

    /// One threshold step for the active layer. Returns the new value.
    pub fn on_threshold_adjust(&mut self, direction: Direction) -> f64 {
        let kind = self.state.layer_kind;
        let value = self.state.thresholds.step(kind, direction);
        debug!(?kind, ?direction, value, "threshold adjusted");
        self.refresh_filters(&[kind]);
        value
    }

    /// Steps once toward a log10 slider position.
    pub fn on_threshold_slider(&mut self, position: f64) -> f64 {
        let current = self.state.active_threshold();
        match Direction::toward(current, from_slider(position)) {
            Some(direction) => self.on_threshold_adjust(direction),
            None => current,
        }
    }

    /// Manual date entry. Unparseable input selects the range start.
    pub fn on_date_changed(&mut self, input: &str) {
        let date = DateKey::parse_any(input).unwrap_or_else(|| {
            warn!(input, "unparseable date, using range start");
            RANGE_START
        });
        self.choose_date(date);
    }

    pub fn on_date_picked(&mut self, change: PickerChange) {
        match apply_change(self.state.current_date, change) {
            Some(date) => self.choose_date(date),
            None => warn!(?change, "date selector change rejected"),
        }
    }

    fn choose_date(&mut self, date: DateKey) {
        self.stop_playback();
        self.set_date(date);
    }

    pub fn on_back_to_overview(&mut self) {
        self.stop_playback();
        self.binding.clear_location_layers();
        self.binding.jump_to(self.config.overview);
        self.state.selected = None;
        self.binding.set_marker_selection(None);
        info!("back to overview");
    }

    pub fn zoom_by(&mut self, delta: f64) -> Reconcile {
        self.binding.zoom_by(delta)
    }

    pub fn toggle_animation(&mut self) -> PlaybackChange {
        if self.state.is_playing {
            self.stop_playback();
            return PlaybackChange::Stopped;
        }
        if !self.state.can_animate() {
            debug!("selection has no time series, not animating");
            return PlaybackChange::Unchanged;
        }
        self.generation += 1;
        self.state.is_playing = true;
        if self.config.camera_policy == CameraPolicy::RestoreOnPause {
            self.resume_camera = self.binding.camera();
        }
        info!(generation = self.generation, date = %self.state.current_date, "animation started");
        PlaybackChange::Started {
            generation: self.generation,
        }
    }

    /// Returns `true` if playback was running.
    pub fn stop_playback(&mut self) -> bool {
        if !self.state.is_playing {
            return false;
        }
        self.state.is_playing = false;
        self.generation += 1;
        if let Some(camera) = self.resume_camera.take() {
            self.binding.jump_to(camera);
        }
        info!(date = %self.state.current_date, "animation stopped");
        true
    }

    /// Advances the date by one day if `tick` belongs to the current run.
    pub fn on_tick(&mut self, tick: Tick) -> TickOutcome {
        if tick.generation != self.generation || !self.state.is_playing {
            self.metrics.inc(Counter::StaleTicks);
            debug!(tick = tick.generation, current = self.generation, "stale tick dropped");
            return TickOutcome::Stop;
        }
        if !self.binding.is_ready() || !self.state.can_animate() {
            self.stop_playback();
            return TickOutcome::Stop;
        }
        self.metrics.inc(Counter::Ticks);
        let date = self.range.step(self.state.current_date);
        self.set_date(date);
        TickOutcome::Continue
    }

    fn set_date(&mut self, date: DateKey) {
        self.state.current_date = date;
        let Some(schema) = self.state.schema() else {
            return;
        };
        let kinds = profile(schema).tick_layers(self.state.layer_kind);
        self.refresh_filters(&kinds);
    }

    fn refresh_filters(&mut self, kinds: &[LayerKind]) {
        let Some(schema) = self.state.schema() else {
            return;
        };
        for &kind in kinds {
            self.apply_filter(kind, schema);
        }
    }

    fn apply_filter(&mut self, kind: LayerKind, schema: SchemaKind) -> Reconcile {
        self.binding.update_filter_only(
            kind,
            self.state.thresholds.get(kind),
            self.state.current_date,
            schema,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::find_by_source;
    use engine::{EngineCommand, EngineProbe, RecordingEngine, RecordingEngineFactory, marker};
    use foundation::time::RANGE_END;
    use layers::{DATA_SOURCE_ID, FOOTPRINT_LAYER_ID, PM25_LAYER_ID, Visibility, filter_for};
    use pretty_assertions::assert_eq;

    struct Fixture {
        controller: MapController<RecordingEngine>,
        probe: EngineProbe,
        _events: mpsc::UnboundedReceiver<EngineEvent>,
    }

    fn fixture(config: ViewerConfig) -> Fixture {
        let mut factory = RecordingEngineFactory::preloaded();
        let (tx, rx) = mpsc::unbounded_channel();
        let mut controller = MapController::new(config);
        controller.mount(&mut factory, tx).unwrap();
        Fixture {
            controller,
            probe: factory.last_probe().unwrap(),
            _events: rx,
        }
    }

    fn generic() -> &'static Location {
        all_locations().iter().find(|l| !l.is_time_series()).unwrap()
    }

    fn series_a() -> &'static Location {
        find_by_source("pkulandh.8veldf0e").unwrap()
    }

    fn series_b() -> &'static Location {
        all_locations()
            .iter()
            .find(|l| l.schema == SchemaKind::TimeSeriesB)
            .unwrap()
    }

    fn tick(c: &mut MapController<RecordingEngine>) -> TickOutcome {
        let generation = c.generation();
        c.on_tick(Tick {
            generation,
            sequence: 1,
        })
    }

    #[test]
    fn mount_places_all_markers_and_parses_initial_date() {
        let f = fixture(ViewerConfig::default());
        assert_eq!(f.probe.markers().len(), all_locations().len());
        assert_eq!(f.controller.state().current_date, DateKey::parse("20160825").unwrap());
        assert!(f.controller.binding().is_ready());
    }

    #[test]
    fn generic_selection_never_animates() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(generic());
        assert_eq!(c.toggle_animation(), PlaybackChange::Unchanged);
        assert!(!c.state().is_playing);
        assert_eq!(c.generation(), 0);

        let filter = f.probe.filter(FOOTPRINT_LAYER_ID).unwrap();
        assert!(!filter.has_equality_on("date"));
        assert_eq!(filter.fields(), vec!["footprint"]);
        assert_eq!(f.probe.camera().zoom, 7.0);
        assert_eq!(f.probe.attached_markers(), 1);
    }

    #[test]
    fn series_selection_resets_date_and_ticks_forward() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        assert_eq!(c.state().current_date, RANGE_START);
        assert!(matches!(c.toggle_animation(), PlaybackChange::Started { .. }));
        for _ in 0..3 {
            assert_eq!(tick(c), TickOutcome::Continue);
        }
        assert_eq!(c.state().current_date, DateKey::parse("20160804").unwrap());
        assert!(
            f.probe
                .filter(FOOTPRINT_LAYER_ID)
                .unwrap()
                .to_json()
                .to_string()
                .contains("2016-08-04")
        );
        assert_eq!(c.toggle_animation(), PlaybackChange::Stopped);
        assert_eq!(tick(c), TickOutcome::Stop);
        assert_eq!(c.state().current_date, DateKey::parse("20160804").unwrap());
    }

    #[test]
    fn ticks_wrap_at_range_end() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        c.on_date_changed(&RANGE_END.to_string());
        c.toggle_animation();
        tick(c);
        assert_eq!(c.state().current_date, RANGE_START);
    }

    #[test]
    fn tick_from_previous_run_is_dropped() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        let PlaybackChange::Started { generation } = c.toggle_animation() else {
            panic!("expected playback to start");
        };
        c.toggle_animation();
        f.probe.clear_commands();
        let outcome = c.on_tick(Tick {
            generation,
            sequence: 1,
        });
        assert_eq!(outcome, TickOutcome::Stop);
        assert_eq!(c.state().current_date, RANGE_START);
        assert!(f.probe.commands().is_empty());
        assert_eq!(c.metrics().get(Counter::StaleTicks), 1);
    }

    #[test]
    fn series_b_ticks_refresh_both_layers() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_b());
        c.toggle_animation();
        f.probe.clear_commands();
        tick(c);
        let layers: Vec<_> = f
            .probe
            .commands()
            .into_iter()
            .filter_map(|cmd| match cmd {
                EngineCommand::SetFilter { layer, .. } => Some(layer),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![FOOTPRINT_LAYER_ID.to_string(), PM25_LAYER_ID.to_string()]);
    }

    #[test]
    fn switching_location_stops_playback_first() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        let PlaybackChange::Started { generation } = c.toggle_animation() else {
            panic!("expected playback to start");
        };
        tick(c);
        c.on_marker_clicked(series_b());
        assert!(!c.state().is_playing);
        assert_eq!(c.state().current_date, RANGE_START);
        let before = f.probe.filter(FOOTPRINT_LAYER_ID);
        c.on_tick(Tick {
            generation,
            sequence: 2,
        });
        assert_eq!(f.probe.filter(FOOTPRINT_LAYER_ID), before);
        assert_eq!(
            f.probe.source_url(DATA_SOURCE_ID),
            Some(series_b().source_url())
        );
    }

    #[test]
    fn threshold_changes_only_touch_filters() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(generic());
        f.probe.clear_commands();
        assert_eq!(c.on_threshold_adjust(Direction::Increase), 0.0004);
        assert_eq!(c.on_threshold_slider(-2.0), 0.0008);
        assert!(f.probe.commands().iter().all(|cmd| matches!(cmd, EngineCommand::SetFilter { .. })));
        assert_eq!(c.state().thresholds.pm25, 0.01);
        assert_eq!(
            f.probe.filter(FOOTPRINT_LAYER_ID).unwrap().to_json()[1][2],
            serde_json::json!(0.0008)
        );
    }

    #[test]
    fn map_catches_up_after_failed_layer_load() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(generic());
        f.probe.fail_next_layer_call(EngineError::StyleNotLoaded);
        c.on_marker_clicked(series_a());
        assert!(c.binding().needs_reload());

        c.on_threshold_adjust(Direction::Increase);
        c.on_layer_kind_changed(LayerKind::Pm25);
        c.on_date_changed("20160810");
        c.toggle_animation();
        assert_eq!(tick(c), TickOutcome::Continue);

        let date = DateKey::parse("20160811").unwrap();
        assert_eq!(c.state().current_date, date);
        assert!(!c.binding().needs_reload());
        assert_eq!(
            f.probe.filter(PM25_LAYER_ID),
            Some(filter_for(SchemaKind::TimeSeriesA, LayerKind::Pm25, 0.01, date))
        );
        assert_eq!(f.probe.visibility(PM25_LAYER_ID), Some(Visibility::Visible));
        assert_eq!(f.probe.visibility(FOOTPRINT_LAYER_ID), Some(Visibility::None));
        assert_eq!(
            f.probe.source_url(DATA_SOURCE_ID),
            Some(series_a().source_url())
        );
        assert_eq!(c.binding().loaded().unwrap().thresholds.footprint, 0.0004);
        let metrics = c.metrics_snapshot();
        assert_eq!(metrics.get(Counter::EngineErrors), 1);
        assert_eq!(metrics.get(Counter::Ticks), 1);
    }

    #[test]
    fn layer_kind_switch_flips_visibility() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(generic());
        c.on_layer_kind_changed(LayerKind::Pm25);
        assert_eq!(f.probe.visibility(PM25_LAYER_ID), Some(Visibility::Visible));
        assert_eq!(f.probe.visibility(FOOTPRINT_LAYER_ID), Some(Visibility::None));
        assert_eq!(f.probe.layer_ids().len(), 2);
        assert_eq!(c.on_threshold_adjust(Direction::Decrease), 0.005);
    }

    #[test]
    fn bad_date_falls_back_to_range_start() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        c.on_date_changed("2016-09-10");
        assert_eq!(c.state().current_date, DateKey::parse("20160910").unwrap());
        c.on_date_changed("not a date");
        assert_eq!(c.state().current_date, RANGE_START);
        c.on_date_picked(PickerChange::Month(10));
        assert_eq!(c.state().current_date, DateKey::parse("20161001").unwrap());
    }

    #[test]
    fn manual_date_change_stops_playback() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        c.toggle_animation();
        c.on_date_picked(PickerChange::Day(20));
        assert!(!c.state().is_playing);
        assert_eq!(c.state().current_date, DateKey::parse("20160820").unwrap());
    }

    #[test]
    fn back_to_overview_restores_everything() {
        let config = ViewerConfig::default();
        let overview = config.overview;
        let mut f = fixture(config);
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        c.toggle_animation();
        c.on_back_to_overview();

        assert!(!c.state().is_playing);
        assert!(c.state().selected.is_none());
        assert!(f.probe.layer_ids().is_empty());
        assert!(f.probe.source_ids().is_empty());
        assert_eq!(f.probe.camera(), overview);
        assert_eq!(f.probe.attached_markers(), all_locations().len());
        assert!(
            f.probe
                .markers()
                .iter()
                .all(|(_, m)| m.style != marker::SELECTED_MARKER)
        );
        assert!(c.view().legend.is_none());
    }

    #[test]
    fn restore_on_pause_returns_camera() {
        let config = ViewerConfig {
            camera_policy: CameraPolicy::RestoreOnPause,
            ..ViewerConfig::default()
        };
        let mut f = fixture(config);
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        let start = f.probe.camera();
        c.toggle_animation();
        c.zoom_by(2.0);
        assert_eq!(f.probe.camera().zoom, 9.0);
        c.toggle_animation();
        assert_eq!(f.probe.camera(), start);
    }

    #[test]
    fn default_policy_leaves_camera() {
        let mut f = fixture(ViewerConfig::default());
        let c = &mut f.controller;
        c.on_marker_clicked(series_a());
        c.toggle_animation();
        c.zoom_by(-1.0);
        c.toggle_animation();
        assert_eq!(f.probe.camera().zoom, 6.0);
    }

    #[test]
    fn tick_before_ready_stops_silently() {
        let mut factory = RecordingEngineFactory::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut c: MapController<RecordingEngine> = MapController::new(ViewerConfig::default());
        c.mount(&mut factory, tx).unwrap();
        c.on_marker_clicked(series_a());
        c.toggle_animation();
        assert_eq!(tick(&mut c), TickOutcome::Stop);
        assert!(!c.state().is_playing);
        assert_eq!(c.state().current_date, RANGE_START);
    }

    #[test]
    fn engine_events_update_state() {
        let mut f = fixture(ViewerConfig::default());
        f.controller.on_engine_event(EngineEvent::ZoomChanged { zoom: 5.26 });
        assert_eq!(f.controller.state().zoom, 5.3);

        let id = f.probe.marker_at(series_b().position).unwrap();
        f.controller
            .on_engine_event(EngineEvent::MarkerClicked { marker: id });
        assert_eq!(f.controller.state().selected.as_ref(), Some(series_b()));
    }

    #[test]
    fn unmount_removes_engine_once() {
        let mut f = fixture(ViewerConfig::default());
        f.controller.on_marker_clicked(series_a());
        f.controller.toggle_animation();
        f.controller.unmount();
        f.controller.unmount();
        assert!(f.probe.is_removed());
        assert!(!f.controller.state().is_playing);
        assert_eq!(tick(&mut f.controller), TickOutcome::Stop);
    }
}
