//! A mounted viewer: controller, engine event pump and animation driver
//! sharing one tokio runtime.
//!
//! Every UI entry point locks the controller, applies the change, releases
//! the lock and then brings the driver in line with the controller's
//! playback state. The driver lock is always taken before the controller
//! lock; the tick sink only ever takes the controller lock.

use std::sync::{Arc, Weak};

use catalog::Location;
use engine::{EngineError, EngineFactory, MapEngine};
use layers::{Direction, LayerKind};
use parking_lot::Mutex;
use runtime::animation::{AnimationDriver, Tick, TickOutcome, TickSink};
use runtime::metrics::MetricsSnapshot;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::controller::{MapController, PlaybackChange};
use crate::picker::PickerChange;
use crate::view::ViewSnapshot;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("viewer must be mounted from within a tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

struct SessionInner<E: MapEngine> {
    driver: Mutex<AnimationDriver>,
    controller: Mutex<MapController<E>>,
}

impl<E: MapEngine> SessionInner<E> {
    fn dispatch<R>(self: &Arc<Self>, f: impl FnOnce(&mut MapController<E>) -> R) -> R {
        let out = f(&mut self.controller.lock());
        self.sync_driver();
        out
    }

    fn sync_driver(self: &Arc<Self>) {
        let mut driver = self.driver.lock();
        let (playing, generation) = {
            let controller = self.controller.lock();
            (controller.state().is_playing, controller.generation())
        };
        if !playing {
            driver.stop();
        } else if driver.generation() != Some(generation) {
            let sink = SessionTicks {
                inner: Arc::downgrade(self),
            };
            driver.start(generation, Arc::new(sink));
        }
    }
}

/// Forwards driver ticks to the controller without keeping the session alive.
struct SessionTicks<E: MapEngine> {
    inner: Weak<SessionInner<E>>,
}

impl<E: MapEngine> TickSink for SessionTicks<E> {
    fn on_tick(&self, tick: Tick) -> TickOutcome {
        match self.inner.upgrade() {
            Some(inner) => inner.controller.lock().on_tick(tick),
            None => TickOutcome::Stop,
        }
    }
}

pub struct ViewerSession<E: MapEngine> {
    inner: Arc<SessionInner<E>>,
    pump: Option<JoinHandle<()>>,
}

impl<E: MapEngine> ViewerSession<E> {
    /// Creates the map, places the catalog markers and starts listening to
    /// engine events. Must be called from within a tokio runtime.
    pub fn mount<F>(config: ViewerConfig, factory: &mut F) -> Result<Self, ViewerError>
    where
        F: EngineFactory<Engine = E>,
    {
        let runtime = Handle::try_current().map_err(|_| ViewerError::NoRuntime)?;
        let (events, mut incoming) = mpsc::unbounded_channel();
        let driver = AnimationDriver::new(config.tick_interval, runtime.clone());
        let mut controller = MapController::new(config);
        controller.mount(factory, events)?;

        let inner = Arc::new(SessionInner {
            driver: Mutex::new(driver),
            controller: Mutex::new(controller),
        });
        let weak = Arc::downgrade(&inner);
        let pump = runtime.spawn(async move {
            while let Some(event) = incoming.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.dispatch(|c| c.on_engine_event(event));
            }
            debug!("engine event pump exited");
        });
        info!("viewer mounted");
        Ok(Self {
            inner,
            pump: Some(pump),
        })
    }

    pub fn select_location(&self, location: &Location) {
        self.inner.dispatch(|c| c.on_marker_clicked(location));
    }

    pub fn set_layer_kind(&self, kind: LayerKind) {
        self.inner.dispatch(|c| c.on_layer_kind_changed(kind));
    }

    pub fn adjust_threshold(&self, direction: Direction) -> f64 {
        self.inner.dispatch(|c| c.on_threshold_adjust(direction))
    }

    pub fn slide_threshold(&self, position: f64) -> f64 {
        self.inner.dispatch(|c| c.on_threshold_slider(position))
    }

    pub fn enter_date(&self, input: &str) {
        self.inner.dispatch(|c| c.on_date_changed(input));
    }

    pub fn pick_date(&self, change: PickerChange) {
        self.inner.dispatch(|c| c.on_date_picked(change));
    }

    pub fn back_to_overview(&self) {
        self.inner.dispatch(MapController::on_back_to_overview);
    }

    pub fn toggle_animation(&self) -> PlaybackChange {
        self.inner.dispatch(MapController::toggle_animation)
    }

    pub fn zoom_by(&self, delta: f64) {
        self.inner.dispatch(|c| c.zoom_by(delta));
    }

    pub fn view(&self) -> ViewSnapshot {
        self.inner.controller.lock().view()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.controller.lock().metrics_snapshot()
    }

    /// True while the tick loop is scheduled.
    pub fn is_animating(&self) -> bool {
        self.inner.driver.lock().is_running()
    }

    /// Read access to the controller, for inspection.
    pub fn with_controller<R>(&self, f: impl FnOnce(&MapController<E>) -> R) -> R {
        f(&self.inner.controller.lock())
    }

    /// Stops playback, removes the map and detaches from engine events.
    /// Safe to call more than once.
    pub fn unmount(&mut self) {
        let Some(pump) = self.pump.take() else {
            return;
        };
        self.inner.driver.lock().stop();
        self.inner.controller.lock().unmount();
        pump.abort();
        info!("viewer unmounted");
    }
}

impl<E: MapEngine> Drop for ViewerSession<E> {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{SchemaKind, all_locations, find_by_source};
    use engine::{EngineProbe, RecordingEngine, RecordingEngineFactory};
    use foundation::time::{DateKey, RANGE_START};
    use layers::FOOTPRINT_LAYER_ID;
    use pretty_assertions::assert_eq;
    use runtime::metrics::Counter;
    use std::time::Duration;
    use tokio::time;

    type Session = ViewerSession<RecordingEngine>;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    fn mounted(mut factory: RecordingEngineFactory) -> (Session, EngineProbe) {
        let session = Session::mount(ViewerConfig::default(), &mut factory).unwrap();
        let probe = factory.last_probe().unwrap();
        (session, probe)
    }

    fn key(s: &str) -> DateKey {
        DateKey::parse(s).unwrap()
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

    fn generic() -> &'static Location {
        all_locations().iter().find(|l| !l.is_time_series()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn generic_location_shows_static_layer() {
        let (session, probe) = mounted(RecordingEngineFactory::preloaded());
        session.select_location(generic());
        assert_eq!(session.toggle_animation(), PlaybackChange::Unchanged);
        assert!(!session.is_animating());

        time::sleep(Duration::from_millis(3000)).await;
        let view = session.view();
        assert!(!view.show_date_controls);
        assert!(view.legend.is_some());
        assert!(probe.filter(FOOTPRINT_LAYER_ID).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn playback_advances_one_day_per_tick() {
        let (session, probe) = mounted(RecordingEngineFactory::preloaded());
        session.select_location(series_a());
        assert!(matches!(
            session.toggle_animation(),
            PlaybackChange::Started { .. }
        ));
        assert!(session.is_animating());

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(session.view().date, key("20160804"));
        let filter = probe.filter(FOOTPRINT_LAYER_ID).unwrap().to_json().to_string();
        assert!(filter.contains("2016-08-04"));
        let metrics = session.metrics();
        assert_eq!(metrics.get(Counter::Ticks), 3);
        assert_eq!(metrics.get(Counter::LayersLoaded), 1);
        assert_eq!(metrics.get(Counter::MarkersPlaced), all_locations().len() as u64);
        assert_eq!(metrics.get(Counter::EngineErrors), 0);

        assert_eq!(session.toggle_animation(), PlaybackChange::Stopped);
        time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(session.view().date, key("20160804"));
        assert!(!session.is_animating());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_just_before_tick_wins() {
        let (session, _probe) = mounted(RecordingEngineFactory::preloaded());
        session.select_location(series_a());
        session.toggle_animation();
        time::sleep(Duration::from_millis(999)).await;
        session.toggle_animation();
        time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(session.view().date, RANGE_START);

        // Rapid restart keeps a single loop running.
        session.toggle_animation();
        session.toggle_animation();
        session.toggle_animation();
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(session.view().date, key("20160802"));
    }

    #[tokio::test(start_paused = true)]
    async fn marker_click_from_engine_selects_location() {
        let (session, probe) = mounted(RecordingEngineFactory::preloaded());
        let id = probe.marker_at(series_b().position).unwrap();
        assert!(probe.click_marker(id));
        settle().await;

        let view = session.view();
        assert_eq!(view.location.unwrap().name, series_b().display_name);
        assert_eq!(probe.attached_markers(), 1);
        assert_eq!(probe.camera().zoom, 7.0);
    }

    #[tokio::test(start_paused = true)]
    async fn selection_before_style_load_is_replayed() {
        let (session, probe) = mounted(RecordingEngineFactory::new());
        session.select_location(series_a());
        assert!(probe.layer_ids().is_empty());
        assert!(probe.markers().is_empty());

        assert!(probe.finish_style_load());
        settle().await;
        assert_eq!(probe.markers().len(), all_locations().len());
        assert_eq!(probe.attached_markers(), 1);
        assert!(probe.layer_ids().contains(&FOOTPRINT_LAYER_ID.to_string()));
        assert_eq!(
            probe.source_url(layers::DATA_SOURCE_ID),
            Some(series_a().source_url())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn changing_location_stops_playback() {
        let (session, _probe) = mounted(RecordingEngineFactory::preloaded());
        session.select_location(series_a());
        session.toggle_animation();
        time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(session.view().date, key("20160802"));

        session.select_location(series_b());
        assert!(!session.view().is_playing);
        assert!(!session.is_animating());
        time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(session.view().date, RANGE_START);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_overview_during_playback() {
        let (session, probe) = mounted(RecordingEngineFactory::preloaded());
        session.select_location(series_a());
        session.toggle_animation();
        session.back_to_overview();
        time::sleep(Duration::from_millis(2000)).await;

        assert!(probe.layer_ids().is_empty());
        assert_eq!(probe.attached_markers(), all_locations().len());
        assert_eq!(session.view().date, RANGE_START);
        assert!(session.view().location.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_removes_map_and_stops_everything() {
        let (mut session, probe) = mounted(RecordingEngineFactory::preloaded());
        session.select_location(series_a());
        session.toggle_animation();
        session.unmount();
        session.unmount();
        assert!(probe.is_removed());

        time::sleep(Duration::from_millis(3000)).await;
        assert_eq!(session.view().date, RANGE_START);
        assert!(!probe.zoom_gesture(9.0));
    }

    #[tokio::test(start_paused = true)]
    async fn engine_zoom_is_tracked_rounded() {
        let (session, probe) = mounted(RecordingEngineFactory::preloaded());
        assert!(probe.zoom_gesture(5.26));
        settle().await;
        assert_eq!(session.view().zoom, 5.3);
    }

    #[tokio::test(start_paused = true)]
    async fn restore_on_pause_returns_camera() {
        let mut factory = RecordingEngineFactory::preloaded();
        let config = ViewerConfig {
            camera_policy: crate::config::CameraPolicy::RestoreOnPause,
            ..ViewerConfig::default()
        };
        let session = Session::mount(config, &mut factory).unwrap();
        let probe = factory.last_probe().unwrap();
        session.select_location(series_a());
        let start = probe.camera();
        session.toggle_animation();
        session.zoom_by(1.5);
        settle().await;
        session.toggle_animation();
        assert_eq!(probe.camera(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_tick_interval_plays_at_default_rate() {
        let mut factory = RecordingEngineFactory::preloaded();
        let config = ViewerConfig {
            tick_interval: Duration::ZERO,
            ..ViewerConfig::default()
        };
        let session = Session::mount(config, &mut factory).unwrap();
        session.select_location(series_a());
        session.toggle_animation();
        time::sleep(Duration::from_millis(2500)).await;
        assert!(session.is_animating());
        assert_eq!(session.view().date, key("20160803"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_container_fails_to_mount() {
        let mut factory = RecordingEngineFactory::new();
        let config = ViewerConfig {
            container: String::new(),
            ..ViewerConfig::default()
        };
        let err = Session::mount(config, &mut factory).err().unwrap();
        assert!(matches!(err, ViewerError::Engine(EngineError::Create(_))));
        assert_eq!(factory.created(), 0);
    }

    #[test]
    fn mount_outside_runtime_is_rejected() {
        let mut factory = RecordingEngineFactory::preloaded();
        let err = Session::mount(ViewerConfig::default(), &mut factory)
            .err()
            .unwrap();
        assert!(matches!(err, ViewerError::NoRuntime));
    }
}
