use catalog::{Location, SchemaKind};
use foundation::time::DateKey;
use layers::{LayerKind, LayerRequest, Thresholds};
use serde::Serialize;

/// What the user is looking at. Only the controller mutates it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionState {
    /// `None` is the overview with every marker shown.
    pub selected: Option<Location>,
    pub layer_kind: LayerKind,
    pub thresholds: Thresholds,
    /// Meaningful only while a time-series location is selected.
    pub current_date: DateKey,
    /// Never true unless the selection is time-series capable.
    pub is_playing: bool,
    /// Camera zoom rounded to one decimal.
    pub zoom: f64,
}

impl SelectionState {
    pub fn new(thresholds: Thresholds, current_date: DateKey, zoom: f64) -> Self {
        Self {
            selected: None,
            layer_kind: LayerKind::default(),
            thresholds,
            current_date,
            is_playing: false,
            zoom,
        }
    }

    pub fn schema(&self) -> Option<SchemaKind> {
        self.selected.as_ref().map(|l| l.schema)
    }

    pub fn can_animate(&self) -> bool {
        self.schema().is_some_and(SchemaKind::is_time_series)
    }

    pub fn active_threshold(&self) -> f64 {
        self.thresholds.get(self.layer_kind)
    }

    /// Layer set implied by the current selection.
    pub fn layer_request(&self) -> Option<LayerRequest> {
        let location = self.selected.clone()?;
        Some(LayerRequest {
            location,
            active: self.layer_kind,
            thresholds: self.thresholds,
            date: self.current_date,
        })
    }
}
