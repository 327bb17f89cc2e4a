//! Read model consumed by the header, controls and legend.

use catalog::{Location, SchemaKind};
use engine::BindingPhase;
use foundation::time::DateKey;
use layers::{LayerKind, Legend, Thresholds, legend_for};
use serde::Serialize;

use crate::state::SelectionState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedView {
    pub name: String,
    pub lng: f64,
    pub lat: f64,
    pub schema: SchemaKind,
}

impl From<&Location> for SelectedView {
    fn from(location: &Location) -> Self {
        Self {
            name: location.display_name.clone(),
            lng: location.position.lng,
            lat: location.position.lat,
            schema: location.schema,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub phase: BindingPhase,
    pub location: Option<SelectedView>,
    pub layer_kind: LayerKind,
    pub layer_label: &'static str,
    pub thresholds: Thresholds,
    pub date: DateKey,
    /// `MM/DD/YYYY`
    pub display_date: String,
    pub show_date_controls: bool,
    pub is_playing: bool,
    pub zoom: f64,
    /// Absent in the overview.
    pub legend: Option<Legend>,
}

impl ViewSnapshot {
    pub fn capture(state: &SelectionState, phase: BindingPhase) -> Self {
        let location = state.selected.as_ref().map(SelectedView::from);
        let legend = location
            .is_some()
            .then(|| legend_for(state.layer_kind, &state.thresholds));
        Self {
            phase,
            location,
            layer_kind: state.layer_kind,
            layer_label: state.layer_kind.label(),
            thresholds: state.thresholds,
            date: state.current_date,
            display_date: state.current_date.display_label(),
            show_date_controls: state.can_animate(),
            is_playing: state.is_playing,
            zoom: state.zoom,
            legend,
        }
    }
}
