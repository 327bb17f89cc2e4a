use catalog::Location;
use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerStyle {
    pub color: &'static str,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<u32>,
}

pub const DEFAULT_MARKER: MarkerStyle = MarkerStyle {
    color: "#4dabf7",
    width: 25,
    height: 41,
    z_index: None,
};

pub const TIME_SERIES_MARKER: MarkerStyle = MarkerStyle {
    color: "#845ef7",
    ..DEFAULT_MARKER
};

pub const SELECTED_MARKER: MarkerStyle = MarkerStyle {
    color: "#ff9500",
    width: 30,
    height: 49,
    z_index: Some(100),
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MarkerPresentation {
    pub style: MarkerStyle,
    pub attached: bool,
}

/// How the marker for `location` looks given the current selection.
///
/// With nothing selected every marker is shown in its resting style. With a
/// selection only the selected marker stays attached.
pub fn marker_presentation(location: &Location, selected: Option<&Location>) -> MarkerPresentation {
    let resting = if location.is_time_series() {
        TIME_SERIES_MARKER
    } else {
        DEFAULT_MARKER
    };
    match selected {
        None => MarkerPresentation {
            style: resting,
            attached: true,
        },
        Some(sel) if sel.same_as(location) => MarkerPresentation {
            style: SELECTED_MARKER,
            attached: true,
        },
        Some(_) => MarkerPresentation {
            style: resting,
            attached: false,
        },
    }
}
