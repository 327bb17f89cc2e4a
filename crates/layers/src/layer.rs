use catalog::Location;
use foundation::time::DateKey;
use serde::{Deserialize, Serialize};

use crate::expression::Expression;
use crate::schema::profile;
use crate::symbology::{CirclePaint, circle_paint};
use crate::threshold::Thresholds;

/// Source id shared by both data layers of the selected location.
pub const DATA_SOURCE_ID: &str = "footprint-data";
pub const FOOTPRINT_LAYER_ID: &str = "footprint-layer";
pub const PM25_LAYER_ID: &str = "pm25-layer";

/// The two visualised data series; exactly one is active at a time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    #[default]
    Footprint,
    Pm25,
}

impl LayerKind {
    pub const ALL: [LayerKind; 2] = [LayerKind::Footprint, LayerKind::Pm25];

    pub fn layer_id(self) -> &'static str {
        match self {
            LayerKind::Footprint => FOOTPRINT_LAYER_ID,
            LayerKind::Pm25 => PM25_LAYER_ID,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LayerKind::Footprint => "Footprint",
            LayerKind::Pm25 => "PM2.5",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    None,
}

impl Visibility {
    pub fn for_layer(layer: LayerKind, active: LayerKind) -> Self {
        if layer == active {
            Visibility::Visible
        } else {
            Visibility::None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpec {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub url: String,
}

impl SourceSpec {
    pub fn vector(url: impl Into<String>) -> Self {
        Self {
            source_type: "vector",
            url: url.into(),
        }
    }

    pub fn for_location(location: &Location) -> Self {
        Self::vector(location.source_url())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct Layout {
    pub visibility: Visibility,
}

/// A circle layer as handed to the engine's `addLayer`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: &'static str,
    #[serde(rename = "type")]
    pub layer_type: &'static str,
    pub source: &'static str,
    #[serde(rename = "source-layer")]
    pub source_layer: String,
    pub paint: CirclePaint,
    pub layout: Layout,
    pub filter: Expression,
}

/// Everything the data layers of one location depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerRequest {
    pub location: Location,
    pub active: LayerKind,
    pub thresholds: Thresholds,
    pub date: DateKey,
}

impl LayerRequest {
    pub fn source(&self) -> SourceSpec {
        SourceSpec::for_location(&self.location)
    }

    /// Both circle layers, footprint first.
    pub fn layers(&self) -> [LayerSpec; 2] {
        LayerKind::ALL.map(|kind| self.layer(kind))
    }

    pub fn layer(&self, kind: LayerKind) -> LayerSpec {
        let profile = profile(self.location.schema);
        let threshold = self.thresholds.get(kind);
        LayerSpec {
            id: kind.layer_id(),
            layer_type: "circle",
            source: DATA_SOURCE_ID,
            source_layer: self.location.layer_name.clone(),
            paint: circle_paint(profile, kind, threshold),
            layout: Layout {
                visibility: Visibility::for_layer(kind, self.active),
            },
            filter: profile.filter(kind, threshold, self.date),
        }
    }
}
