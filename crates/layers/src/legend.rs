use serde::Serialize;

use crate::layer::LayerKind;
use crate::symbology::{color_breakpoints, palette};
use crate::threshold::Thresholds;

const PM25_CATEGORIES: [&str; 6] = [
    "Very Good",
    "Good",
    "Moderate",
    "Unhealthy for Sensitive",
    "Unhealthy",
    "Very Unhealthy",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub color: &'static str,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub title: &'static str,
    pub entries: Vec<LegendEntry>,
    pub note: String,
}

/// Legend matching the color ramp drawn for `kind`.
pub fn legend_for(kind: LayerKind, thresholds: &Thresholds) -> Legend {
    let threshold = thresholds.get(kind);
    let stops = color_breakpoints(kind, threshold);
    let skip = palette(kind).len() - stops.len();
    let colors = &palette(kind)[skip..];

    match kind {
        LayerKind::Footprint => Legend {
            title: "Footprint Scale",
            entries: stops
                .iter()
                .zip(colors)
                .map(|(v, color)| LegendEntry {
                    color,
                    label: format!("{v:.4e}"),
                    category: None,
                })
                .collect(),
            note: format!("Values < {threshold:.4e} are filtered out"),
        },
        LayerKind::Pm25 => Legend {
            title: "PM2.5 Scale (μg/m³)",
            entries: stops
                .iter()
                .enumerate()
                .zip(colors.iter().zip(&PM25_CATEGORIES[skip..]))
                .map(|((i, v), (color, category))| LegendEntry {
                    color,
                    label: match stops.get(i + 1) {
                        Some(next) => format!("{v:.1} - {next:.1}"),
                        None => format!("{v:.1}+"),
                    },
                    category: Some(category),
                })
                .collect(),
            note: format!("Values < {threshold} are filtered out"),
        },
    }
}
