use serde::Serialize;

use crate::expression::{Curve, Expression};
use crate::layer::LayerKind;
use crate::schema::SchemaProfile;

pub const FOOTPRINT_PALETTE: [&str; 6] = [
    "#e6f7ff", "#91d5ff", "#4dabf7", "#1890ff", "#0050b3", "#003a8c",
];
pub const PM25_PALETTE: [&str; 6] = [
    "#e6ffed", "#b7eb8f", "#ffe58f", "#ffbb96", "#ff7875", "#ff4d4f",
];

/// Lower end of the footprint color scale, below which the threshold is never shown.
pub const FOOTPRINT_SCALE_FLOOR: f64 = 0.0001;
pub const FOOTPRINT_SCALE_MAX: f64 = 0.04;
pub const PM25_SCALE_MAX: f64 = 100.0;

/// Color breakpoints for `kind` given the active threshold.
///
/// The result is strictly ascending, which the engine requires for
/// `interpolate`; breakpoints that would not ascend are dropped.
pub fn color_breakpoints(kind: LayerKind, threshold: f64) -> Vec<f64> {
    let raw = match kind {
        LayerKind::Footprint => {
            let min = threshold.max(FOOTPRINT_SCALE_FLOOR);
            let max = if FOOTPRINT_SCALE_MAX > min {
                FOOTPRINT_SCALE_MAX
            } else {
                min * 2.0
            };
            let step = (max - min) / 5.0;
            (0..6).map(|i| min + step * i as f64).collect::<Vec<_>>()
        }
        LayerKind::Pm25 => {
            let max = PM25_SCALE_MAX;
            vec![
                threshold.max(0.0),
                (max * 0.1).min(12.0),
                (max * 0.35).min(35.0),
                (max * 0.55).min(55.0),
                (max * 0.75).min(75.0),
                max,
            ]
        }
    };
    strictly_ascending(raw)
}

fn strictly_ascending(values: Vec<f64>) -> Vec<f64> {
    let mut out: Vec<f64> = Vec::with_capacity(values.len());
    for v in values {
        if out.last().is_none_or(|last| v > *last) {
            out.push(v);
        }
    }
    out
}

pub fn palette(kind: LayerKind) -> &'static [&'static str; 6] {
    match kind {
        LayerKind::Footprint => &FOOTPRINT_PALETTE,
        LayerKind::Pm25 => &PM25_PALETTE,
    }
}

/// Value-to-color ramp. When breakpoints were dropped the palette keeps its
/// upper colors so the strongest values stay the darkest.
pub fn color_ramp(profile: &SchemaProfile, kind: LayerKind, threshold: f64) -> Expression {
    let stops = color_breakpoints(kind, threshold);
    let colors = palette(kind);
    let skip = colors.len() - stops.len();
    let pairs = stops
        .into_iter()
        .zip(colors.iter().skip(skip))
        .map(|(at, color)| (at, Expression::text(*color)))
        .collect();
    Expression::interpolate(Curve::Linear, profile.value_expression(kind), pairs)
}

/// Zoom-dependent circle radius.
pub fn radius_ramp(kind: LayerKind) -> Expression {
    let (curve, stops): (Curve, &[(f64, f64)]) = match kind {
        LayerKind::Footprint => (
            Curve::Exponential(2.0),
            &[(4.0, 2.0), (5.0, 5.0), (6.0, 7.0), (7.0, 10.0), (8.0, 20.0)],
        ),
        LayerKind::Pm25 => (Curve::Linear, &[(5.0, 12.0), (8.0, 20.0), (12.0, 35.0)]),
    };
    let stops = stops
        .iter()
        .map(|&(z, r)| (z, Expression::Number(r)))
        .collect();
    Expression::interpolate(curve, Expression::Zoom, stops)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CirclePaint {
    #[serde(rename = "circle-radius")]
    pub radius: Expression,
    #[serde(rename = "circle-color")]
    pub color: Expression,
    #[serde(rename = "circle-opacity")]
    pub opacity: f64,
    #[serde(rename = "circle-blur")]
    pub blur: f64,
    #[serde(rename = "circle-stroke-width")]
    pub stroke_width: f64,
    #[serde(rename = "circle-stroke-color")]
    pub stroke_color: &'static str,
}

pub fn circle_paint(profile: &SchemaProfile, kind: LayerKind, threshold: f64) -> CirclePaint {
    let (blur, stroke_width) = match kind {
        LayerKind::Footprint => (0.2, 0.0),
        LayerKind::Pm25 => (0.5, 0.5),
    };
    CirclePaint {
        radius: radius_ramp(kind),
        color: color_ramp(profile, kind, threshold),
        opacity: 0.85,
        blur,
        stroke_width,
        stroke_color: "rgba(255, 255, 255, 0.3)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::profile;
    use catalog::SchemaKind;

    fn ascending(v: &[f64]) -> bool {
        v.windows(2).all(|w| w[0] < w[1])
    }

    #[test]
    fn footprint_breakpoints_span_threshold_to_max() {
        let b = color_breakpoints(LayerKind::Footprint, 0.0002);
        assert_eq!(b.len(), 6);
        assert_eq!(b[0], 0.0002);
        assert!((b[5] - FOOTPRINT_SCALE_MAX).abs() < 1e-12);
        assert!(ascending(&b));
    }

    #[test]
    fn footprint_breakpoints_ascend_at_max_threshold() {
        let b = color_breakpoints(LayerKind::Footprint, FOOTPRINT_SCALE_MAX);
        assert_eq!(b.len(), 6);
        assert!(ascending(&b));
    }

    #[test]
    fn pm25_breakpoints_drop_overtaken_stops() {
        assert_eq!(
            color_breakpoints(LayerKind::Pm25, 0.01),
            vec![0.01, 10.0, 35.0, 55.0, 75.0, 100.0]
        );
        let b = color_breakpoints(LayerKind::Pm25, 40.0);
        assert_eq!(b, vec![40.0, 55.0, 75.0, 100.0]);
    }

    #[test]
    fn ramp_keeps_darkest_colors_when_trimmed() {
        let p = profile(SchemaKind::Generic);
        let Expression::Interpolate { stops, input, .. } = color_ramp(p, LayerKind::Pm25, 40.0)
        else {
            panic!("expected interpolate");
        };
        assert_eq!(stops.len(), 4);
        assert_eq!(stops[3].1, Expression::text("#ff4d4f"));
        assert_eq!(stops[0].1, Expression::text("#ffe58f"));
        assert_eq!(input.fields(), vec!["pm25"]);
    }

    #[test]
    fn ramp_reads_schema_value_field() {
        let p = profile(SchemaKind::TimeSeriesB);
        let ramp = color_ramp(p, LayerKind::Pm25, 0.01);
        assert_eq!(ramp.fields()[0], "pm25_value");
    }
}
