use serde::{Deserialize, Serialize};

use crate::layer::LayerKind;

/// Multiplier applied by one threshold step.
pub const THRESHOLD_FACTOR: f64 = 2.0;

pub const FOOTPRINT_BOUNDS: ThresholdBounds = ThresholdBounds::new(0.0001, 0.04);
pub const PM25_BOUNDS: ThresholdBounds = ThresholdBounds::new(0.001, 100.0);

pub const DEFAULT_FOOTPRINT_THRESHOLD: f64 = 0.0002;
pub const DEFAULT_PM25_THRESHOLD: f64 = 0.01;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    /// The single step that moves `current` toward `target`, if any.
    pub fn toward(current: f64, target: f64) -> Option<Direction> {
        if target > current {
            Some(Direction::Increase)
        } else if target < current {
            Some(Direction::Decrease)
        } else {
            None
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ThresholdBounds {
    pub min: f64,
    pub max: f64,
}

impl ThresholdBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn for_kind(kind: LayerKind) -> Self {
        match kind {
            LayerKind::Footprint => FOOTPRINT_BOUNDS,
            LayerKind::Pm25 => PM25_BOUNDS,
        }
    }

    /// Non-finite input lands on `min`.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }
}

/// One threshold step for `kind`, clamped to that kind's bounds.
pub fn adjust(current: f64, direction: Direction, kind: LayerKind) -> f64 {
    let next = match direction {
        Direction::Increase => current * THRESHOLD_FACTOR,
        Direction::Decrease => current / THRESHOLD_FACTOR,
    };
    ThresholdBounds::for_kind(kind).clamp(next)
}

/// Converts a log10 slider position back to a threshold value.
pub fn from_slider(position: f64) -> f64 {
    10f64.powf(position)
}

pub fn to_slider(threshold: f64) -> f64 {
    threshold.log10()
}

/// The two independent cutoffs, one per layer kind.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub footprint: f64,
    pub pm25: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            footprint: DEFAULT_FOOTPRINT_THRESHOLD,
            pm25: DEFAULT_PM25_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Builds thresholds with both values pulled into their bounds.
    pub fn clamped(footprint: f64, pm25: f64) -> Self {
        Self {
            footprint: FOOTPRINT_BOUNDS.clamp(footprint),
            pm25: PM25_BOUNDS.clamp(pm25),
        }
    }

    pub fn get(&self, kind: LayerKind) -> f64 {
        match kind {
            LayerKind::Footprint => self.footprint,
            LayerKind::Pm25 => self.pm25,
        }
    }

    pub fn set(&mut self, kind: LayerKind, value: f64) {
        let value = ThresholdBounds::for_kind(kind).clamp(value);
        match kind {
            LayerKind::Footprint => self.footprint = value,
            LayerKind::Pm25 => self.pm25 = value,
        }
    }

    /// Applies one step to `kind` and returns the new value.
    pub fn step(&mut self, kind: LayerKind, direction: Direction) -> f64 {
        let next = adjust(self.get(kind), direction, kind);
        self.set(kind, next);
        next
    }
}
