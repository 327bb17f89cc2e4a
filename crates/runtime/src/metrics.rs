use std::collections::BTreeMap;

use serde::Serialize;

/// Named counters kept by the viewer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Counter {
    /// Engine calls that returned an error and were logged.
    EngineErrors,
    /// Mutations queued because the style was not yet loaded.
    Deferred,
    /// Full source + layer (re)installs.
    LayersLoaded,
    FiltersApplied,
    MarkersPlaced,
    Ticks,
    /// Ticks dropped because their run had already been stopped.
    StaleTicks,
}

impl Counter {
    pub fn name(self) -> &'static str {
        match self {
            Counter::EngineErrors => "engine.errors",
            Counter::Deferred => "engine.deferred",
            Counter::LayersLoaded => "layers.loaded",
            Counter::FiltersApplied => "filters.applied",
            Counter::MarkersPlaced => "markers.placed",
            Counter::Ticks => "animation.ticks",
            Counter::StaleTicks => "animation.stale_ticks",
        }
    }
}

/// Deterministic counters; snapshots are ordered by name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<&'static str, u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<&'static str, u64>,
}

impl MetricsSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        self.counters.get(counter.name()).copied().unwrap_or(0)
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters.get(counter.name()).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: Counter, by: u64) {
        *self.counters.entry(counter.name()).or_insert(0) += by;
    }

    /// Adds every counter of `other` into this set.
    pub fn merge(&mut self, other: &Metrics) {
        for (name, value) in &other.counters {
            *self.counters.entry(*name).or_insert(0) += *value;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self.counters.clone(),
        }
    }
}
