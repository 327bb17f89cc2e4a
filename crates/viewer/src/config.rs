use std::env;
use std::str::FromStr;
use std::time::Duration;

use foundation::geo::{Camera, LngLat};
use layers::Thresholds;
use layers::threshold::{DEFAULT_FOOTPRINT_THRESHOLD, DEFAULT_PM25_THRESHOLD};
use runtime::animation::DEFAULT_TICK_INTERVAL;
use serde::Serialize;
use tracing::warn;

pub const DEFAULT_STYLE_URL: &str = "mapbox://styles/pkulandh/cm9iyi6qq00jo01rce7xjcfay";
pub const DEFAULT_CONTAINER: &str = "map";
pub const DEFAULT_INITIAL_TIMESTAMP: &str = "08-25-2016 00:00";
/// Zoom used when flying to a selected location.
pub const SELECTION_ZOOM: f64 = 7.0;

/// What happens to the camera when playback stops.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraPolicy {
    /// Keep wherever the user moved it during playback.
    #[default]
    Leave,
    /// Jump back to where it was when playback started.
    RestoreOnPause,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub container: String,
    pub access_token: String,
    pub style_url: String,
    pub overview: Camera,
    pub selection_zoom: f64,
    pub tick_interval: Duration,
    pub initial_timestamp: String,
    pub thresholds: Thresholds,
    pub camera_policy: CameraPolicy,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            access_token: String::new(),
            style_url: DEFAULT_STYLE_URL.to_string(),
            overview: Camera::new(LngLat::new(-111.0, 39.0), 4.0),
            selection_zoom: SELECTION_ZOOM,
            tick_interval: DEFAULT_TICK_INTERVAL,
            initial_timestamp: DEFAULT_INITIAL_TIMESTAMP.to_string(),
            thresholds: Thresholds::default(),
            camera_policy: CameraPolicy::Leave,
        }
    }
}

impl ViewerConfig {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for missing or
    /// unparseable values.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let access_token = lookup("MAPBOX_TOKEN").unwrap_or_default();
        if access_token.is_empty() {
            warn!("MAPBOX_TOKEN is not set; tiles will not load from the provider");
        }

        let center = LngLat::new(
            parsed(&lookup, "MAPBOX_CENTER_LNG", defaults.overview.center.lng),
            parsed(&lookup, "MAPBOX_CENTER_LAT", defaults.overview.center.lat),
        );
        let center = if center.is_valid() {
            center
        } else {
            warn!(lng = center.lng, lat = center.lat, "overview center out of range, using default");
            defaults.overview.center
        };

        let tick_ms = parsed(&lookup, "VIEWER_TICK_MS", defaults.tick_interval.as_millis() as u64);
        let tick_interval = if tick_ms == 0 {
            warn!("VIEWER_TICK_MS must be positive, using default");
            defaults.tick_interval
        } else {
            Duration::from_millis(tick_ms)
        };

        let camera_policy = if parsed(&lookup, "VIEWER_RESTORE_CAMERA_ON_PAUSE", false) {
            CameraPolicy::RestoreOnPause
        } else {
            CameraPolicy::Leave
        };

        Self {
            container: lookup("VIEWER_CONTAINER").unwrap_or(defaults.container),
            access_token,
            style_url: lookup("MAPBOX_STYLE")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.style_url),
            overview: Camera::new(center, parsed(&lookup, "MAPBOX_ZOOM", defaults.overview.zoom)),
            selection_zoom: parsed(&lookup, "VIEWER_SELECTION_ZOOM", defaults.selection_zoom),
            tick_interval,
            initial_timestamp: lookup("VIEWER_INITIAL_TIMESTAMP")
                .unwrap_or(defaults.initial_timestamp),
            thresholds: Thresholds::clamped(
                parsed(&lookup, "VIEWER_FOOTPRINT_THRESHOLD", DEFAULT_FOOTPRINT_THRESHOLD),
                parsed(&lookup, "VIEWER_PM25_THRESHOLD", DEFAULT_PM25_THRESHOLD),
            ),
            camera_policy,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable setting");
                default
            }
        },
    }
}
