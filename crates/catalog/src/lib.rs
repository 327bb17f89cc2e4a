use foundation::geo::LngLat;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Shape of the per-feature attributes a location's tiles expose.
///
/// Fixed per location; never changes at runtime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaKind {
    /// Single snapshot: `footprint` / `pm25`, no date partition.
    Generic,
    /// Daily series: `value` / `pm25` keyed by `date`.
    TimeSeriesA,
    /// Daily series in one source: `value` / `pm25_value`, split by `layer_type`.
    TimeSeriesB,
}

impl SchemaKind {
    pub fn is_time_series(self) -> bool {
        !matches!(self, SchemaKind::Generic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub position: LngLat,
    /// Tileset identifier at the vector-tile provider. Unique per location.
    pub data_source_id: String,
    /// Source-layer inside the tileset.
    pub layer_name: String,
    pub schema: SchemaKind,
    pub display_name: String,
}

impl Location {
    pub fn is_time_series(&self) -> bool {
        self.schema.is_time_series()
    }

    pub fn source_url(&self) -> String {
        format!("mapbox://{}", self.data_source_id)
    }

    /// Locations are identified by their data source.
    pub fn same_as(&self, other: &Location) -> bool {
        self.data_source_id == other.data_source_id
    }
}

const TILESET_OWNER: &str = "pkulandh";

// Receptor sites as (lng, lat).
const SITES: &[(f64, f64)] = &[
    (-101.8504, 33.59076),
    (-104.8286, 38.84801),
    (-104.9876, 39.75118),
    (-105.0797, 40.57129),
    (-105.2634, 40.0211),
    (-106.5012, 31.76829),
    (-106.5852, 35.1343),
    (-110.9823, 32.29515),
    (-111.8722, 40.73639),
    (-112.0958, 33.50383),
    (-115.0529, 36.0487),
    (-116.2703, 43.63611),
    (-116.541, 33.85275),
    (-117.1497, 32.70149),
    (-117.3255, 34.51096),
    (-117.331, 33.67649),
    (-117.4263, 47.69978),
    (-118.1305, 34.66974),
    (-118.5284, 34.38344),
    (-119.0626, 35.35661),
    (-119.1432, 34.25239),
    (-119.2042, 46.21835),
    (-119.7164, 36.81945),
    (-119.8077, 39.52508),
    (-120.9942, 37.64216),
    (-121.265, 38.74643),
    (-121.2685, 37.95074),
    (-121.8949, 37.3485),
    (-122.3086, 47.56824),
    (-122.7102, 38.4435),
    (-122.8164, 45.47019),
];

struct SiteOverride {
    position: LngLat,
    schema: SchemaKind,
    tileset: Option<(&'static str, &'static str)>,
    name: &'static str,
}

const OVERRIDES: &[SiteOverride] = &[
    SiteOverride {
        position: LngLat::new(-101.8504, 33.59076),
        schema: SchemaKind::TimeSeriesA,
        tileset: Some(("8veldf0e", "tmp_zu_cizy")),
        name: "Muleshoe, TX",
    },
    SiteOverride {
        position: LngLat::new(-111.8722, 40.73639),
        schema: SchemaKind::TimeSeriesB,
        tileset: None,
        name: "Salt Lake City, UT",
    },
];

static LOCATIONS: Lazy<Vec<Location>> = Lazy::new(|| {
    SITES
        .iter()
        .map(|&(lng, lat)| build_location(LngLat::new(lng, lat)))
        .collect()
});

fn build_location(position: LngLat) -> Location {
    let conventional = conventional_layer_name(position);
    let over = OVERRIDES.iter().find(|o| o.position.same_point(&position));

    let (tileset, layer_name) = match over.and_then(|o| o.tileset) {
        Some((tileset, layer)) => (tileset.to_string(), layer.to_string()),
        None => (conventional.clone(), conventional),
    };

    Location {
        position,
        data_source_id: format!("{TILESET_OWNER}.{tileset}"),
        layer_name,
        schema: over.map_or(SchemaKind::Generic, |o| o.schema),
        display_name: over.map_or_else(
            || format!("{:.4}°N, {:.4}°W", position.lat, position.lng.abs()),
            |o| o.name.to_string(),
        ),
    }
}

/// `wf_<|lng|>_<lat>` with the decimal points replaced by underscores.
fn conventional_layer_name(position: LngLat) -> String {
    let lng = position.lng.abs().to_string().replace('.', "_");
    let lat = position.lat.to_string().replace('.', "_");
    format!("wf_{lng}_{lat}")
}

/// Every known location, in stable catalog order.
pub fn all_locations() -> &'static [Location] {
    &LOCATIONS
}

pub fn find_by_source(data_source_id: &str) -> Option<&'static Location> {
    all_locations()
        .iter()
        .find(|l| l.data_source_id == data_source_id)
}

pub fn find_at(position: LngLat) -> Option<&'static Location> {
    all_locations()
        .iter()
        .find(|l| l.position.same_point(&position))
}

/// Locations whose tiles carry a daily series.
pub fn time_series_locations() -> impl Iterator<Item = &'static Location> {
    all_locations().iter().filter(|l| l.is_time_series())
}
