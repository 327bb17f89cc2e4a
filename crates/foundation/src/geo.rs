use serde::{Deserialize, Serialize};

/// A WGS84 position in degrees.
///
/// Field order follows the map convention (`lng` first), which is also the
/// order the rendering engine expects for centers and marker anchors.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LngLat {
    pub lng: f64,
    pub lat: f64,
}

impl LngLat {
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Returns `None` when either component is outside the WGS84 range.
    pub fn try_new(lng: f64, lat: f64) -> Option<Self> {
        let p = Self::new(lng, lat);
        p.is_valid().then_some(p)
    }

    pub fn is_valid(&self) -> bool {
        self.lng.is_finite()
            && self.lat.is_finite()
            && (-180.0..=180.0).contains(&self.lng)
            && (-90.0..=90.0).contains(&self.lat)
    }

    /// Exact coordinate identity, used to recognise a catalog entry.
    pub fn same_point(&self, other: &LngLat) -> bool {
        self.lng.to_bits() == other.lng.to_bits() && self.lat.to_bits() == other.lat.to_bits()
    }
}

/// Camera placement: a center and a zoom level.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub center: LngLat,
    pub zoom: f64,
}

impl Camera {
    pub const fn new(center: LngLat, zoom: f64) -> Self {
        Self { center, zoom }
    }
}

/// Rounds a zoom level to one decimal, the precision shown in the header.
pub fn round_zoom(zoom: f64) -> f64 {
    (zoom * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::{LngLat, round_zoom};

    #[test]
    fn validates_ranges() {
        assert!(LngLat::try_new(-111.8722, 40.73639).is_some());
        assert!(LngLat::try_new(-180.0, 90.0).is_some());
        assert!(LngLat::try_new(-180.5, 0.0).is_none());
        assert!(LngLat::try_new(0.0, 91.0).is_none());
        assert!(LngLat::try_new(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn same_point_is_exact() {
        let a = LngLat::new(-101.8504, 33.59076);
        assert!(a.same_point(&LngLat::new(-101.8504, 33.59076)));
        assert!(!a.same_point(&LngLat::new(-101.8504, 33.59077)));
    }

    #[test]
    fn zoom_rounds_to_tenths() {
        assert_eq!(round_zoom(6.96), 7.0);
        assert_eq!(round_zoom(4.04), 4.0);
        assert_eq!(round_zoom(5.25), 5.3);
    }
}
