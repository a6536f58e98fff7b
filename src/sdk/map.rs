use serde::Serialize;
use std::f64::consts::PI;
use std::str::FromStr;

use super::geo::{Bounds, LatLng};

const TILE_SIZE_PX: f64 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseLayer {
    #[default]
    Osm,
    Aerial,
}

impl FromStr for BaseLayer {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "osm" | "kart" => Ok(BaseLayer::Osm),
            "aerial" | "flyfoto" => Ok(BaseLayer::Aerial),
            other => Err(format!("unknown base layer: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileLayer {
    pub url_template: &'static str,
    pub attribution: &'static str,
    pub max_zoom: u8,
}

impl BaseLayer {
    pub fn tile_layer(self) -> TileLayer {
        match self {
            BaseLayer::Osm => TileLayer {
                url_template: "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
                attribution: "© OpenStreetMap contributors",
                max_zoom: 19,
            },
            BaseLayer::Aerial => TileLayer {
                url_template: "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
                attribution: "Tiles © Esri — Source: Esri, and the GIS User Community",
                max_zoom: 18,
            },
        }
    }
}

/// Viewport of the map: base layer, center and zoom, kept inside Norway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSurface {
    pub base_layer: BaseLayer,
    pub center: LatLng,
    pub zoom: u8,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub max_bounds: Bounds,
}

impl Default for MapSurface {
    fn default() -> Self {
        Self {
            base_layer: BaseLayer::Osm,
            // Kristiansand
            center: LatLng::new(58.1599, 8.0182),
            zoom: 13,
            min_zoom: 5,
            max_zoom: 19,
            max_bounds: Bounds::new(LatLng::new(57.0, 4.0), LatLng::new(72.0, 32.0)),
        }
    }
}

/// Zoom cap when fitting the view to a dataset.
pub const FIT_MAX_ZOOM: u8 = 13;
pub const FIT_PADDING_PX: f64 = 50.0;

fn mercator_x(lng: f64) -> f64 {
    (lng + 180.0) / 360.0
}

fn mercator_y(lat: f64) -> f64 {
    let phi = lat.to_radians();
    (1.0 - (phi.tan() + 1.0 / phi.cos()).ln() / PI) / 2.0
}

impl MapSurface {
    /// Switches the active base layer. Returns `true` if it changed.
    pub fn set_base_layer(&mut self, layer: BaseLayer) -> bool {
        let changed = self.base_layer != layer;
        self.base_layer = layer;
        self.zoom = self.zoom.min(self.effective_max_zoom());
        changed
    }

    pub fn active_tile_layer(&self) -> TileLayer {
        self.base_layer.tile_layer()
    }

    fn effective_max_zoom(&self) -> u8 {
        self.max_zoom.min(self.base_layer.tile_layer().max_zoom)
    }

    pub fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.center = self.max_bounds.clamp(center);
        self.zoom = zoom.clamp(self.min_zoom, self.effective_max_zoom());
    }

    /// Largest zoom at which `bounds` fits a `width`×`height` pixel viewport
    /// with `padding` on every side.
    pub fn zoom_for_bounds(&self, bounds: &Bounds, width: f64, height: f64, padding: f64) -> u8 {
        let usable_w = (width - 2.0 * padding).max(1.0);
        let usable_h = (height - 2.0 * padding).max(1.0);
        let span_x = (mercator_x(bounds.north_east.lng) - mercator_x(bounds.south_west.lng)).abs();
        let span_y = (mercator_y(bounds.south_west.lat) - mercator_y(bounds.north_east.lat)).abs();

        let mut zoom = self.effective_max_zoom();
        while zoom > self.min_zoom {
            let world = TILE_SIZE_PX * 2f64.powi(zoom as i32);
            if span_x * world <= usable_w && span_y * world <= usable_h {
                break;
            }
            zoom -= 1;
        }
        zoom
    }

    /// Centers on `bounds` at the closest zoom that shows all of it, never
    /// closer than [`FIT_MAX_ZOOM`].
    pub fn fit_bounds(&mut self, bounds: &Bounds, width: f64, height: f64) {
        let zoom = self
            .zoom_for_bounds(bounds, width, height, FIT_PADDING_PX)
            .min(FIT_MAX_ZOOM);
        self.set_view(bounds.center(), zoom);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switching_layers_caps_zoom() {
        let mut map = MapSurface::default();
        map.set_view(map.center, 19);
        assert_eq!(map.zoom, 19);
        assert!(map.set_base_layer(BaseLayer::Aerial));
        assert_eq!(map.zoom, 18);
        assert!(!map.set_base_layer(BaseLayer::Aerial));
        assert!(map.active_tile_layer().url_template.contains("World_Imagery"));
    }

    #[test]
    fn view_is_kept_inside_max_bounds() {
        let mut map = MapSurface::default();
        map.set_view(LatLng::new(48.85, 2.35), 2);
        assert_eq!(map.center, LatLng::new(57.0, 4.0));
        assert_eq!(map.zoom, 5);
    }

    #[test]
    fn fit_bounds_zooms_out_for_wide_extents() {
        let mut map = MapSurface::default();
        let city = Bounds::new(LatLng::new(58.14, 7.98), LatLng::new(58.17, 8.03));
        map.fit_bounds(&city, 1024.0, 768.0);
        assert_eq!(map.zoom, FIT_MAX_ZOOM);

        let county = Bounds::new(LatLng::new(57.9, 6.5), LatLng::new(59.5, 9.0));
        map.fit_bounds(&county, 1024.0, 768.0);
        assert!(map.zoom < 9, "zoom {}", map.zoom);
        assert!(map.max_bounds.contains(map.center));
    }
}
