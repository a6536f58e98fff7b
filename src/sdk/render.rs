//! Overlay scene: facility markers, lines, the user marker and the readout
//! of the nearest facility, exportable as a GeoJSON `FeatureCollection`.

use std::fmt;

use geojson::{Feature, FeatureCollection, JsonObject};
use serde::Serialize;
use serde_json::json;

use super::datasets::DatasetConfig;
use super::facilities::{DatasetRecord, FacilityId, Geometry};
use super::geo::{Bounds, DistanceBand, LatLng};
use super::map::MapSurface;
use super::nearest::{DistanceMode, NearestFacility};

const USER_COLOR: &str = "#1E40AF";
const USER_FILL: &str = "#3B82F6";
const PULSE_FILL: &str = "#60A5FA";
const ROAD_ROUTE_COLOR: &str = "blue";

/// Minimal HTML escaping for popup text.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn facility_popup(name: &str, address: Option<&str>) -> String {
    let mut html = format!(
        "<div style=\"font-family: sans-serif; padding: 4px;\"><strong>{}</strong>",
        escape_html(name)
    );
    if let Some(address) = address.filter(|a| !a.is_empty()) {
        html.push_str(&format!(
            "<br><span style=\"color: #666; font-size: 0.9em;\">Adresse: {}</span>",
            escape_html(address)
        ));
    }
    html.push_str("</div>");
    html
}

pub fn distance_popup(formatted: &str) -> String {
    format!(
        "<div style=\"text-align: center; font-family: sans-serif; padding: 4px;\"><strong>Avstand: {}</strong></div>",
        formatted
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub id: FacilityId,
    pub position: LatLng,
    pub color: String,
    pub icon: String,
    pub popup: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polyline {
    pub path: Vec<LatLng>,
    pub color: String,
    pub weight: u8,
    pub opacity: f64,
    pub dash_array: Option<&'static str>,
    pub popup: Option<String>,
}

/// The growing and shrinking halo around the user marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PulseMarker {
    pub radius: f64,
    pub fill_opacity: f64,
    pub opacity: f64,
    growing: bool,
}

impl PulseMarker {
    pub const MIN_RADIUS: f64 = 12.0;
    pub const MAX_RADIUS: f64 = 30.0;
    /// Animation step period.
    pub const TICK_MS: u64 = 100;

    pub fn new() -> Self {
        Self {
            radius: Self::MAX_RADIUS,
            fill_opacity: 0.5,
            opacity: 0.8,
            growing: false,
        }
    }

    /// Advances one animation step.
    pub fn tick(&mut self) {
        if self.growing {
            self.radius += 1.0;
            if self.radius >= Self::MAX_RADIUS {
                self.growing = false;
            }
        } else {
            self.radius -= 1.0;
            if self.radius <= Self::MIN_RADIUS {
                self.growing = true;
            }
        }
        let grown = self.radius - Self::MIN_RADIUS;
        self.fill_opacity = 0.3 - grown / 60.0;
        self.opacity = 0.5 - grown / 40.0;
    }
}

impl Default for PulseMarker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserMarker {
    pub position: LatLng,
    pub pulse: PulseMarker,
}

/// One line of status: which facility is closest and how far away.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReadout {
    pub dataset_title: String,
    pub facility_name: String,
    pub distance: String,
    pub measured: DistanceMode,
    pub band: DistanceBand,
    pub color: &'static str,
}

impl StatusReadout {
    pub fn new(dataset: &DatasetConfig, nearest: &NearestFacility) -> Self {
        let band = nearest.band();
        Self {
            dataset_title: dataset.title.clone(),
            facility_name: nearest.facility.name.clone(),
            distance: nearest.formatted_distance(),
            measured: nearest.measured,
            band,
            color: band.color(),
        }
    }
}

impl fmt::Display for StatusReadout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Nearest {}: {} [{}, {}]",
            self.dataset_title.to_lowercase(),
            self.facility_name,
            self.distance,
            self.measured
        )
    }
}

/// Everything drawn on top of the base map.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scene {
    pub markers: Vec<Marker>,
    pub lines: Vec<Polyline>,
    pub nearest_line: Option<Polyline>,
    pub user: Option<UserMarker>,
}

impl Scene {
    /// Removes dataset overlays and the nearest line. The user marker stays.
    pub fn clear_dataset_overlays(&mut self) {
        self.markers.clear();
        self.lines.clear();
        self.nearest_line = None;
    }

    /// Draws the records of a dataset, replacing whatever was drawn before.
    pub fn draw_records(&mut self, records: &[DatasetRecord], dataset: &DatasetConfig) {
        self.clear_dataset_overlays();
        for record in records {
            match &record.geometry {
                Geometry::Point(position) if position.is_valid() => self.markers.push(Marker {
                    id: record.id.clone(),
                    position: *position,
                    color: dataset.color.clone(),
                    icon: dataset.icon.clone(),
                    popup: facility_popup(&record.name, record.address.as_deref()),
                }),
                Geometry::LineString(path) if path.iter().all(LatLng::is_valid) => {
                    self.lines.push(Polyline {
                        path: path.clone(),
                        color: dataset.color.clone(),
                        weight: 3,
                        opacity: 0.8,
                        dash_array: None,
                        popup: Some(facility_popup(&record.name, record.address.as_deref())),
                    })
                }
                _ => log::debug!("Not drawing record {} with invalid geometry", record.id),
            }
        }
    }

    /// Bounds of all markers and lines, for fitting the view.
    pub fn dataset_bounds(&self) -> Option<Bounds> {
        Bounds::from_points(
            self.markers
                .iter()
                .map(|m| m.position)
                .chain(self.lines.iter().flat_map(|l| l.path.iter().copied())),
        )
    }

    /// Moves the user marker, creating it on first use. The pulse restarts.
    pub fn set_user_position(&mut self, position: LatLng) {
        self.user = Some(UserMarker {
            position,
            pulse: PulseMarker::new(),
        });
    }

    pub fn tick_pulse(&mut self) {
        if let Some(user) = self.user.as_mut() {
            user.pulse.tick();
        }
    }

    /// Draws the connection from the user to the nearest facility: the
    /// driving route when there is one, a dashed straight line otherwise.
    pub fn draw_nearest(&mut self, user: LatLng, nearest: &NearestFacility, dataset_color: &str) {
        let formatted = nearest.formatted_distance();
        self.nearest_line = Some(match &nearest.route {
            Some(route) if route.len() >= 2 => Polyline {
                path: route.clone(),
                color: ROAD_ROUTE_COLOR.to_string(),
                weight: 5,
                opacity: 0.7,
                dash_array: None,
                popup: Some(distance_popup(&formatted)),
            },
            _ => Polyline {
                path: vec![user, nearest.facility.position],
                color: dataset_color.to_string(),
                weight: 4,
                opacity: 0.8,
                dash_array: Some("10, 10"),
                popup: Some(distance_popup(&formatted)),
            },
        });
    }

    pub fn clear_nearest(&mut self) {
        self.nearest_line = None;
    }

    /// Adds an extra line, e.g. a path from the shortest-path service.
    pub fn add_line(&mut self, line: Polyline) {
        self.lines.push(line);
    }

    /// The scene as a GeoJSON `FeatureCollection`. The viewport and the
    /// status readout travel as foreign members `map` and `status`.
    pub fn to_geojson(&self, map: &MapSurface, status: Option<&StatusReadout>) -> FeatureCollection {
        let mut features = Vec::new();

        for marker in &self.markers {
            let mut f = point_feature(marker.position);
            f.set_property("kind", "facility");
            f.set_property("id", json!(marker.id));
            f.set_property("marker-color", marker.color.clone());
            f.set_property("icon", marker.icon.clone());
            f.set_property("popup", marker.popup.clone());
            features.push(f);
        }

        for line in &self.lines {
            features.push(line_feature(line, "line"));
        }
        if let Some(line) = &self.nearest_line {
            features.push(line_feature(line, "nearest"));
        }

        if let Some(user) = &self.user {
            let mut f = point_feature(user.position);
            f.set_property("kind", "user");
            f.set_property("marker-color", USER_FILL);
            f.set_property("stroke", USER_COLOR);
            f.set_property("pulse-fill", PULSE_FILL);
            f.set_property("pulse-radius", user.pulse.radius);
            f.set_property("popup", "<div style='text-align: center;'>Din posisjon</div>");
            features.push(f);
        }

        let mut members = JsonObject::new();
        members.insert(
            "map".into(),
            json!({
                "center": map.center.to_lng_lat(),
                "zoom": map.zoom,
                "tiles": map.active_tile_layer(),
            }),
        );
        if let Some(status) = status {
            members.insert("status".into(), json!(status));
        }

        let mut collection: FeatureCollection = features.into_iter().collect();
        collection.foreign_members = Some(members);
        collection
    }
}

fn point_feature(position: LatLng) -> Feature {
    Feature::from(geojson::Geometry::new(geojson::Value::Point(position.to_lng_lat().to_vec())))
}

fn line_feature(line: &Polyline, kind: &str) -> Feature {
    let coordinates = line.path.iter().map(|p| p.to_lng_lat().to_vec()).collect();
    let mut f = Feature::from(geojson::Geometry::new(geojson::Value::LineString(coordinates)));
    f.set_property("kind", kind);
    f.set_property("stroke", line.color.clone());
    f.set_property("stroke-width", line.weight);
    f.set_property("stroke-opacity", line.opacity);
    f.set_property("dash-array", line.dash_array);
    f.set_property("popup", line.popup.clone());
    f
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::datasets::DatasetCatalog;
    use crate::sdk::facilities::FacilityPoint;

    fn record(id: i64, name: &str, geometry: Geometry) -> DatasetRecord {
        DatasetRecord {
            id: FacilityId::Num(id),
            name: name.to_string(),
            address: None,
            geometry,
        }
    }

    #[test]
    fn popups_escape_names() {
        let html = facility_popup("Brann & <Redning>", Some("Tordenskjolds gate 1"));
        assert!(html.contains("Brann &amp; &lt;Redning&gt;"));
        assert!(html.contains("Adresse: Tordenskjolds gate 1"));
        assert!(!facility_popup("A", None).contains("Adresse"));
    }

    #[test]
    fn dataset_change_keeps_user_marker() {
        let catalog = DatasetCatalog::builtin();
        let fire = catalog.get("brannstasjoner").unwrap();
        let mut scene = Scene::default();
        scene.set_user_position(LatLng::new(58.0, 8.0));
        scene.draw_records(
            &[
                record(1, "A", Geometry::Point(LatLng::new(58.1, 8.1))),
                record(2, "B", Geometry::Point(LatLng::new(f64::NAN, 8.1))),
                record(3, "C", Geometry::LineString(vec![LatLng::new(58.0, 8.0), LatLng::new(58.2, 8.2)])),
            ],
            fire,
        );
        assert_eq!(scene.markers.len(), 1);
        assert_eq!(scene.lines.len(), 1);
        assert_eq!(scene.markers[0].color, "#EF4444");

        scene.draw_records(&[], catalog.get("sykehus").unwrap());
        assert!(scene.markers.is_empty());
        assert!(scene.user.is_some());
    }

    #[test]
    fn air_result_draws_dashed_line() {
        let nearest = NearestFacility {
            facility: FacilityPoint::new(FacilityId::Num(1), "A", LatLng::new(58.01, 8.0)),
            distance_m: 1112.0,
            measured: DistanceMode::Air,
            route: None,
            duration_s: None,
        };
        let mut scene = Scene::default();
        scene.draw_nearest(LatLng::new(58.0, 8.0), &nearest, "#EF4444");
        let line = scene.nearest_line.as_ref().unwrap();
        assert_eq!(line.dash_array, Some("10, 10"));
        assert_eq!(line.path.len(), 2);
        assert!(line.popup.as_deref().unwrap().contains("Avstand: 1.1 km"));

        let collection = scene.to_geojson(&MapSurface::default(), None);
        let first = &collection.features[0];
        assert_eq!(first.property("kind"), Some(&json!("nearest")));
        assert_eq!(first.property("dash-array"), Some(&json!("10, 10")));
        assert_eq!(
            first.geometry.as_ref().map(|g| &g.value),
            Some(&geojson::Value::LineString(vec![vec![8.0, 58.0], vec![8.0, 58.01]]))
        );
        assert!(collection.foreign_members.as_ref().unwrap().contains_key("map"));
    }

    #[test]
    fn pulse_oscillates_between_bounds() {
        let mut pulse = PulseMarker::new();
        let mut seen_min = f64::MAX;
        let mut seen_max = f64::MIN;
        for _ in 0..100 {
            pulse.tick();
            seen_min = seen_min.min(pulse.radius);
            seen_max = seen_max.max(pulse.radius);
        }
        assert_eq!(seen_min, PulseMarker::MIN_RADIUS);
        assert_eq!(seen_max, PulseMarker::MAX_RADIUS);
    }

    #[test]
    fn readout_mentions_facility_and_distance() {
        let catalog = DatasetCatalog::builtin();
        let nearest = NearestFacility {
            facility: FacilityPoint::new(FacilityId::Num(1), "Lund brannstasjon", LatLng::new(58.01, 8.0)),
            distance_m: 450.0,
            measured: DistanceMode::Road,
            route: None,
            duration_s: Some(60.0),
        };
        let status = StatusReadout::new(catalog.get("brannstasjoner").unwrap(), &nearest);
        assert_eq!(status.color, "#10B981");
        assert_eq!(status.to_string(), "Nearest brannstasjoner: Lund brannstasjon [450 m, road]");
    }
}
