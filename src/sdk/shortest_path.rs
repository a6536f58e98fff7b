// Client for the local shortest-path service and the geometry helpers its
// answers need: WKT parsing, EPSG:3395 reprojection, snapping to a network.
use std::time::Duration;

use geo::{Closest, ClosestPoint, LineString, Point};
use geojson::FeatureCollection;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::geo::{distance_m, from_world_mercator, to_world_mercator, LatLng};

/// CRS tag sent with request points.
pub const REQUEST_CRS: &str = "EPSG:4326";

#[derive(Error, Debug)]
pub enum WktError {
    #[error("Unsupported WKT type: {0}. Only LineString is supported.")]
    Unsupported(String),

    #[error("Malformed WKT: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum ShortestPathError {
    #[error("Error connecting to shortest-path service: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Shortest-path service returned an unreadable body: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Shortest-path service reported an error: {0}")]
    Service(String),

    #[error(transparent)]
    Wkt(#[from] WktError),

    #[error("No closest point found on any line segment")]
    NoSnapTarget,
}

/// Parses a WKT `LineString` into `[x, y]` pairs in the source CRS.
pub fn parse_wkt_linestring(wkt: &str) -> Result<Vec<[f64; 2]>, WktError> {
    let wkt = wkt.trim();
    let open = wkt
        .find('(')
        .ok_or_else(|| WktError::Malformed(wkt.to_string()))?;
    let kind = wkt[..open].trim();
    if !kind.eq_ignore_ascii_case("LineString") {
        return Err(WktError::Unsupported(kind.to_string()));
    }
    let body = wkt[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| WktError::Malformed(wkt.to_string()))?;

    let points = body
        .split(',')
        .map(|pair| {
            let mut parts = pair.split_whitespace().map(str::parse::<f64>);
            match (parts.next(), parts.next()) {
                (Some(Ok(x)), Some(Ok(y))) if x.is_finite() && y.is_finite() => Ok([x, y]),
                _ => Err(WktError::Malformed(format!("bad coordinate '{}'", pair.trim()))),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if points.len() < 2 {
        return Err(WktError::Malformed("LineString needs at least two points".into()));
    }
    Ok(points)
}

/// Parses a World Mercator `LineString` and reprojects it to lat/lng.
pub fn wkt_to_path(wkt: &str) -> Result<Vec<LatLng>, WktError> {
    Ok(parse_wkt_linestring(wkt)?
        .into_iter()
        .map(from_world_mercator)
        .collect())
}

/// Closest point to `point` on any line of a network given in World
/// Mercator coordinates. Lines with fewer than two coordinates are skipped.
pub fn snap_to_network(point: LatLng, lines: &[Vec<[f64; 2]>]) -> Result<LatLng, ShortestPathError> {
    let [x, y] = to_world_mercator(point);
    let target = Point::new(x, y);
    let mut best: Option<(LatLng, f64)> = None;

    for line in lines {
        if line.len() < 2 {
            log::warn!("Skipping network line with {} coordinates", line.len());
            continue;
        }
        let line: LineString<f64> = line.iter().map(|&[x, y]| (x, y)).collect();
        let snapped = match line.closest_point(&target) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => from_world_mercator([p.x(), p.y()]),
            Closest::Indeterminate => continue,
        };
        let d = distance_m(point, snapped);
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((snapped, d));
        }
    }

    best.map(|(p, _)| p).ok_or(ShortestPathError::NoSnapTarget)
}

/// `LineString` coordinates of a GeoJSON feature collection, as sent to the
/// service in `line_data`. Other geometries are ignored.
pub fn network_lines(line_data: &FeatureCollection) -> Vec<Vec<[f64; 2]>> {
    line_data
        .features
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .filter_map(|g| match &g.value {
            geojson::Value::LineString(coords) => Some(
                coords
                    .iter()
                    .filter(|c| c.len() >= 2)
                    .map(|c| [c[0], c[1]])
                    .collect(),
            ),
            _ => None,
        })
        .collect()
}

#[derive(Serialize)]
struct ShortestPathRequest<'a> {
    start_point: LatLng,
    end_point: LatLng,
    crs: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    line_data: Option<&'a FeatureCollection>,
}

#[derive(Deserialize)]
struct ShortestPathResponse {
    success: bool,
    #[serde(default)]
    features: Vec<PathFeature>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct PathFeature {
    geometry: String,
    #[serde(default)]
    attributes: Vec<Value>,
}

/// One path returned by the service, already in geographic coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ShortestPath {
    pub path: Vec<LatLng>,
    pub attributes: Vec<Value>,
}

impl ShortestPath {
    pub fn length_m(&self) -> f64 {
        self.path.windows(2).map(|w| distance_m(w[0], w[1])).sum()
    }
}

/// Turns a service response body into paths. A feature whose WKT cannot be
/// read is logged and left out.
pub fn parse_response(text: &str) -> Result<Vec<ShortestPath>, ShortestPathError> {
    let response: ShortestPathResponse = serde_json::from_str(text)?;
    if !response.success {
        return Err(ShortestPathError::Service(
            response.error.unwrap_or_else(|| "unknown error".to_string()),
        ));
    }

    Ok(response
        .features
        .into_iter()
        .filter_map(|feature| match wkt_to_path(&feature.geometry) {
            Ok(path) => Some(ShortestPath {
                path,
                attributes: feature.attributes,
            }),
            Err(e) => {
                log::error!("Error visualizing shortest path: {}", e);
                None
            }
        })
        .collect())
}

pub struct ShortestPathClient {
    client: Client,
    base_url: String,
}

impl ShortestPathClient {
    pub fn new(base_url: &str) -> Result<Self, ShortestPathError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(60)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Asks the service for the shortest path between two points, optionally
    /// over a caller-supplied GeoJSON line network.
    pub fn shortest_path(
        &self,
        start: LatLng,
        end: LatLng,
        line_data: Option<&FeatureCollection>,
    ) -> Result<Vec<ShortestPath>, ShortestPathError> {
        let url = format!("{}/shortestpath", self.base_url);
        let request = ShortestPathRequest {
            start_point: start,
            end_point: end,
            crs: REQUEST_CRS,
            line_data,
        };

        log::info!("Requesting shortest path {} -> {}", start, end);
        let text = self.client.post(&url).json(&request).send()?.text()?;
        let paths = parse_response(&text)?;
        log::info!("Shortest path result: {} feature(s)", paths.len());
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn parses_qgis_style_linestring() {
        let coords = parse_wkt_linestring("LineString (892572.1 7953050.5, 892600 7953100)").unwrap();
        assert_eq!(coords, vec![[892572.1, 7953050.5], [892600.0, 7953100.0]]);
        assert!(parse_wkt_linestring("LINESTRING(0 0,1 1)").is_ok());
    }

    #[test]
    fn rejects_other_geometries() {
        assert!(matches!(
            parse_wkt_linestring("Point (1 2)"),
            Err(WktError::Unsupported(kind)) if kind == "Point"
        ));
        assert!(matches!(parse_wkt_linestring("LineString (1 2)"), Err(WktError::Malformed(_))));
        assert!(matches!(parse_wkt_linestring("LineString (1 x, 2 3)"), Err(WktError::Malformed(_))));
    }

    #[test]
    fn reprojects_world_mercator_path() {
        let start = LatLng::new(58.1599, 8.0182);
        let end = LatLng::new(58.1467, 7.9956);
        let [x1, y1] = to_world_mercator(start);
        let [x2, y2] = to_world_mercator(end);
        let wkt = format!("LineString ({x1} {y1}, {x2} {y2})");

        let path = wkt_to_path(&wkt).unwrap();
        assert_abs_diff_eq!(path[0].lat, start.lat, epsilon = 1e-7);
        assert_abs_diff_eq!(path[1].lng, end.lng, epsilon = 1e-7);
    }

    #[test]
    fn service_failure_carries_message() {
        let err = parse_response(r#"{"success": false, "error": "'line_data'"}"#).unwrap_err();
        assert!(matches!(err, ShortestPathError::Service(msg) if msg == "'line_data'"));
    }

    #[test]
    fn skips_unreadable_features() {
        let body = r#"{"success": true, "features": [
            {"geometry": "LineString (0 0, 111319.49 0)", "attributes": [1]},
            {"geometry": "Polygon ((0 0, 1 1, 1 0, 0 0))", "attributes": []}
        ]}"#;
        let paths = parse_response(body).unwrap();
        assert_eq!(paths.len(), 1);
        assert_abs_diff_eq!(paths[0].path[1].lng, 1.0, epsilon = 1e-6);
        assert!(paths[0].length_m() > 111_000.0);
    }

    #[test]
    fn extracts_network_lines() {
        let data: FeatureCollection = serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": { "type": "LineString", "coordinates": [[0.0, 0.0], [10.0, 5.0]] }, "properties": { "id": 1 } },
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [1.0, 1.0] }, "properties": { "id": 2 } },
            ]
        }))
        .unwrap();
        assert_eq!(network_lines(&data), vec![vec![[0.0, 0.0], [10.0, 5.0]]]);
        assert!(network_lines(&FeatureCollection { bbox: None, features: Vec::new(), foreign_members: None }).is_empty());
    }

    #[test]
    fn snaps_to_closest_segment() {
        let a = to_world_mercator(LatLng::new(58.0, 8.0));
        let b = to_world_mercator(LatLng::new(58.0, 8.1));
        let far = vec![to_world_mercator(LatLng::new(59.0, 8.0)), to_world_mercator(LatLng::new(59.0, 8.1))];
        let lines = vec![vec![a], far, vec![a, b]];

        let snapped = snap_to_network(LatLng::new(58.001, 8.05), &lines).unwrap();
        assert_abs_diff_eq!(snapped.lat, 58.0, epsilon = 1e-6);
        assert_abs_diff_eq!(snapped.lng, 8.05, epsilon = 1e-6);

        assert!(matches!(
            snap_to_network(LatLng::new(58.0, 8.0), &[vec![a]]),
            Err(ShortestPathError::NoSnapTarget)
        ));
    }
}
