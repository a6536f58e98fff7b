use serde::Deserialize;
use serde_json::{json, Value};

use crate::sdk::geo::LatLng;
use crate::sdk::routing::error::RoutingError;
use crate::sdk::routing::route::{RoutePreference, RouteSummary};

pub const DIRECTIONS_PATH: &str = "/v2/directions/driving-car/geojson";

// --- Data Structures for parsing ORS GeoJSON directions responses ---

#[derive(Deserialize)]
pub struct DirectionsResponse {
    pub features: Vec<RouteFeature>,
}
#[derive(Deserialize)]
pub struct RouteFeature {
    pub properties: RouteProperties,
    pub geometry: RouteGeometry,
}
#[derive(Deserialize)]
pub struct RouteProperties {
    pub summary: DirectionsSummary,
}
// ORS leaves out zero-valued fields.
#[derive(Deserialize, Clone, Copy, Default)]
pub struct DirectionsSummary {
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub duration: f64,
}
#[derive(Deserialize)]
pub struct RouteGeometry {
    pub coordinates: Vec<[f64; 2]>,
}

pub fn directions_body(start: LatLng, end: LatLng, preference: RoutePreference) -> Value {
    json!({
        "coordinates": [start.to_lng_lat(), end.to_lng_lat()],
        "preference": preference.as_str(),
    })
}

/// Reads the first route of a successful directions response.
pub fn parse_directions(text: &str) -> Result<RouteSummary, RoutingError> {
    let response: DirectionsResponse = serde_json::from_str(text)?;
    let feature = response.features.into_iter().next().ok_or(RoutingError::NoRoute)?;
    Ok(RouteSummary {
        distance_m: feature.properties.summary.distance,
        duration_s: feature.properties.summary.duration,
        geometry: feature
            .geometry
            .coordinates
            .into_iter()
            .map(LatLng::from_lng_lat)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_uses_lng_lat_order() {
        let body = directions_body(LatLng::new(58.1, 8.0), LatLng::new(58.2, 8.1), RoutePreference::Shortest);
        assert_eq!(body["coordinates"][0][0], 8.0);
        assert_eq!(body["coordinates"][0][1], 58.1);
        assert_eq!(body["preference"], "shortest");
    }

    #[test]
    fn parses_geojson_route() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "summary": { "distance": 2345.6, "duration": 301.2 } },
                "geometry": { "type": "LineString", "coordinates": [[8.0, 58.1], [8.05, 58.15], [8.1, 58.2]] }
            }]
        }"#;
        let route = parse_directions(text).unwrap();
        assert_eq!(route.distance_m, 2345.6);
        assert_eq!(route.geometry.len(), 3);
        assert_eq!(route.geometry[2], LatLng::new(58.2, 8.1));
    }

    #[test]
    fn empty_feature_list_is_no_route() {
        let err = parse_directions(r#"{"type":"FeatureCollection","features":[]}"#).unwrap_err();
        assert!(matches!(err, RoutingError::NoRoute));
    }

    #[test]
    fn missing_summary_fields_default_to_zero() {
        let text = r#"{"features":[{"properties":{"summary":{}},"geometry":{"coordinates":[[8.0,58.1]]}}]}"#;
        let route = parse_directions(text).unwrap();
        assert_eq!(route.distance_m, 0.0);
    }
}
