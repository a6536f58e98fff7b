// Dataset fetching from the hosted geodata backend (PostgREST-style RPC).
use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::config::SupabaseConfig;
use super::datasets::DatasetConfig;
use super::geo::LatLng;

pub const UNKNOWN_NAME: &str = "Ukjent";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to geodata backend failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Geodata backend returned {status} for table {table}: {message}")]
    Backend {
        table: String,
        status: u16,
        message: String,
    },

    #[error("Unexpected response from geodata backend: {0}")]
    Shape(String),

    #[error("Failed to parse backend response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Row identifier as the backend returns it.
///
/// Numeric ids order before textual ones; the ordering is what breaks ties
/// between equally distant facilities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(untagged)]
pub enum FacilityId {
    Num(i64),
    Text(String),
}

impl FacilityId {
    /// Stand-in for a row without a usable id. Textual, so it never collides
    /// with a numeric backend id.
    fn row(index: usize) -> Self {
        FacilityId::Text(format!("row-{index}"))
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(FacilityId::Num),
            Value::String(s) => {
                let s = s.trim();
                Some(match s.parse::<i64>() {
                    Ok(n) => FacilityId::Num(n),
                    Err(_) => FacilityId::Text(s.to_string()),
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FacilityId::Num(n) => write!(f, "{n}"),
            FacilityId::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(LatLng),
    LineString(Vec<LatLng>),
}

/// One row of a dataset, point or line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRecord {
    pub id: FacilityId,
    pub name: String,
    pub address: Option<String>,
    pub geometry: Geometry,
}

impl DatasetRecord {
    /// The facility view of this record, `None` for line features.
    pub fn as_facility(&self) -> Option<FacilityPoint> {
        match self.geometry {
            Geometry::Point(position) => Some(FacilityPoint {
                id: self.id.clone(),
                name: self.name.clone(),
                address: self.address.clone(),
                position,
            }),
            Geometry::LineString(_) => None,
        }
    }
}

/// A civil-defense point of interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacilityPoint {
    pub id: FacilityId,
    pub name: String,
    pub address: Option<String>,
    pub position: LatLng,
}

impl FacilityPoint {
    pub fn new(id: FacilityId, name: impl Into<String>, position: LatLng) -> Self {
        Self {
            id,
            name: name.into(),
            address: None,
            position,
        }
    }
}

/// Point facilities of a record list, in order.
pub fn facility_points(records: &[DatasetRecord]) -> Vec<FacilityPoint> {
    records.iter().filter_map(DatasetRecord::as_facility).collect()
}

/// Anything that can hand out the rows of a backend table.
pub trait DatasetSource {
    fn fetch(&self, dataset: &DatasetConfig) -> Result<Vec<DatasetRecord>, FetchError>;

    /// Cheap reachability check against one table.
    fn ping(&self, _table: &str) -> Result<(), FetchError> {
        Ok(())
    }
}

fn number_field(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn lat_lng(position: &[f64]) -> Option<LatLng> {
    match position {
        [lng, lat, ..] => {
            let p = LatLng::new(*lat, *lng);
            p.is_valid().then_some(p)
        }
        _ => None,
    }
}

fn parse_geometry(value: &Value) -> Option<Geometry> {
    let geometry = match value {
        // PostGIS ST_AsGeoJSON hands geometry back as text.
        Value::String(text) => serde_json::from_str::<geojson::Geometry>(text),
        other => serde_json::from_value::<geojson::Geometry>(other.clone()),
    }
    .map_err(|e| log::debug!("Unreadable geometry: {}", e))
    .ok()?;

    match geometry.value {
        geojson::Value::Point(position) => lat_lng(&position).map(Geometry::Point),
        geojson::Value::LineString(positions) => {
            let line: Option<Vec<LatLng>> = positions.iter().map(|p| lat_lng(p)).collect();
            line.filter(|l| l.len() >= 2).map(Geometry::LineString)
        }
        _ => None,
    }
}

fn text_field(row: &Value, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Converts one backend row. Rows without usable coordinates yield `None`.
pub fn parse_row(row: &Value, index: usize, dataset: &DatasetConfig) -> Option<DatasetRecord> {
    let flat = match (row.get("lat"), row.get("lng")) {
        (Some(lat), Some(lng)) => number_field(lat)
            .zip(number_field(lng))
            .map(|(lat, lng)| LatLng::new(lat, lng))
            .filter(LatLng::is_valid)
            .map(Geometry::Point),
        _ => None,
    };
    let geometry = flat.or_else(|| row.get("geometry").and_then(parse_geometry))?;

    let id = match row.get("id") {
        Some(raw) => FacilityId::from_value(raw).unwrap_or_else(|| {
            log::debug!("Row {} of {} has unusable id {}", index, dataset.table, raw);
            FacilityId::row(index)
        }),
        None => FacilityId::row(index),
    };

    let name = text_field(row, "name")
        .or_else(|| text_field(row, &dataset.name_column))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());

    let address = text_field(row, "adresse").or_else(|| text_field(row, "address"));

    Some(DatasetRecord {
        id,
        name,
        address,
        geometry,
    })
}

/// Converts a whole RPC result, skipping unusable rows.
pub fn parse_rows(body: &Value, dataset: &DatasetConfig) -> Result<Vec<DatasetRecord>, FetchError> {
    let rows = match body {
        Value::Array(rows) => rows,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(FetchError::Shape(format!(
                "expected an array of rows, got {}",
                other
            )))
        }
    };

    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        match parse_row(row, index, dataset) {
            Some(record) => records.push(record),
            None => log::debug!(
                "Skipping row {} of {}: missing or invalid coordinates",
                index,
                dataset.table
            ),
        }
    }
    Ok(records)
}

/// Client for the hosted geodata backend.
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &SupabaseConfig) -> Result<Self, FetchError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(20)).build()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
        })
    }

    fn rpc_url(&self, function: &str) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url, function)
    }

    fn check(&self, table: &str, response: reqwest::blocking::Response) -> Result<String, FetchError> {
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(text);
            return Err(FetchError::Backend {
                table: table.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(text)
    }
}

impl DatasetSource for SupabaseClient {
    /// One-row select used to verify connectivity and credentials.
    fn ping(&self, table: &str) -> Result<(), FetchError> {
        let url = format!("{}/rest/v1/{}?select=*&limit=1", self.base_url, table);
        log::debug!("Probing geodata backend with table {}", table);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .send()?;
        self.check(table, response).map(|_| ())
    }

    fn fetch(&self, dataset: &DatasetConfig) -> Result<Vec<DatasetRecord>, FetchError> {
        log::info!("Fetching points from {}...", dataset.table);
        let response = self
            .client
            .post(self.rpc_url("get_points"))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .json(&json!({ "table_name": dataset.table }))
            .send()?;

        let text = self.check(&dataset.table, response)?;
        let body: Value = serde_json::from_str(&text)?;
        let records = parse_rows(&body, dataset)?;
        log::info!("Fetched {} usable rows from {}", records.len(), dataset.table);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::datasets::DatasetCatalog;

    fn fire_stations() -> DatasetConfig {
        DatasetCatalog::builtin().get("brannstasjoner").unwrap().clone()
    }

    #[test]
    fn parses_flat_and_string_coordinates() {
        let body = json!([
            { "id": 1, "name": "Kristiansand brannstasjon", "lat": 58.15, "lng": 8.0 },
            { "id": "2", "name": "Vennesla", "lat": "58.27", "lng": "7.97" },
        ]);
        let records = parse_rows(&body, &fire_stations()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id, FacilityId::Num(2));
        assert_eq!(records[1].geometry, Geometry::Point(LatLng::new(58.27, 7.97)));
    }

    #[test]
    fn skips_rows_with_bad_coordinates() {
        let body = json!([
            { "id": 1, "name": "A", "lat": "abc", "lng": 8.0 },
            { "id": 2, "name": "B" },
            { "id": 3, "name": "C", "lat": null, "lng": 8.0 },
            { "id": 4, "name": "D", "lat": 95.0, "lng": 8.0 },
            { "id": 5, "name": "E", "lat": 58.0, "lng": 8.0 },
        ]);
        let records = parse_rows(&body, &fire_stations()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, FacilityId::Num(5));
    }

    #[test]
    fn parses_nested_geometry() {
        let body = json!([
            { "id": 7, "brannstasjon": "Søgne", "geometry": { "type": "Point", "coordinates": [7.79, 58.09] } },
            { "id": 8, "geometry": "{\"type\":\"LineString\",\"coordinates\":[[8.0,58.1],[8.1,58.2]]}" },
        ]);
        let records = parse_rows(&body, &fire_stations()).unwrap();
        assert_eq!(records[0].name, "Søgne");
        assert_eq!(records[0].geometry, Geometry::Point(LatLng::new(58.09, 7.79)));
        assert_eq!(records[1].name, UNKNOWN_NAME);
        assert!(matches!(records[1].geometry, Geometry::LineString(ref l) if l.len() == 2));
        assert_eq!(facility_points(&records).len(), 1);
    }

    #[test]
    fn rows_without_usable_id_get_row_label() {
        let body = json!([
            { "id": 1, "name": "A", "lat": 58.0, "lng": 8.0 },
            { "name": "B", "lat": 58.1, "lng": 8.1 },
            { "id": 2.5, "name": "C", "lat": 58.2, "lng": 8.2 },
            { "id": 1e20, "name": "D", "lat": 58.3, "lng": 8.3 },
        ]);
        let records = parse_rows(&body, &fire_stations()).unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                FacilityId::Num(1),
                FacilityId::Text("row-1".into()),
                FacilityId::Text("row-2".into()),
                FacilityId::Text("row-3".into()),
            ]
        );
        assert!(records[0].id < records[1].id);
    }

    #[test]
    fn unreadable_geometry_is_skipped() {
        let body = json!([
            { "id": 1, "geometry": "not json" },
            { "id": 2, "geometry": { "type": "Polygon", "coordinates": [[[8.0, 58.0], [8.1, 58.0], [8.1, 58.1], [8.0, 58.0]]] } },
            { "id": 3, "geometry": { "type": "Point", "coordinates": [8.0] } },
        ]);
        assert!(parse_rows(&body, &fire_stations()).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_array_body() {
        let err = parse_rows(&json!({ "message": "nope" }), &fire_stations()).unwrap_err();
        assert!(matches!(err, FetchError::Shape(_)));
        assert!(parse_rows(&Value::Null, &fire_stations()).unwrap().is_empty());
    }

    #[test]
    fn ids_order_numbers_before_text() {
        assert!(FacilityId::Num(10) < FacilityId::Num(11));
        assert!(FacilityId::Num(999) < FacilityId::Text("a".into()));
        assert_eq!(FacilityId::from_value(&json!(" 42 ")), Some(FacilityId::Num(42)));
    }
}
