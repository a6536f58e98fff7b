use crate::sdk::geo::LatLng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Routing preference sent with each directions request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePreference {
    #[default]
    Fastest,
    Shortest,
    Recommended,
}

impl RoutePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutePreference::Fastest => "fastest",
            RoutePreference::Shortest => "shortest",
            RoutePreference::Recommended => "recommended",
        }
    }
}

impl fmt::Display for RoutePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutePreference {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fastest" => Ok(RoutePreference::Fastest),
            "shortest" => Ok(RoutePreference::Shortest),
            "recommended" => Ok(RoutePreference::Recommended),
            other => Err(format!("unknown route preference: {other}")),
        }
    }
}

/// A driving route: trip length, travel time and the path to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Vec<LatLng>,
}

impl RouteSummary {
    /// Zero-length route for identical start and end.
    pub fn stationary(at: LatLng) -> Self {
        Self {
            distance_m: 0.0,
            duration_s: 0.0,
            geometry: vec![at],
        }
    }
}
