use ::geo::{BoundingRect, HaversineDistance, MultiPoint, Point, Rect};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;

// WGS84 ellipsoid, used by the EPSG:3395 projection.
const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// A geographic coordinate in degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Finite and inside the latitude/longitude ranges.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// `[lng, lat]`, the order GeoJSON and the directions API expect.
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self::new(pair[1], pair[0])
    }
}

impl From<LatLng> for Point<f64> {
    fn from(p: LatLng) -> Self {
        Point::new(p.lng, p.lat)
    }
}

impl From<Point<f64>> for LatLng {
    fn from(p: Point<f64>) -> Self {
        LatLng::new(p.y(), p.x())
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}

/// Great-circle distance in meters (haversine).
pub fn distance_m(a: LatLng, b: LatLng) -> f64 {
    Point::from(a).haversine_distance(&Point::from(b))
}

/// Whole meters below one kilometer, otherwise kilometers with one decimal.
pub fn format_distance(meters: f64) -> String {
    if meters >= 1000.0 {
        format!("{:.1} km", meters / 1000.0)
    } else {
        format!("{} m", meters.round() as i64)
    }
}

/// Color band of the distance badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBand {
    Near,
    Moderate,
    Far,
    VeryFar,
}

impl DistanceBand {
    /// Color shown when there is no nearest facility yet.
    pub const NEUTRAL_COLOR: &'static str = "#6B7280";

    /// Meter bands apply below one kilometer, kilometer bands above it,
    /// matching the unit the readout is displayed in.
    pub fn classify(meters: f64) -> Self {
        if meters >= 1000.0 {
            let km = meters / 1000.0;
            if km >= 10.0 {
                DistanceBand::VeryFar
            } else if km >= 5.0 {
                DistanceBand::Far
            } else if km >= 2.0 {
                DistanceBand::Moderate
            } else {
                DistanceBand::Near
            }
        } else if meters >= 500.0 {
            DistanceBand::Moderate
        } else {
            DistanceBand::Near
        }
    }

    pub fn color(self) -> &'static str {
        match self {
            DistanceBand::Near => "#10B981",
            DistanceBand::Moderate => "#FBBF24",
            DistanceBand::Far => "#F97316",
            DistanceBand::VeryFar => "#EF4444",
        }
    }
}

/// Axis-aligned geographic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: LatLng,
    pub north_east: LatLng,
}

impl Bounds {
    pub fn new(south_west: LatLng, north_east: LatLng) -> Self {
        Self {
            south_west,
            north_east,
        }
    }

    /// Smallest bounds holding every valid coordinate, `None` when there is none.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = LatLng>,
    {
        let points: MultiPoint<f64> = points
            .into_iter()
            .filter(LatLng::is_valid)
            .map(Point::from)
            .collect();
        points.bounding_rect().map(Bounds::from)
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }

    pub fn contains(&self, p: LatLng) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&p.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&p.lng)
    }

    pub fn clamp(&self, p: LatLng) -> LatLng {
        LatLng::new(
            p.lat.clamp(self.south_west.lat, self.north_east.lat),
            p.lng.clamp(self.south_west.lng, self.north_east.lng),
        )
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Bounds::new(
            LatLng::new(rect.min().y, rect.min().x),
            LatLng::new(rect.max().y, rect.max().x),
        )
    }
}

fn eccentricity() -> f64 {
    (WGS84_F * (2.0 - WGS84_F)).sqrt()
}

/// Geographic → World Mercator (EPSG:3395) meters, `[x, y]`.
pub fn to_world_mercator(p: LatLng) -> [f64; 2] {
    let e = eccentricity();
    let phi = p.lat.to_radians();
    let con = e * phi.sin();
    let ts = (FRAC_PI_4 + phi / 2.0).tan() * ((1.0 - con) / (1.0 + con)).powf(e / 2.0);
    [WGS84_A * p.lng.to_radians(), WGS84_A * ts.ln()]
}

/// World Mercator (EPSG:3395) meters → geographic.
pub fn from_world_mercator(xy: [f64; 2]) -> LatLng {
    let e = eccentricity();
    let ts = (-xy[1] / WGS84_A).exp();
    let mut phi = FRAC_PI_2 - 2.0 * ts.atan();
    for _ in 0..15 {
        let con = e * phi.sin();
        let next = FRAC_PI_2 - 2.0 * (ts * ((1.0 - con) / (1.0 + con)).powf(e / 2.0)).atan();
        let delta = (next - phi).abs();
        phi = next;
        if delta < 1e-12 {
            break;
        }
    }
    LatLng::new(phi.to_degrees(), (xy[0] / WGS84_A).to_degrees())
}
