//! Nearest-facility resolution.
//!
//! Air distance is a haversine scan over every valid facility. Road distance
//! asks a [`RoutingProvider`] for a driving route to each facility within
//! [`ROAD_PREFILTER_RADIUS_M`] of the user and keeps the shortest trip,
//! dropping back to air distance whenever no route can be had.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::facilities::{FacilityId, FacilityPoint};
use super::geo::{distance_m, format_distance, DistanceBand, LatLng};
use super::routing::{RouteCache, RouteKey, RoutePreference, RouteSummary, RoutingProvider};

/// Facilities further than this in a straight line are never routed.
pub const ROAD_PREFILTER_RADIUS_M: f64 = 20_000.0;

/// Radius-search slider range and default, in meters.
pub const MIN_SEARCH_RADIUS_M: f64 = 100.0;
pub const MAX_SEARCH_RADIUS_M: f64 = 5_000.0;
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    #[default]
    Air,
    Road,
}

impl fmt::Display for DistanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DistanceMode::Air => "air",
            DistanceMode::Road => "road",
        })
    }
}

impl FromStr for DistanceMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "air" | "luft" => Ok(DistanceMode::Air),
            "road" | "vei" => Ok(DistanceMode::Road),
            other => Err(format!("unknown distance mode: {other}")),
        }
    }
}

/// The resolved closest facility.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestFacility {
    pub facility: FacilityPoint,
    pub distance_m: f64,
    /// How `distance_m` was measured. `Air` after a road-mode fallback.
    pub measured: DistanceMode,
    /// Driving path from the user, road mode only.
    pub route: Option<Vec<LatLng>>,
    pub duration_s: Option<f64>,
}

impl NearestFacility {
    pub fn band(&self) -> DistanceBand {
        DistanceBand::classify(self.distance_m)
    }

    pub fn formatted_distance(&self) -> String {
        format_distance(self.distance_m)
    }
}

/// A facility together with its straight-line distance from the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedFacility {
    pub facility: FacilityPoint,
    pub distance_m: f64,
}

/// Orders by distance, equal distances by the lower id.
fn closer(a_dist: f64, a_id: &FacilityId, b_dist: f64, b_id: &FacilityId) -> bool {
    match a_dist.partial_cmp(&b_dist) {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) => a_id < b_id,
        _ => false,
    }
}

/// Valid facilities with their air distance, in input order.
fn with_air_distances(user: LatLng, facilities: &[FacilityPoint]) -> Vec<RankedFacility> {
    facilities
        .iter()
        .filter(|f| {
            let ok = f.position.is_valid();
            if !ok {
                log::debug!("Skipping facility {} with invalid position", f.id);
            }
            ok
        })
        .map(|f| RankedFacility {
            facility: f.clone(),
            distance_m: distance_m(user, f.position),
        })
        .collect()
}

/// Closest facility by straight-line distance.
pub fn resolve_air(user: LatLng, facilities: &[FacilityPoint]) -> Option<NearestFacility> {
    if !user.is_valid() {
        log::warn!("Cannot resolve nearest facility from invalid position {:?}", user);
        return None;
    }

    let mut best: Option<(&FacilityPoint, f64)> = None;
    for facility in facilities.iter().filter(|f| f.position.is_valid()) {
        let d = distance_m(user, facility.position);
        let better = match best {
            None => true,
            Some((current, current_d)) => closer(d, &facility.id, current_d, &current.id),
        };
        if better {
            best = Some((facility, d));
        }
    }

    best.map(|(facility, distance_m)| NearestFacility {
        facility: facility.clone(),
        distance_m,
        measured: DistanceMode::Air,
        route: None,
        duration_s: None,
    })
}

/// Facilities within `radius_m` of `center`, closest first.
pub fn within_radius(center: LatLng, facilities: &[FacilityPoint], radius_m: f64) -> Vec<RankedFacility> {
    if !center.is_valid() {
        return Vec::new();
    }
    let mut hits: Vec<RankedFacility> = with_air_distances(center, facilities)
        .into_iter()
        .filter(|r| r.distance_m <= radius_m)
        .collect();
    hits.sort_by(|a, b| {
        a.distance_m
            .partial_cmp(&b.distance_m)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.facility.id.cmp(&b.facility.id))
    });
    hits
}

/// Options for a road-distance resolution.
#[derive(Debug, Clone, Copy)]
pub struct RoadOptions {
    pub preference: RoutePreference,
    pub prefilter_radius_m: f64,
}

impl Default for RoadOptions {
    fn default() -> Self {
        Self {
            preference: RoutePreference::default(),
            prefilter_radius_m: ROAD_PREFILTER_RADIUS_M,
        }
    }
}

fn route_for(
    user: LatLng,
    facility: &FacilityPoint,
    provider: &dyn RoutingProvider,
    cache: &mut RouteCache,
    preference: RoutePreference,
) -> Option<RouteSummary> {
    let key = RouteKey::new(user, facility.position, preference);
    if let Some(route) = cache.get_route(&key) {
        log::debug!("[CACHE HIT] {} -> {}", user, facility.name);
        return Some(route.clone());
    }

    match provider.get_directions(user, facility.position, preference) {
        Ok(route) => {
            cache.insert_route(key, route.clone());
            Some(route)
        }
        Err(e) => {
            log::warn!("Road distance to {} ({}) failed: {}", facility.name, facility.id, e);
            None
        }
    }
}

/// Closest facility by driving distance, falling back to air distance.
///
/// Without a provider (no API credential configured), with no facility
/// inside the pre-filter radius, or when no directions request succeeds,
/// the result is the air-distance answer.
pub fn resolve_road(
    user: LatLng,
    facilities: &[FacilityPoint],
    provider: Option<&dyn RoutingProvider>,
    cache: &mut RouteCache,
    options: RoadOptions,
) -> Option<NearestFacility> {
    if !user.is_valid() {
        log::warn!("Cannot resolve nearest facility from invalid position {:?}", user);
        return None;
    }

    let Some(provider) = provider else {
        log::warn!("No directions API key configured; using air distance");
        return resolve_air(user, facilities);
    };

    let candidates: Vec<RankedFacility> = with_air_distances(user, facilities)
        .into_iter()
        .filter(|r| r.distance_m <= options.prefilter_radius_m)
        .collect();

    if candidates.is_empty() {
        log::info!(
            "No facility within {} of {}; using air distance",
            format_distance(options.prefilter_radius_m),
            user
        );
        return resolve_air(user, facilities);
    }

    log::debug!("Routing to {} candidate facilities via {}", candidates.len(), provider.name());

    let mut best: Option<(RankedFacility, RouteSummary)> = None;
    for candidate in candidates {
        let Some(route) = route_for(user, &candidate.facility, provider, cache, options.preference) else {
            continue;
        };
        let better = match &best {
            None => true,
            Some((current, current_route)) => closer(
                route.distance_m,
                &candidate.facility.id,
                current_route.distance_m,
                &current.facility.id,
            ),
        };
        if better {
            best = Some((candidate, route));
        }
    }

    match best {
        Some((candidate, route)) => Some(NearestFacility {
            facility: candidate.facility,
            distance_m: route.distance_m,
            measured: DistanceMode::Road,
            duration_s: Some(route.duration_s),
            route: Some(route.geometry),
        }),
        None => {
            log::warn!("No road route could be resolved; using air distance");
            resolve_air(user, facilities)
        }
    }
}

/// Resolves in the requested mode.
pub fn resolve(
    mode: DistanceMode,
    user: LatLng,
    facilities: &[FacilityPoint],
    provider: Option<&dyn RoutingProvider>,
    cache: &mut RouteCache,
    options: RoadOptions,
) -> Option<NearestFacility> {
    match mode {
        DistanceMode::Air => resolve_air(user, facilities),
        DistanceMode::Road => resolve_road(user, facilities, provider, cache, options),
    }
}
