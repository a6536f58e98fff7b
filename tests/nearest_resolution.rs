use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use beredskap::sdk::nearest::{resolve, RoadOptions};
use beredskap::sdk::routing::RoutingError;
use beredskap::{
    resolve_air, resolve_road, DistanceMode, FacilityId, FacilityPoint, LatLng, RouteCache, RoutePreference,
    RouteSummary, RoutingProvider,
};

/// Answers with fixed road distances per destination and counts requests.
#[derive(Default)]
struct FakeRouter {
    distances: HashMap<String, f64>,
    calls: AtomicUsize,
    seen: Mutex<Vec<LatLng>>,
}

impl FakeRouter {
    fn with(mut self, destination: LatLng, distance_m: f64) -> Self {
        self.distances.insert(destination.to_string(), distance_m);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RoutingProvider for FakeRouter {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn get_directions(
        &self,
        start: LatLng,
        end: LatLng,
        _preference: RoutePreference,
    ) -> Result<RouteSummary, RoutingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(end);
        match self.distances.get(&end.to_string()) {
            Some(&distance_m) => Ok(RouteSummary {
                distance_m,
                duration_s: distance_m / 10.0,
                geometry: vec![start, end],
            }),
            None => Err(RoutingError::UnroutablePoint(format!("no road near {end}"))),
        }
    }
}

fn station(id: i64, lat: f64, lng: f64) -> FacilityPoint {
    FacilityPoint::new(FacilityId::Num(id), format!("Brannstasjon {id}"), LatLng::new(lat, lng))
}

fn user() -> LatLng {
    LatLng::new(58.1599, 8.0182)
}

#[test]
fn road_distance_can_pick_a_facility_further_by_air() {
    let near_by_air = station(1, 58.165, 8.02);
    let near_by_road = station(2, 58.15, 8.0);
    let router = FakeRouter::default()
        .with(near_by_air.position, 9_000.0)
        .with(near_by_road.position, 2_500.0);
    let mut cache = RouteCache::default();
    let facilities = vec![near_by_air.clone(), near_by_road];

    let air = resolve_air(user(), &facilities).unwrap();
    assert_eq!(air.facility.id, FacilityId::Num(1));

    let road = resolve_road(user(), &facilities, Some(&router), &mut cache, RoadOptions::default()).unwrap();
    assert_eq!(road.facility.id, FacilityId::Num(2));
    assert_eq!(road.measured, DistanceMode::Road);
    assert_eq!(road.distance_m, 2_500.0);
    assert_eq!(road.duration_s, Some(250.0));
    assert_eq!(road.route.as_ref().map(Vec::len), Some(2));
}

#[test]
fn facilities_beyond_prefilter_radius_are_never_routed() {
    let close = station(1, 58.17, 8.03);
    // Oslo, ~250 km away
    let far = station(2, 59.91, 10.75);
    let router = FakeRouter::default()
        .with(close.position, 1_800.0)
        .with(far.position, 100.0);
    let mut cache = RouteCache::default();

    let nearest = resolve_road(user(), &[far.clone(), close], Some(&router), &mut cache, RoadOptions::default())
        .unwrap();

    assert_eq!(nearest.facility.id, FacilityId::Num(1));
    assert_eq!(router.calls(), 1);
    assert!(!router.seen.lock().unwrap().contains(&far.position));
}

#[test]
fn nothing_inside_prefilter_falls_back_to_air() {
    let facilities = vec![station(1, 59.91, 10.75), station(2, 60.39, 5.32)];
    let router = FakeRouter::default();
    let mut cache = RouteCache::default();

    let nearest = resolve_road(user(), &facilities, Some(&router), &mut cache, RoadOptions::default()).unwrap();

    assert_eq!(router.calls(), 0);
    assert_eq!(nearest.measured, DistanceMode::Air);
    assert_eq!(nearest, resolve_air(user(), &facilities).unwrap());
}

#[test]
fn failed_requests_are_skipped() {
    let unroutable = station(1, 58.16, 8.019);
    let routable = station(2, 58.17, 8.05);
    let router = FakeRouter::default().with(routable.position, 4_200.0);
    let mut cache = RouteCache::default();

    let nearest = resolve_road(
        user(),
        &[unroutable, routable],
        Some(&router),
        &mut cache,
        RoadOptions::default(),
    )
    .unwrap();

    assert_eq!(nearest.facility.id, FacilityId::Num(2));
    assert_eq!(nearest.measured, DistanceMode::Road);
    assert_eq!(router.calls(), 2);
    assert_eq!(cache.len(), 1);
}

#[test]
fn all_requests_failing_falls_back_to_air() {
    let facilities = vec![station(1, 58.16, 8.019), station(2, 58.17, 8.05)];
    let router = FakeRouter::default();
    let mut cache = RouteCache::default();

    let nearest = resolve_road(user(), &facilities, Some(&router), &mut cache, RoadOptions::default()).unwrap();

    assert_eq!(nearest.measured, DistanceMode::Air);
    assert_eq!(nearest.facility.id, FacilityId::Num(1));
    assert!(nearest.route.is_none());
}

#[test]
fn cached_routes_are_not_requested_again() {
    let facilities = vec![station(1, 58.16, 8.019), station(2, 58.17, 8.05)];
    let router = FakeRouter::default()
        .with(facilities[0].position, 700.0)
        .with(facilities[1].position, 3_100.0);
    let mut cache = RouteCache::default();

    let first = resolve_road(user(), &facilities, Some(&router), &mut cache, RoadOptions::default()).unwrap();
    assert_eq!(router.calls(), 2);

    let second = resolve_road(user(), &facilities, Some(&router), &mut cache, RoadOptions::default()).unwrap();
    assert_eq!(router.calls(), 2);
    assert_eq!(first, second);

    // Another preference is another cache entry.
    let options = RoadOptions {
        preference: RoutePreference::Shortest,
        ..RoadOptions::default()
    };
    resolve_road(user(), &facilities, Some(&router), &mut cache, options).unwrap();
    assert_eq!(router.calls(), 4);
}

#[test]
fn equal_road_distances_go_to_lowest_id() {
    let a = station(7, 58.16, 8.019);
    let b = station(3, 58.17, 8.05);
    let router = FakeRouter::default().with(a.position, 1_000.0).with(b.position, 1_000.0);

    for facilities in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
        let mut cache = RouteCache::default();
        let nearest = resolve_road(user(), &facilities, Some(&router), &mut cache, RoadOptions::default()).unwrap();
        assert_eq!(nearest.facility.id, FacilityId::Num(3));
    }
}

/// Every destination is routable; road distance is twice the air distance.
struct DetourRouter;

impl RoutingProvider for DetourRouter {
    fn name(&self) -> &'static str {
        "detour"
    }

    fn get_directions(
        &self,
        start: LatLng,
        end: LatLng,
        _preference: RoutePreference,
    ) -> Result<RouteSummary, RoutingError> {
        let distance_m = 2.0 * beredskap::distance_m(start, end);
        Ok(RouteSummary {
            distance_m,
            duration_s: distance_m / 14.0,
            geometry: vec![start, end],
        })
    }
}

#[test]
fn route_cache_stays_bounded_while_moving() {
    let facilities: Vec<_> = (0..20)
        .map(|i| station(i, 58.10 + 0.005 * i as f64, 8.0 + 0.003 * i as f64))
        .collect();
    let mut cache = RouteCache::with_capacity(500);

    // 100 fixes about 11 m apart
    for step in 0..100 {
        let here = LatLng::new(58.1599 + 0.0001 * step as f64, 8.0182);
        let nearest = resolve_road(here, &facilities, Some(&DetourRouter), &mut cache, RoadOptions::default());
        assert_eq!(nearest.unwrap().measured, DistanceMode::Road);
    }

    assert_eq!(cache.len(), 500);
}

#[test]
fn resolve_dispatches_on_mode() {
    let facilities = vec![station(1, 58.165, 8.02), station(2, 58.15, 8.0)];
    let router = FakeRouter::default()
        .with(facilities[0].position, 9_000.0)
        .with(facilities[1].position, 2_500.0);
    let mut cache = RouteCache::default();

    let air = resolve(DistanceMode::Air, user(), &facilities, Some(&router), &mut cache, RoadOptions::default());
    assert_eq!(router.calls(), 0);
    assert_eq!(air.unwrap().facility.id, FacilityId::Num(1));

    let road = resolve(DistanceMode::Road, user(), &facilities, Some(&router), &mut cache, RoadOptions::default());
    assert_eq!(road.unwrap().facility.id, FacilityId::Num(2));
}
