// Owned state of one analysis session: which dataset is shown, where the
// user is, and what the nearest facility currently is.
use std::path::Path;

use geojson::FeatureCollection;

use super::datasets::{DatasetCatalog, DatasetConfig};
use super::facilities::{facility_points, DatasetRecord, DatasetSource, FacilityPoint};
use super::geo::LatLng;
use super::geolocation::PositionFix;
use super::map::{BaseLayer, MapSurface};
use super::nearest::{resolve, within_radius, DistanceMode, NearestFacility, RankedFacility, RoadOptions};
use super::render::{Scene, StatusReadout};
use super::routing::{RouteCache, RoutePreference, RoutingProvider};

/// Viewport used when fitting the map to a dataset.
const VIEWPORT_PX: (f64, f64) = (1280.0, 800.0);

pub struct Session {
    catalog: DatasetCatalog,
    source: Box<dyn DatasetSource>,
    router: Option<Box<dyn RoutingProvider>>,
    cache: RouteCache,
    map: MapSurface,
    scene: Scene,
    selected: Option<DatasetConfig>,
    records: Vec<DatasetRecord>,
    facilities: Vec<FacilityPoint>,
    user: Option<LatLng>,
    mode: DistanceMode,
    road: RoadOptions,
    nearest: Option<NearestFacility>,
    banner: Option<String>,
}

impl Session {
    pub fn new(catalog: DatasetCatalog, source: Box<dyn DatasetSource>) -> Self {
        Self {
            catalog,
            source,
            router: None,
            cache: RouteCache::default(),
            map: MapSurface::default(),
            scene: Scene::default(),
            selected: None,
            records: Vec::new(),
            facilities: Vec::new(),
            user: None,
            mode: DistanceMode::Air,
            road: RoadOptions::default(),
            nearest: None,
            banner: None,
        }
    }

    pub fn with_router(mut self, router: Option<Box<dyn RoutingProvider>>) -> Self {
        self.router = router;
        self
    }

    pub fn with_cache(mut self, cache: RouteCache) -> Self {
        self.cache = cache;
        self
    }

    /// Pings the backend with the first catalog table. A failure goes to the
    /// banner; datasets can still be selected afterwards.
    pub fn check_connection(&mut self) -> bool {
        let Some(table) = self.catalog.iter().next().map(|d| d.table.clone()) else {
            return true;
        };
        match self.source.ping(&table) {
            Ok(()) => {
                log::info!("Geodata backend reachable");
                true
            }
            Err(e) => {
                log::error!("Geodata backend connection test failed: {}", e);
                self.banner = Some(format!("Could not connect to the geodata backend: {}", e));
                false
            }
        }
    }

    /// Switches to another dataset: fetch, redraw, recompute.
    ///
    /// A failed fetch leaves the dataset empty and sets the banner.
    pub fn select_dataset(&mut self, key: &str) {
        self.banner = None;
        self.nearest = None;
        self.scene.clear_dataset_overlays();

        let dataset = match self.catalog.require(key) {
            Ok(dataset) => dataset.clone(),
            Err(e) => {
                log::error!("{}", e);
                self.banner = Some(e.to_string());
                self.selected = None;
                self.records.clear();
                self.facilities.clear();
                return;
            }
        };

        self.records = match self.source.fetch(&dataset) {
            Ok(records) => records,
            Err(e) => {
                log::error!("Could not fetch data from {}: {}", dataset.table, e);
                self.banner = Some(format!("Could not fetch data from {}: {}", dataset.table, e));
                Vec::new()
            }
        };
        self.facilities = facility_points(&self.records);
        self.scene.draw_records(&self.records, &dataset);
        if let Some(bounds) = self.scene.dataset_bounds() {
            self.map.fit_bounds(&bounds, VIEWPORT_PX.0, VIEWPORT_PX.1);
        }
        self.selected = Some(dataset);
        self.recompute();
    }

    /// Handles one geolocation callback.
    pub fn update_position(&mut self, fix: &PositionFix) {
        if !fix.position.is_valid() {
            log::error!("Invalid GPS coordinates received: {:?}", fix.position);
            return;
        }
        self.user = Some(fix.position);
        self.scene.set_user_position(fix.position);
        self.recompute();
    }

    pub fn set_mode(&mut self, mode: DistanceMode) {
        if self.mode != mode {
            self.mode = mode;
            self.recompute();
        }
    }

    pub fn set_preference(&mut self, preference: RoutePreference) {
        if self.road.preference != preference {
            self.road.preference = preference;
            if self.mode == DistanceMode::Road {
                self.recompute();
            }
        }
    }

    pub fn set_base_layer(&mut self, layer: BaseLayer) {
        if self.map.set_base_layer(layer) {
            log::debug!("Base layer switched to {:?}", layer);
        }
    }

    /// Advances the pulse around the user marker by one step.
    pub fn tick_pulse(&mut self) {
        self.scene.tick_pulse();
    }

    /// Re-resolves the nearest facility from the current dataset, position
    /// and mode, and redraws the connecting line.
    pub fn recompute(&mut self) {
        self.scene.clear_nearest();
        self.nearest = None;

        let (Some(user), Some(dataset)) = (self.user, self.selected.as_ref()) else {
            return;
        };

        self.nearest = resolve(
            self.mode,
            user,
            &self.facilities,
            self.router.as_deref(),
            &mut self.cache,
            self.road,
        );

        match &self.nearest {
            Some(nearest) => {
                self.scene.draw_nearest(user, nearest, &dataset.color);
                log::info!(
                    "Nearest {}: {} ({})",
                    dataset.title.to_lowercase(),
                    nearest.facility.name,
                    nearest.formatted_distance()
                );
            }
            None => log::debug!("No nearest facility for {}", dataset.key),
        }
    }

    /// Facilities of the current dataset within `radius_m` of `center`.
    pub fn search_radius(&self, center: LatLng, radius_m: f64) -> Vec<RankedFacility> {
        within_radius(center, &self.facilities, radius_m)
    }

    pub fn status(&self) -> Option<StatusReadout> {
        match (&self.selected, &self.nearest) {
            (Some(dataset), Some(nearest)) => Some(StatusReadout::new(dataset, nearest)),
            _ => None,
        }
    }

    pub fn save_cache<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        self.cache.save_to_file(path)
    }

    pub fn export_geojson(&self) -> FeatureCollection {
        self.scene.to_geojson(&self.map, self.status().as_ref())
    }

    pub fn point_count(&self) -> usize {
        self.scene.markers.len()
    }

    pub fn nearest(&self) -> Option<&NearestFacility> {
        self.nearest.as_ref()
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn selected(&self) -> Option<&DatasetConfig> {
        self.selected.as_ref()
    }

    pub fn records(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn facilities(&self) -> &[FacilityPoint] {
        &self.facilities
    }

    pub fn user_position(&self) -> Option<LatLng> {
        self.user
    }

    pub fn mode(&self) -> DistanceMode {
        self.mode
    }

    pub fn map(&self) -> &MapSurface {
        &self.map
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

}
