pub mod sdk;

pub use sdk::config::{get_ors_api_key, OrsConfig, SupabaseConfig};
pub use sdk::datasets::{DatasetCatalog, DatasetConfig};
pub use sdk::facilities::{DatasetRecord, DatasetSource, FacilityId, FacilityPoint, SupabaseClient};
pub use sdk::geo::{distance_m, format_distance, DistanceBand, LatLng};
pub use sdk::nearest::{resolve_air, resolve_road, within_radius, DistanceMode, NearestFacility};
pub use sdk::routing::{RouteCache, RoutePreference, RouteSummary, RoutingProvider};
pub use sdk::session::Session;
