use super::error::RoutingError;
use super::route::{RouteSummary, RoutePreference};
use crate::sdk::geo::LatLng;

pub trait RoutingProvider: Send + Sync {
    /// Short label used in log lines.
    fn name(&self) -> &'static str;

    /// Gets a driving route between two points.
    fn get_directions(
        &self,
        start: LatLng,
        end: LatLng,
        preference: RoutePreference,
    ) -> Result<RouteSummary, RoutingError>;
}
