use crate::sdk::geo::LatLng;
use crate::sdk::routing::error::RoutingError;
use crate::sdk::routing::route::{RoutePreference, RouteSummary};
use crate::sdk::routing::service::RoutingProvider;

/// Asks the primary provider first and the fallback when that fails.
pub struct HybridOrsProvider {
    primary: Box<dyn RoutingProvider>,
    fallback: Box<dyn RoutingProvider>,
}

impl HybridOrsProvider {
    pub fn new(primary: Box<dyn RoutingProvider>, fallback: Box<dyn RoutingProvider>) -> Self {
        Self { primary, fallback }
    }
}

impl RoutingProvider for HybridOrsProvider {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn get_directions(
        &self,
        start: LatLng,
        end: LatLng,
        preference: RoutePreference,
    ) -> Result<RouteSummary, RoutingError> {
        match self.primary.get_directions(start, end, preference) {
            Ok(route) => Ok(route),
            // An unroutable point stays unroutable on the other instance.
            Err(e @ RoutingError::UnroutablePoint(_)) => Err(e),
            Err(e) => {
                log::warn!(
                    "[Hybrid Provider] {} failed ({}), using {}",
                    self.primary.name(),
                    e,
                    self.fallback.name()
                );
                self.fallback.get_directions(start, end, preference)
            }
        }
    }
}
