pub mod cache;
pub mod error;
pub mod provider;
pub mod route;
pub mod service;

pub use cache::{RouteCache, RouteKey};
pub use error::RoutingError;
pub use provider::{HybridOrsProvider, LocalOrsProvider, RemoteOrsProvider};
pub use route::{RoutePreference, RouteSummary};
pub use service::RoutingProvider;

use crate::sdk::config::OrsConfig;
use crate::sdk::util::rate_limit::ors_limiter;

/// Builds the directions provider a configuration asks for.
pub fn provider_from_config(config: &OrsConfig) -> Result<Box<dyn RoutingProvider>, RoutingError> {
    Ok(match config {
        OrsConfig::Remote { api_key } => Box::new(RemoteOrsProvider::new(api_key.clone(), ors_limiter())?),
        OrsConfig::Local { base_url } => Box::new(LocalOrsProvider::new(base_url.clone())?),
        OrsConfig::Hybrid {
            api_key,
            local_base_url,
        } => Box::new(HybridOrsProvider::new(
            Box::new(LocalOrsProvider::new(local_base_url.clone())?),
            Box::new(RemoteOrsProvider::new(api_key.clone(), ors_limiter())?),
        )),
    })
}
