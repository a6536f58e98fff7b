use super::types::{directions_body, parse_directions, DIRECTIONS_PATH};
use crate::sdk::geo::LatLng;
use crate::sdk::routing::error::RoutingError;
use crate::sdk::routing::route::{RoutePreference, RouteSummary};
use crate::sdk::routing::service::RoutingProvider;
use reqwest::blocking::Client;
use std::time::Duration;

/// A self-hosted openrouteservice instance. No key, no rate limit.
pub struct LocalOrsProvider {
    client: Client,
    base_url: String,
}

impl LocalOrsProvider {
    pub fn new(base_url: String) -> Result<Self, RoutingError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl RoutingProvider for LocalOrsProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn get_directions(
        &self,
        start: LatLng,
        end: LatLng,
        preference: RoutePreference,
    ) -> Result<RouteSummary, RoutingError> {
        if start == end {
            return Ok(RouteSummary::stationary(start));
        }

        log::debug!("[PROVIDER] Calling local get_directions for {} -> {}", start, end);
        let url = format!("{}{}", self.base_url, DIRECTIONS_PATH);
        let body = directions_body(start, end, preference);

        let response = match self.client.post(&url).json(&body).send() {
            Ok(resp) => resp,
            Err(e) => {
                log::error!("Failed to send POST request to local ORS. URL: {}\nError: {}", url, e);
                return Err(e.into());
            }
        };

        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            return Err(RoutingError::from_response(status.as_u16(), text));
        }

        parse_directions(&text).map_err(|e| {
            log::error!("Failed to parse local directions response. URL: {}\nError: {}. Body: {}", url, e, text);
            e
        })
    }
}
