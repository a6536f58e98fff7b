use super::types::{directions_body, parse_directions, DIRECTIONS_PATH};
use crate::sdk::geo::LatLng;
use crate::sdk::routing::error::RoutingError;
use crate::sdk::routing::route::{RoutePreference, RouteSummary};
use crate::sdk::routing::service::RoutingProvider;
use crate::sdk::util::rate_limit::{wait_for_permit, Limiter};
use reqwest::blocking::Client;
use std::time::Duration;

pub const ORS_BASE_URL: &str = "https://api.openrouteservice.org";

/// The hosted openrouteservice API.
pub struct RemoteOrsProvider {
    client: Client,
    api_key: String,
    base_url: String,
    limiter: Limiter,
}

impl RemoteOrsProvider {
    pub fn new(api_key: String, limiter: Limiter) -> Result<Self, RoutingError> {
        Self::with_base_url(api_key, limiter, ORS_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, limiter: Limiter, base_url: String) -> Result<Self, RoutingError> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(15)).build()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
        })
    }
}

impl RoutingProvider for RemoteOrsProvider {
    fn name(&self) -> &'static str {
        "remote"
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

        wait_for_permit(&self.limiter);
        log::debug!("[PROVIDER] Calling remote get_directions for {} -> {}", start, end);
        let url = format!("{}{}", self.base_url, DIRECTIONS_PATH);
        let body = directions_body(start, end, preference);

        let response = match self
            .client
            .post(&url)
            .header("Authorization", &self.api_key)
            .json(&body)
            .send()
        {
            Ok(resp) => resp,
            Err(e) => {
                log::error!("Failed to send POST request. URL: {}\nBody: {}\nError: {}", url, body, e);
                return Err(e.into());
            }
        };

        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            log::error!("Directions API returned {} for {} -> {}", status, start, end);
            return Err(RoutingError::from_response(status.as_u16(), text));
        }

        parse_directions(&text).map_err(|e| {
            log::error!("Failed to parse directions response. URL: {}\nError: {}. Body: {}", url, e, text);
            e
        })
    }
}
