use std::env;
use thiserror::Error;

pub const DEFAULT_SHORTEST_PATH_URL: &str = "http://127.0.0.1:5000";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable {0} (also checked VITE_{0})")]
    Missing(&'static str),
}

/// Reads `name`, falling back to the `VITE_`-prefixed variant the web
/// frontend's `.env` files use.
fn var(name: &str) -> Option<String> {
    env::var(name)
        .or_else(|_| env::var(format!("VITE_{name}")))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get_ors_api_key() -> Option<String> {
    var("ORS_API_KEY")
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

impl SupabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: var("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?,
            anon_key: var("SUPABASE_ANON_KEY").ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?,
        })
    }
}

/// Where road distances come from.
#[derive(Debug, Clone, PartialEq)]
pub enum OrsConfig {
    Remote { api_key: String },
    Local { base_url: String },
    /// Self-hosted instance first, hosted API when it fails.
    Hybrid { api_key: String, local_base_url: String },
}

impl OrsConfig {
    /// `None` when neither an API key nor a local instance is configured;
    /// road distances are then unavailable.
    pub fn from_env() -> Option<Self> {
        Self::from_parts(get_ors_api_key(), var("ORS_LOCAL_URL"))
    }

    pub fn from_parts(api_key: Option<String>, local_base_url: Option<String>) -> Option<Self> {
        match (api_key, local_base_url) {
            (Some(api_key), Some(local_base_url)) => Some(OrsConfig::Hybrid {
                api_key,
                local_base_url,
            }),
            (Some(api_key), None) => Some(OrsConfig::Remote { api_key }),
            (None, Some(base_url)) => Some(OrsConfig::Local { base_url }),
            (None, None) => None,
        }
    }
}

pub fn shortest_path_url() -> String {
    var("SHORTEST_PATH_URL").unwrap_or_else(|| DEFAULT_SHORTEST_PATH_URL.to_string())
}
