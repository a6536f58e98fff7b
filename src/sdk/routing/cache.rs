use super::route::{RoutePreference, RouteSummary};
use crate::sdk::geo::LatLng;
use lru::LruCache;
use serde::{Deserialize, Serialize, Serializer};
use std::{fmt, fs, io::Result as IoResult, num::NonZeroUsize, path::Path, str::FromStr};

/// Directional cache key. Coordinates are rounded to five decimals (about a
/// meter) so GPS jitter below that still hits the cache.
#[derive(Serialize, Deserialize, Eq, PartialEq, Hash, Clone, Debug)]
pub struct RouteKey {
    pub origin: String,
    pub destination: String,
    pub preference: RoutePreference,
}

impl RouteKey {
    pub fn new(origin: LatLng, destination: LatLng, preference: RoutePreference) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            preference,
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.origin, self.destination, self.preference)
    }
}

impl FromStr for RouteKey {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split("::").collect();
        if parts.len() == 3 {
            Ok(RouteKey {
                origin: parts[0].to_string(),
                destination: parts[1].to_string(),
                preference: parts[2].parse().map_err(|_| "Invalid route preference")?,
            })
        } else {
            Err("Invalid RouteKey format")
        }
    }
}

/// Routes kept when no capacity is given.
pub const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 2_000;

// --- On-disk form: entries from least to most recently used ---
#[derive(Serialize)]
struct CachedRoute<'a> {
    key: String,
    route: &'a RouteSummary,
}

#[derive(Deserialize)]
struct StoredRoute {
    key: String,
    route: RouteSummary,
}

/// Route summaries and geometries keyed by origin/destination, evicting the
/// least recently used route once full.
#[derive(Debug)]
pub struct RouteCache {
    routes: LruCache<RouteKey, RouteSummary>,
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ROUTE_CACHE_CAPACITY)
    }
}

impl Serialize for RouteCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.routes.iter().rev().map(|(key, route)| CachedRoute {
            key: key.to_string(),
            route,
        }))
    }
}

impl RouteCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            routes: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        let mut cache = Self::default();
        if !path.as_ref().exists() {
            return Ok(cache);
        }
        let data = fs::read_to_string(path)?;
        let stored: Vec<StoredRoute> = serde_json::from_str(&data)?;
        for entry in stored {
            match RouteKey::from_str(&entry.key) {
                Ok(key) => cache.insert_route(key, entry.route),
                Err(e) => log::warn!("Dropping cached route '{}': {}", entry.key, e),
            }
        }
        Ok(cache)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> IoResult<()> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)
    }

    /// Looks a route up and marks it as recently used.
    pub fn get_route(&mut self, key: &RouteKey) -> Option<&RouteSummary> {
        self.routes.get(key)
    }

    pub fn insert_route(&mut self, key: RouteKey, summary: RouteSummary) {
        self.routes.put(key, summary);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.routes.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rounds_nearby_positions_together() {
        let a = RouteKey::new(LatLng::new(58.159901, 8.018201), LatLng::new(58.14, 8.0), RoutePreference::Fastest);
        let b = RouteKey::new(LatLng::new(58.159899, 8.018199), LatLng::new(58.14, 8.0), RoutePreference::Fastest);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "58.15990,8.01820::58.14000,8.00000::fastest");
        assert_eq!(a.to_string().parse::<RouteKey>().unwrap(), a);
    }

    #[test]
    fn persists_routes_to_disk() {
        let path = std::env::temp_dir().join(format!("beredskap-routes-{}.json", std::process::id()));
        let key = RouteKey::new(LatLng::new(58.0, 8.0), LatLng::new(58.1, 8.1), RoutePreference::Shortest);
        let route = RouteSummary {
            distance_m: 14_200.0,
            duration_s: 900.0,
            geometry: vec![LatLng::new(58.0, 8.0), LatLng::new(58.1, 8.1)],
        };

        let mut cache = RouteCache::default();
        cache.insert_route(key.clone(), route.clone());
        cache.save_to_file(&path).unwrap();

        let mut loaded = RouteCache::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.get_route(&key), Some(&route));
    }

    fn route_to(lat: f64) -> (RouteKey, RouteSummary) {
        let from = LatLng::new(58.0, 8.0);
        let to = LatLng::new(lat, 8.0);
        let route = RouteSummary {
            distance_m: (lat - 58.0) * 111_000.0,
            duration_s: 60.0,
            geometry: vec![from, to],
        };
        (RouteKey::new(from, to, RoutePreference::Fastest), route)
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut cache = RouteCache::with_capacity(2);
        let (k1, r1) = route_to(58.1);
        let (k2, r2) = route_to(58.2);
        let (k3, r3) = route_to(58.3);

        cache.insert_route(k1.clone(), r1);
        cache.insert_route(k2.clone(), r2);
        assert!(cache.get_route(&k1).is_some());
        cache.insert_route(k3.clone(), r3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.capacity(), 2);
        assert!(cache.get_route(&k2).is_none());
        assert!(cache.get_route(&k1).is_some());
        assert!(cache.get_route(&k3).is_some());
    }

    #[test]
    fn saved_oldest_first() {
        let mut cache = RouteCache::with_capacity(3);
        let (k1, r1) = route_to(58.1);
        let (k2, r2) = route_to(58.2);
        cache.insert_route(k1.clone(), r1);
        cache.insert_route(k2.clone(), r2);
        cache.get_route(&k1);

        let saved = serde_json::to_value(&cache).unwrap();
        let keys: Vec<_> = saved
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["key"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys, vec![k2.to_string(), k1.to_string()]);
    }

    #[test]
    fn missing_file_gives_empty_cache() {
        let cache = RouteCache::load_from_file("/nonexistent/beredskap/cache.json").unwrap();
        assert!(cache.is_empty());
    }
}
