pub mod config;
pub mod datasets;
pub mod facilities;
pub mod geo;
pub mod geolocation;
pub mod map;
pub mod nearest;
pub mod render;
pub mod routing;
pub mod session;
pub mod shortest_path;
pub mod util;
