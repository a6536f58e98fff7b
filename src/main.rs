use anyhow::{bail, Context, Result};
use beredskap::sdk::{
    config::{self, OrsConfig, SupabaseConfig},
    datasets::DatasetCatalog,
    facilities::SupabaseClient,
    geo::{format_distance, LatLng},
    geolocation::{watch_position, PositionFix, TraceSource, WatchOptions},
    map::{BaseLayer, MapSurface},
    nearest::{DistanceMode, DEFAULT_SEARCH_RADIUS_M, MAX_SEARCH_RADIUS_M, MIN_SEARCH_RADIUS_M},
    render::{Polyline, Scene},
    routing::{provider_from_config, RouteCache, RoutePreference},
    session::Session,
    shortest_path::{network_lines, snap_to_network, ShortestPathClient},
    util::log::init_logging,
};
use clap::{Parser, Subcommand};
use geojson::FeatureCollection;
use std::{fs, path::PathBuf, time::Duration};

/// Find the nearest fire station, hospital, police station or shelter
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// [Optional] CSV file replacing the built-in dataset catalog
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Road route cache file
    #[arg(long, global = true, default_value = "route_cache.json")]
    cache: PathBuf,

    /// Base map layer recorded in exported GeoJSON (osm or aerial)
    #[arg(long, global = true, default_value = "osm")]
    layer: BaseLayer,

    /// [Optional] Write the resulting map overlays to this GeoJSON file
    #[arg(long, global = true)]
    geojson: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the selectable datasets
    Datasets,

    /// Fetch a dataset and list its points
    Fetch {
        /// Dataset key (e.g. "brannstasjoner")
        dataset: String,
    },

    /// Find the facility nearest to a position
    Nearest {
        dataset: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Distance mode: air or road
        #[arg(long, default_value = "air")]
        mode: DistanceMode,
        /// Routing preference for road mode
        #[arg(long, default_value = "fastest")]
        preference: RoutePreference,
    },

    /// List facilities within a search radius of a position
    Within {
        dataset: String,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
        /// Search radius in meters (100-5000)
        #[arg(long, default_value_t = DEFAULT_SEARCH_RADIUS_M)]
        radius: f64,
    },

    /// Follow a recorded GPS track and report the nearest facility on each fix
    Watch {
        dataset: String,
        /// File of `lat,lng[,rfc3339]` lines
        #[arg(long)]
        trace: PathBuf,
        #[arg(long, default_value = "air")]
        mode: DistanceMode,
        #[arg(long, default_value = "fastest")]
        preference: RoutePreference,
        /// Delay between fixes in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Ask the shortest-path service for a path between two points
    ShortestPath {
        /// Start as "lat,lng"
        #[arg(long, value_parser = parse_lat_lng)]
        from: LatLng,
        /// End as "lat,lng"
        #[arg(long, value_parser = parse_lat_lng)]
        to: LatLng,
        /// [Optional] GeoJSON line network (EPSG:3395) to route over
        #[arg(long)]
        lines: Option<PathBuf>,
    },
}

fn parse_lat_lng(raw: &str) -> Result<LatLng, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got \"{raw}\""))?;
    let p = LatLng::new(
        lat.trim().parse().map_err(|e| format!("bad latitude: {e}"))?,
        lng.trim().parse().map_err(|e| format!("bad longitude: {e}"))?,
    );
    if !p.is_valid() {
        return Err(format!("coordinate out of range: {raw}"));
    }
    Ok(p)
}

fn load_catalog(cli: &Cli) -> Result<DatasetCatalog> {
    match &cli.catalog {
        Some(path) => DatasetCatalog::from_csv(path)
            .with_context(|| format!("Failed to load catalog {}", path.display())),
        None => Ok(DatasetCatalog::builtin()),
    }
}

fn open_session(cli: &Cli, with_router: bool) -> Result<Session> {
    let catalog = load_catalog(cli)?;
    let supabase = SupabaseConfig::from_env().context("Geodata backend is not configured")?;
    let source = SupabaseClient::new(&supabase)?;

    let router = if with_router {
        match OrsConfig::from_env() {
            Some(ors) => Some(provider_from_config(&ors)?),
            None => {
                log::warn!("ORS_API_KEY is not set; road distance falls back to air distance");
                None
            }
        }
    } else {
        None
    };

    let cache = RouteCache::load_from_file(&cli.cache)
        .with_context(|| format!("Failed to read route cache {}", cli.cache.display()))?;

    let mut session = Session::new(catalog, Box::new(source))
        .with_router(router)
        .with_cache(cache);
    session.set_base_layer(cli.layer);
    if !session.check_connection() {
        if let Some(banner) = session.banner() {
            eprintln!("! {banner}");
        }
    }
    Ok(session)
}

fn write_geojson(cli: &Cli, collection: &FeatureCollection) -> Result<()> {
    if let Some(path) = &cli.geojson {
        fs::write(path, serde_json::to_string_pretty(collection)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Map overlays written to {}", path.display());
    }
    Ok(())
}

fn print_status(session: &Session) {
    match session.status() {
        Some(status) => println!("{status}"),
        None => println!("No nearest facility found"),
    }
    if let Some(banner) = session.banner() {
        eprintln!("! {banner}");
    }
}

fn select(session: &mut Session, dataset: &str) -> Result<()> {
    session.select_dataset(dataset);
    if session.selected().is_none() {
        bail!(session.banner().unwrap_or("Unknown dataset").to_string());
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Datasets => {
            for dataset in load_catalog(&cli)?.iter() {
                println!("{:<16} {} {} (table {})", dataset.key, dataset.icon, dataset.title, dataset.table);
            }
        }

        Command::Fetch { dataset } => {
            let mut session = open_session(&cli, false)?;
            select(&mut session, dataset)?;
            for record in session.records() {
                println!("{:>6}  {}", record.id.to_string(), record.name);
            }
            println!("Showing {} points", session.point_count());
            if let Some(banner) = session.banner() {
                eprintln!("! {banner}");
            }
            write_geojson(&cli, &session.export_geojson())?;
        }

        Command::Nearest {
            dataset,
            lat,
            lng,
            mode,
            preference,
        } => {
            let fix = PositionFix::now(*lat, *lng)?;
            let mut session = open_session(&cli, *mode == DistanceMode::Road)?;
            session.set_mode(*mode);
            session.set_preference(*preference);
            session.update_position(&fix);
            select(&mut session, dataset)?;

            print_status(&session);
            if let Some(minutes) = session.nearest().and_then(|n| n.duration_s).map(|s| s / 60.0) {
                println!("Driving time: {minutes:.0} min");
            }
            session.save_cache(&cli.cache)?;
            write_geojson(&cli, &session.export_geojson())?;
        }

        Command::Within {
            dataset,
            lat,
            lng,
            radius,
        } => {
            let center = LatLng::new(*lat, *lng);
            if !center.is_valid() {
                bail!("Invalid position {lat},{lng}");
            }
            let radius = radius.clamp(MIN_SEARCH_RADIUS_M, MAX_SEARCH_RADIUS_M);
            let mut session = open_session(&cli, false)?;
            select(&mut session, dataset)?;

            let hits = session.search_radius(center, radius);
            println!("{} within {}:", hits.len(), format_distance(radius));
            for hit in hits {
                println!("{:>10}  {}", format_distance(hit.distance_m), hit.facility.name);
            }
            write_geojson(&cli, &session.export_geojson())?;
        }

        Command::Watch {
            dataset,
            trace,
            mode,
            preference,
            interval_ms,
        } => {
            let source = TraceSource::open(trace)
                .with_context(|| format!("Failed to open trace {}", trace.display()))?;
            let mut session = open_session(&cli, *mode == DistanceMode::Road)?;
            session.set_mode(*mode);
            session.set_preference(*preference);
            select(&mut session, dataset)?;

            let handle = watch_position(source, WatchOptions::default(), Duration::from_millis(*interval_ms));
            while let Some(update) = handle.recv() {
                match update {
                    Ok(fix) => {
                        session.update_position(&fix);
                        session.tick_pulse();
                        print!("{}  ", fix.position);
                        print_status(&session);
                    }
                    Err(e) => {
                        log::warn!("Could not get GPS position: {}", e);
                        session.tick_pulse();
                    }
                }
            }
            handle.clear();

            session.save_cache(&cli.cache)?;
            write_geojson(&cli, &session.export_geojson())?;
        }

        Command::ShortestPath { from, to, lines } => {
            let line_data = match lines {
                Some(path) => {
                    let text = fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let collection: FeatureCollection = serde_json::from_str(&text)
                        .with_context(|| format!("{} is not a GeoJSON FeatureCollection", path.display()))?;
                    Some(collection)
                }
                None => None,
            };

            let (start, end) = match &line_data {
                Some(data) => {
                    let network = network_lines(data);
                    (snap_to_network(*from, &network)?, snap_to_network(*to, &network)?)
                }
                None => (*from, *to),
            };

            let client = ShortestPathClient::new(&config::shortest_path_url())?;
            let paths = client.shortest_path(start, end, line_data.as_ref())?;

            let mut scene = Scene::default();
            for path in &paths {
                println!("Path of {} points, {}", path.path.len(), format_distance(path.length_m()));
                scene.add_line(Polyline {
                    path: path.path.clone(),
                    color: "red".to_string(),
                    weight: 5,
                    opacity: 1.0,
                    dash_array: None,
                    popup: None,
                });
            }

            let mut map = MapSurface::default();
            map.set_base_layer(cli.layer);
            if let Some(bounds) = scene.dataset_bounds() {
                map.fit_bounds(&bounds, 1280.0, 800.0);
            }
            write_geojson(&cli, &scene.to_geojson(&map, None))?;
        }
    }

    Ok(())
}
