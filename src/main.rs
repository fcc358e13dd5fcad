//! Heat map of how often cities show up in a CSV file
//!
//! City names are counted, geocoded through the Nominatim search API (see
//! <https://nominatim.org/release-docs/latest/api/Search/>) with a JSON file
//! acting as a cache, then drawn as an HTML map or a PNG/SVG image.

mod boundary;
mod cache;
mod config;
mod frequency;
mod geocode;
mod heat;
mod progress;
mod regions;
mod render;
mod resolve;

use crate::{
    cache::JsonFileStore, config::Config, geocode::NominatimGeocoder, progress::ProgressReport,
    render::MapStyle, resolve::Resolution,
};
use anyhow::Context;
use clap::Parser;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
};
use tokio::io::{AsyncWriteExt, BufWriter};

/// Draw a heat map of the cities listed in a CSV file
///
/// Every column of the input file but the last one is expected to contain
/// city names. Each name is counted, located on the map, and drawn with an
/// intensity that grows with its number of occurences.
#[derive(Parser, Debug)]
#[command(version, author)]
struct Args {
    /// CSV file listing city names
    ///
    /// The first row is a header and is ignored, and so is the last column.
    #[arg(short, long, default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Short name of the region that the cities belong to, e.g. "sp"
    ///
    /// Will interactively prompt for a supported region if not specified.
    #[arg(short, long, default_value = None)]
    region: Option<Box<str>>,

    /// Kind of map to produce
    #[arg(short, long, value_enum, default_value_t = MapStyle::Interactive)]
    style: MapStyle,

    /// Output file
    ///
    /// Defaults to "heatmap_<region>" with an extension that matches the
    /// selected map style.
    #[arg(short, long, default_value = None)]
    output: Option<PathBuf>,

    /// JSON file where geocoded coordinates are cached across runs
    #[arg(long, default_value = "city_coordinates.json")]
    cache: PathBuf,

    /// GeoJSON file holding the region's boundaries
    ///
    /// Only used by map styles that draw boundaries. If the file does not
    /// exist, the boundaries are downloaded and saved there.
    ///
    /// Defaults to "<region>_boundaries.geojson".
    #[arg(long, default_value = None)]
    boundary: Option<PathBuf>,

    /// URL of the Nominatim search endpoint used for geocoding
    #[arg(long, default_value = geocode::NOMINATIM_SEARCH_URL)]
    geocoder_url: Box<str>,

    /// Delay before each geocoding request, in milliseconds
    ///
    /// The public Nominatim instance allows at most one request per second,
    /// so think twice before lowering this.
    #[arg(long, default_value = "1000")]
    delay_ms: u64,

    /// Number of heat samples emitted per city occurence
    ///
    /// Each map style comes with its own default.
    #[arg(long, default_value = None)]
    points_per_count: Option<f64>,

    /// Number of most frequent cities to list once the input is counted
    #[arg(short, long, default_value = "10")]
    top: NonZeroUsize,
}
//
impl Args {
    /// Decode and validate CLI arguments
    pub fn parse_and_check() -> Result<Self> {
        let args = Args::parse();
        args.check()?;
        Ok(args)
    }

    /// Check CLI arguments for basic sanity
    fn check(&self) -> Result<()> {
        if let Some(points_per_count) = self.points_per_count {
            anyhow::ensure!(
                points_per_count.is_finite() && points_per_count > 0.0,
                "the number of heat samples per occurence must be a positive number"
            );
        }
        anyhow::ensure!(
            self.input.is_file(),
            "input file {} not found",
            self.input.display()
        );
        Ok(())
    }
}
//
#[tokio::main]
async fn main() -> Result<()> {
    // Set up logging
    if let Err(e) = setup_logging() {
        eprintln!("warning: cannot log to syslog ({e}), running without logs");
    }

    // Decode CLI arguments
    let args = Args::parse_and_check()?;

    // Pick a region
    let region = regions::pick(&args)?;
    let config = Config::new(args, region);

    // Count city occurences
    let frequencies = frequency::load(&config.input).await?;
    let mut summary = vec![
        format!("Unique cities: {}", frequencies.len()),
        "Most frequent cities:".to_owned(),
    ];
    for (city, count) in frequencies.most_common(config.top.get()) {
        summary.push(format!("  {city}: {count}"));
    }
    print_lines(summary).await?;

    // Locate the cities, with the help of the cache
    let report = ProgressReport::new();
    let client = reqwest::Client::builder()
        .user_agent(geocode::USER_AGENT)
        .build()
        .context("setting up the HTTP client")?;
    let geocoder = NominatimGeocoder::new(client.clone(), &config.geocoding);
    let store = JsonFileStore::new(&config.cache_file);
    let resolution =
        resolve::resolve_cities(&config.geocoding, &frequencies, &store, &geocoder, &report)
            .await?;
    anyhow::ensure!(
        !resolution.records.is_empty(),
        "none of the cities could be geocoded"
    );

    // Load the region's boundaries, if the map needs them
    let boundary = if config.style.needs_boundary() {
        Some(
            boundary::load_or_fetch(
                &config.region,
                &config.region.boundary_url(),
                &config.boundary_file,
                &client,
                &report,
            )
            .await?,
        )
    } else {
        None
    };

    // Draw the map
    render::render(&config, &resolution.records, boundary.as_ref())?;
    print_lines(run_summary(&config, &resolution)).await?;
    Ok(())
}

/// Use anyhow for Result type erasure
pub use anyhow::Result;

/// Input file name used when none is specified
const DEFAULT_INPUT: &str = "Regiões e cidades - Página1.csv";

/// Case-sensitive, trimmed city name
pub type CityName = Box<str>;

/// Number of occurences of a city in the input
pub type CityCount = NonZeroU64;

/// Addition operator for NonZeroU64
pub fn add_nz_u64(x: NonZeroU64, y: NonZeroU64) -> NonZeroU64 {
    x.checked_add(y.get())
        .expect("overflow while adding NonZeroU64s")
}

/// Geographic coordinates in decimal degrees
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Coordinates {
    /// Latitude, positive north of the equator
    pub lat: f64,

    /// Longitude, positive east of Greenwich
    pub lon: f64,
}

/// Latitude/longitude rectangle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoBounds {
    /// Southern edge
    pub lat_min: f64,

    /// Northern edge
    pub lat_max: f64,

    /// Western edge
    pub lon_min: f64,

    /// Eastern edge
    pub lon_max: f64,
}
//
impl GeoBounds {
    /// Smallest rectangle that contains all the given points, if any
    pub fn enclosing(points: impl IntoIterator<Item = Coordinates>) -> Option<Self> {
        points.into_iter().fold(None, |acc, Coordinates { lat, lon }| {
            Some(match acc {
                None => Self {
                    lat_min: lat,
                    lat_max: lat,
                    lon_min: lon,
                    lon_max: lon,
                },
                Some(bounds) => Self {
                    lat_min: bounds.lat_min.min(lat),
                    lat_max: bounds.lat_max.max(lat),
                    lon_min: bounds.lon_min.min(lon),
                    lon_max: bounds.lon_max.max(lon),
                },
            })
        })
    }

    /// Grow the rectangle by a fraction of its span on every side
    pub fn padded(&self, fraction: f64) -> Self {
        let lat_margin = self.lat_span() * fraction;
        let lon_margin = self.lon_span() * fraction;
        Self {
            lat_min: self.lat_min - lat_margin,
            lat_max: self.lat_max + lat_margin,
            lon_min: self.lon_min - lon_margin,
            lon_max: self.lon_max + lon_margin,
        }
    }

    /// Truth that a point lies within the rectangle
    pub fn contains(&self, point: Coordinates) -> bool {
        (self.lat_min..=self.lat_max).contains(&point.lat)
            && (self.lon_min..=self.lon_max).contains(&point.lon)
    }

    /// Smallest rectangle that contains both rectangles
    pub fn union(&self, other: &Self) -> Self {
        Self {
            lat_min: self.lat_min.min(other.lat_min),
            lat_max: self.lat_max.max(other.lat_max),
            lon_min: self.lon_min.min(other.lon_min),
            lon_max: self.lon_max.max(other.lon_max),
        }
    }

    /// North-south extent in degrees
    pub fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    /// East-west extent in degrees
    pub fn lon_span(&self) -> f64 {
        self.lon_max - self.lon_min
    }
}

/// Final report on a completed run
fn run_summary(config: &Config, resolution: &Resolution) -> Vec<String> {
    let outcomes = resolution.summary();
    vec![
        format!(
            "Geocoding: {} cached, {} resolved, {} not found, {} failed",
            outcomes.cached, outcomes.resolved, outcomes.not_found, outcomes.failed
        ),
        format!("Cities on the map: {}", resolution.records.len()),
        format!("Map saved as {}", config.output.display()),
    ]
}

/// Write some lines of text to stdout
async fn print_lines(lines: impl IntoIterator<Item = String>) -> Result<()> {
    let stdout = tokio::io::stdout();
    let mut stdout = BufWriter::new(stdout);
    for line in lines {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }
    stdout.flush().await?;
    Ok(())
}

/// Set up logging
fn setup_logging() -> syslog::Result<()> {
    syslog::init(
        syslog::Facility::LOG_USER,
        if cfg!(feature = "log-trace") {
            LevelFilter::Trace
        } else if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        },
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_enclose_points() {
        let bounds = GeoBounds::enclosing([
            Coordinates {
                lat: -23.9,
                lon: -46.3,
            },
            Coordinates {
                lat: -22.9,
                lon: -47.1,
            },
            Coordinates {
                lat: -23.2,
                lon: -46.9,
            },
        ])
        .unwrap();
        assert_eq!(
            bounds,
            GeoBounds {
                lat_min: -23.9,
                lat_max: -22.9,
                lon_min: -47.1,
                lon_max: -46.3,
            }
        );
        assert_eq!(GeoBounds::enclosing(std::iter::empty()), None);
        let inside = Coordinates {
            lat: -23.0,
            lon: -47.0,
        };
        let outside = Coordinates {
            lat: -23.0,
            lon: -45.0,
        };
        assert!(bounds.contains(inside));
        assert!(!bounds.contains(outside));
    }

    #[test]
    fn union_covers_both() {
        let west = GeoBounds {
            lat_min: -24.0,
            lat_max: -22.0,
            lon_min: -50.0,
            lon_max: -48.0,
        };
        let east = GeoBounds {
            lat_min: -25.0,
            lat_max: -23.0,
            lon_min: -47.0,
            lon_max: -45.0,
        };
        assert_eq!(
            west.union(&east),
            GeoBounds {
                lat_min: -25.0,
                lat_max: -22.0,
                lon_min: -50.0,
                lon_max: -45.0,
            }
        );
    }

    #[test]
    fn padding_grows_every_side() {
        let bounds = GeoBounds {
            lat_min: -26.0,
            lat_max: -20.0,
            lon_min: -54.0,
            lon_max: -44.0,
        }
        .padded(0.05);
        approx::assert_relative_eq!(bounds.lat_min, -26.3);
        approx::assert_relative_eq!(bounds.lat_max, -19.7);
        approx::assert_relative_eq!(bounds.lon_min, -54.5);
        approx::assert_relative_eq!(bounds.lon_max, -43.5);
    }

    #[test]
    fn rejects_bad_sample_density() {
        let args = Args::try_parse_from([
            "city-heatmap",
            "--input",
            "Cargo.toml",
            "--points-per-count",
            "0",
        ])
        .unwrap();
        assert!(args.check().is_err());
    }

    #[test]
    fn rejects_missing_input() {
        let args =
            Args::try_parse_from(["city-heatmap", "--input", "no/such/cities.csv"]).unwrap();
        assert!(args.check().is_err());
    }
}
