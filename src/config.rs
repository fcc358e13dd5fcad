//! Processing pipeline configuration

use crate::{heat::HeatPolicy, regions::RegionInfo, render::MapStyle, Args};
use std::{num::NonZeroUsize, path::Path, sync::Arc, time::Duration};

/// Maximal time spent waiting for the geocoding service
const GEOCODING_TIMEOUT: Duration = Duration::from_secs(10);

/// Final process configuration
///
/// This is the result of combining digested [`Args`] with region-specific
/// considerations. Please refer to [`Args`] to know more about common fields.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Region that the cities belong to
    pub region: RegionInfo,

    /// Subset of the configuration that drives geocoding
    pub geocoding: GeocodingConfig,

    /// Heat sampling policy of the selected map style
    pub heat: HeatPolicy,

    /// Output file, with defaults applied
    pub output: Box<Path>,

    /// Boundary file, with defaults applied
    pub boundary_file: Box<Path>,

    // Other fields have the same meaning as in Args
    pub input: Box<Path>,
    pub style: MapStyle,
    pub cache_file: Box<Path>,
    pub top: NonZeroUsize,
}
//
impl Config {
    /// Determine process configuration from initialization products
    pub(crate) fn new(args: Args, region: RegionInfo) -> Arc<Self> {
        let Args {
            input,
            region: _,
            style,
            output,
            cache,
            boundary,
            geocoder_url,
            delay_ms,
            points_per_count,
            top,
        } = args;
        let mut heat = style.heat_policy();
        if let Some(points_per_count) = points_per_count {
            heat.points_per_count = points_per_count;
        }
        let output = output.unwrap_or_else(|| {
            format!("heatmap_{}.{}", region.short_name, style.extension()).into()
        });
        let boundary_file = boundary
            .unwrap_or_else(|| format!("{}_boundaries.geojson", region.short_name).into());
        Arc::new(Self {
            geocoding: GeocodingConfig {
                endpoint: geocoder_url,
                query_suffix: region.geocoding_suffix(),
                delay: Duration::from_millis(delay_ms),
                timeout: GEOCODING_TIMEOUT,
            },
            region,
            heat,
            output: output.into(),
            boundary_file: boundary_file.into(),
            input: input.into(),
            style,
            cache_file: cache.into(),
            top,
        })
    }
}

/// Subset of the configuration that drives geocoding
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct GeocodingConfig {
    /// URL of the search endpoint
    pub endpoint: Box<str>,

    /// Text appended to city names to disambiguate them, e.g. "São Paulo,
    /// Brasil"
    pub query_suffix: Box<str>,

    /// Fixed delay before each request to the geocoding service
    pub delay: Duration,

    /// Maximal duration of a single request
    pub timeout: Duration,
}
//
impl GeocodingConfig {
    /// Free-text query used to locate a city
    pub fn query(&self, city: &str) -> String {
        format!("{city}, {}", self.query_suffix)
    }
}
