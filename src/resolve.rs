//! Reconciliation of counted cities with the geocoding cache

use crate::{
    cache::{CacheStore, CityRecords, GeoRecord},
    config::GeocodingConfig,
    frequency::FrequencyTable,
    geocode::Geocoder,
    progress::{ProgressConfig, ProgressReport, Work},
    CityName, Coordinates, Result,
};
use anyhow::Context;

/// What happened when locating a city
#[derive(Clone, Debug, PartialEq)]
pub enum LookupOutcome {
    /// Coordinates came from the cache
    Cached,

    /// Coordinates were obtained from the geocoder
    Resolved(Coordinates),

    /// The geocoder does not know this city, which is left out of the map
    NotFound,

    /// The geocoder could not be queried, the city is left out of this run
    Failed(Box<str>),
}

/// Result of locating every counted city
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    /// Located cities with their current occurence counts
    pub records: CityRecords,

    /// Outcome for each city, in processing order
    pub outcomes: Vec<(CityName, LookupOutcome)>,
}
//
impl Resolution {
    /// Number of cities for each kind of outcome
    pub fn summary(&self) -> OutcomeSummary {
        let mut summary = OutcomeSummary::default();
        for (_city, outcome) in &self.outcomes {
            match outcome {
                LookupOutcome::Cached => summary.cached += 1,
                LookupOutcome::Resolved(_) => summary.resolved += 1,
                LookupOutcome::NotFound => summary.not_found += 1,
                LookupOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Number of cities for each kind of [`LookupOutcome`]
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct OutcomeSummary {
    pub cached: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub failed: usize,
}

/// Locate every counted city, using and updating the geocoding cache
///
/// Cities are processed from the most to the least frequent. Cached
/// coordinates are reused as is, with the occurence count refreshed. Other
/// cities are looked up one at a time, after a fixed delay that keeps us
/// within the geocoding service's rate limits. Cities that cannot be located
/// are left out without interrupting the process.
///
/// The cache is saved once all cities have been processed, whether or not
/// anything new was learned.
pub async fn resolve_cities(
    config: &GeocodingConfig,
    frequencies: &FrequencyTable,
    store: &impl CacheStore,
    geocoder: &impl Geocoder,
    report: &ProgressReport,
) -> Result<Resolution> {
    let mut cache = store.load().await.context("loading the geocoding cache")?;

    let cities = frequencies.by_decreasing_count();
    let num_cities = cities.len();
    log::info!("Geocoding {num_cities} cities");
    let progress = report.add(
        "Geocoding cities",
        ProgressConfig::new(Work::Steps(num_cities)),
    );

    let mut resolution = Resolution::default();
    for (idx, (city, count)) in cities.into_iter().enumerate() {
        let position = idx + 1;
        let count = count.get();
        progress.set_message(city.to_owned());
        let outcome = if let Some(record) = cache.get_mut(city) {
            log::debug!("[{position}/{num_cities}] {city}: cached");
            record.count = count;
            resolution.records.insert(city.into(), *record);
            LookupOutcome::Cached
        } else {
            tokio::time::sleep(config.delay).await;
            match geocoder.geocode(&config.query(city)).await {
                Ok(Some(coordinates)) => {
                    log::info!(
                        "[{position}/{num_cities}] {city}: ({}, {})",
                        coordinates.lat,
                        coordinates.lon
                    );
                    let record = GeoRecord::new(coordinates, count);
                    cache.insert(city.into(), record);
                    resolution.records.insert(city.into(), record);
                    LookupOutcome::Resolved(coordinates)
                }
                Ok(None) => {
                    log::warn!("[{position}/{num_cities}] Not found: {city}");
                    LookupOutcome::NotFound
                }
                Err(e) => {
                    log::warn!("[{position}/{num_cities}] Failed to geocode {city}: {e:#}");
                    LookupOutcome::Failed(format!("{e:#}").into())
                }
            }
        };
        resolution.outcomes.push((city.into(), outcome));
        progress.make_progress(1);
    }

    store.save(&cache).await.context("saving the geocoding cache")?;
    Ok(resolution)
}
