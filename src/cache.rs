//! Disk cache of geocoded cities
//!
//! Geocoding is slow and rate-limited, so every coordinate that was ever
//! obtained is kept in a JSON file of the form
//! `{"Santos": {"lat": -23.9, "lon": -46.3, "count": 5}, ...}`. Coordinates
//! found there are trusted forever, only the occurence count is refreshed.

use crate::{CityName, Coordinates, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, future::Future, io::ErrorKind, path::Path};
use tokio::fs;

/// What we know about a geocoded city
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct GeoRecord {
    /// Latitude in decimal degrees
    pub lat: f64,

    /// Longitude in decimal degrees
    pub lon: f64,

    /// Number of occurences of the city in the latest input that featured it
    pub count: u64,
}
//
impl GeoRecord {
    /// Record a city's location and occurence count
    pub fn new(coordinates: Coordinates, count: u64) -> Self {
        Self {
            lat: coordinates.lat,
            lon: coordinates.lon,
            count,
        }
    }

    /// Location of the city
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lon: self.lon,
        }
    }
}

/// Geocoded cities, ordered by name
pub type CityRecords = BTreeMap<CityName, GeoRecord>;

/// Storage for the geocoding cache
pub trait CacheStore {
    /// Load the cache, which is empty if it was never saved before
    fn load(&self) -> impl Future<Output = Result<CityRecords>> + Send;

    /// Replace the cache's previous contents
    fn save(&self, cache: &CityRecords) -> impl Future<Output = Result<()>> + Send;
}

/// Geocoding cache backed by a JSON file
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct JsonFileStore {
    /// Location of the cache file
    path: Box<Path>,
}
//
impl JsonFileStore {
    /// Use the JSON file at a certain location
    pub fn new(path: &Path) -> Self {
        Self { path: path.into() }
    }
}
//
impl CacheStore for JsonFileStore {
    async fn load(&self) -> Result<CityRecords> {
        let path = &self.path;
        match fs::read(path).await {
            Ok(json) => {
                let cache: CityRecords = serde_json::from_slice(&json)
                    .with_context(|| format!("decoding geocoding cache {}", path.display()))?;
                log::info!(
                    "Loaded {} geocoded cities from {}",
                    cache.len(),
                    path.display()
                );
                Ok(cache)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No geocoding cache at {}, starting afresh", path.display());
                Ok(CityRecords::new())
            }
            Err(e) => {
                Err(e).with_context(|| format!("reading geocoding cache {}", path.display()))
            }
        }
    }

    async fn save(&self, cache: &CityRecords) -> Result<()> {
        let path = &self.path;
        let json = serde_json::to_vec_pretty(cache).context("converting geocoding cache to JSON")?;
        fs::write(path, &json)
            .await
            .with_context(|| format!("writing geocoding cache {}", path.display()))?;
        log::info!("Saved {} geocoded cities to {}", cache.len(), path.display());
        Ok(())
    }
}

/// Geocoding cache that lives in memory, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Current contents
    contents: std::sync::Mutex<CityRecords>,

    /// Number of times the cache was saved
    saves: std::sync::atomic::AtomicUsize,
}
//
#[cfg(test)]
impl MemoryStore {
    /// Start with some cache contents
    pub fn new(contents: CityRecords) -> Self {
        Self {
            contents: std::sync::Mutex::new(contents),
            ..Self::default()
        }
    }

    /// Current cache contents
    pub fn contents(&self) -> CityRecords {
        self.contents.lock().unwrap().clone()
    }

    /// Number of times the cache was saved
    pub fn saves(&self) -> usize {
        self.saves.load(std::sync::atomic::Ordering::Relaxed)
    }
}
//
#[cfg(test)]
impl CacheStore for MemoryStore {
    async fn load(&self) -> Result<CityRecords> {
        Ok(self.contents())
    }

    async fn save(&self, cache: &CityRecords) -> Result<()> {
        *self.contents.lock().unwrap() = cache.clone();
        self.saves.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_means_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(&dir.path().join("city_coordinates.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_format_is_name_to_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("city_coordinates.json");
        std::fs::write(
            &path,
            r#"{"Santos": {"lat": -23.9, "lon": -46.3, "count": 5}}"#,
        )
        .unwrap();
        let store = JsonFileStore::new(&path);

        let mut cache = store.load().await.unwrap();
        assert_eq!(
            cache.get("Santos"),
            Some(&GeoRecord {
                lat: -23.9,
                lon: -46.3,
                count: 5
            })
        );

        cache.insert(
            "Jundiaí".into(),
            GeoRecord::new(
                Coordinates {
                    lat: -23.2,
                    lon: -46.9,
                },
                3,
            ),
        );
        store.save(&cache).await.unwrap();
        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"Jundiaí\""), "non-ASCII names are kept as is");
        assert_eq!(store.load().await.unwrap(), cache);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("city_coordinates.json");
        std::fs::write(&path, "{\"Santos\": [").unwrap();
        assert!(JsonFileStore::new(&path).load().await.is_err());
    }
}
