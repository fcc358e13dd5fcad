//! Region boundaries, as GeoJSON

use crate::{
    progress::{ProgressConfig, ProgressReport, Work},
    regions::RegionInfo,
    Coordinates, GeoBounds, Result,
};
use anyhow::Context;
use futures::StreamExt;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, JsonObject, Value};
use reqwest::Response;
use std::{io::ErrorKind, path::Path, time::Duration};
use tokio::fs;

/// Maximal time spent downloading boundary data
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Polygon boundaries of a region and its subdivisions
#[derive(Clone, Debug, PartialEq)]
pub struct Boundary(FeatureCollection);
//
impl Boundary {
    /// Decode GeoJSON boundaries
    pub fn parse(json: &str) -> Result<Self> {
        let collection = match json.parse::<GeoJson>().context("decoding GeoJSON")? {
            GeoJson::FeatureCollection(collection) => collection,
            GeoJson::Feature(feature) => collection_of(vec![feature]),
            GeoJson::Geometry(geometry) => collection_of(vec![Feature {
                geometry: Some(geometry),
                ..Feature::default()
            }]),
        };
        Ok(Self(collection))
    }

    /// Approximate boundaries built from a rough outline
    pub fn from_outline(name: &str, outline: &[(f64, f64)]) -> Self {
        let ring = (outline.iter())
            .map(|&(lon, lat)| vec![lon, lat])
            .collect::<Vec<_>>();
        let mut properties = JsonObject::new();
        properties.insert("name".to_owned(), name.into());
        Self(collection_of(vec![Feature {
            geometry: Some(Geometry::new(Value::Polygon(vec![ring]))),
            properties: Some(properties),
            ..Feature::default()
        }]))
    }

    /// Number of features, typically one per municipality
    pub fn num_features(&self) -> usize {
        self.0.features.len()
    }

    /// Exterior rings of every polygon, as (longitude, latitude) pairs
    ///
    /// Geometries other than polygons and multipolygons are ignored.
    pub fn rings(&self) -> Vec<Vec<(f64, f64)>> {
        let exterior_ring = |polygon: &Vec<Vec<Vec<f64>>>| {
            polygon.first().map(|ring| {
                (ring.iter())
                    .filter_map(|position| Some((*position.first()?, *position.get(1)?)))
                    .collect::<Vec<_>>()
            })
        };
        let mut rings = Vec::new();
        for feature in &self.0.features {
            let Some(geometry) = &feature.geometry else {
                continue;
            };
            match &geometry.value {
                Value::Polygon(polygon) => rings.extend(exterior_ring(polygon)),
                Value::MultiPolygon(polygons) => {
                    rings.extend(polygons.iter().filter_map(exterior_ring))
                }
                _ => log::debug!("Ignoring non-polygon boundary geometry"),
            }
        }
        rings
    }

    /// Area covered by the boundaries, if they contain any polygon
    pub fn bounds(&self) -> Option<GeoBounds> {
        GeoBounds::enclosing(
            (self.rings().into_iter())
                .flatten()
                .map(|(lon, lat)| Coordinates { lat, lon }),
        )
    }

    /// GeoJSON text of the boundaries
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.0).context("encoding boundaries as GeoJSON")
    }
}

/// Wrap features into a collection
fn collection_of(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Load region boundaries from disk, or download them if needed
///
/// Downloaded boundaries are saved at `path` for the next runs. If they
/// cannot be downloaded, the region's rough outline is used instead, or the
/// process fails if the region has none.
pub async fn load_or_fetch(
    region: &RegionInfo,
    url: &str,
    path: &Path,
    client: &reqwest::Client,
    report: &ProgressReport,
) -> Result<Boundary> {
    // Try the file first
    match fs::read_to_string(path).await {
        Ok(json) => {
            let boundary = Boundary::parse(&json)
                .with_context(|| format!("reading boundaries from {}", path.display()))?;
            log::info!(
                "Loaded {} boundary features from {}",
                boundary.num_features(),
                path.display()
            );
            return Ok(boundary);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No boundary file at {}, downloading {url}", path.display());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("reading boundary file {}", path.display()));
        }
    }

    // Download the boundaries, or fall back to the rough outline
    let boundary = match download(url, client, report).await {
        Ok(boundary) => {
            log::info!("Downloaded {} boundary features", boundary.num_features());
            boundary
        }
        Err(e) => {
            let Some(outline) = region.fallback_outline else {
                return Err(e).with_context(|| {
                    format!("no fallback boundaries are known for {}", region.name)
                });
            };
            log::warn!("Failed to download boundaries ({e:#}), using a rough outline instead");
            Boundary::from_outline(region.name, outline)
        }
    };

    // Keep them around for next time
    let json = serde_json::to_vec_pretty(&boundary.0).context("encoding boundaries as GeoJSON")?;
    fs::write(path, &json)
        .await
        .with_context(|| format!("saving boundaries to {}", path.display()))?;
    Ok(boundary)
}

/// Download boundaries
async fn download(
    url: &str,
    client: &reqwest::Client,
    report: &ProgressReport,
) -> Result<Boundary> {
    let context = || format!("downloading boundaries from {url}");
    let response = client
        .get(url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .and_then(Response::error_for_status)
        .with_context(context)?;
    let progress = response.content_length().map(|length| {
        report.add(
            "Downloading boundaries",
            ProgressConfig::new(Work::Bytes(length)).dont_show_rate_eta(),
        )
    });
    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.with_context(context)?;
        if let Some(progress) = &progress {
            progress.make_progress(chunk.len() as u64);
        }
        body.extend_from_slice(&chunk);
    }
    let json = String::from_utf8(body).context("boundaries are not valid UTF-8")?;
    Boundary::parse(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regions;

    /// URL where nobody listens
    const UNREACHABLE_URL: &str = "http://127.0.0.1:9/geojs-35-mun.json";

    const TWO_MUNICIPALITIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"name": "Santos"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-46.4, -24.0], [-46.2, -24.0], [-46.2, -23.8], [-46.4, -24.0]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"name": "Ilhabela"},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[-45.4, -23.9], [-45.2, -23.9], [-45.2, -23.7], [-45.4, -23.9]]],
                        [[[-45.1, -23.6], [-45.0, -23.6], [-45.0, -23.5], [-45.1, -23.6]]]
                    ]
                }
            },
            {
                "type": "Feature",
                "properties": {"name": "Marco"},
                "geometry": {"type": "Point", "coordinates": [-47.0, -23.0]}
            }
        ]
    }"#;

    #[test]
    fn rings_of_polygons_and_multipolygons() {
        let boundary = Boundary::parse(TWO_MUNICIPALITIES).unwrap();
        assert_eq!(boundary.num_features(), 3);
        let rings = boundary.rings();
        assert_eq!(rings.len(), 3);
        assert_eq!(rings[0][1], (-46.2, -24.0));
        assert_eq!(
            boundary.bounds(),
            Some(GeoBounds {
                lat_min: -24.0,
                lat_max: -23.5,
                lon_min: -46.4,
                lon_max: -45.0,
            })
        );
    }

    #[test]
    fn outline_becomes_a_named_polygon() {
        let sp = regions::get("sp").unwrap();
        let boundary = Boundary::from_outline(sp.name, sp.fallback_outline.unwrap());
        assert_eq!(boundary.rings(), vec![sp.fallback_outline.unwrap().to_vec()]);
        let json = boundary.to_json().unwrap();
        assert!(json.contains("\"name\":\"São Paulo\""));
        assert_eq!(Boundary::parse(&json).unwrap().rings(), boundary.rings());
    }

    #[tokio::test]
    async fn existing_file_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sp_boundaries.geojson");
        std::fs::write(&path, TWO_MUNICIPALITIES).unwrap();
        let boundary = load_or_fetch(
            &regions::get("sp").unwrap(),
            UNREACHABLE_URL,
            &path,
            &reqwest::Client::new(),
            &ProgressReport::hidden(),
        )
        .await
        .unwrap();
        assert_eq!(boundary.num_features(), 3);
    }

    #[tokio::test]
    async fn download_failure_falls_back_to_outline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sp_boundaries.geojson");
        let sp = regions::get("sp").unwrap();
        let boundary = load_or_fetch(
            &sp,
            UNREACHABLE_URL,
            &path,
            &reqwest::Client::new(),
            &ProgressReport::hidden(),
        )
        .await
        .unwrap();
        assert_eq!(boundary.rings(), vec![sp.fallback_outline.unwrap().to_vec()]);

        // The fallback was saved for next time
        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(Boundary::parse(&saved).unwrap().rings(), boundary.rings());
    }

    #[tokio::test]
    async fn download_failure_without_fallback_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rj_boundaries.geojson");
        let result = load_or_fetch(
            &regions::get("rj").unwrap(),
            UNREACHABLE_URL,
            &path,
            &reqwest::Client::new(),
            &ProgressReport::hidden(),
        )
        .await;
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
