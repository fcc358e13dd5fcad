//! Supported regions

use crate::{Args, Coordinates, GeoBounds, Result};
use anyhow::Context;
use dialoguer::FuzzySelect;

/// Get information about a region, from its short name
pub fn get(short_name: &str) -> Result<RegionInfo> {
    SUPPORTED_REGIONS
        .iter()
        .find(|region| region.short_name == short_name)
        .copied()
        .with_context(|| format!("Failed to find user-requested region {short_name}"))
}

/// Ask the user to select a region
pub fn prompt() -> dialoguer::Result<RegionInfo> {
    let region_names = SUPPORTED_REGIONS
        .iter()
        .map(|region| format!("{} ({})", region.name, region.short_name))
        .collect::<Vec<_>>();
    let region_idx = FuzzySelect::new()
        .with_prompt("Which region are these cities from?")
        .items(&region_names)
        .default(0)
        .max_length(usize::MAX)
        .interact()?;
    Ok(SUPPORTED_REGIONS[region_idx])
}

/// Pick the region requested on the command line, or ask for one
pub fn pick(args: &Args) -> Result<RegionInfo> {
    match args.region.as_deref() {
        Some(short_name) => get(short_name),
        None => prompt().context("prompting for a region"),
    }
}

/// What we know about a region
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RegionInfo {
    /// Short name, as used on the command line
    pub short_name: &'static str,

    /// Human-readable name
    pub name: &'static str,

    /// Country that the region belongs to
    pub country: &'static str,

    /// IBGE code of the state, as in boundary dataset URLs
    pub ibge_code: u8,

    /// Where interactive maps are initially centered
    pub center: Coordinates,

    /// Area shown by static maps
    pub view: GeoBounds,

    /// Rough outline of the region, as (longitude, latitude) pairs, for use
    /// when the real boundaries cannot be downloaded
    pub fallback_outline: Option<&'static [(f64, f64)]>,
}
//
impl RegionInfo {
    /// Text appended to city names when geocoding them
    pub fn geocoding_suffix(&self) -> Box<str> {
        format!("{}, {}", self.name, self.country).into()
    }

    /// URL of the municipal boundaries dataset
    pub fn boundary_url(&self) -> Box<str> {
        format!(
            "https://raw.githubusercontent.com/tbrugz/geodata-br/master/geojson/geojs-{}-mun.json",
            self.ibge_code
        )
        .into()
    }
}

/// Every region supported by this program
static SUPPORTED_REGIONS: [RegionInfo; 4] = [
    RegionInfo {
        short_name: "sp",
        name: "São Paulo",
        country: "Brasil",
        ibge_code: 35,
        center: Coordinates {
            lat: -23.5505,
            lon: -46.6333,
        },
        view: GeoBounds {
            lat_min: -25.5,
            lat_max: -19.5,
            lon_min: -53.0,
            lon_max: -43.0,
        },
        fallback_outline: Some(&[
            (-53.1, -20.8),
            (-51.0, -20.5),
            (-48.0, -22.0),
            (-48.0, -24.0),
            (-48.5, -25.0),
            (-47.0, -25.0),
            (-46.0, -24.5),
            (-45.0, -23.5),
            (-44.5, -22.0),
            (-53.1, -20.8),
        ]),
    },
    RegionInfo {
        short_name: "rj",
        name: "Rio de Janeiro",
        country: "Brasil",
        ibge_code: 33,
        center: Coordinates {
            lat: -22.9068,
            lon: -43.1729,
        },
        view: GeoBounds {
            lat_min: -23.5,
            lat_max: -20.7,
            lon_min: -45.0,
            lon_max: -40.9,
        },
        fallback_outline: None,
    },
    RegionInfo {
        short_name: "mg",
        name: "Minas Gerais",
        country: "Brasil",
        ibge_code: 31,
        center: Coordinates {
            lat: -19.9167,
            lon: -43.9345,
        },
        view: GeoBounds {
            lat_min: -23.0,
            lat_max: -14.2,
            lon_min: -51.2,
            lon_max: -39.8,
        },
        fallback_outline: None,
    },
    RegionInfo {
        short_name: "pr",
        name: "Paraná",
        country: "Brasil",
        ibge_code: 41,
        center: Coordinates {
            lat: -25.4284,
            lon: -49.2733,
        },
        view: GeoBounds {
            lat_min: -26.8,
            lat_max: -22.5,
            lon_min: -54.7,
            lon_max: -47.9,
        },
        fallback_outline: None,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_short_name() {
        let sp = get("sp").unwrap();
        assert_eq!(sp.name, "São Paulo");
        assert_eq!(&*sp.geocoding_suffix(), "São Paulo, Brasil");
        assert_eq!(
            &*sp.boundary_url(),
            "https://raw.githubusercontent.com/tbrugz/geodata-br/master/geojson/geojs-35-mun.json"
        );
        assert!(get("atlantis").is_err());
    }

    #[test]
    fn fallback_outlines_are_closed() {
        for region in &SUPPORTED_REGIONS {
            if let Some(outline) = region.fallback_outline {
                assert!(outline.len() >= 4, "{} outline is too short", region.name);
                assert_eq!(outline.first(), outline.last());
            }
        }
    }
}
