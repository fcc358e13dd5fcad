//! Map rendering
//!
//! Every kind of map is drawn from the same [`MapData`], by a [`Renderer`]
//! that matches the [`MapStyle`] selected on the command line.

mod html;
mod raster;

use self::{
    html::{HtmlFlavor, HtmlRenderer},
    raster::{ImageFormat, ImageRenderer},
};
use crate::{
    boundary::Boundary,
    cache::CityRecords,
    config::Config,
    heat::{HeatInput, HeatPolicy},
    regions::RegionInfo,
    Result,
};
use anyhow::Context;
use std::path::Path;

/// Kind of map to produce
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, clap::ValueEnum)]
pub enum MapStyle {
    /// HTML map with street tiles and clustered city markers
    Interactive,

    /// HTML map with light tiles, region boundaries and sized city markers
    Static,

    /// PNG image
    Png,

    /// SVG image
    Svg,
}
//
impl MapStyle {
    /// File extension of the output
    pub fn extension(self) -> &'static str {
        match self {
            Self::Interactive | Self::Static => "html",
            Self::Png => "png",
            Self::Svg => "svg",
        }
    }

    /// Truth that this style draws region boundaries
    pub fn needs_boundary(self) -> bool {
        !matches!(self, Self::Interactive)
    }

    /// Default heat sampling policy of this style
    pub fn heat_policy(self) -> HeatPolicy {
        match self {
            Self::Interactive => HeatPolicy {
                filter_by_threshold: true,
                points_per_count: 2.0,
                max_points: None,
            },
            Self::Static => HeatPolicy {
                filter_by_threshold: false,
                points_per_count: 2.0,
                max_points: None,
            },
            Self::Png => HeatPolicy {
                filter_by_threshold: false,
                points_per_count: 1.0,
                max_points: Some(30),
            },
            Self::Svg => HeatPolicy {
                filter_by_threshold: false,
                points_per_count: 1.0,
                max_points: Some(40),
            },
        }
    }
}

/// Everything that goes into a map
#[derive(Clone, Debug)]
pub struct MapData<'a> {
    /// Region being mapped
    pub region: &'a RegionInfo,

    /// Every geocoded city
    pub records: &'a CityRecords,

    /// Cities that feed the heat layer
    pub heat: HeatInput,

    /// Region boundaries, if the map style draws them
    pub boundary: Option<&'a Boundary>,

    /// Every geocoded city, from the most to the least frequent
    pub ranking: Vec<(&'a str, u64)>,
}
//
impl<'a> MapData<'a> {
    /// Prepare map data
    pub fn new(
        region: &'a RegionInfo,
        records: &'a CityRecords,
        policy: &HeatPolicy,
        boundary: Option<&'a Boundary>,
    ) -> Self {
        let mut ranking = (records.iter())
            .map(|(city, record)| (&**city, record.count))
            .collect::<Vec<_>>();
        ranking.sort_unstable_by(|(city1, count1), (city2, count2)| {
            count2.cmp(count1).then_with(|| city1.cmp(city2))
        });
        Self {
            region,
            records,
            heat: HeatInput::build(records, policy),
            boundary,
            ranking,
        }
    }

    /// Total number of occurences of the geocoded cities
    pub fn total_occurences(&self) -> u64 {
        self.ranking.iter().map(|(_city, count)| count).sum()
    }
}

/// Strategy for drawing a map into a file
pub trait Renderer {
    /// Draw a map into the output file
    fn render(&self, map: &MapData, output: &Path) -> Result<()>;
}

/// Draw the map selected by the configuration
pub fn render(config: &Config, records: &CityRecords, boundary: Option<&Boundary>) -> Result<()> {
    let map = MapData::new(&config.region, records, &config.heat, boundary);
    let renderer: &dyn Renderer = match config.style {
        MapStyle::Interactive => &HtmlRenderer(HtmlFlavor::Interactive),
        MapStyle::Static => &HtmlRenderer(HtmlFlavor::Static),
        MapStyle::Png => &ImageRenderer(ImageFormat::Png),
        MapStyle::Svg => &ImageRenderer(ImageFormat::Svg),
    };
    renderer
        .render(&map, &config.output)
        .with_context(|| format!("drawing map into {}", config.output.display()))?;
    log::info!(
        "Drew {} cities ({} with heat) into {}",
        map.records.len(),
        map.heat.points.len(),
        config.output.display()
    );
    Ok(())
}

/// Group the digits of a number by thousands, e.g. "12,345"
pub(crate) fn group_thousands(number: u64) -> String {
    let digits = number.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, digit) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{cache::GeoRecord, regions};

    /// A few cities around São Paulo
    pub fn sample_records() -> CityRecords {
        [
            ("Santos", -23.96, -46.33, 8),
            ("Campinas", -22.91, -47.06, 12),
            ("Jundiaí", -23.19, -46.88, 3),
            ("Sorocaba", -23.50, -47.46, 3),
            ("Itu", -23.26, -47.30, 1),
        ]
        .into_iter()
        .map(|(city, lat, lon, count)| (city.into(), GeoRecord { lat, lon, count }))
        .collect()
    }

    #[test]
    fn style_policies() {
        assert!(MapStyle::Interactive.heat_policy().filter_by_threshold);
        assert!(!MapStyle::Static.heat_policy().filter_by_threshold);
        assert_eq!(MapStyle::Png.heat_policy().points_for(100), 30);
        assert_eq!(MapStyle::Svg.heat_policy().points_for(100), 40);
        assert_eq!(MapStyle::Static.heat_policy().points_for(100), 200);
        assert!(!MapStyle::Interactive.needs_boundary());
        assert!(MapStyle::Svg.needs_boundary());
        assert_eq!(MapStyle::Static.extension(), "html");
    }

    #[test]
    fn ranking_is_by_decreasing_count_then_name() {
        let records = sample_records();
        let sp = regions::get("sp").unwrap();
        let map = MapData::new(&sp, &records, &MapStyle::Png.heat_policy(), None);
        assert_eq!(
            map.ranking,
            vec![
                ("Campinas", 12),
                ("Santos", 8),
                ("Jundiaí", 3),
                ("Sorocaba", 3),
                ("Itu", 1)
            ]
        );
        assert_eq!(map.total_occurences(), 27);
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(1234567), "1,234,567");
    }
}
