//! Map images, drawn with plotters

use super::{group_thousands, MapData, Renderer};
use crate::{
    heat::{gradient_color, DensityGrid, Rgba},
    Coordinates, GeoBounds, Result,
};
use plotters::{
    coord::{types::RangedCoordf64, Shift},
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use std::path::Path;

/// Size of the whole image, in pixels
const IMAGE_SIZE: (u32, u32) = (2000, 1600);

/// Height of the title strip
const TITLE_HEIGHT: u32 = 90;

/// Width of the main map, the rest goes to the side panel
const MAP_WIDTH: u32 = 1480;

/// Height of the side panel's colour bar section
const COLOR_BAR_HEIGHT: u32 = 460;

/// Number of steps of the colour bar
const COLOR_BAR_STEPS: i32 = 100;

/// Size of a density grid cell, in pixels
const CELL_PIXELS: u32 = 4;

/// Reach of a heat sample, in pixels
const HEAT_RADIUS_PIXELS: f64 = 48.0;

/// Cells colder than this are not drawn
const MIN_DRAWN_INTENSITY: f64 = 0.01;

/// Number of cities with a labelled marker
const LABELLED_CITIES: usize = 15;

/// Scale factor from marker size to marker radius
const MARKER_SCALE: f64 = 2.0;

/// Height of a line of the city list
const LINE_HEIGHT: i32 = 28;

/// Fraction of the image covered by the minimap
const MINIMAP_FRACTION: f64 = 0.2;

/// Distance from the minimap to the image's bottom-right corner
const MINIMAP_MARGIN: u32 = 20;

/// Margin around the minimap's boundaries, as a fraction of their span
const MINIMAP_PADDING: f64 = 0.05;

/// Font of every text
const FONT: &str = "sans-serif";

const SEA_COLOR: RGBColor = RGBColor(226, 236, 244);
const LAND_COLOR: RGBColor = RGBColor(246, 244, 236);
const BORDER_COLOR: RGBColor = RGBColor(130, 130, 130);
const MARKER_COLOR: RGBColor = RGBColor(200, 30, 30);

/// Supported image formats
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImageFormat {
    Png,
    Svg,
}

/// Renderer of map images
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ImageRenderer(pub ImageFormat);
//
impl Renderer for ImageRenderer {
    fn render(&self, map: &MapData, output: &Path) -> Result<()> {
        match self.0 {
            ImageFormat::Png => {
                let root = BitMapBackend::new(output, IMAGE_SIZE).into_drawing_area();
                draw(&root, map)?;
                root.present()?;
            }
            ImageFormat::Svg => {
                let root = SVGBackend::new(output, IMAGE_SIZE).into_drawing_area();
                draw(&root, map)?;
                root.present()?;
            }
        }
        Ok(())
    }
}

/// Chart with geographic coordinates, longitude first
type GeoChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Draw the whole image
fn draw<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, map: &MapData) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (title_area, body) = root.split_vertically(TITLE_HEIGHT);
    let (map_area, side_panel) = body.split_horizontally(MAP_WIDTH);
    let rings = map.boundary.map(|boundary| boundary.rings()).unwrap_or_default();

    let (width, height) = map_area.dim_in_pixel();
    let view = fit_to_area(map.region.view, width, height);
    draw_main_map(&map_area, view, &rings, map)?;

    // Shapes of the main map may spill over its surroundings, which are
    // thus painted over afterwards
    title_area.fill(&WHITE)?;
    let title_style =
        TextStyle::from((FONT, 48).into_font()).pos(Pos::new(HPos::Center, VPos::Center));
    title_area.draw(&Text::new(
        format!("City heat map of {}", map.region.name),
        (IMAGE_SIZE.0 as i32 / 2, TITLE_HEIGHT as i32 / 2),
        title_style,
    ))?;
    side_panel.fill(&WHITE)?;
    let (color_bar_area, rest) = side_panel.split_vertically(COLOR_BAR_HEIGHT);
    draw_color_bar(&color_bar_area, map)?;
    let minimap_height = (IMAGE_SIZE.1 as f64 * MINIMAP_FRACTION) as u32;
    let minimap_reserve = minimap_height + 2 * MINIMAP_MARGIN;
    let list_height = rest.dim_in_pixel().1.saturating_sub(minimap_reserve);
    let (list_area, _minimap_area) = rest.split_vertically(list_height);
    draw_city_list(&list_area, map)?;

    let minimap_bounds = (map.boundary)
        .and_then(|boundary| boundary.bounds())
        .unwrap_or(view)
        .padded(MINIMAP_PADDING);
    draw_minimap(root, minimap_bounds, view, &rings)?;
    Ok(())
}

/// Draw the main map: boundaries, heat and the most frequent cities
fn draw_main_map<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    view: GeoBounds,
    rings: &[Vec<(f64, f64)>],
    map: &MapData,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    area.fill(&SEA_COLOR)?;
    let mut chart = geo_chart(area, view)?;
    draw_boundary(&mut chart, rings, 1)?;

    // Heat
    let (width, height) = area.dim_in_pixel();
    let grid = DensityGrid::accumulate(
        &map.heat.points,
        view,
        (width / CELL_PIXELS) as usize,
        (height / CELL_PIXELS) as usize,
        HEAT_RADIUS_PIXELS / CELL_PIXELS as f64,
    );
    chart.draw_series(
        grid.hot_cells()
            .filter(|&(_cell, intensity)| intensity >= MIN_DRAWN_INTENSITY)
            .map(|(cell, intensity)| {
                Rectangle::new(
                    [(cell.lon_min, cell.lat_min), (cell.lon_max, cell.lat_max)],
                    plotters_color(gradient_color(intensity)).filled(),
                )
            }),
    )?;

    // Most frequent cities
    let labels = labelled_cities(map, view);
    chart.draw_series(labels.into_iter().map(|(city, count, coordinates)| {
        let radius = marker_radius(count);
        EmptyElement::at((coordinates.lon, coordinates.lat))
            + Circle::new((0, 0), radius, MARKER_COLOR.mix(0.8).filled())
            + Circle::new((0, 0), radius, BLACK.stroke_width(2))
            + Text::new(
                format!("{city} ({count})"),
                (radius + 6, -12),
                (FONT, 22).into_font(),
            )
    }))?;

    area.draw(&Rectangle::new(
        [(0, 0), (width as i32 - 1, height as i32 - 1)],
        BLACK.stroke_width(2),
    ))?;
    Ok(())
}

/// Draw a vertical colour bar of the heat gradient
fn draw_color_bar<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, map: &MapData) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (_width, height) = area.dim_in_pixel();
    let (left, right) = (40, 100);
    let (top, bottom) = (80, height as i32 - 40);
    area.draw(&Text::new("Heat intensity", (left, 30), (FONT, 28).into_font()))?;
    let span = bottom - top;
    for step in 0..COLOR_BAR_STEPS {
        let color = gradient_color((step as f64 + 0.5) / COLOR_BAR_STEPS as f64);
        area.draw(&Rectangle::new(
            [
                (left, bottom - span * (step + 1) / COLOR_BAR_STEPS),
                (right, bottom - span * step / COLOR_BAR_STEPS),
            ],
            plotters_color(color).filled(),
        ))?;
    }
    area.draw(&Rectangle::new([(left, top), (right, bottom)], BLACK.stroke_width(1)))?;

    let (low, high) = map.heat.count_range().unwrap_or((0, 0));
    let label_style = TextStyle::from((FONT, 22).into_font());
    area.draw(&Text::new(
        format!("High ({} occurrences)", group_thousands(high)),
        (right + 15, top),
        label_style.clone(),
    ))?;
    area.draw(&Text::new(
        format!("Low ({} occurrences)", group_thousands(low)),
        (right + 15, bottom - 22),
        label_style,
    ))?;
    Ok(())
}

/// Draw the list of cities, from the most to the least frequent
///
/// Cities that do not fit in the area are summarized on the last line.
fn draw_city_list<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, map: &MapData) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (_width, height) = area.dim_in_pixel();
    let header = format!(
        "Cities ({} occurrences)",
        group_thousands(map.total_occurences())
    );
    area.draw(&Text::new(header, (40, 10), (FONT, 28).into_font()))?;

    let first_line = 60;
    let max_lines = ((height as i32 - first_line) / LINE_HEIGHT).max(0) as usize;
    let num_cities = map.ranking.len();
    let shown = if num_cities > max_lines {
        max_lines.saturating_sub(1)
    } else {
        num_cities
    };
    let line_style = TextStyle::from((FONT, 20).into_font());
    let line_pos = |idx: usize| (40, first_line + idx as i32 * LINE_HEIGHT);
    for (idx, (city, count)) in map.ranking.iter().take(shown).enumerate() {
        area.draw(&Text::new(
            format!("{}. {city}: {}", idx + 1, group_thousands(*count)),
            line_pos(idx),
            line_style.clone(),
        ))?;
    }
    if shown < num_cities && max_lines > 0 {
        area.draw(&Text::new(
            format!("... and {} more", num_cities - shown),
            line_pos(shown),
            line_style,
        ))?;
    }
    Ok(())
}

/// Draw the minimap in the image's bottom-right corner
///
/// It shows `bounds` with the main map's `view` outlined in red.
fn draw_minimap<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    bounds: GeoBounds,
    view: GeoBounds,
    rings: &[Vec<(f64, f64)>],
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let (root_width, root_height) = root.dim_in_pixel();
    let width = (root_width as f64 * MINIMAP_FRACTION) as u32;
    let height = (root_height as f64 * MINIMAP_FRACTION) as u32;
    let inset = root.clone().shrink(
        (
            root_width - width - MINIMAP_MARGIN,
            root_height - height - MINIMAP_MARGIN,
        ),
        (width, height),
    );
    inset.fill(&SEA_COLOR)?;
    let mut chart = geo_chart(&inset, bounds)?;
    draw_boundary(&mut chart, rings, 1)?;

    // Keep the outline within the minimap
    let outline = GeoBounds {
        lat_min: view.lat_min.max(bounds.lat_min),
        lat_max: view.lat_max.min(bounds.lat_max),
        lon_min: view.lon_min.max(bounds.lon_min),
        lon_max: view.lon_max.min(bounds.lon_max),
    };
    chart.draw_series(std::iter::once(Rectangle::new(
        [
            (outline.lon_min, outline.lat_min),
            (outline.lon_max, outline.lat_max),
        ],
        RED.stroke_width(3),
    )))?;
    inset.draw(&Rectangle::new(
        [(0, 0), (width as i32 - 1, height as i32 - 1)],
        BLACK.stroke_width(2),
    ))?;
    Ok(())
}

/// Set up a chart covering some area of the globe
fn geo_chart<'a, DB: DrawingBackend>(
    area: &'a DrawingArea<DB, Shift>,
    bounds: GeoBounds,
) -> Result<GeoChart<'a, DB>>
where
    DB::ErrorType: 'static,
{
    let chart = ChartBuilder::on(area).build_cartesian_2d(
        bounds.lon_min..bounds.lon_max,
        bounds.lat_min..bounds.lat_max,
    )?;
    Ok(chart)
}

/// Draw region boundaries
fn draw_boundary<DB: DrawingBackend>(
    chart: &mut GeoChart<'_, DB>,
    rings: &[Vec<(f64, f64)>],
    line_width: u32,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let land = rings
        .iter()
        .map(|ring| Polygon::new(ring.clone(), LAND_COLOR.filled()));
    chart.draw_series(land)?;
    let borders = rings
        .iter()
        .map(|ring| PathElement::new(ring.clone(), BORDER_COLOR.stroke_width(line_width)));
    chart.draw_series(borders)?;
    Ok(())
}

/// Most frequent cities within the main map's view, with their locations
fn labelled_cities<'a>(map: &MapData<'a>, view: GeoBounds) -> Vec<(&'a str, u64, Coordinates)> {
    (map.ranking.iter())
        .filter_map(|&(city, count)| {
            let coordinates = map.records.get(city)?.coordinates();
            view.contains(coordinates).then_some((city, count, coordinates))
        })
        .take(LABELLED_CITIES)
        .collect()
}

/// Radius of a city marker, in pixels
///
/// Markers are sized `count / 4 + 10` in area units.
fn marker_radius(count: u64) -> i32 {
    ((count as f64 / 4.0 + 10.0).sqrt() * MARKER_SCALE).round() as i32
}

/// Grow a view so that it matches the aspect ratio of its drawing area
///
/// Longitudes are scaled by the cosine of the latitude, so that the map
/// is not stretched east-west.
fn fit_to_area(view: GeoBounds, width: u32, height: u32) -> GeoBounds {
    let mid_lat = (view.lat_min + view.lat_max) / 2.0;
    let lon_scale = mid_lat.to_radians().cos();
    let target_ratio = width as f64 / height as f64;
    let ratio = view.lon_span() * lon_scale / view.lat_span();
    if ratio < target_ratio {
        let extra = (view.lat_span() * target_ratio / lon_scale - view.lon_span()) / 2.0;
        GeoBounds {
            lon_min: view.lon_min - extra,
            lon_max: view.lon_max + extra,
            ..view
        }
    } else {
        let extra = (view.lon_span() * lon_scale / target_ratio - view.lat_span()) / 2.0;
        GeoBounds {
            lat_min: view.lat_min - extra,
            lat_max: view.lat_max + extra,
            ..view
        }
    }
}

/// Translate a gradient color for plotters
fn plotters_color(color: Rgba) -> RGBAColor {
    RGBAColor(color.r, color.g, color.b, color.alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{boundary::Boundary, regions, render::tests::sample_records, render::MapStyle};
    use approx::assert_relative_eq;

    #[test]
    fn views_keep_their_aspect_ratio() {
        let view = regions::get("sp").unwrap().view;
        let fitted = fit_to_area(view, 1480, 1510);
        assert!(fitted.lat_min <= view.lat_min && fitted.lat_max >= view.lat_max);
        assert!(fitted.lon_min <= view.lon_min && fitted.lon_max >= view.lon_max);
        let mid_lat = (fitted.lat_min + fitted.lat_max) / 2.0;
        assert_relative_eq!(
            fitted.lon_span() * mid_lat.to_radians().cos() / fitted.lat_span(),
            1480.0 / 1510.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn markers_grow_with_count() {
        assert_eq!(marker_radius(0), 6);
        assert!(marker_radius(100) > marker_radius(10));
    }

    #[test]
    fn labels_go_to_most_frequent_visible_cities() {
        let mut records = sample_records();
        records.insert(
            "Manaus".into(),
            crate::cache::GeoRecord {
                lat: -3.1,
                lon: -60.0,
                count: 100,
            },
        );
        let sp = regions::get("sp").unwrap();
        let map = MapData::new(&sp, &records, &MapStyle::Png.heat_policy(), None);
        let labelled = labelled_cities(&map, sp.view)
            .into_iter()
            .map(|(city, _count, _coordinates)| city)
            .collect::<Vec<_>>();
        assert_eq!(
            labelled,
            vec!["Campinas", "Santos", "Jundiaí", "Sorocaba", "Itu"]
        );
    }

    #[test]
    fn svg_image() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("heatmap_sp.svg");
        let records = sample_records();
        let sp = regions::get("sp").unwrap();
        let boundary = Boundary::from_outline(sp.name, sp.fallback_outline.unwrap());
        let map = MapData::new(&sp, &records, &MapStyle::Svg.heat_policy(), Some(&boundary));
        ImageRenderer(ImageFormat::Svg).render(&map, &output).unwrap();
        let svg = std::fs::read_to_string(&output).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Campinas (12)"));
    }
}
