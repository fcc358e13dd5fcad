//! Conversion of city occurence counts into heat map intensity
//!
//! Each city contributes a number of heat samples that grows linearly with
//! its occurence count, and the renderer's density estimate over these
//! samples is what makes frequent cities look hotter.

use crate::{cache::CityRecords, Coordinates, GeoBounds};
use rayon::prelude::*;

/// Lowest display threshold, whatever the counts
pub const MIN_DISPLAY_THRESHOLD: f64 = 3.0;

/// Fraction of the mean count that a city must reach to be displayed
pub const MEAN_THRESHOLD_FRACTION: f64 = 0.2;

/// Minimal count for a city to feed the heat map when filtering is enabled
///
/// This is `max(3, mean(counts) * 0.2)`, or 3 when there is no count at all.
pub fn display_threshold(counts: impl IntoIterator<Item = u64>) -> f64 {
    let (sum, len) = counts
        .into_iter()
        .fold((0u64, 0usize), |(sum, len), count| (sum + count, len + 1));
    if len == 0 {
        return MIN_DISPLAY_THRESHOLD;
    }
    let mean = sum as f64 / len as f64;
    MIN_DISPLAY_THRESHOLD.max(mean * MEAN_THRESHOLD_FRACTION)
}

/// How city counts turn into heat samples
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeatPolicy {
    /// Leave out cities whose count is below the [`display_threshold()`]
    pub filter_by_threshold: bool,

    /// Heat samples per occurence
    pub points_per_count: f64,

    /// Upper bound on the number of samples of a single city
    pub max_points: Option<u64>,
}
//
impl HeatPolicy {
    /// Number of heat samples for a city, always at least one
    pub fn points_for(&self, count: u64) -> u64 {
        let points = ((count as f64 * self.points_per_count) as u64).max(1);
        self.max_points.map_or(points, |max| points.min(max))
    }
}

/// City as seen by the heat map
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeatPoint {
    /// Location of the city
    pub coordinates: Coordinates,

    /// Occurence count of the city
    pub count: u64,

    /// Number of heat samples emitted at this location
    pub samples: u64,
}

/// Input of the heat map layer
#[derive(Clone, Debug, PartialEq)]
pub struct HeatInput {
    /// Cities that contribute heat, in name order
    pub points: Vec<HeatPoint>,

    /// Display threshold of the input records
    pub threshold: f64,

    /// Number of cities left out by threshold filtering
    pub filtered_out: usize,
}
//
impl HeatInput {
    /// Apply a heat policy to geocoded cities
    pub fn build(records: &CityRecords, policy: &HeatPolicy) -> Self {
        let threshold = display_threshold(records.values().map(|record| record.count));
        let mut points = Vec::with_capacity(records.len());
        let mut filtered_out = 0;
        for (city, record) in records {
            if policy.filter_by_threshold && (record.count as f64) < threshold {
                log::trace!("Left {city} out of the heat map, count {} is too low", record.count);
                filtered_out += 1;
                continue;
            }
            points.push(HeatPoint {
                coordinates: record.coordinates(),
                count: record.count,
                samples: policy.points_for(record.count),
            });
        }
        log::debug!(
            "Heat map threshold is {threshold:.1}, {filtered_out} cities left out, {} samples",
            points.iter().map(|p| p.samples).sum::<u64>()
        );
        Self {
            points,
            threshold,
            filtered_out,
        }
    }

    /// Every heat sample, with repetitions
    pub fn samples(&self) -> impl Iterator<Item = Coordinates> + '_ {
        (self.points.iter())
            .flat_map(|point| (0..point.samples).map(move |_| point.coordinates))
    }

    /// Range of counts among the cities that contribute heat
    pub fn count_range(&self) -> Option<(u64, u64)> {
        let counts = self.points.iter().map(|p| p.count);
        Some((counts.clone().min()?, counts.max()?))
    }
}

/// Heat accumulated over a regular latitude/longitude grid
///
/// Each sample spreads a Gaussian kernel over nearby cells, and intensities
/// are normalized so that the hottest cell is at 1.
#[derive(Clone, Debug, PartialEq)]
pub struct DensityGrid {
    /// Area covered by the grid
    bounds: GeoBounds,

    /// Number of columns
    width: usize,

    /// Number of rows, from north to south
    height: usize,

    /// Accumulated heat, row by row
    heat: Box<[f64]>,

    /// Highest accumulated heat
    max_heat: f64,
}
//
impl DensityGrid {
    /// Accumulate heat samples over a grid
    ///
    /// `radius` is the reach of each sample's kernel, in cells.
    pub fn accumulate(
        points: &[HeatPoint],
        bounds: GeoBounds,
        width: usize,
        height: usize,
        radius: f64,
    ) -> Self {
        assert!(width > 0 && height > 0, "density grid should not be empty");
        assert!(radius > 0.0, "kernel radius should be positive");

        // Translate points to (fractional) cell coordinates
        let cell_points = (points.iter())
            .map(|point| {
                let x =
                    (point.coordinates.lon - bounds.lon_min) / bounds.lon_span() * width as f64;
                let y =
                    (bounds.lat_max - point.coordinates.lat) / bounds.lat_span() * height as f64;
                (x, y, point.samples as f64)
            })
            .collect::<Vec<_>>();

        // Rows are independent, so they can be accumulated in parallel
        let sigma = radius / 2.0;
        let mut heat = vec![0.0; width * height];
        heat.par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, cells)| {
                let cy = row as f64 + 0.5;
                for &(px, py, weight) in &cell_points {
                    let dy = cy - py;
                    if dy.abs() > radius {
                        continue;
                    }
                    let end_col = ((px + radius).ceil().max(0.0) as usize).min(width);
                    let first_col = ((px - radius).floor().max(0.0) as usize).min(end_col);
                    let reached = &mut cells[first_col..end_col];
                    for (col, cell) in (first_col..).zip(reached) {
                        let dx = col as f64 + 0.5 - px;
                        let dist2 = dx * dx + dy * dy;
                        if dist2 <= radius * radius {
                            *cell += weight * (-dist2 / (2.0 * sigma * sigma)).exp();
                        }
                    }
                }
            });
        let max_heat = heat.par_iter().copied().reduce(|| 0.0, f64::max);

        Self {
            bounds,
            width,
            height,
            heat: heat.into(),
            max_heat,
        }
    }

    /// Normalized intensity of a cell, between 0 and 1
    pub fn intensity(&self, col: usize, row: usize) -> f64 {
        if self.max_heat > 0.0 {
            self.heat[row * self.width + col] / self.max_heat
        } else {
            0.0
        }
    }

    /// Cells with a nonzero intensity, along with the area that they cover
    pub fn hot_cells(&self) -> impl Iterator<Item = (GeoBounds, f64)> + '_ {
        let cell_lon = self.bounds.lon_span() / self.width as f64;
        let cell_lat = self.bounds.lat_span() / self.height as f64;
        (0..self.height)
            .flat_map(move |row| (0..self.width).map(move |col| (col, row)))
            .filter_map(move |(col, row)| {
                let intensity = self.intensity(col, row);
                (intensity > 0.0).then(|| {
                    let lon_min = self.bounds.lon_min + col as f64 * cell_lon;
                    let lat_max = self.bounds.lat_max - row as f64 * cell_lat;
                    let cell = GeoBounds {
                        lat_min: lat_max - cell_lat,
                        lat_max,
                        lon_min,
                        lon_max: lon_min + cell_lon,
                    };
                    (cell, intensity)
                })
            })
    }
}

/// Color with transparency
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rgba {
    /// Red channel
    pub r: u8,

    /// Green channel
    pub g: u8,

    /// Blue channel
    pub b: u8,

    /// Opacity, from 0 (transparent) to 1 (opaque)
    pub alpha: f64,
}
//
impl Rgba {
    /// CSS notation of this color
    pub fn css(&self) -> String {
        format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.alpha)
    }
}

/// Cold-to-hot color gradient shared by all renderers, as (intensity, color)
/// stops
pub const TEMPERATURE_GRADIENT: [(f64, Rgba); 7] = [
    (0.0, rgba(0, 0, 255, 0.0)),
    (0.1, rgba(0, 100, 255, 0.3)),
    (0.3, rgba(0, 200, 255, 0.5)),
    (0.5, rgba(0, 255, 200, 0.6)),
    (0.7, rgba(255, 255, 0, 0.7)),
    (0.85, rgba(255, 150, 0, 0.8)),
    (1.0, rgba(255, 0, 0, 1.0)),
];

/// Shorthand for gradient stops
const fn rgba(r: u8, g: u8, b: u8, alpha: f64) -> Rgba {
    Rgba { r, g, b, alpha }
}

/// Color of an intensity between 0 and 1 in the [`TEMPERATURE_GRADIENT`]
pub fn gradient_color(intensity: f64) -> Rgba {
    let intensity = intensity.clamp(0.0, 1.0);
    let upper = TEMPERATURE_GRADIENT
        .iter()
        .position(|&(stop, _)| stop >= intensity)
        .unwrap_or(TEMPERATURE_GRADIENT.len() - 1);
    if upper == 0 {
        return TEMPERATURE_GRADIENT[0].1;
    }
    let (lo_stop, lo) = TEMPERATURE_GRADIENT[upper - 1];
    let (hi_stop, hi) = TEMPERATURE_GRADIENT[upper];
    let t = (intensity - lo_stop) / (hi_stop - lo_stop);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    Rgba {
        r: mix(lo.r, hi.r),
        g: mix(lo.g, hi.g),
        b: mix(lo.b, hi.b),
        alpha: lo.alpha + (hi.alpha - lo.alpha) * t,
    }
}
