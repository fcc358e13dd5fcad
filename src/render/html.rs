//! Leaflet maps, as self-contained HTML pages

use super::{group_thousands, MapData, Renderer};
use crate::{heat::TEMPERATURE_GRADIENT, Result};
use anyhow::Context;
use serde::Serialize;
use serde_json::json;
use std::{fmt::Write, path::Path};

/// Radius of a heat sample, in pixels
const HEAT_RADIUS: u32 = 30;

/// Blur of the heat layer, in pixels
const HEAT_BLUR: u32 = 25;

/// Opacity of the coldest heat
const HEAT_MIN_OPACITY: f64 = 0.3;

/// Initial zoom level of interactive maps
const INITIAL_ZOOM: u32 = 7;

/// Largest radius of static map city markers, in pixels
const MAX_MARKER_RADIUS: f64 = 12.0;

/// Variants of the HTML map
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HtmlFlavor {
    /// Street tiles, clustered markers, every feature of the map enabled
    Interactive,

    /// Light tiles and region boundaries, meant to be looked at as is
    Static,
}

/// Renderer of HTML maps
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct HtmlRenderer(pub HtmlFlavor);
//
impl Renderer for HtmlRenderer {
    fn render(&self, map: &MapData, output: &Path) -> Result<()> {
        let page = self.page(map)?;
        std::fs::write(output, page).with_context(|| format!("writing {}", output.display()))
    }
}
//
impl HtmlRenderer {
    /// Generate the HTML page
    fn page(&self, map: &MapData) -> Result<String> {
        let region = map.region;
        let title = format!("City heat map of {}", region.name);
        let (flavor, extra_head) = match self.0 {
            HtmlFlavor::Interactive => ("interactive", MARKER_CLUSTER_HEAD),
            HtmlFlavor::Static => ("static", ""),
        };
        let boundary = match map.boundary {
            Some(boundary) => boundary.to_json()?,
            None => "null".to_owned(),
        };
        let page = PAGE_TEMPLATE
            .replace("@TITLE@", &escape_html(&title))
            .replace("@EXTRA_HEAD@", extra_head)
            .replace("@LEGEND@", &legend(map))
            .replace("@CITY_LIST@", &city_list(map))
            .replace("@DATA@", &script_json(&map_settings(map, flavor))?)
            .replace("@BOUNDARY@", &script_safe(&boundary));
        Ok(page)
    }
}

/// Data and settings of the map's script
fn map_settings(map: &MapData, flavor: &str) -> serde_json::Value {
    let region = map.region;
    let view = region.view;
    let heat = map
        .heat
        .samples()
        .map(|coordinates| [coordinates.lat, coordinates.lon])
        .collect::<Vec<_>>();
    let cities = (map.ranking.iter())
        .filter_map(|&(city, count)| {
            let record = map.records.get(city)?;
            Some(json!({
                "label": escape_html(city),
                "lat": record.lat,
                "lon": record.lon,
                "count": count,
            }))
        })
        .collect::<Vec<_>>();
    let gradient = (TEMPERATURE_GRADIENT.iter())
        .skip(1)
        .map(|(stop, color)| (stop.to_string(), json!(color.css())))
        .collect::<serde_json::Map<_, _>>();
    json!({
        "flavor": flavor,
        "center": [region.center.lat, region.center.lon],
        "zoom": INITIAL_ZOOM,
        "view": [[view.lat_min, view.lon_min], [view.lat_max, view.lon_max]],
        "heat": heat,
        "cities": cities,
        "radius": HEAT_RADIUS,
        "blur": HEAT_BLUR,
        "minOpacity": HEAT_MIN_OPACITY,
        "gradient": gradient,
        "maxMarkerRadius": MAX_MARKER_RADIUS,
    })
}

/// Legend box, with the heat gradient and a few totals
fn legend(map: &MapData) -> String {
    let stops = (TEMPERATURE_GRADIENT.iter())
        .map(|(stop, color)| format!("{} {}%", color.css(), stop * 100.0))
        .collect::<Vec<_>>()
        .join(", ");
    let (low, high) = map.heat.count_range().unwrap_or((0, 0));
    format!(
        r#"<div class="box legend">
  <h4>Occurrences</h4>
  <div class="gradient" style="background: linear-gradient(to right, {stops});"></div>
  <div class="scale"><span>{low}</span><span>{high}</span></div>
  <p>{total} occurrences<br>{shown} of {cities} cities on the heat map</p>
</div>"#,
        low = group_thousands(low),
        high = group_thousands(high),
        total = group_thousands(map.total_occurences()),
        shown = map.heat.points.len(),
        cities = map.records.len(),
    )
}

/// Box listing every city, from the most to the least frequent
fn city_list(map: &MapData) -> String {
    let mut items = String::new();
    for (city, count) in &map.ranking {
        // Writing into a String cannot fail
        let _ = writeln!(
            items,
            "    <li>{}: {}</li>",
            escape_html(city),
            group_thousands(*count)
        );
    }
    format!(
        "<div class=\"box cities\">\n  <h4>Cities ({} occurrences)</h4>\n  <ol>\n{items}  </ol>\n</div>",
        group_thousands(map.total_occurences())
    )
}

/// Escape text for use in HTML content and attributes
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Encode data as JSON that can be embedded in a `<script>` element
fn script_json(data: &impl Serialize) -> Result<String> {
    let json = serde_json::to_string(data).context("encoding map data as JSON")?;
    Ok(script_safe(&json))
}

/// Make JSON text safe to embed in a `<script>` element
///
/// These characters may only appear inside of JSON strings, where the escaped
/// form has the same meaning.
fn script_safe(json: &str) -> String {
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

/// Extra `<head>` content of interactive maps
const MARKER_CLUSTER_HEAD: &str = r#"<link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css">
  <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css">
  <script src="https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js"></script>"#;

/// HTML page, with @PLACEHOLDERS@ for the generated parts
const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>@TITLE@</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
  <script src="https://unpkg.com/leaflet.heat@0.2.0/dist/leaflet-heat.js"></script>
  @EXTRA_HEAD@
  <style>
    html, body, #map { height: 100%; margin: 0; }
    .box {
      position: fixed; z-index: 1000; background: rgba(255, 255, 255, 0.9);
      border: 1px solid #999; border-radius: 6px; padding: 8px 12px;
      font: 13px sans-serif; box-shadow: 0 1px 4px rgba(0, 0, 0, 0.3);
    }
    .box h4 { margin: 0 0 6px; }
    .legend { bottom: 30px; left: 10px; width: 220px; }
    .legend .gradient { height: 14px; border: 1px solid #666; }
    .legend .scale { display: flex; justify-content: space-between; }
    .legend p { margin: 6px 0 0; }
    .cities { top: 10px; right: 10px; max-height: 45%; overflow-y: auto; }
    .cities ol { margin: 0; padding-left: 24px; }
  </style>
</head>
<body>
  <div id="map"></div>
  @LEGEND@
  @CITY_LIST@
  <script>
    const data = @DATA@;
    const boundary = @BOUNDARY@;
    const map = L.map('map');
    if (data.flavor === 'static') {
      map.fitBounds(data.view);
      L.tileLayer('https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png', {
        attribution: '&copy; OpenStreetMap contributors &copy; CARTO',
        subdomains: 'abcd',
        maxZoom: 19
      }).addTo(map);
    } else {
      map.setView(data.center, data.zoom);
      L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
        attribution: '&copy; OpenStreetMap contributors',
        maxZoom: 19
      }).addTo(map);
    }
    if (boundary) {
      L.geoJSON(boundary, {
        style: { color: '#555555', weight: 1, fillColor: '#cccccc', fillOpacity: 0.1 }
      }).addTo(map);
    }
    L.heatLayer(data.heat, {
      radius: data.radius,
      blur: data.blur,
      minOpacity: data.minOpacity,
      gradient: data.gradient
    }).addTo(map);
    if (data.flavor === 'static') {
      for (const city of data.cities) {
        L.circleMarker([city.lat, city.lon], {
          radius: Math.min(city.count / 3, data.maxMarkerRadius),
          color: '#333333', weight: 1, fillColor: '#ffffff', fillOpacity: 0.7
        }).bindTooltip(city.label + ': ' + city.count).addTo(map);
      }
    } else {
      const cluster = L.markerClusterGroup();
      for (const city of data.cities) {
        cluster.addLayer(L.marker([city.lat, city.lon])
          .bindPopup('<b>' + city.label + '</b><br>' + city.count + ' occurrences'));
      }
      map.addLayer(cluster);
    }
  </script>
</body>
</html>
"#;
