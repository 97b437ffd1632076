//! Map rendering: static SVG maps and Leaflet web maps
//!
//! Every layer is `{"data": <GeoJSON path or WKT>, "style": {...}}`. Style keys:
//! `label`, `color`, `fill`, `opacity`, `width`, `radius`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use geo::{Geometry, LineString, Polygon};
use geojson::JsonObject;
use gis_mcp_application::{
    Artifact, HandlerContext, HandlerResult, OperationDescriptor, OperationError, OperationProvider,
};
use gis_mcp_domain::{
    OperationGroup, ParameterKind, StorageCategory, ToolArguments, ToolDefinition, ToolParameter,
};
use serde_json::{Map, Value, json};

use super::projection::crs::Crs;
use super::support::{merge_bounds, parse_wkt};
use super::vector::layer::{FeatureLayer, feature};

/// Tool name constants
pub const CREATE_MAP: &str = "create_map";
pub const CREATE_WEB_MAP: &str = "create_web_map";

const SVG_WIDTH: f64 = 1000.0;
const SVG_HEIGHT: f64 = 800.0;
const MARGIN: f64 = 40.0;
const PALETTE: [&str; 8] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#17becf",
];
const LEAFLET_VERSION: &str = "1.9.4";

/// Basemap name → (tile URL, attribution)
const BASEMAPS: [(&str, &str, &str); 4] = [
    (
        "OpenStreetMap",
        "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
        "&copy; OpenStreetMap contributors",
    ),
    (
        "CartoDB positron",
        "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png",
        "&copy; OpenStreetMap contributors &copy; CARTO",
    ),
    (
        "CartoDB dark_matter",
        "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png",
        "&copy; OpenStreetMap contributors &copy; CARTO",
    ),
    (
        "OpenTopoMap",
        "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
        "&copy; OpenStreetMap contributors, SRTM | &copy; OpenTopoMap",
    ),
];

fn define(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, OperationGroup::Visualization)
}

fn layers_param() -> ToolParameter {
    ToolParameter::new(
        "layers",
        "Layers to draw: [{\"data\": <GeoJSON path or WKT>, \"style\": {...}}]",
        true,
    )
    .with_kind(ParameterKind::sequence_of(ParameterKind::Mapping))
}

fn flag(name: &str, description: &str) -> ToolParameter {
    ToolParameter::new(name, description, false)
        .with_kind(ParameterKind::Boolean)
        .with_default(true)
}

#[derive(Debug, Default, Clone)]
pub struct VisualizationProvider;

impl VisualizationProvider {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProvider for VisualizationProvider {
    fn id(&self) -> &str {
        "visualization"
    }

    fn group(&self) -> OperationGroup {
        OperationGroup::Visualization
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![
            OperationDescriptor::new(
                define(CREATE_MAP, "Render layers to a static SVG map")
                    .with_parameter(layers_param())
                    .with_parameter(
                        ToolParameter::new("filename", "Output file (.svg added when missing)", false)
                            .with_default("map")
                            .storage_output(Some(StorageCategory::Outputs)),
                    )
                    .with_parameter(
                        ToolParameter::new("filetype", "Output format", false).with_default("svg"),
                    )
                    .with_parameter(
                        ToolParameter::new("title", "Map title", false)
                            .with_kind(ParameterKind::optional(ParameterKind::String)),
                    )
                    .with_parameter(flag("show_grid", "Draw a coordinate grid"))
                    .with_parameter(flag("add_legend", "Draw a legend for labelled layers")),
                execute_create_map,
            ),
            OperationDescriptor::new(
                define(CREATE_WEB_MAP, "Render layers to an interactive Leaflet HTML map")
                    .with_parameter(layers_param())
                    .with_parameter(
                        ToolParameter::new("filename", "Output HTML file", false)
                            .with_default("map.html")
                            .storage_output(Some(StorageCategory::Outputs)),
                    )
                    .with_parameter(
                        ToolParameter::new("title", "Map title", false).with_default("My Map"),
                    )
                    .with_parameter(flag("show_grid", "Show a scale bar and click coordinates"))
                    .with_parameter(flag("add_legend", "Add a legend for labelled layers"))
                    .with_parameter(
                        ToolParameter::new("basemap", "Tile layer", false)
                            .with_default("OpenStreetMap"),
                    )
                    .with_parameter(flag("add_minimap", "Add an overview minimap")),
                execute_create_web_map,
            ),
        ]
    }
}

/// One layer after loading: features in a common CRS plus resolved style
#[derive(Debug, Clone)]
struct MapLayer {
    label: Option<String>,
    color: String,
    fill: String,
    opacity: f64,
    width: f64,
    radius: f64,
    geometries: Vec<Geometry<f64>>,
    layer: FeatureLayer,
}

fn style_str(style: &Map<String, Value>, key: &str) -> Option<String> {
    style.get(key).and_then(Value::as_str).map(str::to_string)
}

fn style_f64(style: &Map<String, Value>, key: &str, default: f64) -> f64 {
    style.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn load_layer(
    index: usize,
    spec: &Value,
    ctx: &HandlerContext,
    target: Option<&Crs>,
) -> Result<MapLayer, OperationError> {
    let spec = spec.as_object().ok_or_else(|| {
        OperationError::domain(format!("Layer {} must be an object with a 'data' key", index))
    })?;
    let data = spec.get("data").and_then(Value::as_str).ok_or_else(|| {
        OperationError::domain(format!("Layer {} needs a string 'data' entry", index))
    })?;
    let style = spec
        .get("style")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let lower = data.to_lowercase();
    let mut layer = if lower.ends_with(".geojson") || lower.ends_with(".json") {
        FeatureLayer::read(&ctx.storage.locate(data, None)?)?
    } else {
        let geometry = parse_wkt("data", data)?;
        FeatureLayer::new(vec![feature(Some(&geometry), JsonObject::new())])
    };

    if let Some(target) = target {
        layer.to_crs(target)?;
    }
    let geometries = layer.geometries()?.into_iter().flatten().collect();

    let color = style_str(&style, "color").unwrap_or_else(|| PALETTE[index % PALETTE.len()].into());
    Ok(MapLayer {
        label: style_str(&style, "label"),
        fill: style_str(&style, "fill").unwrap_or_else(|| color.clone()),
        color,
        opacity: style_f64(&style, "opacity", 0.5),
        width: style_f64(&style, "width", 1.5),
        radius: style_f64(&style, "radius", 4.0),
        geometries,
        layer,
    })
}

fn load_layers(
    args: &ToolArguments,
    ctx: &HandlerContext,
    web: bool,
) -> Result<Vec<MapLayer>, OperationError> {
    let specs = args.array("layers")?;
    if specs.is_empty() {
        return Err(OperationError::domain("At least one layer is required"));
    }
    let mut layers = Vec::with_capacity(specs.len());
    // Static maps draw in the first layer's CRS; web maps always use WGS84.
    let mut target = web.then(Crs::wgs84);
    for (index, spec) in specs.iter().enumerate() {
        let layer = load_layer(index, spec, ctx, target.as_ref())?;
        if target.is_none() {
            target = layer.layer.crs.parse().ok();
        }
        layers.push(layer);
    }
    Ok(layers)
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// World → screen mapping with y flipped
struct Viewport {
    bounds: [f64; 4],
    scale: f64,
    offset_x: f64,
    offset_y: f64,
}

impl Viewport {
    fn fit(bounds: [f64; 4]) -> Self {
        let [minx, miny, maxx, maxy] = bounds;
        // 5% padding on each side; a degenerate extent gets one unit
        let half_x = if maxx > minx { (maxx - minx) * 0.55 } else { 0.5 };
        let half_y = if maxy > miny { (maxy - miny) * 0.55 } else { 0.5 };
        let (cx, cy) = ((minx + maxx) / 2.0, (miny + maxy) / 2.0);
        let bounds = [cx - half_x, cy - half_y, cx + half_x, cy + half_y];
        let scale = ((SVG_WIDTH - 2.0 * MARGIN) / (bounds[2] - bounds[0]))
            .min((SVG_HEIGHT - 2.0 * MARGIN) / (bounds[3] - bounds[1]));
        let offset_x = MARGIN + ((SVG_WIDTH - 2.0 * MARGIN) - (bounds[2] - bounds[0]) * scale) / 2.0;
        let offset_y = MARGIN + ((SVG_HEIGHT - 2.0 * MARGIN) - (bounds[3] - bounds[1]) * scale) / 2.0;
        Self {
            bounds,
            scale,
            offset_x,
            offset_y,
        }
    }

    fn x(&self, x: f64) -> f64 {
        self.offset_x + (x - self.bounds[0]) * self.scale
    }

    fn y(&self, y: f64) -> f64 {
        self.offset_y + (self.bounds[3] - y) * self.scale
    }

    fn path(&self, ring: &LineString<f64>, close: bool) -> String {
        let mut d = String::new();
        for (i, c) in ring.0.iter().enumerate() {
            let cmd = if i == 0 { 'M' } else { 'L' };
            let _ = write!(d, "{}{:.2} {:.2} ", cmd, self.x(c.x), self.y(c.y));
        }
        if close {
            d.push('Z');
        }
        d
    }

    fn polygon(&self, polygon: &Polygon<f64>) -> String {
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .map(|ring| self.path(ring, true))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn svg_geometry(out: &mut String, view: &Viewport, geometry: &Geometry<f64>, layer: &MapLayer) {
    let stroke = format!(
        "stroke=\"{}\" stroke-width=\"{}\"",
        escape_xml(&layer.color),
        layer.width
    );
    let area = |out: &mut String, d: String| {
        let _ = writeln!(
            out,
            "  <path d=\"{}\" fill=\"{}\" fill-opacity=\"{}\" fill-rule=\"evenodd\" {}/>",
            d,
            escape_xml(&layer.fill),
            layer.opacity,
            stroke
        );
    };
    let line = |out: &mut String, d: String| {
        let _ = writeln!(out, "  <path d=\"{}\" fill=\"none\" {}/>", d, stroke);
    };
    match geometry {
        Geometry::Point(p) => {
            let _ = writeln!(
                out,
                "  <circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{}\" fill=\"{}\" {}/>",
                view.x(p.x()),
                view.y(p.y()),
                layer.radius,
                escape_xml(&layer.fill),
                stroke
            );
        }
        Geometry::MultiPoint(points) => {
            for p in points {
                svg_geometry(out, view, &Geometry::Point(*p), layer);
            }
        }
        Geometry::Line(l) => line(out, view.path(&LineString::from(vec![l.start, l.end]), false)),
        Geometry::LineString(ls) => line(out, view.path(ls, false)),
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                line(out, view.path(ls, false));
            }
        }
        Geometry::Polygon(p) => area(out, view.polygon(p)),
        Geometry::MultiPolygon(mp) => {
            for p in mp {
                area(out, view.polygon(p));
            }
        }
        Geometry::Rect(r) => area(out, view.polygon(&r.to_polygon())),
        Geometry::Triangle(t) => area(out, view.polygon(&t.to_polygon())),
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                svg_geometry(out, view, g, layer);
            }
        }
    }
}

/// Round grid spacing (1, 2 or 5 × 10^n) giving roughly five lines
fn grid_step(span: f64) -> f64 {
    let raw = span / 5.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized < 1.5 {
        1.0
    } else if normalized < 3.5 {
        2.0
    } else if normalized < 7.5 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn render_svg(
    layers: &[MapLayer],
    title: Option<&str>,
    show_grid: bool,
    add_legend: bool,
) -> Result<String, OperationError> {
    let bounds = merge_bounds(layers.iter().flat_map(|l| l.geometries.iter()))
        .ok_or_else(|| OperationError::domain("Layers contain no geometries to draw"))?;
    let view = Viewport::fit(bounds);

    let mut out = String::new();
    let _ = writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">",
        w = SVG_WIDTH,
        h = SVG_HEIGHT
    );
    out.push_str("  <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");

    if show_grid {
        let [minx, miny, maxx, maxy] = view.bounds;
        let step_x = grid_step(maxx - minx);
        let step_y = grid_step(maxy - miny);
        let mut x = (minx / step_x).ceil() * step_x;
        while x <= maxx {
            let _ = writeln!(
                out,
                "  <line class=\"grid\" x1=\"{0:.2}\" y1=\"{1:.2}\" x2=\"{0:.2}\" y2=\"{2:.2}\" stroke=\"#cccccc\" stroke-dasharray=\"4 4\"/>",
                view.x(x),
                view.y(miny),
                view.y(maxy)
            );
            x += step_x;
        }
        let mut y = (miny / step_y).ceil() * step_y;
        while y <= maxy {
            let _ = writeln!(
                out,
                "  <line class=\"grid\" x1=\"{1:.2}\" y1=\"{0:.2}\" x2=\"{2:.2}\" y2=\"{0:.2}\" stroke=\"#cccccc\" stroke-dasharray=\"4 4\"/>",
                view.y(y),
                view.x(minx),
                view.x(maxx)
            );
            y += step_y;
        }
    }

    for layer in layers {
        let _ = writeln!(
            out,
            "  <g class=\"layer\"{}>",
            layer
                .label
                .as_deref()
                .map(|l| format!(" id=\"{}\"", escape_xml(l)))
                .unwrap_or_default()
        );
        for geometry in &layer.geometries {
            svg_geometry(&mut out, &view, geometry, layer);
        }
        out.push_str("  </g>\n");
    }

    let labelled: Vec<&MapLayer> = layers.iter().filter(|l| l.label.is_some()).collect();
    if add_legend && !labelled.is_empty() {
        let _ = writeln!(out, "  <g class=\"legend\">");
        for (i, layer) in labelled.iter().enumerate() {
            let y = MARGIN + 20.0 * i as f64;
            let _ = writeln!(
                out,
                "    <rect x=\"{:.0}\" y=\"{:.0}\" width=\"14\" height=\"14\" fill=\"{}\"/>",
                SVG_WIDTH - 200.0,
                y,
                escape_xml(&layer.fill)
            );
            let _ = writeln!(
                out,
                "    <text x=\"{:.0}\" y=\"{:.0}\" font-size=\"13\">{}</text>",
                SVG_WIDTH - 180.0,
                y + 12.0,
                escape_xml(layer.label.as_deref().unwrap_or_default())
            );
        }
        out.push_str("  </g>\n");
    }

    if let Some(title) = title {
        let _ = writeln!(
            out,
            "  <text x=\"{:.0}\" y=\"{:.0}\" font-size=\"20\" font-weight=\"bold\" text-anchor=\"middle\">{}</text>",
            SVG_WIDTH / 2.0,
            MARGIN * 0.7,
            escape_xml(title)
        );
    }
    out.push_str("</svg>\n");
    Ok(out)
}

fn with_extension(path: PathBuf, extension: &str) -> PathBuf {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(extension) => path,
        _ => {
            let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
            name.push(format!(".{}", extension));
            path.with_file_name(name)
        }
    }
}

fn write_text(path: &Path, text: &str) -> Result<(), OperationError> {
    std::fs::write(path, text).map_err(|e| OperationError::io("Failed to write", path, e))
}

fn execute_create_map(args: &ToolArguments, ctx: &HandlerContext) -> HandlerResult {
    let filetype = args.str("filetype")?.to_lowercase();
    if filetype != "svg" {
        return Err(OperationError::domain(format!(
            "Unsupported filetype '{}' (supported: svg)",
            filetype
        )));
    }
    let layers = load_layers(args, ctx, false)?;
    let svg = render_svg(
        &layers,
        args.opt_str("title")?,
        args.bool("show_grid")?,
        args.bool("add_legend")?,
    )?;
    let output = with_extension(args.path("filename")?, "svg");
    write_text(&output, &svg)?;
    Ok(Artifact::new(&output, "SVG")
        .with_metadata("layers", layers.len())
        .with_metadata("crs", layers[0].layer.crs.clone())
        .into())
}

fn render_html(
    layers: &[MapLayer],
    title: &str,
    basemap: (&str, &str),
    show_grid: bool,
    add_legend: bool,
    add_minimap: bool,
) -> Result<String, OperationError> {
    let mut overlays = String::new();
    for (i, layer) in layers.iter().enumerate() {
        let collection = serde_json::to_string(&layer.layer.to_collection())
            .map_err(|e| OperationError::internal(e.to_string()))?
            .replace("</", "<\\/");
        let style = json!({
            "color": layer.color,
            "fillColor": layer.fill,
            "fillOpacity": layer.opacity,
            "weight": layer.width,
            "radius": layer.radius,
        });
        let label = json!(layer.label.clone().unwrap_or_else(|| format!("Layer {}", i + 1)));
        let _ = writeln!(
            overlays,
            "addLayer({}, {}, {});",
            collection, style, label
        );
    }

    let legend = if add_legend {
        layers
            .iter()
            .filter_map(|l| l.label.as_deref().map(|label| (label, &l.fill)))
            .map(|(label, color)| {
                format!(
                    "<div><i style=\"background:{};width:14px;height:14px;display:inline-block;margin-right:6px\"></i>{}</div>",
                    escape_xml(color),
                    escape_xml(label)
                )
            })
            .collect::<String>()
    } else {
        String::new()
    };

    let mut head_extra = String::new();
    let mut controls = String::new();
    if show_grid {
        controls.push_str("L.control.scale({position: 'bottomleft'}).addTo(map);\n");
        controls.push_str(
            "map.on('click', function (e) { L.popup().setLatLng(e.latlng).setContent(e.latlng.lat.toFixed(5) + ', ' + e.latlng.lng.toFixed(5)).openOn(map); });\n",
        );
    }
    if add_minimap {
        head_extra.push_str("<link rel=\"stylesheet\" href=\"https://unpkg.com/leaflet-minimap@3.6.1/dist/Control.MiniMap.min.css\"/>\n");
        head_extra.push_str("<script src=\"https://unpkg.com/leaflet-minimap@3.6.1/dist/Control.MiniMap.min.js\"></script>\n");
        let _ = writeln!(
            controls,
            "new L.Control.MiniMap(L.tileLayer({}), {{toggleDisplay: true, position: 'bottomright'}}).addTo(map);",
            json!(basemap.0)
        );
    }

    let title_div = if title.is_empty() {
        String::new()
    } else {
        format!(
            "<div id=\"mapTitle\" style=\"position:fixed;top:10px;left:50%;transform:translateX(-50%);z-index:9999;font-size:20px;font-weight:bold;background:rgba(255,255,255,0.7);padding:5px 10px;border-radius:5px\">{}</div>",
            escape_xml(title)
        )
    };
    let legend_div = if legend.is_empty() {
        String::new()
    } else {
        format!(
            "<div id=\"legend\" style=\"position:fixed;bottom:50px;left:50px;z-index:9999;background:white;border:2px solid grey;padding:10px;font-size:14px\"><b>Legend</b>{}</div>",
            legend
        )
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8"/>
<title>{title}</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0"/>
<link rel="stylesheet" href="https://unpkg.com/leaflet@{leaflet}/dist/leaflet.css"/>
<script src="https://unpkg.com/leaflet@{leaflet}/dist/leaflet.js"></script>
{head_extra}<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
{title_div}
{legend_div}
<script>
var map = L.map('map').setView([20, 0], 2);
L.tileLayer({tiles}, {{attribution: {attribution}}}).addTo(map);
var overlays = {{}};
var extent = L.latLngBounds([]);
function addLayer(data, style, label) {{
  var layer = L.geoJSON(data, {{
    style: function () {{ return style; }},
    pointToLayer: function (feature, latlng) {{ return L.circleMarker(latlng, style); }},
    onEachFeature: function (feature, layer) {{
      var props = feature.properties || {{}};
      var keys = Object.keys(props);
      if (keys.length) {{
        layer.bindTooltip(keys.map(function (k) {{ return k + ': ' + props[k]; }}).join('<br>'));
      }}
    }}
  }}).addTo(map);
  overlays[label] = layer;
  if (layer.getBounds().isValid()) {{ extent.extend(layer.getBounds()); }}
}}
{overlays}if (extent.isValid()) {{ map.fitBounds(extent); }}
L.control.layers(null, overlays).addTo(map);
{controls}</script>
</body>
</html>
"#,
        title = escape_xml(title),
        leaflet = LEAFLET_VERSION,
        head_extra = head_extra,
        title_div = title_div,
        legend_div = legend_div,
        tiles = json!(basemap.0),
        attribution = json!(basemap.1),
        overlays = overlays,
        controls = controls,
    ))
}

fn execute_create_web_map(args: &ToolArguments, ctx: &HandlerContext) -> HandlerResult {
    let basemap_name = args.str("basemap")?;
    let (_, tiles, attribution) = BASEMAPS
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(basemap_name))
        .ok_or_else(|| {
            let known: Vec<&str> = BASEMAPS.iter().map(|(name, _, _)| *name).collect();
            OperationError::domain(format!(
                "Unknown basemap '{}' (supported: {})",
                basemap_name,
                known.join(", ")
            ))
        })?;

    let layers = load_layers(args, ctx, true)?;
    let html = render_html(
        &layers,
        args.str("title")?,
        (tiles, attribution),
        args.bool("show_grid")?,
        args.bool("add_legend")?,
        args.bool("add_minimap")?,
    )?;
    let output = with_extension(args.path("filename")?, "html");
    write_text(&output, &html)?;
    Ok(Artifact::new(&output, "HTML")
        .with_metadata("layers", layers.len())
        .with_metadata("basemap", basemap_name)
        .into())
}
