//! Vector operations over GeoJSON feature layers
//!
//! Inputs are GeoJSON files resolved against the storage root; outputs are
//! written under `outputs/` and reported as artifacts.

pub mod layer;

use std::path::{Path, PathBuf};

use geo::{
    BooleanOps, Centroid, Contains, Distance, Euclidean, Geometry, GeometryCollection, Intersects,
    LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Relate,
};
use geojson::{Feature, JsonObject};
use gis_mcp_application::{
    Artifact, HandlerContext, HandlerResult, OperationDescriptor, OperationError, OperationOutput,
    OperationProvider,
};
use gis_mcp_domain::{
    OperationGroup, ParameterKind, StorageCategory, ToolArguments, ToolDefinition, ToolParameter,
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use self::layer::{FeatureLayer, feature};
use super::projection::crs::Crs;
use super::support::{collapse, geometry_type, to_multi_polygon};

pub use self::layer::DEFAULT_CRS;

/// Tool name constants
pub const READ_FILE_GPD: &str = "read_file_gpd";
pub const WRITE_FILE_GPD: &str = "write_file_gpd";
pub const APPEND_GPD: &str = "append_gpd";
pub const EXPLODE_GPD: &str = "explode_gpd";
pub const DISSOLVE_GPD: &str = "dissolve_gpd";
pub const POINT_IN_POLYGON: &str = "point_in_polygon";
pub const SAVE_RESULTS: &str = "save_results";
pub const MERGE_GPD: &str = "merge_gpd";
pub const OVERLAY_GPD: &str = "overlay_gpd";
pub const CLIP_VECTOR: &str = "clip_vector";
pub const SJOIN_GPD: &str = "sjoin_gpd";
pub const SJOIN_NEAREST_GPD: &str = "sjoin_nearest_gpd";

const GEOJSON_FORMAT: &str = "GeoJSON";
const SAVE_FORMATS: [&str; 2] = ["json", "txt"];
const OVERLAY_MODES: [&str; 5] = [
    "intersection",
    "union",
    "identity",
    "symmetric_difference",
    "difference",
];
const PREDICATES: [&str; 8] = [
    "intersects",
    "within",
    "contains",
    "touches",
    "crosses",
    "overlaps",
    "covers",
    "covered_by",
];

fn input_param(name: &str, description: &str) -> ToolParameter {
    ToolParameter::new(name, description, true).storage_input(None)
}

fn optional_output() -> ToolParameter {
    ToolParameter::new("output_path", "Optional GeoJSON output file", false)
        .storage_output(Some(StorageCategory::Outputs))
}

fn define(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, OperationGroup::Vector)
}

#[derive(Debug, Default, Clone)]
pub struct VectorProvider;

impl VectorProvider {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProvider for VectorProvider {
    fn id(&self) -> &str {
        "vector"
    }

    fn group(&self) -> OperationGroup {
        OperationGroup::Vector
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![
            OperationDescriptor::new(
                define(READ_FILE_GPD, "Read a GeoJSON file and summarize its columns and rows")
                    .with_parameter(input_param("file_path", "GeoJSON file to read")),
                execute_read,
            ),
            OperationDescriptor::new(
                define(WRITE_FILE_GPD, "Write features to a GeoJSON file")
                    .with_parameter(
                        ToolParameter::new("filename", "Output file", true)
                            .storage_output(Some(StorageCategory::Outputs)),
                    )
                    .with_parameter(
                        ToolParameter::new("gdf_path", "Existing GeoJSON file to copy from", false)
                            .storage_input(None),
                    )
                    .with_parameter(
                        ToolParameter::new("geojson", "Inline GeoJSON to write", false)
                            .with_kind(ParameterKind::Mapping),
                    )
                    .with_parameter(
                        ToolParameter::new("driver", "Output driver", false)
                            .with_default(GEOJSON_FORMAT),
                    ),
                execute_write,
            ),
            OperationDescriptor::new(
                define(APPEND_GPD, "Concatenate two layers into one file")
                    .with_parameter(input_param("shapefile1_path", "First layer"))
                    .with_parameter(input_param("shapefile2_path", "Second layer"))
                    .with_parameter(
                        ToolParameter::new("output_path", "Output GeoJSON file", true)
                            .storage_output(Some(StorageCategory::Outputs)),
                    ),
                execute_append,
            ),
            OperationDescriptor::new(
                define(EXPLODE_GPD, "Split multi-part features into single-part features")
                    .with_parameter(input_param("gdf_path", "Input layer"))
                    .with_parameter(optional_output()),
                execute_explode,
            ),
            OperationDescriptor::new(
                define(DISSOLVE_GPD, "Merge features, optionally grouped by an attribute")
                    .with_parameter(input_param("gdf_path", "Input layer"))
                    .with_parameter(
                        ToolParameter::new("by", "Attribute to group by", false)
                            .with_kind(ParameterKind::optional(ParameterKind::String)),
                    )
                    .with_parameter(optional_output()),
                execute_dissolve,
            ),
            OperationDescriptor::new(
                define(
                    POINT_IN_POLYGON,
                    "Join each point to the polygon containing it (left join; non-point features use their centroid)",
                )
                .with_parameter(input_param("points_path", "Point layer"))
                .with_parameter(input_param("polygons_path", "Polygon layer"))
                .with_parameter(optional_output()),
                execute_point_in_polygon,
            ),
            OperationDescriptor::new(
                define(SAVE_RESULTS, "Save arbitrary result data as json and/or txt files")
                    .with_parameter(
                        ToolParameter::new("data", "Data to save", true).with_kind(ParameterKind::Any),
                    )
                    .with_parameter(
                        ToolParameter::new("filename", "Base output file name", true)
                            .storage_output(Some(StorageCategory::Outputs)),
                    )
                    .with_parameter(
                        ToolParameter::new("formats", "Formats to write (json, txt)", false)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::String))
                            .with_default(json!(["json"])),
                    ),
                execute_save_results,
            ),
            OperationDescriptor::new(
                define(
                    MERGE_GPD,
                    "Attribute join of two layers on their common columns, keeping the first layer's geometry",
                )
                .with_parameter(input_param("shapefile1_path", "Left layer"))
                .with_parameter(input_param("shapefile2_path", "Right layer (geometry ignored)"))
                .with_parameter(
                    ToolParameter::new("output_path", "Output GeoJSON file", true)
                        .storage_output(Some(StorageCategory::Outputs)),
                ),
                execute_merge,
            ),
            OperationDescriptor::new(
                define(OVERLAY_GPD, "Polygon overlay of two layers")
                    .with_parameter(input_param("gdf1_path", "First polygon layer"))
                    .with_parameter(input_param("gdf2_path", "Second polygon layer"))
                    .with_parameter(
                        ToolParameter::new(
                            "how",
                            "intersection, union, identity, symmetric_difference or difference",
                            false,
                        )
                        .with_default("intersection"),
                    )
                    .with_parameter(optional_output()),
                execute_overlay,
            ),
            OperationDescriptor::new(
                define(CLIP_VECTOR, "Clip a layer to the union of a polygon mask layer")
                    .with_parameter(input_param("gdf_path", "Layer to clip"))
                    .with_parameter(input_param("clip_path", "Polygon mask layer"))
                    .with_parameter(optional_output()),
                execute_clip,
            ),
            OperationDescriptor::new(
                define(SJOIN_GPD, "Spatial join of two layers by a topological predicate")
                    .with_parameter(input_param("left_path", "Left layer"))
                    .with_parameter(input_param("right_path", "Right layer"))
                    .with_parameter(
                        ToolParameter::new("how", "inner, left or right", false)
                            .with_default("inner"),
                    )
                    .with_parameter(
                        ToolParameter::new("predicate", "Predicate tested as predicate(left, right)", false)
                            .with_default("intersects"),
                    )
                    .with_parameter(optional_output()),
                execute_sjoin,
            ),
            OperationDescriptor::new(
                define(SJOIN_NEAREST_GPD, "Join each feature to its nearest features in another layer")
                    .with_parameter(input_param("left_path", "Left layer"))
                    .with_parameter(input_param("right_path", "Right layer"))
                    .with_parameter(
                        ToolParameter::new("how", "left or right", false).with_default("left"),
                    )
                    .with_parameter(
                        ToolParameter::new("max_distance", "Ignore matches farther than this", false)
                            .with_kind(ParameterKind::optional(ParameterKind::Number)),
                    )
                    .with_parameter(
                        ToolParameter::new("distance_col", "Column receiving the match distance", false)
                            .with_kind(ParameterKind::optional(ParameterKind::String)),
                    )
                    .with_parameter(optional_output()),
                execute_sjoin_nearest,
            ),
        ]
    }
}

/// Summary of a layer written to `path`
fn layer_artifact(layer: &FeatureLayer, path: &Path) -> Result<Artifact, OperationError> {
    let mut artifact = Artifact::new(path, GEOJSON_FORMAT);
    artifact.metadata = layer.summary()?;
    Ok(artifact)
}

/// Summary and preview of a derived layer, written out when a path is given
fn layer_result(layer: &FeatureLayer, output: Option<PathBuf>) -> HandlerResult {
    let mut data = layer.summary()?;
    data.insert("preview".to_string(), json!(layer.preview()?));
    let output_path = match output {
        Some(path) => {
            layer.write(&path)?;
            Some(path.display().to_string())
        }
        None => None,
    };
    data.insert("output_path".to_string(), json!(output_path));
    Ok(Value::Object(data).into())
}

fn execute_read(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = FeatureLayer::read(&args.path("file_path")?)?;
    let mut column_types = layer.column_types();
    column_types.insert("geometry".to_string(), "geometry");
    let columns = layer.columns();
    Ok(json!({
        "columns": columns,
        "column_types": column_types,
        "num_rows": layer.len(),
        "num_columns": columns.len(),
        "crs": layer.crs,
        "bounds": layer.bounds()?,
        "preview": layer.preview()?,
    })
    .into())
}

fn execute_write(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let driver = args.str("driver")?;
    if !driver.eq_ignore_ascii_case(GEOJSON_FORMAT) {
        return Err(OperationError::domain(format!(
            "Unsupported driver '{}' (supported: {})",
            driver, GEOJSON_FORMAT
        )));
    }
    let output = args.path("filename")?;
    let layer = match (args.opt_path("gdf_path")?, args.opt_object("geojson")?) {
        (Some(_), Some(_)) => {
            return Err(OperationError::domain(
                "Provide either 'gdf_path' or 'geojson', not both",
            ));
        }
        (Some(source), None) => FeatureLayer::read(&source)?,
        (None, Some(inline)) => FeatureLayer::from_json(Value::Object(inline.clone()))?,
        (None, None) => FeatureLayer::new(Vec::new()),
    };
    layer.write(&output)?;
    debug!(path = %output.display(), features = layer.len(), "Wrote feature layer");
    Ok(layer_artifact(&layer, &output)?.into())
}

fn execute_append(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let first = FeatureLayer::read(&args.path("shapefile1_path")?)?;
    let second = FeatureLayer::read(&args.path("shapefile2_path")?)?;
    if first.crs != second.crs {
        return Err(OperationError::domain(format!(
            "CRS mismatch: {} vs {}",
            first.crs, second.crs
        )));
    }
    let output = args.path("output_path")?;
    let mut merged = FeatureLayer::new(first.features);
    merged.crs = first.crs;
    merged.features.extend(second.features);
    merged.write(&output)?;
    Ok(layer_artifact(&merged, &output)?.into())
}

fn execute_explode(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let source = FeatureLayer::read(&args.path("gdf_path")?)?;
    let mut exploded = Vec::with_capacity(source.len());
    for feature_in in &source.features {
        let properties = feature_in.properties.clone().unwrap_or_default();
        match FeatureLayer::geometry(feature_in)? {
            Some(geometry) => {
                for part in parts(geometry) {
                    exploded.push(feature(Some(&part), properties.clone()));
                }
            }
            None => exploded.push(feature(None, properties)),
        }
    }
    let mut layer = FeatureLayer::new(exploded);
    layer.crs = source.crs;
    layer_result(&layer, args.opt_path("output_path")?)
}

fn parts(geometry: Geometry<f64>) -> Vec<Geometry<f64>> {
    match geometry {
        Geometry::MultiPoint(mp) => mp.0.into_iter().map(Geometry::Point).collect(),
        Geometry::MultiLineString(mls) => mls.0.into_iter().map(Geometry::LineString).collect(),
        Geometry::MultiPolygon(mp) => mp.0.into_iter().map(Geometry::Polygon).collect(),
        Geometry::GeometryCollection(gc) => gc.0.into_iter().flat_map(parts).collect(),
        single => vec![single],
    }
}

fn execute_dissolve(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let source = FeatureLayer::read(&args.path("gdf_path")?)?;
    let by = args.opt_str("by")?;

    // group key -> (first row's properties, member geometries)
    let mut groups: indexmap::IndexMap<String, (JsonObject, Vec<Geometry<f64>>)> =
        indexmap::IndexMap::new();
    for feature_in in &source.features {
        let properties = feature_in.properties.clone().unwrap_or_default();
        let key = match by {
            Some(column) => {
                let value = properties.get(column).ok_or_else(|| {
                    OperationError::domain(format!("Column '{}' not found", column))
                })?;
                value.to_string()
            }
            None => String::new(),
        };
        let entry = groups.entry(key).or_insert_with(|| (properties, Vec::new()));
        if let Some(geometry) = FeatureLayer::geometry(feature_in)? {
            entry.1.push(geometry);
        }
    }

    let mut dissolved = Vec::with_capacity(groups.len());
    for (_, (properties, geometries)) in groups {
        let merged = merge_geometries(geometries)?;
        dissolved.push(feature(merged.as_ref(), properties));
    }
    let mut layer = FeatureLayer::new(dissolved);
    layer.crs = source.crs;
    layer_result(&layer, args.opt_path("output_path")?)
}

/// Union for areas, multi-geometry for points and lines
fn merge_geometries(geometries: Vec<Geometry<f64>>) -> Result<Option<Geometry<f64>>, OperationError> {
    if geometries.is_empty() {
        return Ok(None);
    }
    if geometries.iter().all(|g| to_multi_polygon(g).is_ok()) {
        let mut union = MultiPolygon::<f64>::new(Vec::new());
        for geometry in &geometries {
            union = union.union(&to_multi_polygon(geometry)?);
        }
        return Ok(Some(Geometry::MultiPolygon(union)));
    }
    let exploded: Vec<Geometry<f64>> = geometries.into_iter().flat_map(parts).collect();
    if exploded.iter().all(|g| matches!(g, Geometry::Point(_))) {
        let points = exploded
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Point(p) => Some(p),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Ok(Some(Geometry::MultiPoint(MultiPoint::new(points))));
    }
    if exploded.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        let lines = exploded
            .into_iter()
            .filter_map(|g| match g {
                Geometry::LineString(l) => Some(l),
                _ => None,
            })
            .collect::<Vec<_>>();
        return Ok(Some(Geometry::MultiLineString(MultiLineString::new(lines))));
    }
    Ok(Some(Geometry::GeometryCollection(GeometryCollection(exploded))))
}

/// Column layout of a two-layer join; names present on both sides get a suffix
struct JoinColumns {
    left: Vec<(String, String)>,
    right: Vec<(String, String)>,
}

impl JoinColumns {
    fn new(left: &FeatureLayer, right: &FeatureLayer, suffixes: (&str, &str)) -> Self {
        let left_names: Vec<String> = left.column_types().into_keys().collect();
        let right_names: Vec<String> = right.column_types().into_keys().collect();
        let rename = |names: &[String], other: &[String], suffix: &str| -> Vec<(String, String)> {
            names
                .iter()
                .map(|name| {
                    let output = if other.contains(name) {
                        format!("{}{}", name, suffix)
                    } else {
                        name.clone()
                    };
                    (name.clone(), output)
                })
                .collect()
        };
        Self {
            left: rename(&left_names, &right_names, suffixes.0),
            right: rename(&right_names, &left_names, suffixes.1),
        }
    }

    /// One output row; a missing side contributes nulls
    fn row(&self, left: Option<&JsonObject>, right: Option<&JsonObject>) -> JsonObject {
        let mut properties = JsonObject::new();
        for (columns, source) in [(&self.left, left), (&self.right, right)] {
            for (name, output) in columns {
                let value = source
                    .and_then(|props| props.get(name).cloned())
                    .unwrap_or(Value::Null);
                properties.insert(output.clone(), value);
            }
        }
        properties
    }
}

fn properties(item: &Feature) -> JsonObject {
    item.properties.clone().unwrap_or_default()
}

/// Reproject `right` into the CRS of `left` when they differ
fn align(left: &FeatureLayer, right: &mut FeatureLayer) -> Result<(), OperationError> {
    if left.crs != right.crs {
        let target: Crs = left.crs.parse()?;
        debug!(from = %right.crs, to = %left.crs, "Reprojecting right layer");
        right.to_crs(&target)?;
    }
    Ok(())
}

/// Every feature as a polygon area, naming the layer in the error
fn polygon_areas(
    layer: &FeatureLayer,
    role: &str,
) -> Result<Vec<Option<MultiPolygon<f64>>>, OperationError> {
    let mut areas = Vec::with_capacity(layer.len());
    for (index, item) in layer.features.iter().enumerate() {
        let area = match FeatureLayer::geometry(item)? {
            Some(geometry) => Some(to_multi_polygon(&geometry).map_err(|_| {
                OperationError::domain(format!(
                    "{} layer feature {} is a {}; polygons are required",
                    role,
                    index,
                    geometry_type(&geometry)
                ))
            })?),
            None => None,
        };
        areas.push(area);
    }
    Ok(areas)
}

fn union_all<'a>(areas: impl Iterator<Item = &'a MultiPolygon<f64>>) -> MultiPolygon<f64> {
    areas.fold(MultiPolygon::new(Vec::new()), |acc, area| acc.union(area))
}

fn with_count(mut output: OperationOutput, key: &str, count: usize) -> HandlerResult {
    if let OperationOutput::Value(Value::Object(data)) = &mut output {
        data.insert(key.to_string(), json!(count));
    }
    Ok(output)
}

fn execute_point_in_polygon(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let points = FeatureLayer::read(&args.path("points_path")?)?;
    let polygons = FeatureLayer::read(&args.path("polygons_path")?)?;
    if points.crs != polygons.crs {
        return Err(OperationError::domain(format!(
            "CRS mismatch: {} vs {}",
            points.crs, polygons.crs
        )));
    }

    let areas = polygon_areas(&polygons, "Polygon")?;
    let columns = JoinColumns::new(&points, &polygons, ("_left", "_right"));

    let mut joined: Vec<Feature> = Vec::with_capacity(points.len());
    let mut matched = 0usize;
    for point_feature in &points.features {
        let geometry = FeatureLayer::geometry(point_feature)?;
        let location: Option<Point<f64>> = geometry.as_ref().and_then(|g| match g {
            Geometry::Point(p) => Some(*p),
            other => other.centroid(),
        });
        let hit = location.and_then(|p| {
            areas
                .iter()
                .position(|area| area.as_ref().is_some_and(|a| a.contains(&p)))
        });
        if hit.is_some() {
            matched += 1;
        }

        let left = properties(point_feature);
        let right = hit.map(|i| properties(&polygons.features[i]));
        let mut row = columns.row(Some(&left), right.as_ref());
        row.insert("index_right".to_string(), json!(hit));
        joined.push(feature(geometry.as_ref(), row));
    }

    let mut layer = FeatureLayer::new(joined);
    layer.crs = points.crs;
    with_count(layer_result(&layer, args.opt_path("output_path")?)?, "matched", matched)
}

fn execute_merge(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let left = FeatureLayer::read(&args.path("shapefile1_path")?)?;
    let right = FeatureLayer::read(&args.path("shapefile2_path")?)?;
    let right_columns = right.column_types();
    let on: Vec<String> = left
        .column_types()
        .into_keys()
        .filter(|c| right_columns.contains_key(c))
        .collect();
    if on.is_empty() {
        return Err(OperationError::domain(
            "The layers share no attribute columns to merge on",
        ));
    }

    let key = |props: &JsonObject| -> Vec<Value> {
        on.iter()
            .map(|c| props.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    };
    let mut merged = Vec::new();
    for left_feature in &left.features {
        let left_props = properties(left_feature);
        let left_key = key(&left_props);
        for right_feature in &right.features {
            let right_props = properties(right_feature);
            if key(&right_props) != left_key {
                continue;
            }
            let mut row = left_props.clone();
            for (column, value) in right_props {
                row.entry(column).or_insert(value);
            }
            merged.push(feature(FeatureLayer::geometry(left_feature)?.as_ref(), row));
        }
    }
    if merged.is_empty() {
        warn!("The merge result is empty; no matching records were found");
    }

    let output = args.path("output_path")?;
    let mut layer = FeatureLayer::new(merged);
    layer.crs = left.crs;
    layer.write(&output)?;
    let mut artifact = layer_artifact(&layer, &output)?;
    artifact.metadata.insert("merged_on".to_string(), json!(on));
    Ok(artifact.into())
}

fn execute_overlay(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let how = args.str("how")?;
    if !OVERLAY_MODES.contains(&how) {
        return Err(OperationError::domain(format!(
            "Unsupported overlay '{}' (supported: {})",
            how,
            OVERLAY_MODES.join(", ")
        )));
    }
    let first = FeatureLayer::read(&args.path("gdf1_path")?)?;
    let mut second = FeatureLayer::read(&args.path("gdf2_path")?)?;
    align(&first, &mut second)?;
    let first_areas = polygon_areas(&first, "First")?;
    let second_areas = polygon_areas(&second, "Second")?;
    let columns = JoinColumns::new(&first, &second, ("_1", "_2"));

    let mut features = Vec::new();
    let mut push = |area: MultiPolygon<f64>, props: JsonObject| {
        if !area.0.is_empty() {
            features.push(feature(Some(&collapse(area)), props));
        }
    };

    if matches!(how, "intersection" | "union" | "identity") {
        for (i, a) in first_areas.iter().enumerate() {
            let Some(a) = a else { continue };
            let left = properties(&first.features[i]);
            for (j, b) in second_areas.iter().enumerate() {
                let Some(b) = b else { continue };
                let right = properties(&second.features[j]);
                push(a.intersection(b), columns.row(Some(&left), Some(&right)));
            }
        }
    }
    if how != "intersection" {
        let mask = union_all(second_areas.iter().flatten());
        for (i, a) in first_areas.iter().enumerate() {
            let Some(a) = a else { continue };
            let left = properties(&first.features[i]);
            let row = if how == "difference" {
                left
            } else {
                columns.row(Some(&left), None)
            };
            push(a.difference(&mask), row);
        }
    }
    if matches!(how, "union" | "symmetric_difference") {
        let mask = union_all(first_areas.iter().flatten());
        for (j, b) in second_areas.iter().enumerate() {
            let Some(b) = b else { continue };
            let right = properties(&second.features[j]);
            push(b.difference(&mask), columns.row(None, Some(&right)));
        }
    }

    let mut layer = FeatureLayer::new(features);
    layer.crs = first.crs;
    layer_result(&layer, args.opt_path("output_path")?)
}

fn execute_clip(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let source = FeatureLayer::read(&args.path("gdf_path")?)?;
    let mut mask_layer = FeatureLayer::read(&args.path("clip_path")?)?;
    align(&source, &mut mask_layer)?;
    let mask = union_all(polygon_areas(&mask_layer, "Clip")?.iter().flatten());

    let mut clipped = Vec::new();
    for item in &source.features {
        let Some(geometry) = FeatureLayer::geometry(item)? else {
            continue;
        };
        if let Some(part) = clip_geometry(&geometry, &mask)? {
            clipped.push(feature(Some(&part), properties(item)));
        }
    }
    let mut layer = FeatureLayer::new(clipped);
    layer.crs = source.crs;
    layer_result(&layer, args.opt_path("output_path")?)
}

/// The part of `geometry` inside `mask`, `None` when nothing remains
fn clip_geometry(
    geometry: &Geometry<f64>,
    mask: &MultiPolygon<f64>,
) -> Result<Option<Geometry<f64>>, OperationError> {
    let lines = |lines: Vec<LineString<f64>>| {
        let kept = mask.clip(&MultiLineString::new(lines), false);
        match kept.0.len() {
            0 => None,
            1 => kept.0.into_iter().next().map(Geometry::LineString),
            _ => Some(Geometry::MultiLineString(kept)),
        }
    };
    Ok(match geometry {
        Geometry::Point(p) => mask.intersects(p).then_some(Geometry::Point(*p)),
        Geometry::MultiPoint(mp) => {
            let kept: Vec<Point<f64>> = mp.iter().filter(|p| mask.intersects(*p)).copied().collect();
            (!kept.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(kept)))
        }
        Geometry::Line(line) => lines(vec![LineString::from(*line)]),
        Geometry::LineString(ls) => lines(vec![ls.clone()]),
        Geometry::MultiLineString(mls) => lines(mls.0.clone()),
        Geometry::GeometryCollection(gc) => {
            let mut kept = Vec::new();
            for part in gc.iter() {
                kept.extend(clip_geometry(part, mask)?);
            }
            (!kept.is_empty()).then(|| Geometry::GeometryCollection(GeometryCollection(kept)))
        }
        area => {
            let inside = to_multi_polygon(area)?.intersection(mask);
            (!inside.0.is_empty()).then(|| collapse(inside))
        }
    })
}

fn predicate_holds(predicate: &str, left: &Geometry<f64>, right: &Geometry<f64>) -> bool {
    let matrix = left.relate(right);
    match predicate {
        "within" => matrix.is_within(),
        "contains" => matrix.is_contains(),
        "touches" => matrix.is_touches(),
        "crosses" => matrix.is_crosses(),
        "overlaps" => matrix.is_overlaps(),
        "covers" => matrix.is_covers(),
        "covered_by" => matrix.is_coveredby(),
        _ => matrix.is_intersects(),
    }
}

fn join_how<'a>(args: &'a ToolArguments, allowed: &[&str]) -> Result<&'a str, OperationError> {
    let how = args.str("how")?;
    if allowed.contains(&how) {
        Ok(how)
    } else {
        Err(OperationError::domain(format!(
            "Unsupported join '{}' (supported: {})",
            how,
            allowed.join(", ")
        )))
    }
}

/// Join driver shared by both spatial joins: `matches(i)` lists the other
/// layer's features matched by feature `i` of the preserved layer
struct JoinSides {
    left: FeatureLayer,
    right: FeatureLayer,
    left_geometries: Vec<Option<Geometry<f64>>>,
    right_geometries: Vec<Option<Geometry<f64>>>,
}

impl JoinSides {
    fn read(args: &ToolArguments) -> Result<Self, OperationError> {
        let left = FeatureLayer::read(&args.path("left_path")?)?;
        let mut right = FeatureLayer::read(&args.path("right_path")?)?;
        align(&left, &mut right)?;
        Ok(Self {
            left_geometries: left.geometries()?,
            right_geometries: right.geometries()?,
            left,
            right,
        })
    }

    /// Rows for `how`; `keep_unmatched` preserves rows of the driving side
    /// that found no partner
    fn join(
        &self,
        how: &str,
        keep_unmatched: bool,
        mut matches: impl FnMut(&Geometry<f64>, &[Option<Geometry<f64>>]) -> Vec<(usize, f64)>,
        distance_col: Option<&str>,
    ) -> (FeatureLayer, usize) {
        let columns = JoinColumns::new(&self.left, &self.right, ("_left", "_right"));
        let right_driven = how == "right";
        let (driver, driver_geometries, other, other_geometries, index_key) = if right_driven {
            (&self.right, &self.right_geometries, &self.left, &self.left_geometries, "index_left")
        } else {
            (&self.left, &self.left_geometries, &self.right, &self.right_geometries, "index_right")
        };

        let mut rows = Vec::new();
        let mut matched = 0usize;
        for (i, item) in driver.features.iter().enumerate() {
            let geometry = driver_geometries[i].as_ref();
            let hits = geometry
                .map(|g| matches(g, other_geometries.as_slice()))
                .unwrap_or_default();
            if !hits.is_empty() {
                matched += 1;
            }
            let own = properties(item);
            let mut emit = |hit: Option<(usize, f64)>| {
                let partner = hit.map(|(j, _)| properties(&other.features[j]));
                let mut row = if right_driven {
                    columns.row(partner.as_ref(), Some(&own))
                } else {
                    columns.row(Some(&own), partner.as_ref())
                };
                row.insert(index_key.to_string(), json!(hit.map(|(j, _)| j)));
                if let Some(column) = distance_col {
                    row.insert(column.to_string(), json!(hit.map(|(_, d)| d)));
                }
                rows.push(feature(geometry, row));
            };
            if hits.is_empty() {
                if keep_unmatched {
                    emit(None);
                }
            } else {
                for hit in hits {
                    emit(Some(hit));
                }
            }
        }
        let mut layer = FeatureLayer::new(rows);
        layer.crs = driver.crs.clone();
        (layer, matched)
    }
}

fn execute_sjoin(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let how = join_how(args, &["inner", "left", "right"])?;
    let predicate = args.str("predicate")?;
    if !PREDICATES.contains(&predicate) {
        return Err(OperationError::domain(format!(
            "Unsupported predicate '{}' (supported: {})",
            predicate,
            PREDICATES.join(", ")
        )));
    }
    let sides = JoinSides::read(args)?;
    let right_driven = how == "right";
    let (layer, matched) = sides.join(
        how,
        how != "inner",
        |geometry, others| {
            others
                .iter()
                .enumerate()
                .filter_map(|(j, other)| {
                    let other = other.as_ref()?;
                    let holds = if right_driven {
                        predicate_holds(predicate, other, geometry)
                    } else {
                        predicate_holds(predicate, geometry, other)
                    };
                    holds.then_some((j, 0.0))
                })
                .collect()
        },
        None,
    );
    with_count(layer_result(&layer, args.opt_path("output_path")?)?, "matched", matched)
}

fn execute_sjoin_nearest(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let how = join_how(args, &["left", "right"])?;
    let max_distance = args.opt_f64("max_distance")?;
    if max_distance.is_some_and(|d| !d.is_finite() || d < 0.0) {
        return Err(OperationError::domain("'max_distance' must be a non-negative number"));
    }
    let sides = JoinSides::read(args)?;
    let (layer, matched) = sides.join(
        how,
        true,
        |geometry, others| {
            let distances: Vec<(usize, f64)> = others
                .iter()
                .enumerate()
                .filter_map(|(j, other)| Some((j, Euclidean.distance(geometry, other.as_ref()?))))
                .filter(|(_, d)| max_distance.is_none_or(|max| *d <= max))
                .collect();
            let nearest = distances.iter().map(|(_, d)| *d).fold(f64::INFINITY, f64::min);
            // every equidistant feature is a match
            distances.into_iter().filter(|(_, d)| *d == nearest).collect()
        },
        args.opt_str("distance_col")?,
    );
    with_count(layer_result(&layer, args.opt_path("output_path")?)?, "matched", matched)
}

fn execute_save_results(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let data = args
        .get("data")
        .cloned()
        .ok_or_else(|| OperationError::internal("'data' missing after validation"))?;
    let requested = args.str_list("formats")?;
    if requested.is_empty() {
        return Err(OperationError::domain("'formats' must not be empty"));
    }
    let mut formats = Vec::new();
    for format in &requested {
        let format = format.trim().to_lowercase();
        if !SAVE_FORMATS.contains(&format.as_str()) {
            return Err(OperationError::domain(format!(
                "Unsupported format '{}' (supported: {})",
                format,
                SAVE_FORMATS.join(", ")
            )));
        }
        if !formats.contains(&format) {
            formats.push(format);
        }
    }

    let target = args.path("filename")?;
    let base = match target.extension().and_then(|e| e.to_str()) {
        Some(ext) if SAVE_FORMATS.contains(&ext.to_lowercase().as_str()) => {
            target.with_extension("")
        }
        _ => target.clone(),
    };

    let mut artifacts = Vec::with_capacity(formats.len());
    for format in formats {
        let mut path = base.clone().into_os_string();
        path.push(".");
        path.push(&format);
        let path = PathBuf::from(path);
        let content = match format.as_str() {
            "json" => serde_json::to_string_pretty(&data)
                .map_err(|e| OperationError::internal(e.to_string()))?,
            _ => render_text(&data),
        };
        std::fs::write(&path, content).map_err(|e| OperationError::io("Failed to write", &path, e))?;
        artifacts.push(Artifact::new(path, format));
    }
    Ok(OperationOutput::Artifacts(artifacts))
}

/// `key: value` lines for objects, plain text otherwise
fn render_text(data: &Value) -> String {
    match data {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}: {}", key, s),
                other => format!("{}: {}", key, other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStorageResolver;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        ctx: HandlerContext,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let ctx = HandlerContext::new(Arc::new(FsStorageResolver::new(&root)));
        std::fs::create_dir_all(root.join("outputs")).unwrap();
        Fixture {
            _dir: dir,
            root,
            ctx,
        }
    }

    fn call(fx: &Fixture, name: &str, args: ToolArguments) -> HandlerResult {
        VectorProvider::new()
            .operations()
            .into_iter()
            .find(|d| d.name() == name)
            .unwrap()
            .handler
            .call(&args, &fx.ctx)
    }

    fn write_json(fx: &Fixture, name: &str, value: Value) -> String {
        let path = fx.root.join(name);
        std::fs::write(&path, value.to_string()).unwrap();
        path.display().to_string()
    }

    fn points() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"id": 1, "name": "inside"},
                 "geometry": {"type": "Point", "coordinates": [0.5, 0.5]}},
                {"type": "Feature", "properties": {"id": 2, "name": "outside"},
                 "geometry": {"type": "Point", "coordinates": [5.0, 5.0]}}
            ]
        })
    }

    fn zones() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"zone": "A", "name": "north"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]]}},
                {"type": "Feature", "properties": {"zone": "A", "name": "south"},
                 "geometry": {"type": "Polygon", "coordinates": [[[1.0,0.0],[2.0,0.0],[2.0,1.0],[1.0,1.0],[1.0,0.0]]]}},
                {"type": "Feature", "properties": {"zone": "B", "name": "east"},
                 "geometry": {"type": "MultiPolygon", "coordinates": [
                     [[[10.0,0.0],[11.0,0.0],[11.0,1.0],[10.0,1.0],[10.0,0.0]]],
                     [[[12.0,0.0],[13.0,0.0],[13.0,1.0],[12.0,1.0],[12.0,0.0]]]
                 ]}}
            ]
        })
    }

    #[test]
    fn test_read_file_summary() {
        let fx = fixture();
        let path = write_json(&fx, "points.geojson", points());
        let data = call(&fx, READ_FILE_GPD, ToolArguments::new().with("file_path", path))
            .unwrap()
            .into_data();
        assert_eq!(data["num_rows"], 2);
        assert_eq!(data["num_columns"], 3);
        assert_eq!(data["column_types"]["id"], "int64");
        assert_eq!(data["column_types"]["geometry"], "geometry");
        assert_eq!(data["crs"], DEFAULT_CRS);
        assert_eq!(data["preview"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_read_missing_file_is_domain_error() {
        let fx = fixture();
        let missing = fx.root.join("nope.geojson").display().to_string();
        let result = call(&fx, READ_FILE_GPD, ToolArguments::new().with("file_path", missing));
        assert!(matches!(result, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_write_empty_and_inline_layers() {
        let fx = fixture();
        let output = fx.root.join("outputs").join("test.geojson");
        let data = call(
            &fx,
            WRITE_FILE_GPD,
            ToolArguments::new()
                .with("filename", output.display().to_string())
                .with("driver", "GeoJSON"),
        )
        .unwrap()
        .into_data();
        assert!(output.is_file());
        assert_eq!(data["path"], output.display().to_string());
        assert_eq!(data["num_features"], 0);

        let inline = points().as_object().unwrap().clone();
        let data = call(
            &fx,
            WRITE_FILE_GPD,
            ToolArguments::new()
                .with("filename", output.display().to_string())
                .with("geojson", Value::Object(inline))
                .with("driver", "geojson"),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["num_features"], 2);

        let bad = call(
            &fx,
            WRITE_FILE_GPD,
            ToolArguments::new()
                .with("filename", output.display().to_string())
                .with("driver", "ESRI Shapefile"),
        );
        assert!(matches!(bad, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_append_layers() {
        let fx = fixture();
        let a = write_json(&fx, "a.geojson", points());
        let b = write_json(&fx, "b.geojson", zones());
        let output = fx.root.join("outputs").join("merged.geojson");
        let data = call(
            &fx,
            APPEND_GPD,
            ToolArguments::new()
                .with("shapefile1_path", a)
                .with("shapefile2_path", b)
                .with("output_path", output.display().to_string()),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["num_features"], 5);
        assert_eq!(FeatureLayer::read(&output).unwrap().len(), 5);
    }

    #[test]
    fn test_explode_multipart() {
        let fx = fixture();
        let path = write_json(&fx, "zones.geojson", zones());
        let data = call(&fx, EXPLODE_GPD, ToolArguments::new().with("gdf_path", path))
            .unwrap()
            .into_data();
        assert_eq!(data["num_features"], 4);
        assert!(data["output_path"].is_null());
    }

    #[test]
    fn test_dissolve_by_attribute() {
        let fx = fixture();
        let path = write_json(&fx, "zones.geojson", zones());
        let output = fx.root.join("outputs").join("dissolved.geojson");
        let data = call(
            &fx,
            DISSOLVE_GPD,
            ToolArguments::new()
                .with("gdf_path", path.clone())
                .with("by", "zone")
                .with("output_path", output.display().to_string()),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["num_features"], 2);
        assert!(output.is_file());

        let missing = call(
            &fx,
            DISSOLVE_GPD,
            ToolArguments::new().with("gdf_path", path).with("by", "nope"),
        );
        assert!(matches!(missing, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_point_in_polygon_left_join() {
        let fx = fixture();
        let pts = write_json(&fx, "points.geojson", points());
        let polys = write_json(&fx, "zones.geojson", zones());
        let data = call(
            &fx,
            POINT_IN_POLYGON,
            ToolArguments::new()
                .with("points_path", pts)
                .with("polygons_path", polys),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["num_features"], 2);
        assert_eq!(data["matched"], 1);
        let preview = data["preview"].as_array().unwrap();
        assert_eq!(preview[0]["zone"], "A");
        assert_eq!(preview[0]["name_left"], "inside");
        assert_eq!(preview[0]["name_right"], "north");
        assert_eq!(preview[0]["index_right"], 0);
        assert!(preview[1]["zone"].is_null());
    }

    #[test]
    fn test_save_results_multiple_formats() {
        let fx = fixture();
        let base = fx.root.join("outputs").join("stats");
        let output = call(
            &fx,
            SAVE_RESULTS,
            ToolArguments::new()
                .with("data", json!({"mean": 2.5, "label": "x"}))
                .with("filename", base.display().to_string())
                .with("formats", json!(["json", "txt", "json"])),
        )
        .unwrap();
        let OperationOutput::Artifacts(artifacts) = output else {
            panic!("expected artifacts")
        };
        assert_eq!(artifacts.len(), 2);
        let txt = std::fs::read_to_string(base.with_extension("txt")).unwrap();
        assert!(txt.contains("label: x"));
        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(base.with_extension("json")).unwrap())
                .unwrap();
        assert_eq!(json["mean"], 2.5);

        let bad = call(
            &fx,
            SAVE_RESULTS,
            ToolArguments::new()
                .with("data", json!(1))
                .with("filename", base.display().to_string())
                .with("formats", json!(["xlsx"])),
        );
        assert!(matches!(bad, Err(OperationError::Domain(_))));
    }

    fn squares() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"kind": "X", "name": "overlap"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0.5,0.0],[1.5,0.0],[1.5,1.0],[0.5,1.0],[0.5,0.0]]]}}
            ]
        })
    }

    fn overlay(fx: &Fixture, how: &str) -> HandlerResult {
        let zones = write_json(fx, "zones.geojson", zones());
        let squares = write_json(fx, "squares.geojson", squares());
        call(
            fx,
            OVERLAY_GPD,
            ToolArguments::new()
                .with("gdf1_path", zones)
                .with("gdf2_path", squares)
                .with("how", how),
        )
    }

    #[test]
    fn test_overlay_modes() {
        let fx = fixture();
        let counts = [
            ("intersection", 2),
            ("difference", 3),
            ("union", 5),
            ("symmetric_difference", 3),
            ("identity", 5),
        ];
        for (how, expected) in counts {
            let data = overlay(&fx, how).unwrap().into_data();
            assert_eq!(data["num_features"], expected, "{}", how);
        }

        let data = overlay(&fx, "intersection").unwrap().into_data();
        let preview = data["preview"].as_array().unwrap();
        assert_eq!(preview[0]["name_1"], "north");
        assert_eq!(preview[0]["name_2"], "overlap");
        assert_eq!(preview[1]["kind"], "X");

        assert!(matches!(overlay(&fx, "merge"), Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_overlay_rejects_points() {
        let fx = fixture();
        let pts = write_json(&fx, "points.geojson", points());
        let squares = write_json(&fx, "squares.geojson", squares());
        let result = call(
            &fx,
            OVERLAY_GPD,
            ToolArguments::new()
                .with("gdf1_path", pts)
                .with("gdf2_path", squares)
                .with("how", "intersection"),
        );
        assert!(matches!(result, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_clip_points_lines_and_polygons() {
        let fx = fixture();
        let mask = write_json(&fx, "zones.geojson", zones());
        let pts = write_json(&fx, "points.geojson", points());
        let data = call(
            &fx,
            CLIP_VECTOR,
            ToolArguments::new().with("gdf_path", pts).with("clip_path", mask.clone()),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["num_features"], 1);
        assert_eq!(data["preview"][0]["name"], "inside");

        let road = write_json(
            &fx,
            "road.geojson",
            json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"road": "main"},
                     "geometry": {"type": "LineString", "coordinates": [[-1.0, 0.5], [3.0, 0.5]]}},
                    {"type": "Feature", "properties": {"road": "far"},
                     "geometry": {"type": "LineString", "coordinates": [[0.0, 5.0], [2.0, 5.0]]}}
                ]
            }),
        );
        let output = fx.root.join("outputs").join("road.geojson");
        call(
            &fx,
            CLIP_VECTOR,
            ToolArguments::new()
                .with("gdf_path", road)
                .with("clip_path", mask)
                .with("output_path", output.display().to_string()),
        )
        .unwrap();
        let clipped = FeatureLayer::read(&output).unwrap();
        assert_eq!(clipped.len(), 1);
        let geometry = FeatureLayer::geometry(&clipped.features[0]).unwrap().unwrap();
        let [min_x, _, max_x, _] = super::super::support::bounds(&geometry).unwrap();
        assert!(min_x.abs() < 1e-9 && (max_x - 2.0).abs() < 1e-9);

        let squares = write_json(&fx, "squares.geojson", squares());
        let zones_path = write_json(&fx, "zones.geojson", zones());
        let data = call(
            &fx,
            CLIP_VECTOR,
            ToolArguments::new().with("gdf_path", zones_path).with("clip_path", squares),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["num_features"], 2);
    }

    fn sjoin(fx: &Fixture, how: &str, predicate: &str) -> HandlerResult {
        let pts = write_json(fx, "points.geojson", points());
        let polys = write_json(fx, "zones.geojson", zones());
        call(
            fx,
            SJOIN_GPD,
            ToolArguments::new()
                .with("left_path", pts)
                .with("right_path", polys)
                .with("how", how)
                .with("predicate", predicate),
        )
    }

    #[test]
    fn test_sjoin_how_variants() {
        let fx = fixture();
        let inner = sjoin(&fx, "inner", "intersects").unwrap().into_data();
        assert_eq!(inner["num_features"], 1);
        assert_eq!(inner["preview"][0]["name_right"], "north");
        assert_eq!(inner["preview"][0]["index_right"], 0);

        let left = sjoin(&fx, "left", "within").unwrap().into_data();
        assert_eq!(left["num_features"], 2);
        assert_eq!(left["matched"], 1);
        assert!(left["preview"][1]["zone"].is_null());

        let right = sjoin(&fx, "right", "intersects").unwrap().into_data();
        assert_eq!(right["num_features"], 3);
        assert_eq!(right["preview"][0]["index_left"], 0);
        assert!(right["preview"][2]["index_left"].is_null());

        let contains = sjoin(&fx, "inner", "contains").unwrap().into_data();
        assert_eq!(contains["num_features"], 0);

        assert!(matches!(sjoin(&fx, "outer", "intersects"), Err(OperationError::Domain(_))));
        assert!(matches!(sjoin(&fx, "inner", "near"), Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_sjoin_nearest_with_max_distance() {
        let fx = fixture();
        let pts = write_json(&fx, "points.geojson", points());
        let polys = write_json(&fx, "zones.geojson", zones());
        let args = ToolArguments::new()
            .with("left_path", pts)
            .with("right_path", polys)
            .with("how", "left")
            .with("distance_col", "dist");
        let data = call(&fx, SJOIN_NEAREST_GPD, args.clone()).unwrap().into_data();
        let preview = data["preview"].as_array().unwrap();
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0]["name_right"], "north");
        assert_eq!(preview[0]["dist"], 0.0);
        assert_eq!(preview[1]["name_right"], "south");
        assert!((preview[1]["dist"].as_f64().unwrap() - 5.0).abs() < 1e-9);

        let data = call(&fx, SJOIN_NEAREST_GPD, args.with("max_distance", 1.0))
            .unwrap()
            .into_data();
        assert_eq!(data["matched"], 1);
        assert!(data["preview"][1]["name_right"].is_null());
    }

    #[test]
    fn test_merge_on_common_columns() {
        let fx = fixture();
        let pts = write_json(&fx, "points.geojson", points());
        let scores = write_json(
            &fx,
            "scores.geojson",
            json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "properties": {"id": 1, "score": 10}, "geometry": null},
                    {"type": "Feature", "properties": {"id": 3, "score": 30}, "geometry": null}
                ]
            }),
        );
        let output = fx.root.join("outputs").join("merged.geojson");
        let data = call(
            &fx,
            MERGE_GPD,
            ToolArguments::new()
                .with("shapefile1_path", pts.clone())
                .with("shapefile2_path", scores)
                .with("output_path", output.display().to_string()),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["num_features"], 1);
        assert_eq!(data["merged_on"], json!(["id"]));
        let merged = FeatureLayer::read(&output).unwrap();
        let props = merged.features[0].properties.clone().unwrap();
        assert_eq!(props["score"], 10);
        assert_eq!(props["name"], "inside");
        assert!(merged.features[0].geometry.is_some());

        let zones = write_json(&fx, "zones.geojson", json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "properties": {"zone": "A"}, "geometry": null}]
        }));
        let disjoint = call(
            &fx,
            MERGE_GPD,
            ToolArguments::new()
                .with("shapefile1_path", pts)
                .with("shapefile2_path", zones)
                .with("output_path", output.display().to_string()),
        );
        assert!(matches!(disjoint, Err(OperationError::Domain(_))));
    }
}
