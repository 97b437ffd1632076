//! Raster operations over single-band ESRI ASCII grids
//!
//! A grid's CRS lives in an optional `.prj` sidecar (WKT, `EPSG:<code>` or a
//! proj string). Derived grids inherit the sidecar of their first source.
//! Tools that work on several bands take one single-band grid per band.

pub mod analysis;
pub mod ascii_grid;

use std::path::{Path, PathBuf};

use gis_mcp_application::{
    Artifact, HandlerContext, HandlerResult, OperationDescriptor, OperationError, OperationProvider,
};
use gis_mcp_domain::{
    OperationGroup, ParameterKind, StorageCategory, ToolArguments, ToolDefinition, ToolParameter,
};
use serde_json::{Map, Value, json};
use tracing::debug;

use self::analysis::{FocalStatistic, Resampling, output_nodata};
use self::ascii_grid::{AsciiGrid, GridError};
use super::projection::Transformer;
use super::projection::crs::Crs;
use super::support::{geometry_type, to_multi_polygon};
use super::vector::layer::FeatureLayer;

/// Tool name constants
pub const METADATA_RASTER: &str = "metadata_raster";
pub const RASTER_BAND_STATISTICS: &str = "raster_band_statistics";
pub const RASTER_HISTOGRAM: &str = "raster_histogram";
pub const RECLASSIFY_RASTER: &str = "reclassify_raster";
pub const WRITE_RASTER: &str = "write_raster";
pub const GET_RASTER_CRS: &str = "get_raster_crs";
pub const ZONAL_STATISTICS: &str = "zonal_statistics";
pub const FOCAL_STATISTICS: &str = "focal_statistics";
pub const HILLSHADE: &str = "hillshade";
pub const COMPUTE_NDVI: &str = "compute_ndvi";
pub const RASTER_ALGEBRA: &str = "raster_algebra";
pub const WEIGHTED_BAND_SUM: &str = "weighted_band_sum";
pub const TILE_RASTER: &str = "tile_raster";
pub const RESAMPLE_RASTER: &str = "resample_raster";
pub const REPROJECT_RASTER: &str = "reproject_raster";

const DRIVER: &str = "AAIGrid";
const DTYPES: [&str; 7] = ["uint8", "int16", "uint16", "int32", "uint32", "float32", "float64"];
const ZONAL_STATS: [&str; 7] = ["mean", "min", "max", "std", "sum", "count", "median"];
const MAX_FOCAL_SIZE: i64 = 99;
/// Keeps the NDVI denominator away from zero
const NDVI_EPSILON: f64 = 1e-6;
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

impl From<GridError> for OperationError {
    fn from(err: GridError) -> Self {
        OperationError::domain(err.to_string())
    }
}

fn define(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, OperationGroup::Raster)
}

fn source_param(name: &str) -> ToolParameter {
    ToolParameter::new(name, "ASCII grid file (.asc)", true).storage_input(None)
}

fn output_param() -> ToolParameter {
    ToolParameter::new("output_path", "Output ASCII grid file", true)
        .storage_output(Some(StorageCategory::Outputs))
}

fn optional_output() -> ToolParameter {
    ToolParameter::new("output_path", "Optional output ASCII grid file", false)
        .with_kind(ParameterKind::optional(ParameterKind::String))
        .storage_output(Some(StorageCategory::Outputs))
}

fn destination_param() -> ToolParameter {
    ToolParameter::new("destination", "Output ASCII grid file", true)
        .storage_output(Some(StorageCategory::Outputs))
}

#[derive(Debug, Default, Clone)]
pub struct RasterProvider;

impl RasterProvider {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProvider for RasterProvider {
    fn id(&self) -> &str {
        "raster"
    }

    fn group(&self) -> OperationGroup {
        OperationGroup::Raster
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![
            OperationDescriptor::new(
                define(METADATA_RASTER, "Size, georeferencing and nodata of a raster")
                    .with_parameter(source_param("path_or_url")),
                execute_metadata,
            ),
            OperationDescriptor::new(
                define(RASTER_BAND_STATISTICS, "Min, max, mean and standard deviation per band")
                    .with_parameter(source_param("source")),
                execute_band_statistics,
            ),
            OperationDescriptor::new(
                define(RASTER_HISTOGRAM, "Histogram of cell values per band")
                    .with_parameter(source_param("source"))
                    .with_parameter(
                        ToolParameter::new("bins", "Number of bins", false)
                            .with_kind(ParameterKind::Integer)
                            .with_default(256),
                    ),
                execute_histogram,
            ),
            OperationDescriptor::new(
                define(RECLASSIFY_RASTER, "Replace cell values according to a mapping")
                    .with_parameter(source_param("raster_path"))
                    .with_parameter(
                        ToolParameter::new("reclass_map", "Old value -> new value", true)
                            .with_kind(ParameterKind::Mapping),
                    )
                    .with_parameter(output_param()),
                execute_reclassify,
            ),
            OperationDescriptor::new(
                define(WRITE_RASTER, "Write a 2-D array using a reference raster's georeferencing")
                    .with_parameter(
                        ToolParameter::new("array", "Rows of cell values, top row first", true)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::sequence_of(
                                ParameterKind::Number,
                            ))),
                    )
                    .with_parameter(source_param("reference_raster"))
                    .with_parameter(output_param())
                    .with_parameter(
                        ToolParameter::new("dtype", "Cell data type", false).with_default("float32"),
                    ),
                execute_write,
            ),
            OperationDescriptor::new(
                define(GET_RASTER_CRS, "CRS of a raster, read from its .prj sidecar")
                    .with_parameter(source_param("path_or_url")),
                execute_get_crs,
            ),
            OperationDescriptor::new(
                define(ZONAL_STATISTICS, "Statistics of the cells whose centre falls in each polygon")
                    .with_parameter(source_param("raster_path"))
                    .with_parameter(
                        ToolParameter::new("vector_path", "Polygon GeoJSON layer", true)
                            .storage_input(None),
                    )
                    .with_parameter(
                        ToolParameter::new("stats", "Statistics to compute", false)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::String))
                            .with_default(json!(["mean", "min", "max", "std"])),
                    ),
                execute_zonal_statistics,
            ),
            OperationDescriptor::new(
                define(FOCAL_STATISTICS, "Moving-window mean, min, max or std")
                    .with_parameter(source_param("raster_path"))
                    .with_parameter(ToolParameter::new(
                        "statistic",
                        "mean, min, max or std",
                        true,
                    ))
                    .with_parameter(
                        ToolParameter::new("size", "Odd window size in cells", false)
                            .with_kind(ParameterKind::Integer)
                            .with_default(3),
                    )
                    .with_parameter(optional_output()),
                execute_focal_statistics,
            ),
            OperationDescriptor::new(
                define(HILLSHADE, "Shaded relief (0-255) of a DEM")
                    .with_parameter(source_param("raster_path"))
                    .with_parameter(
                        ToolParameter::new("azimuth", "Sun azimuth in degrees", false)
                            .with_kind(ParameterKind::Number)
                            .with_default(315.0),
                    )
                    .with_parameter(
                        ToolParameter::new("angle_altitude", "Sun altitude in degrees", false)
                            .with_kind(ParameterKind::Number)
                            .with_default(45.0),
                    )
                    .with_parameter(optional_output()),
                execute_hillshade,
            ),
            OperationDescriptor::new(
                define(COMPUTE_NDVI, "NDVI from a red grid and a near-infrared grid")
                    .with_parameter(source_param("red_source"))
                    .with_parameter(source_param("nir_source"))
                    .with_parameter(destination_param()),
                execute_ndvi,
            ),
            OperationDescriptor::new(
                define(
                    RASTER_ALGEBRA,
                    "Add or subtract two grids, resampling the second onto the first when they differ",
                )
                .with_parameter(source_param("raster1"))
                .with_parameter(source_param("raster2"))
                .with_parameter(ToolParameter::new("operation", "add or subtract", true))
                .with_parameter(destination_param()),
                execute_algebra,
            ),
            OperationDescriptor::new(
                define(WEIGHTED_BAND_SUM, "Weighted sum of aligned grids; weights must sum to 1")
                    .with_parameter(
                        ToolParameter::new("sources", "One ASCII grid per band", true)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::String)),
                    )
                    .with_parameter(
                        ToolParameter::new("weights", "One weight per band", true)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::Number)),
                    )
                    .with_parameter(destination_param()),
                execute_weighted_sum,
            ),
            OperationDescriptor::new(
                define(TILE_RASTER, "Split a grid into square tiles")
                    .with_parameter(source_param("source"))
                    .with_parameter(
                        ToolParameter::new("tile_size", "Tile edge in cells", true)
                            .with_kind(ParameterKind::Integer),
                    )
                    .with_parameter(
                        ToolParameter::new("destination_dir", "Directory receiving the tiles", true)
                            .storage_output(Some(StorageCategory::Outputs)),
                    ),
                execute_tile,
            ),
            OperationDescriptor::new(
                define(RESAMPLE_RASTER, "Resample a grid by a scale factor")
                    .with_parameter(source_param("source"))
                    .with_parameter(
                        ToolParameter::new("scale_factor", "Multiplier for width and height", true)
                            .with_kind(ParameterKind::Number),
                    )
                    .with_parameter(
                        ToolParameter::new("resampling", "nearest or bilinear", false)
                            .with_default("nearest"),
                    )
                    .with_parameter(destination_param()),
                execute_resample,
            ),
            OperationDescriptor::new(
                define(REPROJECT_RASTER, "Warp a grid with a .prj sidecar into another CRS")
                    .with_parameter(source_param("source"))
                    .with_parameter(ToolParameter::new("target_crs", "Target CRS (e.g. EPSG:3857)", true))
                    .with_parameter(destination_param())
                    .with_parameter(
                        ToolParameter::new("resampling", "nearest or bilinear", false)
                            .with_default("nearest"),
                    ),
                execute_reproject,
            ),
        ]
    }
}

fn read_grid(args: &ToolArguments, name: &str) -> Result<AsciiGrid, OperationError> {
    Ok(read_source(args, name)?.0)
}

fn read_source(args: &ToolArguments, name: &str) -> Result<(AsciiGrid, PathBuf), OperationError> {
    let raw = args.str(name)?;
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Err(OperationError::domain(
            "Remote rasters are not supported; download the file with download_dataset first",
        ));
    }
    let path = args.path(name)?;
    Ok((load(&path)?, path))
}

fn load(path: &Path) -> Result<AsciiGrid, OperationError> {
    if !path.is_file() {
        return Err(OperationError::domain(format!(
            "Raster not found: {}",
            path.display()
        )));
    }
    Ok(AsciiGrid::read(path)?)
}

fn prj_path(path: &Path) -> PathBuf {
    path.with_extension("prj")
}

/// Sidecar text, if the grid has one
fn read_prj(path: &Path) -> Result<Option<String>, OperationError> {
    let prj = prj_path(path);
    if !prj.is_file() {
        return Ok(None);
    }
    std::fs::read_to_string(&prj)
        .map(Some)
        .map_err(|e| OperationError::io("Failed to read", &prj, e))
}

/// CRS named by a sidecar: a code or proj string, or the outermost EPSG
/// authority of a WKT definition
fn identify_crs(text: &str) -> Option<Crs> {
    let trimmed = text.trim();
    if let Ok(crs) = trimmed.parse::<Crs>() {
        return Some(crs);
    }
    let upper = trimmed.to_uppercase();
    let authority = upper
        .rfind("AUTHORITY[\"EPSG\"")
        .or_else(|| upper.rfind("ID[\"EPSG\""));
    if let Some(position) = authority {
        let code: String = upper[position..]
            .split(',')
            .nth(1)?
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        return format!("EPSG:{}", code).parse().ok();
    }
    // ESRI-flavoured WKT carries names only
    let geographic = upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS");
    (geographic && (upper.contains("WGS_1984") || upper.contains("WGS 84"))).then(Crs::wgs84)
}

fn raster_crs(path: &Path) -> Result<Option<Crs>, OperationError> {
    Ok(read_prj(path)?.as_deref().and_then(identify_crs))
}

/// Write a derived grid, carrying over the source's sidecar
fn write_derived(grid: &AsciiGrid, source: &Path, output: &Path) -> Result<(), OperationError> {
    grid.write(output)?;
    let prj = prj_path(source);
    if prj.is_file() {
        let target = prj_path(output);
        std::fs::copy(&prj, &target).map_err(|e| OperationError::io("Failed to copy", &prj, e))?;
    }
    Ok(())
}

/// `min`, `max`, `mean`, `std` and `valid_cells` of the cells with data
fn summarize(grid: &AsciiGrid) -> Result<Map<String, Value>, OperationError> {
    let values: Vec<f64> = grid.valid_values().collect();
    if values.is_empty() {
        return Err(OperationError::domain("Raster has no valid cells"));
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let mut summary = Map::new();
    summary.insert("min".to_string(), json!(values.iter().copied().fold(f64::INFINITY, f64::min)));
    summary.insert("max".to_string(), json!(values.iter().copied().fold(f64::NEG_INFINITY, f64::max)));
    summary.insert("mean".to_string(), json!(mean));
    summary.insert("std".to_string(), json!(variance.sqrt()));
    summary.insert("valid_cells".to_string(), json!(values.len()));
    Ok(summary)
}

fn grid_artifact(grid: &AsciiGrid, path: &std::path::Path) -> Artifact {
    Artifact::new(path, DRIVER)
        .with_metadata("width", grid.ncols)
        .with_metadata("height", grid.nrows)
        .with_metadata("count", 1)
        .with_metadata("bounds", json!(grid.bounds()))
}

fn execute_metadata(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (grid, path) = read_source(args, "path_or_url")?;
    let crs = raster_crs(&path)?.map(|crs| crs.to_string());
    Ok(json!({
        "driver": DRIVER,
        "width": grid.ncols,
        "height": grid.nrows,
        "count": 1,
        "dtype": "float64",
        "crs": crs,
        "transform": grid.transform(),
        "bounds": grid.bounds(),
        "nodata": grid.nodata,
        "resolution": [grid.cellsize, grid.cellsize],
    })
    .into())
}

fn execute_band_statistics(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let grid = read_grid(args, "source")?;
    Ok(json!({ "band_1": summarize(&grid)? }).into())
}

fn execute_histogram(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let grid = read_grid(args, "source")?;
    let bins = args.i64("bins")?;
    if !(1..=65_536).contains(&bins) {
        return Err(OperationError::domain(format!(
            "'bins' must be between 1 and 65536, got {}",
            bins
        )));
    }
    let bins = bins as usize;
    let values: Vec<f64> = grid.valid_values().collect();
    if values.is_empty() {
        return Err(OperationError::domain("Raster has no valid cells"));
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = if max > min { (max - min) / bins as f64 } else { 1.0 };

    let mut counts = vec![0u64; bins];
    for value in &values {
        let index = (((value - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    let edges: Vec<f64> = (0..=bins).map(|i| min + i as f64 * width).collect();
    Ok(json!({
        "band_1": { "counts": counts, "bin_edges": edges },
        "bins": bins,
    })
    .into())
}

fn execute_reclassify(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let grid = read_grid(args, "raster_path")?;
    let mut table: Vec<(f64, f64)> = Vec::new();
    for (key, value) in args.object("reclass_map")? {
        let from: f64 = key.trim().parse().map_err(|_| {
            OperationError::domain(format!("reclass_map key '{}' is not a number", key))
        })?;
        let to = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| {
            OperationError::domain(format!("reclass_map value for '{}' is not a number", key))
        })?;
        table.push((from, to));
    }

    let mut changed = 0usize;
    let values = grid
        .values
        .iter()
        .map(|v| match table.iter().find(|(from, _)| from == v) {
            Some((_, to)) if !grid.is_nodata(*v) => {
                changed += 1;
                *to
            }
            _ => *v,
        })
        .collect();
    let reclassified = grid.with_values(values);
    let output = args.path("output_path")?;
    write_derived(&reclassified, &args.path("raster_path")?, &output)?;
    Ok(grid_artifact(&reclassified, &output)
        .with_metadata("changed_cells", changed)
        .into())
}

fn execute_write(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let reference = read_grid(args, "reference_raster")?;
    let dtype = args.str("dtype")?.to_lowercase();
    if !DTYPES.contains(&dtype.as_str()) {
        return Err(OperationError::domain(format!(
            "Unsupported dtype '{}' (supported: {})",
            dtype,
            DTYPES.join(", ")
        )));
    }

    let rows = args.array("array")?;
    if rows.len() != reference.nrows {
        return Err(OperationError::domain(format!(
            "Array has {} rows, reference raster has {}",
            rows.len(),
            reference.nrows
        )));
    }
    let mut values = Vec::with_capacity(reference.ncols * reference.nrows);
    for (index, row) in rows.iter().enumerate() {
        let row = row.as_array().map(Vec::as_slice).unwrap_or_default();
        if row.len() != reference.ncols {
            return Err(OperationError::domain(format!(
                "Row {} has {} columns, reference raster has {}",
                index,
                row.len(),
                reference.ncols
            )));
        }
        for cell in row {
            let value = cell.as_f64().unwrap_or(f64::NAN);
            values.push(if dtype.starts_with("float") {
                value
            } else {
                value.round()
            });
        }
    }

    let grid = reference.with_values(values);
    let output = args.path("output_path")?;
    grid.write(&output)?;
    Ok(grid_artifact(&grid, &output).with_metadata("dtype", dtype).into())
}

fn execute_get_crs(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (_, path) = read_source(args, "path_or_url")?;
    let text = read_prj(&path)?.ok_or_else(|| {
        OperationError::domain(format!(
            "No CRS defined for this dataset (missing {})",
            prj_path(&path).display()
        ))
    })?;
    let crs = identify_crs(&text);
    let is_wkt = text.trim_start().starts_with(|c: char| c.is_ascii_alphabetic())
        && text.contains('[');
    Ok(json!({
        "crs": crs.as_ref().map(Crs::to_string),
        "name": crs.as_ref().map(Crs::name),
        "proj4": crs.as_ref().map(Crs::proj_string),
        "is_geographic": crs.as_ref().map(Crs::is_geographic),
        "wkt": is_wkt.then(|| text.trim().to_string()),
    })
    .into())
}

fn execute_zonal_statistics(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (grid, raster_path) = read_source(args, "raster_path")?;
    let stats = args.str_list("stats")?;
    if let Some(unknown) = stats.iter().find(|s| !ZONAL_STATS.contains(&s.as_str())) {
        return Err(OperationError::domain(format!(
            "Unsupported statistic '{}' (supported: {})",
            unknown,
            ZONAL_STATS.join(", ")
        )));
    }
    let mut layer = FeatureLayer::read(&args.path("vector_path")?)?;
    if let Some(crs) = raster_crs(&raster_path)? {
        layer.to_crs(&crs)?;
    }

    let mut results = Vec::with_capacity(layer.len());
    for (index, item) in layer.features.iter().enumerate() {
        let values = match FeatureLayer::geometry(item)? {
            Some(geometry) => {
                let zone = to_multi_polygon(&geometry).map_err(|_| {
                    OperationError::domain(format!(
                        "Feature {} is a {}; zones must be polygons",
                        index,
                        geometry_type(&geometry)
                    ))
                })?;
                analysis::zone_values(&grid, &zone)
            }
            None => Vec::new(),
        };
        let mut entry = Map::new();
        entry.insert("index".to_string(), json!(index));
        for stat in &stats {
            entry.insert(stat.clone(), zonal_value(stat, &values));
        }
        results.push(Value::Object(entry));
    }
    debug!(zones = results.len(), "Computed zonal statistics");
    Ok(json!({ "results": results }).into())
}

/// One statistic over a zone's cells; null when the zone holds no data
fn zonal_value(stat: &str, values: &[f64]) -> Value {
    if stat == "count" {
        return json!(values.len());
    }
    if values.is_empty() {
        return Value::Null;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let value = match stat {
        "mean" => mean,
        "min" => values.iter().copied().fold(f64::INFINITY, f64::min),
        "max" => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "std" => (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt(),
        "sum" => values.iter().sum(),
        _ => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
    };
    json!(value)
}

/// Summary of a derived grid, written out when `output_path` is given
fn derived_result(
    grid: &AsciiGrid,
    source: &Path,
    args: &ToolArguments,
    mut data: Map<String, Value>,
) -> HandlerResult {
    let output_path = match args.opt_path("output_path")? {
        Some(path) => {
            write_derived(grid, source, &path)?;
            Some(path.display().to_string())
        }
        None => None,
    };
    data.insert("summary".to_string(), Value::Object(summarize(grid)?));
    data.insert("output_path".to_string(), json!(output_path));
    Ok(Value::Object(data).into())
}

fn execute_focal_statistics(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (grid, source) = read_source(args, "raster_path")?;
    let statistic: FocalStatistic = args.str("statistic")?.parse()?;
    let size = args.i64("size")?;
    if !(1..=MAX_FOCAL_SIZE).contains(&size) || size % 2 == 0 {
        return Err(OperationError::domain(format!(
            "'size' must be an odd integer between 1 and {}, got {}",
            MAX_FOCAL_SIZE, size
        )));
    }
    let filtered = analysis::focal(&grid, statistic, size as usize);
    let mut data = Map::new();
    data.insert("statistic".to_string(), json!(args.str("statistic")?.to_lowercase()));
    data.insert("size".to_string(), json!(size));
    derived_result(&filtered, &source, args, data)
}

fn execute_hillshade(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (grid, source) = read_source(args, "raster_path")?;
    let azimuth = args.f64("azimuth")?;
    let altitude = args.f64("angle_altitude")?;
    if !(0.0..=90.0).contains(&altitude) {
        return Err(OperationError::domain(format!(
            "'angle_altitude' must be between 0 and 90 degrees, got {}",
            altitude
        )));
    }
    let shaded = analysis::hillshade(&grid, azimuth, altitude);
    let mut data = Map::new();
    data.insert("azimuth".to_string(), json!(azimuth));
    data.insert("angle_altitude".to_string(), json!(altitude));
    derived_result(&shaded, &source, args, data)
}

/// Two grids must share extent and resolution cell for cell
fn require_aligned(first: &AsciiGrid, second: &AsciiGrid, what: &str) -> Result<(), OperationError> {
    if first.is_aligned_with(second) {
        Ok(())
    } else {
        Err(OperationError::domain(format!(
            "{} grids differ in extent or resolution ({} x {} vs {} x {})",
            what, first.ncols, first.nrows, second.ncols, second.nrows
        )))
    }
}

/// Cell-wise combination; a nodata input gives a nodata output
fn combine(grids: &[&AsciiGrid], op: impl Fn(&[f64]) -> f64) -> AsciiGrid {
    let first = grids[0];
    let nodata = output_nodata(first);
    let mut cell = Vec::with_capacity(grids.len());
    let values = (0..first.values.len())
        .map(|i| {
            cell.clear();
            for grid in grids {
                let v = grid.values[i];
                if grid.is_nodata(v) {
                    return nodata;
                }
                cell.push(v);
            }
            op(&cell)
        })
        .collect();
    let mut out = first.with_values(values);
    out.nodata = Some(nodata);
    out
}

fn execute_ndvi(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (red, red_path) = read_source(args, "red_source")?;
    let nir = read_grid(args, "nir_source")?;
    require_aligned(&red, &nir, "Red and near-infrared")?;
    let ndvi = combine(&[&red, &nir], |cell| {
        (cell[1] - cell[0]) / (cell[1] + cell[0] + NDVI_EPSILON)
    });
    let output = args.path("destination")?;
    write_derived(&ndvi, &red_path, &output)?;
    Ok(grid_artifact(&ndvi, &output).into())
}

fn execute_algebra(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let operation = args.str("operation")?.to_lowercase();
    let sign = match operation.as_str() {
        "add" => 1.0,
        "subtract" => -1.0,
        _ => {
            return Err(OperationError::domain(
                "Invalid operation; use 'add' or 'subtract'",
            ));
        }
    };
    let (first, first_path) = read_source(args, "raster1")?;
    let mut second = read_grid(args, "raster2")?;
    let resampled = !first.is_aligned_with(&second);
    if resampled {
        debug!("Resampling second raster onto the first");
        second = analysis::align_to(&second, &first, Resampling::Bilinear);
    }
    let result = combine(&[&first, &second], |cell| cell[0] + sign * cell[1]);
    let output = args.path("destination")?;
    write_derived(&result, &first_path, &output)?;
    Ok(grid_artifact(&result, &output)
        .with_metadata("operation", operation)
        .with_metadata("resampled", resampled)
        .into())
}

fn execute_weighted_sum(args: &ToolArguments, ctx: &HandlerContext) -> HandlerResult {
    let sources = args.str_list("sources")?;
    let weights = args.f64_list("weights")?;
    if sources.is_empty() {
        return Err(OperationError::domain("'sources' must not be empty"));
    }
    if weights.len() != sources.len() {
        return Err(OperationError::domain(format!(
            "Number of weights ({}) does not match number of bands ({})",
            weights.len(),
            sources.len()
        )));
    }
    if (weights.iter().sum::<f64>() - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(OperationError::domain("Sum of weights must be 1.0"));
    }

    let mut paths = Vec::with_capacity(sources.len());
    let mut grids = Vec::with_capacity(sources.len());
    for raw in &sources {
        let path = ctx.storage.locate(raw, None)?;
        let grid = load(&path)?;
        if let Some(first) = grids.first() {
            require_aligned(first, &grid, "Band")?;
        }
        grids.push(grid);
        paths.push(path);
    }
    let bands: Vec<&AsciiGrid> = grids.iter().collect();
    let weighted = combine(&bands, |cell| {
        cell.iter().zip(&weights).map(|(v, w)| v * w).sum()
    });
    let output = args.path("destination")?;
    write_derived(&weighted, &paths[0], &output)?;
    Ok(grid_artifact(&weighted, &output)
        .with_metadata("bands", sources.len())
        .into())
}

fn execute_tile(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (grid, source) = read_source(args, "source")?;
    let tile_size = args.i64("tile_size")?;
    if tile_size < 1 {
        return Err(OperationError::domain(format!(
            "'tile_size' must be positive, got {}",
            tile_size
        )));
    }
    let directory = args.path("destination_dir")?;
    std::fs::create_dir_all(&directory)
        .map_err(|e| OperationError::io("Failed to create", &directory, e))?;

    let mut written = Vec::new();
    for (row, col, tile) in analysis::tiles(&grid, tile_size as usize) {
        let path = directory.join(format!("tile_{}_{}.asc", row, col));
        write_derived(&tile, &source, &path)?;
        written.push(path.display().to_string());
    }
    debug!(tiles = written.len(), dir = %directory.display(), "Tiled raster");
    Ok(json!({
        "tiles_created": written.len(),
        "destination_dir": directory.display().to_string(),
        "tiles": written,
    })
    .into())
}

fn execute_resample(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (grid, source) = read_source(args, "source")?;
    let factor = args.f64("scale_factor")?;
    let method: Resampling = args.str("resampling")?.parse()?;
    let resampled = analysis::resample(&grid, factor, method)?;
    let output = args.path("destination")?;
    write_derived(&resampled, &source, &output)?;
    Ok(grid_artifact(&resampled, &output)
        .with_metadata("scale_factor", factor)
        .with_metadata("cellsize", resampled.cellsize)
        .into())
}

fn execute_reproject(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (grid, source) = read_source(args, "source")?;
    let from = raster_crs(&source)?.ok_or_else(|| {
        OperationError::domain("Source raster has no recognised CRS; add a .prj sidecar")
    })?;
    let to: Crs = args.str("target_crs")?.parse()?;
    let method: Resampling = args.str("resampling")?.parse()?;
    let forward = Transformer::new(&from, &to)?;
    let inverse = Transformer::new(&to, &from)?;
    let warped = analysis::warp(
        &grid,
        |x, y| forward.transform(x, y).ok(),
        |x, y| inverse.transform(x, y).ok(),
        method,
    )?;

    let output = args.path("destination")?;
    warped.write(&output)?;
    let prj = prj_path(&output);
    std::fs::write(&prj, to.to_string()).map_err(|e| OperationError::io("Failed to write", &prj, e))?;
    debug!(from = %from, to = %to, "Reprojected raster");
    Ok(grid_artifact(&warped, &output)
        .with_metadata("crs", to.to_string())
        .with_metadata("cellsize", warped.cellsize)
        .into())
}
