//! Spatial statistics over feature centroids
//!
//! Autocorrelation tools share one loader: the layer is reprojected to
//! `target_crs`, centroids are linked by a distance band and the weights are
//! row-standardised inverse distances with zero rows for islands. Moran's I
//! and Geary's C report the normality approximation; every other statistic
//! uses seeded random permutations.
//!
//! Weights tools build queen, rook, distance-band or k-nearest-neighbour
//! weights directly in the layer CRS and report a neighbour summary.

pub mod cluster;
pub mod esda;
pub mod regression;
pub mod weights;

use std::path::PathBuf;
use std::str::FromStr;

use geo::Centroid;
use gis_mcp_application::{
    Artifact, HandlerContext, HandlerResult, OperationDescriptor, OperationError, OperationProvider,
};
use gis_mcp_domain::{
    OperationGroup, ParameterKind, StorageCategory, ToolArguments, ToolDefinition, ToolParameter,
};
use serde_json::{Map, Value, json};
use tracing::debug;

use self::esda::{Autocorrelation, LocalStatistic, Permutations, Simulated};
use self::weights::{Contiguity, SpatialWeights, Transform, WeightsFormat};
use super::projection::Transformer;
use super::projection::crs::Crs;
use super::vector::layer::{FeatureLayer, PREVIEW_ROWS};

/// Tool name constants
pub const MORANS_I: &str = "morans_i";
pub const GEARYS_C: &str = "gearys_c";
pub const GETIS_ORD_G: &str = "getis_ord_g";
pub const GAMMA_STATISTIC: &str = "gamma_statistic";
pub const MORAN_LOCAL: &str = "moran_local";
pub const GETIS_ORD_G_LOCAL: &str = "getis_ord_g_local";
pub const JOIN_COUNTS: &str = "join_counts";
pub const JOIN_COUNTS_LOCAL: &str = "join_counts_local";
pub const ADBSCAN: &str = "adbscan";
pub const WEIGHTS_FROM_SHAPEFILE: &str = "weights_from_shapefile";
pub const DISTANCE_BAND_WEIGHTS: &str = "distance_band_weights";
pub const KNN_WEIGHTS: &str = "knn_weights";
pub const BUILD_AND_TRANSFORM_WEIGHTS: &str = "build_and_transform_weights";
pub const BUILD_TRANSFORM_AND_SAVE_WEIGHTS: &str = "build_transform_and_save_weights";
pub const OLS_WITH_SPATIAL_DIAGNOSTICS: &str = "ols_with_spatial_diagnostics_safe";

/// Metres per degree used to convert a metric threshold for geographic CRSs
const METERS_PER_DEGREE: f64 = 111_000.0;
const MIN_FEATURES: usize = 3;
const DEFAULT_PERMUTATIONS: i64 = 999;
const MAX_PERMUTATIONS: i64 = 99_999;
/// Neighbours used when a distance band leaves every feature isolated
const FALLBACK_K: usize = 4;

fn define(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, OperationGroup::Statistics)
}

fn autocorrelation_definition(name: &str, description: &str) -> ToolDefinition {
    define(name, description)
        .with_parameter(
            ToolParameter::new("shapefile_path", "GeoJSON layer to analyse", true).storage_input(None),
        )
        .with_parameter(
            ToolParameter::new("dependent_var", "Numeric attribute to test", false)
                .with_default("LAND_USE"),
        )
        .with_parameter(
            ToolParameter::new("target_crs", "CRS in which distances are measured", false)
                .with_default("EPSG:4326"),
        )
        .with_parameter(
            ToolParameter::new(
                "distance_threshold",
                "Neighbour distance in metres (converted to degrees for geographic CRSs)",
                false,
            )
            .with_kind(ParameterKind::Number)
            .with_default(100_000.0),
        )
}

/// Autocorrelation definition with permutation controls
fn simulated_definition(name: &str, description: &str) -> ToolDefinition {
    autocorrelation_definition(name, description)
        .with_parameter(
            ToolParameter::new("permutations", "Random permutations for pseudo p-values", false)
                .with_kind(ParameterKind::Integer)
                .with_default(DEFAULT_PERMUTATIONS),
        )
        .with_parameter(
            ToolParameter::new("seed", "Seed for reproducible permutations", false)
                .with_kind(ParameterKind::optional(ParameterKind::Integer)),
        )
}

fn data_param() -> ToolParameter {
    ToolParameter::new("data_path", "GeoJSON layer", true).storage_input(None)
}

fn id_field_param() -> ToolParameter {
    ToolParameter::new("id_field", "Attribute used as observation id", false)
        .with_kind(ParameterKind::optional(ParameterKind::String))
}

/// Parameters selecting how weights are built
fn with_method_params(definition: ToolDefinition, method_name: &str) -> ToolDefinition {
    definition
        .with_parameter(
            ToolParameter::new(method_name, "queen, rook, distance_band or knn", false)
                .with_default("queen"),
        )
        .with_parameter(id_field_param())
        .with_parameter(
            ToolParameter::new("threshold", "Neighbour distance (distance_band)", false)
                .with_kind(ParameterKind::optional(ParameterKind::Number)),
        )
        .with_parameter(
            ToolParameter::new("k", "Neighbour count (knn)", false)
                .with_kind(ParameterKind::optional(ParameterKind::Integer)),
        )
        .with_parameter(
            ToolParameter::new("binary", "Binary weights instead of inverse distance (distance_band)", false)
                .with_kind(ParameterKind::Boolean)
                .with_default(true),
        )
}

fn transform_param(required: bool) -> ToolParameter {
    let param = ToolParameter::new("transform_type", "Weights transform: r, v, b, o or d", false);
    if required {
        param.with_default("r")
    } else {
        param.with_kind(ParameterKind::optional(ParameterKind::String))
    }
}

#[derive(Debug, Default, Clone)]
pub struct StatisticsProvider;

impl StatisticsProvider {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProvider for StatisticsProvider {
    fn id(&self) -> &str {
        "statistics"
    }

    fn group(&self) -> OperationGroup {
        OperationGroup::Statistics
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![
            OperationDescriptor::new(
                autocorrelation_definition(MORANS_I, "Global Moran's I spatial autocorrelation"),
                execute_morans_i,
            ),
            OperationDescriptor::new(
                autocorrelation_definition(GEARYS_C, "Global Geary's C spatial autocorrelation"),
                execute_gearys_c,
            ),
            OperationDescriptor::new(
                simulated_definition(GETIS_ORD_G, "Global Getis-Ord G hot spot statistic"),
                execute_getis_ord_g,
            ),
            OperationDescriptor::new(
                simulated_definition(GAMMA_STATISTIC, "Cross-product Gamma index"),
                execute_gamma,
            ),
            OperationDescriptor::new(
                simulated_definition(MORAN_LOCAL, "Local Moran's I for every feature"),
                execute_moran_local,
            ),
            OperationDescriptor::new(
                simulated_definition(GETIS_ORD_G_LOCAL, "Local Getis-Ord G for every feature"),
                execute_getis_ord_g_local,
            ),
            OperationDescriptor::new(
                simulated_definition(JOIN_COUNTS, "Global join counts of a 0/1 attribute"),
                execute_join_counts,
            ),
            OperationDescriptor::new(
                autocorrelation_definition(JOIN_COUNTS_LOCAL, "Local join counts of a 0/1 attribute"),
                execute_join_counts_local,
            ),
            OperationDescriptor::new(
                define(ADBSCAN, "Density-based clustering of feature centroids")
                    .with_parameter(
                        ToolParameter::new("shapefile_path", "GeoJSON layer to cluster", true)
                            .storage_input(None),
                    )
                    .with_parameter(
                        ToolParameter::new("target_crs", "CRS in which distances are measured", false)
                            .with_default("EPSG:4326"),
                    )
                    .with_parameter(
                        ToolParameter::new("eps", "Neighbourhood radius in target CRS units", false)
                            .with_kind(ParameterKind::Number)
                            .with_default(0.1),
                    )
                    .with_parameter(
                        ToolParameter::new("min_samples", "Points within eps that make a core point", false)
                            .with_kind(ParameterKind::Integer)
                            .with_default(5),
                    ),
                execute_adbscan,
            ),
            OperationDescriptor::new(
                define(WEIGHTS_FROM_SHAPEFILE, "Contiguity weights between polygon features")
                    .with_parameter(
                        ToolParameter::new("shapefile_path", "Polygon GeoJSON layer", true)
                            .storage_input(None),
                    )
                    .with_parameter(
                        ToolParameter::new("contiguity", "queen or rook", false).with_default("queen"),
                    )
                    .with_parameter(id_field_param()),
                execute_weights_from_shapefile,
            ),
            OperationDescriptor::new(
                define(DISTANCE_BAND_WEIGHTS, "Distance-band spatial weights over feature centroids")
                    .with_parameter(data_param())
                    .with_parameter(
                        ToolParameter::new("threshold", "Neighbour distance in layer units", true)
                            .with_kind(ParameterKind::Number),
                    )
                    .with_parameter(
                        ToolParameter::new("binary", "Binary weights instead of inverse distance", false)
                            .with_kind(ParameterKind::Boolean)
                            .with_default(true),
                    )
                    .with_parameter(id_field_param()),
                execute_distance_band_weights,
            ),
            OperationDescriptor::new(
                define(KNN_WEIGHTS, "k-nearest-neighbour spatial weights over feature centroids")
                    .with_parameter(data_param())
                    .with_parameter(
                        ToolParameter::new("k", "Number of nearest neighbours", true)
                            .with_kind(ParameterKind::Integer),
                    )
                    .with_parameter(id_field_param()),
                execute_knn_weights,
            ),
            OperationDescriptor::new(
                with_method_params(
                    define(BUILD_AND_TRANSFORM_WEIGHTS, "Build spatial weights and apply a transform")
                        .with_parameter(data_param()),
                    "method",
                )
                .with_parameter(transform_param(true)),
                execute_build_and_transform,
            ),
            OperationDescriptor::new(
                with_method_params(
                    define(
                        BUILD_TRANSFORM_AND_SAVE_WEIGHTS,
                        "Build spatial weights, optionally transform them, and save as GAL or GWT",
                    )
                    .with_parameter(data_param()),
                    "method",
                )
                .with_parameter(transform_param(false))
                .with_parameter(
                    ToolParameter::new("output_path", "Weights file to write", false)
                        .with_default("weights.gal")
                        .storage_output(Some(StorageCategory::Outputs)),
                )
                .with_parameter(ToolParameter::new("format", "gal or gwt", false).with_default("gal"))
                .with_parameter(
                    ToolParameter::new("overwrite", "Replace an existing file", false)
                        .with_kind(ParameterKind::Boolean)
                        .with_default(false),
                ),
                execute_build_and_save,
            ),
            OperationDescriptor::new(
                with_method_params(
                    define(
                        OLS_WITH_SPATIAL_DIAGNOSTICS,
                        "OLS regression with Moran's I of the residuals",
                    )
                    .with_parameter(data_param())
                    .with_parameter(ToolParameter::new("y_field", "Dependent attribute", true))
                    .with_parameter(
                        ToolParameter::new("x_fields", "Independent attributes", true)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::String)),
                    )
                    .with_parameter(
                        ToolParameter::new("weights_path", "Existing GAL or GWT weights file", false)
                            .with_kind(ParameterKind::optional(ParameterKind::String))
                            .storage_input(None),
                    ),
                    "weights_method",
                ),
                execute_ols,
            ),
        ]
    }
}

/// Centroid of every feature, in the layer CRS
fn centroids(layer: &FeatureLayer) -> Result<Vec<(f64, f64)>, OperationError> {
    layer
        .geometries()?
        .into_iter()
        .enumerate()
        .map(|(index, geometry)| {
            geometry
                .as_ref()
                .and_then(|g| g.centroid())
                .map(|p| (p.x(), p.y()))
                .ok_or_else(|| {
                    OperationError::domain(format!("Feature {} has no geometry", index))
                })
        })
        .collect()
}

fn numeric_column(layer: &FeatureLayer, column: &str) -> Result<Vec<f64>, OperationError> {
    if !layer.column_types().contains_key(column) {
        return Err(OperationError::domain(format!(
            "Variable '{}' not found in layer columns",
            column
        )));
    }
    layer
        .features
        .iter()
        .enumerate()
        .map(|(index, feature)| {
            let value = feature.properties.as_ref().and_then(|p| p.get(column));
            match value {
                Some(Value::Number(n)) => n.as_f64(),
                Some(Value::String(s)) => s.trim().parse().ok(),
                Some(Value::Bool(b)) => Some(f64::from(u8::from(*b))),
                _ => None,
            }
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                OperationError::domain(format!(
                    "Feature {} has a non-numeric '{}' value",
                    index, column
                ))
            })
        })
        .collect()
}

fn permutations(args: &ToolArguments) -> Result<Permutations, OperationError> {
    let count = args.i64("permutations")?;
    if !(1..=MAX_PERMUTATIONS).contains(&count) {
        return Err(OperationError::domain(format!(
            "'permutations' must be between 1 and {}",
            MAX_PERMUTATIONS
        )));
    }
    let seed = args.opt_i64("seed")?.map(|s| s as u64);
    Ok(Permutations::new(count as usize, seed))
}

/// Centroids reprojected to `target_crs`, with the layer they came from
fn projected_centroids(
    layer: &FeatureLayer,
    target_crs: &str,
) -> Result<(Vec<(f64, f64)>, Crs), OperationError> {
    let source: Crs = layer.crs.parse()?;
    let target: Crs = target_crs.parse()?;
    let transformer = Transformer::new(&source, &target)?;
    let points = centroids(layer)?
        .into_iter()
        .map(|(x, y)| transformer.transform(x, y))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((points, target))
}

struct Prepared {
    layer: FeatureLayer,
    values: Vec<f64>,
    points: Vec<(f64, f64)>,
    weights: SpatialWeights,
    threshold: f64,
    unit: &'static str,
    dependent_var: String,
}

fn prepare(args: &ToolArguments) -> Result<Prepared, OperationError> {
    let layer = FeatureLayer::read(&args.path("shapefile_path")?)?;
    let dependent_var = args.str("dependent_var")?.to_string();
    let values = numeric_column(&layer, &dependent_var)?;
    if values.len() < MIN_FEATURES {
        return Err(OperationError::domain(format!(
            "At least {} features are required, got {}",
            MIN_FEATURES,
            values.len()
        )));
    }

    let (points, target) = projected_centroids(&layer, args.str("target_crs")?)?;
    let distance = args.f64("distance_threshold")?;
    if distance <= 0.0 {
        return Err(OperationError::domain("'distance_threshold' must be positive"));
    }
    let (threshold, unit) = if target.is_geographic() {
        (distance / METERS_PER_DEGREE, "degrees")
    } else {
        (distance, "meters")
    };

    let mut weights = SpatialWeights::distance_band(&points, threshold, false);
    weights.row_standardize();
    debug!(
        features = values.len(),
        islands = weights.islands().len(),
        threshold,
        "Built distance-band weights"
    );

    Ok(Prepared {
        layer,
        values,
        points,
        weights,
        threshold,
        unit,
        dependent_var,
    })
}

/// Weights for local statistics: islands are dropped, and when every
/// feature is an island the k-nearest neighbours stand in for the band.
struct LocalWeights {
    kept: Vec<usize>,
    values: Vec<f64>,
    weights: SpatialWeights,
    kind: &'static str,
}

fn local_weights(prepared: &Prepared) -> Result<LocalWeights, OperationError> {
    let islands = prepared.weights.islands();
    let n = prepared.values.len();
    if islands.len() == n {
        let mut weights = SpatialWeights::knn(&prepared.points, FALLBACK_K.min(n - 1))?;
        weights.row_standardize();
        debug!(k = FALLBACK_K.min(n - 1), "Every feature is an island, using nearest neighbours");
        return Ok(LocalWeights {
            kept: (0..n).collect(),
            values: prepared.values.clone(),
            weights,
            kind: "knn",
        });
    }
    let kept: Vec<usize> = (0..n).filter(|i| !islands.contains(i)).collect();
    Ok(LocalWeights {
        values: kept.iter().map(|i| prepared.values[*i]).collect(),
        weights: prepared.weights.subset(&kept),
        kept,
        kind: "distance_band",
    })
}

fn data_preview(prepared: &Prepared) -> Result<Vec<Value>, OperationError> {
    Ok(prepared
        .layer
        .preview()?
        .into_iter()
        .map(|record| {
            let mut row = Map::new();
            row.insert(
                prepared.dependent_var.clone(),
                record[&prepared.dependent_var].clone(),
            );
            row.insert("geometry".to_string(), record["geometry"].clone());
            Value::Object(row)
        })
        .collect())
}

/// Fields every autocorrelation result carries
fn common_fields(prepared: &Prepared) -> Result<Map<String, Value>, OperationError> {
    let mut result = Map::new();
    result.insert("num_features".to_string(), json!(prepared.values.len()));
    result.insert("islands".to_string(), json!(prepared.weights.islands()));
    result.insert(
        "distance_threshold".to_string(),
        json!({ "value": prepared.threshold, "unit": prepared.unit }),
    );
    result.insert("data_preview".to_string(), json!(data_preview(prepared)?));
    Ok(result)
}

fn autocorrelation_result(
    prepared: &Prepared,
    key: &str,
    stat: Autocorrelation,
) -> Result<Value, OperationError> {
    let mut result = common_fields(prepared)?;
    result.insert(key.to_string(), json!(stat.value));
    result.insert("expected".to_string(), json!(stat.expected));
    result.insert("variance".to_string(), json!(stat.variance));
    result.insert("z_score".to_string(), json!(stat.z_score));
    result.insert("p_value".to_string(), json!(stat.p_value));
    Ok(Value::Object(result))
}

fn simulated_fields(key: &str, stat: Simulated) -> Value {
    json!({
        key: stat.value,
        "expected": stat.expected,
        "variance": stat.variance,
        "z_score": stat.z_score,
        "p_value": stat.p_value,
    })
}

fn local_result(
    prepared: &Prepared,
    local: &LocalWeights,
    key: &str,
    stat: LocalStatistic,
) -> Result<Value, OperationError> {
    let mut result = common_fields(prepared)?;
    result.insert(key.to_string(), json!(stat.values));
    result.insert("p_values".to_string(), json!(stat.p_values));
    result.insert("z_scores".to_string(), json!(stat.z_scores));
    result.insert("features".to_string(), json!(local.kept));
    result.insert("weights".to_string(), json!(local.kind));
    Ok(Value::Object(result))
}

fn execute_morans_i(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let stat = esda::morans_i(&prepared.values, &prepared.weights)?;
    Ok(autocorrelation_result(&prepared, "I", stat)?.into())
}

fn execute_gearys_c(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let stat = esda::gearys_c(&prepared.values, &prepared.weights)?;
    Ok(autocorrelation_result(&prepared, "C", stat)?.into())
}

fn execute_getis_ord_g(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let stat = esda::getis_ord_g(&prepared.values, &prepared.weights, permutations(args)?)?;
    let mut result = common_fields(&prepared)?;
    result.insert("getis_ord_g".to_string(), simulated_fields("G", stat));
    Ok(Value::Object(result).into())
}

fn execute_gamma(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let stat = esda::gamma(&prepared.values, &prepared.weights, permutations(args)?)?;
    let mut result = common_fields(&prepared)?;
    if let Value::Object(fields) = simulated_fields("Gamma", stat) {
        result.extend(fields);
    }
    Ok(Value::Object(result).into())
}

fn execute_moran_local(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let local = local_weights(&prepared)?;
    let stat = esda::moran_local(&local.values, &local.weights, permutations(args)?)?;
    Ok(local_result(&prepared, &local, "Is", stat)?.into())
}

fn execute_getis_ord_g_local(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let local = local_weights(&prepared)?;
    let stat = esda::getis_ord_g_local(&local.values, &local.weights, permutations(args)?)?;
    Ok(local_result(&prepared, &local, "G_local", stat)?.into())
}

fn execute_join_counts(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let counts = esda::join_counts(&prepared.values, &prepared.weights, permutations(args)?)?;
    let mut result = common_fields(&prepared)?;
    result.insert("join_counts".to_string(), json!(counts.joins));
    result.insert("bb".to_string(), json!(counts.bb));
    result.insert("bw".to_string(), json!(counts.bw));
    result.insert("ww".to_string(), json!(counts.ww));
    result.insert("expected".to_string(), json!(counts.bb_test.expected));
    result.insert("variance".to_string(), json!(counts.bb_test.variance));
    result.insert("z_score".to_string(), json!(counts.bb_test.z_score));
    result.insert("p_value".to_string(), json!(counts.bb_test.p_value));
    Ok(Value::Object(result).into())
}

fn execute_join_counts_local(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let prepared = prepare(args)?;
    let local = local_weights(&prepared)?;
    let counts = esda::join_counts_local(&local.values, &local.weights)?;
    let mut result = common_fields(&prepared)?;
    result.insert("local_join_counts".to_string(), json!(counts));
    result.insert("features".to_string(), json!(local.kept));
    result.insert("weights".to_string(), json!(local.kind));
    Ok(Value::Object(result).into())
}

fn execute_adbscan(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = FeatureLayer::read(&args.path("shapefile_path")?)?;
    if layer.is_empty() {
        return Err(OperationError::domain("Input file contains no features"));
    }
    let eps = args.f64("eps")?;
    if eps <= 0.0 {
        return Err(OperationError::domain("'eps' must be positive"));
    }
    let min_samples = args.i64("min_samples")?;
    if min_samples < 1 {
        return Err(OperationError::domain("'min_samples' must be at least 1"));
    }
    let (points, _) = projected_centroids(&layer, args.str("target_crs")?)?;
    let clustering = cluster::dbscan(&points, eps, min_samples as usize);
    debug!(clusters = clustering.clusters, "Clustered centroids");
    let preview: Vec<Value> = layer
        .preview()?
        .into_iter()
        .map(|record| json!({ "geometry": record["geometry"] }))
        .collect();
    Ok(json!({
        "labels": clustering.labels,
        "core_sample_indices": clustering.core_sample_indices,
        "components": clustering.components(&points),
        "num_clusters": clustering.clusters,
        "eps": eps,
        "min_samples": min_samples,
        "data_preview": preview,
    })
    .into())
}

/// Weights construction rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WeightsMethod {
    Queen,
    Rook,
    DistanceBand,
    Knn,
}

impl WeightsMethod {
    fn as_str(&self) -> &'static str {
        match self {
            WeightsMethod::Queen => "queen",
            WeightsMethod::Rook => "rook",
            WeightsMethod::DistanceBand => "distance_band",
            WeightsMethod::Knn => "knn",
        }
    }
}

impl FromStr for WeightsMethod {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queen" => Ok(WeightsMethod::Queen),
            "rook" => Ok(WeightsMethod::Rook),
            "distance_band" => Ok(WeightsMethod::DistanceBand),
            "knn" => Ok(WeightsMethod::Knn),
            other => Err(OperationError::domain(format!(
                "Unsupported method '{}' (supported: queen, rook, distance_band, knn)",
                other
            ))),
        }
    }
}

/// Weights built from `method_name` and its companion parameters
struct BuiltWeights {
    method: WeightsMethod,
    threshold: Option<f64>,
    k: Option<usize>,
    binary: bool,
    weights: SpatialWeights,
}

fn read_k(args: &ToolArguments) -> Result<Option<usize>, OperationError> {
    match args.opt_i64("k")? {
        Some(k) if k < 1 => Err(OperationError::domain("'k' must be at least 1")),
        Some(k) => Ok(Some(k as usize)),
        None => Ok(None),
    }
}

fn build_weights(
    layer: &FeatureLayer,
    args: &ToolArguments,
    method_name: &str,
) -> Result<BuiltWeights, OperationError> {
    let method: WeightsMethod = args.str(method_name)?.parse()?;
    let binary = args.bool("binary")?;
    let threshold = args.opt_f64("threshold")?;
    let k = read_k(args)?;
    let weights = match method {
        WeightsMethod::Queen => SpatialWeights::contiguity(&layer.geometries()?, Contiguity::Queen)?,
        WeightsMethod::Rook => SpatialWeights::contiguity(&layer.geometries()?, Contiguity::Rook)?,
        WeightsMethod::DistanceBand => {
            let threshold = threshold.ok_or_else(|| {
                OperationError::domain("'threshold' is required for the distance_band method")
            })?;
            if threshold <= 0.0 {
                return Err(OperationError::domain("'threshold' must be positive"));
            }
            SpatialWeights::distance_band(&centroids(layer)?, threshold, binary)
        }
        WeightsMethod::Knn => {
            let k = k.ok_or_else(|| OperationError::domain("'k' is required for the knn method"))?;
            SpatialWeights::knn(&centroids(layer)?, k)?
        }
    };
    Ok(BuiltWeights {
        method,
        threshold: threshold.filter(|_| method == WeightsMethod::DistanceBand),
        k: k.filter(|_| method == WeightsMethod::Knn),
        binary,
        weights,
    })
}

/// Observation ids from `id_field`, or positions when it is absent
fn observation_ids(layer: &FeatureLayer, id_field: Option<&str>) -> Vec<Value> {
    match id_field {
        Some(field) if layer.column_types().contains_key(field) => layer
            .features
            .iter()
            .map(|f| {
                f.properties
                    .as_ref()
                    .and_then(|p| p.get(field))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect(),
        Some(field) => {
            debug!(id_field = field, "id_field not in layer, using positional ids");
            (0..layer.len()).map(|i| json!(i)).collect()
        }
        None => (0..layer.len()).map(|i| json!(i)).collect(),
    }
}

fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Neighbour counts, islands and the first rows of a weights matrix
fn weights_summary(weights: &SpatialWeights, ids: &[Value]) -> Map<String, Value> {
    let counts = weights.cardinalities();
    let mut neighbors_preview = Map::new();
    let mut weights_preview = Map::new();
    for (i, row) in weights.neighbors.iter().enumerate().take(PREVIEW_ROWS) {
        let key = id_key(&ids[i]);
        neighbors_preview.insert(
            key.clone(),
            Value::Array(row.iter().map(|(j, _)| ids[*j].clone()).collect()),
        );
        weights_preview.insert(key, json!(row.iter().map(|(_, w)| *w).collect::<Vec<_>>()));
    }

    let mut summary = Map::new();
    summary.insert("n".to_string(), json!(weights.len()));
    summary.insert("id_count".to_string(), json!(ids.len()));
    summary.insert(
        "neighbors_stats".to_string(),
        json!({
            "min": counts.iter().min().copied().unwrap_or(0),
            "max": counts.iter().max().copied().unwrap_or(0),
            "mean": if counts.is_empty() {
                0.0
            } else {
                counts.iter().sum::<usize>() as f64 / counts.len() as f64
            },
        }),
    );
    summary.insert(
        "islands".to_string(),
        json!(weights.islands().into_iter().map(|i| ids[i].clone()).collect::<Vec<_>>()),
    );
    summary.insert("neighbors_preview".to_string(), Value::Object(neighbors_preview));
    summary.insert("weights_preview".to_string(), Value::Object(weights_preview));
    summary
}

fn read_nonempty(args: &ToolArguments, name: &str) -> Result<FeatureLayer, OperationError> {
    let layer = FeatureLayer::read(&args.path(name)?)?;
    if layer.is_empty() {
        return Err(OperationError::domain("Input file contains no features"));
    }
    Ok(layer)
}

fn execute_weights_from_shapefile(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = read_nonempty(args, "shapefile_path")?;
    let contiguity: Contiguity = args.str("contiguity")?.parse()?;
    let id_field = args.opt_str("id_field")?;
    let weights = SpatialWeights::contiguity(&layer.geometries()?, contiguity)?;
    let mut summary = weights_summary(&weights, &observation_ids(&layer, id_field));
    let name = match contiguity {
        Contiguity::Queen => "queen",
        Contiguity::Rook => "rook",
    };
    summary.insert("contiguity".to_string(), json!(name));
    summary.insert("id_field".to_string(), json!(id_field));
    Ok(Value::Object(summary).into())
}

fn execute_distance_band_weights(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = read_nonempty(args, "data_path")?;
    let threshold = args.f64("threshold")?;
    if threshold <= 0.0 {
        return Err(OperationError::domain("'threshold' must be positive"));
    }
    let binary = args.bool("binary")?;
    let id_field = args.opt_str("id_field")?;
    let weights = SpatialWeights::distance_band(&centroids(&layer)?, threshold, binary);
    let mut summary = weights_summary(&weights, &observation_ids(&layer, id_field));
    summary.insert("threshold".to_string(), json!(threshold));
    summary.insert("binary".to_string(), json!(binary));
    summary.insert("id_field".to_string(), json!(id_field));
    Ok(Value::Object(summary).into())
}

fn execute_knn_weights(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = read_nonempty(args, "data_path")?;
    let k = args.i64("k")?;
    if k < 1 {
        return Err(OperationError::domain("'k' must be at least 1"));
    }
    let id_field = args.opt_str("id_field")?;
    let weights = SpatialWeights::knn(&centroids(&layer)?, k as usize)?;
    let mut summary = weights_summary(&weights, &observation_ids(&layer, id_field));
    summary.insert("k".to_string(), json!(k));
    summary.insert("id_field".to_string(), json!(id_field));
    Ok(Value::Object(summary).into())
}

fn execute_build_and_transform(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = read_nonempty(args, "data_path")?;
    let transform: Transform = args.str("transform_type")?.parse()?;
    let mut built = build_weights(&layer, args, "method")?;
    built.weights.set_transform(transform);
    let id_field = args.opt_str("id_field")?;

    let mut summary = weights_summary(&built.weights, &observation_ids(&layer, id_field));
    summary.insert("method".to_string(), json!(built.method.as_str()));
    summary.insert("threshold".to_string(), json!(built.threshold));
    summary.insert("k".to_string(), json!(built.k));
    summary.insert(
        "binary".to_string(),
        json!((built.method == WeightsMethod::DistanceBand).then_some(built.binary)),
    );
    summary.insert("transform".to_string(), json!(transform.code()));
    summary.insert("id_field".to_string(), json!(id_field));
    Ok(Value::Object(summary).into())
}

fn execute_build_and_save(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = read_nonempty(args, "data_path")?;
    let transform = args
        .opt_str("transform_type")?
        .map(Transform::from_str)
        .transpose()?;
    let format: WeightsFormat = args.str("format")?.parse()?;

    let mut output = args.path("output_path")?;
    let has_extension = output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(format.extension()));
    if !has_extension {
        let mut name = output.into_os_string();
        name.push(".");
        name.push(format.extension());
        output = PathBuf::from(name);
    }
    if output.exists() && !args.bool("overwrite")? {
        return Err(OperationError::domain(format!(
            "File already exists: {}. Set overwrite=true to replace it.",
            output.display()
        )));
    }

    let mut built = build_weights(&layer, args, "method")?;
    if let Some(transform) = transform {
        built.weights.set_transform(transform);
    }
    let ids: Vec<String> = observation_ids(&layer, args.opt_str("id_field")?)
        .iter()
        .map(id_key)
        .collect();
    built.weights.write(&output, format, &ids)?;
    debug!(path = %output.display(), method = built.method.as_str(), "Saved weights");

    let mut artifact = Artifact::new(&output, format.extension());
    artifact.metadata.insert("n".to_string(), json!(built.weights.len()));
    artifact.metadata.insert("method".to_string(), json!(built.method.as_str()));
    artifact
        .metadata
        .insert("transform".to_string(), json!(built.weights.transform().code()));
    artifact.metadata.insert(
        "islands".to_string(),
        json!(built.weights.islands().into_iter().map(|i| ids[i].clone()).collect::<Vec<_>>()),
    );
    Ok(artifact.into())
}

fn execute_ols(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let layer = read_nonempty(args, "data_path")?;
    let y_field = args.str("y_field")?;
    let x_fields = args.str_list("x_fields")?;
    if x_fields.is_empty() {
        return Err(OperationError::domain("'x_fields' must name at least one attribute"));
    }
    let y = numeric_column(&layer, y_field)?;
    let columns = x_fields
        .iter()
        .map(|field| numeric_column(&layer, field))
        .collect::<Result<Vec<_>, _>>()?;

    let mut weights = match args.opt_path("weights_path")? {
        Some(path) => {
            let ids: Vec<String> = observation_ids(&layer, args.opt_str("id_field")?)
                .iter()
                .map(id_key)
                .collect();
            SpatialWeights::read(&path, &ids)?
        }
        None => build_weights(&layer, args, "weights_method")?.weights,
    };
    weights.row_standardize();

    let fit = regression::ols(&y, &columns, &weights)?;
    let mut betas = Map::new();
    betas.insert(regression::CONSTANT.to_string(), json!(fit.betas[0]));
    for (field, beta) in x_fields.iter().zip(&fit.betas[1..]) {
        betas.insert(field.clone(), json!(beta));
    }
    Ok(json!({
        "n_obs": fit.n_obs,
        "r2": fit.r2,
        "std_error": fit.std_errors,
        "betas": betas,
        "moran_residual": fit.moran_residual.map(|(i, _)| i),
        "moran_pvalue": fit.moran_residual.map(|(_, p)| p),
    })
    .into())
}
