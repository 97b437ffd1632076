//! Projection operations: coordinate transforms, CRS metadata and geodesy
//!
//! Point transforms delegate to `proj4rs` (see [`crs`]). Geodesic
//! measurements run on the WGS 84 ellipsoid through `geo`'s Karney
//! implementation; other ellipsoids are rejected there.

pub mod crs;

use geo::{Bearing, Destination, Distance, Geodesic, GeodesicArea, Geometry, MapCoords, Point};
use gis_mcp_application::{
    HandlerContext, HandlerResult, OperationDescriptor, OperationError, OperationProvider,
};
use gis_mcp_domain::{OperationGroup, ParameterKind, ToolArguments, ToolDefinition, ToolParameter};
use serde_json::json;

use self::crs::{Crs, CrsError, CrsKind, Ellipsoid};
use super::support::{coordinate_pair, geometry_value, parse_wkt, to_multi_polygon};

pub use self::crs::Transformer;

/// Tool name constants
pub const TRANSFORM_COORDINATES: &str = "transform_coordinates";
pub const PROJECT_GEOMETRY: &str = "project_geometry";
pub const GET_CRS_INFO: &str = "get_crs_info";
pub const GET_AVAILABLE_CRS: &str = "get_available_crs";
pub const GET_UTM_ZONE: &str = "get_utm_zone";
pub const GET_UTM_CRS: &str = "get_utm_crs";
pub const CALCULATE_GEODETIC_DISTANCE: &str = "calculate_geodetic_distance";
pub const CALCULATE_GEODETIC_POINT: &str = "calculate_geodetic_point";
pub const CALCULATE_GEODETIC_AREA: &str = "calculate_geodetic_area";
pub const GET_GEOD_INFO: &str = "get_geod_info";
pub const GET_GEOCENTRIC_CRS: &str = "get_geocentric_crs";

const SUPPORTED_ELLIPSOID: &str = "WGS84";

impl From<CrsError> for OperationError {
    fn from(err: CrsError) -> Self {
        OperationError::domain(err.to_string())
    }
}

fn crs_param(name: &str, description: &str) -> ToolParameter {
    ToolParameter::new(name, description, true)
}

fn lon_lat_param(name: &str, description: &str) -> ToolParameter {
    ToolParameter::new(name, description, true)
        .with_kind(ParameterKind::sequence_of(ParameterKind::Number))
}

fn ellps_param() -> ToolParameter {
    ToolParameter::new("ellps", "Ellipsoid name (only WGS84 is supported)", false)
        .with_default(SUPPORTED_ELLIPSOID)
}

fn axis_param(name: &str, description: &str) -> ToolParameter {
    ToolParameter::new(name, description, false).with_kind(ParameterKind::Number)
}

fn define(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, OperationGroup::Projection)
}

#[derive(Debug, Default, Clone)]
pub struct ProjectionProvider;

impl ProjectionProvider {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProvider for ProjectionProvider {
    fn id(&self) -> &str {
        "projection"
    }

    fn group(&self) -> OperationGroup {
        OperationGroup::Projection
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![
            OperationDescriptor::new(
                define(TRANSFORM_COORDINATES, "Transform an [x, y] coordinate between CRSs")
                    .with_parameter(lon_lat_param("coordinates", "Coordinate as [x, y]"))
                    .with_parameter(crs_param("source_crs", "Source CRS, e.g. EPSG:4326"))
                    .with_parameter(crs_param("target_crs", "Target CRS, e.g. EPSG:3857")),
                execute_transform_coordinates,
            ),
            OperationDescriptor::new(
                define(PROJECT_GEOMETRY, "Reproject a WKT geometry between CRSs")
                    .with_parameter(ToolParameter::new("geometry", "Geometry in WKT format", true))
                    .with_parameter(crs_param("source_crs", "Source CRS"))
                    .with_parameter(crs_param("target_crs", "Target CRS")),
                execute_project_geometry,
            ),
            OperationDescriptor::new(
                define(GET_CRS_INFO, "Describe a CRS").with_parameter(crs_param("crs", "CRS code")),
                execute_crs_info,
            ),
            OperationDescriptor::new(
                define(GET_AVAILABLE_CRS, "List every supported CRS"),
                |_: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let crs_list: Vec<_> = Crs::all()
                        .map(|crs| {
                            json!({
                                "auth_name": "EPSG",
                                "code": crs.epsg().map(|code| code.to_string()),
                                "name": crs.name(),
                                "type": crs.type_name(),
                            })
                        })
                        .collect();
                    Ok(json!({ "crs_list": crs_list }).into())
                },
            ),
            OperationDescriptor::new(
                define(GET_UTM_ZONE, "UTM zone number for a [lon, lat] position")
                    .with_parameter(lon_lat_param("coordinates", "Position as [lon, lat]")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    match utm_crs(args)? {
                        Crs::Utm { zone, north } => Ok(json!({
                            "zone": zone,
                            "hemisphere": if north { "north" } else { "south" },
                        })
                        .into()),
                        other => Err(OperationError::internal(format!(
                            "UTM lookup produced {}",
                            other
                        ))),
                    }
                },
            ),
            OperationDescriptor::new(
                define(GET_UTM_CRS, "UTM CRS code for a [lon, lat] position")
                    .with_parameter(lon_lat_param("coordinates", "Position as [lon, lat]")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let crs = utm_crs(args)?;
                    Ok(json!({ "crs": crs.to_string(), "name": crs.name() }).into())
                },
            ),
            OperationDescriptor::new(
                define(CALCULATE_GEODETIC_DISTANCE, "Geodesic distance and azimuths between two points")
                    .with_parameter(lon_lat_param("point1", "First point as [lon, lat]"))
                    .with_parameter(lon_lat_param("point2", "Second point as [lon, lat]"))
                    .with_parameter(ellps_param()),
                execute_geodetic_distance,
            ),
            OperationDescriptor::new(
                define(CALCULATE_GEODETIC_POINT, "Point reached from a start point, azimuth and distance")
                    .with_parameter(lon_lat_param("start_point", "Start point as [lon, lat]"))
                    .with_parameter(
                        ToolParameter::new("azimuth", "Forward azimuth in degrees", true)
                            .with_kind(ParameterKind::Number),
                    )
                    .with_parameter(
                        ToolParameter::new("distance", "Distance in meters", true)
                            .with_kind(ParameterKind::Number),
                    )
                    .with_parameter(ellps_param()),
                execute_geodetic_point,
            ),
            OperationDescriptor::new(
                define(CALCULATE_GEODETIC_AREA, "Geodesic area of a lon/lat polygon")
                    .with_parameter(ToolParameter::new("geometry", "Polygon in WKT (lon/lat)", true))
                    .with_parameter(ellps_param()),
                execute_geodetic_area,
            ),
            OperationDescriptor::new(
                define(GET_GEOD_INFO, "Parameters of a reference ellipsoid")
                    .with_parameter(
                        ToolParameter::new("ellps", "Ellipsoid name, e.g. WGS84, GRS80, clrk66", false)
                            .with_default(SUPPORTED_ELLIPSOID),
                    )
                    .with_parameter(axis_param("a", "Semi-major axis override in meters"))
                    .with_parameter(axis_param("b", "Semi-minor axis override in meters"))
                    .with_parameter(axis_param("f", "Flattening override")),
                execute_geod_info,
            ),
            OperationDescriptor::new(
                define(GET_GEOCENTRIC_CRS, "Earth-centred CRS for a [lon, lat] position")
                    .with_parameter(lon_lat_param("coordinates", "Position as [lon, lat]")),
                execute_geocentric_crs,
            ),
        ]
    }
}

fn parse_crs(args: &ToolArguments, name: &str) -> Result<Crs, OperationError> {
    Ok(args.str(name)?.parse::<Crs>()?)
}

fn check_ellipsoid(args: &ToolArguments) -> Result<(), OperationError> {
    let ellps = args.str("ellps")?;
    if ellps.replace([' ', '-'], "").eq_ignore_ascii_case(SUPPORTED_ELLIPSOID) {
        Ok(())
    } else {
        Err(OperationError::domain(format!(
            "Unsupported ellipsoid '{}' (supported: {})",
            ellps, SUPPORTED_ELLIPSOID
        )))
    }
}

fn lon_lat(args: &ToolArguments, name: &str) -> Result<Point<f64>, OperationError> {
    let (lon, lat) = coordinate_pair(name, &args.f64_list(name)?)?;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(OperationError::domain(format!(
            "Latitude {} in '{}' is outside [-90, 90]",
            lat, name
        )));
    }
    Ok(Point::new(lon, lat))
}

fn utm_crs(args: &ToolArguments) -> Result<Crs, OperationError> {
    let point = lon_lat(args, "coordinates")?;
    Ok(Crs::utm_for(point.x(), point.y())?)
}

/// Azimuth normalized to (-180, 180]
fn normalize_azimuth(degrees: f64) -> f64 {
    let wrapped = (degrees + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

fn execute_transform_coordinates(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let (x, y) = coordinate_pair("coordinates", &args.f64_list("coordinates")?)?;
    let source = parse_crs(args, "source_crs")?;
    let target = parse_crs(args, "target_crs")?;
    let (tx, ty) = Transformer::new(&source, &target)?.transform(x, y)?;
    Ok(json!({
        "coordinates": [tx, ty],
        "source_crs": source.to_string(),
        "target_crs": target.to_string(),
    })
    .into())
}

fn execute_project_geometry(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry: Geometry<f64> = parse_wkt("geometry", args.str("geometry")?)?;
    let source = parse_crs(args, "source_crs")?;
    let target = parse_crs(args, "target_crs")?;
    let transformer = Transformer::new(&source, &target)?;
    let projected = geometry.try_map_coords(|coord| {
        transformer
            .transform(coord.x, coord.y)
            .map(|(x, y)| geo::Coord { x, y })
    })?;
    let mut data = geometry_value(&projected);
    data["source_crs"] = json!(source.to_string());
    data["target_crs"] = json!(target.to_string());
    Ok(data.into())
}

fn execute_crs_info(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let crs = parse_crs(args, "crs")?;
    let area_of_use = crs.area_of_use().map(|[west, south, east, north]| {
        json!({ "west": west, "south": south, "east": east, "north": north })
    });
    Ok(json!({
        "crs": crs.to_string(),
        "name": crs.name(),
        "type": crs.type_name(),
        "axis_info": crs.axis_directions(),
        "is_geographic": crs.is_geographic(),
        "is_projected": crs.kind() == CrsKind::Projected,
        "is_geocentric": crs.kind() == CrsKind::Geocentric,
        "datum": crs.datum(),
        "ellipsoid": crs.ellipsoid(),
        "prime_meridian": "Greenwich",
        "proj4": crs.proj_string(),
        "area_of_use": area_of_use,
    })
    .into())
}

fn execute_geodetic_distance(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    check_ellipsoid(args)?;
    let p1 = lon_lat(args, "point1")?;
    let p2 = lon_lat(args, "point2")?;
    let distance = Geodesic.distance(p1, p2);
    let (forward, back) = if distance == 0.0 {
        (0.0, 0.0)
    } else {
        (
            normalize_azimuth(Geodesic.bearing(p1, p2)),
            normalize_azimuth(Geodesic.bearing(p2, p1)),
        )
    };
    Ok(json!({
        "distance": distance,
        "forward_azimuth": forward,
        "back_azimuth": back,
        "ellps": SUPPORTED_ELLIPSOID,
        "unit": "meters",
    })
    .into())
}

fn execute_geodetic_point(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    check_ellipsoid(args)?;
    let start = lon_lat(args, "start_point")?;
    let azimuth = args.f64("azimuth")?;
    let distance = args.f64("distance")?;
    if distance < 0.0 {
        return Err(OperationError::domain(format!(
            "Distance must not be negative, got {}",
            distance
        )));
    }
    let end = Geodesic.destination(start, azimuth, distance);
    let back = if distance == 0.0 {
        normalize_azimuth(azimuth + 180.0)
    } else {
        normalize_azimuth(Geodesic.bearing(end, start))
    };
    Ok(json!({
        "point": [end.x(), end.y()],
        "back_azimuth": back,
        "ellps": SUPPORTED_ELLIPSOID,
    })
    .into())
}

fn execute_geodetic_area(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    check_ellipsoid(args)?;
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let area = to_multi_polygon(&geometry)?.geodesic_area_unsigned();
    Ok(json!({
        "area": area,
        "ellps": SUPPORTED_ELLIPSOID,
        "unit": "square_meters",
    })
    .into())
}

fn execute_geod_info(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let name = args.str("ellps")?;
    let base = Ellipsoid::lookup(name).ok_or_else(|| {
        OperationError::domain(format!("Unknown ellipsoid '{}'", name))
    })?;

    let a = args.opt_f64("a")?.unwrap_or(base.a);
    let f = match (args.opt_f64("b")?, args.opt_f64("f")?) {
        (Some(b), _) => (a - b) / a,
        (None, Some(f)) => f,
        (None, None) => base.flattening(),
    };
    if !(a.is_finite() && a > 0.0) || !(0.0..1.0).contains(&f) {
        return Err(OperationError::domain(format!(
            "Invalid ellipsoid parameters: a = {}, f = {}",
            a, f
        )));
    }
    let es = f * (2.0 - f);
    Ok(json!({
        "ellps": name,
        "ellipsoid": base.name,
        "a": a,
        "b": a * (1.0 - f),
        "f": f,
        "es": es,
        "e": es.sqrt(),
    })
    .into())
}

fn execute_geocentric_crs(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let position = lon_lat(args, "coordinates")?;
    let geocentric: Crs = "EPSG:4978".parse()?;
    let (x, y, z) = Transformer::new(&Crs::wgs84(), &geocentric)?.transform_3d(
        position.x(),
        position.y(),
        0.0,
    )?;
    Ok(json!({
        "crs": geocentric.to_string(),
        "name": geocentric.name(),
        "proj4": geocentric.proj_string(),
        "position": [x, y, z],
    })
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gis_mcp_application::ports::storage_resolver::{StorageError, StorageResolverPort};
    use gis_mcp_domain::StorageCategory;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    struct NoStorage;

    impl StorageResolverPort for NoStorage {
        fn root(&self) -> &Path {
            Path::new("/")
        }
        fn resolve(&self, raw: &str, _: Option<StorageCategory>) -> Result<PathBuf, StorageError> {
            Ok(PathBuf::from(raw))
        }
        fn locate(&self, raw: &str, _: Option<StorageCategory>) -> Result<PathBuf, StorageError> {
            Ok(PathBuf::from(raw))
        }
        fn category_dir(&self, c: StorageCategory) -> Result<PathBuf, StorageError> {
            Ok(PathBuf::from(c.dir_name()))
        }
    }

    fn call(name: &str, args: ToolArguments) -> HandlerResult {
        let ctx = HandlerContext::new(Arc::new(NoStorage));
        ProjectionProvider::new()
            .operations()
            .into_iter()
            .find(|d| d.name() == name)
            .unwrap()
            .handler
            .call(&args, &ctx)
    }

    #[test]
    fn test_transform_origin_to_web_mercator() {
        let data = call(
            TRANSFORM_COORDINATES,
            ToolArguments::new()
                .with("coordinates", json!([0.0, 0.0]))
                .with("source_crs", "EPSG:4326")
                .with("target_crs", "EPSG:3857"),
        )
        .unwrap()
        .into_data();
        let coords = data["coordinates"].as_array().unwrap();
        assert_eq!(coords.len(), 2);
        assert!(coords[0].as_f64().unwrap().abs() < 1e-9);
        assert!(coords[1].as_f64().unwrap().abs() < 1e-9);
        assert_eq!(data["target_crs"], "EPSG:3857");
    }

    #[test]
    fn test_unsupported_crs_is_domain_error() {
        let result = call(
            TRANSFORM_COORDINATES,
            ToolArguments::new()
                .with("coordinates", json!([0.0, 0.0]))
                .with("source_crs", "EPSG:4326")
                .with("target_crs", "EPSG:99999"),
        );
        assert!(matches!(result, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_project_geometry() {
        let data = call(
            PROJECT_GEOMETRY,
            ToolArguments::new()
                .with("geometry", "POINT(9 45)")
                .with("source_crs", "EPSG:4326")
                .with("target_crs", "EPSG:32632"),
        )
        .unwrap()
        .into_data();
        let projected = parse_wkt("wkt", data["wkt"].as_str().unwrap()).unwrap();
        let Geometry::Point(p) = projected else { panic!("expected point") };
        assert!((p.x() - 500_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_utm_lookup() {
        let args = || ToolArguments::new().with("coordinates", json!([13.4, 52.5]));
        let zone = call(GET_UTM_ZONE, args()).unwrap().into_data();
        assert_eq!(zone["zone"], 33);
        assert_eq!(zone["hemisphere"], "north");
        let crs = call(GET_UTM_CRS, args()).unwrap().into_data();
        assert_eq!(crs["crs"], "EPSG:32633");
    }

    #[test]
    fn test_crs_info_and_listing() {
        let info = call(GET_CRS_INFO, ToolArguments::new().with("crs", "EPSG:4326"))
            .unwrap()
            .into_data();
        assert_eq!(info["is_geographic"], true);
        assert_eq!(info["name"], "WGS 84");

        let listing = call(GET_AVAILABLE_CRS, ToolArguments::new()).unwrap().into_data();
        assert_eq!(
            listing["crs_list"].as_array().unwrap().len(),
            crs::CATALOG.len() + 120
        );

        let custom = call(
            GET_CRS_INFO,
            ToolArguments::new().with("crs", "+proj=merc +datum=WGS84"),
        )
        .unwrap()
        .into_data();
        assert_eq!(custom["is_projected"], true);
        assert!(custom["area_of_use"].is_null());
    }

    #[test]
    fn test_geod_info() {
        let data = call(GET_GEOD_INFO, ToolArguments::new().with("ellps", "GRS80"))
            .unwrap()
            .into_data();
        assert_eq!(data["a"], 6_378_137.0);
        assert!((data["b"].as_f64().unwrap() - 6_356_752.314).abs() < 1e-2);
        assert!((data["e"].as_f64().unwrap() - 0.081_819_191).abs() < 1e-8);

        let sphere = call(
            GET_GEOD_INFO,
            ToolArguments::new()
                .with("ellps", "WGS84")
                .with("a", 6_371_000.0)
                .with("f", 0.0),
        )
        .unwrap()
        .into_data();
        assert_eq!(sphere["b"], 6_371_000.0);
        assert_eq!(sphere["es"], 0.0);

        let unknown = call(GET_GEOD_INFO, ToolArguments::new().with("ellps", "mars"));
        assert!(matches!(unknown, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_geocentric_crs() {
        let data = call(
            GET_GEOCENTRIC_CRS,
            ToolArguments::new().with("coordinates", json!([90.0, 0.0])),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["crs"], "EPSG:4978");
        let position = data["position"].as_array().unwrap();
        assert!(position[0].as_f64().unwrap().abs() < 1e-3);
        assert!((position[1].as_f64().unwrap() - 6_378_137.0).abs() < 1e-3);
    }

    #[test]
    fn test_transform_to_british_national_grid() {
        let data = call(
            TRANSFORM_COORDINATES,
            ToolArguments::new()
                .with("coordinates", json!([-0.1276, 51.5072]))
                .with("source_crs", "EPSG:4326")
                .with("target_crs", "EPSG:27700"),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["target_crs"], "EPSG:27700");
        let easting = data["coordinates"][0].as_f64().unwrap();
        assert!((easting - 530_000.0).abs() < 1_000.0, "easting {}", easting);
    }

    #[test]
    fn test_geodetic_distance_along_equator() {
        let data = call(
            CALCULATE_GEODETIC_DISTANCE,
            ToolArguments::new()
                .with("point1", json!([0.0, 0.0]))
                .with("point2", json!([1.0, 0.0]))
                .with("ellps", "WGS84"),
        )
        .unwrap()
        .into_data();
        let distance = data["distance"].as_f64().unwrap();
        assert!((distance - 111_319.49).abs() < 0.1, "distance {}", distance);
        assert!((data["forward_azimuth"].as_f64().unwrap() - 90.0).abs() < 1e-6);
        assert!((data["back_azimuth"].as_f64().unwrap() + 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_geodetic_point_and_ellipsoid_check() {
        let data = call(
            CALCULATE_GEODETIC_POINT,
            ToolArguments::new()
                .with("start_point", json!([0.0, 0.0]))
                .with("azimuth", 0.0)
                .with("distance", 10_000.0)
                .with("ellps", "WGS84"),
        )
        .unwrap()
        .into_data();
        assert!(data["point"][0].as_f64().unwrap().abs() < 1e-9);
        assert!(data["point"][1].as_f64().unwrap() > 0.09);

        let bad = call(
            CALCULATE_GEODETIC_POINT,
            ToolArguments::new()
                .with("start_point", json!([0.0, 0.0]))
                .with("azimuth", 0.0)
                .with("distance", 1.0)
                .with("ellps", "clrk66"),
        );
        assert!(matches!(bad, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_geodetic_area_of_one_degree_cell() {
        let data = call(
            CALCULATE_GEODETIC_AREA,
            ToolArguments::new()
                .with("geometry", "POLYGON((0 0,1 0,1 1,0 1,0 0))")
                .with("ellps", "WGS84"),
        )
        .unwrap()
        .into_data();
        let area = data["area"].as_f64().unwrap();
        // about 12,308 km2 near the equator
        assert!((area - 1.2308e10).abs() < 2e7, "area {}", area);
    }

    #[test]
    fn test_azimuth_normalization() {
        assert_eq!(normalize_azimuth(270.0), -90.0);
        assert_eq!(normalize_azimuth(-180.0), 180.0);
        assert_eq!(normalize_azimuth(45.0), 45.0);
    }
}
