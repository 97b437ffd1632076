//! Geometry operations: WKT in, WKT out
//!
//! Set operations, hulls, affine transforms, validity repair, simplification
//! and planar measurements over the `geo` engine. Boolean operations accept
//! polygonal inputs only. Delaunay triangulation runs on `spade`.

use geo::algorithm::buffer::{BufferStyle, LineCap, LineJoin};
use geo::line_intersection::{LineIntersection, line_intersection};
use geo::orient::Direction;
use geo::{
    AffineOps, AffineTransform, Area, BooleanOps, Buffer, Centroid, Closest, ClosestPoint,
    ConvexHull, Coord, CoordsIter, Geometry, GeometryCollection, Line, LineString, MapCoords,
    MinimumRotatedRect, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
    Orient, RemoveRepeatedPoints, Simplify, Validation, unary_union,
};
use spade::{DelaunayTriangulation, Point2, Triangulation};
use gis_mcp_application::{
    HandlerContext, HandlerResult, OperationDescriptor, OperationError, OperationProvider,
};
use gis_mcp_domain::{OperationGroup, ParameterKind, ToolArguments, ToolDefinition, ToolParameter};
use serde_json::json;
use std::f64::consts::FRAC_PI_2;

use super::support::{
    bounds, collapse, from_geojson_geometry, geometry_type, geometry_value, parse_wkt, to_geojson_geometry,
    to_multi_polygon, to_wkt,
};

/// Tool name constants
pub const BUFFER: &str = "buffer";
pub const INTERSECTION: &str = "intersection";
pub const UNION: &str = "union";
pub const DIFFERENCE: &str = "difference";
pub const SYMMETRIC_DIFFERENCE: &str = "symmetric_difference";
pub const CONVEX_HULL: &str = "convex_hull";
pub const ENVELOPE: &str = "envelope";
pub const MINIMUM_ROTATED_RECTANGLE: &str = "minimum_rotated_rectangle";
pub const GET_CENTROID: &str = "get_centroid";
pub const GET_BOUNDS: &str = "get_bounds";
pub const GET_COORDINATES: &str = "get_coordinates";
pub const GET_GEOMETRY_TYPE: &str = "get_geometry_type";
pub const ROTATE_GEOMETRY: &str = "rotate_geometry";
pub const SCALE_GEOMETRY: &str = "scale_geometry";
pub const TRANSLATE_GEOMETRY: &str = "translate_geometry";
pub const UNARY_UNION_GEOMETRIES: &str = "unary_union_geometries";
pub const GET_LENGTH: &str = "get_length";
pub const GET_AREA: &str = "get_area";
pub const GEOMETRY_TO_GEOJSON: &str = "geometry_to_geojson";
pub const GEOJSON_TO_GEOMETRY: &str = "geojson_to_geometry";
pub const IS_VALID: &str = "is_valid";
pub const MAKE_VALID: &str = "make_valid";
pub const SIMPLIFY: &str = "simplify";
pub const SNAP_GEOMETRY: &str = "snap_geometry";
pub const NEAREST_POINT_ON_GEOMETRY: &str = "nearest_point_on_geometry";
pub const NORMALIZE_GEOMETRY: &str = "normalize_geometry";
pub const TRIANGULATE_GEOMETRY: &str = "triangulate_geometry";
pub const VORONOI: &str = "voronoi";

fn wkt_param(name: &str) -> ToolParameter {
    ToolParameter::new(name, "Geometry in WKT format", true)
}

fn origin_param() -> ToolParameter {
    ToolParameter::new(
        "origin",
        "'center' (bounding box), 'centroid', or an 'x,y' coordinate",
        false,
    )
    .with_default("center")
}

fn number_param(name: &str, description: &str) -> ToolParameter {
    ToolParameter::new(name, description, true).with_kind(ParameterKind::Number)
}

fn define(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, OperationGroup::Geometry)
}

/// Provider for the geometry group
#[derive(Debug, Default, Clone)]
pub struct GeometryProvider;

impl GeometryProvider {
    pub fn new() -> Self {
        Self
    }
}

impl OperationProvider for GeometryProvider {
    fn id(&self) -> &str {
        "geometry"
    }

    fn group(&self) -> OperationGroup {
        OperationGroup::Geometry
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        vec![
            OperationDescriptor::new(
                define(BUFFER, "Buffer a geometry by a positive distance (round joins)")
                    .with_parameter(wkt_param("geometry"))
                    .with_parameter(number_param("distance", "Buffer distance in CRS units"))
                    .with_parameter(
                        ToolParameter::new("resolution", "Segments per quarter circle", false)
                            .with_kind(ParameterKind::Integer)
                            .with_default(16),
                    ),
                execute_buffer,
            ),
            OperationDescriptor::new(
                define(INTERSECTION, "Intersection of two polygonal geometries")
                    .with_parameter(wkt_param("geometry1"))
                    .with_parameter(wkt_param("geometry2")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    boolean_op(args, |a, b| a.intersection(b))
                },
            ),
            OperationDescriptor::new(
                define(UNION, "Union of two polygonal geometries")
                    .with_parameter(wkt_param("geometry1"))
                    .with_parameter(wkt_param("geometry2")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    boolean_op(args, |a, b| a.union(b))
                },
            ),
            OperationDescriptor::new(
                define(DIFFERENCE, "Part of geometry1 not covered by geometry2")
                    .with_parameter(wkt_param("geometry1"))
                    .with_parameter(wkt_param("geometry2")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    boolean_op(args, |a, b| a.difference(b))
                },
            ),
            OperationDescriptor::new(
                define(SYMMETRIC_DIFFERENCE, "Parts covered by exactly one of the geometries")
                    .with_parameter(wkt_param("geometry1"))
                    .with_parameter(wkt_param("geometry2")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    boolean_op(args, |a, b| a.xor(b))
                },
            ),
            OperationDescriptor::new(
                define(CONVEX_HULL, "Convex hull of a geometry").with_parameter(wkt_param("geometry")),
                execute_convex_hull,
            ),
            OperationDescriptor::new(
                define(ENVELOPE, "Axis-aligned bounding rectangle of a geometry")
                    .with_parameter(wkt_param("geometry")),
                execute_envelope,
            ),
            OperationDescriptor::new(
                define(MINIMUM_ROTATED_RECTANGLE, "Smallest rotated rectangle enclosing a geometry")
                    .with_parameter(wkt_param("geometry")),
                execute_minimum_rotated_rectangle,
            ),
            OperationDescriptor::new(
                define(GET_CENTROID, "Centroid of a geometry").with_parameter(wkt_param("geometry")),
                execute_centroid,
            ),
            OperationDescriptor::new(
                define(GET_BOUNDS, "Bounds as [minx, miny, maxx, maxy]")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    Ok(json!({ "bounds": bounds(&geometry)? }).into())
                },
            ),
            OperationDescriptor::new(
                define(GET_COORDINATES, "All vertex coordinates of a geometry")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    let coordinates: Vec<[f64; 2]> =
                        geometry.coords_iter().map(|c| [c.x, c.y]).collect();
                    Ok(json!({ "coordinates": coordinates }).into())
                },
            ),
            OperationDescriptor::new(
                define(GET_GEOMETRY_TYPE, "Geometry type name (Point, Polygon, ...)")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    Ok(json!({ "geometry_type": geometry_type(&geometry) }).into())
                },
            ),
            OperationDescriptor::new(
                define(ROTATE_GEOMETRY, "Rotate a geometry counter-clockwise")
                    .with_parameter(wkt_param("geometry"))
                    .with_parameter(number_param("angle", "Rotation angle"))
                    .with_parameter(origin_param())
                    .with_parameter(
                        ToolParameter::new("use_radians", "Angle is given in radians", false)
                            .with_kind(ParameterKind::Boolean)
                            .with_default(false),
                    ),
                execute_rotate,
            ),
            OperationDescriptor::new(
                define(SCALE_GEOMETRY, "Scale a geometry along x and y")
                    .with_parameter(wkt_param("geometry"))
                    .with_parameter(number_param("xfact", "Scale factor along x"))
                    .with_parameter(number_param("yfact", "Scale factor along y"))
                    .with_parameter(origin_param()),
                execute_scale,
            ),
            OperationDescriptor::new(
                define(TRANSLATE_GEOMETRY, "Shift a geometry by an offset")
                    .with_parameter(wkt_param("geometry"))
                    .with_parameter(number_param("xoff", "Offset along x"))
                    .with_parameter(number_param("yoff", "Offset along y")),
                execute_translate,
            ),
            OperationDescriptor::new(
                define(UNARY_UNION_GEOMETRIES, "Union of a list of polygonal geometries")
                    .with_parameter(
                        ToolParameter::new("geometries", "Geometries in WKT format", true)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::String)),
                    ),
                execute_unary_union,
            ),
            OperationDescriptor::new(
                define(GET_LENGTH, "Planar length (perimeter for polygons)")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    Ok(json!({ "length": planar_length(&geometry) }).into())
                },
            ),
            OperationDescriptor::new(
                define(GET_AREA, "Planar area").with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    Ok(json!({ "area": geometry.unsigned_area() }).into())
                },
            ),
            OperationDescriptor::new(
                define(GEOMETRY_TO_GEOJSON, "Convert WKT to a GeoJSON geometry object")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    let geojson = serde_json::to_value(to_geojson_geometry(&geometry))
                        .map_err(|e| OperationError::internal(e.to_string()))?;
                    Ok(json!({ "geojson": geojson }).into())
                },
            ),
            OperationDescriptor::new(
                define(GEOJSON_TO_GEOMETRY, "Convert a GeoJSON geometry (or Feature) to WKT")
                    .with_parameter(
                        ToolParameter::new("geojson", "GeoJSON geometry or Feature object", true)
                            .with_kind(ParameterKind::Mapping),
                    ),
                execute_geojson_to_geometry,
            ),
            OperationDescriptor::new(
                define(IS_VALID, "Check OGC validity and report the reasons a geometry is invalid")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    let reasons: Vec<String> = geometry
                        .validation_errors()
                        .iter()
                        .map(ToString::to_string)
                        .collect();
                    Ok(json!({ "is_valid": reasons.is_empty(), "reasons": reasons }).into())
                },
            ),
            OperationDescriptor::new(
                define(MAKE_VALID, "Repair an invalid geometry")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    Ok(geometry_value(&make_valid(&geometry)).into())
                },
            ),
            OperationDescriptor::new(
                define(SIMPLIFY, "Douglas-Peucker simplification")
                    .with_parameter(wkt_param("geometry"))
                    .with_parameter(number_param("tolerance", "Maximum deviation in CRS units"))
                    .with_parameter(
                        ToolParameter::new(
                            "preserve_topology",
                            "Keep the original part wherever simplifying would make it invalid",
                            false,
                        )
                        .with_kind(ParameterKind::Boolean)
                        .with_default(true),
                    ),
                execute_simplify,
            ),
            OperationDescriptor::new(
                define(SNAP_GEOMETRY, "Snap vertices of geometry1 to nearby vertices of geometry2")
                    .with_parameter(wkt_param("geometry1"))
                    .with_parameter(wkt_param("geometry2"))
                    .with_parameter(number_param("tolerance", "Snapping distance in CRS units")),
                execute_snap,
            ),
            OperationDescriptor::new(
                define(
                    NEAREST_POINT_ON_GEOMETRY,
                    "Point of geometry2 closest to geometry1, with the separating distance",
                )
                .with_parameter(wkt_param("geometry1"))
                .with_parameter(wkt_param("geometry2")),
                execute_nearest_point,
            ),
            OperationDescriptor::new(
                define(NORMALIZE_GEOMETRY, "Canonical vertex order and ring orientation")
                    .with_parameter(wkt_param("geometry")),
                |args: &ToolArguments, _: &HandlerContext| -> HandlerResult {
                    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
                    Ok(geometry_value(&normalize(&geometry)).into())
                },
            ),
            OperationDescriptor::new(
                define(TRIANGULATE_GEOMETRY, "Delaunay triangles over the vertices of a geometry")
                    .with_parameter(wkt_param("geometry")),
                execute_triangulate,
            ),
            OperationDescriptor::new(
                define(VORONOI, "Voronoi cells of the vertices of a geometry, clipped to a padded envelope")
                    .with_parameter(wkt_param("geometry")),
                execute_voronoi,
            ),
        ]
    }
}

fn execute_buffer(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let distance = args.f64("distance")?;
    if distance <= 0.0 {
        return Err(OperationError::domain(format!(
            "Buffer distance must be positive, got {}",
            distance
        )));
    }
    let resolution = args.i64("resolution")?;
    if !(1..=1024).contains(&resolution) {
        return Err(OperationError::domain(format!(
            "Resolution must be between 1 and 1024, got {}",
            resolution
        )));
    }

    // `resolution` segments per quarter circle
    let angle = FRAC_PI_2 / resolution as f64;
    let style = BufferStyle::new(distance)
        .line_join(LineJoin::Round(angle))
        .line_cap(LineCap::Round(angle));
    Ok(geometry_value(&collapse(geometry.buffer_with_style(style))).into())
}

fn boolean_op(
    args: &ToolArguments,
    op: impl Fn(&MultiPolygon<f64>, &MultiPolygon<f64>) -> MultiPolygon<f64>,
) -> HandlerResult {
    let a = to_multi_polygon(&parse_wkt("geometry1", args.str("geometry1")?)?)?;
    let b = to_multi_polygon(&parse_wkt("geometry2", args.str("geometry2")?)?)?;
    Ok(geometry_value(&collapse(op(&a, &b))).into())
}

fn execute_convex_hull(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let points = vertices(&geometry)?;
    Ok(geometry_value(&Geometry::Polygon(points.convex_hull())).into())
}

fn execute_envelope(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let [minx, miny, maxx, maxy] = bounds(&geometry)?;
    let rect = geo::Rect::new(Coord { x: minx, y: miny }, Coord { x: maxx, y: maxy });
    Ok(geometry_value(&Geometry::Polygon(rect.to_polygon())).into())
}

fn execute_minimum_rotated_rectangle(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let points = vertices(&geometry)?;
    let rect = points
        .minimum_rotated_rect()
        .ok_or_else(|| OperationError::domain("Cannot compute a rectangle for this geometry"))?;
    Ok(geometry_value(&Geometry::Polygon(rect)).into())
}

fn execute_centroid(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let centroid = geometry
        .centroid()
        .ok_or_else(|| OperationError::domain("Geometry is empty"))?;
    Ok(geometry_value(&Geometry::Point(centroid)).into())
}

fn execute_rotate(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let mut angle = args.f64("angle")?;
    if args.bool("use_radians")? {
        angle = angle.to_degrees();
    }
    let origin = resolve_origin(&geometry, args.str("origin")?)?;
    let rotated = geometry.affine_transform(&AffineTransform::rotate(angle, origin));
    Ok(geometry_value(&rotated).into())
}

fn execute_scale(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let origin = resolve_origin(&geometry, args.str("origin")?)?;
    let transform = AffineTransform::scale(args.f64("xfact")?, args.f64("yfact")?, origin);
    Ok(geometry_value(&geometry.affine_transform(&transform)).into())
}

fn execute_translate(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let transform = AffineTransform::translate(args.f64("xoff")?, args.f64("yoff")?);
    Ok(geometry_value(&geometry.affine_transform(&transform)).into())
}

fn execute_unary_union(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let inputs = args.str_list("geometries")?;
    if inputs.is_empty() {
        return Err(OperationError::domain("'geometries' must not be empty"));
    }
    let mut polygons = Vec::new();
    for (index, text) in inputs.iter().enumerate() {
        let geometry = parse_wkt(&format!("geometries[{}]", index), text)?;
        polygons.extend(to_multi_polygon(&geometry)?.0);
    }
    Ok(geometry_value(&collapse(unary_union(polygons.iter()))).into())
}

fn execute_geojson_to_geometry(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let object = args.object("geojson")?.clone();
    let parsed = geojson::GeoJson::from_json_value(serde_json::Value::Object(object))
        .map_err(|e| OperationError::domain(format!("Invalid GeoJSON: {}", e)))?;
    let geometry = match parsed {
        geojson::GeoJson::Geometry(geometry) => geometry,
        geojson::GeoJson::Feature(feature) => feature
            .geometry
            .ok_or_else(|| OperationError::domain("Feature has no geometry"))?,
        geojson::GeoJson::FeatureCollection(_) => {
            return Err(OperationError::domain(
                "Expected a geometry or Feature, got a FeatureCollection",
            ));
        }
    };
    Ok(geometry_value(&from_geojson_geometry(geometry)?).into())
}

/// Single polygon results are reported as POLYGON, not MULTIPOLYGON
fn vertices(geometry: &Geometry<f64>) -> Result<MultiPoint<f64>, OperationError> {
    let points: Vec<Point<f64>> = geometry.coords_iter().map(Point::from).collect();
    if points.is_empty() {
        return Err(OperationError::domain("Geometry is empty"));
    }
    Ok(MultiPoint::new(points))
}

fn resolve_origin(geometry: &Geometry<f64>, origin: &str) -> Result<Coord<f64>, OperationError> {
    match origin.trim().to_lowercase().as_str() {
        "center" => {
            let [minx, miny, maxx, maxy] = bounds(geometry)?;
            Ok(Coord {
                x: (minx + maxx) / 2.0,
                y: (miny + maxy) / 2.0,
            })
        }
        "centroid" => geometry
            .centroid()
            .map(|p| p.0)
            .ok_or_else(|| OperationError::domain("Geometry is empty")),
        other => {
            let parts: Vec<f64> = other
                .split([',', ' '])
                .filter(|s| !s.is_empty())
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| OperationError::domain(format!("Invalid origin '{}'", origin)))?;
            match parts.as_slice() {
                [x, y] => Ok(Coord { x: *x, y: *y }),
                _ => Err(OperationError::domain(format!("Invalid origin '{}'", origin))),
            }
        }
    }
}

/// Every linear ring or line string of a geometry
fn line_strings(geometry: &Geometry<f64>) -> Vec<LineString<f64>> {
    fn polygon_rings(polygon: &Polygon<f64>, out: &mut Vec<LineString<f64>>) {
        out.push(polygon.exterior().clone());
        out.extend(polygon.interiors().iter().cloned());
    }

    let mut out = Vec::new();
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => {}
        Geometry::Line(line) => out.push(LineString::from(vec![line.start, line.end])),
        Geometry::LineString(ls) => out.push(ls.clone()),
        Geometry::MultiLineString(mls) => out.extend(mls.0.iter().cloned()),
        Geometry::Polygon(p) => polygon_rings(p, &mut out),
        Geometry::MultiPolygon(mp) => mp.0.iter().for_each(|p| polygon_rings(p, &mut out)),
        Geometry::Rect(r) => polygon_rings(&r.to_polygon(), &mut out),
        Geometry::Triangle(t) => polygon_rings(&t.to_polygon(), &mut out),
        Geometry::GeometryCollection(gc) => {
            for member in gc.iter() {
                out.extend(line_strings(member));
            }
        }
    }
    out
}

fn planar_length(geometry: &Geometry<f64>) -> f64 {
    line_strings(geometry)
        .iter()
        .flat_map(|ls| ls.lines())
        .map(|line| line.dx().hypot(line.dy()))
        .sum()
}

fn execute_simplify(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let tolerance = args.f64("tolerance")?;
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(OperationError::domain(format!(
            "Tolerance must be a non-negative number, got {}",
            tolerance
        )));
    }
    let simplified = simplify(&geometry, tolerance, args.bool("preserve_topology")?);
    Ok(geometry_value(&simplified).into())
}

fn execute_snap(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry1", args.str("geometry1")?)?;
    let reference = parse_wkt("geometry2", args.str("geometry2")?)?;
    let tolerance = args.f64("tolerance")?;
    if !(tolerance.is_finite() && tolerance >= 0.0) {
        return Err(OperationError::domain(format!(
            "Tolerance must be a non-negative number, got {}",
            tolerance
        )));
    }

    let anchors: Vec<Coord<f64>> = reference.coords_iter().collect();
    let anchors = &anchors;
    let snapped = geometry.map_coords(|c| {
        anchors
            .iter()
            .map(|a| (*a, (a.x - c.x).hypot(a.y - c.y)))
            .filter(|(_, d)| *d <= tolerance)
            .min_by(|x, y| x.1.total_cmp(&y.1))
            .map_or(c, |(a, _)| a)
    });
    Ok(geometry_value(&snapped.remove_repeated_points()).into())
}

fn execute_nearest_point(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let from = parse_wkt("geometry1", args.str("geometry1")?)?;
    let to = parse_wkt("geometry2", args.str("geometry2")?)?;
    let (point, distance) = nearest_point(&from, &to)
        .ok_or_else(|| OperationError::domain("No unique nearest point between these geometries"))?;
    let mut data = geometry_value(&Geometry::Point(point));
    data["distance"] = json!(distance);
    Ok(data.into())
}

fn execute_triangulate(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let triangulation = delaunay(&geometry)?;
    if triangulation.num_inner_faces() == 0 {
        return Err(OperationError::domain(
            "Triangulation needs at least three non-collinear vertices",
        ));
    }
    let triangles: Vec<String> = triangulation
        .inner_faces()
        .map(|face| {
            let ring: Vec<Coord<f64>> = face
                .positions()
                .iter()
                .map(|p| Coord { x: p.x, y: p.y })
                .collect();
            to_wkt(&Geometry::Polygon(Polygon::new(LineString::from(ring), Vec::new())))
        })
        .collect();
    Ok(json!({ "count": triangles.len(), "geometries": triangles }).into())
}

fn execute_voronoi(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
    let geometry = parse_wkt("geometry", args.str("geometry")?)?;
    let triangulation = delaunay(&geometry)?;
    let [minx, miny, maxx, maxy] = bounds(&geometry)?;
    let pad = (maxx - minx).max(maxy - miny);
    let pad = if pad > 0.0 { pad } else { 1.0 };
    let frame = [
        Coord { x: minx - pad, y: miny - pad },
        Coord { x: maxx + pad, y: miny - pad },
        Coord { x: maxx + pad, y: maxy + pad },
        Coord { x: minx - pad, y: maxy + pad },
    ];

    let mut cells = Vec::with_capacity(triangulation.num_vertices());
    for vertex in triangulation.vertices() {
        let site = vertex.position();
        let mut cell = frame.to_vec();
        for edge in vertex.out_edges() {
            cell = clip_to_site(&cell, site, edge.to().position());
            if cell.is_empty() {
                break;
            }
        }
        if cell.len() >= 3 {
            cells.push(Geometry::Polygon(Polygon::new(LineString::from(cell), Vec::new())));
        }
    }
    let mut data = geometry_value(&Geometry::GeometryCollection(GeometryCollection(cells)));
    data["cells"] = json!(triangulation.num_vertices());
    Ok(data.into())
}

/// Even-odd overlay of a polygon's own rings: self-intersections split into
/// separate parts and ring orientation comes out canonical
fn rebuild_polygon(polygon: &Polygon<f64>) -> MultiPolygon<f64> {
    polygon.union(&MultiPolygon::new(Vec::new()))
}

/// Polygonal parts are rebuilt through the overlay engine and overlapping
/// parts merged. Linear and point parts lose repeated vertices.
fn make_valid(geometry: &Geometry<f64>) -> Geometry<f64> {
    match geometry {
        Geometry::Polygon(p) => collapse(rebuild_polygon(p)),
        Geometry::MultiPolygon(mp) => {
            let parts: Vec<Polygon<f64>> = mp.iter().flat_map(|p| rebuild_polygon(p).0).collect();
            collapse(unary_union(parts.iter()))
        }
        Geometry::GeometryCollection(gc) => {
            Geometry::GeometryCollection(gc.iter().map(make_valid).collect())
        }
        other => other.remove_repeated_points(),
    }
}

fn simplify(geometry: &Geometry<f64>, tolerance: f64, preserve_topology: bool) -> Geometry<f64> {
    let polygon = |p: &Polygon<f64>| {
        let simplified = p.simplify(tolerance);
        if preserve_topology && !simplified.is_valid() {
            p.clone()
        } else {
            simplified
        }
    };
    match geometry {
        Geometry::LineString(ls) => Geometry::LineString(ls.simplify(tolerance)),
        Geometry::MultiLineString(mls) => Geometry::MultiLineString(mls.simplify(tolerance)),
        Geometry::Polygon(p) => Geometry::Polygon(polygon(p)),
        Geometry::Rect(r) => Geometry::Polygon(polygon(&r.to_polygon())),
        Geometry::Triangle(t) => Geometry::Polygon(polygon(&t.to_polygon())),
        Geometry::MultiPolygon(mp) => {
            let simplified = MultiPolygon::new(mp.0.iter().map(polygon).collect());
            if preserve_topology && !simplified.is_valid() {
                geometry.clone()
            } else {
                Geometry::MultiPolygon(simplified)
            }
        }
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(
            gc.iter()
                .map(|g| simplify(g, tolerance, preserve_topology))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn closest_on(geometry: &Geometry<f64>, point: Point<f64>) -> Option<Point<f64>> {
    match geometry.closest_point(&point) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => Some(p),
        Closest::Indeterminate => None,
    }
}

/// Point of `to` nearest to `from`, and the distance between them.
///
/// The closest pair of two planar geometries always involves a vertex of
/// one of them or a crossing of their segments, so those are the only
/// candidates examined.
fn nearest_point(from: &Geometry<f64>, to: &Geometry<f64>) -> Option<(Point<f64>, f64)> {
    fn consider(best: &mut Option<(Point<f64>, f64)>, on_target: Point<f64>, source: Point<f64>) {
        let distance = (on_target.x() - source.x()).hypot(on_target.y() - source.y());
        if best.is_none_or(|(_, d)| distance < d) {
            *best = Some((on_target, distance));
        }
    }

    let mut best = None;
    for c in from.coords_iter() {
        let source = Point::from(c);
        if let Some(target) = closest_on(to, source) {
            consider(&mut best, target, source);
        }
    }
    for c in to.coords_iter() {
        let target = Point::from(c);
        if let Some(source) = closest_on(from, target) {
            consider(&mut best, target, source);
        }
    }

    let to_segments: Vec<Line<f64>> = line_strings(to).iter().flat_map(|ls| ls.lines()).collect();
    for a in line_strings(from).iter().flat_map(|ls| ls.lines()) {
        for b in &to_segments {
            let crossing = match line_intersection(a, *b) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => intersection,
                Some(LineIntersection::Collinear { intersection }) => intersection.start,
                None => continue,
            };
            consider(&mut best, Point::from(crossing), Point::from(crossing));
        }
    }
    best
}

fn coord_order(a: &Coord<f64>, b: &Coord<f64>) -> std::cmp::Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

/// Closed ring restarted at its lowest vertex
fn normalize_ring(ring: &LineString<f64>) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = ring.0.clone();
    if ring.is_closed() {
        coords.pop();
    }
    let Some((start, _)) = coords.iter().enumerate().min_by(|x, y| coord_order(x.1, y.1)) else {
        return ring.clone();
    };
    coords.rotate_left(start);
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    LineString::from(coords)
}

fn normalize_polygon(polygon: &Polygon<f64>) -> Polygon<f64> {
    // Exterior clockwise, holes counter-clockwise
    let oriented = polygon.orient(Direction::Reversed);
    let mut holes: Vec<LineString<f64>> = oriented.interiors().iter().map(normalize_ring).collect();
    holes.sort_by(|a, b| match (a.0.first(), b.0.first()) {
        (Some(x), Some(y)) => coord_order(x, y),
        _ => std::cmp::Ordering::Equal,
    });
    Polygon::new(normalize_ring(oriented.exterior()), holes)
}

fn first_coord(geometry: &Geometry<f64>) -> Option<Coord<f64>> {
    geometry.coords_iter().next()
}

fn sort_parts<T>(parts: &mut [T], key: impl Fn(&T) -> Option<Coord<f64>>) {
    parts.sort_by(|a, b| match (key(a), key(b)) {
        (Some(x), Some(y)) => coord_order(&x, &y),
        _ => std::cmp::Ordering::Equal,
    });
}

/// Canonical form: rings start at their lowest vertex, exteriors run
/// clockwise, lines run from their lower end, and parts are ordered by
/// their first vertex.
fn normalize(geometry: &Geometry<f64>) -> Geometry<f64> {
    let line = |ls: &LineString<f64>| match (ls.0.first(), ls.0.last()) {
        (Some(first), Some(last)) if coord_order(last, first).is_lt() => {
            LineString::from(ls.0.iter().rev().copied().collect::<Vec<_>>())
        }
        _ => ls.clone(),
    };
    match geometry {
        Geometry::LineString(ls) if ls.is_closed() => Geometry::LineString(normalize_ring(ls)),
        Geometry::LineString(ls) => Geometry::LineString(line(ls)),
        Geometry::Polygon(p) => Geometry::Polygon(normalize_polygon(p)),
        Geometry::Rect(r) => Geometry::Polygon(normalize_polygon(&r.to_polygon())),
        Geometry::Triangle(t) => Geometry::Polygon(normalize_polygon(&t.to_polygon())),
        Geometry::MultiPoint(mp) => {
            let mut points = mp.0.clone();
            sort_parts(&mut points, |p| Some(p.0));
            Geometry::MultiPoint(MultiPoint::new(points))
        }
        Geometry::MultiLineString(mls) => {
            let mut lines: Vec<LineString<f64>> = mls.0.iter().map(line).collect();
            sort_parts(&mut lines, |ls| ls.0.first().copied());
            Geometry::MultiLineString(MultiLineString::new(lines))
        }
        Geometry::MultiPolygon(mp) => {
            let mut polygons: Vec<Polygon<f64>> = mp.0.iter().map(normalize_polygon).collect();
            sort_parts(&mut polygons, |p| p.exterior().0.first().copied());
            Geometry::MultiPolygon(MultiPolygon::new(polygons))
        }
        Geometry::GeometryCollection(gc) => {
            let mut members: Vec<Geometry<f64>> = gc.iter().map(normalize).collect();
            sort_parts(&mut members, first_coord);
            Geometry::GeometryCollection(GeometryCollection(members))
        }
        other => other.clone(),
    }
}

fn delaunay(geometry: &Geometry<f64>) -> Result<DelaunayTriangulation<Point2<f64>>, OperationError> {
    let mut triangulation = DelaunayTriangulation::<Point2<f64>>::new();
    for c in geometry.coords_iter() {
        triangulation.insert(Point2::new(c.x, c.y)).map_err(|e| {
            OperationError::domain(format!("Cannot triangulate vertex ({}, {}): {}", c.x, c.y, e))
        })?;
    }
    if triangulation.num_vertices() == 0 {
        return Err(OperationError::domain("Geometry is empty"));
    }
    Ok(triangulation)
}

/// Sutherland-Hodgman clip of a convex cell to the half-plane closer to
/// `site` than to `neighbor`
fn clip_to_site(cell: &[Coord<f64>], site: Point2<f64>, neighbor: Point2<f64>) -> Vec<Coord<f64>> {
    let (nx, ny) = (neighbor.x - site.x, neighbor.y - site.y);
    let (mx, my) = ((site.x + neighbor.x) / 2.0, (site.y + neighbor.y) / 2.0);
    let side = |c: &Coord<f64>| (c.x - mx) * nx + (c.y - my) * ny;

    let mut clipped = Vec::with_capacity(cell.len() + 1);
    for (i, current) in cell.iter().enumerate() {
        let next = &cell[(i + 1) % cell.len()];
        let (a, b) = (side(current), side(next));
        if a <= 0.0 {
            clipped.push(*current);
        }
        if (a <= 0.0) != (b <= 0.0) {
            let t = a / (a - b);
            clipped.push(Coord {
                x: current.x + t * (next.x - current.x),
                y: current.y + t * (next.y - current.y),
            });
        }
    }
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use gis_mcp_application::ports::storage_resolver::{StorageError, StorageResolverPort};
    use gis_mcp_domain::StorageCategory;
    use std::f64::consts::PI;
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
        let provider = GeometryProvider::new();
        let descriptor = provider
            .operations()
            .into_iter()
            .find(|d| d.name() == name)
            .unwrap();
        descriptor.handler.call(&args, &ctx)
    }

    fn wkt_of(result: HandlerResult) -> Geometry<f64> {
        let data = result.unwrap().into_data();
        parse_wkt("wkt", data["wkt"].as_str().unwrap()).unwrap()
    }

    const SQUARE: &str = "POLYGON((0 0,2 0,2 2,0 2,0 0))";
    const SHIFTED: &str = "POLYGON((1 1,3 1,3 3,1 3,1 1))";

    #[test]
    fn test_provider_names_are_unique() {
        let ops = GeometryProvider::new().operations();
        let mut names: Vec<_> = ops.iter().map(|d| d.name().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ops.len());
        assert!(ops.iter().all(|d| d.definition.group == OperationGroup::Geometry));
    }

    #[test]
    fn test_buffer_point() {
        let args = ToolArguments::new()
            .with("geometry", "POINT(0 0)")
            .with("distance", 1.0)
            .with("resolution", 16);
        let geometry = wkt_of(call(BUFFER, args));
        let area = geometry.unsigned_area();
        assert!((area - PI).abs() < 0.05, "area {}", area);
    }

    #[test]
    fn test_buffer_rejects_non_positive_distance() {
        let args = ToolArguments::new()
            .with("geometry", "POINT(0 0)")
            .with("distance", -1.0)
            .with("resolution", 16);
        assert!(matches!(call(BUFFER, args), Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_buffer_line_covers_band() {
        let args = ToolArguments::new()
            .with("geometry", "LINESTRING(0 0,10 0)")
            .with("distance", 1.0)
            .with("resolution", 8);
        let area = wkt_of(call(BUFFER, args)).unsigned_area();
        // 10x2 band plus two half discs
        assert!((area - (20.0 + PI)).abs() < 0.2, "area {}", area);
    }

    #[test]
    fn test_boolean_operations() {
        let pair = || {
            ToolArguments::new()
                .with("geometry1", SQUARE)
                .with("geometry2", SHIFTED)
        };
        assert!((wkt_of(call(INTERSECTION, pair())).unsigned_area() - 1.0).abs() < 1e-9);
        assert!((wkt_of(call(UNION, pair())).unsigned_area() - 7.0).abs() < 1e-9);
        assert!((wkt_of(call(DIFFERENCE, pair())).unsigned_area() - 3.0).abs() < 1e-9);
        assert!((wkt_of(call(SYMMETRIC_DIFFERENCE, pair())).unsigned_area() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_boolean_operation_rejects_points() {
        let args = ToolArguments::new()
            .with("geometry1", "POINT(0 0)")
            .with("geometry2", SQUARE);
        assert!(matches!(call(INTERSECTION, args), Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_invalid_wkt_is_domain_error() {
        let args = ToolArguments::new().with("geometry", "POLYGON((0 0");
        assert!(matches!(call(GET_AREA, args), Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_measurements() {
        let args = || ToolArguments::new().with("geometry", SQUARE);
        assert_eq!(call(GET_AREA, args()).unwrap().into_data()["area"], 4.0);
        assert_eq!(call(GET_LENGTH, args()).unwrap().into_data()["length"], 8.0);
        assert_eq!(
            call(GET_BOUNDS, args()).unwrap().into_data()["bounds"],
            json!([0.0, 0.0, 2.0, 2.0])
        );
        assert_eq!(
            call(GET_GEOMETRY_TYPE, args()).unwrap().into_data()["geometry_type"],
            "Polygon"
        );
        assert_eq!(
            call(GET_COORDINATES, args()).unwrap().into_data()["coordinates"][1],
            json!([2.0, 0.0])
        );
        let centroid = wkt_of(call(GET_CENTROID, args()));
        assert_eq!(centroid, Geometry::Point(Point::new(1.0, 1.0)));
    }

    #[test]
    fn test_hulls() {
        let args = || ToolArguments::new().with("geometry", "MULTIPOINT((0 0),(2 0),(1 1),(2 2),(0 2))");
        assert!((wkt_of(call(CONVEX_HULL, args())).unsigned_area() - 4.0).abs() < 1e-9);
        assert!((wkt_of(call(ENVELOPE, args())).unsigned_area() - 4.0).abs() < 1e-9);
        assert!((wkt_of(call(MINIMUM_ROTATED_RECTANGLE, args())).unsigned_area() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_affine_transforms() {
        let rotated = wkt_of(call(
            ROTATE_GEOMETRY,
            ToolArguments::new()
                .with("geometry", "POINT(1 0)")
                .with("angle", 90.0)
                .with("origin", "0,0")
                .with("use_radians", false),
        ));
        let Geometry::Point(p) = rotated else { panic!("expected point") };
        assert!(p.x().abs() < 1e-9 && (p.y() - 1.0).abs() < 1e-9);

        let scaled = wkt_of(call(
            SCALE_GEOMETRY,
            ToolArguments::new()
                .with("geometry", SQUARE)
                .with("xfact", 2.0)
                .with("yfact", 3.0)
                .with("origin", "center"),
        ));
        assert!((scaled.unsigned_area() - 24.0).abs() < 1e-9);

        let moved = wkt_of(call(
            TRANSLATE_GEOMETRY,
            ToolArguments::new()
                .with("geometry", "POINT(1 1)")
                .with("xoff", 2.0)
                .with("yoff", -1.0),
        ));
        assert_eq!(moved, Geometry::Point(Point::new(3.0, 0.0)));
    }

    #[test]
    fn test_unary_union() {
        let args = ToolArguments::new().with("geometries", json!([SQUARE, SHIFTED]));
        assert!((wkt_of(call(UNARY_UNION_GEOMETRIES, args)).unsigned_area() - 7.0).abs() < 1e-9);

        let empty = ToolArguments::new().with("geometries", json!([]));
        assert!(call(UNARY_UNION_GEOMETRIES, empty).is_err());
    }

    #[test]
    fn test_geojson_conversions() {
        let data = call(
            GEOMETRY_TO_GEOJSON,
            ToolArguments::new().with("geometry", "POINT(1 2)"),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["geojson"]["type"], "Point");
        assert_eq!(data["geojson"]["coordinates"], json!([1.0, 2.0]));

        let feature = json!({
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}
        });
        let geometry = wkt_of(call(
            GEOJSON_TO_GEOMETRY,
            ToolArguments::new().with("geojson", feature),
        ));
        assert_eq!(geometry_type(&geometry), "LineString");
    }

    #[test]
    fn test_buffer_polygon_grows_by_distance() {
        let args = ToolArguments::new()
            .with("geometry", SQUARE)
            .with("distance", 1.0)
            .with("resolution", 16);
        let area = wkt_of(call(BUFFER, args)).unsigned_area();
        // 2x2 square, four 2x1 side bands, four quarter discs
        assert!((area - (4.0 + 8.0 + PI)).abs() < 0.05, "area {}", area);
    }

    #[test]
    fn test_validity_report_and_repair() {
        const BOWTIE: &str = "POLYGON((0 0,2 2,2 0,0 2,0 0))";
        let report = call(IS_VALID, ToolArguments::new().with("geometry", BOWTIE))
            .unwrap()
            .into_data();
        assert_eq!(report["is_valid"], false);
        assert!(!report["reasons"].as_array().unwrap().is_empty());

        let repaired = wkt_of(call(MAKE_VALID, ToolArguments::new().with("geometry", BOWTIE)));
        // Both lobes survive the repair
        assert!((repaired.unsigned_area() - 2.0).abs() < 1e-9);

        let valid = call(IS_VALID, ToolArguments::new().with("geometry", SQUARE))
            .unwrap()
            .into_data();
        assert_eq!(valid["is_valid"], true);
        assert_eq!(valid["reasons"], json!([]));
    }

    #[test]
    fn test_simplify_drops_small_wiggles() {
        let args = ToolArguments::new()
            .with("geometry", "LINESTRING(0 0,1 0.01,2 0,3 0.01,4 0)")
            .with("tolerance", 0.1)
            .with("preserve_topology", true);
        let Geometry::LineString(line) = wkt_of(call(SIMPLIFY, args)) else {
            panic!("expected line string")
        };
        assert_eq!(line.0, vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 0.0 }]);

        let negative = ToolArguments::new()
            .with("geometry", SQUARE)
            .with("tolerance", -1.0)
            .with("preserve_topology", true);
        assert!(matches!(call(SIMPLIFY, negative), Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_simplify_keeps_polygon_that_would_lose_its_hole() {
        // Flattening the dent at (5 -0.5) would leave the hole outside the shell
        const BUMP: &str = "POLYGON((0 0,5 -0.5,10 0,10 10,0 10,0 0),\
                            (4.8 -0.3,5.2 -0.3,5.2 -0.1,4.8 -0.1,4.8 -0.3))";
        let args = |preserve: bool| {
            ToolArguments::new()
                .with("geometry", BUMP)
                .with("tolerance", 1.0)
                .with("preserve_topology", preserve)
        };
        let original = parse_wkt("g", BUMP).unwrap();
        let kept = wkt_of(call(SIMPLIFY, args(true)));
        assert_eq!(kept, original);
        assert!((kept.unsigned_area() - 102.42).abs() < 1e-9);

        let flattened = wkt_of(call(SIMPLIFY, args(false)));
        assert_ne!(flattened, original);
    }

    #[test]
    fn test_snap_moves_vertices_within_tolerance() {
        let args = ToolArguments::new()
            .with("geometry1", "LINESTRING(0 0,1 0.05,5 5)")
            .with("geometry2", "POINT(1 0)")
            .with("tolerance", 0.1);
        let Geometry::LineString(line) = wkt_of(call(SNAP_GEOMETRY, args)) else {
            panic!("expected line string")
        };
        assert_eq!(line.0[1], Coord { x: 1.0, y: 0.0 });
        assert_eq!(line.0[2], Coord { x: 5.0, y: 5.0 });
    }

    #[test]
    fn test_nearest_point_on_geometry() {
        let data = call(
            NEAREST_POINT_ON_GEOMETRY,
            ToolArguments::new()
                .with("geometry1", "POINT(1 5)")
                .with("geometry2", "LINESTRING(0 0,4 0)"),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["distance"], 5.0);
        let point = parse_wkt("wkt", data["wkt"].as_str().unwrap()).unwrap();
        assert_eq!(point, Geometry::Point(Point::new(1.0, 0.0)));

        // Crossing segments touch at distance zero
        let crossing = call(
            NEAREST_POINT_ON_GEOMETRY,
            ToolArguments::new()
                .with("geometry1", "LINESTRING(0 -1,0 1)")
                .with("geometry2", "LINESTRING(-1 0,1 0)"),
        )
        .unwrap()
        .into_data();
        assert_eq!(crossing["distance"], 0.0);
    }

    #[test]
    fn test_normalize_is_order_independent() {
        let a = wkt_of(call(
            NORMALIZE_GEOMETRY,
            ToolArguments::new().with("geometry", "POLYGON((2 2,2 0,0 0,0 2,2 2))"),
        ));
        let b = wkt_of(call(
            NORMALIZE_GEOMETRY,
            ToolArguments::new().with("geometry", "POLYGON((0 2,2 2,2 0,0 0,0 2))"),
        ));
        assert_eq!(a, b);
        let Geometry::Polygon(polygon) = a else { panic!("expected polygon") };
        assert_eq!(polygon.exterior().0[0], Coord { x: 0.0, y: 0.0 });

        let line = wkt_of(call(
            NORMALIZE_GEOMETRY,
            ToolArguments::new().with("geometry", "LINESTRING(3 3,1 1)"),
        ));
        assert_eq!(geometry_type(&line), "LineString");
        assert_eq!(line.coords_iter().next(), Some(Coord { x: 1.0, y: 1.0 }));
    }

    #[test]
    fn test_triangulate_square() {
        let data = call(
            TRIANGULATE_GEOMETRY,
            ToolArguments::new().with("geometry", "MULTIPOINT((0 0),(2 0),(2 2),(0 2))"),
        )
        .unwrap()
        .into_data();
        let triangles = data["geometries"].as_array().unwrap();
        assert_eq!(triangles.len(), 2);
        let area: f64 = triangles
            .iter()
            .map(|t| parse_wkt("t", t.as_str().unwrap()).unwrap().unsigned_area())
            .sum();
        assert!((area - 4.0).abs() < 1e-9);

        let collinear = call(
            TRIANGULATE_GEOMETRY,
            ToolArguments::new().with("geometry", "LINESTRING(0 0,1 1,2 2)"),
        );
        assert!(matches!(collinear, Err(OperationError::Domain(_))));
    }

    #[test]
    fn test_voronoi_cells_tile_the_frame() {
        let data = call(
            VORONOI,
            ToolArguments::new().with("geometry", "MULTIPOINT((0 0),(2 0),(2 2),(0 2))"),
        )
        .unwrap()
        .into_data();
        assert_eq!(data["cells"], 4);
        let Geometry::GeometryCollection(cells) =
            parse_wkt("wkt", data["wkt"].as_str().unwrap()).unwrap()
        else {
            panic!("expected collection")
        };
        assert_eq!(cells.0.len(), 4);
        // Frame is the bounds padded by their extent: 6 x 6
        let total: f64 = cells.iter().map(|c| c.unsigned_area()).sum();
        assert!((total - 36.0).abs() < 1e-9, "total {}", total);
        for cell in cells.iter() {
            assert!((cell.unsigned_area() - 9.0).abs() < 1e-9);
        }
    }
}
