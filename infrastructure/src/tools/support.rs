//! Helpers shared by the operation providers: WKT and GeoJSON conversion,
//! polygonal coercion, and small JSON builders.

use geo::{BoundingRect, Geometry, MultiPolygon, Polygon};
use gis_mcp_application::OperationError;
use serde_json::{Value, json};
use wkt::{ToWkt, TryFromWkt};

/// Parse a WKT argument. `param` names the argument in the error message.
pub fn parse_wkt(param: &str, text: &str) -> Result<Geometry<f64>, OperationError> {
    Geometry::<f64>::try_from_wkt_str(text.trim())
        .map_err(|e| OperationError::domain(format!("Invalid WKT in '{}': {}", param, e)))
}

pub fn to_wkt(geometry: &Geometry<f64>) -> String {
    geometry.wkt_string()
}

/// Normalized geometry result: `{"wkt": …}`
pub fn geometry_value(geometry: &Geometry<f64>) -> Value {
    json!({ "wkt": to_wkt(geometry) })
}

pub fn geometry_type(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "LineString",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Polygon",
        Geometry::Triangle(_) => "Polygon",
    }
}

/// Collect the polygons of a polygonal geometry.
///
/// Boolean operations are only defined for areas; anything else is a
/// domain error naming the offending geometry type.
pub fn to_multi_polygon(geometry: &Geometry<f64>) -> Result<MultiPolygon<f64>, OperationError> {
    let mut polygons = Vec::new();
    collect_polygons(geometry, &mut polygons)?;
    Ok(MultiPolygon::new(polygons))
}

/// A single polygon stays a `Polygon`
pub fn collapse(mut multi: MultiPolygon<f64>) -> Geometry<f64> {
    if multi.0.len() == 1 {
        Geometry::Polygon(multi.0.remove(0))
    } else {
        Geometry::MultiPolygon(multi)
    }
}

fn collect_polygons(
    geometry: &Geometry<f64>,
    out: &mut Vec<Polygon<f64>>,
) -> Result<(), OperationError> {
    match geometry {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for member in gc.iter() {
                collect_polygons(member, out)?;
            }
        }
        other => {
            return Err(OperationError::domain(format!(
                "Expected a polygonal geometry, got {}",
                geometry_type(other)
            )));
        }
    }
    Ok(())
}

/// `[minx, miny, maxx, maxy]`, or an error for an empty geometry
pub fn bounds(geometry: &Geometry<f64>) -> Result<[f64; 4], OperationError> {
    let rect = geometry
        .bounding_rect()
        .ok_or_else(|| OperationError::domain("Geometry is empty"))?;
    Ok([rect.min().x, rect.min().y, rect.max().x, rect.max().y])
}

/// Bounds merged over several geometries
pub fn merge_bounds<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> Option<[f64; 4]> {
    geometries
        .into_iter()
        .filter_map(|g| g.bounding_rect())
        .fold(None, |acc: Option<[f64; 4]>, rect| {
            let next = [rect.min().x, rect.min().y, rect.max().x, rect.max().y];
            Some(match acc {
                None => next,
                Some(b) => [
                    b[0].min(next[0]),
                    b[1].min(next[1]),
                    b[2].max(next[2]),
                    b[3].max(next[3]),
                ],
            })
        })
}

/// GeoJSON geometry object for a geo geometry
pub fn to_geojson_geometry(geometry: &Geometry<f64>) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(geometry))
}

pub fn from_geojson_geometry(geometry: geojson::Geometry) -> Result<Geometry<f64>, OperationError> {
    Geometry::<f64>::try_from(geometry)
        .map_err(|e| OperationError::domain(format!("Unsupported GeoJSON geometry: {}", e)))
}

/// A `[x, y]` pair argument
pub fn coordinate_pair(param: &str, values: &[f64]) -> Result<(f64, f64), OperationError> {
    match values {
        [x, y] => Ok((*x, *y)),
        _ => Err(OperationError::domain(format!(
            "'{}' must contain exactly two numbers, got {}",
            param,
            values.len()
        ))),
    }
}
