//! In-memory feature layer backed by GeoJSON files

use std::path::Path;

use geo::{Coord, Geometry, MapCoords};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use gis_mcp_application::OperationError;
use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::tools::projection::Transformer;
use crate::tools::projection::crs::Crs;
use crate::tools::support::{from_geojson_geometry, merge_bounds, to_geojson_geometry, to_wkt};

pub const DEFAULT_CRS: &str = "EPSG:4326";
pub const PREVIEW_ROWS: usize = 5;

/// Features plus the layer CRS
#[derive(Debug, Clone)]
pub struct FeatureLayer {
    pub features: Vec<Feature>,
    pub crs: String,
}

impl FeatureLayer {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            features,
            crs: DEFAULT_CRS.to_string(),
        }
    }

    pub fn read(path: &Path) -> Result<Self, OperationError> {
        if !path.is_file() {
            return Err(OperationError::domain(format!(
                "File not found: {}",
                path.display()
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| OperationError::io("Failed to read", path, e))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            OperationError::domain(format!("{} is not valid JSON: {}", path.display(), e))
        })?;
        Self::from_json(value)
            .map_err(|e| OperationError::domain(format!("{}: {}", path.display(), e)))
    }

    /// Accepts a FeatureCollection, a single Feature, or a bare geometry
    pub fn from_json(value: Value) -> Result<Self, OperationError> {
        let crs = value
            .pointer("/crs/properties/name")
            .and_then(Value::as_str)
            .map(normalize_crs_name)
            .unwrap_or_else(|| DEFAULT_CRS.to_string());

        let parsed = GeoJson::from_json_value(value)
            .map_err(|e| OperationError::domain(format!("Invalid GeoJSON: {}", e)))?;
        let features = match parsed {
            GeoJson::FeatureCollection(collection) => collection.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(geometry) => vec![Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: Some(JsonObject::new()),
                foreign_members: None,
            }],
        };
        Ok(Self { features, crs })
    }

    pub fn to_collection(&self) -> FeatureCollection {
        let foreign_members = (self.crs != DEFAULT_CRS).then(|| {
            let mut members = JsonObject::new();
            members.insert(
                "crs".to_string(),
                json!({
                    "type": "name",
                    "properties": { "name": crs_urn(&self.crs) },
                }),
            );
            members
        });
        FeatureCollection {
            bbox: None,
            features: self.features.clone(),
            foreign_members,
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), OperationError> {
        let text = serde_json::to_string_pretty(&self.to_collection())
            .map_err(|e| OperationError::internal(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| OperationError::io("Failed to write", path, e))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Attribute columns in first-seen order, then `geometry`
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.column_types().into_keys().collect();
        columns.push("geometry".to_string());
        columns
    }

    /// Attribute column → inferred dtype
    pub fn column_types(&self) -> IndexMap<String, &'static str> {
        let mut types: IndexMap<String, &'static str> = IndexMap::new();
        for properties in self.features.iter().filter_map(|f| f.properties.as_ref()) {
            for (key, value) in properties {
                let observed = dtype(value);
                types
                    .entry(key.clone())
                    .and_modify(|current| *current = merge_dtype(*current, observed))
                    .or_insert(observed);
            }
        }
        types
    }

    pub fn geometry(feature: &Feature) -> Result<Option<Geometry<f64>>, OperationError> {
        feature
            .geometry
            .clone()
            .map(from_geojson_geometry)
            .transpose()
    }

    pub fn geometries(&self) -> Result<Vec<Option<Geometry<f64>>>, OperationError> {
        self.features.iter().map(Self::geometry).collect()
    }

    pub fn bounds(&self) -> Result<Option<[f64; 4]>, OperationError> {
        let geometries = self.geometries()?;
        Ok(merge_bounds(geometries.iter().flatten()))
    }

    /// First rows as flat records, geometry rendered as WKT
    pub fn preview(&self) -> Result<Vec<Value>, OperationError> {
        self.features
            .iter()
            .take(PREVIEW_ROWS)
            .map(|feature| {
                let mut record = feature.properties.clone().unwrap_or_default();
                let wkt = Self::geometry(feature)?.map(|g| to_wkt(&g));
                record.insert("geometry".to_string(), json!(wkt));
                Ok(Value::Object(record))
            })
            .collect()
    }

    /// Reproject every geometry into `target`
    pub fn to_crs(&mut self, target: &Crs) -> Result<(), OperationError> {
        let source: Crs = self.crs.parse()?;
        if source == *target {
            return Ok(());
        }
        let transformer = Transformer::new(&source, target)?;
        let mut features = Vec::with_capacity(self.len());
        for item in &self.features {
            let geometry = Self::geometry(item)?
                .map(|g| {
                    g.try_map_coords(|c| {
                        transformer.transform(c.x, c.y).map(|(x, y)| Coord { x, y })
                    })
                })
                .transpose()?;
            features.push(feature(
                geometry.as_ref(),
                item.properties.clone().unwrap_or_default(),
            ));
        }
        self.features = features;
        self.crs = target.to_string();
        Ok(())
    }

    /// `num_features`, `crs`, `columns`, `bounds`
    pub fn summary(&self) -> Result<Map<String, Value>, OperationError> {
        let mut summary = Map::new();
        summary.insert("num_features".to_string(), json!(self.len()));
        summary.insert("crs".to_string(), json!(self.crs));
        summary.insert("columns".to_string(), json!(self.columns()));
        summary.insert("bounds".to_string(), json!(self.bounds()?));
        Ok(summary)
    }
}

pub fn feature(geometry: Option<&Geometry<f64>>, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: geometry.map(to_geojson_geometry),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn dtype(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int64",
        Value::Number(_) => "float64",
        _ => "object",
    }
}

fn merge_dtype(current: &'static str, observed: &'static str) -> &'static str {
    match (current, observed) {
        (a, b) if a == b => a,
        ("int64", "float64") | ("float64", "int64") => "float64",
        _ => "object",
    }
}

/// `urn:ogc:def:crs:EPSG::3857` and `EPSG:3857` both become `EPSG:3857`
fn normalize_crs_name(name: &str) -> String {
    if let Some((_, code)) = name.rsplit_once("EPSG::") {
        return format!("EPSG:{}", code);
    }
    if name.contains("CRS84") {
        return DEFAULT_CRS.to_string();
    }
    name.to_string()
}

fn crs_urn(crs: &str) -> String {
    match crs.strip_prefix("EPSG:") {
        Some(code) => format!("urn:ogc:def:crs:EPSG::{}", code),
        None => crs.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "a", "pop": 10},
                 "geometry": {"type": "Point", "coordinates": [0.0, 0.0]}},
                {"type": "Feature", "properties": {"name": "b", "pop": 2.5},
                 "geometry": {"type": "Point", "coordinates": [2.0, 3.0]}}
            ]
        })
    }

    #[test]
    fn test_columns_and_types() {
        let layer = FeatureLayer::from_json(sample()).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.columns(), vec!["name", "pop", "geometry"]);
        let types = layer.column_types();
        assert_eq!(types["name"], "object");
        assert_eq!(types["pop"], "float64");
        assert_eq!(layer.bounds().unwrap(), Some([0.0, 0.0, 2.0, 3.0]));
        assert_eq!(layer.crs, DEFAULT_CRS);
    }

    #[test]
    fn test_preview_renders_wkt() {
        let layer = FeatureLayer::from_json(sample()).unwrap();
        let preview = layer.preview().unwrap();
        assert_eq!(preview.len(), 2);
        assert!(preview[0]["geometry"].as_str().unwrap().starts_with("POINT"));
        assert_eq!(preview[1]["name"], "b");
    }

    #[test]
    fn test_write_and_read_keeps_crs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layer.geojson");
        let mut layer = FeatureLayer::from_json(sample()).unwrap();
        layer.crs = "EPSG:3857".to_string();
        layer.write(&path).unwrap();

        let read = FeatureLayer::read(&path).unwrap();
        assert_eq!(read.crs, "EPSG:3857");
        assert_eq!(read.len(), 2);
    }

    #[test]
    fn test_read_missing_file() {
        let err = FeatureLayer::read(Path::new("/nonexistent/layer.geojson")).unwrap_err();
        assert!(matches!(err, OperationError::Domain(_)));
    }

    #[test]
    fn test_crs_name_normalization() {
        assert_eq!(normalize_crs_name("urn:ogc:def:crs:EPSG::32633"), "EPSG:32633");
        assert_eq!(normalize_crs_name("urn:ogc:def:crs:OGC:1.3:CRS84"), "EPSG:4326");
        assert_eq!(normalize_crs_name("EPSG:3857"), "EPSG:3857");
    }
}
