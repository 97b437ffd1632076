//! Operation providers for every capability group
//!
//! Each group contributes its descriptors through its own
//! [`OperationProvider`]:
//! - `geometry`: geometry algebra and measurements over WKT
//! - `projection`: CRS transforms and WGS84 geodesy
//! - `vector`: GeoJSON layer I/O and feature operations
//! - `raster`: ESRI ASCII grids and their `.prj` sidecars
//! - `statistics`: spatial weights, autocorrelation, clustering and OLS
//! - `visualization`: SVG and Leaflet maps
//! - `datasets`: HTTP download into storage, storage listing

pub mod datasets;
pub mod geometry;
pub mod projection;
pub mod raster;
pub mod schema;
pub mod statistics;
pub mod support;
pub mod vector;
pub mod visualization;

pub use datasets::DatasetsProvider;
pub use geometry::GeometryProvider;
pub use projection::ProjectionProvider;
pub use raster::RasterProvider;
pub use schema::JsonSchemaToolConverter;
pub use statistics::StatisticsProvider;
pub use vector::VectorProvider;
pub use visualization::VisualizationProvider;

use gis_mcp_application::{OperationProvider, OperationRegistry};
use gis_mcp_domain::RegistryError;
use tracing::info;

use crate::config::FileConfig;

/// Every provider, in catalog order
pub fn all_providers(config: &FileConfig) -> Vec<Box<dyn OperationProvider>> {
    vec![
        Box::new(GeometryProvider::new()),
        Box::new(ProjectionProvider::new()),
        Box::new(VectorProvider::new()),
        Box::new(RasterProvider::new()),
        Box::new(StatisticsProvider::new()),
        Box::new(VisualizationProvider::new()),
        Box::new(DatasetsProvider::new(&config.datasets)),
    ]
}

/// Build the registry from [`all_providers`]. Fails on a duplicate name.
pub fn build_registry(config: &FileConfig) -> Result<OperationRegistry, RegistryError> {
    let mut registry = OperationRegistry::new();
    for provider in all_providers(config) {
        let added = registry.register_provider(provider.as_ref())?;
        info!(provider = provider.id(), operations = added, "Registered provider");
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gis_mcp_domain::OperationGroup;
    use std::collections::HashSet;

    #[test]
    fn test_registry_covers_every_group() {
        let registry = build_registry(&FileConfig::default()).unwrap();
        let stats = registry.stats();
        assert_eq!(stats[&OperationGroup::Geometry], 28);
        assert_eq!(stats[&OperationGroup::Projection], 11);
        assert_eq!(stats[&OperationGroup::Vector], 12);
        assert_eq!(stats[&OperationGroup::Raster], 15);
        assert_eq!(stats[&OperationGroup::Statistics], 15);
        assert_eq!(stats[&OperationGroup::Visualization], 2);
        assert_eq!(stats[&OperationGroup::Datasets], 2);
        assert_eq!(registry.len(), 85);
    }

    #[test]
    fn test_provider_groups_match_definitions() {
        for provider in all_providers(&FileConfig::default()) {
            let names: Vec<String> = provider
                .operations()
                .iter()
                .map(|d| d.name().to_string())
                .collect();
            let unique: HashSet<&String> = names.iter().collect();
            assert_eq!(unique.len(), names.len(), "{}", provider.id());
            for descriptor in provider.operations() {
                assert_eq!(descriptor.definition.group, provider.group());
            }
        }
    }

    #[test]
    fn test_every_parameter_name_is_unique_per_operation() {
        let registry = build_registry(&FileConfig::default()).unwrap();
        for descriptor in registry.list_all() {
            let mut seen = HashSet::new();
            for parameter in &descriptor.definition.parameters {
                assert!(
                    seen.insert(parameter.name.as_str()),
                    "{} repeats {}",
                    descriptor.name(),
                    parameter.name
                );
            }
        }
    }
}
