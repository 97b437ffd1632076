//! Storage layout vocabulary
//!
//! The storage root holds a fixed set of category subdirectories. Handlers
//! that persist files write under the category matching their domain; this
//! layout is the one on-disk contract external tooling may rely on.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fixed category subdirectory of the storage root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageCategory {
    MovementData,
    LandProducts,
    SatelliteImagery,
    EcologyData,
    ClimateData,
    AdministrativeBoundaries,
    /// General outputs (vector exports, maps, saved results)
    Outputs,
}

impl StorageCategory {
    pub const ALL: [StorageCategory; 7] = [
        StorageCategory::MovementData,
        StorageCategory::LandProducts,
        StorageCategory::SatelliteImagery,
        StorageCategory::EcologyData,
        StorageCategory::ClimateData,
        StorageCategory::AdministrativeBoundaries,
        StorageCategory::Outputs,
    ];

    /// Directory name under the storage root
    pub fn dir_name(&self) -> &'static str {
        match self {
            StorageCategory::MovementData => "movement_data",
            StorageCategory::LandProducts => "land_products",
            StorageCategory::SatelliteImagery => "satellite_imagery",
            StorageCategory::EcologyData => "ecology_data",
            StorageCategory::ClimateData => "climate_data",
            StorageCategory::AdministrativeBoundaries => "administrative_boundaries",
            StorageCategory::Outputs => "outputs",
        }
    }
}

impl std::fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown storage category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for StorageCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        StorageCategory::ALL
            .into_iter()
            .find(|c| c.dir_name() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Whether a path parameter is read from or written to storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRole {
    /// Resolved against the root; nothing is created
    Input,
    /// Resolved against the root; missing ancestor directories are created
    Output,
}

/// How a path-valued parameter maps onto the storage root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageBinding {
    pub role: PathRole,
    pub category: Option<StorageCategory>,
}

impl StorageBinding {
    pub fn new(role: PathRole, category: Option<StorageCategory>) -> Self {
        Self { role, category }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_names_are_unique() {
        let mut names: Vec<_> = StorageCategory::ALL.iter().map(|c| c.dir_name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), StorageCategory::ALL.len());
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(
            "climate_data".parse::<StorageCategory>().unwrap(),
            StorageCategory::ClimateData
        );
        assert_eq!(
            "Satellite-Imagery".parse::<StorageCategory>().unwrap(),
            StorageCategory::SatelliteImagery
        );
        assert!("weather".parse::<StorageCategory>().is_err());
    }
}
