//! Coordinate reference systems and point transforms
//!
//! A [`Crs`] is either one of the named EPSG entries in [`CATALOG`], a WGS 84
//! UTM zone (EPSG:32601-32660 north, EPSG:32701-32760 south), or a raw
//! `+proj=` definition. Every variant resolves to a proj string; the actual
//! math runs in `proj4rs`.

use proj4rs::Proj;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

#[derive(Debug, Error, PartialEq)]
pub enum CrsError {
    #[error("Unsupported CRS '{0}' (use an EPSG code from get_available_crs or a +proj= string)")]
    Unsupported(String),

    #[error("Invalid CRS definition '{definition}': {reason}")]
    InvalidDefinition { definition: String, reason: String },

    #[error("Coordinate ({x}, {y}) is outside the valid range of {crs}")]
    OutOfRange { crs: String, x: f64, y: f64 },

    #[error("Cannot transform from {source_crs} to {target_crs}: {reason}")]
    Transform {
        source_crs: String,
        target_crs: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsKind {
    Geographic,
    Projected,
    Geocentric,
}

/// A named EPSG entry
#[derive(Debug, PartialEq)]
pub struct KnownCrs {
    pub code: u32,
    pub name: &'static str,
    pub kind: CrsKind,
    pub datum: &'static str,
    pub ellipsoid: &'static str,
    pub proj: &'static str,
    /// `[west, south, east, north]` in degrees
    pub area: [f64; 4],
}

pub static CATALOG: &[KnownCrs] = &[
    KnownCrs {
        code: 4326,
        name: "WGS 84",
        kind: CrsKind::Geographic,
        datum: "World Geodetic System 1984",
        ellipsoid: "WGS 84",
        proj: "+proj=longlat +datum=WGS84 +no_defs",
        area: [-180.0, -90.0, 180.0, 90.0],
    },
    KnownCrs {
        code: 4269,
        name: "NAD83",
        kind: CrsKind::Geographic,
        datum: "North American Datum 1983",
        ellipsoid: "GRS 1980",
        proj: "+proj=longlat +datum=NAD83 +no_defs",
        area: [-172.54, 14.92, -47.74, 86.46],
    },
    KnownCrs {
        code: 4258,
        name: "ETRS89",
        kind: CrsKind::Geographic,
        datum: "European Terrestrial Reference System 1989",
        ellipsoid: "GRS 1980",
        proj: "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs",
        area: [-16.1, 32.88, 40.18, 84.73],
    },
    KnownCrs {
        code: 4978,
        name: "WGS 84 (geocentric)",
        kind: CrsKind::Geocentric,
        datum: "World Geodetic System 1984",
        ellipsoid: "WGS 84",
        proj: "+proj=geocent +datum=WGS84 +units=m +no_defs",
        area: [-180.0, -90.0, 180.0, 90.0],
    },
    KnownCrs {
        code: 3857,
        name: "WGS 84 / Pseudo-Mercator",
        kind: CrsKind::Projected,
        datum: "World Geodetic System 1984",
        ellipsoid: "WGS 84",
        proj: "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 \
               +units=m +nadgrids=@null +no_defs",
        area: [-180.0, -MERCATOR_MAX_LAT, 180.0, MERCATOR_MAX_LAT],
    },
    KnownCrs {
        code: 3395,
        name: "WGS 84 / World Mercator",
        kind: CrsKind::Projected,
        datum: "World Geodetic System 1984",
        ellipsoid: "WGS 84",
        proj: "+proj=merc +lon_0=0 +k=1 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs",
        area: [-180.0, -80.0, 180.0, 84.0],
    },
    KnownCrs {
        code: 3035,
        name: "ETRS89-extended / LAEA Europe",
        kind: CrsKind::Projected,
        datum: "European Terrestrial Reference System 1989",
        ellipsoid: "GRS 1980",
        proj: "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 +ellps=GRS80 \
               +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        area: [-35.58, 24.6, 44.83, 84.73],
    },
    KnownCrs {
        code: 27700,
        name: "OSGB36 / British National Grid",
        kind: CrsKind::Projected,
        datum: "Ordnance Survey of Great Britain 1936",
        ellipsoid: "Airy 1830",
        proj: "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 \
               +ellps=airy +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 \
               +units=m +no_defs",
        area: [-9.01, 49.75, 2.01, 61.01],
    },
    KnownCrs {
        code: 2154,
        name: "RGF93 v1 / Lambert-93",
        kind: CrsKind::Projected,
        datum: "Reseau Geodesique Francais 1993 v1",
        ellipsoid: "GRS 1980",
        proj: "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 +x_0=700000 +y_0=6600000 \
               +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        area: [-9.86, 41.15, 10.38, 51.56],
    },
];

/// Reference ellipsoid parameters
#[derive(Debug, PartialEq)]
pub struct Ellipsoid {
    pub id: &'static str,
    pub name: &'static str,
    pub a: f64,
    pub inverse_flattening: f64,
}

impl Ellipsoid {
    pub fn flattening(&self) -> f64 {
        1.0 / self.inverse_flattening
    }

    pub fn lookup(name: &str) -> Option<&'static Ellipsoid> {
        let wanted = name.replace([' ', '-', '_'], "");
        ELLIPSOIDS.iter().find(|e| e.id.eq_ignore_ascii_case(&wanted))
    }
}

pub static ELLIPSOIDS: &[Ellipsoid] = &[
    Ellipsoid { id: "WGS84", name: "WGS 84", a: 6_378_137.0, inverse_flattening: 298.257_223_563 },
    Ellipsoid { id: "GRS80", name: "GRS 1980", a: 6_378_137.0, inverse_flattening: 298.257_222_101 },
    Ellipsoid { id: "WGS72", name: "WGS 72", a: 6_378_135.0, inverse_flattening: 298.26 },
    Ellipsoid { id: "clrk66", name: "Clarke 1866", a: 6_378_206.4, inverse_flattening: 294.978_698_2 },
    Ellipsoid { id: "intl", name: "International 1924", a: 6_378_388.0, inverse_flattening: 297.0 },
    Ellipsoid { id: "airy", name: "Airy 1830", a: 6_377_563.396, inverse_flattening: 299.324_964_6 },
    Ellipsoid { id: "bessel", name: "Bessel 1841", a: 6_377_397.155, inverse_flattening: 299.152_812_8 },
];

#[derive(Debug, Clone, PartialEq)]
pub enum Crs {
    Known(&'static KnownCrs),
    Utm { zone: u8, north: bool },
    /// Raw proj string; `geographic` is read from the parsed definition
    Definition { text: String, geographic: bool },
}

impl Crs {
    pub fn wgs84() -> Crs {
        Crs::Known(&CATALOG[0])
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Known(entry) => Some(entry.code),
            Crs::Utm { zone, north: true } => Some(32600 + *zone as u32),
            Crs::Utm { zone, north: false } => Some(32700 + *zone as u32),
            Crs::Definition { .. } => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Crs::Known(entry) => entry.name.to_string(),
            Crs::Utm { zone, north } => {
                format!("WGS 84 / UTM zone {}{}", zone, if *north { "N" } else { "S" })
            }
            Crs::Definition { .. } => "Custom CRS".to_string(),
        }
    }

    pub fn kind(&self) -> CrsKind {
        match self {
            Crs::Known(entry) => entry.kind,
            Crs::Utm { .. } => CrsKind::Projected,
            Crs::Definition { text, geographic } => {
                if *geographic {
                    CrsKind::Geographic
                } else if text.contains("+proj=geocent") {
                    CrsKind::Geocentric
                } else {
                    CrsKind::Projected
                }
            }
        }
    }

    pub fn is_geographic(&self) -> bool {
        self.kind() == CrsKind::Geographic
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            CrsKind::Geographic => "Geographic 2D CRS",
            CrsKind::Projected => "Projected CRS",
            CrsKind::Geocentric => "Geocentric CRS",
        }
    }

    pub fn axis_directions(&self) -> Vec<&'static str> {
        match self.kind() {
            CrsKind::Geographic => vec!["north", "east"],
            CrsKind::Projected => vec!["east", "north"],
            CrsKind::Geocentric => vec!["geocentricX", "geocentricY", "geocentricZ"],
        }
    }

    pub fn datum(&self) -> &'static str {
        match self {
            Crs::Known(entry) => entry.datum,
            Crs::Utm { .. } => "World Geodetic System 1984",
            Crs::Definition { .. } => "unknown",
        }
    }

    pub fn ellipsoid(&self) -> &'static str {
        match self {
            Crs::Known(entry) => entry.ellipsoid,
            Crs::Utm { .. } => "WGS 84",
            Crs::Definition { .. } => "unknown",
        }
    }

    /// `[west, south, east, north]` in degrees; unknown for raw definitions
    pub fn area_of_use(&self) -> Option<[f64; 4]> {
        match self {
            Crs::Known(entry) => Some(entry.area),
            Crs::Utm { zone, north } => {
                let west = -180.0 + (*zone as f64 - 1.0) * 6.0;
                let (south, north) = if *north { (0.0, 84.0) } else { (-80.0, 0.0) };
                Some([west, south, west + 6.0, north])
            }
            Crs::Definition { .. } => None,
        }
    }

    pub fn proj_string(&self) -> String {
        match self {
            Crs::Known(entry) => entry.proj.to_string(),
            Crs::Utm { zone, north } => format!(
                "+proj=utm +zone={}{} +datum=WGS84 +units=m +no_defs",
                zone,
                if *north { "" } else { " +south" }
            ),
            Crs::Definition { text, .. } => text.clone(),
        }
    }

    pub fn proj(&self) -> Result<Proj, CrsError> {
        let text = self.proj_string();
        Proj::from_proj_string(&text).map_err(|e| CrsError::InvalidDefinition {
            definition: text,
            reason: e.to_string(),
        })
    }

    /// Catalog entries followed by every UTM zone
    pub fn all() -> impl Iterator<Item = Crs> {
        CATALOG
            .iter()
            .map(Crs::Known)
            .chain((1..=60).map(|zone| Crs::Utm { zone, north: true }))
            .chain((1..=60).map(|zone| Crs::Utm { zone, north: false }))
    }

    /// UTM zone containing a lon/lat position
    pub fn utm_for(lon: f64, lat: f64) -> Result<Crs, CrsError> {
        if !(-180.0..=180.0).contains(&lon) || !(-80.0..=84.0).contains(&lat) {
            return Err(CrsError::OutOfRange {
                crs: Crs::wgs84().to_string(),
                x: lon,
                y: lat,
            });
        }
        let zone = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u8;
        Ok(Crs::Utm {
            zone,
            north: lat >= 0.0,
        })
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.epsg(), self) {
            (Some(code), _) => write!(f, "EPSG:{}", code),
            (None, Crs::Definition { text, .. }) => f.write_str(text),
            (None, _) => f.write_str("unknown"),
        }
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.starts_with("+proj=") {
            let proj = Proj::from_proj_string(trimmed).map_err(|e| CrsError::InvalidDefinition {
                definition: trimmed.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Crs::Definition {
                text: trimmed.to_string(),
                geographic: proj.is_latlong(),
            });
        }

        let normalized = trimmed.to_uppercase();
        let code = normalized
            .strip_prefix("EPSG:")
            .unwrap_or(&normalized)
            .trim();
        let unsupported = || CrsError::Unsupported(trimmed.to_string());
        let epsg: u32 = match code {
            "WGS84" | "WGS 84" | "CRS84" | "OGC:CRS84" => 4326,
            "900913" | "3785" | "102100" => 3857,
            other => other.parse().map_err(|_| unsupported())?,
        };
        if let Some(entry) = CATALOG.iter().find(|entry| entry.code == epsg) {
            return Ok(Crs::Known(entry));
        }
        match epsg {
            32601..=32660 => Ok(Crs::Utm {
                zone: (epsg - 32600) as u8,
                north: true,
            }),
            32701..=32760 => Ok(Crs::Utm {
                zone: (epsg - 32700) as u8,
                north: false,
            }),
            _ => Err(unsupported()),
        }
    }
}

/// Reusable point transform between two CRSs.
///
/// Geographic coordinates are degrees on both sides; the conversion to the
/// radians `proj4rs` works in happens here.
pub struct Transformer {
    source: Crs,
    target: Crs,
    projections: Option<(Proj, Proj)>,
}

impl Transformer {
    pub fn new(source: &Crs, target: &Crs) -> Result<Self, CrsError> {
        let projections = if source == target {
            None
        } else {
            Some((source.proj()?, target.proj()?))
        };
        Ok(Self {
            source: source.clone(),
            target: target.clone(),
            projections,
        })
    }

    pub fn source(&self) -> &Crs {
        &self.source
    }

    pub fn target(&self) -> &Crs {
        &self.target
    }

    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        self.transform_3d(x, y, 0.0).map(|(x, y, _)| (x, y))
    }

    /// Same as [`Transformer::transform`] with an ellipsoidal height or
    /// geocentric `z`
    pub fn transform_3d(&self, x: f64, y: f64, z: f64) -> Result<(f64, f64, f64), CrsError> {
        let out_of_range = |crs: &Crs| CrsError::OutOfRange {
            crs: crs.to_string(),
            x,
            y,
        };
        if !x.is_finite() || !y.is_finite() || !z.is_finite() {
            return Err(out_of_range(&self.source));
        }
        if self.source.is_geographic() && !(-90.0..=90.0).contains(&y) {
            return Err(out_of_range(&self.source));
        }
        let Some((source, target)) = &self.projections else {
            return Ok((x, y, z));
        };

        let mut point = if self.source.is_geographic() {
            (x.to_radians(), y.to_radians(), z)
        } else {
            (x, y, z)
        };
        proj4rs::transform::transform(source, target, &mut point).map_err(|e| {
            CrsError::Transform {
                source_crs: self.source.to_string(),
                target_crs: self.target.to_string(),
                reason: e.to_string(),
            }
        })?;
        let (tx, ty) = if self.target.is_geographic() {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };
        if !tx.is_finite() || !ty.is_finite() || !point.2.is_finite() {
            return Err(out_of_range(&self.target));
        }
        Ok((tx, ty, point.2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    fn crs(code: &str) -> Crs {
        code.parse().unwrap()
    }

    fn transform(source: &str, target: &str, x: f64, y: f64) -> Result<(f64, f64), CrsError> {
        Transformer::new(&crs(source), &crs(target))?.transform(x, y)
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!(crs("EPSG:4326"), Crs::wgs84());
        assert_eq!(crs("epsg:900913").epsg(), Some(3857));
        assert_eq!(crs("EPSG:32633"), Crs::Utm { zone: 33, north: true });
        assert_eq!(crs("32718"), Crs::Utm { zone: 18, north: false });
        assert_eq!(crs("EPSG:27700").name(), "OSGB36 / British National Grid");
        assert!(matches!(
            "EPSG:99999".parse::<Crs>(),
            Err(CrsError::Unsupported(_))
        ));
        assert!("EPSG:32661".parse::<Crs>().is_err());
    }

    #[test]
    fn test_proj_string_definitions() {
        let custom = crs("+proj=longlat +ellps=GRS80 +no_defs");
        assert!(custom.is_geographic());
        assert_eq!(custom.epsg(), None);
        assert!(custom.area_of_use().is_none());

        let projected = crs("+proj=utm +zone=30 +datum=WGS84");
        assert_eq!(projected.kind(), CrsKind::Projected);

        assert!(matches!(
            "+proj=nonsense".parse::<Crs>(),
            Err(CrsError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_web_mercator() {
        let (x, y) = transform("EPSG:4326", "EPSG:3857", 0.0, 0.0).unwrap();
        assert!(close(x, 0.0, 1e-6) && close(y, 0.0, 1e-6));

        let (x, y) = transform("EPSG:4326", "EPSG:3857", 180.0, 85.0511287798).unwrap();
        assert!(close(x, 20_037_508.342789244, 1e-3), "x {}", x);
        assert!(close(y, 20_037_508.342789244, 1.0), "y {}", y);

        let (lon, lat) = transform("EPSG:3857", "EPSG:4326", x, y).unwrap();
        assert!(close(lon, 180.0, 1e-7) && close(lat, 85.0511287798, 1e-6));
    }

    #[test]
    fn test_utm_forward_matches_reference() {
        // lon 9, lat 45 sits on the central meridian of zone 32N
        let (x, y) = transform("EPSG:4326", "EPSG:32632", 9.0, 45.0).unwrap();
        assert!(close(x, 500_000.0, 1e-3), "easting {}", x);
        assert!(close(y, 4_982_950.4, 0.5), "northing {}", y);
    }

    #[test]
    fn test_utm_round_trip_south() {
        let utm = Crs::utm_for(-70.6, -33.4).unwrap();
        assert_eq!(utm, Crs::Utm { zone: 19, north: false });
        let forward = Transformer::new(&Crs::wgs84(), &utm).unwrap();
        let (x, y) = forward.transform(-70.6, -33.4).unwrap();
        assert!(y > 0.0 && y < 10_000_000.0);
        let inverse = Transformer::new(&utm, &Crs::wgs84()).unwrap();
        let (lon, lat) = inverse.transform(x, y).unwrap();
        assert!(close(lon, -70.6, 1e-7) && close(lat, -33.4, 1e-7));
    }

    #[test]
    fn test_british_national_grid() {
        // Datum shift included, so only metre-level agreement is expected
        let (x, y) = transform("EPSG:4326", "EPSG:27700", -0.1276, 51.5072).unwrap();
        assert!(close(x, 530_000.0, 1_000.0), "easting {}", x);
        assert!(close(y, 180_400.0, 1_000.0), "northing {}", y);
    }

    #[test]
    fn test_out_of_range_latitude() {
        assert!(matches!(
            transform("EPSG:4326", "EPSG:3857", 0.0, 95.0),
            Err(CrsError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_identity_transform_skips_projection() {
        assert_eq!(
            transform("EPSG:32633", "EPSG:32633", 1.0, 2.0).unwrap(),
            (1.0, 2.0)
        );
    }

    #[test]
    fn test_catalog_of_supported_crs() {
        assert_eq!(Crs::all().count(), CATALOG.len() + 120);
        assert_eq!(
            Crs::Utm { zone: 1, north: false }.area_of_use(),
            Some([-180.0, -80.0, -174.0, 0.0])
        );
        for entry in CATALOG {
            assert!(Crs::Known(entry).proj().is_ok(), "EPSG:{}", entry.code);
        }
    }

    #[test]
    fn test_geocentric_position_of_prime_meridian() {
        let geocentric = crs("EPSG:4978");
        let (x, y, z) = Transformer::new(&Crs::wgs84(), &geocentric)
            .unwrap()
            .transform_3d(0.0, 0.0, 0.0)
            .unwrap();
        assert!(close(x, 6_378_137.0, 1e-3), "x {}", x);
        assert!(close(y, 0.0, 1e-6) && close(z, 0.0, 1e-6));
    }

    #[test]
    fn test_ellipsoid_lookup() {
        let grs80 = Ellipsoid::lookup("GRS-80").unwrap();
        assert_eq!(grs80.a, 6_378_137.0);
        assert!(close(grs80.a * (1.0 - grs80.flattening()), 6_356_752.314_140_3, 1e-3));
        assert!(Ellipsoid::lookup("mars").is_none());
    }
}
