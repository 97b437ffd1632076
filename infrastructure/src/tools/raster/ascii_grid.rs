//! ESRI ASCII grid codec (`.asc`)
//!
//! Header keys are case-insensitive; `xllcenter`/`yllcenter` are converted
//! to corner coordinates. Rows are stored top to bottom.

use std::fmt::Write as _;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing header key '{0}'")]
    MissingHeader(&'static str),

    #[error("Invalid header line '{0}'")]
    InvalidHeader(String),

    #[error("Invalid cell value '{0}'")]
    InvalidValue(String),

    #[error("Expected {expected} cells, found {found}")]
    CellCount { expected: usize, found: usize },

    #[error("Invalid grid dimension {key} {value}")]
    InvalidDimension { key: &'static str, value: f64 },

    #[error("Grid of {ncols} x {nrows} cells is too large")]
    TooLarge { ncols: usize, nrows: usize },
}

/// Row and column counts must be positive integers
fn dimension(key: &'static str, value: f64) -> Result<usize, GridError> {
    if !value.is_finite() || value < 1.0 || value.fract() != 0.0 || value > usize::MAX as f64 {
        return Err(GridError::InvalidDimension { key, value });
    }
    Ok(value as usize)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsciiGrid {
    pub ncols: usize,
    pub nrows: usize,
    pub xllcorner: f64,
    pub yllcorner: f64,
    pub cellsize: f64,
    pub nodata: Option<f64>,
    /// Row-major, first row is the northernmost
    pub values: Vec<f64>,
}

impl AsciiGrid {
    pub fn read(path: &Path) -> Result<Self, GridError> {
        let text = std::fs::read_to_string(path).map_err(|source| GridError::Io {
            path: path.display().to_string(),
            source,
        })?;
        text.parse()
    }

    pub fn write(&self, path: &Path) -> Result<(), GridError> {
        std::fs::write(path, self.to_string()).map_err(|source| GridError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Same georeferencing with new cell values
    pub fn with_values(&self, values: Vec<f64>) -> Self {
        Self {
            values,
            ..self.clone()
        }
    }

    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|nd| nd == value)
    }

    /// Cells that carry data
    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied().filter(|v| !self.is_nodata(*v))
    }

    /// `[minx, miny, maxx, maxy]`
    pub fn bounds(&self) -> [f64; 4] {
        [
            self.xllcorner,
            self.yllcorner,
            self.xllcorner + self.ncols as f64 * self.cellsize,
            self.yllcorner + self.nrows as f64 * self.cellsize,
        ]
    }

    /// GDAL-style affine transform (north-up)
    pub fn transform(&self) -> [f64; 6] {
        let top = self.yllcorner + self.nrows as f64 * self.cellsize;
        [self.cellsize, 0.0, self.xllcorner, 0.0, -self.cellsize, top]
    }
}

impl std::str::FromStr for AsciiGrid {
    type Err = GridError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut tokens = text.split_whitespace().peekable();
        let mut ncols = None;
        let mut nrows = None;
        let mut xll = None;
        let mut yll = None;
        let mut centered = false;
        let mut cellsize = None;
        let mut nodata = None;

        while let Some(token) = tokens.peek() {
            if !token.starts_with(|c: char| c.is_ascii_alphabetic()) {
                break;
            }
            let key = tokens.next().unwrap_or_default().to_ascii_lowercase();
            let value = tokens
                .next()
                .ok_or_else(|| GridError::InvalidHeader(key.clone()))?;
            let number: f64 = value
                .parse()
                .map_err(|_| GridError::InvalidHeader(format!("{} {}", key, value)))?;
            match key.as_str() {
                "ncols" => ncols = Some(dimension("ncols", number)?),
                "nrows" => nrows = Some(dimension("nrows", number)?),
                "xllcorner" => xll = Some(number),
                "yllcorner" => yll = Some(number),
                "xllcenter" => {
                    xll = Some(number);
                    centered = true;
                }
                "yllcenter" => {
                    yll = Some(number);
                    centered = true;
                }
                "cellsize" => cellsize = Some(number),
                "nodata_value" => nodata = Some(number),
                _ => return Err(GridError::InvalidHeader(format!("{} {}", key, value))),
            }
        }

        let ncols = ncols.ok_or(GridError::MissingHeader("ncols"))?;
        let nrows = nrows.ok_or(GridError::MissingHeader("nrows"))?;
        let cellsize = cellsize.ok_or(GridError::MissingHeader("cellsize"))?;
        if !cellsize.is_finite() || cellsize <= 0.0 {
            return Err(GridError::InvalidDimension {
                key: "cellsize",
                value: cellsize,
            });
        }
        let expected = ncols
            .checked_mul(nrows)
            .ok_or(GridError::TooLarge { ncols, nrows })?;
        let mut xllcorner = xll.ok_or(GridError::MissingHeader("xllcorner"))?;
        let mut yllcorner = yll.ok_or(GridError::MissingHeader("yllcorner"))?;
        if centered {
            xllcorner -= cellsize / 2.0;
            yllcorner -= cellsize / 2.0;
        }

        let values = tokens
            .map(|t| t.parse::<f64>().map_err(|_| GridError::InvalidValue(t.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() != expected {
            return Err(GridError::CellCount {
                expected,
                found: values.len(),
            });
        }

        Ok(Self {
            ncols,
            nrows,
            xllcorner,
            yllcorner,
            cellsize,
            nodata,
            values,
        })
    }
}

impl std::fmt::Display for AsciiGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = String::new();
        writeln!(out, "ncols {}", self.ncols)?;
        writeln!(out, "nrows {}", self.nrows)?;
        writeln!(out, "xllcorner {}", self.xllcorner)?;
        writeln!(out, "yllcorner {}", self.yllcorner)?;
        writeln!(out, "cellsize {}", self.cellsize)?;
        if let Some(nodata) = self.nodata {
            writeln!(out, "NODATA_value {}", nodata)?;
        }
        for row in self.values.chunks(self.ncols.max(1)) {
            let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        f.write_str(&out)
    }
}
