//! Neighbourhood, terrain and resampling kernels over ASCII grids

use std::str::FromStr;

use geo::{Intersects, MultiPolygon, Point};
use gis_mcp_application::OperationError;

use super::ascii_grid::AsciiGrid;

/// Written for cells without a result when the source declares no nodata value
pub const DEFAULT_NODATA: f64 = -9999.0;

pub fn output_nodata(grid: &AsciiGrid) -> f64 {
    grid.nodata.unwrap_or(DEFAULT_NODATA)
}

/// Grid with the source georeferencing and a guaranteed nodata value
fn derived(grid: &AsciiGrid, values: Vec<f64>) -> AsciiGrid {
    let mut out = grid.with_values(values);
    out.nodata = Some(output_nodata(grid));
    out
}

impl AsciiGrid {
    pub fn top(&self) -> f64 {
        self.yllcorner + self.nrows as f64 * self.cellsize
    }

    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.xllcorner + (col as f64 + 0.5) * self.cellsize,
            self.top() - (row as f64 + 0.5) * self.cellsize,
        )
    }

    /// Value at `(row, col)`, `None` for nodata
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.values[row * self.ncols + col];
        (!self.is_nodata(v)).then_some(v)
    }

    /// Same extent and resolution
    pub fn is_aligned_with(&self, other: &AsciiGrid) -> bool {
        self.ncols == other.ncols
            && self.nrows == other.nrows
            && self.xllcorner == other.xllcorner
            && self.yllcorner == other.yllcorner
            && self.cellsize == other.cellsize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocalStatistic {
    Mean,
    Min,
    Max,
    Std,
}

impl FromStr for FocalStatistic {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "std" => Ok(Self::Std),
            other => Err(OperationError::domain(format!(
                "Unsupported statistic '{}' (supported: mean, min, max, std)",
                other
            ))),
        }
    }
}

impl FocalStatistic {
    fn apply(self, window: &[f64]) -> f64 {
        let n = window.len() as f64;
        match self {
            Self::Mean => window.iter().sum::<f64>() / n,
            Self::Min => window.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Std => {
                let mean = window.iter().sum::<f64>() / n;
                (window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
            }
        }
    }
}

/// Moving-window statistic over a `size` x `size` window. Edges repeat the
/// nearest cell; nodata neighbours are skipped and nodata centres stay nodata.
pub fn focal(grid: &AsciiGrid, statistic: FocalStatistic, size: usize) -> AsciiGrid {
    let half = (size / 2) as isize;
    let nodata = output_nodata(grid);
    let clamp = |i: isize, len: usize| i.clamp(0, len as isize - 1) as usize;
    let mut window = Vec::with_capacity(size * size);
    let mut values = Vec::with_capacity(grid.values.len());
    for row in 0..grid.nrows {
        for col in 0..grid.ncols {
            if grid.value(row, col).is_none() {
                values.push(nodata);
                continue;
            }
            window.clear();
            for dr in -half..=half {
                for dc in -half..=half {
                    let r = clamp(row as isize + dr, grid.nrows);
                    let c = clamp(col as isize + dc, grid.ncols);
                    window.extend(grid.value(r, c));
                }
            }
            values.push(statistic.apply(&window));
        }
    }
    derived(grid, values)
}

/// Shaded relief in 0..=255 from a DEM. Gradients are central differences
/// (one-sided at the edges) along rows and columns; missing neighbours take
/// the centre elevation.
pub fn hillshade(grid: &AsciiGrid, azimuth: f64, altitude: f64) -> AsciiGrid {
    let nodata = output_nodata(grid);
    let az = azimuth.to_radians();
    let alt = altitude.to_radians();
    let derivative = |row: usize, col: usize, along_rows: bool| -> f64 {
        let centre = grid.value(row, col).unwrap_or(0.0);
        let len = if along_rows { grid.nrows } else { grid.ncols };
        let at = |i: usize| {
            let (r, c) = if along_rows { (i, col) } else { (row, i) };
            grid.value(r, c).unwrap_or(centre)
        };
        let i = if along_rows { row } else { col };
        if len < 2 {
            0.0
        } else if i == 0 {
            (at(1) - at(0)) / grid.cellsize
        } else if i == len - 1 {
            (at(i) - at(i - 1)) / grid.cellsize
        } else {
            (at(i + 1) - at(i - 1)) / (2.0 * grid.cellsize)
        }
    };

    let mut values = Vec::with_capacity(grid.values.len());
    for row in 0..grid.nrows {
        for col in 0..grid.ncols {
            if grid.value(row, col).is_none() {
                values.push(nodata);
                continue;
            }
            let x = derivative(row, col, true);
            let y = derivative(row, col, false);
            let slope = std::f64::consts::FRAC_PI_2 - x.hypot(y).atan();
            let aspect = (-x).atan2(y);
            let shaded =
                alt.sin() * slope.sin() + alt.cos() * slope.cos() * (az - aspect).cos();
            values.push((255.0 * shaded).clamp(0.0, 255.0).round());
        }
    }
    derived(grid, values)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resampling {
    Nearest,
    Bilinear,
}

impl FromStr for Resampling {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            other => Err(OperationError::domain(format!(
                "Unsupported resampling '{}' (supported: nearest, bilinear)",
                other
            ))),
        }
    }
}

/// Value at map position `(x, y)`; `None` outside the grid or on nodata
pub fn sample(grid: &AsciiGrid, x: f64, y: f64, method: Resampling) -> Option<f64> {
    let fx = (x - grid.xllcorner) / grid.cellsize;
    let fy = (grid.top() - y) / grid.cellsize;
    if fx < 0.0 || fy < 0.0 || fx >= grid.ncols as f64 || fy >= grid.nrows as f64 {
        return None;
    }
    let nearest = grid.value(fy as usize, fx as usize);
    if method == Resampling::Nearest {
        return nearest;
    }

    // pixel-centre coordinates
    let px = (fx - 0.5).clamp(0.0, (grid.ncols - 1) as f64);
    let py = (fy - 0.5).clamp(0.0, (grid.nrows - 1) as f64);
    let (c0, r0) = (px.floor() as usize, py.floor() as usize);
    let (c1, r1) = ((c0 + 1).min(grid.ncols - 1), (r0 + 1).min(grid.nrows - 1));
    let (tx, ty) = (px - c0 as f64, py - r0 as f64);
    match (
        grid.value(r0, c0),
        grid.value(r0, c1),
        grid.value(r1, c0),
        grid.value(r1, c1),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => {
            let top = a + (b - a) * tx;
            let bottom = c + (d - c) * tx;
            Some(top + (bottom - top) * ty)
        }
        _ => nearest,
    }
}

/// `grid` sampled at every cell centre of `reference`
pub fn align_to(grid: &AsciiGrid, reference: &AsciiGrid, method: Resampling) -> AsciiGrid {
    let nodata = output_nodata(grid);
    let mut values = Vec::with_capacity(reference.values.len());
    for row in 0..reference.nrows {
        for col in 0..reference.ncols {
            let (x, y) = reference.cell_center(row, col);
            values.push(sample(grid, x, y, method).unwrap_or(nodata));
        }
    }
    let mut out = reference.with_values(values);
    out.nodata = Some(nodata);
    out
}

/// Scale the cell count by `factor`, keeping the upper-left corner and
/// square cells of `cellsize / factor`
pub fn resample(
    grid: &AsciiGrid,
    factor: f64,
    method: Resampling,
) -> Result<AsciiGrid, OperationError> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(OperationError::domain("Scale factor must be positive"));
    }
    let ncols = (grid.ncols as f64 * factor).floor();
    let nrows = (grid.nrows as f64 * factor).floor();
    if ncols < 1.0 || nrows < 1.0 {
        return Err(OperationError::domain(
            "Resulting raster dimensions are zero; check scale_factor",
        ));
    }
    if ncols * nrows > (grid.values.len() as f64).max(1.0) * 64.0 {
        return Err(OperationError::domain(format!(
            "Scale factor {} would produce {} x {} cells",
            factor, ncols, nrows
        )));
    }
    let cellsize = grid.cellsize / factor;
    let (ncols, nrows) = (ncols as usize, nrows as usize);
    let target = AsciiGrid {
        ncols,
        nrows,
        xllcorner: grid.xllcorner,
        yllcorner: grid.top() - nrows as f64 * cellsize,
        cellsize,
        nodata: grid.nodata,
        values: Vec::new(),
    };
    Ok(align_to(grid, &target, method))
}

/// Boundary points per edge used to find the warped extent
const EDGE_SAMPLES: usize = 20;

/// `grid` warped onto a north-up grid in another CRS. `forward` maps source
/// positions into the target CRS and `inverse` maps them back; `None` marks
/// a position outside a projection's domain. The cell count is roughly kept.
pub fn warp(
    grid: &AsciiGrid,
    forward: impl Fn(f64, f64) -> Option<(f64, f64)>,
    inverse: impl Fn(f64, f64) -> Option<(f64, f64)>,
    method: Resampling,
) -> Result<AsciiGrid, OperationError> {
    let [minx, miny, maxx, maxy] = grid.bounds();
    let mut extent = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        let x = minx + t * (maxx - minx);
        let y = miny + t * (maxy - miny);
        for (px, py) in [(x, miny), (x, maxy), (minx, y), (maxx, y)] {
            if let Some((tx, ty)) = forward(px, py).filter(|(a, b)| a.is_finite() && b.is_finite()) {
                extent = [extent[0].min(tx), extent[1].min(ty), extent[2].max(tx), extent[3].max(ty)];
            }
        }
    }
    let (width, height) = (extent[2] - extent[0], extent[3] - extent[1]);
    if !(width > 0.0 && height > 0.0) {
        return Err(OperationError::domain(
            "Raster extent cannot be transformed to the target CRS",
        ));
    }

    let cellsize = (width * height / grid.values.len() as f64).sqrt();
    let ncols = (width / cellsize).ceil().max(1.0) as usize;
    let nrows = (height / cellsize).ceil().max(1.0) as usize;
    let nodata = output_nodata(grid);
    let mut target = AsciiGrid {
        ncols,
        nrows,
        xllcorner: extent[0],
        yllcorner: extent[3] - nrows as f64 * cellsize,
        cellsize,
        nodata: Some(nodata),
        values: Vec::with_capacity(ncols * nrows),
    };
    for row in 0..nrows {
        for col in 0..ncols {
            let (x, y) = target.cell_center(row, col);
            let value = inverse(x, y).and_then(|(sx, sy)| sample(grid, sx, sy, method));
            target.values.push(value.unwrap_or(nodata));
        }
    }
    Ok(target)
}

/// Square tiles of at most `size` cells, keyed by their first row and column
pub fn tiles(grid: &AsciiGrid, size: usize) -> Vec<(usize, usize, AsciiGrid)> {
    let mut out = Vec::new();
    for row0 in (0..grid.nrows).step_by(size) {
        let nrows = size.min(grid.nrows - row0);
        for col0 in (0..grid.ncols).step_by(size) {
            let ncols = size.min(grid.ncols - col0);
            let values = (row0..row0 + nrows)
                .flat_map(|r| {
                    let start = r * grid.ncols + col0;
                    grid.values[start..start + ncols].iter().copied()
                })
                .collect();
            let top = grid.top() - row0 as f64 * grid.cellsize;
            let tile = AsciiGrid {
                ncols,
                nrows,
                xllcorner: grid.xllcorner + col0 as f64 * grid.cellsize,
                yllcorner: top - nrows as f64 * grid.cellsize,
                cellsize: grid.cellsize,
                nodata: grid.nodata,
                values,
            };
            out.push((row0, col0, tile));
        }
    }
    out
}

/// Valid values of the cells whose centre falls inside `zone`
pub fn zone_values(grid: &AsciiGrid, zone: &MultiPolygon<f64>) -> Vec<f64> {
    let mut values = Vec::new();
    for row in 0..grid.nrows {
        for col in 0..grid.ncols {
            let Some(value) = grid.value(row, col) else {
                continue;
            };
            let (x, y) = grid.cell_center(row, col);
            if zone.intersects(&Point::new(x, y)) {
                values.push(value);
            }
        }
    }
    values
}
