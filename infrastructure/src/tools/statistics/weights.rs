//! Sparse spatial weights
//!
//! Every builder produces one neighbour row per observation. Rows hold
//! `(column, weight)` pairs and never a dense matrix, so memory grows with
//! the number of neighbour links rather than with `n²`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use geo::{Coord, Geometry};
use gis_mcp_application::OperationError;

use crate::tools::support::to_multi_polygon;

/// Neighbour rows with weights
pub type Rows = Vec<Vec<(usize, f64)>>;

/// Vertex sharing rule for polygon contiguity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contiguity {
    /// Any shared vertex
    Queen,
    /// A shared edge
    Rook,
}

impl FromStr for Contiguity {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queen" => Ok(Contiguity::Queen),
            "rook" => Ok(Contiguity::Rook),
            other => Err(OperationError::domain(format!(
                "Unsupported contiguity '{}' (supported: queen, rook)",
                other
            ))),
        }
    }
}

/// Weight transformations, by their one-letter code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Rows sum to one
    Row,
    /// Rows scaled by their L2 norm, then the total rescaled to `n`
    Variance,
    /// Every link weighs one
    Binary,
    /// Weights as built
    Original,
    /// Every weight divided by the total
    Double,
}

impl Transform {
    pub fn code(&self) -> &'static str {
        match self {
            Transform::Row => "r",
            Transform::Variance => "v",
            Transform::Binary => "b",
            Transform::Original => "o",
            Transform::Double => "d",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Transform {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "r" => Ok(Transform::Row),
            "v" => Ok(Transform::Variance),
            "b" => Ok(Transform::Binary),
            "o" => Ok(Transform::Original),
            "d" => Ok(Transform::Double),
            other => Err(OperationError::domain(format!(
                "Invalid transform type '{}' (supported: r, v, b, o, d)",
                other
            ))),
        }
    }
}

/// On-disk weights formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightsFormat {
    /// Neighbour lists without weights
    Gal,
    /// One `id neighbour weight` line per link
    Gwt,
}

impl WeightsFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            WeightsFormat::Gal => "gal",
            WeightsFormat::Gwt => "gwt",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|e| e.parse().ok())
    }
}

impl FromStr for WeightsFormat {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gal" => Ok(WeightsFormat::Gal),
            "gwt" => Ok(WeightsFormat::Gwt),
            other => Err(OperationError::domain(format!(
                "Invalid format '{}' (supported: gal, gwt)",
                other
            ))),
        }
    }
}

/// Sparse weights matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialWeights {
    pub neighbors: Rows,
    original: Rows,
    transform: Transform,
}

impl SpatialWeights {
    pub fn from_rows(neighbors: Rows) -> Self {
        Self {
            original: neighbors.clone(),
            neighbors,
            transform: Transform::Original,
        }
    }

    /// Links between centroids no farther apart than `threshold`
    pub fn distance_band(points: &[(f64, f64)], threshold: f64, binary: bool) -> Self {
        let rows = points
            .iter()
            .enumerate()
            .map(|(i, (xi, yi))| {
                points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .filter_map(|(j, (xj, yj))| {
                        let d = (xi - xj).hypot(yi - yj);
                        (d <= threshold).then(|| {
                            let weight = if binary { 1.0 } else { 1.0 / d.max(1e-12) };
                            (j, weight)
                        })
                    })
                    .collect()
            })
            .collect();
        Self::from_rows(rows)
    }

    /// The `k` nearest other centroids of every observation, binary
    pub fn knn(points: &[(f64, f64)], k: usize) -> Result<Self, OperationError> {
        if k == 0 {
            return Err(OperationError::domain("'k' must be at least 1"));
        }
        if k >= points.len() {
            return Err(OperationError::domain(format!(
                "'k' must be smaller than the number of features ({})",
                points.len()
            )));
        }
        let rows = points
            .iter()
            .enumerate()
            .map(|(i, (xi, yi))| {
                let mut others: Vec<(usize, f64)> = points
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(j, (xj, yj))| (j, (xi - xj).hypot(yi - yj)))
                    .collect();
                others.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                others.into_iter().take(k).map(|(j, _)| (j, 1.0)).collect()
            })
            .collect();
        Ok(Self::from_rows(rows))
    }

    /// Binary links between polygons sharing a vertex (queen) or an edge (rook)
    pub fn contiguity(
        geometries: &[Option<Geometry<f64>>],
        rule: Contiguity,
    ) -> Result<Self, OperationError> {
        let mut shared: HashMap<Vec<VertexKey>, BTreeSet<usize>> = HashMap::new();
        for (index, geometry) in geometries.iter().enumerate() {
            let Some(geometry) = geometry else { continue };
            let area = to_multi_polygon(geometry).map_err(|_| {
                OperationError::domain(format!(
                    "Contiguity weights need polygon features; feature {} is not a polygon",
                    index
                ))
            })?;
            for polygon in &area {
                for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                    match rule {
                        Contiguity::Queen => {
                            for coord in ring.coords() {
                                shared.entry(vec![VertexKey::new(*coord)]).or_default().insert(index);
                            }
                        }
                        Contiguity::Rook => {
                            for line in ring.lines() {
                                let mut edge = vec![VertexKey::new(line.start), VertexKey::new(line.end)];
                                edge.sort();
                                shared.entry(edge).or_default().insert(index);
                            }
                        }
                    }
                }
            }
        }

        let mut links: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); geometries.len()];
        for members in shared.values().filter(|m| m.len() > 1) {
            for i in members {
                links[*i].extend(members.iter().filter(|j| *j != i));
            }
        }
        Ok(Self::from_rows(
            links
                .into_iter()
                .map(|row| row.into_iter().map(|j| (j, 1.0)).collect())
                .collect(),
        ))
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn cardinalities(&self) -> Vec<usize> {
        self.neighbors.iter().map(Vec::len).collect()
    }

    pub fn islands(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|i| self.neighbors[*i].is_empty())
            .collect()
    }

    /// Re-weight from the weights as built; island rows stay empty
    pub fn set_transform(&mut self, transform: Transform) {
        let mut rows = self.original.clone();
        match transform {
            Transform::Original => {}
            Transform::Binary => rows
                .iter_mut()
                .flatten()
                .for_each(|(_, w)| *w = 1.0),
            Transform::Row => {
                for row in &mut rows {
                    let total: f64 = row.iter().map(|(_, w)| w).sum();
                    if total > 0.0 {
                        row.iter_mut().for_each(|(_, w)| *w /= total);
                    }
                }
            }
            Transform::Double => {
                let total: f64 = rows.iter().flatten().map(|(_, w)| w).sum();
                if total > 0.0 {
                    rows.iter_mut().flatten().for_each(|(_, w)| *w /= total);
                }
            }
            Transform::Variance => {
                for row in &mut rows {
                    let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                    if norm > 0.0 {
                        row.iter_mut().for_each(|(_, w)| *w /= norm);
                    }
                }
                let total: f64 = rows.iter().flatten().map(|(_, w)| w).sum();
                if total > 0.0 {
                    let scale = rows.len() as f64 / total;
                    rows.iter_mut().flatten().for_each(|(_, w)| *w *= scale);
                }
            }
        }
        self.neighbors = rows;
        self.transform = transform;
    }

    pub fn row_standardize(&mut self) {
        self.set_transform(Transform::Row);
    }

    /// Weights restricted to `keep`, renumbered in that order
    pub fn subset(&self, keep: &[usize]) -> Self {
        let position: HashMap<usize, usize> =
            keep.iter().enumerate().map(|(new, old)| (*old, new)).collect();
        let rows = keep
            .iter()
            .map(|old| {
                self.original[*old]
                    .iter()
                    .filter_map(|(j, w)| position.get(j).map(|new| (*new, *w)))
                    .collect()
            })
            .collect();
        let mut subset = Self::from_rows(rows);
        subset.set_transform(self.transform);
        subset
    }

    /// Spatial lag `Σ_j w_ij x_j` of every observation
    pub fn lag(&self, values: &[f64]) -> Vec<f64> {
        self.neighbors
            .iter()
            .map(|row| row.iter().map(|(j, w)| w * values[*j]).sum())
            .collect()
    }

    /// Every stored link as `(i, j, w_ij)`
    pub fn links(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.neighbors
            .iter()
            .enumerate()
            .flat_map(|(i, row)| row.iter().map(move |(j, w)| (i, *j, *w)))
    }

    /// `(S0, S1, S2)` moment sums, computed from the neighbour rows.
    ///
    /// `S1 = ½ Σ_ij (w_ij + w_ji)²` visits each stored link once; a link
    /// whose reverse is absent contributes both of its ordered terms.
    pub fn moments(&self) -> (f64, f64, f64) {
        let reverse: HashMap<(usize, usize), f64> =
            self.links().map(|(i, j, w)| ((i, j), w)).collect();
        let mut row_sums = vec![0.0; self.len()];
        let mut col_sums = vec![0.0; self.len()];
        let mut s0 = 0.0;
        let mut s1 = 0.0;
        for (i, j, w) in self.links() {
            s0 += w;
            row_sums[i] += w;
            col_sums[j] += w;
            s1 += match reverse.get(&(j, i)) {
                Some(back) => (w + back).powi(2),
                None => 2.0 * w * w,
            };
        }
        let s2 = row_sums
            .iter()
            .zip(&col_sums)
            .map(|(r, c)| (r + c).powi(2))
            .sum();
        (s0, s1 / 2.0, s2)
    }

    /// Write the weights as GAL or GWT, labelling rows with `ids`
    pub fn write(&self, path: &Path, format: WeightsFormat, ids: &[String]) -> Result<(), OperationError> {
        let file = std::fs::File::create(path)
            .map_err(|e| OperationError::io("Failed to create", path, e))?;
        let mut out = std::io::BufWriter::new(file);
        let write_err = |e: std::io::Error| OperationError::io("Failed to write", path, e);
        match format {
            WeightsFormat::Gal => {
                writeln!(out, "{}", self.len()).map_err(write_err)?;
                for (i, row) in self.neighbors.iter().enumerate() {
                    writeln!(out, "{} {}", ids[i], row.len()).map_err(write_err)?;
                    let line: Vec<&str> = row.iter().map(|(j, _)| ids[*j].as_str()).collect();
                    writeln!(out, "{}", line.join(" ")).map_err(write_err)?;
                }
            }
            WeightsFormat::Gwt => {
                writeln!(out, "0 {} unknown unknown", self.len()).map_err(write_err)?;
                for (i, j, w) in self.links() {
                    writeln!(out, "{} {} {}", ids[i], ids[j], w).map_err(write_err)?;
                }
            }
        }
        out.flush().map_err(write_err)
    }

    /// Read GAL or GWT weights, mapping file ids onto positions in `ids`
    pub fn read(path: &Path, ids: &[String]) -> Result<Self, OperationError> {
        let format = WeightsFormat::from_path(path).ok_or_else(|| {
            OperationError::domain(format!(
                "Weights file {} must end in .gal or .gwt",
                path.display()
            ))
        })?;
        let text = std::fs::read_to_string(path)
            .map_err(|e| OperationError::io("Failed to read", path, e))?;
        let position: HashMap<&str, usize> =
            ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        let lookup = |id: &str| {
            position.get(id).copied().ok_or_else(|| {
                OperationError::domain(format!("Weights file refers to unknown id '{}'", id))
            })
        };
        let malformed = || OperationError::domain(format!("Malformed weights file {}", path.display()));

        let mut rows: Rows = vec![Vec::new(); ids.len()];
        let mut lines = text.lines().filter(|l| !l.trim().is_empty()).skip(1);
        match format {
            WeightsFormat::Gal => {
                while let Some(header) = lines.next() {
                    let mut parts = header.split_whitespace();
                    let id = parts.next().ok_or_else(malformed)?;
                    let count: usize = parts
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(malformed)?;
                    let i = lookup(id)?;
                    let members = if count == 0 { "" } else { lines.next().ok_or_else(malformed)? };
                    for neighbour in members.split_whitespace() {
                        rows[i].push((lookup(neighbour)?, 1.0));
                    }
                }
            }
            WeightsFormat::Gwt => {
                for line in lines {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    let [id, neighbour, weight] = parts.as_slice() else {
                        return Err(malformed());
                    };
                    let weight: f64 = weight.parse().map_err(|_| malformed())?;
                    rows[lookup(id)?].push((lookup(neighbour)?, weight));
                }
            }
        }
        Ok(Self::from_rows(rows))
    }
}

/// Exact vertex identity; `-0.0` and `0.0` compare equal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct VertexKey(u64, u64);

impl VertexKey {
    fn new(coord: Coord<f64>) -> Self {
        Self((coord.x + 0.0).to_bits(), (coord.y + 0.0).to_bits())
    }
}
