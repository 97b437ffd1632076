//! Global and local spatial autocorrelation statistics
//!
//! Moran's I and Geary's C report the analytical normality approximation.
//! The remaining statistics are tested by random permutation: the global
//! ones shuffle every value, the local ones shuffle the other values around
//! each fixed observation (conditional randomisation).

use std::f64::consts::SQRT_2;

use gis_mcp_application::OperationError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::weights::{SpatialWeights, Transform};

/// Statistic value with its normality-approximation z-score and p-value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Autocorrelation {
    pub value: f64,
    pub expected: f64,
    pub variance: f64,
    pub z_score: f64,
    pub p_value: f64,
}

impl Autocorrelation {
    fn new(value: f64, expected: f64, variance: f64) -> Self {
        let z_score = if variance > 0.0 {
            (value - expected) / variance.sqrt()
        } else {
            0.0
        };
        Self {
            value,
            expected,
            variance,
            z_score,
            p_value: upper_tail(z_score.abs()),
        }
    }
}

/// Pseudo p-value and z-score of an observed value against its permutations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulated {
    pub value: f64,
    pub expected: f64,
    pub variance: f64,
    pub z_score: f64,
    pub p_value: f64,
}

impl Simulated {
    /// Folded one-tailed pseudo p-value, `(extremes + 1) / (permutations + 1)`
    fn new(value: f64, sims: &[f64]) -> Self {
        let permutations = sims.len();
        let mean = sims.iter().sum::<f64>() / permutations as f64;
        let variance = sims.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / permutations as f64;
        let mut larger = sims.iter().filter(|s| **s >= value).count();
        if permutations - larger < larger {
            larger = permutations - larger;
        }
        let z_score = if variance > 0.0 {
            (value - mean) / variance.sqrt()
        } else {
            0.0
        };
        Self {
            value,
            expected: mean,
            variance,
            z_score,
            p_value: (larger as f64 + 1.0) / (permutations as f64 + 1.0),
        }
    }
}

/// Permutation settings shared by every simulated statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permutations {
    pub count: usize,
    pub seed: Option<u64>,
}

impl Permutations {
    pub fn new(count: usize, seed: Option<u64>) -> Self {
        Self { count, seed }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Recompute `statistic` over `count` shuffles of `values`
    fn global<F>(&self, values: &[f64], statistic: F) -> Vec<f64>
    where
        F: Fn(&[f64]) -> f64,
    {
        let mut rng = self.rng();
        let mut shuffled = values.to_vec();
        (0..self.count)
            .map(|_| {
                shuffled.shuffle(&mut rng);
                statistic(&shuffled)
            })
            .collect()
    }

    /// For each observation, draw its neighbours' values from the others.
    ///
    /// `statistic(i, lag)` receives the permuted weighted lag of observation `i`.
    fn conditional<F>(&self, values: &[f64], weights: &SpatialWeights, statistic: F) -> Vec<Vec<f64>>
    where
        F: Fn(usize, f64) -> f64,
    {
        let mut rng = self.rng();
        weights
            .neighbors
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut others: Vec<f64> = values
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, v)| *v)
                    .collect();
                (0..self.count)
                    .map(|_| {
                        let (drawn, _) = others.partial_shuffle(&mut rng, row.len());
                        let lag: f64 = row.iter().zip(drawn.iter()).map(|((_, w), v)| w * v).sum();
                        statistic(i, lag)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Local statistic per observation with its simulated inference
#[derive(Debug, Clone, PartialEq)]
pub struct LocalStatistic {
    pub values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub z_scores: Vec<f64>,
}

impl LocalStatistic {
    fn new(values: Vec<f64>, sims: Vec<Vec<f64>>) -> Self {
        let simulated: Vec<Simulated> = values
            .iter()
            .zip(&sims)
            .map(|(value, sims)| Simulated::new(*value, sims))
            .collect();
        Self {
            p_values: simulated.iter().map(|s| s.p_value).collect(),
            z_scores: simulated.iter().map(|s| s.z_score).collect(),
            values,
        }
    }
}

/// Global join counts of a 0/1 variable over binary weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinCounts {
    /// Total joins
    pub joins: f64,
    pub bb: f64,
    pub bw: f64,
    pub ww: f64,
    /// Permutation inference on `bb`
    pub bb_test: Simulated,
}

fn deviations(values: &[f64]) -> Result<(Vec<f64>, f64), OperationError> {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let z: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let m2: f64 = z.iter().map(|d| d * d).sum();
    if m2 == 0.0 {
        return Err(OperationError::domain(
            "Dependent variable is constant; autocorrelation is undefined",
        ));
    }
    Ok((z, m2))
}

fn islands_error() -> OperationError {
    OperationError::domain("Every feature is an island; increase distance_threshold")
}

pub fn morans_i(values: &[f64], weights: &SpatialWeights) -> Result<Autocorrelation, OperationError> {
    let n = values.len() as f64;
    let (z, m2) = deviations(values)?;
    let (s0, s1, s2) = weights.moments();
    if s0 == 0.0 {
        return Err(islands_error());
    }
    let cross: f64 = weights.links().map(|(i, j, w)| w * z[i] * z[j]).sum();
    let value = n / s0 * cross / m2;
    let expected = -1.0 / (n - 1.0);
    let variance = (n * n * s1 - n * s2 + 3.0 * s0 * s0) / ((n * n - 1.0) * s0 * s0)
        - expected * expected;
    Ok(Autocorrelation::new(value, expected, variance))
}

pub fn gearys_c(values: &[f64], weights: &SpatialWeights) -> Result<Autocorrelation, OperationError> {
    let n = values.len() as f64;
    let (_, m2) = deviations(values)?;
    let (s0, s1, s2) = weights.moments();
    if s0 == 0.0 {
        return Err(islands_error());
    }
    let squared: f64 = weights
        .links()
        .map(|(i, j, w)| w * (values[i] - values[j]).powi(2))
        .sum();
    let value = (n - 1.0) * squared / (2.0 * s0 * m2);
    let variance = ((2.0 * s1 + s2) * (n - 1.0) - 4.0 * s0 * s0) / (2.0 * (n + 1.0) * s0 * s0);
    Ok(Autocorrelation::new(value, 1.0, variance))
}

/// Global Getis-Ord G: `Σ w_ij x_i x_j / Σ_{i≠j} x_i x_j`
pub fn getis_ord_g(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: Permutations,
) -> Result<Simulated, OperationError> {
    if weights.moments().0 == 0.0 {
        return Err(islands_error());
    }
    let total: f64 = values.iter().sum();
    let squares: f64 = values.iter().map(|v| v * v).sum();
    let denominator = total * total - squares;
    if denominator == 0.0 {
        return Err(OperationError::domain(
            "Getis-Ord G is undefined when all cross products are zero",
        ));
    }
    let statistic = |x: &[f64]| -> f64 {
        weights.links().map(|(i, j, w)| w * x[i] * x[j]).sum::<f64>() / denominator
    };
    let observed = statistic(values);
    Ok(Simulated::new(observed, &permutations.global(values, statistic)))
}

/// Cross-product Gamma index `Σ w_ij x_i x_j`
pub fn gamma(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: Permutations,
) -> Result<Simulated, OperationError> {
    if weights.moments().0 == 0.0 {
        return Err(islands_error());
    }
    let statistic = |x: &[f64]| -> f64 { weights.links().map(|(i, j, w)| w * x[i] * x[j]).sum() };
    let observed = statistic(values);
    Ok(Simulated::new(observed, &permutations.global(values, statistic)))
}

fn require_binary(values: &[f64]) -> Result<(), OperationError> {
    match values.iter().position(|v| *v != 0.0 && *v != 1.0) {
        Some(index) => Err(OperationError::domain(format!(
            "Join counts need a 0/1 variable; feature {} has value {}",
            index, values[index]
        ))),
        None => Ok(()),
    }
}

fn binary(weights: &SpatialWeights) -> SpatialWeights {
    let mut binary = weights.clone();
    binary.set_transform(Transform::Binary);
    binary
}

pub fn join_counts(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: Permutations,
) -> Result<JoinCounts, OperationError> {
    require_binary(values)?;
    let w = binary(weights);
    if w.moments().0 == 0.0 {
        return Err(islands_error());
    }
    let bb_of = |y: &[f64]| -> f64 { w.links().map(|(i, j, _)| y[i] * y[j]).sum::<f64>() / 2.0 };
    let bw: f64 = w.links().map(|(i, j, _)| (values[i] - values[j]).powi(2)).sum::<f64>() / 2.0;
    let ww: f64 = w
        .links()
        .map(|(i, j, _)| (1.0 - values[i]) * (1.0 - values[j]))
        .sum::<f64>()
        / 2.0;
    let bb = bb_of(values);
    Ok(JoinCounts {
        joins: bb + bw + ww,
        bb,
        bw,
        ww,
        bb_test: Simulated::new(bb, &permutations.global(values, bb_of)),
    })
}

/// Local join counts `x_i Σ_j b_ij x_j` over binary weights
pub fn join_counts_local(values: &[f64], weights: &SpatialWeights) -> Result<Vec<f64>, OperationError> {
    require_binary(values)?;
    let w = binary(weights);
    Ok(w.lag(values)
        .into_iter()
        .zip(values)
        .map(|(lag, x)| x * lag)
        .collect())
}

/// Local Moran's I: `(n - 1) z_i Σ_j w_ij z_j / Σ z²`
pub fn moran_local(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: Permutations,
) -> Result<LocalStatistic, OperationError> {
    let (z, m2) = deviations(values)?;
    let scale = (values.len() as f64 - 1.0) / m2;
    let observed: Vec<f64> = weights
        .lag(&z)
        .into_iter()
        .zip(&z)
        .map(|(lag, zi)| scale * zi * lag)
        .collect();
    let sims = permutations.conditional(&z, weights, |i, lag| scale * z[i] * lag);
    Ok(LocalStatistic::new(observed, sims))
}

/// Local Getis-Ord G: `Σ_j w_ij x_j / Σ_{j≠i} x_j`
pub fn getis_ord_g_local(
    values: &[f64],
    weights: &SpatialWeights,
    permutations: Permutations,
) -> Result<LocalStatistic, OperationError> {
    let total: f64 = values.iter().sum();
    let denominators: Vec<f64> = values.iter().map(|v| total - v).collect();
    if let Some(index) = denominators.iter().position(|d| *d == 0.0) {
        return Err(OperationError::domain(format!(
            "Local G is undefined for feature {}: the other values sum to zero",
            index
        )));
    }
    let observed: Vec<f64> = weights
        .lag(values)
        .into_iter()
        .zip(&denominators)
        .map(|(lag, d)| lag / d)
        .collect();
    let sims = permutations.conditional(values, weights, |i, lag| lag / denominators[i]);
    Ok(LocalStatistic::new(observed, sims))
}

/// One-sided tail probability of the standard normal
pub fn upper_tail(z: f64) -> f64 {
    0.5 * erfc(z / SQRT_2)
}

/// Complementary error function (Chebyshev fit, |error| < 1.2e-7)
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let result = t * poly.exp();
    if x >= 0.0 { result } else { 2.0 - result }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x4 lattice, rook neighbours, row-standardised
    fn lattice() -> SpatialWeights {
        let points: Vec<(f64, f64)> = (0..16).map(|i| ((i % 4) as f64, (i / 4) as f64)).collect();
        let mut weights = SpatialWeights::distance_band(&points, 1.0, true);
        weights.row_standardize();
        weights
    }

    /// High values in the left half, low in the right
    fn split_values() -> Vec<f64> {
        (0..16).map(|i| if i % 4 < 2 { 10.0 } else { 1.0 }).collect()
    }

    fn seeded() -> Permutations {
        Permutations::new(199, Some(7))
    }

    #[test]
    fn test_upper_tail() {
        assert!((upper_tail(0.0) - 0.5).abs() < 1e-6);
        assert!((upper_tail(1.96) - 0.025).abs() < 1e-3);
    }

    #[test]
    fn test_pseudo_p_value_folds_to_smaller_tail() {
        let sims: Vec<f64> = (0..99).map(f64::from).collect();
        assert!((Simulated::new(200.0, &sims).p_value - 0.01).abs() < 1e-12);
        assert!((Simulated::new(-1.0, &sims).p_value - 0.01).abs() < 1e-12);
        assert!(Simulated::new(49.0, &sims).p_value > 0.4);
    }

    #[test]
    fn test_seeded_permutations_repeat() {
        let first = getis_ord_g(&split_values(), &lattice(), seeded()).unwrap();
        let second = getis_ord_g(&split_values(), &lattice(), seeded()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_getis_ord_g_detects_high_clusters() {
        let g = getis_ord_g(&split_values(), &lattice(), seeded()).unwrap();
        assert!(g.value > g.expected);
        assert!(g.p_value < 0.05);
    }

    #[test]
    fn test_gamma_matches_cross_product() {
        let weights = lattice();
        let values = split_values();
        let expected: f64 = weights.links().map(|(i, j, w)| w * values[i] * values[j]).sum();
        let gamma = gamma(&values, &weights, seeded()).unwrap();
        assert!((gamma.value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_join_counts_partition_every_join() {
        let values: Vec<f64> = split_values().iter().map(|v| f64::from(*v > 5.0)).collect();
        let counts = join_counts(&values, &lattice(), seeded()).unwrap();
        // 24 rook joins on a 4x4 lattice; 4 of them cross the split
        assert_eq!(counts.joins, 24.0);
        assert_eq!(counts.bw, 4.0);
        assert_eq!(counts.bb, 10.0);
        assert_eq!(counts.ww, 10.0);
        assert!(counts.bb_test.p_value < 0.05);

        let local = join_counts_local(&values, &lattice()).unwrap();
        assert_eq!(local[0], 2.0);
        assert_eq!(local[3], 0.0);
        assert!(join_counts(&split_values(), &lattice(), seeded()).is_err());
    }

    #[test]
    fn test_moran_local_positive_inside_clusters() {
        let local = moran_local(&split_values(), &lattice(), seeded()).unwrap();
        assert_eq!(local.values.len(), 16);
        // corners sit wholly inside their cluster
        assert!(local.values[0] > 0.0);
        assert!(local.values[3] > 0.0);
        assert!(local.p_values.iter().all(|p| *p > 0.0 && *p <= 1.0));
    }

    #[test]
    fn test_getis_ord_g_local_ratio() {
        let values = split_values();
        let local = getis_ord_g_local(&values, &lattice(), seeded()).unwrap();
        let total: f64 = values.iter().sum();
        // every neighbour of cell 0 holds 10
        assert!((local.values[0] - 10.0 / (total - 10.0)).abs() < 1e-12);
        assert!(local.z_scores[0] > 0.0);
    }
}
