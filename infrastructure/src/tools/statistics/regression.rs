//! Ordinary least squares with a Moran's I test on the residuals

use gis_mcp_application::OperationError;

use super::esda::morans_i;
use super::weights::SpatialWeights;

/// Name of the intercept coefficient
pub const CONSTANT: &str = "CONSTANT";

#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub n_obs: usize,
    /// Intercept first, then one coefficient per regressor
    pub betas: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub r2: f64,
    pub residuals: Vec<f64>,
    /// Moran's I of the residuals and its normal-approximation p-value
    pub moran_residual: Option<(f64, f64)>,
}

/// Fit `y = Xβ + ε` with an intercept; `columns` holds one vector per regressor
pub fn ols(y: &[f64], columns: &[Vec<f64>], weights: &SpatialWeights) -> Result<OlsFit, OperationError> {
    let n = y.len();
    let k = columns.len() + 1;
    if n <= k {
        return Err(OperationError::domain(format!(
            "OLS needs more observations ({}) than coefficients ({})",
            n, k
        )));
    }
    let row = |i: usize| -> Vec<f64> {
        std::iter::once(1.0).chain(columns.iter().map(|c| c[i])).collect()
    };

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (i, yi) in y.iter().enumerate() {
        let xi = row(i);
        for a in 0..k {
            xty[a] += xi[a] * yi;
            for b in 0..k {
                xtx[a][b] += xi[a] * xi[b];
            }
        }
    }
    let inverse = invert(xtx)?;
    let betas: Vec<f64> = (0..k)
        .map(|a| (0..k).map(|b| inverse[a][b] * xty[b]).sum())
        .collect();

    let residuals: Vec<f64> = y
        .iter()
        .enumerate()
        .map(|(i, yi)| yi - row(i).iter().zip(&betas).map(|(x, b)| x * b).sum::<f64>())
        .collect();
    let ssr: f64 = residuals.iter().map(|e| e * e).sum();
    let mean = y.iter().sum::<f64>() / n as f64;
    let sst: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let sigma2 = ssr / (n - k) as f64;

    // an exact fit leaves only rounding noise in the residuals
    let moran_residual = if ssr > 1e-12 * sst.max(1.0) && weights.moments().0 > 0.0 {
        let stat = morans_i(&residuals, weights)?;
        Some((stat.value, stat.p_value))
    } else {
        None
    };

    Ok(OlsFit {
        n_obs: n,
        std_errors: (0..k).map(|a| (sigma2 * inverse[a][a]).sqrt()).collect(),
        r2: if sst > 0.0 { 1.0 - ssr / sst } else { 1.0 },
        betas,
        residuals,
        moran_residual,
    })
}

/// Gauss-Jordan inversion with partial pivoting
fn invert(mut matrix: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, OperationError> {
    let k = matrix.len();
    let tolerance = 1e-12
        * matrix
            .iter()
            .flatten()
            .fold(0.0_f64, |max, v| max.max(v.abs()))
            .max(1.0);
    let mut inverse: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();
    for col in 0..k {
        let pivot = (col..k)
            .max_by(|a, b| matrix[*a][col].abs().total_cmp(&matrix[*b][col].abs()))
            .unwrap_or(col);
        if matrix[pivot][col].abs() < tolerance {
            return Err(OperationError::domain(
                "Regressors are collinear; X'X is singular",
            ));
        }
        matrix.swap(col, pivot);
        inverse.swap(col, pivot);
        let scale = matrix[col][col];
        for j in 0..k {
            matrix[col][j] /= scale;
            inverse[col][j] /= scale;
        }
        for r in (0..k).filter(|r| *r != col) {
            let factor = matrix[r][col];
            for j in 0..k {
                matrix[r][j] -= factor * matrix[col][j];
                inverse[r][j] -= factor * inverse[col][j];
            }
        }
    }
    Ok(inverse)
}
