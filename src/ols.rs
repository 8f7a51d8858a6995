use anyhow::{Result, anyhow};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};

const RANK_EPS: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub n: usize,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    pub t_values: Vec<f64>,
    pub p_values: Vec<f64>,
    pub intercept_t_value: f64,
    pub intercept_p_value: f64,
    pub r2: f64,
}

/// Ordinary least squares with an intercept. `x` is row-major, one row per
/// observation. Solved through SVD so a rank-deficient design still yields the
/// minimum-norm solution; standard errors use the pseudo-inverse of XᵀX.
pub fn fit_ols(x: &[Vec<f64>], y: &[f64]) -> Result<OlsFit> {
    let n = y.len();
    if x.len() != n {
        return Err(anyhow!("design has {} rows but target has {n}", x.len()));
    }
    let p = x.first().map(|r| r.len()).unwrap_or(0);
    if x.iter().any(|r| r.len() != p) {
        return Err(anyhow!("ragged design matrix"));
    }
    let params = p + 1;
    if n <= params {
        return Err(anyhow!(
            "need more than {params} observations for {p} features, got {n}"
        ));
    }

    let design = DMatrix::from_fn(n, params, |r, c| if c == 0 { 1.0 } else { x[r][c - 1] });
    let target = DVector::from_column_slice(y);

    let svd = design.clone().svd(true, true);
    let beta = svd
        .solve(&target, RANK_EPS)
        .map_err(|e| anyhow!("least squares solve failed: {e}"))?;

    let fitted = &design * &beta;
    let rss: f64 = (&target - &fitted).iter().map(|r| r * r).sum();
    let mean_y = target.mean();
    let tss: f64 = target.iter().map(|v| (v - mean_y).powi(2)).sum();
    let r2 = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    let dof = (n - params) as f64;
    let sigma2 = rss / dof;
    let xtx = design.transpose() * &design;
    let xtx_inv = xtx
        .pseudo_inverse(RANK_EPS)
        .map_err(|e| anyhow!("covariance inverse failed: {e}"))?;

    let t_dist = StudentsT::new(0.0, 1.0, dof).map_err(|e| anyhow!("t distribution: {e}"))?;
    let mut se = Vec::with_capacity(params);
    let mut t = Vec::with_capacity(params);
    let mut pv = Vec::with_capacity(params);
    for j in 0..params {
        let s = (sigma2 * xtx_inv[(j, j)]).max(0.0).sqrt();
        let tv = if s > 0.0 { beta[j] / s } else { f64::NAN };
        let pval = if tv.is_finite() {
            2.0 * t_dist.sf(tv.abs())
        } else {
            f64::NAN
        };
        se.push(s);
        t.push(tv);
        pv.push(pval);
    }

    Ok(OlsFit {
        n,
        intercept: beta[0],
        coefficients: beta.iter().skip(1).copied().collect(),
        std_errors: se[1..].to_vec(),
        t_values: t[1..].to_vec(),
        p_values: pv[1..].to_vec(),
        intercept_t_value: t[0],
        intercept_p_value: pv[0],
        r2,
    })
}

/// Column-wise z-scores with population std; constant columns become zeros.
pub fn standardize_columns(x: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(p) = x.first().map(|r| r.len()) else {
        return Vec::new();
    };
    let cols: Vec<(f64, f64)> = (0..p)
        .map(|c| {
            let vals: Vec<f64> = x.iter().map(|r| r[c]).collect();
            mean_std(&vals)
        })
        .collect();
    x.iter()
        .map(|r| {
            r.iter()
                .zip(&cols)
                .map(|(v, (m, s))| (v - m) / s)
                .collect()
        })
        .collect()
}

pub fn standardize(values: &[f64]) -> Vec<f64> {
    let (m, s) = mean_std(values);
    values.iter().map(|v| (v - m) / s).collect()
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len().max(1) as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    (mean, if std > f64::EPSILON { std } else { 1.0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_noiseless_coefficients() {
        let x: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 3.0 + 2.0 * r[0] - 0.5 * r[1]).collect();
        let fit = fit_ols(&x, &y).unwrap();
        assert!((fit.intercept - 3.0).abs() < 1e-8);
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-8);
        assert!((fit.coefficients[1] + 0.5).abs() < 1e-8);
        assert!((fit.r2 - 1.0).abs() < 1e-10);
    }

    #[test]
    fn noisy_fit_reports_significance() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = (0..40)
            .map(|i| 1.0 + 0.8 * i as f64 + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let fit = fit_ols(&x, &y).unwrap();
        assert!(fit.r2 > 0.95 && fit.r2 < 1.0);
        assert!(fit.t_values[0] > 10.0);
        assert!(fit.p_values[0] < 1e-6);
        // Survival function keeps far-tail p-values off exact zero.
        assert!(fit.p_values[0] > 0.0);
        assert!(fit.std_errors[0] > 0.0);
    }

    #[test]
    fn too_few_rows_is_an_error() {
        let x = vec![vec![1.0, 2.0], vec![2.0, 1.0], vec![3.0, 3.0]];
        assert!(fit_ols(&x, &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn standardize_constant_column_is_zero() {
        let z = standardize_columns(&[vec![1.0, 4.0], vec![3.0, 4.0]]);
        assert_eq!(z[0], vec![-1.0, 0.0]);
        assert_eq!(z[1], vec![1.0, 0.0]);
    }
}
