use anyhow::{Result, anyhow};
use nalgebra::{DMatrix, SymmetricEigen};

#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    /// Population mean and standard deviation per column. Constant columns get
    /// scale 1 so they standardize to zero instead of dividing by zero.
    pub fn fit(x: &DMatrix<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let mut means = Vec::with_capacity(x.ncols());
        let mut scales = Vec::with_capacity(x.ncols());
        for col in x.column_iter() {
            let mean = col.iter().sum::<f64>() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            means.push(mean);
            scales.push(if std > f64::EPSILON { std } else { 1.0 });
        }
        Self { means, scales }
    }

    pub fn transform(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_fn(x.nrows(), x.ncols(), |r, c| {
            (x[(r, c)] - self.means[c]) / self.scales[c]
        })
    }
}

#[derive(Debug, Clone)]
pub struct PcaFit {
    /// One column per component, one row per feature.
    pub components: DMatrix<f64>,
    pub explained_variance_ratio: Vec<f64>,
}

impl PcaFit {
    pub fn n_components(&self) -> usize {
        self.components.ncols()
    }

    pub fn project(&self, x_scaled: &DMatrix<f64>) -> DMatrix<f64> {
        x_scaled * &self.components
    }

    pub fn loading(&self, feature: usize, component: usize) -> f64 {
        self.components[(feature, component)]
    }
}

/// Principal components of an already standardized matrix, largest variance
/// first. Each component is oriented so its largest absolute loading is
/// positive, which pins down the otherwise arbitrary eigenvector sign.
pub fn fit_pca(x_scaled: &DMatrix<f64>, n_components: usize) -> Result<PcaFit> {
    let (n, p) = x_scaled.shape();
    if n == 0 || p == 0 {
        return Err(anyhow!("cannot fit PCA on an empty {n}x{p} matrix"));
    }
    let k = n_components.min(p).min(n);
    if k == 0 {
        return Err(anyhow!("PCA needs at least one component"));
    }

    let means: Vec<f64> = x_scaled
        .column_iter()
        .map(|c| c.iter().sum::<f64>() / n as f64)
        .collect();
    let centered = DMatrix::from_fn(n, p, |r, c| x_scaled[(r, c)] - means[c]);
    let denom = (n.saturating_sub(1)).max(1) as f64;
    let cov = (centered.transpose() * &centered) / denom;

    let eig = SymmetricEigen::new(cov);
    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .partial_cmp(&eig.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });

    let total: f64 = eig.eigenvalues.iter().map(|v| v.max(0.0)).sum();
    let mut components = DMatrix::zeros(p, k);
    let mut explained_variance_ratio = Vec::with_capacity(k);

    for (slot, &src) in order.iter().take(k).enumerate() {
        let mut vec = eig.eigenvectors.column(src).clone_owned();
        let mut pivot = 0usize;
        for i in 1..p {
            if vec[i].abs() > vec[pivot].abs() {
                pivot = i;
            }
        }
        if vec[pivot] < 0.0 {
            vec.neg_mut();
        }
        components.set_column(slot, &vec);

        let value = eig.eigenvalues[src].max(0.0);
        explained_variance_ratio.push(if total > 0.0 { value / total } else { 0.0 });
    }

    Ok(PcaFit {
        components,
        explained_variance_ratio,
    })
}
