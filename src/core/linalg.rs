//! Dense linear algebra for small least-squares problems
//!
//! Singular value decomposition by one-sided Jacobi rotations (Hestenes).
//! Design matrices here are tall and narrow (samples x predictors), where the
//! method is accurate to working precision and handles rank deficiency
//! without special cases.

use ndarray::{Array1, Array2, Axis};

const MAX_SWEEPS: usize = 100;

/// Thin SVD `A = U diag(s) V^T` of an m x n matrix
#[derive(Debug, Clone)]
pub struct Svd {
    /// m x n, columns with non-zero singular value are orthonormal
    pub u: Array2<f64>,
    /// n singular values, not sorted
    pub singular_values: Array1<f64>,
    /// n x n orthogonal
    pub v: Array2<f64>,
}

/// Decompose `a` by one-sided Jacobi rotations
pub fn svd(a: &Array2<f64>) -> Svd {
    let (m, n) = a.dim();
    let mut u = a.clone();
    let mut v = Array2::<f64>::eye(n);

    for sweep in 0..MAX_SWEEPS {
        let mut rotated = false;

        for i in 0..n {
            for j in (i + 1)..n {
                let mut alpha = 0.0;
                let mut beta = 0.0;
                let mut gamma = 0.0;
                for k in 0..m {
                    let ui = u[[k, i]];
                    let uj = u[[k, j]];
                    alpha += ui * ui;
                    beta += uj * uj;
                    gamma += ui * uj;
                }

                if gamma == 0.0 || gamma.abs() <= f64::EPSILON * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let sign = if zeta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;

                for k in 0..m {
                    let ui = u[[k, i]];
                    let uj = u[[k, j]];
                    u[[k, i]] = c * ui - s * uj;
                    u[[k, j]] = s * ui + c * uj;
                }
                for k in 0..n {
                    let vi = v[[k, i]];
                    let vj = v[[k, j]];
                    v[[k, i]] = c * vi - s * vj;
                    v[[k, j]] = s * vi + c * vj;
                }
            }
        }

        if !rotated {
            log::debug!("Jacobi SVD converged after {} sweeps", sweep + 1);
            break;
        }
    }

    let singular_values: Array1<f64> = u
        .axis_iter(Axis(1))
        .map(|column| column.dot(&column).sqrt())
        .collect();

    for (j, &sigma) in singular_values.iter().enumerate() {
        if sigma > 0.0 {
            u.column_mut(j).mapv_inplace(|x| x / sigma);
        }
    }

    Svd {
        u,
        singular_values,
        v,
    }
}

impl Svd {
    /// Cutoff below which a singular value counts as zero: `s_max * max(m, n) * eps`
    pub fn default_tolerance(&self) -> f64 {
        let (m, n) = self.u.dim();
        let s_max = self.singular_values.iter().cloned().fold(0.0, f64::max);
        s_max * m.max(n) as f64 * f64::EPSILON
    }

    /// Number of singular values above `tolerance`
    pub fn rank(&self, tolerance: f64) -> usize {
        self.singular_values.iter().filter(|&&s| s > tolerance).count()
    }

    /// Moore-Penrose pseudo-inverse (n x m)
    pub fn pseudo_inverse(&self, tolerance: f64) -> Array2<f64> {
        let (m, n) = self.u.dim();
        let mut pinv = Array2::<f64>::zeros((n, m));
        for (k, &sigma) in self.singular_values.iter().enumerate() {
            if sigma <= tolerance {
                continue;
            }
            for row in 0..n {
                let weight = self.v[[row, k]] / sigma;
                if weight == 0.0 {
                    continue;
                }
                for col in 0..m {
                    pinv[[row, col]] += weight * self.u[[col, k]];
                }
            }
        }
        pinv
    }

    /// Pseudo-inverse of the Gram matrix `(A^T A)^+` (n x n)
    pub fn inverse_gram(&self, tolerance: f64) -> Array2<f64> {
        let n = self.v.nrows();
        let mut gram = Array2::<f64>::zeros((n, n));
        for (k, &sigma) in self.singular_values.iter().enumerate() {
            if sigma <= tolerance {
                continue;
            }
            let scale = 1.0 / (sigma * sigma);
            for i in 0..n {
                for j in 0..n {
                    gram[[i, j]] += scale * self.v[[i, k]] * self.v[[j, k]];
                }
            }
        }
        gram
    }
}
