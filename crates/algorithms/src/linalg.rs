//! Dense linear algebra for the small systems of geostatistics
//!
//! Observation counts are tens to a few hundred. Callers work in `ndarray`;
//! the symmetric and least-squares factorizations delegate to nalgebra:
//! - [`LuDecomposition`]: Gaussian elimination with partial pivoting, used for
//!   the (indefinite) augmented kriging system and small normal equations
//! - [`Cholesky`]: LLᵀ factorization of covariance matrices for the likelihood
//! - [`QrDecomposition`]: QR with an explicit rank check for trend designs

use geostat_core::{Error, Result};
use nalgebra::{DMatrix, DVector, Dyn};
use ndarray::Array2;

/// Pivot that fell below the singularity threshold during LU factorization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SingularMatrix {
    /// Elimination step at which the pivot failed
    pub index: usize,
    /// Magnitude of the failing pivot
    pub pivot: f64,
}

/// LU factorization PA = LU with partial pivoting.
#[derive(Debug, Clone)]
pub struct LuDecomposition {
    lu: Array2<f64>,
    perm: Vec<usize>,
}

impl LuDecomposition {
    /// Factor a square matrix.
    ///
    /// A pivot with magnitude ≤ `rel_tol · max|aᵢⱼ|` marks the matrix as
    /// singular.
    pub fn factor(a: &Array2<f64>, rel_tol: f64) -> std::result::Result<Self, SingularMatrix> {
        let n = a.nrows();
        debug_assert_eq!(n, a.ncols());
        let mut lu = a.clone();
        let mut perm: Vec<usize> = (0..n).collect();

        let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let threshold = rel_tol * scale;

        for col in 0..n {
            let mut max_val = lu[(col, col)].abs();
            let mut max_row = col;
            for row in (col + 1)..n {
                let val = lu[(row, col)].abs();
                if val > max_val {
                    max_val = val;
                    max_row = row;
                }
            }

            if !(max_val > threshold) {
                return Err(SingularMatrix { index: col, pivot: max_val });
            }

            if max_row != col {
                for j in 0..n {
                    lu.swap((col, j), (max_row, j));
                }
                perm.swap(col, max_row);
            }

            let pivot = lu[(col, col)];
            for row in (col + 1)..n {
                let factor = lu[(row, col)] / pivot;
                lu[(row, col)] = factor;
                if factor != 0.0 {
                    for j in (col + 1)..n {
                        lu[(row, j)] -= factor * lu[(col, j)];
                    }
                }
            }
        }

        Ok(Self { lu, perm })
    }

    pub fn dim(&self) -> usize {
        self.perm.len()
    }

    /// Solve Ax = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        let n = self.dim();
        debug_assert_eq!(b.len(), n);
        // Forward substitution on the permuted right-hand side (unit L)
        let mut x: Vec<f64> = self.perm.iter().map(|&p| b[p]).collect();
        for i in 0..n {
            let mut sum = x[i];
            for j in 0..i {
                sum -= self.lu[(i, j)] * x[j];
            }
            x[i] = sum;
        }
        // Back substitution
        for i in (0..n).rev() {
            let mut sum = x[i];
            for j in (i + 1)..n {
                sum -= self.lu[(i, j)] * x[j];
            }
            x[i] = sum / self.lu[(i, i)];
        }
        x
    }

    /// A⁻¹, one column at a time.
    pub fn inverse(&self) -> Array2<f64> {
        let n = self.dim();
        let mut inv = Array2::zeros((n, n));
        let mut e = vec![0.0; n];
        for j in 0..n {
            e.iter_mut().for_each(|v| *v = 0.0);
            e[j] = 1.0;
            let col = self.solve(&e);
            for (i, v) in col.into_iter().enumerate() {
                inv[(i, j)] = v;
            }
        }
        inv
    }
}

/// Solve a small dense system in one call.
pub fn solve_dense(a: &Array2<f64>, b: &[f64], rel_tol: f64) -> std::result::Result<Vec<f64>, SingularMatrix> {
    LuDecomposition::factor(a, rel_tol).map(|lu| lu.solve(b))
}

fn to_dmatrix(a: &Array2<f64>) -> DMatrix<f64> {
    DMatrix::from_fn(a.nrows(), a.ncols(), |i, j| a[(i, j)])
}

fn to_array2(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(m.shape(), |(i, j)| m[(i, j)])
}

/// Cholesky factorization A = LLᵀ of a symmetric positive definite matrix.
#[derive(Debug, Clone)]
pub struct Cholesky {
    chol: nalgebra::linalg::Cholesky<f64, Dyn>,
}

impl Cholesky {
    /// Factor `a`; only the lower triangle is read.
    ///
    /// # Errors
    /// [`Error::NonPositiveDefinite`] when the factorization breaks down, or
    /// when a squared pivot Lᵢᵢ² is not finite or falls below `1e-13` of the
    /// largest diagonal entry. The pivot is NaN when the breakdown happened
    /// inside nalgebra.
    pub fn factor(a: &Array2<f64>) -> Result<Self> {
        let n = a.nrows();
        debug_assert_eq!(n, a.ncols());
        let max_diag = (0..n).fold(0.0_f64, |m, i| m.max(a[(i, i)].abs()));
        let threshold = 1e-13 * max_diag;

        let chol = to_dmatrix(a)
            .cholesky()
            .ok_or(Error::NonPositiveDefinite { pivot: f64::NAN })?;
        if let Some(pivot) = chol
            .l_dirty()
            .diagonal()
            .iter()
            .map(|l| l * l)
            .find(|d| !(d.is_finite() && *d > threshold))
        {
            return Err(Error::NonPositiveDefinite { pivot });
        }
        Ok(Self { chol })
    }

    /// Solve Lz = b.
    pub fn solve_lower(&self, b: &[f64]) -> Vec<f64> {
        let mut z = DVector::from_column_slice(b);
        self.chol.l_dirty().solve_lower_triangular_unchecked_mut(&mut z);
        z.as_slice().to_vec()
    }

    /// Solve Ax = b.
    pub fn solve(&self, b: &[f64]) -> Vec<f64> {
        self.chol.solve(&DVector::from_column_slice(b)).as_slice().to_vec()
    }

    /// L⁻¹X
    pub fn whiten(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut m = to_dmatrix(x);
        self.chol.l_dirty().solve_lower_triangular_unchecked_mut(&mut m);
        to_array2(&m)
    }

    /// log|A| = 2 Σ log Lᵢᵢ
    pub fn log_det(&self) -> f64 {
        2.0 * self.chol.l_dirty().diagonal().iter().map(|v| v.ln()).sum::<f64>()
    }
}

/// QR factorization of a design matrix with a rank check against the
/// original column norms.
#[derive(Debug, Clone)]
pub struct QrDecomposition {
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    column_norms: Vec<f64>,
}

impl QrDecomposition {
    pub fn factor(x: &Array2<f64>) -> Self {
        let m = to_dmatrix(x);
        let column_norms = m.column_iter().map(|c| c.norm()).collect();
        let qr = m.qr();
        Self {
            q: qr.q(),
            r: qr.r(),
            column_norms,
        }
    }

    /// First column whose R diagonal is negligible relative to the original
    /// column norm, i.e. a column (numerically) spanned by its predecessors.
    /// With fewer rows than columns the first column past the row count is
    /// reported.
    pub fn dependent_column(&self, tol: f64) -> Option<usize> {
        let rows = self.q.nrows();
        let p = self.column_norms.len();
        if rows < p {
            return Some(rows);
        }
        (0..p).find(|&k| {
            let norm = self.column_norms[k];
            norm == 0.0 || self.r[(k, k)].abs() <= tol * norm
        })
    }

    fn singular(&self) -> Error {
        let column = self.dependent_column(0.0).unwrap_or(self.column_norms.len());
        Error::SingularDesign {
            column: format!("#{column}"),
            reason: "triangular factor is singular".into(),
        }
    }

    /// Least-squares solution of Xβ ≈ y.
    ///
    /// # Errors
    /// [`Error::SingularDesign`] when R is not square or has a zero diagonal.
    pub fn solve_least_squares(&self, y: &[f64]) -> Result<Vec<f64>> {
        if !self.r.is_square() {
            return Err(self.singular());
        }
        let qty = self.q.tr_mul(&DVector::from_column_slice(y));
        self.r
            .solve_upper_triangular(&qty)
            .map(|beta| beta.as_slice().to_vec())
            .ok_or_else(|| self.singular())
    }

    /// (XᵀX)⁻¹ = R⁻¹R⁻ᵀ
    pub fn xtx_inverse(&self) -> Result<Array2<f64>> {
        if !self.r.is_square() {
            return Err(self.singular());
        }
        let rinv = self.r.clone().try_inverse().ok_or_else(|| self.singular())?;
        Ok(to_array2(&(&rinv * rinv.transpose())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    #[test]
    fn test_lu_solve_basic() {
        // Simple 2×2 system
        let a = array![[2.0, 1.0], [1.0, 3.0]];
        let x = solve_dense(&a, &[5.0, 7.0], 1e-14).unwrap();
        assert!((x[0] - 1.6).abs() < 1e-10, "x[0] = {}", x[0]);
        assert!((x[1] - 1.8).abs() < 1e-10, "x[1] = {}", x[1]);
    }

    #[test]
    fn test_lu_needs_pivoting() {
        // Zero in the leading position, like the kriging Lagrange block
        let a = array![[0.0, 1.0, 1.0], [1.0, 0.0, 2.0], [1.0, 2.0, 0.0]];
        let b = [2.0, 3.0, 3.0];
        let x = solve_dense(&a, &b, 1e-14).unwrap();
        let ax = a.dot(&Array1::from(x));
        for (lhs, rhs) in ax.iter().zip(b) {
            assert!((lhs - rhs).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lu_detects_duplicate_rows() {
        let a = array![[1.0, 2.0, 1.0], [1.0, 2.0, 1.0], [1.0, 1.0, 0.0]];
        assert!(LuDecomposition::factor(&a, 1e-12).is_err());
    }

    #[test]
    fn test_lu_inverse() {
        let a = array![[4.0, 1.0], [2.0, 3.0]];
        let inv = LuDecomposition::factor(&a, 1e-14).unwrap().inverse();
        let id = a.dot(&inv);
        assert!((id[(0, 0)] - 1.0).abs() < 1e-12);
        assert!(id[(0, 1)].abs() < 1e-12);
        assert!(id[(1, 0)].abs() < 1e-12);
        assert!((id[(1, 1)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cholesky_solve_and_logdet() {
        let a = array![[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let chol = Cholesky::factor(&a).unwrap();
        let b = [1.0, 2.0, 3.0];
        let x = chol.solve(&b);
        let ax = a.dot(&Array1::from(x));
        for (lhs, rhs) in ax.iter().zip(b) {
            assert!((lhs - rhs).abs() < 1e-12);
        }
        let det = LuDecomposition::factor(&a, 1e-14)
            .map(|lu| {
                // det = prod(diag(U)) up to permutation sign; a is SPD so det > 0
                (0..3).map(|i| lu.lu[(i, i)]).product::<f64>().abs()
            })
            .unwrap();
        assert!((chol.log_det() - det.ln()).abs() < 1e-10);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(Cholesky::factor(&a), Err(Error::NonPositiveDefinite { .. })));
    }

    #[test]
    fn test_qr_least_squares_exact_line() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]];
        let y = [1.0, 3.0, 5.0, 7.0];
        let qr = QrDecomposition::factor(&x);
        assert_eq!(qr.dependent_column(1e-10), None);
        let beta = qr.solve_least_squares(&y).unwrap();
        assert!((beta[0] - 1.0).abs() < 1e-12);
        assert!((beta[1] - 2.0).abs() < 1e-12);

        let xtx_inv = qr.xtx_inverse().unwrap();
        let xtx = x.t().dot(&x);
        let id = xtx.dot(&xtx_inv);
        assert!((id[(0, 0)] - 1.0).abs() < 1e-10 && id[(0, 1)].abs() < 1e-10);
    }

    #[test]
    fn test_qr_detects_collinear_column() {
        let x = array![[1.0, 1.0, 2.0], [1.0, 2.0, 4.0], [1.0, 3.0, 6.0], [1.0, 4.0, 8.0]];
        assert_eq!(QrDecomposition::factor(&x).dependent_column(1e-10), Some(2));
    }

    #[test]
    fn test_qr_wide_design() {
        let x = array![[1.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let qr = QrDecomposition::factor(&x);
        assert_eq!(qr.dependent_column(1e-10), Some(2));
        assert!(matches!(qr.solve_least_squares(&[1.0, 2.0]), Err(Error::SingularDesign { .. })));
    }

    #[test]
    fn test_whiten_matches_triangular_solve() {
        let a = array![[4.0, 2.0, 0.4], [2.0, 5.0, 1.0], [0.4, 1.0, 3.0]];
        let chol = Cholesky::factor(&a).unwrap();
        let x = array![[1.0, 0.5], [1.0, -1.0], [1.0, 2.0]];
        let xw = chol.whiten(&x);
        for j in 0..2 {
            let col = chol.solve_lower(&x.column(j).to_vec());
            for i in 0..3 {
                assert!((xw[(i, j)] - col[i]).abs() < 1e-14);
            }
        }
    }
}
