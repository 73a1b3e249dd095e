//! Conjugate gradient for `A x = b` with `A` available only as `v ↦ A·v`
//!
//! The solver never sees a matrix. Anything implementing [`LinearOperator`]
//! can be plugged in: the Fisher-vector product during an update, or a small
//! [`DenseOperator`] in tests.

use tracing::debug;

use super::vector::{all_finite, axpy, dot, norm};

/// A symmetric positive-definite operator known only through products
pub trait LinearOperator {
    fn apply(&mut self, v: &[f32]) -> Vec<f32>;
}

impl<F> LinearOperator for F
where
    F: FnMut(&[f32]) -> Vec<f32>,
{
    fn apply(&mut self, v: &[f32]) -> Vec<f32> {
        self(v)
    }
}

/// Explicit row-major square matrix
#[derive(Clone, Debug)]
pub struct DenseOperator {
    dim: usize,
    data: Vec<f32>,
}

impl DenseOperator {
    /// # Panics
    /// If the rows are not all of length `rows.len()`.
    pub fn from_rows(rows: &[Vec<f32>]) -> Self {
        let dim = rows.len();
        let mut data = Vec::with_capacity(dim * dim);
        for row in rows {
            assert_eq!(row.len(), dim, "matrix must be square");
            data.extend_from_slice(row);
        }
        Self { dim, data }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl LinearOperator for DenseOperator {
    fn apply(&mut self, v: &[f32]) -> Vec<f32> {
        self.data.chunks(self.dim).map(|row| dot(row, v)).collect()
    }
}

/// Result of [`conjugate_gradient`]
#[derive(Clone, Debug)]
pub struct CgSolution {
    /// Approximate solution, the last finite iterate
    pub x: Vec<f32>,
    /// Iterations actually performed
    pub iterations: usize,
    /// `‖r‖` before the first iteration and after each one
    pub residual_norms: Vec<f32>,
    /// `r·r` dropped below the tolerance
    pub converged: bool,
    /// Stopped on non-positive curvature or a non-finite value
    pub breakdown: bool,
    /// The breakdown was caused by a NaN or infinity
    pub non_finite: bool,
}

impl CgSolution {
    pub fn final_residual(&self) -> f32 {
        self.residual_norms.last().copied().unwrap_or(0.0)
    }

    /// Whether `x` can be used as a search direction
    ///
    /// A solve that hit a non-finite value is unusable even when an earlier
    /// iterate survived.
    pub fn is_usable(&self) -> bool {
        !self.non_finite && all_finite(&self.x) && norm(&self.x) > 0.0
    }
}

/// Standard linear conjugate gradient starting from `x = 0`
///
/// Runs at most `iterations` steps, stopping early once `r·r < residual_tol`.
/// Never fails: on breakdown the last finite iterate is returned with
/// [`CgSolution::breakdown`] set.
pub fn conjugate_gradient<Op: LinearOperator + ?Sized>(
    op: &mut Op,
    b: &[f32],
    iterations: usize,
    residual_tol: f32,
) -> CgSolution {
    let mut x = vec![0.0; b.len()];
    let mut r = b.to_vec();
    let mut p = b.to_vec();
    let mut rdotr = dot(&r, &r);

    let mut solution = CgSolution {
        x: Vec::new(),
        iterations: 0,
        residual_norms: vec![rdotr.sqrt()],
        converged: false,
        breakdown: !rdotr.is_finite(),
        non_finite: !rdotr.is_finite(),
    };

    if solution.breakdown || rdotr < residual_tol {
        solution.converged = !solution.breakdown;
        solution.x = x;
        return solution;
    }

    for i in 0..iterations {
        let fp = op.apply(&p);
        let curvature = dot(&p, &fp);
        let finite = curvature.is_finite() && all_finite(&fp);
        if !finite || curvature <= 0.0 {
            debug!(iteration = i, curvature, "conjugate gradient breakdown");
            solution.breakdown = true;
            solution.non_finite = !finite;
            break;
        }

        let alpha = rdotr / curvature;
        axpy(alpha, &p, &mut x);
        axpy(-alpha, &fp, &mut r);
        let new_rdotr = dot(&r, &r);

        solution.iterations = i + 1;
        solution.residual_norms.push(new_rdotr.sqrt());

        if !new_rdotr.is_finite() || !all_finite(&x) {
            // Undo the step that produced non-finite values
            axpy(-alpha, &p, &mut x);
            solution.breakdown = true;
            solution.non_finite = true;
            break;
        }
        if new_rdotr < residual_tol {
            solution.converged = true;
            break;
        }

        let beta = new_rdotr / rdotr;
        for (pi, ri) in p.iter_mut().zip(&r) {
            *pi = ri + beta * *pi;
        }
        rdotr = new_rdotr;
    }

    debug!(
        iterations = solution.iterations,
        residual = solution.final_residual(),
        converged = solution.converged,
        "conjugate gradient finished"
    );
    solution.x = x;
    solution
}
