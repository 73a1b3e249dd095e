//! Dense vector helpers for parameter-space algebra
//!
//! Parameter vectors, gradients and search directions are plain `f32`
//! slices. Reductions accumulate in `f64`.

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| *x as f64 * *y as f64).sum::<f64>() as f32
}

pub fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

/// `y ← y + alpha·x`
pub fn axpy(alpha: f32, x: &[f32], y: &mut [f32]) {
    debug_assert_eq!(x.len(), y.len());
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

pub fn scaled(alpha: f32, x: &[f32]) -> Vec<f32> {
    x.iter().map(|v| alpha * v).collect()
}

pub fn all_finite(x: &[f32]) -> bool {
    x.iter().all(|v| v.is_finite())
}

/// `(mean, population std)`, `(0, 0)` for an empty slice
pub fn mean_std(x: &[f32]) -> (f32, f32) {
    if x.is_empty() {
        return (0.0, 0.0);
    }
    let n = x.len() as f64;
    let mean = x.iter().map(|v| *v as f64).sum::<f64>() / n;
    let var = x.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean as f32, var.sqrt() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axpy_accumulates() {
        let mut y = vec![1.0, 1.0];
        axpy(2.0, &[0.5, -1.0], &mut y);
        assert_eq!(y, vec![2.0, -1.0]);
    }

    #[test]
    fn mean_std_population() {
        let (mean, std) = mean_std(&[1.0, 3.0]);
        assert_eq!(mean, 2.0);
        assert_eq!(std, 1.0);
        assert_eq!(norm(&[3.0, 4.0]), 5.0);
    }
}
