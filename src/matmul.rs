//! Row-block affine kernel used for batched inference.
//!
//! Computes `out = X · Wᵀ + b` for a block of rows, where `X` is `(rows, in_dim)`
//! and `W` is the layer's row-major `(out_dim, in_dim)` weight matrix. The default
//! backend is a plain loop; the `matrixmultiply` feature swaps in a strided SGEMM.

/// Shape contract:
/// - `x.len() == rows * in_dim`
/// - `weights.len() == out_dim * in_dim`
/// - `biases.len() == out_dim`
/// - `out.len() == rows * out_dim`
#[inline]
pub(crate) fn affine_rows(
    x: &[f32],
    rows: usize,
    in_dim: usize,
    weights: &[f32],
    biases: &[f32],
    out: &mut [f32],
) {
    let out_dim = biases.len();
    debug_assert_eq!(x.len(), rows * in_dim);
    debug_assert_eq!(weights.len(), out_dim * in_dim);
    debug_assert_eq!(out.len(), rows * out_dim);

    if rows == 0 {
        return;
    }

    // Seed every output row with the bias so the product can accumulate onto it.
    for row in out.chunks_exact_mut(out_dim) {
        row.copy_from_slice(biases);
    }

    #[cfg(feature = "matrixmultiply")]
    {
        // Wᵀ is read through strides: element (p, j) of Wᵀ is weights[j * in_dim + p].
        unsafe {
            matrixmultiply::sgemm(
                rows,
                in_dim,
                out_dim,
                1.0,
                x.as_ptr(),
                in_dim as isize,
                1,
                weights.as_ptr(),
                1,
                in_dim as isize,
                1.0,
                out.as_mut_ptr(),
                out_dim as isize,
                1,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for (x_row, out_row) in x.chunks_exact(in_dim).zip(out.chunks_exact_mut(out_dim)) {
        for (o, acc) in out_row.iter_mut().enumerate() {
            let w_row = &weights[o * in_dim..(o + 1) * in_dim];
            let mut sum = *acc;
            for (&w, &xi) in w_row.iter().zip(x_row) {
                sum = w.mul_add(xi, sum);
            }
            *acc = sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_naive_affine() {
        // W = [[1, 2], [3, 4], [5, 6]], b = [0.5, -1, 0]
        let weights = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let biases = [0.5_f32, -1.0, 0.0];
        let x = [1.0_f32, 1.0, 2.0, -1.0];
        let mut out = [0.0_f32; 6];

        affine_rows(&x, 2, 2, &weights, &biases, &mut out);
        assert_eq!(out, [3.5, 6.0, 11.0, 0.5, 1.0, 4.0]);
    }
}
