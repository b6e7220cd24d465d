//! Host (CPU) implementations of the library's tensor kernels.

use nabla_core::Element;

use crate::descriptor::TensorLayout;

/// `c = alpha * a + beta * c` over two layouts with equal extents.
///
/// With `beta == 0` the previous content of `c` is never read, so stale
/// NaNs in an output buffer do not leak into the result.
pub fn add_tensor<T: Element>(
    alpha: T,
    a_layout: &TensorLayout,
    a: &[T],
    beta: T,
    c_layout: &TensorLayout,
    c: &mut [T],
) {
    let overwrite = beta == T::zero();
    let numel = c_layout.numel();

    if a_layout.is_contiguous() && c_layout.is_contiguous() {
        let (a, c) = (&a[..numel], &mut c[..numel]);
        if overwrite {
            for (ci, &ai) in c.iter_mut().zip(a) {
                *ci = alpha * ai;
            }
        } else {
            for (ci, &ai) in c.iter_mut().zip(a) {
                *ci = alpha * ai + beta * *ci;
            }
        }
        return;
    }

    for i in 0..numel {
        let ai = a[a_layout.offset_of(i)];
        let ci = &mut c[c_layout.offset_of(i)];
        *ci = if overwrite {
            alpha * ai
        } else {
            alpha * ai + beta * *ci
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nabla_core::DType;
    use smallvec::SmallVec;

    fn layout(dims: &[usize], strides: &[usize]) -> TensorLayout {
        TensorLayout {
            dtype: DType::F32,
            dims: SmallVec::from_slice(dims),
            strides: SmallVec::from_slice(strides),
        }
    }

    #[test]
    fn test_contiguous_add() {
        let l = layout(&[4], &[1]);
        let a = [1.0f32, -2.0, 0.5, 0.0];
        let mut c = [10.0f32, 10.0, 10.0, 10.0];
        add_tensor(1.0, &l, &a, 1.0, &l, &mut c);
        assert_eq!(c, [11.0, 8.0, 10.5, 10.0]);
    }

    #[test]
    fn test_beta_zero_ignores_output() {
        let l = layout(&[3], &[1]);
        let a = [1.0f32, 2.0, 3.0];
        let mut c = [f32::NAN; 3];
        add_tensor(2.0, &l, &a, 0.0, &l, &mut c);
        assert_eq!(c, [2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_strided_input() {
        // a is the transpose of a 3x2 row-major buffer
        let a_layout = layout(&[2, 3], &[1, 2]);
        let c_layout = layout(&[2, 3], &[3, 1]);
        let a = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0];
        let mut c = [0.0f64; 6];
        add_tensor(1.0, &a_layout, &a, 0.0, &c_layout, &mut c);
        assert_eq!(c, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_strided_matches_contiguous() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let (rows, cols) = (5, 7);
        let a: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-4.0..4.0)).collect();
        let c0: Vec<f32> = (0..rows * cols).map(|_| rng.gen_range(-4.0..4.0)).collect();

        // a_t[j][i] = a[i][j], stored column-major
        let mut a_t = vec![0.0f32; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                a_t[j * rows + i] = a[i * cols + j];
            }
        }

        let dense = layout(&[rows, cols], &[cols, 1]);
        let strided = layout(&[rows, cols], &[1, rows]);
        let mut expected = c0.clone();
        add_tensor(0.5, &dense, &a, 2.0, &dense, &mut expected);
        let mut got = c0;
        add_tensor(0.5, &strided, &a_t, 2.0, &dense, &mut got);
        assert_eq!(got, expected);
    }
}
