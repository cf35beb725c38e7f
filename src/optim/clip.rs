//! Gradient clipping utilities

use ndarray::Array1;

/// L2 norm of a flat gradient
pub fn grad_norm(grad: &Array1<f32>) -> f32 {
    grad.iter().map(|&g| g * g).sum::<f32>().sqrt()
}

/// Clip a gradient by its global norm
///
/// Scales the gradient down when its norm exceeds `max_norm` and returns
/// the norm before clipping.
pub fn clip_grad_norm(grad: &mut Array1<f32>, max_norm: f32) -> f32 {
    let global_norm = grad_norm(grad);

    // Only clip if global norm exceeds max_norm
    if global_norm > max_norm {
        let clip_coef = max_norm / global_norm;
        *grad *= clip_coef;
    }

    global_norm
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr1;
    use proptest::prelude::*;

    #[test]
    fn test_clip_grad_norm_no_clipping() {
        let mut g = arr1(&[0.1, 0.2, 0.1]);
        // Global norm = sqrt(0.06) ≈ 0.245
        let norm = clip_grad_norm(&mut g, 1.0);
        assert_abs_diff_eq!(norm, 0.245, epsilon = 1e-3);
        assert_eq!(g, arr1(&[0.1, 0.2, 0.1]));
    }

    #[test]
    fn test_clip_grad_norm_with_clipping() {
        let mut g = arr1(&[3.0, 4.0]);
        let norm = clip_grad_norm(&mut g, 1.0);
        assert_abs_diff_eq!(norm, 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(g[1], 0.8, epsilon = 1e-6);
    }

    proptest! {
        #[test]
        fn prop_clipped_norm_bounded(values in proptest::collection::vec(-100.0f32..100.0, 1..64), max in 0.1f32..10.0) {
            let mut g = Array1::from(values);
            clip_grad_norm(&mut g, max);
            prop_assert!(grad_norm(&g) <= max * (1.0 + 1e-4));
        }
    }
}
