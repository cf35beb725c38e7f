use super::*;
use crate::model::FrozenWeight;
use crate::quant::QuantizationConfig;
use approx::assert_abs_diff_eq;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-1.0f32..1.0))
}

fn dense(w: Array2<f32>) -> FrozenWeight {
    FrozenWeight::Dense(w)
}

fn layer_with_nonzero_b(d_out: usize, d_in: usize, rank: usize, dropout: f32) -> LoraLinear {
    let mut rng = StdRng::seed_from_u64(7);
    let base = dense(random_matrix(d_out, d_in, &mut rng));
    let mut layer = LoraLinear::new(base, rank, 2.0 * rank as f32, dropout, &mut rng).unwrap();
    *layer.lora_b_mut() = random_matrix(d_out, rank, &mut rng);
    layer
}

/// L = Σ Z ⊙ G
fn probe_loss(layer: &LoraLinear, x: ArrayView2<'_, f32>, mask: Option<Array2<f32>>, g: &Array2<f32>) -> f32 {
    let (z, _) = layer.forward_train(x, mask);
    (&z * g).sum()
}

#[test]
fn test_zero_b_matches_base() {
    let mut rng = StdRng::seed_from_u64(1);
    let w = random_matrix(5, 4, &mut rng);
    let layer = LoraLinear::new(dense(w.clone()), 2, 4.0, 0.0, &mut rng).unwrap();
    let x = random_matrix(3, 4, &mut rng);
    let expected = x.dot(&w.t());
    for (a, b) in layer.forward(x.view()).iter().zip(expected.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-6);
    }
    assert!(layer.lora_b().iter().all(|&v| v == 0.0));
}

#[test]
fn test_init_bounds_and_shapes() {
    let mut rng = StdRng::seed_from_u64(3);
    let layer = LoraLinear::new(dense(Array2::zeros((6, 16))), 4, 8.0, 0.05, &mut rng).unwrap();
    assert_eq!(layer.lora_a().dim(), (4, 16));
    assert_eq!(layer.lora_b().dim(), (6, 4));
    assert_eq!(layer.rank(), 4);
    assert_eq!(layer.scale(), 2.0);
    assert_eq!(layer.num_parameters(), 4 * 16 + 6 * 4);
    let bound = 1.0 / 4.0;
    assert!(layer.lora_a().iter().all(|v| v.abs() <= bound));
    assert!(layer.lora_a().iter().any(|&v| v != 0.0));
}

#[test]
fn test_rejects_bad_hyperparameters() {
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        LoraLinear::new(dense(Array2::zeros((2, 2))), 0, 1.0, 0.0, &mut rng),
        Err(crate::lora::LoraError::InvalidRank(0))
    ));
    assert!(LoraLinear::new(dense(Array2::zeros((2, 2))), 1, 1.0, 1.0, &mut rng).is_err());
}

#[test]
fn test_gradients_match_finite_differences() {
    let layer = layer_with_nonzero_b(3, 4, 2, 0.0);
    let mut rng = StdRng::seed_from_u64(11);
    let x = random_matrix(2, 4, &mut rng);
    let g = random_matrix(2, 3, &mut rng);

    let (_, cache) = layer.forward_train(x.view(), None);
    let (grads, g_x) = layer.backward(g.view(), &cache);

    let h = 1e-2f32;
    for idx in [(0, 0), (1, 3), (0, 2)] {
        let mut plus = layer.clone();
        plus.lora_a_mut()[idx] += h;
        let mut minus = layer.clone();
        minus.lora_a_mut()[idx] -= h;
        let numeric = (probe_loss(&plus, x.view(), None, &g) - probe_loss(&minus, x.view(), None, &g)) / (2.0 * h);
        assert_abs_diff_eq!(grads.lora_a[idx], numeric, epsilon = 1e-2);
    }
    for idx in [(0, 0), (2, 1)] {
        let mut plus = layer.clone();
        plus.lora_b_mut()[idx] += h;
        let mut minus = layer.clone();
        minus.lora_b_mut()[idx] -= h;
        let numeric = (probe_loss(&plus, x.view(), None, &g) - probe_loss(&minus, x.view(), None, &g)) / (2.0 * h);
        assert_abs_diff_eq!(grads.lora_b[idx], numeric, epsilon = 1e-2);
    }
    for idx in [(0, 1), (1, 2)] {
        let mut xp = x.clone();
        xp[idx] += h;
        let mut xm = x.clone();
        xm[idx] -= h;
        let numeric = (probe_loss(&layer, xp.view(), None, &g) - probe_loss(&layer, xm.view(), None, &g)) / (2.0 * h);
        assert_abs_diff_eq!(g_x[idx], numeric, epsilon = 1e-2);
    }
}

#[test]
fn test_dropout_mask_gates_adapter_gradients() {
    let layer = layer_with_nonzero_b(3, 4, 2, 0.5);
    let mut rng = StdRng::seed_from_u64(5);
    let x = random_matrix(1, 4, &mut rng);
    let g = random_matrix(1, 3, &mut rng);
    let mask = ndarray::array![[2.0f32, 0.0, 2.0, 0.0]];

    let (_, cache) = layer.forward_train(x.view(), Some(mask));
    let (grads, _) = layer.backward(g.view(), &cache);
    // Dropped input columns contribute nothing to dA
    for r in 0..2 {
        assert_eq!(grads.lora_a[(r, 1)], 0.0);
        assert_eq!(grads.lora_a[(r, 3)], 0.0);
    }
}

#[test]
fn test_sample_mask_is_inverted_dropout() {
    let layer = layer_with_nonzero_b(2, 64, 2, 0.25);
    let mut rng = StdRng::seed_from_u64(9);
    let mask = layer.sample_mask(8, &mut rng).unwrap();
    assert_eq!(mask.dim(), (8, 64));
    assert!(mask.iter().all(|&m| m == 0.0 || (m - 1.0 / 0.75).abs() < 1e-6));
    assert!(layer_with_nonzero_b(2, 4, 2, 0.0).sample_mask(3, &mut rng).is_none());
}

#[test]
fn test_parameter_roundtrip_order() {
    let mut layer = layer_with_nonzero_b(3, 2, 2, 0.0);
    let mut flat = Vec::new();
    layer.write_parameters(&mut flat);
    assert_eq!(flat.len(), layer.num_parameters());
    assert_eq!(flat[0], layer.lora_a()[(0, 0)]);
    assert_eq!(flat[4], layer.lora_b()[(0, 0)]);

    let ones = vec![1.0f32; flat.len() + 3];
    assert_eq!(layer.read_parameters(&ones).unwrap(), flat.len());
    assert!(layer.lora_a().iter().chain(layer.lora_b().iter()).all(|&v| v == 1.0));
    assert!(layer.read_parameters(&ones[..2]).is_err());
}

#[test]
fn test_merged_weight_over_quantized_base() {
    let mut rng = StdRng::seed_from_u64(2);
    let w = random_matrix(4, 8, &mut rng);
    let base = FrozenWeight::from_dense(w, &QuantizationConfig::four_bit());
    let mut layer = LoraLinear::new(base, 2, 4.0, 0.0, &mut rng).unwrap();
    *layer.lora_b_mut() = random_matrix(4, 2, &mut rng);

    let x = random_matrix(3, 8, &mut rng);
    let via_merge = x.dot(&layer.merged_weight().t());
    let via_forward = layer.forward(x.view());
    for (a, b) in via_merge.iter().zip(via_forward.iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-4);
    }
    assert!(layer.base().is_quantized());
}
