//! LoRA (Low-Rank Adaptation) linear layer
//!
//! For a frozen weight matrix W ∈ ℝ^(d_out × d_in), LoRA adds:
//! ΔW = B @ A where A ∈ ℝ^(r × d_in) and B ∈ ℝ^(d_out × r)
//!
//! Inputs are row batches X ∈ ℝ^(T × d_in) (one row per sequence position):
//!
//! Z = X Wᵀ + s · (D(X) Aᵀ) Bᵀ,  s = alpha / r
//!
//! where D is inverted dropout on the adapter input. The base weight may be
//! stored 4-bit; it is dequantized on the fly and never receives gradients.

use ndarray::{Array2, ArrayView2};
use rand::Rng;

use crate::lora::LoraError;
use crate::model::FrozenWeight;

/// LoRA layer: adds trainable low-rank adaptation to a frozen base weight
#[derive(Debug, Clone)]
pub struct LoraLinear {
    /// Frozen base weight [d_out, d_in]
    base: FrozenWeight,
    /// LoRA matrix A [r, d_in] - downprojection
    lora_a: Array2<f32>,
    /// LoRA matrix B [d_out, r] - upprojection
    lora_b: Array2<f32>,
    /// Scaling factor (alpha/rank)
    scale: f32,
    /// Dropout probability on the adapter input
    dropout: f32,
}

/// Activations kept from a training forward pass
#[derive(Debug, Clone)]
pub struct LoraCache {
    /// Adapter input after dropout [T, d_in]
    input: Array2<f32>,
    /// A projection of the adapter input [T, r]
    down: Array2<f32>,
    /// Inverted-dropout multipliers [T, d_in]
    mask: Option<Array2<f32>>,
}

/// Gradients of the adapter matrices
#[derive(Debug, Clone, PartialEq)]
pub struct LoraGrads {
    pub lora_a: Array2<f32>,
    pub lora_b: Array2<f32>,
}

impl LoraLinear {
    /// Wrap a frozen weight
    ///
    /// A is Kaiming-uniform with bound `1/sqrt(d_in)`, B is zero, so the
    /// wrapped layer initially computes exactly the base projection.
    pub fn new<R: Rng + ?Sized>(
        base: FrozenWeight,
        rank: usize,
        alpha: f32,
        dropout: f32,
        rng: &mut R,
    ) -> Result<Self, LoraError> {
        if rank == 0 {
            return Err(LoraError::InvalidRank(rank));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(LoraError::InvalidDropout(dropout));
        }
        let (d_out, d_in) = base.shape();
        let bound = 1.0 / (d_in.max(1) as f32).sqrt();
        let lora_a = Array2::from_shape_fn((rank, d_in), |_| rng.random_range(-bound..=bound));
        let lora_b = Array2::zeros((d_out, rank));
        Ok(Self { base, lora_a, lora_b, scale: alpha / rank as f32, dropout })
    }

    /// Inference forward pass, no dropout
    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut z = self.base.forward(x);
        let delta = x.dot(&self.lora_a.t()).dot(&self.lora_b.t());
        z.scaled_add(self.scale, &delta);
        z
    }

    /// Sample an inverted-dropout mask for `rows` inputs, `None` when disabled
    pub fn sample_mask<R: Rng + ?Sized>(&self, rows: usize, rng: &mut R) -> Option<Array2<f32>> {
        if self.dropout <= 0.0 {
            return None;
        }
        let keep = 1.0 - self.dropout;
        Some(Array2::from_shape_fn((rows, self.d_in()), |_| {
            if rng.random::<f32>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        }))
    }

    /// Training forward pass with an optional dropout mask
    pub fn forward_train(
        &self,
        x: ArrayView2<'_, f32>,
        mask: Option<Array2<f32>>,
    ) -> (Array2<f32>, LoraCache) {
        let mut z = self.base.forward(x);
        let input = match &mask {
            Some(m) => &x * m,
            None => x.to_owned(),
        };
        let down = input.dot(&self.lora_a.t());
        z.scaled_add(self.scale, &down.dot(&self.lora_b.t()));
        (z, LoraCache { input, down, mask })
    }

    /// Backward pass from `g_z = dL/dZ` [T, d_out]
    ///
    /// Returns the adapter gradients and `dL/dX` [T, d_in].
    pub fn backward(&self, g_z: ArrayView2<'_, f32>, cache: &LoraCache) -> (LoraGrads, Array2<f32>) {
        // dB = s · G_zᵀ R
        let grad_b = g_z.t().dot(&cache.down) * self.scale;
        // dR = s · G_z B
        let g_down = g_z.dot(&self.lora_b) * self.scale;
        // dA = dRᵀ U
        let grad_a = g_down.t().dot(&cache.input);

        let mut g_x = self.base.backward_input(g_z);
        let mut through_adapter = g_down.dot(&self.lora_a);
        if let Some(mask) = &cache.mask {
            through_adapter *= mask;
        }
        g_x += &through_adapter;

        (LoraGrads { lora_a: grad_a, lora_b: grad_b }, g_x)
    }

    /// W + s · B A, dequantizing a 4-bit base
    pub fn merged_weight(&self) -> Array2<f32> {
        let mut w = self.base.to_dense().into_owned();
        w.scaled_add(self.scale, &self.lora_b.dot(&self.lora_a));
        w
    }

    /// Number of trainable values
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.lora_a.len() + self.lora_b.len()
    }

    /// Append A then B, row-major
    pub fn write_parameters(&self, out: &mut Vec<f32>) {
        out.extend(self.lora_a.iter());
        out.extend(self.lora_b.iter());
    }

    /// Overwrite A then B from the front of `values`; returns the count used
    pub fn read_parameters(&mut self, values: &[f32]) -> Result<usize, LoraError> {
        let n = self.num_parameters();
        if values.len() < n {
            return Err(LoraError::ParameterLength { expected: n, actual: values.len() });
        }
        let (a, rest) = values.split_at(self.lora_a.len());
        for (dst, src) in self.lora_a.iter_mut().zip(a) {
            *dst = *src;
        }
        for (dst, src) in self.lora_b.iter_mut().zip(rest) {
            *dst = *src;
        }
        Ok(n)
    }

    /// Frozen base weight
    pub fn base(&self) -> &FrozenWeight {
        &self.base
    }

    /// Give back the frozen weight, dropping the adapter
    pub fn into_base(self) -> FrozenWeight {
        self.base
    }

    /// Get reference to LoRA A matrix
    pub fn lora_a(&self) -> &Array2<f32> {
        &self.lora_a
    }

    /// Get mutable reference to LoRA A matrix
    pub fn lora_a_mut(&mut self) -> &mut Array2<f32> {
        &mut self.lora_a
    }

    /// Get reference to LoRA B matrix
    pub fn lora_b(&self) -> &Array2<f32> {
        &self.lora_b
    }

    /// Get mutable reference to LoRA B matrix
    pub fn lora_b_mut(&mut self) -> &mut Array2<f32> {
        &mut self.lora_b
    }

    /// Get rank
    pub fn rank(&self) -> usize {
        self.lora_a.nrows()
    }

    /// Get scale factor
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn dropout(&self) -> f32 {
        self.dropout
    }

    /// Get output dimension
    pub fn d_out(&self) -> usize {
        self.lora_b.nrows()
    }

    /// Get input dimension
    pub fn d_in(&self) -> usize {
        self.lora_a.ncols()
    }
}
