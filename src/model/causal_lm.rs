//! Reference causal language model
//!
//! Position `t` starts from the mean of the token embeddings `0..=t`. Every
//! block applies its square projections in order, each as a residual
//! `h += tanh(P h)`, and the LM head maps the final state to logits.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{FrozenWeight, ModelConfig, ModelError};
use crate::lora::{LoraCache, LoraError, LoraLinear};
use crate::quant::QuantizationConfig;
use crate::tokenizer::{TokenId, IGNORE_INDEX};

/// Name of the output projection
pub const LM_HEAD: &str = "lm_head";

/// A linear module of the model, frozen or carrying an adapter
#[derive(Debug, Clone)]
pub enum Projection {
    Frozen(FrozenWeight),
    Lora(LoraLinear),
}

impl Projection {
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Frozen(w) => w.shape(),
            Self::Lora(l) => l.base().shape(),
        }
    }

    pub fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        match self {
            Self::Frozen(w) => w.forward(x),
            Self::Lora(l) => l.forward(x),
        }
    }

    pub fn as_lora(&self) -> Option<&LoraLinear> {
        match self {
            Self::Lora(l) => Some(l),
            Self::Frozen(_) => None,
        }
    }

    #[must_use]
    pub fn is_lora(&self) -> bool {
        matches!(self, Self::Lora(_))
    }

    /// Frozen weight underneath, with or without an adapter
    pub fn base(&self) -> &FrozenWeight {
        match self {
            Self::Frozen(w) => w,
            Self::Lora(l) => l.base(),
        }
    }

    fn num_frozen_parameters(&self) -> usize {
        self.base().num_elements()
    }
}

/// Loss and flat LoRA gradient of one example
#[derive(Debug, Clone)]
pub struct SampleGrad {
    pub loss: f32,
    pub grad: Array1<f32>,
    /// Label tokens the loss was averaged over
    pub tokens: usize,
}

/// Mean next-token loss of one example
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossOutput {
    pub loss: f32,
    pub tokens: usize,
}

/// One projection application recorded during a training forward pass
struct Step {
    /// `tanh(Z)` for block projections, `None` for the head
    activation: Option<Array2<f32>>,
    cache: Option<LoraCache>,
}

/// Reference causal LM with frozen weights and optional LoRA adapters
#[derive(Debug, Clone)]
pub struct CausalLm {
    config: ModelConfig,
    /// Token embeddings [V, H]
    embed_tokens: Array2<f32>,
    /// Projections of every block, in `config.projections` order
    layers: Vec<Vec<Projection>>,
    /// Output projection [V, H]
    lm_head: Projection,
    training: bool,
    dropout_rng: StdRng,
}

impl CausalLm {
    /// Assemble a model from its weights
    pub fn from_parts(
        config: ModelConfig,
        embed_tokens: Array2<f32>,
        layers: Vec<Vec<Projection>>,
        lm_head: Projection,
    ) -> Result<Self, ModelError> {
        let (v, h) = (config.vocab_size, config.hidden_size);
        let check = |name: String, actual: (usize, usize), expected: (usize, usize)| {
            if actual == expected {
                Ok(())
            } else {
                Err(ModelError::ShapeMismatch {
                    name,
                    expected: vec![expected.0, expected.1],
                    actual: vec![actual.0, actual.1],
                })
            }
        };
        check("model.embed_tokens".to_string(), embed_tokens.dim(), (v, h))?;
        check(LM_HEAD.to_string(), lm_head.shape(), (v, h))?;
        if layers.len() != config.num_hidden_layers {
            return Err(ModelError::ShapeMismatch {
                name: "model.layers".to_string(),
                expected: vec![config.num_hidden_layers],
                actual: vec![layers.len()],
            });
        }
        for (i, block) in layers.iter().enumerate() {
            if block.len() != config.projections.len() {
                return Err(ModelError::ShapeMismatch {
                    name: format!("model.layers.{i}"),
                    expected: vec![config.projections.len()],
                    actual: vec![block.len()],
                });
            }
            for (p, proj) in block.iter().enumerate() {
                check(ModelConfig::projection_name(i, &config.projections[p]), proj.shape(), (h, h))?;
            }
        }
        Ok(Self {
            config,
            embed_tokens,
            layers,
            lm_head,
            training: false,
            dropout_rng: StdRng::seed_from_u64(0),
        })
    }

    /// Randomly initialised full-precision model
    pub fn random(config: ModelConfig, seed: u64) -> Result<Self, ModelError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let (v, h) = (config.vocab_size, config.hidden_size);
        let embed_tokens = Array2::from_shape_fn((v, h), |_| rng.random_range(-1.0f32..1.0));
        let bound = 1.0 / (h as f32).sqrt();
        let full = QuantizationConfig::full_precision();
        let mut dense = |rows: usize| {
            let w = Array2::from_shape_fn((rows, h), |_| rng.random_range(-bound..=bound));
            FrozenWeight::from_dense(w, &full)
        };
        let layers = (0..config.num_hidden_layers)
            .map(|_| config.projections.iter().map(|_| Projection::Frozen(dense(h))).collect())
            .collect();
        let lm_head = Projection::Frozen(dense(v));
        Self::from_parts(config, embed_tokens, layers, lm_head)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn embed_tokens(&self) -> &Array2<f32> {
        &self.embed_tokens
    }

    /// Switch to training mode (adapter dropout on)
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Switch to inference mode (adapter dropout off)
    pub fn eval(&mut self) {
        self.training = false;
    }

    #[must_use]
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Reseed the generator used for dropout masks
    pub fn seed_dropout(&mut self, seed: u64) {
        self.dropout_rng = StdRng::seed_from_u64(seed);
    }

    /// Every linear module as `(name, projection)` in forward order
    pub fn modules(&self) -> Vec<(String, &Projection)> {
        let mut out: Vec<(String, &Projection)> = self
            .layers
            .iter()
            .enumerate()
            .flat_map(|(i, block)| {
                block
                    .iter()
                    .zip(&self.config.projections)
                    .map(move |(proj, name)| (ModelConfig::projection_name(i, name), proj))
            })
            .collect();
        out.push((LM_HEAD.to_string(), &self.lm_head));
        out
    }

    /// Names of every linear module, `lm_head` last
    pub fn linear_module_names(&self) -> Vec<String> {
        self.config.linear_module_names()
    }

    /// Linear module by full name
    pub fn module_mut(&mut self, name: &str) -> Option<&mut Projection> {
        if name == LM_HEAD {
            return Some(&mut self.lm_head);
        }
        let rest = name.strip_prefix("model.layers.")?;
        let (layer, proj) = rest.split_once('.')?;
        let layer: usize = layer.parse().ok()?;
        let p = self.config.projections.iter().position(|n| n == proj)?;
        self.layers.get_mut(layer)?.get_mut(p)
    }

    /// Modules carrying an adapter, in forward order
    pub fn lora_modules(&self) -> Vec<(String, &LoraLinear)> {
        self.modules()
            .into_iter()
            .filter_map(|(name, proj)| proj.as_lora().map(|l| (name, l)))
            .collect()
    }

    fn projections(&self) -> impl Iterator<Item = &Projection> {
        self.layers.iter().flatten().chain(std::iter::once(&self.lm_head))
    }

    fn projections_mut(&mut self) -> impl Iterator<Item = &mut Projection> {
        self.layers.iter_mut().flatten().chain(std::iter::once(&mut self.lm_head))
    }

    #[must_use]
    pub fn num_trainable_parameters(&self) -> usize {
        self.projections().filter_map(Projection::as_lora).map(LoraLinear::num_parameters).sum()
    }

    /// Frozen plus trainable parameter count
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.embed_tokens.len()
            + self.projections().map(Projection::num_frozen_parameters).sum::<usize>()
            + self.num_trainable_parameters()
    }

    /// Bytes held by frozen weights
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.embed_tokens.len() * 4
            + self.projections().map(|p| p.base().memory_bytes()).sum::<usize>()
    }

    /// Adapter values, each module's A then B in forward order
    pub fn trainable_parameters(&self) -> Array1<f32> {
        let mut flat = Vec::with_capacity(self.num_trainable_parameters());
        for lora in self.projections().filter_map(Projection::as_lora) {
            lora.write_parameters(&mut flat);
        }
        Array1::from(flat)
    }

    /// Overwrite adapter values laid out as in [`Self::trainable_parameters`]
    pub fn set_trainable_parameters(&mut self, values: &Array1<f32>) -> Result<(), LoraError> {
        let expected = self.num_trainable_parameters();
        if values.len() != expected {
            return Err(LoraError::ParameterLength { expected, actual: values.len() });
        }
        let values = values.to_vec();
        let mut offset = 0;
        for proj in self.projections_mut() {
            if let Projection::Lora(lora) = proj {
                offset += lora.read_parameters(&values[offset..])?;
            }
        }
        Ok(())
    }

    /// Prefix-mean embeddings of a sequence [T, H]
    fn embed(&self, ids: &[TokenId]) -> Result<Array2<f32>, ModelError> {
        let h = self.config.hidden_size;
        let mut x = Array2::zeros((ids.len(), h));
        let mut running = Array1::<f32>::zeros(h);
        for (t, &id) in ids.iter().enumerate() {
            if id as usize >= self.config.vocab_size {
                return Err(ModelError::TokenOutOfRange { id, vocab_size: self.config.vocab_size });
            }
            running += &self.embed_tokens.row(id as usize);
            x.row_mut(t).assign(&(&running / (t + 1) as f32));
        }
        Ok(x)
    }

    /// Logits [T, V] in inference mode
    pub fn forward(&self, ids: &[TokenId]) -> Result<Array2<f32>, ModelError> {
        let mut x = self.embed(ids)?;
        for proj in self.layers.iter().flatten() {
            let a = proj.forward(x.view()).mapv(f32::tanh);
            x += &a;
        }
        Ok(self.lm_head.forward(x.view()))
    }

    /// Mean next-token loss of one padded example, without dropout
    pub fn loss(
        &self,
        ids: &[TokenId],
        attention_mask: &[u8],
        labels: &[i64],
    ) -> Result<LossOutput, ModelError> {
        let (ids, labels) = strip_padding(ids, attention_mask, labels)?;
        if ids.is_empty() {
            return Ok(LossOutput { loss: 0.0, tokens: 0 });
        }
        let logits = self.forward(&ids)?;
        let (loss, tokens, _) = shifted_cross_entropy(logits.view(), &labels, self.config.vocab_size)?;
        Ok(LossOutput { loss, tokens })
    }

    /// Loss and flat adapter gradient of one padded example
    ///
    /// Dropout masks are drawn when the model is in training mode. Gradients
    /// stop at the earliest adapter, so frozen weights never receive any.
    pub fn per_sample_gradient(
        &mut self,
        ids: &[TokenId],
        attention_mask: &[u8],
        labels: &[i64],
    ) -> Result<SampleGrad, ModelError> {
        let n_params = self.num_trainable_parameters();
        let (ids, labels) = strip_padding(ids, attention_mask, labels)?;
        if ids.is_empty() {
            return Ok(SampleGrad { loss: 0.0, grad: Array1::zeros(n_params), tokens: 0 });
        }

        let training = self.training;
        let mut rng = self.dropout_rng.clone();
        let rows = ids.len();
        let mut steps: Vec<Step> = Vec::new();
        let mut x = self.embed(&ids)?;

        for proj in self.layers.iter().flatten() {
            let (z, cache) = train_forward(proj, x.view(), training, rows, &mut rng);
            let a = z.mapv(f32::tanh);
            x += &a;
            steps.push(Step { activation: Some(a), cache });
        }
        let (logits, head_cache) = train_forward(&self.lm_head, x.view(), training, rows, &mut rng);
        steps.push(Step { activation: None, cache: head_cache });
        self.dropout_rng = rng;

        let (loss, tokens, g_logits) =
            shifted_cross_entropy(logits.view(), &labels, self.config.vocab_size)?;

        // Per-module gradients collected in reverse, then laid out forward
        let projections: Vec<&Projection> = self.projections().collect();
        let first_lora = projections.iter().position(|p| p.is_lora());
        let mut module_grads: Vec<Option<Vec<f32>>> = vec![None; projections.len()];

        if let Some(first_lora) = first_lora {
            let mut g_x = g_logits;
            for idx in (first_lora..projections.len()).rev() {
                let step = &steps[idx];
                let g_z = match &step.activation {
                    Some(a) => &g_x * &a.mapv(|v| 1.0 - v * v),
                    None => g_x.clone(),
                };
                let g_in = match (projections[idx], &step.cache) {
                    (Projection::Lora(lora), Some(cache)) => {
                        let (grads, g_in) = lora.backward(g_z.view(), cache);
                        let mut flat = Vec::with_capacity(lora.num_parameters());
                        flat.extend(grads.lora_a.iter());
                        flat.extend(grads.lora_b.iter());
                        module_grads[idx] = Some(flat);
                        g_in
                    }
                    (proj, _) => proj.base().backward_input(g_z.view()),
                };
                g_x = match step.activation {
                    Some(_) => g_x + g_in,
                    None => g_in,
                };
            }
        }

        let mut grad = Vec::with_capacity(n_params);
        for flat in module_grads.into_iter().flatten() {
            grad.extend(flat);
        }
        Ok(SampleGrad { loss, grad: Array1::from(grad), tokens })
    }
}

/// Projection forward keeping what the backward pass needs
fn train_forward(
    proj: &Projection,
    x: ArrayView2<'_, f32>,
    training: bool,
    rows: usize,
    rng: &mut StdRng,
) -> (Array2<f32>, Option<LoraCache>) {
    match proj {
        Projection::Frozen(w) => (w.forward(x), None),
        Projection::Lora(lora) => {
            let mask = if training { lora.sample_mask(rows, rng) } else { None };
            let (z, cache) = lora.forward_train(x, mask);
            (z, Some(cache))
        }
    }
}

/// Drop positions whose attention mask is 0
fn strip_padding(
    ids: &[TokenId],
    attention_mask: &[u8],
    labels: &[i64],
) -> Result<(Vec<TokenId>, Vec<i64>), ModelError> {
    if ids.len() != attention_mask.len() || ids.len() != labels.len() {
        return Err(ModelError::LengthMismatch {
            ids: ids.len(),
            mask: attention_mask.len(),
            labels: labels.len(),
        });
    }
    Ok(ids
        .iter()
        .zip(attention_mask)
        .zip(labels)
        .filter(|((_, &m), _)| m != 0)
        .map(|((&id, _), &label)| (id, label))
        .unzip())
}

/// Mean cross entropy of `logits[t]` against `labels[t + 1]`
///
/// Returns the loss, the number of counted labels and `dL/dlogits`.
fn shifted_cross_entropy(
    logits: ArrayView2<'_, f32>,
    labels: &[i64],
    vocab_size: usize,
) -> Result<(f32, usize, Array2<f32>), ModelError> {
    let rows = logits.nrows();
    let mut targets = Vec::new();
    for t in 0..rows.saturating_sub(1) {
        let label = labels[t + 1];
        if label == IGNORE_INDEX {
            continue;
        }
        if label < 0 || label as usize >= vocab_size {
            return Err(ModelError::TokenOutOfRange { id: label.max(0) as u32, vocab_size });
        }
        targets.push((t, label as usize));
    }

    let mut grad = Array2::zeros(logits.dim());
    if targets.is_empty() {
        return Ok((0.0, 0, grad));
    }
    let count = targets.len() as f32;
    let mut total = 0.0f32;
    for &(t, target) in &targets {
        let row = logits.index_axis(Axis(0), t);
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        let exp = row.mapv(|v| (v - max).exp());
        let sum = exp.sum();
        total += sum.ln() + max - row[target];
        let mut g = grad.slice_mut(s![t, ..]);
        g.assign(&(exp / sum));
        g[target] -= 1.0;
        g /= count;
    }
    Ok((total / count, targets.len(), grad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::LoraConfig;
    use approx::assert_abs_diff_eq;

    fn tiny() -> CausalLm {
        CausalLm::random(ModelConfig::new(12, 6, 2, vec!["q_proj".into(), "v_proj".into()]), 3).unwrap()
    }

    fn with_adapters(targets: &[&str], dropout: f32) -> CausalLm {
        let mut model = tiny();
        let config = LoraConfig::new(2, 4.0, targets.iter().map(|t| t.to_string()).collect())
            .with_dropout(dropout);
        crate::lora::inject_adapters(&mut model, &config, 5).unwrap();
        // Non-zero B so every adapter influences the loss
        let mut params = model.trainable_parameters();
        for (i, v) in params.iter_mut().enumerate() {
            if *v == 0.0 {
                *v = ((i % 7) as f32 - 3.0) * 0.05;
            }
        }
        model.set_trainable_parameters(&params).unwrap();
        model
    }

    #[test]
    fn test_forward_shape_and_prefix_causality() {
        let model = tiny();
        let a = model.forward(&[1, 2, 3]).unwrap();
        let b = model.forward(&[1, 2, 9]).unwrap();
        assert_eq!(a.dim(), (3, 12));
        // Earlier positions never see later tokens
        for j in 0..12 {
            assert_abs_diff_eq!(a[(1, j)], b[(1, j)], epsilon = 1e-6);
        }
        assert!(matches!(model.forward(&[12]), Err(ModelError::TokenOutOfRange { id: 12, .. })));
    }

    #[test]
    fn test_loss_ignores_masked_labels() {
        let model = tiny();
        let out = model.loss(&[1, 2, 3, 0], &[1, 1, 1, 0], &[-100, 2, -100, -100]).unwrap();
        assert_eq!(out.tokens, 1);
        assert!(out.loss > 0.0);
        let none = model.loss(&[1, 2], &[1, 1], &[-100, -100]).unwrap();
        assert_eq!(none, LossOutput { loss: 0.0, tokens: 0 });
        assert!(matches!(
            model.loss(&[1, 2], &[1], &[1, 2]),
            Err(ModelError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_padding_side_is_irrelevant() {
        let model = tiny();
        let right = model.loss(&[4, 5, 6, 0, 0], &[1, 1, 1, 0, 0], &[4, 5, 6, -100, -100]).unwrap();
        let left = model.loss(&[0, 0, 4, 5, 6], &[0, 0, 1, 1, 1], &[-100, -100, 4, 5, 6]).unwrap();
        assert_abs_diff_eq!(right.loss, left.loss, epsilon = 1e-6);
    }

    #[test]
    fn test_no_adapters_no_parameters() {
        let mut model = tiny();
        assert_eq!(model.num_trainable_parameters(), 0);
        let g = model.per_sample_gradient(&[1, 2, 3], &[1, 1, 1], &[1, 2, 3]).unwrap();
        assert_eq!(g.grad.len(), 0);
        assert_eq!(g.tokens, 2);
    }

    #[test]
    fn test_per_sample_gradient_matches_finite_differences() {
        let mut model = with_adapters(&["q_proj", "v_proj", "lm_head"], 0.0);
        model.train();
        let ids = [3u32, 7, 1, 4, 0];
        let mask = [1u8, 1, 1, 1, 0];
        let labels = [3i64, 7, 1, 4, -100];
        let analytic = model.per_sample_gradient(&ids, &mask, &labels).unwrap();
        assert_eq!(analytic.grad.len(), model.num_trainable_parameters());

        let base = model.trainable_parameters();
        let h = 1e-2f32;
        let n = base.len();
        for &i in &[0, 5, n / 3, n / 2, n - 1] {
            let mut plus = base.clone();
            plus[i] += h;
            let mut minus = base.clone();
            minus[i] -= h;
            model.set_trainable_parameters(&plus).unwrap();
            let lp = model.loss(&ids, &mask, &labels).unwrap().loss;
            model.set_trainable_parameters(&minus).unwrap();
            let lm = model.loss(&ids, &mask, &labels).unwrap().loss;
            let numeric = (lp - lm) / (2.0 * h);
            assert_abs_diff_eq!(analytic.grad[i], numeric, epsilon = 2e-3);
        }
        model.set_trainable_parameters(&base).unwrap();
    }

    #[test]
    fn test_frozen_weights_untouched_by_training_step() {
        let mut model = with_adapters(&["v_proj"], 0.05);
        model.train();
        let before = model.modules()[0].1.base().to_dense().into_owned();
        let g = model.per_sample_gradient(&[1, 2, 3], &[1, 1, 1], &[1, 2, 3]).unwrap();
        let params = model.trainable_parameters() - &(g.grad * 0.1);
        model.set_trainable_parameters(&params).unwrap();
        assert_eq!(model.modules()[0].1.base().to_dense().into_owned(), before);
    }

    #[test]
    fn test_parameter_length_checked() {
        let mut model = with_adapters(&["q_proj"], 0.0);
        let n = model.num_trainable_parameters();
        assert_eq!(n, 2 * (2 * 6 + 6 * 2));
        assert!(model.set_trainable_parameters(&Array1::zeros(n + 1)).is_err());
        assert_eq!(model.num_parameters(), 12 * 6 + 4 * 36 + 12 * 6 + n);
    }

    #[test]
    fn test_module_lookup() {
        let mut model = tiny();
        assert!(model.module_mut("model.layers.1.v_proj").is_some());
        assert!(model.module_mut("lm_head").is_some());
        assert!(model.module_mut("model.layers.2.v_proj").is_none());
        assert!(model.module_mut("model.layers.0.k_proj").is_none());
        assert_eq!(model.modules().len(), 5);
    }

    #[test]
    fn test_train_eval_modes() {
        let mut model = tiny();
        assert!(!model.is_training());
        model.train();
        assert!(model.is_training());
        model.eval();
        assert!(!model.is_training());
    }
}
