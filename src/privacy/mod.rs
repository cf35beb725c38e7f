//! Differential privacy for adapter training
//!
//! DP-SGD following Abadi et al. (2016): every example's gradient is clipped
//! to `max_grad_norm`, the clipped gradients are summed, Gaussian noise of
//! standard deviation `noise_multiplier * max_grad_norm` is added once per
//! optimizer step, and an RDP accountant (Mironov, 2017) tracks ε.
//!
//! # Example
//!
//! ```
//! use lora_dp::lora::{inject_adapters, LoraConfig};
//! use lora_dp::model::{CausalLm, ModelConfig};
//! use lora_dp::optim::{AdamW, GradientOptimizer, StandardOptimizer};
//! use lora_dp::privacy::{PrivacyEngine, PrivacyParams, ShuffleSampler};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut model = CausalLm::random(ModelConfig::new(32, 8, 1, vec!["q_proj".into()]), 0)?;
//! inject_adapters(&mut model, &LoraConfig::new(4, 8.0, vec!["q_proj".into()]), 0)?;
//! model.train();
//!
//! let optimizer = Box::new(StandardOptimizer::new(Box::new(AdamW::default_params(1e-3)), 0.0));
//! let loader = Box::new(ShuffleSampler::new(100, 10, false, 0));
//! let (dp_optimizer, dp_loader) =
//!     PrivacyEngine::new(false).make_private(&mut model, optimizer, loader, &PrivacyParams::default())?;
//! assert_eq!(dp_optimizer.config().sample_rate, 0.1);
//! assert!(!dp_loader.is_poisson());
//! assert_eq!(dp_optimizer.accountant().n_steps(), 0);
//! assert!(dp_optimizer.privacy_spent().is_some());
//! # Ok(())
//! # }
//! ```

mod accountant;
mod config;
mod engine;
mod error;
mod gradient;
mod optimizer;
mod sampler;
mod utils;


pub use accountant::{compute_rdp_gaussian, default_orders, rdp_to_dp, RdpAccountant};
pub use config::PrivacyParams;
pub use engine::PrivacyEngine;
pub use error::{DpError, Result};
pub use gradient::{add_gaussian_noise, clip_gradient, standard_normal};
pub use optimizer::{DpOptimizer, DpOptimizerConfig};
pub use sampler::{BatchSampler, DpDataLoader, PoissonSampler, ShuffleSampler};
pub use utils::{epsilon_after, get_noise_multiplier};
