//! Optimizers for training adapter parameters
//!
//! Parameters and gradients are flat `Array1<f32>` buffers laid out as
//! `CausalLm::trainable_parameters` lays them out.

mod adamw;
mod clip;
mod gradient;
mod optimizer;
mod scheduler;
mod sgd;

pub use adamw::AdamW;
pub use clip::{clip_grad_norm, grad_norm};
pub use gradient::{GradientOptimizer, StandardOptimizer, StepReport};
pub use optimizer::{Optimizer, OptimizerKind};
pub use scheduler::{warmup_steps, LrSchedule, LrScheduler, SchedulerType};
pub use sgd::Sgd;
