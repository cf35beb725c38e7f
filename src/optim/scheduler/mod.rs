//! Learning rate schedulers
//!
//! Step-indexed schedules with the names used by `lr_scheduler_type`:
//! - `linear` - warmup then linear decay to 0
//! - `constant` - fixed rate
//! - `constant_with_warmup` - warmup then fixed rate
//! - `cosine` - warmup then half-cosine decay to 0

use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use super::Optimizer;


/// Learning rate scheduler trait
pub trait LrScheduler {
    /// Get the current learning rate
    fn get_lr(&self) -> f32;

    /// Advance by one optimizer step
    fn step(&mut self);
}

/// Schedule shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerType {
    #[default]
    Linear,
    Constant,
    ConstantWithWarmup,
    Cosine,
}

/// Warmup length: explicit steps win over the ratio
pub fn warmup_steps(warmup_steps: usize, warmup_ratio: f64, total_steps: usize) -> usize {
    if warmup_steps > 0 {
        warmup_steps
    } else {
        (warmup_ratio * total_steps as f64).ceil() as usize
    }
}

/// Learning rate as a function of the optimizer step
#[derive(Debug, Clone, PartialEq)]
pub struct LrSchedule {
    kind: SchedulerType,
    base_lr: f32,
    warmup_steps: usize,
    total_steps: usize,
    current_step: usize,
}

impl LrSchedule {
    pub fn new(kind: SchedulerType, base_lr: f32, warmup_steps: usize, total_steps: usize) -> Self {
        Self { kind, base_lr, warmup_steps, total_steps, current_step: 0 }
    }

    /// Multiplier applied to the base rate at `step`
    pub fn factor_at(&self, step: usize) -> f32 {
        let warmup = self.warmup_steps;
        if step < warmup && self.kind != SchedulerType::Constant {
            return step as f32 / warmup.max(1) as f32;
        }
        let decay_steps = self.total_steps.saturating_sub(warmup).max(1) as f32;
        let progress = step.saturating_sub(warmup) as f32 / decay_steps;
        match self.kind {
            SchedulerType::Constant | SchedulerType::ConstantWithWarmup => 1.0,
            SchedulerType::Linear => (1.0 - progress).max(0.0),
            SchedulerType::Cosine => (0.5 * (1.0 + (PI * progress).cos())).max(0.0),
        }
    }

    pub fn lr_at(&self, step: usize) -> f32 {
        self.base_lr * self.factor_at(step)
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Apply the current learning rate to an optimizer
    pub fn apply<O: Optimizer + ?Sized>(&self, optimizer: &mut O) {
        optimizer.set_lr(self.get_lr());
    }
}

impl LrScheduler for LrSchedule {
    fn get_lr(&self) -> f32 {
        self.lr_at(self.current_step)
    }

    fn step(&mut self) {
        self.current_step += 1;
    }
}
