//! The training loop: epochs, accumulation, logging, evaluation, checkpoints

use std::time::Instant;

use super::core::SftTrainer;
use crate::error::{Error, Result};
use crate::optim::{warmup_steps, GradientOptimizer, LrSchedule, LrScheduler, StepReport};
use crate::privacy::BatchSampler;
use crate::tokenizer::TokenId;
use crate::tracking::LogEvent;
use crate::train::{IntervalStrategy, TrainOutput, TrainerState};

/// Loss sum and example count since the last log
#[derive(Debug, Default)]
struct LossWindow {
    sum: f64,
    count: usize,
}

impl LossWindow {
    fn add(&mut self, loss: f32) {
        self.sum += f64::from(loss);
        self.count += 1;
    }

    fn take_mean(&mut self) -> Option<f64> {
        let mean = (self.count > 0).then(|| self.sum / self.count as f64);
        *self = Self::default();
        mean
    }
}

impl SftTrainer {
    /// Run the training loop with the current optimizer and loader
    ///
    /// Every example of a micro-batch contributes its own gradient; the
    /// optimizer steps after `gradient_accumulation_steps` micro-batches or
    /// at the end of an epoch.
    pub fn train(&mut self) -> Result<TrainOutput> {
        let mut optimizer = self.take_optimizer()?;
        let mut loader = match self.take_train_dataloader() {
            Ok(loader) => loader,
            Err(e) => {
                self.optimizer = Some(optimizer);
                return Err(e);
            }
        };
        let result = self.train_with(optimizer.as_mut(), loader.as_mut());
        self.optimizer = Some(optimizer);
        self.train_loader = Some(loader);
        result
    }

    fn train_with(
        &mut self,
        optimizer: &mut dyn GradientOptimizer,
        loader: &mut dyn BatchSampler,
    ) -> Result<TrainOutput> {
        let accumulation = self.args.gradient_accumulation_steps.max(1);
        let batches_per_epoch = loader.num_batches();
        if batches_per_epoch == 0 {
            return Err(Error::training(format!(
                "the {} loader yields no batches for {} examples",
                loader.name(),
                loader.num_samples()
            )));
        }
        let (total_steps, num_epochs) = self.args.schedule(batches_per_epoch);
        let warmup = warmup_steps(self.args.warmup_steps, self.args.warmup_ratio, total_steps);
        let mut schedule =
            LrSchedule::new(self.args.lr_scheduler_type, self.args.learning_rate as f32, warmup, total_steps);

        self.state = TrainerState {
            max_steps: total_steps as u64,
            num_train_epochs: num_epochs as u64,
            logging_steps: self.args.logging_steps,
            save_steps: self.args.save_steps,
            train_batch_size: self.args.per_device_train_batch_size,
            ..TrainerState::default()
        };
        self.best_step = None;

        tracing::info!(
            examples = self.train_examples.len(),
            epochs = num_epochs,
            total_steps,
            warmup,
            batch_size = self.args.per_device_train_batch_size,
            accumulation,
            sampler = loader.name(),
            trainable = self.model.num_trainable_parameters(),
            private = optimizer.privacy_spent().is_some(),
            "running training"
        );

        let start = Instant::now();
        let mut window = LossWindow::default();
        let (mut loss_sum, mut loss_count, mut processed) = (0.0f64, 0usize, 0usize);
        let mut global_step = 0usize;
        self.model.train();
        optimizer.zero_grad();

        for epoch in 0..num_epochs {
            let batches = loader.batches(epoch);
            let n_batches = batches.len();
            let mut done = false;

            for (i, indices) in batches.iter().enumerate() {
                let examples = self.gather(indices)?;
                let batch = self.collator.collate(&examples);
                for row in 0..batch.len() {
                    let sample = self.model.per_sample_gradient(
                        &batch.input_ids[row],
                        &batch.attention_mask[row],
                        &batch.labels[row],
                    )?;
                    optimizer.accumulate(&sample.grad);
                    processed += 1;
                    if sample.tokens > 0 {
                        window.add(sample.loss);
                        loss_sum += f64::from(sample.loss);
                        loss_count += 1;
                    }
                }

                if (i + 1) % accumulation != 0 && i + 1 != n_batches {
                    continue;
                }
                optimizer.set_lr(schedule.get_lr());
                let mut params = self.model.trainable_parameters();
                let report = optimizer.step(&mut params);
                self.model.set_trainable_parameters(&params)?;
                schedule.step();
                global_step += 1;
                self.state.global_step = global_step as u64;
                self.state.epoch = epoch as f64 + (i + 1) as f64 / n_batches as f64;

                if (self.args.logging_first_step && global_step == 1)
                    || global_step % self.args.logging_steps == 0
                {
                    self.log_step(&mut window, &report, &*optimizer)?;
                }
                if self.args.eval_strategy == IntervalStrategy::Steps
                    && global_step % self.args.eval_interval() == 0
                {
                    self.evaluate_and_log()?;
                }
                if self.args.save_strategy == IntervalStrategy::Steps
                    && global_step % self.args.save_steps == 0
                {
                    self.save_checkpoint()?;
                }
                if global_step >= total_steps {
                    done = true;
                    break;
                }
            }

            if self.args.eval_strategy == IntervalStrategy::Epoch {
                self.evaluate_and_log()?;
            }
            if self.args.save_strategy == IntervalStrategy::Epoch {
                self.save_checkpoint()?;
            }
            if done {
                break;
            }
        }

        let runtime_secs = start.elapsed().as_secs_f64();
        let training_loss = if loss_count > 0 { loss_sum / loss_count as f64 } else { 0.0 };
        let privacy = optimizer.privacy_spent();
        let output = TrainOutput {
            global_step: global_step as u64,
            training_loss,
            epsilon: privacy.map(|(eps, _)| eps),
            delta: privacy.map(|(_, delta)| delta),
            runtime_secs,
            samples_per_second: processed as f64 / runtime_secs.max(1e-9),
        };

        let mut event = LogEvent::new(output.global_step, self.state.epoch)
            .with("train_loss", training_loss)
            .with("train_runtime", runtime_secs)
            .with("train_samples_per_second", output.samples_per_second);
        if let Some(eps) = output.epsilon {
            event = event.with("epsilon", eps);
        }
        self.log(event)?;
        self.tracker.finish()?;

        tracing::info!(
            global_step,
            training_loss,
            epsilon = ?output.epsilon,
            runtime_secs,
            "training finished"
        );
        Ok(output)
    }

    fn gather(&self, indices: &[usize]) -> Result<Vec<Vec<TokenId>>> {
        indices
            .iter()
            .map(|&i| {
                self.train_examples.get(i).cloned().ok_or_else(|| {
                    Error::training(format!(
                        "sampler index {i} out of range for {} examples",
                        self.train_examples.len()
                    ))
                })
            })
            .collect()
    }

    fn log_step(
        &mut self,
        window: &mut LossWindow,
        report: &StepReport,
        optimizer: &dyn GradientOptimizer,
    ) -> Result<()> {
        let mut event = LogEvent::new(self.state.global_step, self.state.epoch)
            .with("learning_rate", f64::from(report.lr))
            .with("grad_norm", f64::from(report.grad_norm));
        let loss = window.take_mean();
        if let Some(loss) = loss {
            event = event.with("loss", loss);
        }
        let privacy = optimizer.privacy_spent();
        if let Some((eps, delta)) = privacy {
            event = event.with("epsilon", eps).with("delta", delta);
        }
        tracing::info!(
            step = self.state.global_step,
            epoch = %format!("{:.2}", self.state.epoch),
            loss = ?loss,
            lr = report.lr,
            samples = report.samples,
            clipped = report.clipped,
            epsilon = ?privacy.map(|(eps, _)| eps),
            "train"
        );
        self.log(event)
    }
}
