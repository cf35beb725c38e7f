//! Evaluation over the held-out examples

use super::core::SftTrainer;
use crate::error::{Error, Result};
use crate::tracking::LogEvent;
use crate::train::{perplexity, EvalMetrics};

impl SftTrainer {
    /// Mean loss and perplexity over the eval set, without dropout
    pub fn evaluate(&mut self) -> Result<EvalMetrics> {
        if self.eval_examples.is_empty() {
            return Err(Error::training("evaluation requires a non-empty eval dataset"));
        }
        let was_training = self.model.is_training();
        self.model.eval();
        let result = self.eval_loop();
        if was_training {
            self.model.train();
        }
        let metrics = result?;
        tracing::info!(
            eval_loss = metrics.eval_loss,
            perplexity = metrics.perplexity,
            samples = metrics.samples,
            "evaluation"
        );
        Ok(metrics)
    }

    fn eval_loop(&self) -> Result<EvalMetrics> {
        let (mut sum, mut samples, mut tokens) = (0.0f64, 0usize, 0usize);
        for chunk in self.eval_examples.chunks(self.args.per_device_eval_batch_size.max(1)) {
            let batch = self.collator.collate(chunk);
            for row in 0..batch.len() {
                let out =
                    self.model.loss(&batch.input_ids[row], &batch.attention_mask[row], &batch.labels[row])?;
                if out.tokens == 0 {
                    continue;
                }
                sum += f64::from(out.loss);
                samples += 1;
                tokens += out.tokens;
            }
        }
        let eval_loss = if samples > 0 { sum / samples as f64 } else { 0.0 };
        Ok(EvalMetrics { eval_loss, perplexity: perplexity(eval_loss), samples, tokens })
    }

    /// Evaluate inside the loop and record the metrics
    pub(crate) fn evaluate_and_log(&mut self) -> Result<EvalMetrics> {
        let metrics = self.evaluate()?;
        let event = LogEvent::new(self.state.global_step, self.state.epoch)
            .with("eval_loss", metrics.eval_loss)
            .with("eval_perplexity", metrics.perplexity)
            .with("eval_samples", metrics.samples as f64);
        self.log(event)?;
        if self.state.observe_eval_loss(metrics.eval_loss) {
            self.best_step = Some(self.state.global_step);
        }
        Ok(metrics)
    }
}
