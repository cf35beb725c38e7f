//! Batch samplers: which examples make up each batch of an epoch

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Produces the index batches of an epoch
pub trait BatchSampler: Send {
    /// Index batches for `epoch`
    fn batches(&mut self, epoch: usize) -> Vec<Vec<usize>>;

    /// Examples the sampler draws from
    fn num_samples(&self) -> usize;

    /// Mean batch size
    fn expected_batch_size(&self) -> usize;

    /// Batches per epoch
    fn num_batches(&self) -> usize;

    fn name(&self) -> &'static str;
}

/// Shuffled fixed-size batches, reshuffled every epoch from `seed`
#[derive(Debug, Clone)]
pub struct ShuffleSampler {
    num_samples: usize,
    batch_size: usize,
    drop_last: bool,
    seed: u64,
}

impl ShuffleSampler {
    pub fn new(num_samples: usize, batch_size: usize, drop_last: bool, seed: u64) -> Self {
        Self { num_samples, batch_size: batch_size.max(1), drop_last, seed }
    }
}

impl BatchSampler for ShuffleSampler {
    fn batches(&mut self, epoch: usize) -> Vec<Vec<usize>> {
        let mut order: Vec<usize> = (0..self.num_samples).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64));
        order.shuffle(&mut rng);
        order
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(<[usize]>::to_vec)
            .collect()
    }

    fn num_samples(&self) -> usize {
        self.num_samples
    }

    fn expected_batch_size(&self) -> usize {
        self.batch_size
    }

    fn num_batches(&self) -> usize {
        if self.drop_last {
            self.num_samples / self.batch_size
        } else {
            self.num_samples.div_ceil(self.batch_size)
        }
    }

    fn name(&self) -> &'static str {
        "shuffle"
    }
}

/// Every example joins each logical batch independently with probability `sample_rate`
///
/// One logical batch is drawn per optimizer step and split into
/// `accumulation_steps` physical micro-batches, some possibly empty, so an
/// example appears at most once inside an accumulation window.
#[derive(Debug, Clone)]
pub struct PoissonSampler {
    num_samples: usize,
    sample_rate: f64,
    num_steps: usize,
    accumulation_steps: usize,
    rng: StdRng,
}

impl PoissonSampler {
    /// `sample_rate` is the per-step rate and `num_steps` the optimizer steps per epoch
    pub fn new(num_samples: usize, sample_rate: f64, num_steps: usize, accumulation_steps: usize, rng: StdRng) -> Self {
        Self {
            num_samples,
            sample_rate: sample_rate.clamp(0.0, 1.0),
            num_steps: num_steps.max(1),
            accumulation_steps: accumulation_steps.max(1),
            rng,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn accumulation_steps(&self) -> usize {
        self.accumulation_steps
    }

    fn logical_batch(&mut self) -> Vec<usize> {
        let mut batch: Vec<usize> =
            (0..self.num_samples).filter(|_| self.rng.random::<f64>() < self.sample_rate).collect();
        batch.shuffle(&mut self.rng);
        batch
    }
}

/// Split `batch` into `parts` contiguous chunks whose sizes differ by at most one
fn split_even(batch: &[usize], parts: usize) -> Vec<Vec<usize>> {
    let len = batch.len();
    (0..parts).map(|i| batch[i * len / parts..(i + 1) * len / parts].to_vec()).collect()
}

impl BatchSampler for PoissonSampler {
    fn batches(&mut self, _epoch: usize) -> Vec<Vec<usize>> {
        let mut out = Vec::with_capacity(self.num_batches());
        for _ in 0..self.num_steps {
            let logical = self.logical_batch();
            out.extend(split_even(&logical, self.accumulation_steps));
        }
        out
    }

    fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Expected size of one physical micro-batch
    fn expected_batch_size(&self) -> usize {
        ((self.sample_rate * self.num_samples as f64 / self.accumulation_steps as f64).round() as usize).max(1)
    }

    fn num_batches(&self) -> usize {
        self.num_steps * self.accumulation_steps
    }

    fn name(&self) -> &'static str {
        "poisson"
    }
}

/// Training data loader after privacy wrapping
pub struct DpDataLoader {
    sampler: Box<dyn BatchSampler>,
    sample_rate: f64,
    poisson: bool,
}

impl DpDataLoader {
    /// Wrap `loader`, swapping in Poisson sampling when requested
    ///
    /// The sample rate is the per-optimizer-step rate
    /// `expected_batch_size * accumulation_steps / num_samples` either way.
    pub fn from_data_loader(
        loader: Box<dyn BatchSampler>,
        poisson_sampling: bool,
        accumulation_steps: usize,
        rng: StdRng,
    ) -> Self {
        let accumulation_steps = accumulation_steps.max(1);
        let n = loader.num_samples().max(1);
        let sample_rate = (loader.expected_batch_size() as f64 * accumulation_steps as f64 / n as f64).min(1.0);
        let sampler: Box<dyn BatchSampler> = if poisson_sampling {
            let num_steps = loader.num_batches().div_ceil(accumulation_steps);
            Box::new(PoissonSampler::new(loader.num_samples(), sample_rate, num_steps, accumulation_steps, rng))
        } else {
            loader
        };
        Self { sampler, sample_rate, poisson: poisson_sampling }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn is_poisson(&self) -> bool {
        self.poisson
    }
}

impl BatchSampler for DpDataLoader {
    fn batches(&mut self, epoch: usize) -> Vec<Vec<usize>> {
        self.sampler.batches(epoch)
    }

    fn num_samples(&self) -> usize {
        self.sampler.num_samples()
    }

    fn expected_batch_size(&self) -> usize {
        self.sampler.expected_batch_size()
    }

    fn num_batches(&self) -> usize {
        self.sampler.num_batches()
    }

    fn name(&self) -> &'static str {
        self.sampler.name()
    }
}
