//! Example training run: fitting `y = w * x + b` by minibatch gradient descent.
//!
//! The training step only updates the model and writes the batch loss. All
//! the bookkeeping around it is done by hooks:
//!
//! ```text
//! setup tick      set(optimiser.lr)                        inline command
//! every iter      accumulate(metrics.loss)                 inline, via the reporter
//! every 25 iters  report_mean(metrics.loss)                background
//! every epoch     validate -> early_stopping(val_loss)     inline, ordered by priority
//! every 5 epochs  decay_lr                                 inline
//! every 2 epochs  checkpoint                               background, reads model.*
//! ```

use std::sync::Arc;

use cadence_hooks::builtin::{AccumulatedValueReporter, EarlyStopping, SetValueCommand};
use cadence_hooks::{FnHook, HookRef, TickCounters, TimeStep};
use cadence_registry::{ParameterRegistry, RegistryError};

/// Registry path of the model.
pub const MODEL: &str = "model.linear";
/// Registry path of the learning rate.
pub const LEARNING_RATE: &str = "optimiser.lr";
/// Registry path of the last batch loss.
pub const LOSS: &str = "metrics.loss";
/// Registry path of the last validation loss.
pub const VAL_LOSS: &str = "metrics.val_loss";

/// A one-dimensional linear model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearModel {
    /// Slope.
    pub weight: f64,
    /// Intercept.
    pub bias: f64,
}

impl LinearModel {
    /// Prediction for `x`.
    #[must_use]
    pub fn predict(&self, x: f64) -> f64 {
        self.weight * x + self.bias
    }

    /// Mean squared error over `samples`.
    #[must_use]
    pub fn loss(&self, samples: &[(f64, f64)]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        let total: f64 = samples
            .iter()
            .map(|&(x, y)| (self.predict(x) - y).powi(2))
            .sum();
        total / samples.len() as f64
    }
}

/// Deterministic synthetic samples around a known line.
#[derive(Debug, Clone)]
pub struct Dataset {
    samples: Vec<(f64, f64)>,
}

impl Dataset {
    /// `count` samples of `y = weight * x + bias` with a small periodic
    /// perturbation.
    #[must_use]
    pub fn synthetic(count: usize, weight: f64, bias: f64) -> Self {
        let samples = (0..count)
            .map(|i| {
                let x = i as f64 / count.max(1) as f64 * 4.0 - 2.0;
                let noise = (i as f64 * 1.7).sin() * 0.05;
                (x, weight * x + bias + noise)
            })
            .collect();
        Self { samples }
    }

    /// All samples.
    #[must_use]
    pub fn samples(&self) -> &[(f64, f64)] {
        &self.samples
    }

    /// The `batch_size` samples for `iteration`, cycling through the data.
    #[must_use]
    pub fn batch(&self, iteration: u64, batch_size: usize) -> Vec<(f64, f64)> {
        if self.samples.is_empty() {
            return Vec::new();
        }
        let start = (iteration as usize * batch_size) % self.samples.len();
        self.samples
            .iter()
            .cycle()
            .skip(start)
            .take(batch_size)
            .copied()
            .collect()
    }
}

/// Writes the initial model and optimiser state.
///
/// # Errors
///
/// Fails only if the paths cannot be created.
pub fn seed_registry(registry: &mut ParameterRegistry) -> Result<(), RegistryError> {
    registry.set(MODEL, LinearModel::default())?;
    registry.set(LEARNING_RATE, 0.0_f64)?;
    Ok(())
}

/// One gradient-descent step per iteration.
pub fn training_step(
    dataset: Arc<Dataset>,
    batch_size: usize,
) -> impl FnMut(&mut ParameterRegistry, TickCounters) -> Result<(), RegistryError> {
    move |registry, counters| {
        let lr = *registry.get::<f64>(LEARNING_RATE)?;
        let batch = dataset.batch(counters.iteration, batch_size);
        let model = registry.get_mut::<LinearModel>(MODEL)?;

        let n = batch.len().max(1) as f64;
        let (mut grad_w, mut grad_b) = (0.0, 0.0);
        for &(x, y) in &batch {
            let error = model.predict(x) - y;
            grad_w += 2.0 * error * x / n;
            grad_b += 2.0 * error / n;
        }
        model.weight -= lr * grad_w;
        model.bias -= lr * grad_b;

        let loss = model.loss(&batch);
        registry.set(LOSS, loss)?;
        Ok(())
    }
}

/// The hooks of the example run.
#[must_use]
pub fn training_hooks(dataset: Arc<Dataset>) -> Vec<HookRef> {
    let set_lr: HookRef = Arc::new(SetValueCommand::new(LEARNING_RATE, 0.1_f64));

    let report_loss: HookRef = Arc::new(AccumulatedValueReporter::new([LOSS], TimeStep::every_iterations(25)));

    let validate = FnHook::builder("validate", move |ctx| {
        let model = *ctx.get::<LinearModel>(MODEL)?;
        let val_loss = model.loss(dataset.samples());
        tracing::info!(epoch = ctx.counters().epoch, val_loss, "validated");
        ctx.set(VAL_LOSS, val_loss)
    })
    .every_epochs(1)
    .reads(MODEL)
    .priority(-1)
    .into_ref();

    let early_stopping: HookRef = Arc::new(EarlyStopping::new(VAL_LOSS, 3).with_min_delta(1e-6));

    let decay_lr = FnHook::builder("decay_lr", |ctx| {
        let lr = *ctx.get::<f64>(LEARNING_RATE)?;
        ctx.set(LEARNING_RATE, lr * 0.5)
    })
    .every_epochs(5)
    .reads(LEARNING_RATE)
    .into_ref();

    let checkpoint = FnHook::builder("checkpoint", |ctx| {
        let model = ctx.get::<LinearModel>(MODEL)?;
        tracing::info!(
            epoch = ctx.counters().epoch,
            weight = model.weight,
            bias = model.bias,
            "checkpoint"
        );
        Ok(())
    })
    .every_epochs(2)
    .reads("model.*")
    .background()
    .into_ref();

    vec![set_lr, report_loss, validate, early_stopping, decay_lr, checkpoint]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cycle_through_the_data() {
        let dataset = Dataset::synthetic(10, 2.0, 1.0);
        let batch = dataset.batch(3, 4);
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0], dataset.samples()[2]);
        assert_eq!(batch[3], dataset.samples()[5]);
    }

    #[test]
    fn step_reduces_loss() {
        let dataset = Arc::new(Dataset::synthetic(64, 3.0, -1.0));
        let mut registry = ParameterRegistry::new();
        seed_registry(&mut registry).unwrap();
        registry.set(LEARNING_RATE, 0.1_f64).unwrap();

        let before = registry.get::<LinearModel>(MODEL).unwrap().loss(dataset.samples());
        let mut step = training_step(Arc::clone(&dataset), 16);
        for iteration in 1..=50 {
            step(&mut registry, TickCounters::at_iteration(iteration)).unwrap();
        }
        let after = registry.get::<LinearModel>(MODEL).unwrap().loss(dataset.samples());

        assert!(after < before / 10.0);
    }

    #[test]
    fn hooks_resolve() {
        let dataset = Arc::new(Dataset::synthetic(8, 1.0, 0.0));
        let schedule = cadence_hooks::resolver::resolve(&training_hooks(dataset)).unwrap();
        assert!(schedule.position("validate") < schedule.position("early_stopping(metrics.val_loss)"));
    }
}
