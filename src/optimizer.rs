//! Adam optimizer with a per-optimizer learning rate schedule.

use candle_core::backprop::GradStore;
use candle_core::Tensor;
use candle_nn::{Optimizer, ParamsAdamW, VarMap};

use crate::config::OptimizerSettings;
use crate::error::{Result, UpscaleError};
use crate::scheduler::{LRScheduler, SchedulerType};

/// Optimizer configuration.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Learning rate at step 0
    pub learning_rate: f64,
    /// Beta1 for Adam
    pub beta1: f64,
    /// Beta2 for Adam
    pub beta2: f64,
    /// Epsilon for numerical stability
    pub eps: f64,
    /// Learning rate schedule
    pub schedule: SchedulerType,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self::generator(&OptimizerSettings::default())
    }
}

impl OptimizerConfig {
    /// Generator optimizer from the shared settings.
    pub fn generator(settings: &OptimizerSettings) -> Self {
        Self {
            learning_rate: settings.learning_rate,
            beta1: settings.beta1,
            beta2: settings.beta2,
            eps: settings.eps,
            schedule: SchedulerType::from_settings(settings),
        }
    }

    /// Discriminator optimizer: same schedule, scaled base rate.
    pub fn discriminator(settings: &OptimizerSettings) -> Self {
        Self {
            learning_rate: settings.disc_learning_rate(),
            ..Self::generator(settings)
        }
    }

    /// Create an Adam optimizer over every variable in `varmap`.
    ///
    /// # Errors
    ///
    /// Returns an error if the optimizer cannot be created.
    pub fn build_adam(&self, varmap: &VarMap) -> Result<AdamOptimizer> {
        let vars = varmap.all_vars();
        let params = ParamsAdamW {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: 0.0,
        };

        let opt = candle_nn::AdamW::new(vars, params)
            .map_err(|e| UpscaleError::Training(format!("Failed to create Adam: {}", e)))?;

        Ok(AdamOptimizer {
            inner: opt,
            scheduler: LRScheduler::new(self.schedule.clone(), self.learning_rate),
        })
    }
}

/// Adam optimizer wrapper.
///
/// The learning rate for each update comes from the scheduler at the
/// optimizer's own update count.
pub struct AdamOptimizer {
    inner: candle_nn::AdamW,
    scheduler: LRScheduler,
}

impl AdamOptimizer {
    /// Apply one update from precomputed gradients.
    ///
    /// # Errors
    ///
    /// Returns an error if the step fails.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.inner.set_learning_rate(self.scheduler.get_lr());
        self.inner
            .step(grads)
            .map_err(|e| UpscaleError::Training(format!("Optimizer step failed: {}", e)))?;
        self.scheduler.advance();
        Ok(())
    }

    /// Backpropagate `loss` and apply one update.
    ///
    /// # Errors
    ///
    /// Returns an error if the backward pass or the step fails.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Learning rate the next update will use.
    pub fn learning_rate(&self) -> f64 {
        self.scheduler.get_lr()
    }

    /// Updates applied so far.
    pub fn updates(&self) -> u64 {
        self.scheduler.current_step()
    }
}
