//! Learning rate schedulers.

use crate::config::OptimizerSettings;

/// Learning rate scheduler types.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerType {
    /// Constant learning rate
    Constant,
    /// `lr · rate^(step / decay_steps)`, with the exponent floored when
    /// `staircase` is set
    ExponentialDecay {
        /// Steps per decay period
        decay_steps: u64,
        /// Factor applied once per period
        decay_rate: f64,
        /// Decay in discrete jumps
        staircase: bool,
    },
}

impl SchedulerType {
    /// Exponential decay as configured in `settings`.
    pub fn from_settings(settings: &OptimizerSettings) -> Self {
        Self::ExponentialDecay {
            decay_steps: settings.decay_steps,
            decay_rate: settings.decay_rate,
            staircase: settings.staircase,
        }
    }
}

/// Learning rate scheduler driven by the optimizer's update count.
#[derive(Debug, Clone)]
pub struct LRScheduler {
    /// Scheduler type
    scheduler_type: SchedulerType,
    /// Base learning rate
    base_lr: f64,
    /// Updates applied so far
    current_step: u64,
}

impl LRScheduler {
    /// Create a new scheduler.
    pub fn new(scheduler_type: SchedulerType, base_lr: f64) -> Self {
        Self {
            scheduler_type,
            base_lr,
            current_step: 0,
        }
    }

    /// Learning rate for the next update.
    pub fn get_lr(&self) -> f64 {
        self.lr_at(self.current_step)
    }

    /// Learning rate for update number `step` (0-based).
    pub fn lr_at(&self, step: u64) -> f64 {
        match &self.scheduler_type {
            SchedulerType::Constant => self.base_lr,

            SchedulerType::ExponentialDecay {
                decay_steps,
                decay_rate,
                staircase,
            } => {
                let mut exponent = step as f64 / (*decay_steps).max(1) as f64;
                if *staircase {
                    exponent = exponent.floor();
                }
                self.base_lr * decay_rate.powf(exponent)
            }
        }
    }

    /// Record one applied update.
    pub fn advance(&mut self) {
        self.current_step += 1;
    }

    /// Updates recorded so far.
    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    /// Base learning rate.
    pub fn base_lr(&self) -> f64 {
        self.base_lr
    }
}
