//! Two-phase training loop.
//!
//! The generator is first pretrained alone on a pixel loss. Then generator
//! and discriminator are trained together, with the generator minimizing
//! feature, adversarial and pixel losses.

use std::fs;

use candle_core::{Device, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointManager, CheckpointState};
use crate::config::UpscaleConfig;
use crate::data::{batch_count, FrameBatch, FrameBatches};
use crate::device::select_device;
use crate::discriminator::Discriminator;
use crate::error::{Result, UpscaleError};
use crate::frames::FrameIndex;
use crate::generator::Generator;
use crate::hooks::{CompletionHook, NoopHook};
use crate::loss::{
    adversarial_loss, discriminator_loss, feature_loss, pixel_loss, GeneratorLoss,
};
use crate::memory::{
    check_budget, discriminator_activation_elems, extractor_activation_elems,
    generator_activation_elems, MemoryEstimate,
};
use crate::optimizer::{AdamOptimizer, OptimizerConfig};
use crate::summary::{self, EventLogger};
use crate::vgg::{FeatureExtractor, FeatureExtractorConfig};

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>7}/{len:7} {msg}";

/// Stage of the training protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Generator-only pixel loss training.
    #[default]
    Pretrain,
    /// Generator and discriminator co-training.
    Adversarial,
    /// All passes finished.
    Done,
}

/// Step counters owned by the trainer.
///
/// Both counters start at 0 and count completed optimizer steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Current phase
    pub phase: Phase,
    /// Completed pretraining steps
    pub pretrain_step: u64,
    /// Completed adversarial steps
    pub train_step: u64,
    /// Current adversarial epoch (0-based)
    pub epoch: usize,
}

/// Losses from one pretraining step.
#[derive(Debug, Clone, Copy)]
pub struct PretrainMetrics {
    /// Pixel loss of the generator output
    pub pixel_loss: f32,
}

/// Losses from one adversarial step.
#[derive(Debug, Clone, Copy)]
pub struct AdversarialMetrics {
    /// Weighted BCE of D(G(lr)) against real labels
    pub adversarial_loss: f32,
    /// Perceptual loss
    pub feature_loss: f32,
    /// Pixel loss
    pub pixel_loss: f32,
    /// BCE(real, D(hr)) + BCE(fake, D(G(lr)))
    pub discriminator_loss: f32,
}

impl AdversarialMetrics {
    /// Sum of the generator's loss terms.
    pub fn generator_loss(&self) -> f32 {
        self.adversarial_loss + self.feature_loss + self.pixel_loss
    }
}

/// Expected discriminator output shape `(1, h, w)` for the configured HR size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchLabels {
    shape: (usize, usize, usize),
}

impl PatchLabels {
    /// Label grid for `hr_height x hr_width` inputs.
    pub fn new(hr_height: usize, hr_width: usize) -> Self {
        Self {
            shape: Discriminator::patch_shape(hr_height, hr_width),
        }
    }

    /// `(channels, height, width)` of one label map.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Fail unless `pred` is `(N, c, h, w)` with `(c, h, w)` equal to the label shape.
    pub fn check(&self, pred: &Tensor) -> Result<()> {
        let (n, c, h, w) = pred.dims4()?;
        if (c, h, w) != self.shape {
            return Err(UpscaleError::shape_mismatch(
                (n, self.shape.0, self.shape.1, self.shape.2),
                (n, c, h, w),
            ));
        }
        Ok(())
    }
}

/// Training orchestrator.
///
/// # Example
///
/// ```no_run
/// use upscale_gan_rs::{Trainer, UpscaleConfig};
///
/// # fn main() -> upscale_gan_rs::Result<()> {
/// let config = UpscaleConfig::from_file("upscale.yaml")?;
/// let mut trainer = Trainer::new(config)?;
/// let state = trainer.train()?;
/// println!("finished after {} adversarial steps", state.train_step);
/// # Ok(())
/// # }
/// ```
pub struct Trainer {
    /// Configuration
    config: UpscaleConfig,
    /// Device for training
    device: Device,
    generator: Generator,
    discriminator: Discriminator,
    /// Frozen perceptual network, required for adversarial epochs
    feature_extractor: Option<FeatureExtractor>,
    gen_optimizer: AdamOptimizer,
    disc_optimizer: AdamOptimizer,
    labels: PatchLabels,
    state: TrainingState,
    checkpoints: CheckpointManager,
    hook: Box<dyn CompletionHook>,
}

impl Trainer {
    /// Create a new trainer on the configured device.
    ///
    /// Validates the configuration before creating the trainer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the networks
    /// cannot be built.
    pub fn new(config: UpscaleConfig) -> Result<Self> {
        config.validate()?;
        let device = select_device(&config.device);
        Self::with_device(config, device)
    }

    /// Create a new trainer on an explicit device.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the networks cannot
    /// be built, or configured feature extractor weights cannot be loaded.
    pub fn with_device(config: UpscaleConfig, device: Device) -> Result<Self> {
        config.validate()?;

        let generator = Generator::new(&config.generator, &device)?;
        let discriminator = Discriminator::new(&config.discriminator, &device)?;
        tracing::info!(
            "Generator: {} params, discriminator: {} params",
            generator.parameter_count(),
            discriminator.parameter_count()
        );

        let feature_extractor = match &config.feature.weights {
            Some(path) => Some(FeatureExtractor::load(path, config.feature.preprocess, &device)?),
            None => None,
        };

        let gen_optimizer =
            OptimizerConfig::generator(&config.optimizer).build_adam(generator.var_map())?;
        let disc_optimizer =
            OptimizerConfig::discriminator(&config.optimizer).build_adam(discriminator.var_map())?;
        tracing::info!(
            "Initialized Adam optimizers with lr={} (generator), lr={} (discriminator)",
            gen_optimizer.learning_rate(),
            disc_optimizer.learning_rate()
        );

        let labels = PatchLabels::new(config.data.hr_height, config.data.hr_width);
        let checkpoints = CheckpointManager::new(&config.output.checkpoint_dir);

        Ok(Self {
            config,
            device,
            generator,
            discriminator,
            feature_extractor,
            gen_optimizer,
            disc_optimizer,
            labels,
            state: TrainingState::default(),
            checkpoints,
            hook: Box::new(NoopHook),
        })
    }

    /// Use `extractor` for the perceptual loss.
    pub fn set_feature_extractor(&mut self, extractor: FeatureExtractor) {
        self.feature_extractor = Some(extractor);
    }

    /// Run `hook` once training is done.
    pub fn set_completion_hook(&mut self, hook: Box<dyn CompletionHook>) {
        tracing::debug!("Completion hook: {}", hook.name());
        self.hook = hook;
    }

    /// Run the whole protocol: pretraining, adversarial epochs, final
    /// checkpoint, then the completion hook.
    ///
    /// # Errors
    ///
    /// Fails before any step if adversarial epochs are configured without a
    /// feature extractor. Any data, shape, I/O or tensor error aborts the run.
    pub fn train(&mut self) -> Result<TrainingState> {
        let training = self.config.training.clone();
        if training.epochs > 0 && self.feature_extractor.is_none() {
            return Err(UpscaleError::config(
                "adversarial training needs a feature extractor (set feature.weights)",
            ));
        }

        tracing::info!("Starting training");
        tracing::info!("  Frames: {}", self.config.data.root.display());
        tracing::info!("  Pretrain passes: {}", training.pretrain_passes);
        tracing::info!("  Epochs: {}", training.epochs);

        if training.resume {
            if self.checkpoints.exists() {
                self.checkpoints
                    .load(&mut self.generator, &mut self.discriminator)?;
            } else {
                tracing::warn!(
                    "Resume requested but no checkpoint in {}; starting fresh",
                    self.checkpoints.dir().display()
                );
            }
        }

        fs::create_dir_all(&self.config.output.checkpoint_dir)?;
        fs::create_dir_all(&self.config.output.log_dir)?;

        let mut pass = 0u64;

        self.state.phase = Phase::Pretrain;
        if training.pretrain_passes > 0 {
            self.check_memory(Phase::Pretrain);
            let mut logger = EventLogger::pretrain(&self.config.output.log_dir)?;
            for p in 0..training.pretrain_passes {
                tracing::info!("Pretrain pass {}/{}", p + 1, training.pretrain_passes);
                self.run_pretrain_pass(&mut logger, pass)?;
                pass += 1;
            }
            self.save_checkpoint()?;
            logger.flush();
        }

        self.state.phase = Phase::Adversarial;
        if training.epochs > 0 {
            self.check_memory(Phase::Adversarial);
            let mut logger = EventLogger::train(&self.config.output.log_dir)?;
            for epoch in 0..training.epochs {
                self.state.epoch = epoch;
                tracing::info!("Starting epoch {}/{}", epoch + 1, training.epochs);
                self.run_adversarial_epoch(&mut logger, pass)?;
                pass += 1;
            }
            logger.flush();
        }

        self.state.phase = Phase::Done;
        self.save_checkpoint()?;
        tracing::info!(
            "Training complete: {} pretrain steps, {} adversarial steps",
            self.state.pretrain_step,
            self.state.train_step
        );

        self.hook.on_complete()?;
        Ok(self.state.clone())
    }

    /// One generator update on the pretraining pixel loss.
    pub fn pretrain_step(&mut self, batch: &FrameBatch) -> Result<PretrainMetrics> {
        let sr = self.generator.forward_t(&batch.lr, true)?;
        let loss = pixel_loss(self.config.loss.pretrain_pixel, &batch.hr, &sr)?;
        self.gen_optimizer.backward_step(&loss)?;
        self.state.pretrain_step += 1;

        Ok(PretrainMetrics {
            pixel_loss: loss.to_scalar::<f32>()?,
        })
    }

    /// One simultaneous generator and discriminator update.
    ///
    /// Both gradient sets are computed from the same forward graph before
    /// either network is modified.
    pub fn adversarial_step(&mut self, batch: &FrameBatch) -> Result<AdversarialMetrics> {
        let extractor = self.feature_extractor.as_ref().ok_or_else(|| {
            UpscaleError::config("adversarial step needs a feature extractor")
        })?;

        let sr = self.generator.forward_t(&batch.lr, true)?;
        let real_pred = self.discriminator.forward_t(&batch.hr, true)?;
        let fake_pred = self.discriminator.forward_t(&sr, true)?;
        self.labels.check(&real_pred)?;
        self.labels.check(&fake_pred)?;

        let gen_loss = GeneratorLoss::new(
            feature_loss(extractor, &batch.hr, &sr, self.config.feature.feature_scale)?,
            adversarial_loss(&fake_pred, self.config.loss.adversarial_weight)?,
            pixel_loss(self.config.loss.adversarial_pixel, &batch.hr, &sr)?,
        )?;
        let disc_loss = discriminator_loss(&real_pred, &fake_pred)?;

        // Each optimizer only reads the gradients of its own variables.
        let gen_grads = gen_loss.total.backward()?;
        let disc_grads = disc_loss.backward()?;
        self.gen_optimizer.step(&gen_grads)?;
        self.disc_optimizer.step(&disc_grads)?;
        self.state.train_step += 1;

        Ok(AdversarialMetrics {
            adversarial_loss: gen_loss.adversarial.to_scalar::<f32>()?,
            feature_loss: gen_loss.feature.to_scalar::<f32>()?,
            pixel_loss: gen_loss.pixel.to_scalar::<f32>()?,
            discriminator_loss: disc_loss.to_scalar::<f32>()?,
        })
    }

    fn run_pretrain_pass(&mut self, logger: &mut EventLogger, pass: u64) -> Result<()> {
        let batches = self.batches_for_pass(pass)?;
        let pb = progress_bar(batches.len_hint())?;
        let log_every = self.config.training.log_every;
        let image_every = self.config.training.image_every();

        for batch in batches {
            let batch = batch?;
            let metrics = self.pretrain_step(&batch)?;
            pb.set_message(format!("mse {:.4}", metrics.pixel_loss));
            pb.inc(1);

            let step = self.state.pretrain_step;
            if step % log_every == 0 {
                tracing::info!(
                    "Pretrain Step: {}, MSE Loss: {:.6}, LR: {:.2e}",
                    step,
                    metrics.pixel_loss,
                    self.gen_optimizer.learning_rate()
                );
                warn_non_finite(step, &[(summary::MSE_LOSS, metrics.pixel_loss)]);
                logger.log_scalars(step, &[(summary::MSE_LOSS, metrics.pixel_loss)]);
                if step % image_every == 0 {
                    self.log_images(logger, &batch, step)?;
                }
                self.save_checkpoint()?;
                logger.flush();
            }
        }

        pb.finish_with_message("Pretrain pass complete");
        Ok(())
    }

    fn run_adversarial_epoch(&mut self, logger: &mut EventLogger, pass: u64) -> Result<()> {
        let batches = self.batches_for_pass(pass)?;
        let pb = progress_bar(batches.len_hint())?;
        let log_every = self.config.training.log_every;
        let image_every = self.config.training.image_every();

        for batch in batches {
            let batch = batch?;
            let metrics = self.adversarial_step(&batch)?;
            pb.set_message(format!(
                "g {:.4} d {:.4}",
                metrics.generator_loss(),
                metrics.discriminator_loss
            ));
            pb.inc(1);

            let step = self.state.train_step;
            if step % log_every == 0 {
                tracing::info!(
                    "Train Step: {}, Adversarial Loss: {:.6}, Feature Loss: {:.6}, MSE Loss: {:.6}, Discriminator Loss: {:.6}",
                    step,
                    metrics.adversarial_loss,
                    metrics.feature_loss,
                    metrics.pixel_loss,
                    metrics.discriminator_loss
                );
                let scalars = [
                    (summary::ADVERSARIAL_LOSS, metrics.adversarial_loss),
                    (summary::FEATURE_LOSS, metrics.feature_loss),
                    (summary::MSE_LOSS, metrics.pixel_loss),
                    (summary::DISCRIMINATOR_LOSS, metrics.discriminator_loss),
                ];
                warn_non_finite(step, &scalars);
                logger.log_scalars(step, &scalars);
                if step % image_every == 0 {
                    self.log_images(logger, &batch, step)?;
                }
                self.save_checkpoint()?;
                logger.flush();
            }
        }

        pb.finish_with_message(format!("Epoch {} complete", self.state.epoch + 1));
        Ok(())
    }

    fn batches_for_pass(&self, pass: u64) -> Result<FrameBatches> {
        let index = FrameIndex::build_for_pass(&self.config.data.root, self.config.seed, pass)?;
        tracing::info!(
            "Pass {}: {} frames from {} videos",
            pass,
            index.len(),
            index.videos().len()
        );
        let data = &self.config.data;
        if batch_count(index.len(), data.batch_size, data.drop_last) == 0 {
            return Err(UpscaleError::Training(format!(
                "{} frames cannot fill one batch of {}",
                index.len(),
                data.batch_size
            )));
        }
        Ok(FrameBatches::new(
            index.into_frames(),
            &self.config.data,
            self.config.seed.wrapping_add(pass),
            &self.device,
        ))
    }

    fn log_images(&self, logger: &mut EventLogger, batch: &FrameBatch, step: u64) -> Result<()> {
        let generated = self.generator.forward_t(&batch.lr, false)?;
        logger.log_image(summary::LOW_RES, &batch.lr, step)?;
        logger.log_image(summary::HIGH_RES, &batch.hr, step)?;
        logger.log_image(summary::GENERATED, &generated, step)?;
        Ok(())
    }

    fn save_checkpoint(&self) -> Result<()> {
        let snapshot = CheckpointState {
            state: self.state.clone(),
            generator_lr: self.gen_optimizer.learning_rate(),
            discriminator_lr: self.disc_optimizer.learning_rate(),
        };
        self.checkpoints
            .save(&self.generator, &self.discriminator, &snapshot)
    }

    fn check_memory(&self, phase: Phase) {
        let Some(budget) = self.config.device.memory else {
            return;
        };
        let data = &self.config.data;
        let batch = data.batch_size;
        let gen_act =
            generator_activation_elems(&self.config.generator, data.lr_height(), data.lr_width());

        let (name, estimate, limit) = match phase {
            Phase::Pretrain => (
                "Pretrain",
                MemoryEstimate::new(self.generator.parameter_count(), 0, batch * gen_act),
                budget.pretrain_mib,
            ),
            _ => {
                let disc_act = discriminator_activation_elems(
                    &self.config.discriminator,
                    data.hr_height,
                    data.hr_width,
                );
                let fx_act = extractor_activation_elems(
                    &FeatureExtractorConfig::vgg19(),
                    data.hr_height,
                    data.hr_width,
                );
                let frozen = self
                    .feature_extractor
                    .as_ref()
                    .map_or(0, |fx| fx.parameter_count());
                (
                    "Adversarial",
                    MemoryEstimate::new(
                        self.generator.parameter_count() + self.discriminator.parameter_count(),
                        frozen,
                        batch * (gen_act + 2 * disc_act + 2 * fx_act),
                    ),
                    budget.train_mib,
                )
            }
        };
        check_budget(name, &estimate, limit);
    }

    /// Step counters and phase.
    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    /// Configuration.
    pub fn config(&self) -> &UpscaleConfig {
        &self.config
    }

    /// Device for training.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The generator being trained.
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// The discriminator being trained.
    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    /// Discriminator label shape.
    pub fn labels(&self) -> PatchLabels {
        self.labels
    }

    /// Checkpoint locations.
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn warn_non_finite(step: u64, scalars: &[(&str, f32)]) {
    for (name, value) in scalars {
        if !value.is_finite() {
            tracing::warn!("Step {}: {} is not finite ({})", step, name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceKind, DiscriminatorConfig, GeneratorConfig};
    use crate::config::FeaturePreprocess;
    use crate::data::{gradient_frame, ImagePair};
    use crate::hooks::RecordingHook;
    use candle_core::DType;
    use candle_nn::{VarBuilder, VarMap};
    use std::collections::HashMap;
    use std::path::Path;
    use tempfile::TempDir;

    fn tiny_config(root: &Path, out: &Path) -> UpscaleConfig {
        let mut config = UpscaleConfig::default_with_root(root);
        config.data.hr_height = 16;
        config.data.hr_width = 16;
        config.data.batch_size = 2;
        config.generator = GeneratorConfig::test();
        config.discriminator = DiscriminatorConfig::test();
        config.training.pretrain_passes = 1;
        config.training.epochs = 1;
        config.training.log_every = 2;
        config.training.image_every_factor = 1;
        config.output.checkpoint_dir = out.join("models");
        config.output.log_dir = out.join("logs");
        config.device.kind = DeviceKind::Cpu;
        config
    }

    fn tiny_extractor() -> FeatureExtractor {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &Device::Cpu);
        FeatureExtractor::from_varbuilder(
            &FeatureExtractorConfig::test(),
            FeaturePreprocess::Torch,
            vb,
        )
        .unwrap()
    }

    fn tiny_batch(config: &UpscaleConfig) -> FrameBatch {
        let pairs: Vec<ImagePair> = (0..2u8)
            .map(|i| ImagePair::from_frame(&gradient_frame(24, 20, i * 40), &config.data, i as u64))
            .collect();
        FrameBatch::from_pairs(&pairs, &Device::Cpu).unwrap()
    }

    fn write_frames(root: &Path, videos: usize, frames: usize) {
        for v in 0..videos {
            let dir = root.join(format!("video_{v}"));
            fs::create_dir_all(&dir).unwrap();
            for f in 0..frames {
                gradient_frame(20, 20, (v * 50 + f) as u8)
                    .save(dir.join(format!("{f:04}.png")))
                    .unwrap();
            }
        }
    }

    fn snapshot(var_map: &VarMap) -> HashMap<String, Vec<f32>> {
        var_map
            .data()
            .lock()
            .unwrap()
            .iter()
            .map(|(name, var)| (name.clone(), var.flatten_all().unwrap().to_vec1().unwrap()))
            .collect()
    }

    fn changed(before: &HashMap<String, Vec<f32>>, after: &HashMap<String, Vec<f32>>, name: &str) -> bool {
        before[name] != after[name]
    }

    // ========================================================================
    // Steps
    // ========================================================================

    #[test]
    fn test_pretrain_step_increments_counter() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path(), dir.path());
        let batch = tiny_batch(&config);
        let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();

        let before = snapshot(trainer.generator().var_map());
        let metrics = trainer.pretrain_step(&batch).unwrap();
        let after = snapshot(trainer.generator().var_map());

        assert_eq!(trainer.state().pretrain_step, 1);
        assert_eq!(trainer.state().train_step, 0);
        assert!(metrics.pixel_loss.is_finite() && metrics.pixel_loss >= 0.0);
        assert!(changed(&before, &after, "output.weight"));
    }

    #[test]
    fn test_adversarial_step_updates_both_networks() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path(), dir.path());
        let batch = tiny_batch(&config);
        let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
        trainer.set_feature_extractor(tiny_extractor());

        let gen_before = snapshot(trainer.generator().var_map());
        let disc_before = snapshot(trainer.discriminator().var_map());
        let metrics = trainer.adversarial_step(&batch).unwrap();

        assert_eq!(trainer.state().train_step, 1);
        assert_eq!(trainer.state().pretrain_step, 0);
        assert!(metrics.discriminator_loss > 0.0);
        assert!(metrics.adversarial_loss > 0.0);
        assert!(metrics.feature_loss >= 0.0);
        assert!(changed(&gen_before, &snapshot(trainer.generator().var_map()), "output.weight"));
        assert!(changed(&disc_before, &snapshot(trainer.discriminator().var_map()), "head.weight"));
    }

    #[test]
    fn test_adversarial_step_needs_extractor() {
        let dir = TempDir::new().unwrap();
        let config = tiny_config(dir.path(), dir.path());
        let batch = tiny_batch(&config);
        let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();

        assert!(matches!(trainer.adversarial_step(&batch), Err(UpscaleError::Config(_))));
        assert_eq!(trainer.state().train_step, 0);
    }

    #[test]
    fn test_patch_labels_check() {
        let labels = PatchLabels::new(16, 16);
        assert_eq!(labels.shape(), (1, 1, 1));

        let ok = Tensor::zeros((2, 1, 1, 1), DType::F32, &Device::Cpu).unwrap();
        assert!(labels.check(&ok).is_ok());

        let bad = Tensor::zeros((2, 1, 2, 1), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(labels.check(&bad), Err(UpscaleError::ShapeMismatch { .. })));
    }

    // ========================================================================
    // Full protocol
    // ========================================================================

    #[test]
    fn test_train_without_extractor_fails_before_any_step() {
        let dir = TempDir::new().unwrap();
        write_frames(&dir.path().join("frames"), 1, 2);
        let config = tiny_config(&dir.path().join("frames"), dir.path());
        let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();

        assert!(matches!(trainer.train(), Err(UpscaleError::Config(_))));
        assert_eq!(trainer.state().pretrain_step, 0);
        assert!(!trainer.checkpoints().exists());
    }

    #[test]
    fn test_train_runs_both_phases_and_hook_once() {
        let dir = TempDir::new().unwrap();
        let frames = dir.path().join("frames");
        write_frames(&frames, 2, 3);
        let config = tiny_config(&frames, dir.path());
        let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
        trainer.set_feature_extractor(tiny_extractor());
        let hook = RecordingHook::new();
        trainer.set_completion_hook(Box::new(hook.clone()));

        let state = trainer.train().unwrap();

        // 6 frames, batch 2
        assert_eq!(state.pretrain_step, 3);
        assert_eq!(state.train_step, 3);
        assert_eq!(state.phase, Phase::Done);
        assert_eq!(hook.calls(), 1);
        assert!(trainer.checkpoints().exists());
        assert_eq!(trainer.checkpoints().read_state().unwrap().state, state);
        assert!(dir.path().join("logs").join("pretrain").is_dir());
        assert!(dir.path().join("logs").join("train").is_dir());
    }

    #[test]
    fn test_pass_without_a_full_batch_fails() {
        let dir = TempDir::new().unwrap();
        let frames = dir.path().join("frames");
        write_frames(&frames, 1, 1);
        let mut config = tiny_config(&frames, dir.path());
        config.training.epochs = 0;
        let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();

        assert!(matches!(trainer.train(), Err(UpscaleError::Training(_))));
    }

    #[test]
    fn test_resume_loads_weights() {
        let dir = TempDir::new().unwrap();
        let frames = dir.path().join("frames");
        write_frames(&frames, 1, 2);
        let mut config = tiny_config(&frames, dir.path());
        config.training.epochs = 0;

        let mut first = Trainer::with_device(config.clone(), Device::Cpu).unwrap();
        first.train().unwrap();
        let saved = snapshot(first.generator().var_map());

        config.training.pretrain_passes = 0;
        config.training.resume = true;
        let mut second = Trainer::with_device(config, Device::Cpu).unwrap();
        let state = second.train().unwrap();

        assert_eq!(state.pretrain_step, 0);
        assert_eq!(snapshot(second.generator().var_map()), saved);
    }
}
