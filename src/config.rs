//! Configuration parsing and validation.
//!
//! A training run is described by a single YAML document. Every field except
//! `data.root` has a default matching the reference training setup: 180x320
//! high-resolution frames, batches of 9, Adam at `1e-3` with a 5x faster
//! discriminator, and 10 adversarial epochs after one pretraining pass.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discriminator::Discriminator;
use crate::error::{Result, UpscaleError};

/// Main configuration for a super-resolution training run.
///
/// # Example
///
/// ```rust
/// use upscale_gan_rs::UpscaleConfig;
///
/// # fn main() -> upscale_gan_rs::Result<()> {
/// let mut config = UpscaleConfig::default_with_root("data/REDS_VTSR/train/train_30fps");
/// config.training.epochs = 2;
/// config.validate()?;
/// assert_eq!(config.data.lr_height(), 90);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpscaleConfig {
    /// Frame source and batching.
    pub data: DataConfig,

    /// Generator architecture.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Discriminator architecture.
    #[serde(default)]
    pub discriminator: DiscriminatorConfig,

    /// Perceptual feature extractor.
    #[serde(default)]
    pub feature: FeatureConfig,

    /// Loss weighting.
    #[serde(default)]
    pub loss: LossConfig,

    /// Optimizer hyperparameters.
    #[serde(default)]
    pub optimizer: OptimizerSettings,

    /// Training schedule.
    #[serde(default)]
    pub training: TrainingConfig,

    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,

    /// Device selection.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Action taken once training is done.
    #[serde(default)]
    pub on_complete: CompletionAction,

    /// Random seed for frame shuffling and augmentation.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    42
}

/// How the high-resolution view is taken from a decoded frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HrSampling {
    /// Resize the whole frame to the HR size.
    #[default]
    Resize,
    /// Take a uniformly random HR-sized crop.
    RandomCrop,
}

/// Data pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root directory holding one subdirectory per video.
    pub root: PathBuf,

    /// High-resolution frame height.
    #[serde(default = "default_hr_height")]
    pub hr_height: usize,

    /// High-resolution frame width.
    #[serde(default = "default_hr_width")]
    pub hr_width: usize,

    /// Upscale factor. Only 2 is supported.
    #[serde(default = "default_scale")]
    pub scale: usize,

    /// Image pairs per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// HR sampling mode.
    #[serde(default)]
    pub sampling: HrSampling,

    /// Flip pairs horizontally with probability 0.5.
    #[serde(default)]
    pub random_flip: bool,

    /// Drop a trailing batch smaller than `batch_size`.
    #[serde(default = "default_true")]
    pub drop_last: bool,
}

fn default_hr_height() -> usize {
    360 / 2
}
fn default_hr_width() -> usize {
    640 / 2
}
fn default_scale() -> usize {
    2
}
fn default_batch_size() -> usize {
    9
}
fn default_true() -> bool {
    true
}

impl DataConfig {
    /// Create a data config for `root` with default sizes.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            hr_height: default_hr_height(),
            hr_width: default_hr_width(),
            scale: default_scale(),
            batch_size: default_batch_size(),
            sampling: HrSampling::default(),
            random_flip: false,
            drop_last: true,
        }
    }

    /// Low-resolution frame height.
    pub fn lr_height(&self) -> usize {
        self.hr_height / self.scale
    }

    /// Low-resolution frame width.
    pub fn lr_width(&self) -> usize {
        self.hr_width / self.scale
    }
}

/// Generator architecture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Channel width of the entry, residual and post-residual convolutions.
    #[serde(default = "default_filters")]
    pub filters: usize,

    /// Number of inverted residual blocks.
    #[serde(default = "default_num_blocks")]
    pub num_blocks: usize,

    /// Channel expansion factor inside blocks 1..num_blocks.
    #[serde(default = "default_expansion")]
    pub expansion: usize,

    /// Width multiplier applied to projection filters.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Channels produced by the transposed-convolution upsampler.
    #[serde(default = "default_filters")]
    pub upsample_filters: usize,
}

fn default_filters() -> usize {
    32
}
fn default_num_blocks() -> usize {
    6
}
fn default_expansion() -> usize {
    6
}
fn default_alpha() -> f64 {
    1.0
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            filters: default_filters(),
            num_blocks: default_num_blocks(),
            expansion: default_expansion(),
            alpha: default_alpha(),
            upsample_filters: default_filters(),
        }
    }
}

impl GeneratorConfig {
    /// Minimal configuration for unit tests.
    pub fn test() -> Self {
        Self {
            filters: 8,
            num_blocks: 2,
            expansion: 2,
            alpha: 1.0,
            upsample_filters: 8,
        }
    }
}

/// Discriminator architecture settings.
///
/// The block layout is fixed (eight blocks, four of them stride 2); only the
/// channel width is configurable. Blocks 5-8 use twice `base_filters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    /// Filters of the first four blocks.
    #[serde(default = "default_filters")]
    pub base_filters: usize,

    /// LeakyReLU negative slope.
    #[serde(default = "default_leaky_slope")]
    pub leaky_slope: f64,
}

fn default_leaky_slope() -> f64 {
    0.2
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            base_filters: default_filters(),
            leaky_slope: default_leaky_slope(),
        }
    }
}

impl DiscriminatorConfig {
    /// Minimal configuration for unit tests.
    pub fn test() -> Self {
        Self {
            base_filters: 4,
            leaky_slope: default_leaky_slope(),
        }
    }
}

/// Input normalization expected by the feature extractor weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeaturePreprocess {
    /// torchvision: scale to [0, 1], subtract ImageNet mean, divide by std.
    #[default]
    Torch,
    /// Keras/Caffe: RGB to BGR and subtract the per-channel pixel mean.
    Caffe,
}

/// Perceptual feature extractor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Safetensors file with VGG19 `features.*` weights.
    #[serde(default)]
    pub weights: Option<PathBuf>,

    /// Preprocessing matching the weights.
    #[serde(default)]
    pub preprocess: FeaturePreprocess,

    /// Feature maps are divided by this before the MSE.
    #[serde(default = "default_feature_scale")]
    pub feature_scale: f64,
}

fn default_feature_scale() -> f64 {
    12.75
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            weights: None,
            preprocess: FeaturePreprocess::default(),
            feature_scale: default_feature_scale(),
        }
    }
}

/// Pixel distance used by a pixel loss term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLossKind {
    /// Mean squared error.
    #[default]
    Mse,
    /// Mean absolute error.
    Mae,
}

/// Value range the pixel loss is computed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelDomain {
    /// Training range [-1, 1].
    #[default]
    Normalized,
    /// De-normalized [0, 255].
    Denormalized,
}

/// One pixel loss term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelLossConfig {
    /// Distance.
    #[serde(default)]
    pub kind: PixelLossKind,
    /// Value range.
    #[serde(default)]
    pub domain: PixelDomain,
}

/// Loss weighting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossConfig {
    /// Factor applied to the generator's adversarial BCE term.
    #[serde(default = "default_adversarial_weight")]
    pub adversarial_weight: f64,

    /// Pixel loss used during pretraining.
    #[serde(default)]
    pub pretrain_pixel: PixelLossConfig,

    /// Pixel loss used during adversarial training.
    #[serde(default)]
    pub adversarial_pixel: PixelLossConfig,
}

fn default_adversarial_weight() -> f64 {
    1e-3
}

impl Default for LossConfig {
    fn default() -> Self {
        Self {
            adversarial_weight: default_adversarial_weight(),
            pretrain_pixel: PixelLossConfig::default(),
            adversarial_pixel: PixelLossConfig::default(),
        }
    }
}

/// Adam hyperparameters plus the exponential decay schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Initial generator learning rate.
    #[serde(default = "default_lr")]
    pub learning_rate: f64,

    /// Discriminator learning rate multiplier (two time-scale update rule).
    #[serde(default = "default_disc_multiplier")]
    pub disc_lr_multiplier: f64,

    /// Adam beta1.
    #[serde(default = "default_beta1")]
    pub beta1: f64,

    /// Adam beta2.
    #[serde(default = "default_beta2")]
    pub beta2: f64,

    /// Adam epsilon.
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Steps per decay period.
    #[serde(default = "default_decay_steps")]
    pub decay_steps: u64,

    /// Multiplicative decay per period.
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Decay in whole periods instead of continuously.
    #[serde(default = "default_true")]
    pub staircase: bool,
}

fn default_lr() -> f64 {
    1e-3
}
fn default_disc_multiplier() -> f64 {
    5.0
}
fn default_beta1() -> f64 {
    0.9
}
fn default_beta2() -> f64 {
    0.999
}
fn default_eps() -> f64 {
    1e-7
}
fn default_decay_steps() -> u64 {
    100_000
}
fn default_decay_rate() -> f64 {
    0.95
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            learning_rate: default_lr(),
            disc_lr_multiplier: default_disc_multiplier(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            eps: default_eps(),
            decay_steps: default_decay_steps(),
            decay_rate: default_decay_rate(),
            staircase: true,
        }
    }
}

impl OptimizerSettings {
    /// Initial discriminator learning rate.
    pub fn disc_learning_rate(&self) -> f64 {
        self.learning_rate * self.disc_lr_multiplier
    }
}

/// Training schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Full passes of generator-only pretraining (0 skips the phase).
    #[serde(default = "default_pretrain_passes")]
    pub pretrain_passes: usize,

    /// Adversarial epochs.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Log scalars and checkpoint every N steps.
    #[serde(default = "default_log_every")]
    pub log_every: u64,

    /// Images are logged every `log_every * image_every_factor` steps.
    #[serde(default = "default_image_factor")]
    pub image_every_factor: u64,

    /// Load existing checkpoints before training.
    #[serde(default)]
    pub resume: bool,
}

fn default_pretrain_passes() -> usize {
    1
}
fn default_epochs() -> usize {
    10
}
fn default_log_every() -> u64 {
    200
}
fn default_image_factor() -> u64 {
    10
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            pretrain_passes: default_pretrain_passes(),
            epochs: default_epochs(),
            log_every: default_log_every(),
            image_every_factor: default_image_factor(),
            resume: false,
        }
    }
}

impl TrainingConfig {
    /// Step interval for sample images.
    pub fn image_every(&self) -> u64 {
        self.log_every.saturating_mul(self.image_every_factor)
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory holding the two checkpoint files.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Directory holding the `pretrain/` and `train/` event streams.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("upscale_2_times_logs")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: default_checkpoint_dir(),
            log_dir: default_log_dir(),
        }
    }
}

/// Compute device kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// CPU.
    Cpu,
    /// CUDA GPU, falling back to CPU when unavailable.
    #[default]
    Cuda,
}

/// Advisory per-phase device memory budget, in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryBudgetConfig {
    /// Budget for generator pretraining.
    pub pretrain_mib: u64,
    /// Budget for adversarial training.
    pub train_mib: u64,
}

/// Device selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device kind.
    #[serde(default)]
    pub kind: DeviceKind,

    /// CUDA ordinal.
    #[serde(default)]
    pub cuda_index: usize,

    /// Optional memory budget.
    #[serde(default)]
    pub memory: Option<MemoryBudgetConfig>,
}

/// What to do after the last epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionAction {
    /// Nothing.
    #[default]
    None,
    /// Power off the host.
    Shutdown,
}

impl UpscaleConfig {
    /// Default configuration reading frames from `root`.
    pub fn default_with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            data: DataConfig::with_root(root),
            generator: GeneratorConfig::default(),
            discriminator: DiscriminatorConfig::default(),
            feature: FeatureConfig::default(),
            loss: LossConfig::default(),
            optimizer: OptimizerSettings::default(),
            training: TrainingConfig::default(),
            output: OutputConfig::default(),
            device: DeviceConfig::default(),
            on_complete: CompletionAction::None,
            seed: default_seed(),
        }
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpscaleError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let data = &self.data;
        if data.root.as_os_str().is_empty() {
            return Err(UpscaleError::config("data.root is required"));
        }
        if data.scale != 2 {
            return Err(UpscaleError::config(format!(
                "data.scale must be 2 (the generator has a single 2x upsampling stage), got {}",
                data.scale
            )));
        }
        if data.batch_size == 0 {
            return Err(UpscaleError::config("data.batch_size must be > 0"));
        }
        if data.hr_height == 0 || data.hr_width == 0 {
            return Err(UpscaleError::config("data.hr_height and data.hr_width must be > 0"));
        }
        if data.hr_height % data.scale != 0 || data.hr_width % data.scale != 0 {
            return Err(UpscaleError::config(format!(
                "HR size {}x{} is not divisible by scale {}",
                data.hr_width, data.hr_height, data.scale
            )));
        }
        // Batch norm's unbiased running variance needs two values per channel.
        let (_, patch_h, patch_w) = Discriminator::patch_shape(data.hr_height, data.hr_width);
        if data.batch_size * patch_h * patch_w < 2 {
            return Err(UpscaleError::config(format!(
                "batch_size {} with HR size {}x{} leaves one value per channel in the \
                 discriminator's last batch norm; use batch_size >= 2 or a larger HR size",
                data.batch_size, data.hr_width, data.hr_height
            )));
        }

        if self.generator.filters == 0 || self.generator.expansion == 0 {
            return Err(UpscaleError::config(
                "generator.filters and generator.expansion must be > 0",
            ));
        }
        if self.discriminator.base_filters == 0 {
            return Err(UpscaleError::config("discriminator.base_filters must be > 0"));
        }
        if self.feature.feature_scale <= 0.0 {
            return Err(UpscaleError::config("feature.feature_scale must be > 0"));
        }

        let opt = &self.optimizer;
        if opt.learning_rate <= 0.0 || opt.disc_lr_multiplier <= 0.0 {
            return Err(UpscaleError::config(
                "optimizer.learning_rate and optimizer.disc_lr_multiplier must be > 0",
            ));
        }
        if opt.decay_steps == 0 {
            return Err(UpscaleError::config("optimizer.decay_steps must be > 0"));
        }

        if self.training.log_every == 0 || self.training.image_every_factor == 0 {
            return Err(UpscaleError::config(
                "training.log_every and training.image_every_factor must be > 0",
            ));
        }

        Ok(())
    }
}
