//! # upscale-gan-rs
//!
//! Adversarial training of a lightweight 2x super-resolution generator for
//! video frames, built on candle.
//!
//! Training runs in two phases. The generator is first pretrained on a pixel
//! loss, then trained against a patch discriminator with a composite loss
//! (VGG feature distance, adversarial BCE and pixel MSE).
//!
//! ## Features
//!
//! - **YAML Configuration** - One file describes data, networks, losses and optimizers
//! - **Video-aware sampling** - Frames stay grouped by video; video order is reshuffled every epoch
//! - **TensorBoard logs** - Loss scalars and sample images via event files
//! - **Checkpoints** - Fixed-name safetensors files, overwritten at each log step
//!
//! ## Quick Start (CLI)
//!
//! ```bash
//! # Write a default configuration
//! upscale-gan init upscale.yaml --root data/train_30fps
//!
//! # Check it
//! upscale-gan validate upscale.yaml
//!
//! # Train
//! upscale-gan train upscale.yaml
//!
//! # Upscale an image with the trained generator
//! upscale-gan upscale upscale.yaml --input frame.png --output frame_2x.png
//! ```
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use upscale_gan_rs::{Trainer, UpscaleConfig};
//!
//! # fn main() -> upscale_gan_rs::Result<()> {
//! let config = UpscaleConfig::from_file("upscale.yaml")?;
//!
//! let mut trainer = Trainer::new(config)?;
//! trainer.train()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Customizing a Run
//!
//! ```rust
//! use upscale_gan_rs::UpscaleConfig;
//!
//! # fn main() -> upscale_gan_rs::Result<()> {
//! let mut config = UpscaleConfig::default_with_root("data/train_30fps");
//! config.data.batch_size = 4;
//! config.training.epochs = 2;
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod device;
pub mod discriminator;
pub mod error;
pub mod frames;
pub mod generator;
pub mod hooks;
pub mod inference;
pub mod layers;
pub mod loss;
pub mod memory;
pub mod optimizer;
pub mod scheduler;
pub mod summary;
pub mod trainer;
pub mod vgg;

pub use checkpoint::CheckpointManager;
pub use config::UpscaleConfig;
pub use data::{FrameBatch, FrameBatches, ImagePair};
pub use discriminator::Discriminator;
pub use error::{Result, UpscaleError};
pub use frames::FrameIndex;
pub use generator::Generator;
pub use hooks::{CompletionHook, NoopHook, ShutdownHook};
pub use inference::Upscaler;
pub use trainer::{Phase, Trainer, TrainingState};
pub use vgg::{FeatureExtractor, FeatureExtractorConfig};
