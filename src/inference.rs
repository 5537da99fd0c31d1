//! Offline 2x upscaling with a trained generator.

use std::path::Path;

use candle_core::Device;
use image::RgbImage;

use crate::checkpoint::CheckpointManager;
use crate::config::GeneratorConfig;
use crate::data::{image_to_tensor, tensor_to_image};
use crate::error::{Result, UpscaleError};
use crate::generator::Generator;

/// Runs a generator in inference mode on whole images.
pub struct Upscaler {
    generator: Generator,
    device: Device,
}

impl Upscaler {
    /// Wrap an existing generator.
    pub fn new(generator: Generator, device: Device) -> Self {
        Self { generator, device }
    }

    /// Load the generator checkpoint from `checkpoint_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`UpscaleError::Checkpoint`] if the weights are missing or do
    /// not match `config`.
    pub fn load(checkpoint_dir: &Path, config: &GeneratorConfig, device: &Device) -> Result<Self> {
        let mut generator = Generator::new(config, device)?;
        CheckpointManager::new(checkpoint_dir).load_generator(&mut generator)?;
        Ok(Self::new(generator, device.clone()))
    }

    /// Upscale one image to twice its width and height.
    pub fn upscale(&self, img: &RgbImage) -> Result<RgbImage> {
        if img.width() == 0 || img.height() == 0 {
            return Err(UpscaleError::dataset("cannot upscale an empty image"));
        }
        let lr = image_to_tensor(img, &self.device)?;
        let sr = self.generator.forward_t(&lr, false)?;
        tensor_to_image(&sr.get(0)?)
    }

    /// Read `input`, upscale it and write the result to `output`.
    pub fn upscale_file(&self, input: &Path, output: &Path) -> Result<(u32, u32)> {
        let img = image::open(input)?.to_rgb8();
        let sr = self.upscale(&img)?;
        sr.save(output)?;
        tracing::info!(
            "Upscaled {} ({}x{}) to {} ({}x{})",
            input.display(),
            img.width(),
            img.height(),
            output.display(),
            sr.width(),
            sr.height()
        );
        Ok(sr.dimensions())
    }

    /// The wrapped generator.
    pub fn generator(&self) -> &Generator {
        &self.generator
    }
}
