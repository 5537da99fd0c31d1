//! TensorBoard event logging.
//!
//! Pretraining and adversarial training write to separate run directories
//! (`{log_dir}/pretrain` and `{log_dir}/train`) so the two loss curves show
//! up as distinct runs.

use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Tensor;
use tensorboard_rs::summary_writer::SummaryWriter;

use crate::data::to_hwc_u8;
use crate::error::{Result, UpscaleError};

/// Pixel loss scalar tag, used by both phases.
pub const MSE_LOSS: &str = "MSE Loss";
/// Weighted adversarial BCE tag.
pub const ADVERSARIAL_LOSS: &str = "Adversarial Loss";
/// Perceptual loss tag.
pub const FEATURE_LOSS: &str = "Feature Loss";
/// Discriminator loss tag.
pub const DISCRIMINATOR_LOSS: &str = "Discriminator Loss";
/// Low-resolution input image tag.
pub const LOW_RES: &str = "Low Res";
/// High-resolution target image tag.
pub const HIGH_RES: &str = "High Res";
/// Generator output image tag.
pub const GENERATED: &str = "Generated";

/// Event writer for one run directory.
pub struct EventLogger {
    writer: SummaryWriter,
    dir: PathBuf,
}

impl EventLogger {
    /// Open a writer in `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let writer = SummaryWriter::new(&dir);
        tracing::debug!("Writing events to {}", dir.display());
        Ok(Self { writer, dir })
    }

    /// Writer for the pretraining run.
    pub fn pretrain(log_dir: &Path) -> Result<Self> {
        Self::new(log_dir.join("pretrain"))
    }

    /// Writer for the adversarial run.
    pub fn train(log_dir: &Path) -> Result<Self> {
        Self::new(log_dir.join("train"))
    }

    /// Run directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record named scalars at `step`.
    pub fn log_scalars(&mut self, step: u64, scalars: &[(&str, f32)]) {
        for (tag, value) in scalars {
            self.writer.add_scalar(tag, *value, step as usize);
        }
    }

    /// Record the first image of a `(N, 3, h, w)` batch in [-1, 1].
    pub fn log_image(&mut self, tag: &str, batch: &Tensor, step: u64) -> Result<()> {
        let (n, c, h, w) = batch.dims4()?;
        if n == 0 || c != 3 {
            return Err(UpscaleError::shape_mismatch(("N>0", 3, h, w), (n, c, h, w)));
        }
        let pixels = to_hwc_u8(&batch.get(0)?)?;
        self.writer.add_image(tag, &pixels, &image_dims(h, w), step as usize);
        Ok(())
    }

    /// Flush pending events to disk.
    pub fn flush(&mut self) {
        self.writer.flush();
    }
}

/// Dimension slice for `SummaryWriter::add_image` given interleaved RGB bytes.
///
/// tensorboard-rs builds its PNG with `RgbImage::new(dim[1], dim[2])`, so the
/// width goes before the height.
fn image_dims(height: usize, width: usize) -> [usize; 3] {
    [3, width, height]
}
