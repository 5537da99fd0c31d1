//! Image pair loading and batching.
//!
//! Turns an ordered list of frame paths into a lazy, finite stream of
//! `(low-res, high-res)` tensor batches. Both halves of a pair are normalized
//! to `[-1, 1]` and laid out channel-first, matching candle's convolutions.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use image::imageops::{self, FilterType};
use image::RgbImage;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::{DataConfig, HrSampling};
use crate::error::{Result, UpscaleError};

/// One decoded training example in CHW `f32` layout.
#[derive(Debug, Clone)]
pub struct ImagePair {
    /// Low-resolution pixels, `3 * lr_h * lr_w` values in [-1, 1].
    pub lr: Vec<f32>,
    /// High-resolution pixels, `3 * hr_h * hr_w` values in [-1, 1].
    pub hr: Vec<f32>,
    /// Low-resolution `(height, width)`.
    pub lr_size: (usize, usize),
    /// High-resolution `(height, width)`.
    pub hr_size: (usize, usize),
}

impl ImagePair {
    /// Decode `path` and derive the HR/LR pair described by `config`.
    ///
    /// `seed` drives the random crop offset and flip for this sample only.
    pub fn load(path: &Path, config: &DataConfig, seed: u64) -> Result<Self> {
        let frame = image::open(path)
            .map_err(|e| {
                UpscaleError::dataset(format!("failed to decode {}: {e}", path.display()))
            })?
            .to_rgb8();
        Ok(Self::from_frame(&frame, config, seed))
    }

    /// Derive a pair from an already decoded frame.
    pub fn from_frame(frame: &RgbImage, config: &DataConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let (hr_w, hr_h) = (config.hr_width as u32, config.hr_height as u32);

        let mut hr = match config.sampling {
            HrSampling::Resize => resize_exact(frame, hr_w, hr_h),
            HrSampling::RandomCrop => {
                if frame.width() < hr_w || frame.height() < hr_h {
                    resize_exact(frame, hr_w, hr_h)
                } else {
                    let x = rng.gen_range(0..=frame.width() - hr_w);
                    let y = rng.gen_range(0..=frame.height() - hr_h);
                    imageops::crop_imm(frame, x, y, hr_w, hr_h).to_image()
                }
            }
        };

        if config.random_flip && rng.gen_bool(0.5) {
            hr = imageops::flip_horizontal(&hr);
        }

        let (lr_w, lr_h) = (config.lr_width() as u32, config.lr_height() as u32);
        let lr = imageops::resize(&hr, lr_w, lr_h, FilterType::CatmullRom);

        Self {
            lr: normalize_chw(&lr),
            hr: normalize_chw(&hr),
            lr_size: (lr_h as usize, lr_w as usize),
            hr_size: (hr_h as usize, hr_w as usize),
        }
    }
}

fn resize_exact(frame: &RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) {
        frame.clone()
    } else {
        imageops::resize(frame, width, height, FilterType::CatmullRom)
    }
}

/// Convert an RGB image to CHW floats in [-1, 1].
pub fn normalize_chw(img: &RgbImage) -> Vec<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let plane = w * h;
    let mut out = vec![0f32; 3 * plane];
    for (i, px) in img.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = f32::from(px[c]) / 127.5 - 1.0;
        }
    }
    out
}

/// Convert an RGB image to a `(1, 3, h, w)` tensor in [-1, 1].
pub fn image_to_tensor(img: &RgbImage, device: &Device) -> Result<Tensor> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    Ok(Tensor::from_vec(normalize_chw(img), (1, 3, h, w), device)?)
}

/// Convert a `(3, h, w)` tensor in [-1, 1] back to an RGB image.
pub fn tensor_to_image(t: &Tensor) -> Result<RgbImage> {
    let (c, h, w) = t.dims3()?;
    if c != 3 {
        return Err(UpscaleError::shape_mismatch((3, h, w), (c, h, w)));
    }
    let hwc = to_hwc_u8(t)?;
    RgbImage::from_raw(w as u32, h as u32, hwc)
        .ok_or_else(|| UpscaleError::Model("image buffer size mismatch".into()))
}

/// De-normalize a `(3, h, w)` tensor to interleaved RGB bytes.
pub fn to_hwc_u8(t: &Tensor) -> Result<Vec<u8>> {
    let pixels = ((t.clamp(-1f32, 1f32)? + 1.0)? * 127.5)?
        .permute((1, 2, 0))?
        .flatten_all()?
        .to_vec1::<f32>()?;
    Ok(pixels.into_iter().map(|v| v.round() as u8).collect())
}

/// A batch of image pairs as `(N, 3, h, w)` / `(N, 3, 2h, 2w)` tensors.
#[derive(Debug, Clone)]
pub struct FrameBatch {
    /// Low-resolution inputs.
    pub lr: Tensor,
    /// High-resolution targets.
    pub hr: Tensor,
}

impl FrameBatch {
    /// Stack pairs into a batch.
    ///
    /// # Errors
    ///
    /// Returns [`UpscaleError::ShapeMismatch`] if the pairs differ in size.
    pub fn from_pairs(pairs: &[ImagePair], device: &Device) -> Result<Self> {
        let first = pairs
            .first()
            .ok_or_else(|| UpscaleError::dataset("cannot build an empty batch"))?;
        let (lr_h, lr_w) = first.lr_size;
        let (hr_h, hr_w) = first.hr_size;

        let mut lr = Vec::with_capacity(pairs.len() * first.lr.len());
        let mut hr = Vec::with_capacity(pairs.len() * first.hr.len());
        for pair in pairs {
            if pair.lr_size != first.lr_size || pair.hr_size != first.hr_size {
                return Err(UpscaleError::shape_mismatch(
                    (first.lr_size, first.hr_size),
                    (pair.lr_size, pair.hr_size),
                ));
            }
            lr.extend_from_slice(&pair.lr);
            hr.extend_from_slice(&pair.hr);
        }

        let n = pairs.len();
        Ok(Self {
            lr: Tensor::from_vec(lr, (n, 3, lr_h, lr_w), device)?,
            hr: Tensor::from_vec(hr, (n, 3, hr_h, hr_w), device)?,
        })
    }

    /// Number of pairs in the batch.
    pub fn len(&self) -> usize {
        self.lr.dims()[0]
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lazy, finite, single-use stream of batches over a frame list.
///
/// Samples within a batch are decoded in parallel. Per-sample seeds are drawn
/// up front so the output does not depend on thread scheduling.
pub struct FrameBatches {
    paths: std::vec::IntoIter<PathBuf>,
    config: DataConfig,
    device: Device,
    rng: ChaCha8Rng,
    remaining: usize,
}

impl FrameBatches {
    /// Create a pipeline over `paths`.
    pub fn new(paths: Vec<PathBuf>, config: &DataConfig, seed: u64, device: &Device) -> Self {
        let remaining = batch_count(paths.len(), config.batch_size, config.drop_last);
        Self {
            paths: paths.into_iter(),
            config: config.clone(),
            device: device.clone(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            remaining,
        }
    }

    /// Batches still to be produced.
    pub fn len_hint(&self) -> usize {
        self.remaining
    }
}

/// Number of batches `frames` paths produce.
pub fn batch_count(frames: usize, batch_size: usize, drop_last: bool) -> usize {
    if batch_size == 0 {
        0
    } else if drop_last {
        frames / batch_size
    } else {
        frames.div_ceil(batch_size)
    }
}

impl Iterator for FrameBatches {
    type Item = Result<FrameBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let chunk: Vec<PathBuf> = self.paths.by_ref().take(self.config.batch_size).collect();
        let seeds: Vec<u64> = chunk.iter().map(|_| self.rng.gen()).collect();

        let config = &self.config;
        let pairs = chunk
            .par_iter()
            .zip(seeds)
            .map(|(path, seed)| ImagePair::load(path, config, seed))
            .collect::<Result<Vec<_>>>();

        Some(pairs.and_then(|pairs| FrameBatch::from_pairs(&pairs, &self.device)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

/// Synthetic horizontal/vertical gradient frame for smoke tests.
#[cfg(test)]
pub(crate) fn gradient_frame(width: u32, height: u32, phase: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            phase,
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn small_config(root: &Path) -> DataConfig {
        DataConfig {
            hr_height: 16,
            hr_width: 24,
            batch_size: 3,
            ..DataConfig::with_root(root)
        }
    }

    fn write_frames(dir: &Path, count: usize, size: (u32, u32)) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("{i:04}.png"));
                gradient_frame(size.0, size.1, (i * 10) as u8).save(&path).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_pair_shapes_and_range() {
        let config = small_config(Path::new("."));
        let pair = ImagePair::from_frame(&gradient_frame(48, 32, 7), &config, 0);

        assert_eq!(pair.hr_size, (16, 24));
        assert_eq!(pair.lr_size, (8, 12));
        assert_eq!(pair.hr.len(), 3 * 16 * 24);
        assert_eq!(pair.lr.len(), 3 * 8 * 12);
        assert!(pair.hr.iter().chain(&pair.lr).all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_random_crop_is_seeded() {
        let config = DataConfig {
            sampling: HrSampling::RandomCrop,
            random_flip: true,
            ..small_config(Path::new("."))
        };
        let frame = gradient_frame(64, 64, 0);
        let a = ImagePair::from_frame(&frame, &config, 11);
        let b = ImagePair::from_frame(&frame, &config, 11);
        assert_eq!(a.hr, b.hr);
        assert_eq!(a.hr_size, (16, 24));
    }

    #[test]
    fn test_normalize_extremes() {
        let img = RgbImage::from_fn(1, 1, |_, _| Rgb([0, 255, 0]));
        let v = normalize_chw(&img);
        assert_eq!(v, vec![-1.0, 1.0, -1.0]);
    }

    #[test]
    fn test_tensor_image_roundtrip() {
        let img = gradient_frame(6, 4, 200);
        let t = image_to_tensor(&img, &Device::Cpu).unwrap().squeeze(0).unwrap();
        let back = tensor_to_image(&t).unwrap();
        assert_eq!(back.dimensions(), (6, 4));
        assert_eq!(back.as_raw(), img.as_raw());
    }

    #[test]
    fn test_batches_drop_last() {
        let dir = TempDir::new().unwrap();
        let paths = write_frames(dir.path(), 7, (24, 16));
        let config = small_config(dir.path());

        let batches = FrameBatches::new(paths, &config, 0, &Device::Cpu);
        assert_eq!(batches.len_hint(), 2);

        let batches: Vec<_> = batches.collect::<Result<_>>().unwrap();
        assert_eq!(batches.len(), 2);
        for batch in &batches {
            assert_eq!(batch.lr.dims(), &[3, 3, 8, 12]);
            assert_eq!(batch.hr.dims(), &[3, 3, 16, 24]);
        }
    }

    #[test]
    fn test_batches_keep_remainder() {
        let dir = TempDir::new().unwrap();
        let paths = write_frames(dir.path(), 7, (24, 16));
        let config = DataConfig {
            drop_last: false,
            ..small_config(dir.path())
        };

        let sizes: Vec<usize> = FrameBatches::new(paths, &config, 0, &Device::Cpu)
            .map(|b| b.unwrap().len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_unreadable_frame_is_an_error() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("broken.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        let config = DataConfig {
            batch_size: 1,
            ..small_config(dir.path())
        };

        let mut batches = FrameBatches::new(vec![bogus], &config, 0, &Device::Cpu);
        assert!(matches!(batches.next(), Some(Err(UpscaleError::Dataset(_)))));
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(180, 9, true), 20);
        assert_eq!(batch_count(181, 9, true), 20);
        assert_eq!(batch_count(181, 9, false), 21);
        assert_eq!(batch_count(5, 0, false), 0);
    }
}
