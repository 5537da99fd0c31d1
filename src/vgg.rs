//! Frozen VGG feature extractor for the perceptual loss.
//!
//! VGG19 convolutional features up to `block5_conv4` (after its ReLU), with
//! torchvision parameter names (`features.{i}.weight`). Weights loaded from
//! safetensors are plain tensors, so nothing here is ever trained.

use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{conv2d, Conv2d, Conv2dConfig, VarBuilder};

use crate::config::FeaturePreprocess;
use crate::error::{Result, UpscaleError};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];

/// Conv stages; a 2x2 max pool separates consecutive stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureExtractorConfig {
    /// Output channels of each conv, grouped by stage.
    pub stages: Vec<Vec<usize>>,
}

impl FeatureExtractorConfig {
    /// VGG19 truncated after `block5_conv4`.
    pub fn vgg19() -> Self {
        Self {
            stages: vec![
                vec![64, 64],
                vec![128, 128],
                vec![256, 256, 256, 256],
                vec![512, 512, 512, 512],
                vec![512, 512, 512, 512],
            ],
        }
    }

    /// Two-stage extractor for tests.
    pub fn test() -> Self {
        Self {
            stages: vec![vec![4], vec![8]],
        }
    }
}

/// Frozen convolutional feature extractor.
pub struct FeatureExtractor {
    stages: Vec<Vec<Conv2d>>,
    preprocess: FeaturePreprocess,
}

impl FeatureExtractor {
    /// Load VGG19 weights from a safetensors file.
    pub fn load(path: &Path, preprocess: FeaturePreprocess, device: &Device) -> Result<Self> {
        if !path.is_file() {
            return Err(UpscaleError::config(format!(
                "feature extractor weights not found: {}",
                path.display()
            )));
        }
        // SAFETY: the file is only read, and is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device)? };
        let extractor = Self::from_varbuilder(&FeatureExtractorConfig::vgg19(), preprocess, vb)?;
        tracing::info!("Loaded VGG19 feature extractor from {}", path.display());
        Ok(extractor)
    }

    /// Build from any `VarBuilder` holding `features.{i}.{weight,bias}`.
    pub fn from_varbuilder(
        config: &FeatureExtractorConfig,
        preprocess: FeaturePreprocess,
        vb: VarBuilder,
    ) -> Result<Self> {
        if config.stages.iter().all(|s| s.is_empty()) {
            return Err(UpscaleError::Model(
                "feature extractor needs at least one conv".into(),
            ));
        }
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let features = vb.pp("features");

        // torchvision numbering: conv and its ReLU take two slots, a pool one.
        let mut index = 0;
        let mut in_c = 3;
        let mut stages = Vec::with_capacity(config.stages.len());
        for (i, stage) in config.stages.iter().enumerate() {
            if i > 0 {
                index += 1;
            }
            let mut convs = Vec::with_capacity(stage.len());
            for &out_c in stage {
                convs.push(conv2d(in_c, out_c, 3, cfg, features.pp(index.to_string()))?);
                index += 2;
                in_c = out_c;
            }
            stages.push(convs);
        }

        Ok(Self { stages, preprocess })
    }

    /// Preprocessing applied to [-1, 1] inputs.
    pub fn preprocess_mode(&self) -> FeaturePreprocess {
        self.preprocess
    }

    /// Number of scalar weights.
    pub fn parameter_count(&self) -> usize {
        self.stages
            .iter()
            .flatten()
            .map(|c| c.weight().elem_count() + c.bias().map_or(0, |b| b.elem_count()))
            .sum()
    }

    /// Map [-1, 1] RGB images to the extractor's input convention.
    pub fn preprocess(&self, xs: &Tensor) -> Result<Tensor> {
        let device = xs.device();
        let x255 = ((xs + 1.0)? * 127.5)?;
        let out = match self.preprocess {
            FeaturePreprocess::Torch => {
                let mean = Tensor::new(&IMAGENET_MEAN, device)?.reshape((1, 3, 1, 1))?;
                let std = Tensor::new(&IMAGENET_STD, device)?.reshape((1, 3, 1, 1))?;
                (x255 / 255.0)?.broadcast_sub(&mean)?.broadcast_div(&std)?
            }
            FeaturePreprocess::Caffe => {
                let bgr = Tensor::new(&[2u32, 1, 0], device)?;
                let mean = Tensor::new(&CAFFE_MEAN_BGR, device)?.reshape((1, 3, 1, 1))?;
                x255.index_select(&bgr, 1)?.broadcast_sub(&mean)?
            }
        };
        Ok(out)
    }

    /// Features of [-1, 1] images `(N, 3, H, W)`.
    pub fn extract(&self, xs: &Tensor) -> Result<Tensor> {
        let mut h = self.preprocess(xs)?;
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                h = h.max_pool2d(2)?;
            }
            for conv in stage {
                h = conv.forward(&h)?.relu()?;
            }
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_nn::VarMap;

    fn tiny(preprocess: FeaturePreprocess) -> (FeatureExtractor, VarMap) {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, &Device::Cpu);
        let fx = FeatureExtractor::from_varbuilder(&FeatureExtractorConfig::test(), preprocess, vb)
            .unwrap();
        (fx, var_map)
    }

    #[test]
    fn test_torchvision_parameter_names() {
        let (fx, var_map) = tiny(FeaturePreprocess::Torch);
        let data = var_map.data().lock().unwrap();
        assert!(data.contains_key("features.0.weight"));
        assert!(data.contains_key("features.3.weight"));
        assert!(data.contains_key("features.3.bias"));
        assert_eq!(data.len(), 4);
        drop(data);
        assert_eq!(fx.parameter_count(), (3 * 4 * 9 + 4) + (4 * 8 * 9 + 8));
    }

    #[test]
    fn test_feature_shape() {
        let (fx, _) = tiny(FeaturePreprocess::Torch);
        let xs = Tensor::randn(0f32, 0.5, (2, 3, 8, 12), &Device::Cpu).unwrap();
        assert_eq!(fx.extract(&xs).unwrap().dims(), &[2, 8, 4, 6]);
    }

    #[test]
    fn test_torch_preprocess() {
        let (fx, _) = tiny(FeaturePreprocess::Torch);
        let white = Tensor::ones((1, 3, 1, 1), DType::F32, &Device::Cpu).unwrap();
        let v = fx
            .preprocess(&white)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_relative_eq!(v[0], (1.0 - 0.485) / 0.229, epsilon = 1e-5);
        assert_relative_eq!(v[2], (1.0 - 0.406) / 0.225, epsilon = 1e-5);
    }

    #[test]
    fn test_caffe_preprocess_flips_channels() {
        let (fx, _) = tiny(FeaturePreprocess::Caffe);
        // Red channel at full intensity, others black.
        let img = Tensor::new(&[1f32, -1.0, -1.0], &Device::Cpu)
            .unwrap()
            .reshape((1, 3, 1, 1))
            .unwrap();
        let v = fx
            .preprocess(&img)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_relative_eq!(v[0], -103.939, epsilon = 1e-3);
        assert_relative_eq!(v[1], -116.779, epsilon = 1e-3);
        assert_relative_eq!(v[2], 255.0 - 123.68, epsilon = 1e-3);
    }

    #[test]
    fn test_missing_weights_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = FeatureExtractor::load(
            &dir.path().join("vgg19.safetensors"),
            FeaturePreprocess::Torch,
            &Device::Cpu,
        );
        assert!(matches!(result, Err(UpscaleError::Config(_))));
    }
}
