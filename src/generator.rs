//! 2x super-resolution generator.
//!
//! A MobileNet-style network: entry conv, a stack of inverted residual blocks,
//! a post-residual conv merged with the entry features, one transposed-conv
//! upsampler and a tanh output conv. The single upsampling stage fixes the
//! scale factor at 2.

use std::path::Path;

use candle_core::{DType, Device, Module, ModuleT, Tensor};
use candle_nn::{
    conv_transpose2d, BatchNorm, Conv2d, ConvTranspose2d, ConvTranspose2dConfig, PReLU,
    VarBuilder, VarMap,
};

use crate::config::GeneratorConfig;
use crate::error::{Result, UpscaleError};
use crate::layers::{batch_norm_keras, conv3x3, prelu_zero, InvertedResidual};

/// Super-resolution generator with its parameters.
pub struct Generator {
    entry: Conv2d,
    entry_bn: BatchNorm,
    entry_act: PReLU,
    blocks: Vec<InvertedResidual>,
    post: Conv2d,
    post_bn: BatchNorm,
    upsample: ConvTranspose2d,
    upsample_act: PReLU,
    output: Conv2d,
    config: GeneratorConfig,
    var_map: VarMap,
}

impl Generator {
    /// Spatial upscale factor.
    pub const SCALE: usize = 2;

    /// Create a generator with freshly initialized parameters.
    pub fn new(config: &GeneratorConfig, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        Self::from_varbuilder(config, vb, var_map)
    }

    /// Create a generator from a `VarBuilder` backed by `var_map`.
    pub fn from_varbuilder(config: &GeneratorConfig, vb: VarBuilder, var_map: VarMap) -> Result<Self> {
        if config.num_blocks == 0 {
            return Err(UpscaleError::Model(
                "generator needs at least one residual block".into(),
            ));
        }
        let f = config.filters;

        let entry = conv3x3(3, f, 1, vb.pp("entry"))?;
        let entry_bn = batch_norm_keras(f, 1e-3, 0.99, vb.pp("entry_bn"))?;
        let entry_act = prelu_zero(f, vb.pp("entry_prelu"))?;

        let blocks_vb = vb.pp("blocks");
        let mut blocks = Vec::with_capacity(config.num_blocks);
        let mut channels = f;
        for block_id in 0..config.num_blocks {
            let block = InvertedResidual::new(
                channels,
                f,
                block_id,
                config.expansion,
                1,
                config.alpha,
                blocks_vb.clone(),
            )?;
            channels = crate::layers::make_divisible(f as f64 * config.alpha, 8);
            blocks.push(block);
        }

        let post = conv3x3(channels, f, 1, vb.pp("post"))?;
        let post_bn = batch_norm_keras(f, 1e-3, 0.99, vb.pp("post_bn"))?;

        let up_cfg = ConvTranspose2dConfig {
            padding: 1,
            output_padding: 1,
            stride: Self::SCALE,
            dilation: 1,
        };
        let upsample = conv_transpose2d(f, config.upsample_filters, 3, up_cfg, vb.pp("upsample"))?;
        let upsample_act = prelu_zero(config.upsample_filters, vb.pp("upsample_prelu"))?;

        let output = conv3x3(config.upsample_filters, 3, 1, vb.pp("output"))?;

        Ok(Self {
            entry,
            entry_bn,
            entry_act,
            blocks,
            post,
            post_bn,
            upsample,
            upsample_act,
            output,
            config: config.clone(),
            var_map,
        })
    }

    /// Architecture configuration.
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Parameter store (weights and batch norm statistics).
    pub fn var_map(&self) -> &VarMap {
        &self.var_map
    }

    /// Number of scalar parameters, batch norm statistics included.
    pub fn parameter_count(&self) -> usize {
        self.var_map.all_vars().iter().map(|v| v.elem_count()).sum()
    }

    /// Save parameters to a safetensors file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.var_map.save(path)?;
        Ok(())
    }

    /// Overwrite parameters from a safetensors file written by [`Generator::save`].
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.var_map.load(path)?;
        Ok(())
    }

    /// Upscale `(N, 3, h, w)` to `(N, 3, 2h, 2w)` in [-1, 1].
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        Ok(ModuleT::forward_t(self, xs, train)?)
    }
}

impl ModuleT for Generator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let c1 = self
            .entry_act
            .forward(&self.entry_bn.forward_t(&self.entry.forward(xs)?, train)?)?;

        let mut r = c1.clone();
        for block in &self.blocks {
            r = block.forward_t(&r, train)?;
        }

        let c2 = (self.post_bn.forward_t(&self.post.forward(&r)?, train)? + &c1)?;
        let u1 = self.upsample_act.forward(&self.upsample.forward(&c2)?)?;
        self.output.forward(&u1)?.tanh()
    }
}
