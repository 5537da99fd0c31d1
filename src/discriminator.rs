//! Patch discriminator.
//!
//! Eight conv blocks (four of them stride 2) followed by a 1x1 conv and a
//! sigmoid, giving one realness score per spatial patch.

use std::path::Path;

use candle_core::{DType, Device, Module, ModuleT, Tensor};
use candle_nn::{BatchNorm, Conv2d, VarBuilder, VarMap};

use crate::config::DiscriminatorConfig;
use crate::error::Result;
use crate::layers::{batch_norm_keras, conv1x1, conv3x3};

/// `(filter multiplier, stride, batch norm)` for each block.
const BLOCKS: [(usize, usize, bool); 8] = [
    (1, 1, false),
    (1, 2, true),
    (1, 1, true),
    (1, 2, true),
    (2, 1, true),
    (2, 2, true),
    (2, 1, true),
    (2, 2, true),
];

const BN_EPS: f64 = 1e-3;
const BN_MOMENTUM: f64 = 0.8;

#[derive(Debug, Clone)]
struct DiscBlock {
    conv: Conv2d,
    bn: Option<BatchNorm>,
}

/// Patch discriminator with its parameters.
pub struct Discriminator {
    blocks: Vec<DiscBlock>,
    head: Conv2d,
    leaky_slope: f64,
    var_map: VarMap,
}

impl Discriminator {
    /// Create a discriminator with freshly initialized parameters.
    pub fn new(config: &DiscriminatorConfig, device: &Device) -> Result<Self> {
        let var_map = VarMap::new();
        let vb = VarBuilder::from_varmap(&var_map, DType::F32, device);
        Self::from_varbuilder(config, vb, var_map)
    }

    /// Create a discriminator from a `VarBuilder` backed by `var_map`.
    pub fn from_varbuilder(
        config: &DiscriminatorConfig,
        vb: VarBuilder,
        var_map: VarMap,
    ) -> Result<Self> {
        let mut blocks = Vec::with_capacity(BLOCKS.len());
        let mut in_c = 3;
        for (i, &(mult, stride, with_bn)) in BLOCKS.iter().enumerate() {
            let out_c = config.base_filters * mult;
            let block_vb = vb.pp(format!("block_{i}"));
            let conv = conv3x3(in_c, out_c, stride, block_vb.pp("conv"))?;
            let bn = if with_bn {
                Some(batch_norm_keras(out_c, BN_EPS, BN_MOMENTUM, block_vb.pp("bn"))?)
            } else {
                None
            };
            blocks.push(DiscBlock { conv, bn });
            in_c = out_c;
        }
        let head = conv1x1(in_c, 1, vb.pp("head"))?;

        Ok(Self {
            blocks,
            head,
            leaky_slope: config.leaky_slope,
            var_map,
        })
    }

    /// Output grid `(1, ⌈h/16⌉, ⌈w/16⌉)` for an `h x w` input.
    pub fn patch_shape(height: usize, width: usize) -> (usize, usize, usize) {
        let (mut h, mut w) = (height, width);
        for &(_, stride, _) in &BLOCKS {
            h = h.div_ceil(stride);
            w = w.div_ceil(stride);
        }
        (1, h, w)
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

    /// Overwrite parameters from a safetensors file.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.var_map.load(path)?;
        Ok(())
    }

    /// Score `(N, 3, H, W)` images, returning `(N, 1, h, w)` in [0, 1].
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        Ok(ModuleT::forward_t(self, xs, train)?)
    }
}

impl ModuleT for Discriminator {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let mut h = xs.clone();
        for block in &self.blocks {
            h = block.conv.forward(&h)?;
            if let Some(bn) = &block.bn {
                h = bn.forward_t(&h, train)?;
            }
            h = candle_nn::ops::leaky_relu(&h, self.leaky_slope)?;
        }
        candle_nn::ops::sigmoid(&self.head.forward(&h)?)
    }
}
