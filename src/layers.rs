//! Convolutional building blocks shared by the generator and discriminator.

use candle_core::{Module, ModuleT, Result, Tensor};
use candle_nn::{
    batch_norm, conv2d, BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Init, PReLU, VarBuilder,
};

/// Round `v` to the nearest multiple of `divisor`, never dropping more than 10%.
pub fn make_divisible(v: f64, divisor: usize) -> usize {
    let divisor_f = divisor as f64;
    let mut new_v = (((v + divisor_f / 2.0) as usize) / divisor * divisor).max(divisor);
    if (new_v as f64) < 0.9 * v {
        new_v += divisor;
    }
    new_v
}

/// 3x3 convolution with "same" padding.
pub fn conv3x3(in_c: usize, out_c: usize, stride: usize, vb: VarBuilder) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        padding: 1,
        stride,
        ..Default::default()
    };
    conv2d(in_c, out_c, 3, cfg, vb)
}

/// 1x1 pointwise convolution.
pub fn conv1x1(in_c: usize, out_c: usize, vb: VarBuilder) -> Result<Conv2d> {
    conv2d(in_c, out_c, 1, Conv2dConfig::default(), vb)
}

/// Batch norm configured from a Keras-style momentum (weight kept on the
/// running statistic), e.g. `0.99` becomes candle's `0.01`.
pub fn batch_norm_keras(
    channels: usize,
    eps: f64,
    keras_momentum: f64,
    vb: VarBuilder,
) -> Result<BatchNorm> {
    let cfg = BatchNormConfig {
        eps,
        remove_mean: true,
        affine: true,
        momentum: 1.0 - keras_momentum,
    };
    batch_norm(channels, cfg, vb)
}

/// Per-channel PReLU with every slope starting at 0, so it begins as a ReLU.
pub fn prelu_zero(channels: usize, vb: VarBuilder) -> Result<PReLU> {
    let weight = vb.get_with_hints(channels, "weight", Init::Const(0.0))?;
    Ok(PReLU::new(weight, false))
}

/// MobileNetV2 inverted residual block: expand → depthwise → project.
///
/// Block 0 skips the expansion. The input is added back whenever the input
/// and projected channel counts match and the stride is 1.
#[derive(Debug, Clone)]
pub struct InvertedResidual {
    expand: Option<(Conv2d, BatchNorm)>,
    depthwise: Conv2d,
    depthwise_bn: BatchNorm,
    project: Conv2d,
    project_bn: BatchNorm,
    use_skip: bool,
}

impl InvertedResidual {
    /// Batch norm epsilon used inside the block.
    pub const BN_EPS: f64 = 1e-3;
    /// Keras-style batch norm momentum used inside the block.
    pub const BN_MOMENTUM: f64 = 0.999;

    /// Build block `block_id` taking `in_c` channels.
    pub fn new(
        in_c: usize,
        filters: usize,
        block_id: usize,
        expansion: usize,
        stride: usize,
        alpha: f64,
        vb: VarBuilder,
    ) -> Result<Self> {
        let out_c = make_divisible(filters as f64 * alpha, 8);
        let vb = vb.pp(format!("block_{block_id}"));

        let (expand, hidden) = if block_id > 0 {
            let hidden = expansion * in_c;
            let conv = conv1x1(in_c, hidden, vb.pp("expand"))?;
            let bn = batch_norm_keras(hidden, Self::BN_EPS, Self::BN_MOMENTUM, vb.pp("expand_bn"))?;
            (Some((conv, bn)), hidden)
        } else {
            (None, in_c)
        };

        let dw_cfg = Conv2dConfig {
            padding: usize::from(stride == 1),
            stride,
            groups: hidden,
            ..Default::default()
        };
        let depthwise = conv2d(hidden, hidden, 3, dw_cfg, vb.pp("depthwise"))?;
        let depthwise_bn =
            batch_norm_keras(hidden, Self::BN_EPS, Self::BN_MOMENTUM, vb.pp("depthwise_bn"))?;

        let project = conv1x1(hidden, out_c, vb.pp("project"))?;
        let project_bn =
            batch_norm_keras(out_c, Self::BN_EPS, Self::BN_MOMENTUM, vb.pp("project_bn"))?;

        Ok(Self {
            expand,
            depthwise,
            depthwise_bn,
            project,
            project_bn,
            use_skip: in_c == out_c && stride == 1,
        })
    }

    /// Whether the block adds its input to its output.
    pub fn has_skip(&self) -> bool {
        self.use_skip
    }
}

impl ModuleT for InvertedResidual {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let mut h = xs.clone();
        if let Some((conv, bn)) = &self.expand {
            h = bn.forward_t(&conv.forward(&h)?, train)?.relu()?;
        }
        h = self
            .depthwise_bn
            .forward_t(&self.depthwise.forward(&h)?, train)?
            .relu()?;
        h = self.project_bn.forward_t(&self.project.forward(&h)?, train)?;

        if self.use_skip {
            xs + h
        } else {
            Ok(h)
        }
    }
}
