//! Generator and discriminator loss terms.
//!
//! Every function returns a scalar tensor that stays on the autograd graph.

use candle_core::Tensor;

use crate::config::{PixelDomain, PixelLossConfig, PixelLossKind};
use crate::error::Result;
use crate::vgg::FeatureExtractor;

/// Probability clamp used by [`binary_cross_entropy`].
pub const BCE_EPSILON: f64 = 1e-7;

/// Pixel distance between `hr` and `sr`, both in [-1, 1].
pub fn pixel_loss(config: PixelLossConfig, hr: &Tensor, sr: &Tensor) -> Result<Tensor> {
    let (hr, sr) = match config.domain {
        PixelDomain::Normalized => (hr.clone(), sr.clone()),
        PixelDomain::Denormalized => (denormalize(hr)?, denormalize(sr)?),
    };
    let loss = match config.kind {
        PixelLossKind::Mse => candle_nn::loss::mse(&sr, &hr)?,
        PixelLossKind::Mae => (sr - hr)?.abs()?.mean_all()?,
    };
    Ok(loss)
}

/// MSE between scaled extractor features of `hr` and `sr`.
pub fn feature_loss(
    extractor: &FeatureExtractor,
    hr: &Tensor,
    sr: &Tensor,
    feature_scale: f64,
) -> Result<Tensor> {
    let hr_features = (extractor.extract(&hr.detach())? / feature_scale)?;
    let sr_features = (extractor.extract(sr)? / feature_scale)?;
    Ok(candle_nn::loss::mse(&sr_features, &hr_features)?)
}

/// Mean binary cross-entropy of probabilities `pred` against `target`.
pub fn binary_cross_entropy(target: &Tensor, pred: &Tensor) -> Result<Tensor> {
    let p = pred.clamp(BCE_EPSILON as f32, (1.0 - BCE_EPSILON) as f32)?;
    let pos = (target * p.log()?)?;
    let neg = (target.affine(-1.0, 1.0)? * p.affine(-1.0, 1.0)?.log()?)?;
    Ok((pos + neg)?.mean_all()?.neg()?)
}

/// Weighted BCE of the discriminator's verdict on generated images against
/// "real" labels.
pub fn adversarial_loss(fake_pred: &Tensor, weight: f64) -> Result<Tensor> {
    let real = fake_pred.ones_like()?;
    Ok((binary_cross_entropy(&real, fake_pred)? * weight)?)
}

/// BCE(real, D(hr)) + BCE(fake, D(G(lr))).
pub fn discriminator_loss(real_pred: &Tensor, fake_pred: &Tensor) -> Result<Tensor> {
    let valid = binary_cross_entropy(&real_pred.ones_like()?, real_pred)?;
    let fake = binary_cross_entropy(&fake_pred.zeros_like()?, fake_pred)?;
    Ok((valid + fake)?)
}

/// The generator's composite loss and its parts.
#[derive(Debug, Clone)]
pub struct GeneratorLoss {
    /// feature + adversarial + pixel.
    pub total: Tensor,
    /// Perceptual term.
    pub feature: Tensor,
    /// Weighted adversarial term.
    pub adversarial: Tensor,
    /// Pixel term.
    pub pixel: Tensor,
}

impl GeneratorLoss {
    /// Sum the three terms.
    pub fn new(feature: Tensor, adversarial: Tensor, pixel: Tensor) -> Result<Self> {
        let total = ((&feature + &adversarial)? + &pixel)?;
        Ok(Self {
            total,
            feature,
            adversarial,
            pixel,
        })
    }
}

fn denormalize(xs: &Tensor) -> Result<Tensor> {
    Ok(((xs + 1.0)? * 127.5)?)
}
