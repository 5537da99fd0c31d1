//! Advisory memory estimates for each training phase.
//!
//! Candle allocates device memory on demand, so nothing here limits or
//! manages allocations. The estimates are compared against the optional
//! per-phase budget before a phase starts, and a warning is logged when a
//! phase is expected to exceed it.

use crate::config::{DiscriminatorConfig, GeneratorConfig};
use crate::layers::make_divisible;
use crate::vgg::FeatureExtractorConfig;

const F32_BYTES: usize = 4;

/// Estimated device memory for one phase, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryEstimate {
    /// Trainable and frozen weights
    pub parameters: usize,
    /// Gradients plus Adam's two moment buffers
    pub optimizer: usize,
    /// Activations kept for the backward pass
    pub activations: usize,
}

impl MemoryEstimate {
    /// Estimate from element counts.
    ///
    /// `trainable` parameters get gradient and moment buffers; `frozen` ones
    /// (the feature extractor) only occupy their own storage.
    pub fn new(trainable: usize, frozen: usize, activation_elems: usize) -> Self {
        Self {
            parameters: (trainable + frozen) * F32_BYTES,
            optimizer: trainable * 3 * F32_BYTES,
            activations: activation_elems * F32_BYTES,
        }
    }

    /// Total bytes.
    pub fn total(&self) -> usize {
        self.parameters + self.optimizer + self.activations
    }

    /// Human-readable breakdown.
    pub fn format(&self) -> String {
        format!(
            "params {}, optimizer {}, activations {}, total {}",
            format_bytes(self.parameters),
            format_bytes(self.optimizer),
            format_bytes(self.activations),
            format_bytes(self.total())
        )
    }
}

/// Activation elements the generator keeps per sample for an `h x w` input.
pub fn generator_activation_elems(config: &GeneratorConfig, h: usize, w: usize) -> usize {
    let lr = h * w;
    let hr = lr * 4;
    let f = config.filters;
    let out_c = make_divisible(f as f64 * config.alpha, 8);
    let hidden = config.expansion * out_c;

    // conv, bn and activation outputs per layer
    let entry = 3 * f * lr;
    let blocks = (0..config.num_blocks)
        .map(|i| {
            let expanded = if i == 0 { 0 } else { 3 * hidden * lr };
            let width = if i == 0 { f } else { hidden };
            expanded + 3 * width * lr + 2 * out_c * lr
        })
        .sum::<usize>();
    let post = 3 * f * lr;
    let upsample = 2 * config.upsample_filters * hr;
    let output = 2 * 3 * hr;
    entry + blocks + post + upsample + output
}

/// Activation elements the discriminator keeps per sample for an `h x w` input.
pub fn discriminator_activation_elems(config: &DiscriminatorConfig, h: usize, w: usize) -> usize {
    let widths = [1, 1, 1, 1, 2, 2, 2, 2];
    let strides = [1, 2, 1, 2, 1, 2, 1, 2];
    let (mut ph, mut pw) = (h, w);
    let mut total = 0;
    for (mult, stride) in widths.iter().zip(strides) {
        ph = ph.div_ceil(stride);
        pw = pw.div_ceil(stride);
        total += 3 * config.base_filters * mult * ph * pw;
    }
    total + 2 * ph * pw
}

/// Activation elements the feature extractor keeps per sample for an `h x w` input.
pub fn extractor_activation_elems(config: &FeatureExtractorConfig, h: usize, w: usize) -> usize {
    let (mut ph, mut pw) = (h, w);
    let mut total = 3 * h * w;
    for (i, stage) in config.stages.iter().enumerate() {
        if i > 0 {
            ph /= 2;
            pw /= 2;
        }
        total += stage.iter().map(|c| 2 * c * ph * pw).sum::<usize>();
    }
    total
}

/// Compare `estimate` to a budget in MiB, warning when it is exceeded.
///
/// Returns `true` when the estimate fits.
pub fn check_budget(phase: &str, estimate: &MemoryEstimate, budget_mib: u64) -> bool {
    let limit = usize::try_from(budget_mib)
        .unwrap_or(usize::MAX)
        .saturating_mul(1024 * 1024);
    if estimate.total() > limit {
        tracing::warn!(
            "{} memory estimate {} exceeds budget {}; consider a smaller batch size",
            phase,
            format_bytes(estimate.total()),
            format_bytes(limit)
        );
        false
    } else {
        tracing::info!(
            "{} memory estimate: {} (budget {})",
            phase,
            estimate.format(),
            format_bytes(limit)
        );
        true
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_breakdown() {
        let est = MemoryEstimate::new(1000, 500, 2000);
        assert_eq!(est.parameters, 6000);
        assert_eq!(est.optimizer, 12000);
        assert_eq!(est.activations, 8000);
        assert_eq!(est.total(), 26000);
    }

    #[test]
    fn test_budget_check() {
        let est = MemoryEstimate::new(1 << 20, 0, 0);
        // 4 MiB params + 12 MiB optimizer
        assert!(check_budget("pretrain", &est, 16));
        assert!(!check_budget("pretrain", &est, 15));
    }

    #[test]
    fn test_huge_budget_does_not_overflow() {
        let est = MemoryEstimate::new(1 << 20, 0, 0);
        assert!(check_budget("train", &est, u64::MAX));
    }

    #[test]
    fn test_activations_grow_with_resolution() {
        let cfg = GeneratorConfig::default();
        let small = generator_activation_elems(&cfg, 90, 160);
        let large = generator_activation_elems(&cfg, 180, 320);
        assert_eq!(large, small * 4);

        let disc = DiscriminatorConfig::default();
        assert!(discriminator_activation_elems(&disc, 180, 320) > 0);

        let vgg = FeatureExtractorConfig::vgg19();
        assert!(extractor_activation_elems(&vgg, 180, 320) > extractor_activation_elems(&vgg, 90, 160));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
    }
}
