//! Compute device selection.

use candle_core::Device;

use crate::config::{DeviceConfig, DeviceKind};

/// Resolve the configured device, falling back to CPU with a warning.
///
/// Setting `UPSCALE_FORCE_CPU=1` overrides a CUDA request.
pub fn select_device(config: &DeviceConfig) -> Device {
    let force_cpu = std::env::var("UPSCALE_FORCE_CPU")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    match config.kind {
        DeviceKind::Cpu => {
            tracing::info!("Training device: CPU");
            Device::Cpu
        }
        DeviceKind::Cuda if force_cpu => {
            tracing::warn!("CPU mode forced via UPSCALE_FORCE_CPU=1; ignoring device.kind = cuda");
            Device::Cpu
        }
        DeviceKind::Cuda if cfg!(feature = "cuda") => {
            match Device::cuda_if_available(config.cuda_index) {
                Ok(device @ Device::Cuda(_)) => {
                    tracing::info!("Training device: CUDA (device {})", config.cuda_index);
                    device
                }
                Ok(_) => {
                    tracing::warn!("CUDA not available; falling back to CPU.");
                    Device::Cpu
                }
                Err(err) => {
                    tracing::warn!("CUDA init failed ({err}); falling back to CPU.");
                    Device::Cpu
                }
            }
        }
        DeviceKind::Cuda => {
            tracing::warn!("CUDA feature disabled; falling back to CPU. Enable with --features cuda.");
            Device::Cpu
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_kind_selects_cpu() {
        let config = DeviceConfig {
            kind: DeviceKind::Cpu,
            ..DeviceConfig::default()
        };
        assert!(select_device(&config).is_cpu());
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_falls_back() {
        assert!(select_device(&DeviceConfig::default()).is_cpu());
    }
}
