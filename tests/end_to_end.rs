//! End-to-end training runs on synthetic frame directories.

mod common;

use std::fs;
use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use tempfile::TempDir;

use common::{gradient_frame, RecordingHook};
use upscale_gan_rs::checkpoint::{DISCRIMINATOR_FILE, GENERATOR_FILE};
use upscale_gan_rs::config::{
    DeviceKind, DiscriminatorConfig, FeaturePreprocess, GeneratorConfig,
};
use upscale_gan_rs::{
    FeatureExtractor, FeatureExtractorConfig, FrameIndex, Phase, Trainer, UpscaleConfig,
    UpscaleError,
};

/// Write `videos` directories of `frames` PNG frames each.
fn write_frames(root: &Path, videos: usize, frames: usize, size: u32) {
    for v in 0..videos {
        let dir = root.join(format!("{v:03}"));
        fs::create_dir_all(&dir).expect("Failed to create video dir");
        for f in 0..frames {
            gradient_frame(size, size, ((v * 37 + f * 3) % 256) as u8)
                .save(dir.join(format!("{f:08}.png")))
                .expect("Failed to write frame");
        }
    }
}

fn small_config(root: &Path, out: &Path, hr: usize) -> UpscaleConfig {
    let mut config = UpscaleConfig::default_with_root(root);
    config.data.hr_height = hr;
    config.data.hr_width = hr;
    config.data.batch_size = 9;
    config.generator = GeneratorConfig::test();
    config.discriminator = DiscriminatorConfig::test();
    config.training.log_every = 5;
    config.training.image_every_factor = 2;
    config.output.checkpoint_dir = out.join("models");
    config.output.log_dir = out.join("upscale_2_times_logs");
    config.device.kind = DeviceKind::Cpu;
    config
}

fn tiny_extractor() -> FeatureExtractor {
    let var_map = VarMap::new();
    let vb = VarBuilder::from_varmap(&var_map, DType::F32, &Device::Cpu);
    FeatureExtractor::from_varbuilder(&FeatureExtractorConfig::test(), FeaturePreprocess::Torch, vb)
        .expect("Failed to build extractor")
}

#[test]
fn test_pretrain_pass_takes_twenty_updates() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, 3, 60, 64);
    assert_eq!(FrameIndex::build_for_pass(&frames, 42, 0).unwrap().len(), 180);

    let mut config = small_config(&frames, dir.path(), 64);
    config.training.pretrain_passes = 1;
    config.training.epochs = 0;

    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let hook = RecordingHook::new();
    trainer.set_completion_hook(Box::new(hook.clone()));
    let state = trainer.train().unwrap();

    assert_eq!(state.pretrain_step, 20);
    assert_eq!(state.train_step, 0);
    assert_eq!(state.phase, Phase::Done);
    assert_eq!(hook.calls(), 1);

    let models = dir.path().join("models");
    assert!(models.join(GENERATOR_FILE).is_file());
    assert!(models.join(DISCRIMINATOR_FILE).is_file());
    assert!(dir.path().join("upscale_2_times_logs/pretrain").is_dir());
}

#[test]
fn test_full_protocol_counts_steps_per_phase() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, 3, 6, 40);

    let mut config = small_config(&frames, dir.path(), 32);
    config.data.batch_size = 4;
    config.training.pretrain_passes = 1;
    config.training.epochs = 2;
    config.training.log_every = 2;

    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    trainer.set_feature_extractor(tiny_extractor());
    let hook = RecordingHook::new();
    trainer.set_completion_hook(Box::new(hook.clone()));

    let state = trainer.train().unwrap();

    // 18 frames, batch 4, last partial batch dropped
    assert_eq!(state.pretrain_step, 4);
    assert_eq!(state.train_step, 8);
    assert_eq!(state.epoch, 1);
    assert_eq!(hook.calls(), 1);

    let saved = trainer.checkpoints().read_state().unwrap();
    assert_eq!(saved.state.phase, Phase::Done);
    assert_eq!(saved.state.train_step, 8);
    assert!(dir.path().join("upscale_2_times_logs/train").is_dir());
}

#[test]
fn test_missing_frame_root_aborts() {
    let dir = TempDir::new().unwrap();
    let mut config = small_config(&dir.path().join("absent"), dir.path(), 32);
    config.training.epochs = 0;

    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    let hook = RecordingHook::new();
    trainer.set_completion_hook(Box::new(hook.clone()));

    assert!(matches!(trainer.train(), Err(UpscaleError::Dataset(_))));
    assert_eq!(hook.calls(), 0);
}

#[test]
fn test_undecodable_frame_aborts() {
    let dir = TempDir::new().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, 1, 8, 32);
    fs::write(frames.join("000").join("00000000.png"), b"not a png").unwrap();

    let mut config = small_config(&frames, dir.path(), 32);
    config.data.batch_size = 4;
    config.training.epochs = 0;

    let mut trainer = Trainer::with_device(config, Device::Cpu).unwrap();
    assert!(matches!(trainer.train(), Err(UpscaleError::Dataset(_))));
    assert_eq!(trainer.state().pretrain_step, 0);
}
