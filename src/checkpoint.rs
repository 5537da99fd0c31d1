//! Checkpoint persistence.
//!
//! Both networks are written as safetensors under fixed names in the
//! checkpoint directory, next to a small JSON snapshot of the training
//! counters. Every save overwrites the previous files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::discriminator::Discriminator;
use crate::error::{Result, UpscaleError};
use crate::generator::Generator;
use crate::trainer::TrainingState;

/// Generator weights file name.
pub const GENERATOR_FILE: &str = "generator_upscale_2_times.safetensors";
/// Discriminator weights file name.
pub const DISCRIMINATOR_FILE: &str = "discriminator_upscale_2_times.safetensors";
/// Training counters snapshot file name.
pub const STATE_FILE: &str = "training_state.json";

/// Counters and learning rates recorded with each checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    /// Counters at save time
    pub state: TrainingState,
    /// Next generator learning rate
    pub generator_lr: f64,
    /// Next discriminator learning rate
    pub discriminator_lr: f64,
}

/// Reads and writes the checkpoint files in one directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Manage checkpoints in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Checkpoint directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the generator weights.
    pub fn generator_path(&self) -> PathBuf {
        self.dir.join(GENERATOR_FILE)
    }

    /// Path of the discriminator weights.
    pub fn discriminator_path(&self) -> PathBuf {
        self.dir.join(DISCRIMINATOR_FILE)
    }

    /// Path of the counters snapshot.
    pub fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    /// Whether both weight files exist.
    pub fn exists(&self) -> bool {
        self.generator_path().is_file() && self.discriminator_path().is_file()
    }

    /// Write both networks and the counters snapshot.
    pub fn save(
        &self,
        generator: &Generator,
        discriminator: &Discriminator,
        state: &CheckpointState,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        generator.save(&self.generator_path()).map_err(|e| {
            UpscaleError::Checkpoint(format!("Failed to save generator: {}", e))
        })?;
        discriminator.save(&self.discriminator_path()).map_err(|e| {
            UpscaleError::Checkpoint(format!("Failed to save discriminator: {}", e))
        })?;

        let state_json = serde_json::to_string_pretty(state)?;
        fs::write(self.state_path(), state_json)?;

        tracing::debug!("Saved checkpoint to: {}", self.dir.display());
        Ok(())
    }

    /// Load generator weights.
    pub fn load_generator(&self, generator: &mut Generator) -> Result<()> {
        let path = self.generator_path();
        generator.load(&path).map_err(|e| {
            UpscaleError::Checkpoint(format!("Failed to load {}: {}", path.display(), e))
        })
    }

    /// Load discriminator weights.
    pub fn load_discriminator(&self, discriminator: &mut Discriminator) -> Result<()> {
        let path = self.discriminator_path();
        discriminator.load(&path).map_err(|e| {
            UpscaleError::Checkpoint(format!("Failed to load {}: {}", path.display(), e))
        })
    }

    /// Load both networks.
    pub fn load(&self, generator: &mut Generator, discriminator: &mut Discriminator) -> Result<()> {
        self.load_generator(generator)?;
        self.load_discriminator(discriminator)?;
        tracing::info!("Loaded checkpoint from: {}", self.dir.display());
        Ok(())
    }

    /// Read the counters snapshot.
    pub fn read_state(&self) -> Result<CheckpointState> {
        let state_json = fs::read_to_string(self.state_path()).map_err(|e| {
            UpscaleError::Checkpoint(format!("Failed to read state: {}", e))
        })?;
        Ok(serde_json::from_str(&state_json)?)
    }
}
