//! Frame index construction.
//!
//! The training set is a directory tree `root/<video>/<frame>`. Each pass over
//! the data starts by shuffling the video directories and flattening their
//! frames into one ordered list. Frames of a video stay contiguous and in
//! name order; only the order of videos changes between passes.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, UpscaleError};

/// Shuffled list of video directories and their flattened frame paths.
#[derive(Debug, Clone)]
pub struct FrameIndex {
    videos: Vec<PathBuf>,
    frames: Vec<PathBuf>,
}

impl FrameIndex {
    /// Build an index over `root`, shuffling videos with `rng`.
    ///
    /// # Errors
    ///
    /// Fails if `root` or any video directory cannot be read, or if the tree
    /// holds no frames at all.
    pub fn build<R: Rng + ?Sized>(root: &Path, rng: &mut R) -> Result<Self> {
        let mut videos = list_video_dirs(root)?;
        videos.shuffle(rng);

        let mut frames = Vec::new();
        for video in &videos {
            frames.extend(list_frames(video)?);
        }

        if frames.is_empty() {
            return Err(UpscaleError::dataset(format!(
                "no frames found under {}",
                root.display()
            )));
        }

        tracing::debug!(
            "Indexed {} frames across {} videos in {}",
            frames.len(),
            videos.len(),
            root.display()
        );

        Ok(Self { videos, frames })
    }

    /// Build the index for a numbered pass over the data.
    ///
    /// Pass 0 is pretraining and pass `e + 1` is adversarial epoch `e`. The
    /// shuffle is reseeded from `seed + pass`, so each pass gets a fresh video
    /// order that is reproducible for a given seed.
    pub fn build_for_pass(root: &Path, seed: u64, pass: u64) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(pass));
        Self::build(root, &mut rng)
    }

    /// Video directories in shuffled order.
    pub fn videos(&self) -> &[PathBuf] {
        &self.videos
    }

    /// Frame paths in training order.
    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }

    /// Consume the index, returning the frame paths.
    pub fn into_frames(self) -> Vec<PathBuf> {
        self.frames
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the index has no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

fn list_video_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(UpscaleError::dataset(format!(
            "frame root {} is not a directory",
            root.display()
        )));
    }

    let mut videos = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            videos.push(entry.path());
        }
    }

    if videos.is_empty() {
        return Err(UpscaleError::dataset(format!(
            "no video directories under {}",
            root.display()
        )));
    }

    // read_dir order is platform dependent; sort so the seed alone decides the shuffle.
    videos.sort();
    Ok(videos)
}

fn list_frames(video: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(video)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            frames.push(entry.path());
        }
    }
    frames.sort();
    Ok(frames)
}
