//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use upscale_gan_rs::{CompletionHook, Result};

/// Synthetic horizontal/vertical gradient frame.
pub fn gradient_frame(width: u32, height: u32, phase: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            phase,
        ])
    })
}

/// Completion hook that counts its invocations; clones share the count.
#[derive(Debug, Clone, Default)]
pub struct RecordingHook {
    calls: Arc<AtomicUsize>,
}

impl RecordingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_complete(&mut self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
