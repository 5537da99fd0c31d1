//! Actions run once training reaches its final state.

use std::process::Command;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, UpscaleError};

/// Invoked exactly once, after the final checkpoint is written.
pub trait CompletionHook: Send {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Run the action.
    fn on_complete(&mut self) -> Result<()>;
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl CompletionHook for NoopHook {
    fn name(&self) -> &str {
        "noop"
    }

    fn on_complete(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Powers off the host after a grace period.
#[derive(Debug, Clone)]
pub struct ShutdownHook {
    delay: Duration,
}

impl ShutdownHook {
    /// Grace period before the shutdown command runs.
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(10);

    /// Shut down after `delay`.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Host command and arguments.
    pub fn command() -> (&'static str, &'static [&'static str]) {
        if cfg!(windows) {
            ("shutdown", &["/p", "/f"])
        } else {
            ("shutdown", &["-h", "now"])
        }
    }
}

impl Default for ShutdownHook {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DELAY)
    }
}

impl CompletionHook for ShutdownHook {
    fn name(&self) -> &str {
        "shutdown"
    }

    fn on_complete(&mut self) -> Result<()> {
        let (program, args) = Self::command();
        tracing::warn!(
            "Training complete; running `{} {}` in {}s",
            program,
            args.join(" "),
            self.delay.as_secs()
        );
        std::thread::sleep(self.delay);

        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| UpscaleError::Hook(format!("Failed to run {}: {}", program, e)))?;
        if !status.success() {
            return Err(UpscaleError::Hook(format!("{} exited with {}", program, status)));
        }
        Ok(())
    }
}

/// Counts invocations; clones share the count.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingHook {
    calls: Arc<AtomicUsize>,
}

#[cfg(test)]
impl RecordingHook {
    /// New hook with a zero count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Times the hook has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl CompletionHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_complete(&mut self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
