//! Terminal progress reporting via indicatif.
//!
//! The walk phase gets a spinner (total unknown), the fingerprint and
//! resolve phases get bars. Updates are rate-limited: the spinner ticks on
//! a steady timer and bar positions are only redrawn by indicatif's own
//! draw throttle, so a million tiny files do not turn into a million
//! terminal writes.

use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Callback interface for pipeline progress.
///
/// Implemented by [`Progress`] for terminals and by test doubles in the
/// suite.
pub trait ProgressCallback: Send + Sync {
    /// A phase began; `total` is 0 when unknown.
    fn on_phase_start(&self, phase: &str, total: u64);

    /// One item finished within the current phase.
    fn on_item(&self, phase: &str, detail: &str);

    /// A phase finished.
    fn on_phase_end(&self, phase: &str);
}

/// No-op callback for quiet mode and tests.
#[derive(Debug, Default)]
pub struct SilentProgress;

impl ProgressCallback for SilentProgress {
    fn on_phase_start(&self, _phase: &str, _total: u64) {}
    fn on_item(&self, _phase: &str, _detail: &str) {}
    fn on_phase_end(&self, _phase: &str) {}
}

/// Terminal progress reporter.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

impl Progress {
    /// Create a reporter; `quiet` suppresses all drawing.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            quiet,
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: u64) {
        if self.quiet {
            return;
        }
        let bar = if total == 0 {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(Self::spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            let bar = self.multi.add(ProgressBar::new(total));
            bar.set_style(Self::bar_style());
            bar
        };
        bar.set_message(phase.to_string());
        *self.active.lock().unwrap() = Some(bar);
    }

    fn on_item(&self, _phase: &str, detail: &str) {
        if self.quiet {
            return;
        }
        if let Some(ref bar) = *self.active.lock().unwrap() {
            bar.inc(1);
            bar.set_message(truncate_path(detail, 40));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Some(bar) = self.active.lock().unwrap().take() {
            bar.finish_with_message(format!("{phase} complete"));
        }
    }
}

/// Shorten a path for the message area, keeping the basename.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.len() <= max_len {
        return path.to_string();
    }
    let name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.len() >= max_len {
        format!("...{}", &name[name.len() - max_len + 3..])
    } else {
        format!(".../{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_path_unchanged() {
        assert_eq!(truncate_path("/a/b.txt", 40), "/a/b.txt");
    }

    #[test]
    fn test_truncate_long_path_keeps_basename() {
        let long = "/very/long/path/with/many/components/file.txt";
        assert_eq!(truncate_path(long, 20), ".../file.txt");
    }

    #[test]
    fn test_truncate_long_basename() {
        let long = format!("/d/{}", "x".repeat(60));
        let out = truncate_path(&long, 20);
        assert!(out.starts_with("..."));
        assert_eq!(out.len(), 20);
    }

    #[test]
    fn test_silent_progress_is_callable() {
        let p = SilentProgress;
        p.on_phase_start("walk", 0);
        p.on_item("walk", "/a");
        p.on_phase_end("walk");
    }
}
