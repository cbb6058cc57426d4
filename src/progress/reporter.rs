//! Progress reporter implementation
//!
//! Remote trees are copied while they are walked, so totals are unknown up
//! front. The reporter therefore shows a spinner with running counts rather
//! than a bar with an ETA.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Longest path shown next to the spinner
const MAX_DISPLAY_PATH: usize = 60;

/// Progress reporter for copy operations
pub struct ProgressReporter {
    /// Spinner line
    status: ProgressBar,
    /// Start time
    start_time: Instant,
    /// Bytes copied so far
    bytes_copied: AtomicU64,
    /// Files copied so far
    files_copied: AtomicU64,
    /// Is progress enabled
    enabled: AtomicBool,
}

impl ProgressReporter {
    /// Create a new progress reporter drawing to stderr
    pub fn new() -> Self {
        let status = ProgressBar::new_spinner();
        status.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        status.enable_steady_tick(Duration::from_millis(120));

        Self {
            status,
            start_time: Instant::now(),
            bytes_copied: AtomicU64::new(0),
            files_copied: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.enabled.store(false, Ordering::SeqCst);
        reporter.status.disable_steady_tick();
        reporter.status.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Show the file currently being copied
    pub fn set_current_file(&self, path: &str) {
        let display = if path.len() > MAX_DISPLAY_PATH {
            let mut start = path.len() - (MAX_DISPLAY_PATH - 3);
            while !path.is_char_boundary(start) {
                start += 1;
            }
            format!("...{}", &path[start..])
        } else {
            path.to_string()
        };

        self.status.set_message(format!(
            "{} files, {} | {}",
            self.files_copied.load(Ordering::Relaxed),
            humansize::format_size(self.bytes_copied.load(Ordering::Relaxed), humansize::BINARY),
            display
        ));
    }

    /// Increment bytes copied
    pub fn increment_bytes(&self, bytes: u64) {
        self.bytes_copied.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Increment files copied
    pub fn increment_files(&self, count: u64) {
        self.files_copied.fetch_add(count, Ordering::Relaxed);
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get current throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let bytes = self.bytes_copied.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            bytes as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.status.abandon_with_message(format!("✗ {}", message));
    }

    /// Check if progress is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Get progress summary
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            bytes_copied: self.bytes_copied.load(Ordering::Relaxed),
            files_copied: self.files_copied.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            throughput: self.throughput(),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress summary
#[derive(Debug, Clone)]
pub struct ProgressSummary {
    /// Bytes copied so far
    pub bytes_copied: u64,
    /// Files copied so far
    pub files_copied: u64,
    /// Elapsed time
    pub elapsed: Duration,
    /// Throughput in bytes/second
    pub throughput: f64,
}

impl ProgressSummary {
    /// Print summary to console
    pub fn print(&self) {
        println!("Files:    {}", self.files_copied);
        println!("Bytes:    {}", humansize::format_size(self.bytes_copied, humansize::BINARY));
        println!("Elapsed:  {:.1?}", self.elapsed);
        println!(
            "Speed:    {}/s",
            humansize::format_size(self.throughput as u64, humansize::BINARY)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter() {
        let reporter = ProgressReporter::disabled();
        assert!(!reporter.is_enabled());

        reporter.increment_bytes(500);
        reporter.increment_files(5);
        reporter.set_current_file("/some/file.txt");

        let summary = reporter.summary();
        assert_eq!(summary.bytes_copied, 500);
        assert_eq!(summary.files_copied, 5);
    }

    #[test]
    fn test_long_paths_are_truncated() {
        let reporter = ProgressReporter::disabled();
        let long = format!("/{}", "é".repeat(80));
        reporter.set_current_file(&long);
        reporter.finish_success("done");
    }
}
