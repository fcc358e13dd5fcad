//! Progress reporting infrastructure

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::borrow::Cow;

/// CLI progress report of ongoing operations
///
/// To avoid corrupted terminal output, you should not write anything to stdout
/// or stderr yourself as long as a report is being displayed. Please use logs
/// for debug messages.
#[derive(Clone, Debug, Default)]
pub struct ProgressReport(MultiProgress);
//
impl ProgressReport {
    /// Prepare to report progress on the cli
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that is never displayed
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self(MultiProgress::with_draw_target(
            indicatif::ProgressDrawTarget::hidden(),
        ))
    }

    /// Prepare to report on a new operation
    pub fn add(
        &self,
        what: impl Into<Cow<'static, str>>,
        config: ProgressConfig,
    ) -> ProgressTracker {
        let ProgressConfig {
            work,
            show_rate_eta,
        } = config;
        let bar = ProgressBar::new(work.into()).with_prefix(what);
        let style_header = "{prefix} {wide_bar} ";
        let style_trailer = match (work, show_rate_eta) {
            (Work::Steps(_), false) => "{pos}/{len} {msg}",
            (Work::Steps(_), true) => "{pos}/{len} (~{eta} left) {msg}",
            (Work::Bytes(_), false) => "{decimal_bytes}/{decimal_total_bytes}",
            (Work::Bytes(_), true) => {
                "{decimal_bytes}/{decimal_total_bytes} ({decimal_bytes_per_sec})"
            }
        };
        let bar = bar.with_style(
            ProgressStyle::with_template(&format!("{style_header}{style_trailer}"))
                .expect("all styles above should be valid indicatif styles"),
        );
        let bar = if u64::from(work) > 0 {
            self.0.add(bar)
        } else {
            bar
        };
        ProgressTracker {
            bar,
            report: self.0.clone(),
        }
    }
}

/// Progress bar configuration
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct ProgressConfig {
    /// Length of the progress bar
    work: Work,

    /// Show the completion rate or estimated remaining time, depending on work
    show_rate_eta: bool,
}
//
impl ProgressConfig {
    /// Default configuration, for a known amount of work
    pub fn new(work: Work) -> Self {
        Self {
            work,
            show_rate_eta: true,
        }
    }

    /// Disable tracking of the completion rate
    pub fn dont_show_rate_eta(self) -> Self {
        Self {
            show_rate_eta: false,
            ..self
        }
    }
}

/// Work whose progression that can be tracked
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Work {
    /// Steps to be taken, e.g. cities to be geocoded
    Steps(usize),

    /// Bytes to be downloaded
    Bytes(u64),
}
//
impl From<Work> for u64 {
    fn from(value: Work) -> Self {
        match value {
            Work::Steps(s) => s as u64,
            Work::Bytes(b) => b,
        }
    }
}

/// Mechanism to track progress
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    /// Progress bar for this specific process
    bar: ProgressBar,

    /// Underlying process report
    report: MultiProgress,
}
//
impl ProgressTracker {
    /// Describe the step that is currently being processed
    pub fn set_message(&self, message: impl Into<Cow<'static, str>>) {
        self.bar.set_message(message);
    }

    /// Show that a certain amount of progress has been made
    ///
    /// Returns truth that the progress bar has reached its maximum value, in
    /// which case it is removed from the report.
    pub fn make_progress(&self, progress: u64) -> bool {
        self.bar.inc(progress);
        let finished = self.bar.position() >= self.bar.length().unwrap_or(0);
        if finished {
            self.bar.finish_and_clear();
            self.report.remove(&self.bar);
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_finishes_at_full_length() {
        let report = ProgressReport::hidden();
        let tracker = report.add("Geocoding cities", ProgressConfig::new(Work::Steps(3)));
        assert!(!tracker.make_progress(1));
        tracker.set_message("Santos");
        assert!(!tracker.make_progress(1));
        assert!(tracker.make_progress(1));
    }

    #[test]
    fn byte_trackers_count_bytes() {
        let report = ProgressReport::hidden();
        let tracker = report.add(
            "Downloading",
            ProgressConfig::new(Work::Bytes(1000)).dont_show_rate_eta(),
        );
        assert!(!tracker.make_progress(999));
        assert!(tracker.make_progress(1));
    }
}
