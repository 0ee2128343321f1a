//! Terminal progress reporting.
//!
//! Thin wrapper over `indicatif`. Progress output is hidden when stderr is not
//! a terminal, when `--no-progress` was passed, or when `VENDUP_NO_PROGRESS` is
//! set, so that logs and JSON output stay clean.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static DISABLED: AtomicBool = AtomicBool::new(false);

/// Turns all progress output off for the rest of the process.
pub fn disable_progress() {
    DISABLED.store(true, Ordering::Relaxed);
}

fn is_progress_disabled() -> bool {
    DISABLED.load(Ordering::Relaxed)
        || std::env::var_os("VENDUP_NO_PROGRESS").is_some()
        || !std::io::stderr().is_terminal()
}

/// A progress bar or spinner that may be hidden.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// A bar counting packages.
    pub fn new(len: u64) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(len);
            bar.set_style(bar_style());
            bar
        };
        Self {
            inner: bar,
        }
    }

    /// An indeterminate spinner with a message.
    pub fn new_spinner(msg: impl Into<String>) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        bar.set_message(msg.into());
        Self {
            inner: bar,
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn bar_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
