//! Progress display for bootstrap stages
//!
//! Reporters only observe; a failing reporter never changes what the
//! bootstrap does next.

use std::sync::Mutex;
use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

/// Begin/success/fail notifications for each stage.
pub trait ProgressReporter {
    fn begin(&self, message: &str);
    fn success(&self, message: &str);
    fn fail(&self, message: &str);
}

/// A spinner per stage, replaced by a check mark or a cross when it ends.
pub struct SpinnerReporter {
    current: Mutex<Option<ProgressBar>>,
}

impl SpinnerReporter {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }

    fn finish(&self, symbol: &str, style: &Style, message: &str) {
        let bar = self.current.lock().ok().and_then(|mut c| c.take());
        let line = format!("{} {message}", style.apply_to(symbol));
        match bar {
            Some(bar) => bar.finish_with_message(line),
            None => eprintln!("{line}"),
        }
    }
}

impl Default for SpinnerReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SpinnerReporter {
    fn begin(&self, message: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", " "]))
        {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn success(&self, message: &str) {
        self.finish("✔", &Style::new().green().bold(), message);
    }

    fn fail(&self, message: &str) {
        self.finish("✗", &Style::new().red().bold(), message);
    }
}

/// Reports nothing.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn begin(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn fail(&self, _message: &str) {}
}
