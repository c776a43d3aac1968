use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright_green, bright_red, bright_yellow};

/// Spinner shown while waiting on a call that produces no output of its own.
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn start(message: impl Into<String>) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("  {msg} {spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(bright_yellow(message.into()).to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn finish_ok(self, message: impl Into<String>) {
        self.pb
            .finish_with_message(bright_green(format!("{} ✓", message.into())).to_string());
    }

    pub fn finish_failed(self, message: impl Into<String>) {
        self.pb
            .finish_with_message(bright_red(format!("{} ✗", message.into())).to_string());
    }
}
