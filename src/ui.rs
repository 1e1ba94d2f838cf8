//! Terminal progress output for the `lookout` binary.
//!
//! Startup steps are shown as stages; while the camera runs, the session
//! status text is mirrored on a single live line.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Spinners only when stderr is a terminal and plain output wasn't asked for.
    pub fn is_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        let spinner = self.is_pretty().then(|| {
            let spinner = spinner_with("{spinner} {msg}");
            spinner.set_message(format!("{name}…"));
            spinner
        });
        if spinner.is_none() {
            eprintln!("==> {}", name);
        }
        StageGuard {
            name: name.to_string(),
            start: Instant::now(),
            spinner,
        }
    }

    pub fn status_line(&self) -> StatusLine {
        StatusLine {
            spinner: self.is_pretty().then(|| spinner_with("{spinner} [camera] {msg}")),
            last: String::new(),
        }
    }
}

fn spinner_with(template: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner.set_style(
        ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

/// Live camera status. Plain mode prints a line only when the text changes.
pub struct StatusLine {
    spinner: Option<ProgressBar>,
    last: String,
}

impl StatusLine {
    pub fn update(&mut self, status: &str) {
        if status == self.last {
            return;
        }
        self.last = status.to_string();
        match &self.spinner {
            Some(spinner) => spinner.set_message(self.last.clone()),
            None => eprintln!("[camera] {}", status),
        }
    }

    pub fn finish(self) {
        if let Some(spinner) = self.spinner {
            spinner.finish_with_message(self.last);
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pretty_needs_a_terminal() {
        assert!(!Ui::new(UiMode::Pretty, false).is_pretty());
        assert!(Ui::new(UiMode::Auto, true).is_pretty());
        assert!(!Ui::new(UiMode::Plain, true).is_pretty());
    }

    #[test]
    fn durations_switch_units_at_one_second() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn plain_status_line_tracks_last_text() {
        let mut line = Ui::new(UiMode::Plain, false).status_line();
        line.update("Camera active - detecting objects");
        line.update("Camera active - detecting objects");
        assert_eq!(line.last, "Camera active - detecting objects");
        line.finish();
    }
}
