use indicatif::{HumanDuration, ProgressBar};
use std::time::{Duration, Instant};

/// Spinner for work that reports no total, hidden when stdout is not a terminal.
pub struct Spinner {
    pb: ProgressBar,
    started: Instant,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if console::Term::stdout().is_term() {
            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message.to_string());
        Self { pb, started: Instant::now() }
    }

    pub fn finish_with_message(&self, msg: &str) {
        self.pb
            .finish_with_message(format!("{} in {}", msg, HumanDuration(self.started.elapsed())));
    }
}
