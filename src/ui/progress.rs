use crate::graph::GraphStats;
use crate::ui::theme;
use crate::ui::Icons;
use indicatif::{HumanDuration, ProgressBar};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Spinner on stderr, hidden when stderr is not a terminal
pub struct Spinner {
    pb: ProgressBar,
}

impl Spinner {
    pub fn new(message: &str) -> Self {
        let pb = if console::Term::stderr().is_term() {
            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            ProgressBar::hidden()
        };
        pb.set_message(message.to_string());
        Self { pb }
    }

    pub fn set_message(&self, msg: &str) {
        self.pb.set_message(msg.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.pb.finish_and_clear();
    }
}

/// One-line summary after a build
pub fn build_summary(duration: Duration, stats: &GraphStats) {
    eprintln!(
        "{} {}",
        Icons::CHECK.style(theme().done),
        format!("Built in {}", HumanDuration(duration)).style(theme().done)
    );
    eprintln!(
        "  {} {}  {} {}  {} {}",
        Icons::COMMAND.style(theme().count),
        stats.roots,
        Icons::FILE.style(theme().count),
        stats.leaves,
        Icons::LINK.style(theme().count),
        stats.edges
    );
}
