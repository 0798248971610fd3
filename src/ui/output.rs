use crate::ui::{theme, Icons};
use crate::watcher::RebuildTrigger;
use owo_colors::OwoColorize;

// Everything here writes to stderr: stdout carries graph output.

pub fn status(icon: &str, label: &str, value: &str) {
    eprintln!("{} {}: {}", icon, label.style(theme().label), value);
}

pub fn success(label: &str) {
    eprintln!("{} {}", Icons::CHECK, label.style(theme().done));
}

pub fn info(label: &str, value: &str) {
    eprintln!(
        "{} {}: {}",
        Icons::INFO.style(theme().count),
        label.style(theme().label),
        value
    );
}

pub fn dim(text: &str) -> String {
    text.style(theme().label).to_string()
}

/// Line shown in `watch` before each rebuild
pub fn trigger(trigger: &RebuildTrigger) {
    let path = trigger.path().display().to_string();
    match trigger {
        RebuildTrigger::Saved(_) => eprintln!("{} {}", Icons::MOD.style(theme().saved), path),
        RebuildTrigger::Created(_) => eprintln!("{} {}", Icons::NEW.style(theme().created), path),
        RebuildTrigger::Deleted(_) => eprintln!("{} {}", Icons::DEL.style(theme().deleted), path),
        RebuildTrigger::Renamed(_) => eprintln!("{} {}", Icons::MOVE.style(theme().renamed), path),
    }
}
