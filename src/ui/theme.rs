use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for the stderr UI, one per kind of thing shown
#[derive(Debug, Clone)]
pub struct Theme {
    /// Finished builds and written files
    pub done: Style,
    /// Counts in summaries and informational icons
    pub count: Style,
    /// Labels and secondary text
    pub label: Style,
    pub created: Style,
    pub saved: Style,
    pub deleted: Style,
    pub renamed: Style,
}

impl Theme {
    /// Honors `NO_COLOR`, `CLICOLOR_FORCE` and whether stderr is a terminal
    pub fn detect() -> Self {
        Self::new(console::colors_enabled_stderr())
    }

    pub fn new(colored: bool) -> Self {
        let pick = |style: Style| if colored { style } else { Style::new() };
        Self {
            done: pick(Style::new().green().bold()),
            count: pick(Style::new().cyan()),
            label: pick(Style::new().dimmed()),
            created: pick(Style::new().green()),
            saved: pick(Style::new().yellow()),
            deleted: pick(Style::new().red()),
            renamed: pick(Style::new().blue()),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
