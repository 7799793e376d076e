//! Terminal styles by the role of the printed text

use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct Theme {
    /// File names and section titles
    pub title: Style,
    pub passed: Style,
    pub failed: Style,
    pub caution: Style,
    /// Labels of key/value rows
    pub key: Style,
    /// `#id` of a printed record
    pub id: Style,
    /// Entity or type keyword of a printed record
    pub keyword: Style,
}

impl Theme {
    /// Colored on a terminal unless `NO_COLOR` is set.
    pub fn detect() -> Self {
        let disabled = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        if disabled || !console::Term::stdout().is_term() {
            Self::plain()
        } else {
            Self::colored()
        }
    }

    pub fn colored() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            passed: Style::new().green().bold(),
            failed: Style::new().red().bold(),
            caution: Style::new().yellow().bold(),
            key: Style::new().white().dimmed(),
            id: Style::new().magenta(),
            keyword: Style::new().blue().bold(),
        }
    }

    pub fn plain() -> Self {
        Self {
            title: Style::new(),
            passed: Style::new(),
            failed: Style::new(),
            caution: Style::new(),
            key: Style::new(),
            id: Style::new(),
            keyword: Style::new(),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}
