use clap::builder::styling::{AnsiColor, Effects, Style, Styles};
use std::{fmt::Write, io::IsTerminal};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Whether stdout is a terminal that understands ANSI escapes.
static IS_ANSI_TERMINAL: std::sync::LazyLock<bool> = std::sync::LazyLock::new(|| {
    std::io::stdout().is_terminal() && std::env::var("TERM").map_or(true, |t| t != "dumb")
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the styles used for help output and for command results.
pub fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
        .valid(AnsiColor::Green.on_default() | Effects::BOLD)
        .invalid(AnsiColor::Red.on_default() | Effects::BOLD)
}

fn apply_style(text: &str, style: &Style, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }

    let mut styled = String::with_capacity(text.len() + 16);
    let _ = write!(styled, "{}{}{}", style, text, style.render_reset());
    styled
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Applies the [`styles`] to text printed by the CLI, when stdout is a terminal.
pub trait AnsiStyles {
    /// Returns the text itself.
    fn as_text(&self) -> &str;

    /// Header style.
    fn header(&self) -> String {
        apply_style(self.as_text(), styles().get_header(), *IS_ANSI_TERMINAL)
    }

    /// Literal style, for names and values.
    fn literal(&self) -> String {
        apply_style(self.as_text(), styles().get_literal(), *IS_ANSI_TERMINAL)
    }

    /// Error style.
    fn error(&self) -> String {
        apply_style(self.as_text(), styles().get_error(), *IS_ANSI_TERMINAL)
    }

    /// Style for something running or successful.
    fn valid(&self) -> String {
        apply_style(self.as_text(), styles().get_valid(), *IS_ANSI_TERMINAL)
    }

    /// Style for something stopped or failed.
    fn invalid(&self) -> String {
        apply_style(self.as_text(), styles().get_invalid(), *IS_ANSI_TERMINAL)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl AnsiStyles for str {
    fn as_text(&self) -> &str {
        self
    }
}

impl AnsiStyles for String {
    fn as_text(&self) -> &str {
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
