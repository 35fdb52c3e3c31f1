//! Terminal color policy for log output.
//!
//! An explicit `Always`/`Never` wins. In `Auto`, `NO_COLOR` and `EMACS`
//! turn color off, otherwise color follows whether the stream is a TTY.

use std::env;
use std::fmt;
use std::str::FromStr;

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorWhen {
    /// Enable colors only when output is a TTY.
    #[default]
    Auto,

    /// Always enable colors.
    Always,

    /// Never enable colors.
    Never,
}

impl ColorWhen {
    // ---
    /// Decides color for a stream given the environment and TTY status.
    ///
    /// Split out from [`ColorWhen::should_color_stderr`] so the policy can
    /// be checked without touching process state.
    pub fn resolve(self, no_color: bool, emacs: bool, is_tty: bool) -> bool {
        // ---
        match self {
            ColorWhen::Always => true,
            ColorWhen::Never => false,
            ColorWhen::Auto => !no_color && !emacs && is_tty,
        }
    }

    /// Returns whether log lines written to stderr should be colored.
    pub fn should_color_stderr(self) -> bool {
        // ---
        self.resolve(
            env::var_os("NO_COLOR").is_some(),
            env::var_os("EMACS").is_some(),
            atty::is(atty::Stream::Stderr),
        )
    }
}

impl FromStr for ColorWhen {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ColorWhen::Auto),
            "always" => Ok(ColorWhen::Always),
            "never" => Ok(ColorWhen::Never),
            other => Err(format!("invalid color choice '{other}' (auto|always|never)")),
        }
    }
}

impl fmt::Display for ColorWhen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorWhen::Auto => "auto",
            ColorWhen::Always => "always",
            ColorWhen::Never => "never",
        };
        f.write_str(name)
    }
}
