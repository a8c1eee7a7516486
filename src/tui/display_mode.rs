//! Display mode detection and configuration.
//!
//! Determines whether to use the TUI, plain line output, or JSON output
//! based on CLI flags and terminal capabilities.

/// The display mode for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Full-screen TUI with live statistics and a latency sparkline
    Tui,
    /// One colored line per probe, then a summary
    Plain,
    /// JSON mode - structured output only
    Json,
}

impl DisplayMode {
    /// Determine display mode from CLI flags and environment.
    ///
    /// # Arguments
    /// * `json_flag` - Whether the `--json` flag was provided
    /// * `no_tui_flag` - Whether the `--no-tui` flag was provided
    /// * `is_tty` - Whether stdout is a TTY (interactive terminal)
    ///
    /// # Returns
    /// * `Json` when json_flag is true (regardless of anything else)
    /// * `Tui` when stdout is a TTY and `--no-tui` was not given
    /// * `Plain` otherwise
    pub fn detect(json_flag: bool, no_tui_flag: bool, is_tty: bool) -> Self {
        if json_flag {
            DisplayMode::Json
        } else if is_tty && !no_tui_flag {
            DisplayMode::Tui
        } else {
            DisplayMode::Plain
        }
    }
}
