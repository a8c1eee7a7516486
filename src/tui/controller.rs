//! TUI controller for managing the display lifecycle.
//!
//! The TuiController manages the TUI lifecycle, including initialization,
//! rendering, keyboard polling, and cleanup. It also provides a progress
//! callback for the monitor session to emit events.

use std::io::{self, Stdout};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::{
    cursor,
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{
        disable_raw_mode, enable_raw_mode, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use ratatui::{backend::CrosstermBackend, Terminal};

use super::display_mode::DisplayMode;
use super::progress::{CheckPhase, ProgressCallback, ProgressEvent};
use super::renderer::render_frame;
use super::state::TuiState;
use crate::errors::CheckError;
use crate::report::SessionReport;

/// Controller for the TUI display.
///
/// Every method is a no-op outside [`DisplayMode::Tui`], so callers do not
/// need to branch on the mode.
pub struct TuiController {
    mode: DisplayMode,
    /// Shared with the progress callback
    state: Arc<Mutex<TuiState>>,
    /// Terminal instance (only present in TUI mode)
    terminal: Option<Terminal<CrosstermBackend<Stdout>>>,
    initialized: bool,
}

fn terminal_error(e: io::Error) -> CheckError {
    CheckError::io("Terminal I/O failed").with_source(e)
}

impl TuiController {
    pub fn new(mode: DisplayMode) -> Self {
        Self {
            mode,
            state: Arc::new(Mutex::new(TuiState::new())),
            terminal: None,
            initialized: false,
        }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// Enter the alternate screen and hide the cursor.
    pub fn init(&mut self) -> Result<(), CheckError> {
        if self.mode != DisplayMode::Tui {
            return Ok(());
        }

        enable_raw_mode().map_err(terminal_error)?;

        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen, EnableMouseCapture, cursor::Hide)
            .map_err(terminal_error)?;

        let terminal =
            Terminal::new(CrosstermBackend::new(stdout)).map_err(terminal_error)?;
        let width = terminal.size().map_err(terminal_error)?.width;

        self.terminal = Some(terminal);
        self.initialized = true;

        if let Ok(mut state) = self.state.lock() {
            state.terminal_width = width;
        }

        Ok(())
    }

    /// Restore the terminal to its original state.
    pub fn cleanup(&mut self) -> Result<(), CheckError> {
        if !self.initialized {
            return Ok(());
        }

        if let Some(ref mut terminal) = self.terminal {
            execute!(
                terminal.backend_mut(),
                LeaveAlternateScreen,
                DisableMouseCapture,
                cursor::Show
            )
            .map_err(terminal_error)?;
        }

        disable_raw_mode().map_err(terminal_error)?;

        self.initialized = false;
        self.terminal = None;

        Ok(())
    }

    /// Show an error prominently; statistics collected so far stay visible.
    pub fn set_error(&mut self, message: String, suggestion: Option<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.set_error(message, suggestion);
        }
    }

    /// Draw the current state.
    pub fn render(&mut self) -> Result<(), CheckError> {
        if self.mode != DisplayMode::Tui {
            return Ok(());
        }

        let Some(ref mut terminal) = self.terminal else {
            return Ok(());
        };

        let width = terminal.size().map_err(terminal_error)?.width;

        // Clone state for rendering to avoid holding lock during draw
        let state = {
            let mut guard = self
                .state
                .lock()
                .map_err(|e| CheckError::io(format!("Failed to lock state: {}", e)))?;
            guard.terminal_width = width;
            guard.clone()
        };

        terminal
            .draw(|frame| render_frame(frame, &state))
            .map_err(terminal_error)?;

        Ok(())
    }

    /// Whether the user asked to quit (`q`, `Esc` or `Ctrl-C`).
    ///
    /// Raw mode swallows SIGINT, so keyboard input is the only way to stop
    /// a TUI session. Never blocks.
    pub fn poll_quit(&self) -> Result<bool, CheckError> {
        if !self.initialized {
            return Ok(false);
        }

        while event::poll(Duration::ZERO).map_err(terminal_error)? {
            if let Event::Key(key) = event::read().map_err(terminal_error)? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let ctrl_c = key.code == KeyCode::Char('c')
                    && key.modifiers.contains(KeyModifiers::CONTROL);
                if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// Block until any key is pressed.
    pub fn wait_for_key(&self) -> Result<(), CheckError> {
        if !self.initialized {
            return Ok(());
        }

        loop {
            if let Event::Key(key) = event::read().map_err(terminal_error)? {
                if key.kind == KeyEventKind::Press {
                    return Ok(());
                }
            }
        }
    }

    /// Show the final statistics and mark the run complete.
    pub fn show_results(&mut self, report: &SessionReport) -> Result<(), CheckError> {
        if let Ok(mut state) = self.state.lock() {
            if let Some(ref alg) = report.alg {
                state.alg = Some(alg.clone());
            }
            if let Some(ref snapshot) = report.network {
                state.snapshot = Some(snapshot.clone());
            }
            state.phase = CheckPhase::Complete;
        }

        self.render()
    }

    /// A callback that feeds progress events into the shared state.
    pub fn progress_callback(&self) -> Arc<dyn ProgressCallback> {
        Arc::new(TuiProgressCallback { state: Arc::clone(&self.state) })
    }
}

impl Drop for TuiController {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

struct TuiProgressCallback {
    state: Arc<Mutex<TuiState>>,
}

impl ProgressCallback for TuiProgressCallback {
    fn on_progress(&self, event: ProgressEvent) {
        // Blocks while the renderer clones the state. Every sample must land
        // in the sparkline window, which a later snapshot cannot rebuild.
        if let Ok(mut state) = self.state.lock() {
            state.update_from_event(&event);
        }
    }
}
