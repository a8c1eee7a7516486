//! Terminal display for sip-alg-check.
//!
//! Live statistics while a monitor session runs, plus the plain and JSON
//! fallbacks for non-interactive output.

pub mod controller;
pub mod display_mode;
pub mod progress;
pub mod renderer;
pub mod state;

pub use controller::TuiController;
pub use display_mode::DisplayMode;
pub use progress::{CheckPhase, ProgressCallback, ProgressEvent};
pub use state::TuiState;
