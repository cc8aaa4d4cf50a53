//! Terminal readout for the monitor.
//!
//! # Module Structure
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard input handling
//! - `render` - Frame layout and size guards
//! - `readout` - Current reading and preference panel
//! - `status` - Status bar widget

mod input;
mod loop_runner;
mod readout;
mod render;
mod status;

pub use loop_runner::{run, Action, Controls};
