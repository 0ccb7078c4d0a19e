//! CLI module for embedeval
//!
//! Handles command-line argument parsing and terminal output.

pub mod args;
pub mod summary;

pub use args::{Args, CacheCommand, Commands, RunArgs, Verbosity};
pub use summary::{render_presets, render_report};
