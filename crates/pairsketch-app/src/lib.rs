//! PairSketch terminal client
//!
//! Reads line commands from stdin and drives a shared scene against the
//! broker.

mod app;
mod commands;

pub use app::{App, AppConfig, AppError};
pub use commands::{COMMANDS, Command, CommandError, CommandHelp, help_text};
