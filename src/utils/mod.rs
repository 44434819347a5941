//! Common utilities and helpers

pub mod process;

pub use process::{locate_tool, spawn_error, tool_command};
