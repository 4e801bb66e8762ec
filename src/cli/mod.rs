//! Command-line interface module.

mod args;
mod common;
pub mod editor;
pub mod push;
pub mod status;
pub mod tab;
pub mod watch;

pub use args::{Cli, Commands};
