//! tabsync - keep an injected page script live across browser tabs.

mod bundle;
mod cli;
mod compiler;
mod config;
mod core;
mod editor;
mod freshness;
mod logger;
mod mode;
mod push;
mod record;
mod reload;
mod runtime;
mod serve;
mod store;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }

    let config = Config::load(&cli)?;

    match &cli.command {
        Commands::Serve { .. } => serve::run(&config),
        Commands::Push { built_at, .. } => cli::push::push_rebuild(&config, *built_at),
        Commands::Watch { .. } => cli::watch::run_watch(&config),
        Commands::Editor { origin } => cli::editor::run_editor(&config, origin.as_deref()),
        Commands::Tab {
            hidden,
            editor_surface,
            ..
        } => cli::tab::run_tab(&config, *hidden, *editor_surface),
        Commands::Status => cli::status::show_status(&config),
        Commands::Stop { kind } => cli::status::force_stop(&config, *kind),
    }
}
