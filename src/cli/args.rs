//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::record::ModeKind;

/// Keep an injected page script live across browser tabs
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: tabsync.toml, searched upward)
    #[arg(short = 'C', long, global = true, default_value = "tabsync.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Shared state file (overrides [store] path)
    #[arg(long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub state: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the push/bundle server
    #[command(visible_alias = "s")]
    Serve {
        /// Bundle file to serve (relative to project root)
        #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
        bundle: Option<PathBuf>,

        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<std::net::IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Record a build whenever the bundle file changes
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },

    /// Notify the server that a rebuild happened
    #[command(visible_alias = "p")]
    Push {
        /// Push endpoint (default: derived from [serve])
        #[arg(short, long, value_hint = clap::ValueHint::Url)]
        url: Option<String>,

        /// Build time in ms since the epoch (default: now, set by the server)
        #[arg(short, long)]
        built_at: Option<u64>,
    },

    /// Host a local watch session on a directory
    #[command(visible_alias = "w")]
    Watch {
        /// Directory to watch (default: [watch] dir)
        #[arg(value_hint = clap::ValueHint::DirPath)]
        dir: Option<PathBuf>,

        /// Source file extensions (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        ext: Option<Vec<String>>,

        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// External compiler command line, e.g. "esbuild --bundle"
        #[arg(short, long)]
        compiler: Option<String>,
    },

    /// Bridge editor messages (one JSON object per stdin line)
    #[command(visible_alias = "e")]
    Editor {
        /// Origin of the editor surface
        #[arg(short, long, value_hint = clap::ValueHint::Url)]
        origin: Option<String>,
    },

    /// Run a headless tab (stdin: show, hide, reload, watch [dir], quit)
    #[command(visible_alias = "t")]
    Tab {
        /// Page origin (default: [tab] origin, or the bundle origin)
        #[arg(short, long, value_hint = clap::ValueHint::Url)]
        origin: Option<String>,

        /// Bundle URL (default: derived from [serve])
        #[arg(short, long, value_hint = clap::ValueHint::Url)]
        bundle_url: Option<String>,

        /// Start hidden
        #[arg(long)]
        hidden: bool,

        /// This tab hosts the editor: it publishes editor payloads, never runs them
        #[arg(long)]
        editor_surface: bool,
    },

    /// Show the active dev mode and records
    Status,

    /// Force-clear a dev mode record
    Stop {
        /// Mode to clear
        #[arg(value_enum)]
        kind: ModeKind,
    },
}
