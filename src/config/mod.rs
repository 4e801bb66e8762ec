//! Configuration management for `tabsync.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/   # [store] [serve] [watch] [push] [tab] [reload]
//! ├── error.rs   # ConfigError
//! ├── util.rs    # config file lookup
//! └── mod.rs     # Config (this file)
//! ```
//!
//! The file is optional: every section has defaults, and CLI flags override
//! whatever the file says. The loaded config is shared as `Arc<Config>` and
//! passed explicitly.

mod error;
pub mod section;
mod util;

pub use error::ConfigError;
pub use section::{PushConfig, ReloadConfig, ServeConfig, StoreConfig, TabConfig, WatchConfig};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use util::find_config_file;

use crate::cli::{Cli, Commands};
use crate::log;

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing tabsync.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path to the config file, if one was found (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Project root: parent of the config file, or cwd (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub reload: ReloadConfig,

    #[serde(default)]
    pub tab: TabConfig,
}

impl Config {
    /// Load configuration for `cli`.
    ///
    /// Searches upward from cwd for the config file; a missing file means
    /// defaults rooted at cwd.
    pub fn load(cli: &Cli) -> Result<Arc<Self>> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| cwd.clone());
                config.config_path = Some(path);
                config
            }
            None => Self {
                root: cwd,
                ..Self::default()
            },
        };

        config.apply_command_options(cli);
        config.normalize_paths();
        config.validate()?;
        Ok(Arc::new(config))
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Print warning about unknown fields.
    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    // ========================================================================
    // derived values
    // ========================================================================

    /// Push endpoint: `[push] url`, else the local server's push path.
    pub fn push_url(&self) -> String {
        self.push
            .url
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.serve.base_url(), self.serve.push_path))
    }

    /// Bundle URL: `[tab] bundle_url`, else the local server's bundle path.
    pub fn bundle_url(&self) -> String {
        self.tab
            .bundle_url
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.serve.base_url(), self.serve.bundle_path))
    }

    /// Page origin of headless tabs: `[tab] origin`, else the bundle origin.
    pub fn origin(&self) -> String {
        if let Some(origin) = &self.tab.origin {
            return origin.clone();
        }
        let bundle_url = self.bundle_url();
        url::Url::parse(&bundle_url)
            .map(|url| url.origin().ascii_serialization())
            .unwrap_or(bundle_url)
    }

    // ========================================================================
    // cli configuration updates
    // ========================================================================

    /// Apply command-specific configuration options.
    fn apply_command_options(&mut self, cli: &Cli) {
        crate::logger::set_verbose(cli.verbose);
        Self::update_option(&mut self.store.path, cli.state.as_ref());

        match &cli.command {
            Commands::Serve {
                bundle,
                interface,
                port,
                watch,
            } => {
                Self::update_option(&mut self.serve.bundle, bundle.as_ref());
                Self::update_option(&mut self.serve.interface, interface.as_ref());
                Self::update_option(&mut self.serve.port, port.as_ref());
                Self::update_option(&mut self.serve.watch, watch.as_ref());
            }
            Commands::Push { url, .. } => {
                if url.is_some() {
                    self.push.url = url.clone();
                }
            }
            Commands::Watch {
                dir,
                ext,
                interval,
                compiler,
            } => {
                Self::update_option(&mut self.watch.dir, dir.as_ref());
                Self::update_option(&mut self.watch.extensions, ext.as_ref());
                Self::update_option(&mut self.watch.interval_ms, interval.as_ref());
                if let Some(command) = compiler {
                    self.watch.compiler =
                        Some(command.split_whitespace().map(str::to_string).collect());
                }
            }
            Commands::Tab {
                origin, bundle_url, ..
            } => {
                if origin.is_some() {
                    self.tab.origin = origin.clone();
                }
                if bundle_url.is_some() {
                    self.tab.bundle_url = bundle_url.clone();
                }
            }
            Commands::Editor { .. } | Commands::Status | Commands::Stop { .. } => {}
        }
    }

    /// Update config option if CLI value is provided.
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    // ========================================================================
    // path normalization
    // ========================================================================

    /// Resolve relative paths against the project root.
    fn normalize_paths(&mut self) {
        let root = self.root.clone();
        let resolve = |path: &Path| {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            let path = PathBuf::from(expanded);
            if path.is_absolute() { path } else { root.join(path) }
        };
        self.store.path = resolve(&self.store.path);
        self.serve.bundle = resolve(&self.serve.bundle);
        self.watch.dir = resolve(&self.watch.dir);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("serve.bundle_path", &self.serve.bundle_path),
            ("serve.push_path", &self.serve.push_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Validation(format!(
                    "`{field}` must start with `/`, got `{path}`"
                )));
            }
        }
        if self.serve.bundle_path == self.serve.push_path {
            return Err(ConfigError::Validation(
                "`serve.bundle_path` and `serve.push_path` must differ".into(),
            ));
        }
        if self.watch.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "`watch.extensions` must name at least one extension".into(),
            ));
        }
        if self
            .watch
            .compiler
            .as_ref()
            .is_some_and(|command| command.is_empty())
        {
            return Err(ConfigError::Validation(
                "`watch.compiler` must not be empty; remove it to use concatenation".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// test helpers
// ============================================================================

/// Parse config content.
/// Panics if there are unknown fields (to catch config typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> Config {
    let (parsed, ignored) = Config::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================
