//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (applied through [`Config::with_root`])
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$GITMOVER_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitmover/config.toml`
//! 3. `~/.gitmover/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use gitmover::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! let root = config.root().unwrap();
//! println!("working copies live under {}", root.display());
//! println!("origin for acme/api: {}", config.repo_url("acme", "api"));
//! ```

pub mod schema;

pub use schema::{ConfigFile, IdentityConfig};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::git::{Credentials, Identity};
use schema::{DEFAULT_HOST, DEFAULT_ROOT_DIR, DEFAULT_SHALLOW_DEPTH, DEFAULT_URL_TEMPLATE};

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),

    #[error("home directory not found")]
    NoHomeDir,
}

/// Resolved configuration.
///
/// Accessors apply defaults for anything the file leaves unset.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Values read from the config file
    pub file: ConfigFile,
    /// Working root given on the command line
    root_override: Option<PathBuf>,
    /// Path the file was loaded from
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed or
    /// fails validation. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Self {
            file,
            root_override: None,
            path: Some(path.to_path_buf()),
        })
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GITMOVER_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("gitmover/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".gitmover/config.toml"))
            .filter(|path| path.exists())
    }

    /// Override the working root (from `--root`).
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root_override = Some(root);
        self
    }

    // =========================================================================
    // Accessor methods
    // =========================================================================

    /// Directory holding `{org}/{repo}` working copies.
    ///
    /// Defaults to `~/GithubMover`.
    pub fn root(&self) -> Result<PathBuf, ConfigError> {
        if let Some(root) = &self.root_override {
            return Ok(root.clone());
        }
        match &self.file.root {
            Some(root) => expand_home(root),
            None => Ok(dirs::home_dir()
                .ok_or(ConfigError::NoHomeDir)?
                .join(DEFAULT_ROOT_DIR)),
        }
    }

    /// Hosting service name. Defaults to `github.com`.
    pub fn host(&self) -> &str {
        self.file.host.as_deref().unwrap_or(DEFAULT_HOST)
    }

    /// Default remote URL of a repository, rendered from the URL template.
    pub fn repo_url(&self, org: &str, repo: &str) -> String {
        let template = self
            .file
            .url_template
            .as_deref()
            .unwrap_or(DEFAULT_URL_TEMPLATE);
        self.render_url(template, org, repo)
    }

    /// Render any URL template (`{host}`, `{org}`, `{repo}`) for a repository.
    pub fn render_url(&self, template: &str, org: &str, repo: &str) -> String {
        template
            .replace("{host}", self.host())
            .replace("{org}", org)
            .replace("{repo}", repo)
    }

    /// Depth for release snapshot clones; `None` means full history.
    pub fn shallow_depth(&self) -> Option<u32> {
        match self.file.shallow_depth.unwrap_or(DEFAULT_SHALLOW_DEPTH) {
            0 => None,
            depth => Some(depth),
        }
    }

    /// Transport credentials.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let ssh_key = self.file.ssh_key.as_deref().map(expand_home).transpose()?;
        Ok(Credentials { ssh_key })
    }

    /// Merge commit identity used when a repository has none configured.
    pub fn identity(&self) -> Identity {
        let default = Identity::default();
        let configured = self.file.identity.as_ref();
        Identity {
            name: configured
                .and_then(|i| i.name.clone())
                .unwrap_or(default.name),
            email: configured
                .and_then(|i| i.email.clone())
                .unwrap_or(default.email),
        }
    }

    /// Log file path. Defaults to `{root}/gitmover.log`.
    pub fn log_file(&self) -> Result<PathBuf, ConfigError> {
        match &self.file.log_file {
            Some(path) => expand_home(path),
            None => Ok(self.root()?.join("gitmover.log")),
        }
    }

    /// Path the configuration was loaded from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_home(path: &str) -> Result<PathBuf, ConfigError> {
    match path.strip_prefix("~/") {
        Some(rest) => Ok(dirs::home_dir().ok_or(ConfigError::NoHomeDir)?.join(rest)),
        None => Ok(PathBuf::from(path)),
    }
}
