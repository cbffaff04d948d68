//! core::config::schema
//!
//! Configuration schema types.
//!
//! Located at (in order of precedence):
//! 1. `$GITMOVER_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitmover/config.toml`
//! 3. `~/.gitmover/config.toml`
//!
//! # Validation
//!
//! Config values are validated after parsing to ensure they conform to
//! expected formats (e.g., the URL template must name both `{org}` and
//! `{repo}`).

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default working root, relative to the home directory.
pub const DEFAULT_ROOT_DIR: &str = "GithubMover";

/// Default hosting service.
pub const DEFAULT_HOST: &str = "github.com";

/// Default remote URL template.
pub const DEFAULT_URL_TEMPLATE: &str = "git@{host}:{org}/{repo}.git";

/// Default history depth for release snapshots.
pub const DEFAULT_SHALLOW_DEPTH: u32 = 1;

/// On-disk configuration file.
///
/// # Example
///
/// ```toml
/// root = "~/GithubMover"
/// host = "github.com"
/// url_template = "git@{host}:{org}/{repo}.git"
/// shallow_depth = 1
/// ssh_key = "~/.ssh/id_ed25519"
///
/// [identity]
/// name = "Release Bot"
/// email = "release-bot@example.com"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Directory holding `{org}/{repo}` working copies
    pub root: Option<String>,

    /// Host substituted for `{host}` in the URL template
    pub host: Option<String>,

    /// Template for a repository's default remote URL
    pub url_template: Option<String>,

    /// Depth for release snapshot clones (0 fetches full history)
    pub shallow_depth: Option<u32>,

    /// Private key offered to SSH remotes instead of the agent
    pub ssh_key: Option<String>,

    /// Log file path (default `{root}/gitmover.log`)
    pub log_file: Option<String>,

    /// Signature for merge commits when a repository has none
    pub identity: Option<IdentityConfig>,
}

impl ConfigFile {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(host) = &self.host {
            if host.trim().is_empty() {
                return Err(ConfigError::InvalidValue("host cannot be empty".to_string()));
            }
        }

        if let Some(template) = &self.url_template {
            for placeholder in ["{org}", "{repo}"] {
                if !template.contains(placeholder) {
                    return Err(ConfigError::InvalidValue(format!(
                        "url_template '{}' must contain {}",
                        template, placeholder
                    )));
                }
            }
        }

        if let Some(root) = &self.root {
            if root.trim().is_empty() {
                return Err(ConfigError::InvalidValue("root cannot be empty".to_string()));
            }
        }

        if let Some(identity) = &self.identity {
            identity.validate()?;
        }

        Ok(())
    }
}

/// Committer identity override.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// Committer name
    pub name: Option<String>,
    /// Committer email
    pub email: Option<String>,
}

impl IdentityConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(email) = &self.email {
            if !email.contains('@') {
                return Err(ConfigError::InvalidValue(format!(
                    "identity email '{}' is not an address",
                    email
                )));
            }
        }
        Ok(())
    }
}
