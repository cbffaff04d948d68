//! batch::manifest
//!
//! The list of repositories a batch run works on.
//!
//! # Format
//!
//! ```toml
//! [[organizations]]
//! name = "acme"
//! repositories = [
//!     "api",
//!     { name = "web", url = "git@github.com:acme/web.git" },
//!     { name = "old", disabled = true },
//! ]
//! ```
//!
//! A bare string names a repository reached at the configured URL
//! template. Disabled repositories stay listed for the record but are
//! never processed.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::core::types::RepoId;

/// Errors from manifest loading.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid manifest: {0}")]
    Invalid(String),
}

/// A parsed manifest.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    /// Organizations in processing order
    pub organizations: Vec<OrganizationEntry>,
}

/// One organization and its repositories.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OrganizationEntry {
    /// Organization or account login
    pub name: String,
    /// Repositories in processing order
    #[serde(default)]
    pub repositories: Vec<RepositoryEntry>,
}

/// A repository given by name alone or with details.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RepositoryEntry {
    Name(String),
    Detailed(RepositorySpec),
}

/// A repository with an explicit URL or a disabled flag.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RepositorySpec {
    /// Repository short name
    pub name: String,
    /// Remote URL overriding the template
    pub url: Option<String>,
    /// Listed but never processed
    #[serde(default)]
    pub disabled: bool,
}

impl RepositoryEntry {
    /// Repository short name.
    pub fn name(&self) -> &str {
        match self {
            RepositoryEntry::Name(name) => name,
            RepositoryEntry::Detailed(spec) => &spec.name,
        }
    }

    fn url(&self) -> Option<&str> {
        match self {
            RepositoryEntry::Name(_) => None,
            RepositoryEntry::Detailed(spec) => spec.url.as_deref(),
        }
    }

    fn disabled(&self) -> bool {
        matches!(self, RepositoryEntry::Detailed(spec) if spec.disabled)
    }
}

/// A repository to process and where its `origin` lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Repository identity
    pub id: RepoId,
    /// Remote URL for `origin`
    pub url: String,
}

impl Manifest {
    /// Read and validate a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path).map_err(|e| ManifestError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let manifest: Manifest =
            toml::from_str(&contents).map_err(|e| ManifestError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check names are usable as directory names and unique per organization.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut orgs = BTreeSet::new();
        for org in &self.organizations {
            check_component("organization", &org.name)?;
            if !orgs.insert(org.name.as_str()) {
                return Err(ManifestError::Invalid(format!(
                    "organization '{}' listed twice",
                    org.name
                )));
            }

            let mut repos = BTreeSet::new();
            for repo in &org.repositories {
                check_component("repository", repo.name())?;
                if !repos.insert(repo.name()) {
                    return Err(ManifestError::Invalid(format!(
                        "repository '{}/{}' listed twice",
                        org.name,
                        repo.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Enabled repositories in manifest order.
    ///
    /// Repositories without an explicit URL get `default_url(org, repo)`.
    pub fn work_items<F>(&self, default_url: F) -> Vec<WorkItem>
    where
        F: Fn(&str, &str) -> String,
    {
        let mut items = Vec::new();
        for org in &self.organizations {
            for repo in &org.repositories {
                let id = RepoId::new(&org.name, repo.name());
                if repo.disabled() {
                    tracing::debug!("{id}: disabled, skipping");
                    continue;
                }
                let url = repo
                    .url()
                    .map(String::from)
                    .unwrap_or_else(|| default_url(&org.name, repo.name()));
                items.push(WorkItem { id, url });
            }
        }
        items
    }
}

fn check_component(kind: &str, name: &str) -> Result<(), ManifestError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ManifestError::Invalid(format!(
            "{kind} name '{name}' is not a single path component"
        )));
    }
    Ok(())
}
