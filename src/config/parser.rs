//! Loading of `cairn.yaml`.
//!
//! The file is read once, overridden from `CAIRN_*` environment variables,
//! and handed to the validator. A `.env` next to the file is loaded first so
//! its values take part in the overrides.

use crate::error::{CairnError, ConfigError, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::spec::{DeployConfig, StateBackend};

/// Reads declaration files.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Directory holding `.env`; the working directory when unset.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a parser rooted at the working directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Roots the parser at `path`.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Reads and parses a declaration file.
    ///
    /// # Errors
    ///
    /// `FileNotFound` if `path` does not exist, `ParseError` if it cannot be
    /// read or is not a valid declaration.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        info!(path = %path.display(), "Reading declarations");
        let content = std::fs::read_to_string(path)
            .map_err(|e| parse_error(format!("cannot read file: {e}"), Some(path)))?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a declaration document. `source` only labels errors.
    ///
    /// # Errors
    ///
    /// `ParseError` if the YAML does not match the declaration schema.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<DeployConfig> {
        let config: DeployConfig = serde_yaml::from_str(content)
            .map_err(|e| parse_error(format!("invalid YAML: {e}"), source))?;

        debug!(
            project = %config.project.name,
            resources = config.resources.len(),
            "Parsed declarations"
        );
        Ok(config)
    }

    /// Reads a declaration file and applies environment overrides.
    ///
    /// Recognised variables: `CAIRN_PROJECT_NAME`,
    /// `CAIRN_PROJECT_ENVIRONMENT`, `CAIRN_STATE_PATH` (forces the local
    /// backend) and `CAIRN_MAX_CONCURRENCY`.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigParser::load_file`].
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<DeployConfig> {
        let mut config = self.load_file(path)?;
        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Loads `.env` from the base path into the process environment, if the
    /// file exists.
    ///
    /// # Errors
    ///
    /// `ParseError` if the file exists but is malformed.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_deref()
            .unwrap_or_else(|| Path::new("."))
            .join(".env");

        if !env_path.exists() {
            debug!(path = %env_path.display(), "No .env file");
            return Ok(());
        }

        info!(path = %env_path.display(), "Loading .env");
        dotenvy::from_path(&env_path)
            .map_err(|e| parse_error(format!("invalid .env file: {e}"), Some(&env_path)))?;
        Ok(())
    }
}

fn parse_error(message: String, location: Option<&Path>) -> CairnError {
    ConfigError::ParseError {
        message,
        location: location.map(|p| p.display().to_string()),
    }
    .into()
}

fn env_override<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => {
            debug!(key, "Applying environment override");
            Some(value)
        }
        Err(e) => {
            warn!(key, value = %raw, "Ignoring environment override: {e}");
            None
        }
    }
}

fn apply_env_overrides(config: &mut DeployConfig) {
    if let Some(name) = env_override("CAIRN_PROJECT_NAME") {
        config.project.name = name;
    }
    if let Some(environment) = env_override("CAIRN_PROJECT_ENVIRONMENT") {
        config.project.environment = environment;
    }
    if let Some(path) = env_override("CAIRN_STATE_PATH") {
        config.state.path = Some(path);
        config.state.backend = StateBackend::Local;
    }
    if let Some(limit) = env_override("CAIRN_MAX_CONCURRENCY") {
        config.engine.max_concurrency = limit;
    }
}

/// File names looked up by [`find_config_file`], in order.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["cairn.yaml", "cairn.yml"];

/// Looks for a declaration file in `start_dir`, then in each parent.
///
/// # Errors
///
/// `FileNotFound` naming `cairn.yaml` under `start_dir` if no ancestor has
/// one.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();

    let found = start.ancestors().find_map(|dir| {
        DEFAULT_CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    });

    found.map_or_else(
        || {
            Err(ConfigError::FileNotFound {
                path: start.join(DEFAULT_CONFIG_FILES[0]),
            }
            .into())
        },
        |path| {
            debug!(path = %path.display(), "Found declaration file");
            Ok(path)
        },
    )
}
