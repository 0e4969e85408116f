//! Alias configuration loading and validation.
//!
//! A configuration document maps alias names to an image reference and a
//! [`RunSpec`]. Documents are TOML:
//!
//! ```toml
//! version = 1
//!
//! [aliases.dev.image]
//! ref = "ubuntu:24.04"
//! policy = "if_missing"
//!
//! [aliases.dev.run]
//! tty = true
//! stdin_open = true
//! ports = ["8080:80"]
//! volumes = [{ type = "bind", source = ".", target = "/work" }]
//! ```
//!
//! Validation resolves relative bind sources against the directory holding the
//! document, so the container layer only ever sees absolute host paths.

mod run;

pub use run::{
    HealthCheckSpec, HealthCheckTest, LogConfigSpec, MountSpec, NetworkSpec, ResourcesSpec,
    RunSpec, UlimitSpec,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the document failed
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML or does not match the schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field failed validation
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// When to fetch an alias image from its registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImagePolicy {
    /// Pull on every run
    #[default]
    Always,
    /// Pull only when the image is not present locally
    IfMissing,
    /// Never pull; the image must already exist
    Never,
}

impl std::fmt::Display for ImagePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImagePolicy::Always => write!(f, "always"),
            ImagePolicy::IfMissing => write!(f, "if_missing"),
            ImagePolicy::Never => write!(f, "never"),
        }
    }
}

/// Image source for an alias.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageSpec {
    /// Image reference, e.g. `ubuntu:24.04`
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub policy: ImagePolicy,
}

/// A named alias: what image to use and how to run it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Alias {
    pub image: ImageSpec,
    #[serde(default)]
    pub run: RunSpec,
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory containing the document; relative paths resolve against it
    #[serde(skip)]
    pub base_dir: PathBuf,

    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub aliases: BTreeMap<String, Alias>,
}

impl Config {
    /// Load, parse and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?
                .join(path)
        };
        let base_dir = absolute
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        debug!("Loaded config from {:?} (base dir {:?})", path, base_dir);
        Self::from_toml_str(&content, base_dir)
    }

    /// Parse and validate a configuration document held in memory.
    ///
    /// # Errors
    ///
    /// Returns error if the document cannot be parsed or validated.
    pub fn from_toml_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    /// Validate every alias, normalizing mount sources in place.
    ///
    /// # Errors
    ///
    /// Returns the first invalid field, qualified with its alias path.
    pub fn validate(&mut self) -> Result<()> {
        for (name, alias) in self.aliases.iter_mut() {
            validate_alias(name, alias, &self.base_dir)?;
        }
        Ok(())
    }

    /// Look up an alias by name.
    pub fn alias(&self, name: &str) -> Option<&Alias> {
        self.aliases.get(name)
    }
}

fn invalid(field: String, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}

fn validate_alias(name: &str, alias: &mut Alias, base_dir: &Path) -> Result<()> {
    if alias.image.reference.trim().is_empty() {
        return Err(invalid(format!("aliases.{name}.image.ref"), "required"));
    }

    let run = &mut alias.run;
    if run.uid.is_some() || run.gid.is_some() {
        if run.uid.unwrap_or(0) == 0 {
            return Err(invalid(
                format!("aliases.{name}.run.uid"),
                "must be > 0 when set",
            ));
        }
        if run.gid.unwrap_or(0) == 0 {
            return Err(invalid(
                format!("aliases.{name}.run.gid"),
                "must be > 0 when set",
            ));
        }
    }

    for (idx, mount) in run.volumes.iter_mut().enumerate() {
        let field = format!("aliases.{name}.run.volumes[{idx}]");
        if mount.target().trim().is_empty() {
            return Err(invalid(format!("{field}.target"), "required"));
        }
        match mount {
            MountSpec::Bind { source, .. } => {
                if source.trim().is_empty() {
                    return Err(invalid(format!("{field}.source"), "required for bind"));
                }
                if !Path::new(source.as_str()).is_absolute() {
                    let resolved = base_dir.join(source.as_str()).to_string_lossy().into_owned();
                    *source = resolved;
                }
            }
            MountSpec::Volume { source, .. } => {
                if source.trim().is_empty() {
                    return Err(invalid(format!("{field}.source"), "required for volume"));
                }
            }
            MountSpec::Tmpfs { source, .. } => {
                if source.is_some() {
                    return Err(invalid(format!("{field}.source"), "not allowed for tmpfs"));
                }
            }
        }
    }

    Ok(())
}
