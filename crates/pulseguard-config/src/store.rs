//! Persistent configuration store.
//!
//! Changes made at runtime (entities added by an admin, a new delivery channel, edited
//! templates) are written back with write-to-temp then rename, so a crash mid-write
//! never leaves a truncated file behind.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::ConfigError;
use crate::loader::ConfigLoader;
use crate::schema::Config;

/// File-backed configuration store.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current configuration with environment references expanded.
    pub fn load(&self) -> Result<Config, ConfigError> {
        ConfigLoader::load(&self.path)
    }

    /// Atomically replace the file with `config`.
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let rendered = toml::to_string_pretty(config)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, rendered)?;
        fs::rename(&tmp, &self.path)?;
        debug!("Configuration written to {}", self.path.display());
        Ok(())
    }

    /// Read, mutate and write back the stored configuration.
    ///
    /// The file is parsed without environment expansion so `${VAR}` references are
    /// preserved. A missing file starts from defaults.
    pub fn update<F>(&self, mutate: F) -> Result<Config, ConfigError>
    where
        F: FnOnce(&mut Config),
    {
        let mut config = if self.path.exists() {
            ConfigLoader::load_raw(&self.path)?
        } else {
            info!("Creating configuration file {}", self.path.display());
            Config::default()
        };
        mutate(&mut config);
        self.save(&config)?;
        Ok(config)
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.toml".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
