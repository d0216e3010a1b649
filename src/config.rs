//! Persisted board configuration
//!
//! Named float and bool fields, loaded at startup and rewritten after every
//! successful change. The file format is TOML:
//!
//! ```toml
//! [float]
//! "lo0.frequency" = 2400000000.0
//!
//! [flag]
//! "ref0.line0" = true
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::string::{String, ToString};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the file failed
    #[error("config file I/O: {0}")]
    Io(#[from] io::Error),

    /// File content is not valid
    #[error("config file parse: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings could not be serialized
    #[error("config serialize: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Named configuration fields
pub trait ConfigStore {
    /// Float field
    fn float(&self, key: &str) -> Option<f64>;

    /// Set a float field, persisted on the next `save`
    fn set_float(&mut self, key: &str, value: f64);

    /// Bool field
    fn flag(&self, key: &str) -> Option<bool>;

    /// Set a bool field, persisted on the next `save`
    fn set_flag(&mut self, key: &str, value: bool);

    /// Persist every field
    fn save(&mut self) -> Result<(), StoreError>;
}

/// Serialized form of a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Float fields
    #[serde(default)]
    pub float: BTreeMap<String, f64>,
    /// Bool fields
    #[serde(default)]
    pub flag: BTreeMap<String, bool>,
}

impl Settings {
    fn float(&self, key: &str) -> Option<f64> {
        self.float.get(key).copied()
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.flag.get(key).copied()
    }
}

/// Volatile store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    settings: Settings,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding `settings`
    pub fn with_settings(settings: Settings) -> Self {
        MemoryStore { settings }
    }

    /// Current fields
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl ConfigStore for MemoryStore {
    fn float(&self, key: &str) -> Option<f64> {
        self.settings.float(key)
    }

    fn set_float(&mut self, key: &str, value: f64) {
        self.settings.float.insert(key.to_string(), value);
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.settings.flag(key)
    }

    fn set_flag(&mut self, key: &str, value: bool) {
        self.settings.flag.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store backed by a TOML file
#[derive(Debug)]
pub struct TomlStore {
    path: PathBuf,
    settings: Settings,
}

impl TomlStore {
    /// Load `path`. A missing file is created with defaults, a file that
    /// fails to parse is replaced by defaults.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let settings = match fs::read_to_string(&path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    log::warn!("{}: {}, falling back to defaults", path.display(), e);
                    None
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::info!("{}: not found, creating with defaults", path.display());
                None
            }
            Err(e) => return Err(e.into()),
        };

        let mut store = TomlStore { path, settings: Settings::default() };
        match settings {
            Some(settings) => store.settings = settings,
            None => store.save()?,
        }
        Ok(store)
    }

    /// File path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current fields
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl ConfigStore for TomlStore {
    fn float(&self, key: &str) -> Option<f64> {
        self.settings.float(key)
    }

    fn set_float(&mut self, key: &str, value: f64) {
        self.settings.float.insert(key.to_string(), value);
    }

    fn flag(&self, key: &str) -> Option<bool> {
        self.settings.flag(key)
    }

    fn set_flag(&mut self, key: &str, value: bool) {
        self.settings.flag.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let text = toml::to_string(&self.settings)?;
        fs::write(&self.path, text)?;
        log::debug!("{}: saved", self.path.display());
        Ok(())
    }
}
