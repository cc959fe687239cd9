//! Database configuration document.
//!
//! The connection settings live in a JSON document (`database_config.json`)
//! beside the executable. A missing document is not an error: the defaults
//! are written out and used.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the configuration document.
pub const CONFIG_FILE_NAME: &str = "database_config.json";

/// Store location selected by `database = ":memory:"`.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Config document {path} is malformed: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection settings for the clinic store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Host the store is served from (must be the local machine)
    pub host: String,
    /// Port, kept for document compatibility
    pub port: u16,
    /// Store name; the file is `<database>.sqlite3`
    pub database: String,
    /// User name shown in diagnostics
    pub user: String,
    /// Password, kept for document compatibility
    pub password: String,
    /// Text encoding of the store
    pub charset: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 3306,
            database: "chinese_medicine_db".into(),
            user: "root".into(),
            password: String::new(),
            charset: "utf8mb4".into(),
        }
    }
}

/// Where the store lives once the document has been interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Partial edit of a [`DatabaseConfig`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub charset: Option<String>,
}

impl ConfigUpdate {
    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl DatabaseConfig {
    /// Load the document at `path`, writing the defaults first if it is missing.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            tracing::info!(path = %path.display(), "created default database config");
            return Ok(config);
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loaded database config");
        Ok(config)
    }

    /// Write the document (pretty-printed, non-ASCII kept as is).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply a partial edit.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(host) = update.host {
            self.host = host;
        }
        if let Some(port) = update.port {
            self.port = port;
        }
        if let Some(database) = update.database {
            self.database = database;
        }
        if let Some(user) = update.user {
            self.user = user;
        }
        if let Some(password) = update.password {
            self.password = password;
        }
        if let Some(charset) = update.charset {
            self.charset = charset;
        }
    }

    /// Resolve the store location relative to the directory holding the document.
    pub fn location(&self, base_dir: &Path) -> StoreLocation {
        if self.database == IN_MEMORY_DATABASE {
            StoreLocation::Memory
        } else {
            StoreLocation::File(base_dir.join(format!("{}.sqlite3", self.database)))
        }
    }

    /// Whether `host` names this machine.
    pub fn is_local_host(&self) -> bool {
        matches!(
            self.host.trim(),
            "" | "localhost" | "127.0.0.1" | "::1"
        )
    }

    /// The password with every character replaced by `*`.
    pub fn masked_password(&self) -> String {
        "*".repeat(self.password.chars().count())
    }
}

/// Default location of the configuration document: beside the executable,
/// or the working directory when that cannot be determined.
pub fn config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_FILE_NAME)
}

/// Directory holding the document at `path`. Store files are resolved
/// against it.
pub fn document_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Tracing filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,herbal_clinic_core=info"
}
