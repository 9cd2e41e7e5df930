// src/config.rs

use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DB_PATH: &str = "contacts.db";
pub const DEFAULT_IMPORT_URL: &str = "https://672e0d0a229a881691ef6c33.mockapi.io/api/v1/contacts";

pub const ENV_DB_PATH: &str = "CONTACTS_DB";
pub const ENV_IMPORT_URL: &str = "CONTACTS_IMPORT_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Настройки ядра: путь к базе (":memory:" — в памяти) и адрес импорта.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: String,
    pub import_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            import_url: DEFAULT_IMPORT_URL.to_string(),
        }
    }
}

impl Config {
    /// JSON-файл; отсутствующие ключи берутся по умолчанию.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Значения по умолчанию, переопределённые переменными окружения.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(db_path) = lookup(ENV_DB_PATH).filter(|v| !v.is_empty()) {
            self.db_path = db_path;
        }
        if let Some(url) = lookup(ENV_IMPORT_URL).filter(|v| !v.is_empty()) {
            self.import_url = url;
        }
        self
    }
}
