use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Bot settings loaded from the bootstrap config file.
///
/// The file is TOML with three tables, `[Auth]`, `[General]` and
/// `[Database]`, keyed in PascalCase. Every key except `Auth.Token` has a
/// default; a missing or empty token is a validation error.
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default, rename = "Auth")]
    pub auth: AuthConfig,
    #[serde(default, rename = "General")]
    pub general: GeneralConfig,
    #[serde(default, rename = "Database")]
    pub database: DatabaseConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("auth", &self.auth)
            .field("general", &self.general)
            .field("database", &self.database)
            .finish()
    }
}

impl Config {
    /// Load and validate the config at `path`.
    ///
    /// Every failure is logged at critical severity before it is returned;
    /// the caller decides whether to exit.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let result = Self::read(path).and_then(|cfg| {
            tracing::debug!("Loaded '{}'", path.display());
            cfg.validate().map(|()| cfg)
        });

        if let Err(e) = &result {
            tracing::error!(critical = true, path = %path.display(), "{}", e.critical_message());
        }
        result
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.token().is_empty() {
            return Err(ConfigError::MissingField("Auth.Token"));
        }
        Ok(())
    }

    /// The bot token. Empty only on a config that has not been validated.
    pub fn token(&self) -> &str {
        self.auth.token.as_deref().unwrap_or_default()
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

impl ConfigError {
    /// Operator-facing line logged before startup is aborted.
    pub fn critical_message(&self) -> String {
        match self {
            ConfigError::NotFound(path) => format!("'{}' does not exist", path.display()),
            ConfigError::MissingField("Auth.Token") => {
                "You must provide a token in the config".to_string()
            }
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct GeneralConfig {
    #[serde(default)]
    pub selfbot: bool,
    #[serde(default = "default_true")]
    pub allow_pms: bool,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_true")]
    pub delete: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            selfbot: false,
            allow_pms: true,
            prefix: default_prefix(),
            delete: true,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_prefix() -> String {
    "!".into()
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_db_host() -> String {
    "localhost".into()
}
fn default_db_port() -> u16 {
    28015
}
fn default_db_user() -> String {
    "admin".into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
