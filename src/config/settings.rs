//! TOML-based configuration for dbstubs.
//!
//! Supports a config file (dbstubs.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! output = "./stubs"
//! emitters = ["json", "raw-introspection"]
//!
//! [worker]
//! path = "dbstubs-worker"
//! timeout_secs = 60
//!
//! [worker.env]
//! ORACLE_HOME = "/opt/oracle/instantclient_18_3"
//!
//! [[databases]]
//! name = "DB_NAME"
//! connection_string = "${BILLING_DSN}"
//!
//! [databases.pool]
//! min = 4
//! max = 8
//!
//! [[databases.schemas]]
//! name = "BILLING"
//! exclude_routines = ["ESPESIALLY_NASTY_ROUTINE"]
//!
//! [[databases.schemas.appendix]]
//! comment = "record type is not reported by the dictionary"
//! object_id = 777
//! subprogram_id = 44
//! position = 0
//! custom_type_schema = "BILLING"
//! custom_type = "BILLS%ROWTYPE"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::emit::EmitterRegistry;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory emitters write into.
    pub output: PathBuf,

    /// Emitters to run, by registry name.
    pub emitters: Vec<String>,

    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,

    /// Worker configuration.
    pub worker: WorkerSettings,

    /// Databases to introspect.
    pub databases: Vec<DatabaseSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output: PathBuf::from("stubs"),
            emitters: vec!["json".to_string()],
            log_level: "info".to_string(),
            worker: WorkerSettings::default(),
            databases: Vec::new(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Path to worker binary (supports ${ENV_VAR} expansion).
    pub path: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Environment passed to the worker process (client library setup).
    pub env: BTreeMap<String, String>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert(
            "NLS_LANG".to_string(),
            "American_America.AL32UTF8".to_string(),
        );
        Self {
            path: None,
            timeout_secs: 30,
            env,
        }
    }
}

impl WorkerSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One database to introspect.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseSettings {
    pub name: String,

    /// Driver name understood by the worker.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Connection string (supports ${ENV_VAR} expansion).
    #[serde(default)]
    pub connection_string: String,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub schemas: Vec<SchemaSettings>,
}

fn default_driver() -> String {
    "oracle".to_string()
}

impl DatabaseSettings {
    /// Get the connection string with environment variables expanded.
    pub fn resolved_connection_string(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.connection_string)
    }
}

/// Connection pool settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Connections kept open by the worker.
    pub min: u32,

    /// Maximum concurrent connections; bounds concurrent schema queries.
    pub max: u32,

    /// Seconds to wait for a free connection.
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            min: 8,
            max: 8,
            acquire_timeout_secs: 30,
        }
    }
}

impl PoolSettings {
    /// Convert to worker command-line arguments.
    pub fn to_worker_args(&self) -> Vec<String> {
        vec![
            "-pool".to_string(),
            format!("-pool-max-idle={}", self.min),
            format!("-pool-max-open={}", self.max),
        ]
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

/// Raw (uncompiled) schema filter specification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SchemaSettings {
    pub name: String,

    /// Package name for routines outside any package (default `<NAME>_NO_PKG`).
    pub no_package_name: Option<String>,

    pub exclude_packages: Vec<String>,

    /// Object specifiers: `routine`, `package.routine`, `schema.package.routine`.
    pub exclude_routines: Vec<String>,

    /// When non-empty, only these routines are introspected.
    pub include_routines: Vec<String>,

    /// Manual metadata corrections.
    pub appendix: Vec<AppendixSettings>,
}

impl SchemaSettings {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// One manual correction, keyed by subprogram or by subprogram argument.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppendixSettings {
    #[serde(default)]
    pub comment: Option<String>,
    pub object_id: u64,
    pub subprogram_id: u32,
    /// Argument position; absent for a subprogram-wide correction.
    #[serde(default)]
    pub position: Option<u32>,
    /// Row field name to replacement value.
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text against the builtin emitters.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Self::from_toml_with(content, &EmitterRegistry::builtin())
    }

    /// Parse and validate settings, resolving emitter names in `registry`.
    pub fn from_toml_with(
        content: &str,
        registry: &EmitterRegistry,
    ) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        settings.validate_emitters(registry)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `DBSTUBS_CONFIG`
    /// 2. `./dbstubs.toml`
    /// 3. `~/.config/dbstubs/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("DBSTUBS_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("dbstubs.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("dbstubs").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Err(SettingsError::FileNotFound(local_config))
    }

    /// Structural checks that don't need the filter compiler.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.databases.is_empty() {
            return Err(SettingsError::InvalidConfig(
                "at least one [[databases]] entry is required".to_string(),
            ));
        }

        let mut databases = HashSet::new();
        for database in &self.databases {
            if database.name.is_empty() {
                return Err(SettingsError::InvalidConfig(
                    "database name must not be empty".to_string(),
                ));
            }
            if !databases.insert(database.name.to_uppercase()) {
                return Err(SettingsError::InvalidConfig(format!(
                    "duplicate database: {}",
                    database.name
                )));
            }
            if database.pool.max == 0 {
                return Err(SettingsError::InvalidConfig(format!(
                    "database {}: pool.max must be at least 1",
                    database.name
                )));
            }

            let mut schemas = HashSet::new();
            for schema in &database.schemas {
                if !schemas.insert(schema.name.to_uppercase()) {
                    return Err(SettingsError::InvalidConfig(format!(
                        "database {}: duplicate schema {}",
                        database.name, schema.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check every configured emitter name against `registry`.
    pub fn validate_emitters(&self, registry: &EmitterRegistry) -> Result<(), SettingsError> {
        registry
            .select(&self.emitters)
            .map(|_| ())
            .map_err(|e| SettingsError::InvalidConfig(e.to_string()))
    }

    /// Get a database by name (case-insensitive).
    pub fn get_database(&self, name: &str) -> Result<&DatabaseSettings, SettingsError> {
        self.databases
            .iter()
            .find(|db| db.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SettingsError::DatabaseNotFound(name.to_string()))
    }

    /// Get the worker binary path, expanded.
    pub fn worker_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.worker.path {
            Some(path) => Ok(PathBuf::from(expand_env_vars(path)?)),
            None => Ok(PathBuf::from("dbstubs-worker")),
        }
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut var_name = String::new();
        while let Some(&ch) = chars.peek() {
            if braced && ch == '}' {
                chars.next();
                break;
            }
            if !braced && !(ch.is_alphanumeric() || ch == '_') {
                break;
            }
            var_name.push(ch);
            chars.next();
        }

        if var_name.is_empty() && !braced {
            // Just a lone $, keep it
            result.push('$');
            continue;
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
