//! Configuration module for dbstubs.
//!
//! Handles the TOML settings file, environment variable expansion, and the
//! raw per-schema filter specifications consumed by [`crate::filter`].

mod settings;

pub use settings::{
    expand_env_vars, AppendixSettings, DatabaseSettings, PoolSettings, SchemaSettings, Settings,
    SettingsError, WorkerSettings,
};
