//! Emitters: serialize the reconstructed trees (and raw rows) to disk.
//!
//! Emitters are looked up by name in an [`EmitterRegistry`] built at startup
//! from the builtin list plus anything the caller registers. The registry is
//! an ordinary value passed to the pipeline.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::introspection::IntrospectionDatabase;
use crate::ir::Database;

mod json;
mod raw;

pub use json::JsonEmitter;
pub use raw::RawIntrospectionEmitter;

pub type EmitResult<T> = Result<T, EmitError>;

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown emitter '{name}' (available: {available})")]
    UnknownEmitter { name: String, available: String },

    #[error("emitter '{0}' is already registered")]
    DuplicateEmitter(String),
}

/// Everything an emitter may read. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct EmitContext<'a> {
    /// Root output directory; emitters write below `<output>/<database>/`.
    pub output: &'a Path,
    pub introspection: &'a [IntrospectionDatabase],
    pub trees: &'a [Database],
}

pub trait Emitter: Send + Sync {
    /// Registry key.
    fn name(&self) -> &str;

    /// Write output; returns the files written.
    fn emit(&self, context: &EmitContext<'_>) -> EmitResult<Vec<PathBuf>>;
}

/// Named emitters.
#[derive(Clone)]
pub struct EmitterRegistry {
    emitters: BTreeMap<String, Arc<dyn Emitter>>,
}

impl Default for EmitterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EmitterRegistry {
    pub fn empty() -> Self {
        Self {
            emitters: BTreeMap::new(),
        }
    }

    /// `json` and `raw-introspection`.
    pub fn builtin() -> Self {
        let builtin: [Arc<dyn Emitter>; 2] =
            [Arc::new(JsonEmitter), Arc::new(RawIntrospectionEmitter)];
        Self {
            emitters: builtin
                .into_iter()
                .map(|e| (e.name().to_string(), e))
                .collect(),
        }
    }

    pub fn register(&mut self, emitter: Arc<dyn Emitter>) -> EmitResult<()> {
        let name = emitter.name().to_string();
        if self.emitters.contains_key(&name) {
            return Err(EmitError::DuplicateEmitter(name));
        }
        self.emitters.insert(name, emitter);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Emitter>> {
        self.emitters.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.emitters.keys().map(String::as_str).collect()
    }

    /// Resolve `names` in order; fails on the first unknown one.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> EmitResult<Vec<Arc<dyn Emitter>>> {
        names
            .iter()
            .map(|name| {
                self.get(name.as_ref())
                    .cloned()
                    .ok_or_else(|| EmitError::UnknownEmitter {
                        name: name.as_ref().to_string(),
                        available: self.names().join(", "),
                    })
            })
            .collect()
    }
}

/// `<output>/<database>/`, created if missing.
pub(crate) fn database_dir(output: &Path, database: &str) -> EmitResult<PathBuf> {
    let dir = output.join(database);
    fs::create_dir_all(&dir).map_err(|source| EmitError::Io {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}

/// Write `value` as JSON indented by four spaces.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> EmitResult<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|source| EmitError::Serialize {
            what: path.display().to_string(),
            source,
        })?;
    buffer.push(b'\n');

    fs::write(path, buffer).map_err(|source| EmitError::Io {
        path: path.to_path_buf(),
        source,
    })
}
