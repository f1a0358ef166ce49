use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;
use tracing::info;

use super::{database_dir, write_json, EmitContext, EmitResult, Emitter};

/// Dumps the fetched rows to `<output>/<db>/<db>_raw.json` as
/// `{"<schema>": [[<row values>], ...]}`, readable by the replay connector.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawIntrospectionEmitter;

impl Emitter for RawIntrospectionEmitter {
    fn name(&self) -> &str {
        "raw-introspection"
    }

    fn emit(&self, context: &EmitContext<'_>) -> EmitResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(context.introspection.len());
        for database in context.introspection {
            let name = database.name.to_lowercase();
            let document: BTreeMap<String, Vec<Vec<Value>>> = database
                .schemas
                .iter()
                .map(|schema| {
                    let rows = schema.rows.iter().map(|row| row.to_values()).collect();
                    (schema.name.to_lowercase(), rows)
                })
                .collect();

            let dir = database_dir(context.output, &name)?;
            let path = dir.join(format!("{}_raw.json", name));
            write_json(&path, &document)?;

            info!(
                emitter = self.name(),
                database = %name,
                rows = database.row_count(),
                path = %path.display(),
                "wrote raw introspection"
            );
            written.push(path);
        }
        Ok(written)
    }
}
