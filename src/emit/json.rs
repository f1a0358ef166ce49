use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::info;

use super::{database_dir, write_json, EmitContext, EmitResult, Emitter};

/// Writes each tree to `<output>/<db>/<db>.json` as `{"<db>": tree}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEmitter;

impl Emitter for JsonEmitter {
    fn name(&self) -> &str {
        "json"
    }

    fn emit(&self, context: &EmitContext<'_>) -> EmitResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(context.trees.len());
        for database in context.trees {
            let dir = database_dir(context.output, &database.name)?;
            let path = dir.join(format!("{}.json", database.name));

            let document = BTreeMap::from([(database.name.as_str(), database)]);
            write_json(&path, &document)?;

            info!(
                emitter = self.name(),
                database = %database.name,
                path = %path.display(),
                "wrote routine tree"
            );
            written.push(path);
        }
        Ok(written)
    }
}
