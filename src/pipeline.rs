//! End-to-end run: settings → filters → introspection → trees → emitters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{expand_env_vars, DatabaseSettings, Settings, SettingsError};
use crate::connector::{Connector, ConnectorError, ReplayConnector, WorkerConnector};
use crate::emit::{EmitContext, EmitError, EmitterRegistry};
use crate::filter::{FilterError, SchemaFilter};
use crate::introspection::{
    DatabaseTarget, IntrospectionDatabase, IntrospectionEngine, IntrospectionError,
};
use crate::ir::{build_database, BuildError, Database};
use crate::worker::protocol::ConnectionParams;
use crate::worker::{SpawnOptions, WorkerClient, WorkerError};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("database {database}: {source}")]
    Connector {
        database: String,
        #[source]
        source: ConnectorError,
    },

    #[error(transparent)]
    Introspection(#[from] IntrospectionError),

    #[error("database {database}: {source}")]
    Build {
        database: String,
        #[source]
        source: BuildError,
    },

    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// One database's fetched rows and the tree rebuilt from them.
#[derive(Debug, Clone)]
pub struct Introspected {
    pub introspection: IntrospectionDatabase,
    pub tree: Database,
}

/// Result of [`generate`].
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub introspection: Vec<IntrospectionDatabase>,
    pub trees: Vec<Database>,
    pub written: Vec<PathBuf>,
}

/// Compile every schema filter of one database.
pub fn compile_filters(database: &DatabaseSettings) -> Result<Vec<SchemaFilter>, FilterError> {
    database.schemas.iter().map(SchemaFilter::compile).collect()
}

/// Build targets with a caller-supplied connector per database.
///
/// All filters are compiled before any connector is created.
pub fn compile_targets<F>(
    settings: &Settings,
    mut connect: F,
) -> PipelineResult<Vec<DatabaseTarget>>
where
    F: FnMut(&DatabaseSettings) -> PipelineResult<Arc<dyn Connector>>,
{
    let filters = settings
        .databases
        .iter()
        .map(compile_filters)
        .collect::<Result<Vec<_>, _>>()?;

    settings
        .databases
        .iter()
        .zip(filters)
        .map(|(database, schemas)| {
            let connector = connect(database)?;
            Ok(DatabaseTarget::new(&database.name, connector, schemas))
        })
        .collect()
}

/// Targets backed by one worker process per database.
pub async fn worker_targets(settings: &Settings) -> PipelineResult<Vec<DatabaseTarget>> {
    let filters = settings
        .databases
        .iter()
        .map(compile_filters)
        .collect::<Result<Vec<_>, _>>()?;

    let worker_path = settings.worker_path()?;
    let env: BTreeMap<String, String> = settings
        .worker
        .env
        .iter()
        .map(|(key, value)| Ok((key.clone(), expand_env_vars(value)?)))
        .collect::<Result<_, SettingsError>>()?;

    let mut targets = Vec::with_capacity(settings.databases.len());
    for (database, schemas) in settings.databases.iter().zip(filters) {
        let options = SpawnOptions {
            args: database.pool.to_worker_args(),
            env: env.clone(),
            timeout: Some(settings.worker.timeout()),
        };
        let client = WorkerClient::spawn(&worker_path, options).await?;
        let connection = ConnectionParams {
            driver: database.driver.clone(),
            connection_string: database.resolved_connection_string()?,
        };

        info!(
            database = %database.name,
            driver = %database.driver,
            pool_max = database.pool.max,
            schemas = schemas.len(),
            "worker connector ready"
        );
        let connector = WorkerConnector::new(Arc::new(client), connection, &database.pool);
        targets.push(DatabaseTarget::new(&database.name, Arc::new(connector), schemas));
    }
    Ok(targets)
}

/// Targets replaying `<dir>/<db>/<db>_raw.json` dumps.
pub fn replay_targets(settings: &Settings, dir: &Path) -> PipelineResult<Vec<DatabaseTarget>> {
    compile_targets(settings, |database| {
        let name = database.name.to_lowercase();
        let path = dir.join(&name).join(format!("{}_raw.json", name));
        let connector =
            ReplayConnector::from_file(&path).map_err(|source| PipelineError::Connector {
                database: database.name.clone(),
                source,
            })?;
        Ok(Arc::new(connector) as Arc<dyn Connector>)
    })
}

/// Introspect every target and rebuild its tree.
///
/// One result per target, in target order; a failure in one database does
/// not affect the others. Batches are put back into configured schema order
/// before the tree is built.
pub async fn introspect_and_build(
    targets: Vec<DatabaseTarget>,
) -> Vec<PipelineResult<Introspected>> {
    let schema_orders: Vec<Vec<String>> = targets
        .iter()
        .map(|t| t.schemas.iter().map(|s| s.name().to_string()).collect())
        .collect();

    let engine = IntrospectionEngine::new(targets);
    let outcomes = engine.run().await;

    outcomes
        .into_iter()
        .zip(schema_orders)
        .map(|(outcome, order)| {
            let mut introspection = outcome?;
            introspection.order_schemas(&order);

            let tree = build_database(&introspection).map_err(|source| PipelineError::Build {
                database: introspection.name.clone(),
                source,
            })?;
            Ok(Introspected {
                introspection,
                tree,
            })
        })
        .collect()
}

/// Full run: introspect, rebuild, then run `emitters` into `output`.
///
/// Emitter names are resolved before any database work. Fails with the first
/// failing database; emitters only run when every database succeeded.
pub async fn generate<S: AsRef<str>>(
    targets: Vec<DatabaseTarget>,
    registry: &EmitterRegistry,
    emitters: &[S],
    output: &Path,
) -> PipelineResult<Generation> {
    let selected = registry.select(emitters)?;

    let mut generation = Generation::default();
    let mut first_error = None;
    for outcome in introspect_and_build(targets).await {
        match outcome {
            Ok(done) => {
                generation.introspection.push(done.introspection);
                generation.trees.push(done.tree);
            }
            Err(error) => {
                warn!(error = %error, "database failed");
                first_error.get_or_insert(error);
            }
        }
    }
    if let Some(error) = first_error {
        return Err(error);
    }

    let context = EmitContext {
        output,
        introspection: &generation.introspection,
        trees: &generation.trees,
    };
    let mut written = Vec::new();
    for emitter in &selected {
        written.extend(emitter.emit(&context)?);
    }
    generation.written = written;

    info!(
        databases = generation.trees.len(),
        routines = generation.trees.iter().map(Database::routine_count).sum::<usize>(),
        files = generation.written.len(),
        "generation complete"
    );
    Ok(generation)
}
