//! Async client for communicating with the database worker process.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use super::error::{WorkerError, WorkerResult};
use super::protocol::{
    methods, ConnectionParams, ErrorInfo, ExecuteQueryParams, ExecuteQueryResponse,
    RequestEnvelope, ResponseEnvelope,
};

/// Default timeout for requests (30 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

/// How to launch the worker process.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub args: Vec<String>,
    /// Extra environment for the child (e.g. `NLS_LANG`).
    pub env: BTreeMap<String, String>,
    /// Request timeout; [`DEFAULT_TIMEOUT_SECS`] when unset.
    pub timeout: Option<Duration>,
}

/// Async client for the database worker.
///
/// The client spawns the worker as a child process and communicates via
/// NDJSON (newline-delimited JSON) over stdin/stdout. Each request has a
/// unique ID for correlation with responses, enabling concurrent requests
/// from many schema tasks over one process.
///
/// # Example
///
/// ```ignore
/// use dbstubs::worker::{SpawnOptions, WorkerClient};
///
/// let client = WorkerClient::spawn("./dbstubs-worker", SpawnOptions::default()).await?;
/// let result = client.execute_query(&connection, "select 1 from dual", &binds).await?;
/// ```
pub struct WorkerClient {
    /// Writer for sending requests to worker stdin.
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,

    /// Map of pending request IDs to response channels.
    pending: PendingMap,

    /// Handle to the worker child process.
    _child: Child,

    /// Handle to the background reader task.
    reader_task: tokio::task::JoinHandle<()>,

    timeout: Duration,
}

impl WorkerClient {
    /// Spawn a new worker process.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker process cannot be spawned.
    pub async fn spawn<P: AsRef<Path>>(
        worker_path: P,
        options: SpawnOptions,
    ) -> WorkerResult<Self> {
        let mut child = Command::new(worker_path.as_ref())
            .args(&options.args)
            .envs(&options.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or(WorkerError::PipeMissing("stdin"))?;
        let stdout = child.stdout.take().ok_or(WorkerError::PipeMissing("stdout"))?;

        debug!(
            path = %worker_path.as_ref().display(),
            args = ?options.args,
            "spawned worker"
        );

        let stdin = Arc::new(Mutex::new(BufWriter::new(stdin)));
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Spawn background reader task
        let reader_task = Self::spawn_reader_task(stdout, pending.clone());

        Ok(Self {
            stdin,
            pending,
            _child: child,
            reader_task,
            timeout: options
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        })
    }

    /// Spawn the background task that reads responses from the worker.
    fn spawn_reader_task(stdout: ChildStdout, pending: PendingMap) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    // EOF - worker exited
                    Ok(0) => break,
                    Ok(_) => match serde_json::from_str::<ResponseEnvelope>(&line) {
                        Ok(resp) => {
                            let mut pending = pending.lock().await;
                            if let Some(tx) = pending.remove(&resp.id) {
                                let _ = tx.send(resp);
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "worker: failed to parse response");
                        }
                    },
                    Err(e) => {
                        warn!(error = %e, "worker: read error");
                        break;
                    }
                }
            }

            // Worker exited - notify all pending requests with error responses
            let mut pending = pending.lock().await;
            for (id, tx) in pending.drain() {
                let error_response = ResponseEnvelope {
                    id,
                    success: false,
                    result: None,
                    error: Some(ErrorInfo {
                        code: "WORKER_EXITED".to_string(),
                        message: "Worker process exited unexpectedly".to_string(),
                    }),
                };
                let _ = tx.send(error_response);
            }
        })
    }

    /// Send a request to the worker and wait for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Serialization fails
    /// - Writing to the worker fails
    /// - The request times out
    /// - The worker returns an error response
    /// - Deserialization of the response fails
    pub async fn request<P, R>(&self, method: &str, params: P) -> WorkerResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = uuid::Uuid::new_v4().to_string();

        let request = RequestEnvelope {
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(WorkerError::SerializeFailed)?,
        };

        // Register response channel
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        // Send request
        {
            let mut stdin = self.stdin.lock().await;
            let line =
                serde_json::to_string(&request).map_err(WorkerError::SerializeFailed)? + "\n";
            stdin
                .write_all(line.as_bytes())
                .await
                .map_err(WorkerError::WriteFailed)?;
            stdin.flush().await.map_err(WorkerError::WriteFailed)?;
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => return Err(WorkerError::ChannelClosed),
            Err(_) => {
                // Timeout - clean up pending request
                self.pending.lock().await.remove(&id);
                return Err(WorkerError::Timeout(self.timeout.as_secs()));
            }
        };

        if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            serde_json::from_value(result).map_err(WorkerError::DeserializeFailed)
        } else {
            let error = response.error.unwrap_or_else(|| ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "Unknown error".to_string(),
            });
            Err(Self::classify_error(&error.code, &error.message))
        }
    }

    /// Classify a worker error into a more specific error type.
    fn classify_error(code: &str, message: &str) -> WorkerError {
        match code {
            "WORKER_EXITED" => WorkerError::WorkerExited,
            "DRIVER_NOT_FOUND" => WorkerError::DriverNotFound(message.to_string()),
            "CONNECTION_FAILED" => WorkerError::ConnectionFailed(message.to_string()),
            "QUERY_FAILED" => WorkerError::QueryFailed(message.to_string()),
            "INVALID_REQUEST" => WorkerError::InvalidRequest(message.to_string()),
            "METHOD_NOT_FOUND" => WorkerError::MethodNotFound(message.to_string()),
            _ => WorkerError::remote(code, message),
        }
    }

    /// Execute a SQL statement with named binds.
    pub async fn execute_query(
        &self,
        connection: &ConnectionParams,
        sql: &str,
        binds: &BTreeMap<String, String>,
    ) -> WorkerResult<ExecuteQueryResponse> {
        self.request(
            methods::EXECUTE_QUERY,
            ExecuteQueryParams {
                connection: connection.clone(),
                sql: sql.to_string(),
                binds: binds.clone(),
            },
        )
        .await
    }

    /// `false` once the reader task has finished, i.e. the worker exited.
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
