//! Worker communication module.
//!
//! Database access goes through a long-running worker process that owns the
//! native driver and its connection pool; this crate stays driver-agnostic
//! and only speaks NDJSON to it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    dbstubs (Rust + Tokio)                       │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                    WorkerClient (Async)                   │  │
//! │  │  - Spawns the worker as child process                     │  │
//! │  │  - NDJSON protocol over stdin/stdout                      │  │
//! │  │  - Request IDs for concurrent request correlation         │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │                              │                                   │
//! │               stdin (NDJSON) │ stdout (NDJSON)                  │
//! │                              ▼                                   │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          Database Worker (Long-Running Child Process)           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod client;
mod error;
pub mod protocol;

pub use client::{SpawnOptions, WorkerClient};
pub use error::{WorkerError, WorkerResult};
