//! `db` crate: persistence layer for runs and steps.
//!
//! Provides the write-only [`RunSink`] contract the engine persists through,
//! a Postgres implementation backed by a connection pool and repository
//! functions, and an in-memory implementation for tests and local runs.
//! No business logic lives here.

pub mod error;
pub mod models;
pub mod pool;
pub mod repository;
pub mod sink;

pub use error::DbError;
pub use models::{RunRecord, RunStatus, StepRecord, StepStatus};
pub use pool::DbPool;
pub use sink::{MemoryRunSink, PgRunSink, RunSink};
