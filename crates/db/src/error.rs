//! Errors raised while writing runs and steps.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("postgres error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("could not apply migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A write addressed a run the store has no record of.
    #[error("run {0} is not in the store")]
    UnknownRun(Uuid),

    /// A counter does not fit the integer type of its column.
    #[error("{column} = {value} does not fit its column")]
    OutOfRange { column: &'static str, value: String },
}
