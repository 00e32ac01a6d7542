//! `runs` table repository functions.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use super::fit;
use crate::{
    models::{RunRecord, RunStatus},
    DbError,
};

/// Insert a freshly created run.
pub async fn insert_run(pool: &PgPool, run: &RunRecord) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO runs
            (id, user_id, project_id, mode, goal, status, tokens_in, tokens_out,
             credits, output, error, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(run.id)
    .bind(&run.user_id)
    .bind(&run.project_id)
    .bind(&run.mode)
    .bind(&run.goal)
    .bind(run.status.as_str())
    .bind(fit::<_, i64>("tokens_in", run.tokens_in)?)
    .bind(fit::<_, i64>("tokens_out", run.tokens_out)?)
    .bind(run.credits)
    .bind(&run.output)
    .bind(&run.error)
    .bind(run.started_at)
    .bind(run.finished_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update only the `status` of a run.
pub async fn update_run_status(
    pool: &PgPool,
    run_id: Uuid,
    status: RunStatus,
) -> Result<(), DbError> {
    let result = sqlx::query(r#"UPDATE runs SET status = $1 WHERE id = $2"#)
        .bind(status.as_str())
        .bind(run_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::UnknownRun(run_id));
    }
    Ok(())
}

/// Write the terminal state of a run: status, totals, output, error and
/// `finished_at` (defaulting to now).
pub async fn finalize_run(pool: &PgPool, run: &RunRecord) -> Result<(), DbError> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = $1, tokens_in = $2, tokens_out = $3, credits = $4,
            output = $5, error = $6, finished_at = $7
        WHERE id = $8
        "#,
    )
    .bind(run.status.as_str())
    .bind(fit::<_, i64>("tokens_in", run.tokens_in)?)
    .bind(fit::<_, i64>("tokens_out", run.tokens_out)?)
    .bind(run.credits)
    .bind(&run.output)
    .bind(&run.error)
    .bind(run.finished_at.unwrap_or_else(Utc::now))
    .bind(run.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::UnknownRun(run.id));
    }
    Ok(())
}
