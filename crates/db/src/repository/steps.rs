//! `run_steps` table repository functions.

use sqlx::PgPool;

use super::fit;
use crate::{models::StepRecord, DbError};

/// Write a step transition.
///
/// The first write for `(run_id, index)` inserts the `running` row; later
/// writes for the same step overwrite its outcome columns.
pub async fn upsert_step(pool: &PgPool, step: &StepRecord) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO run_steps
            (run_id, step_index, node_id, tool, status, request, response, error,
             credits, tokens_in, tokens_out, started_at, finished_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (run_id, step_index) DO UPDATE
        SET status = EXCLUDED.status,
            response = EXCLUDED.response,
            error = EXCLUDED.error,
            credits = EXCLUDED.credits,
            tokens_in = EXCLUDED.tokens_in,
            tokens_out = EXCLUDED.tokens_out,
            finished_at = EXCLUDED.finished_at
        "#,
    )
    .bind(step.run_id)
    .bind(fit::<_, i32>("step_index", step.index)?)
    .bind(&step.node_id)
    .bind(&step.tool)
    .bind(step.status.as_str())
    .bind(&step.request)
    .bind(&step.response)
    .bind(&step.error)
    .bind(step.credits)
    .bind(fit::<_, i64>("tokens_in", step.tokens_in)?)
    .bind(fit::<_, i64>("tokens_out", step.tokens_out)?)
    .bind(step.started_at)
    .bind(step.finished_at)
    .execute(pool)
    .await?;

    Ok(())
}
