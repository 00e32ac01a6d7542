//! The write-only persistence contract the engine records runs through.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::models::{RunRecord, RunStatus, StepRecord};
use crate::repository::{runs, steps};
use crate::{DbError, DbPool};

/// Where run and step transitions are written.
///
/// The engine calls `create_run` once, `set_run_status` when execution
/// starts, `persist_step` at least twice per step (running, then done/error)
/// and `finalize_run` exactly once. It never reads anything back.
#[async_trait]
pub trait RunSink: Send + Sync {
    async fn create_run(&self, run: &RunRecord) -> Result<(), DbError>;

    async fn set_run_status(&self, run_id: Uuid, status: RunStatus) -> Result<(), DbError>;

    async fn persist_step(&self, step: &StepRecord) -> Result<(), DbError>;

    async fn finalize_run(&self, run: &RunRecord) -> Result<(), DbError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

/// [`RunSink`] backed by the `runs` / `run_steps` tables.
#[derive(Clone)]
pub struct PgRunSink {
    pool: DbPool,
}

impl PgRunSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunSink for PgRunSink {
    async fn create_run(&self, run: &RunRecord) -> Result<(), DbError> {
        runs::insert_run(&self.pool, run).await
    }

    async fn set_run_status(&self, run_id: Uuid, status: RunStatus) -> Result<(), DbError> {
        runs::update_run_status(&self.pool, run_id, status).await
    }

    async fn persist_step(&self, step: &StepRecord) -> Result<(), DbError> {
        steps::upsert_step(&self.pool, step).await
    }

    async fn finalize_run(&self, run: &RunRecord) -> Result<(), DbError> {
        runs::finalize_run(&self.pool, run).await
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    runs: HashMap<Uuid, RunRecord>,
    step_events: Vec<StepRecord>,
}

/// [`RunSink`] that keeps everything in process memory.
///
/// Used by tests and by local CLI runs without a database. Every step write
/// is kept as a separate event so transition sequences can be inspected.
#[derive(Default)]
pub struct MemoryRunSink {
    state: Mutex<MemoryState>,
}

impl MemoryRunSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Latest snapshot of a run.
    pub fn run(&self, run_id: Uuid) -> Option<RunRecord> {
        self.lock().runs.get(&run_id).cloned()
    }

    /// Every step write for a run, in the order they arrived.
    pub fn step_events(&self, run_id: Uuid) -> Vec<StepRecord> {
        self.lock()
            .step_events
            .iter()
            .filter(|s| s.run_id == run_id)
            .cloned()
            .collect()
    }

    /// Latest write per step index, ordered by index.
    pub fn steps(&self, run_id: Uuid) -> Vec<StepRecord> {
        let mut latest: BTreeMap<usize, StepRecord> = BTreeMap::new();
        for step in self.step_events(run_id) {
            latest.insert(step.index, step);
        }
        latest.into_values().collect()
    }
}

#[async_trait]
impl RunSink for MemoryRunSink {
    async fn create_run(&self, run: &RunRecord) -> Result<(), DbError> {
        debug!(run_id = %run.id, "memory sink: create run");
        self.lock().runs.insert(run.id, run.clone());
        Ok(())
    }

    async fn set_run_status(&self, run_id: Uuid, status: RunStatus) -> Result<(), DbError> {
        let mut state = self.lock();
        let run = state.runs.get_mut(&run_id).ok_or(DbError::UnknownRun(run_id))?;
        run.status = status;
        Ok(())
    }

    async fn persist_step(&self, step: &StepRecord) -> Result<(), DbError> {
        let mut state = self.lock();
        if !state.runs.contains_key(&step.run_id) {
            return Err(DbError::UnknownRun(step.run_id));
        }
        state.step_events.push(step.clone());
        Ok(())
    }

    async fn finalize_run(&self, run: &RunRecord) -> Result<(), DbError> {
        let mut state = self.lock();
        let stored = state.runs.get_mut(&run.id).ok_or(DbError::UnknownRun(run.id))?;
        *stored = run.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepStatus;
    use chrono::Utc;
    use serde_json::json;

    fn run_record() -> RunRecord {
        RunRecord {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            project_id: None,
            mode: "graph".into(),
            goal: None,
            status: RunStatus::Pending,
            tokens_in: 0,
            tokens_out: 0,
            credits: 0.0,
            output: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn step(run_id: Uuid, index: usize, status: StepStatus) -> StepRecord {
        StepRecord {
            run_id,
            index,
            node_id: format!("n{index}"),
            tool: "llm".into(),
            status,
            request: json!({ "prompt": "hi" }),
            response: None,
            error: None,
            credits: 0.0,
            tokens_in: 0,
            tokens_out: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn records_run_lifecycle() {
        let sink = MemoryRunSink::new();
        let mut run = run_record();

        sink.create_run(&run).await.unwrap();
        sink.set_run_status(run.id, RunStatus::Running).await.unwrap();
        assert_eq!(sink.run(run.id).unwrap().status, RunStatus::Running);

        run.status = RunStatus::Succeeded;
        run.credits = 2.5;
        sink.finalize_run(&run).await.unwrap();
        let stored = sink.run(run.id).unwrap();
        assert_eq!(stored.status, RunStatus::Succeeded);
        assert_eq!(stored.credits, 2.5);
    }

    #[tokio::test]
    async fn keeps_every_step_event_and_exposes_latest() {
        let sink = MemoryRunSink::new();
        let run = run_record();
        sink.create_run(&run).await.unwrap();

        sink.persist_step(&step(run.id, 0, StepStatus::Running)).await.unwrap();
        sink.persist_step(&step(run.id, 0, StepStatus::Done)).await.unwrap();
        sink.persist_step(&step(run.id, 1, StepStatus::Running)).await.unwrap();

        assert_eq!(sink.step_events(run.id).len(), 3);
        let latest = sink.steps(run.id);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].status, StepStatus::Done);
        assert_eq!(latest[1].status, StepStatus::Running);
    }

    #[tokio::test]
    async fn writes_for_unknown_runs_are_rejected() {
        let sink = MemoryRunSink::new();
        let missing = Uuid::new_v4();
        let err = sink
            .persist_step(&step(missing, 0, StepStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UnknownRun(id) if id == missing));
    }
}
