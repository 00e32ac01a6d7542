//! Run orchestration.
//!
//! `Runner` is the central orchestrator:
//! 1. Creates the run record, then reserves a concurrent-run slot.
//! 2. Produces the step list: compiles the graph, or asks the planner for a
//!    linear plan when only a goal was given.
//! 3. Executes steps strictly in order, resolving placeholders against the
//!    outputs of earlier steps and billing each step through a `StepMeter`.
//! 4. Persists every step transition through the `RunSink`.
//! 5. Finalizes the run exactly once and composes its summary, whether it
//!    succeeded or not.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Span};

use db::RunSink;
use tools::io::{PlanInput, PlanOutput};
use tools::{ToolContext, ToolInput, ToolName, ToolOutput, ToolRegistry};

use crate::dag::compile;
use crate::meter::StepMeter;
use crate::models::{Graph, Run, RunMode, Step};
use crate::outputs::{OutputsBag, PREV};
use crate::pricing::{PlanQuota, PlanQuotas, PlanTier, PricingTable};
use crate::quota::QuotaTracker;
use crate::summary::RunSummary;
use crate::template::resolve_templates;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Model used when a request does not name one.
    pub default_model: String,
    pub plans: PlanQuotas,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4o-mini".into(),
            plans: PlanQuotas::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / outcome
// ---------------------------------------------------------------------------

/// What to run and on whose behalf.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub user_id: String,
    pub project_id: Option<String>,
    pub graph: Option<Graph>,
    pub goal: Option<String>,
    pub plan: PlanTier,
    pub model: Option<String>,
}

impl RunRequest {
    pub fn graph(user_id: impl Into<String>, graph: Graph) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: None,
            graph: Some(graph),
            goal: None,
            plan: PlanTier::default(),
            model: None,
        }
    }

    pub fn goal(user_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: None,
            graph: None,
            goal: Some(goal.into()),
            plan: PlanTier::default(),
            model: None,
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_plan(mut self, plan: PlanTier) -> Self {
        self.plan = plan;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Graph mode whenever the graph has nodes, otherwise linear.
    fn mode(&self) -> RunMode {
        match &self.graph {
            Some(graph) if !graph.is_empty() => RunMode::Graph,
            _ if self.goal_text().is_some() => RunMode::Linear,
            _ => RunMode::Graph,
        }
    }

    fn goal_text(&self) -> Option<&str> {
        self.goal.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }
}

/// The finished run, its summary, and the error that failed it (if any).
#[derive(Debug)]
pub struct RunOutcome {
    pub run: Run,
    pub summary: RunSummary,
    failure: Option<EngineError>,
}

impl RunOutcome {
    pub fn error(&self) -> Option<&EngineError> {
        self.failure.as_ref()
    }

    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// A step ready to run: where it came from and its unresolved input.
struct PendingStep {
    node_id: String,
    tool: ToolName,
    input: Value,
}

/// Orchestrates runs. Cheap to share; holds no per-run state.
pub struct Runner {
    registry: Arc<ToolRegistry>,
    sink: Arc<dyn RunSink>,
    quota: Arc<QuotaTracker>,
    pricing: Arc<PricingTable>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(
        registry: Arc<ToolRegistry>,
        sink: Arc<dyn RunSink>,
        quota: Arc<QuotaTracker>,
        pricing: PricingTable,
        config: RunnerConfig,
    ) -> Self {
        Self {
            registry,
            sink,
            quota,
            pricing: Arc::new(pricing),
            config,
        }
    }

    pub fn quota(&self) -> &Arc<QuotaTracker> {
        &self.quota
    }

    /// Execute a run to completion.
    ///
    /// # Errors
    /// Only when the run record cannot be created. Every later failure is
    /// recorded on the run and reported through [`RunOutcome::error`].
    #[instrument(
        skip_all,
        fields(user_id = %request.user_id, mode = ?request.mode(), run_id = tracing::field::Empty)
    )]
    pub async fn run(
        &self,
        request: RunRequest,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, EngineError> {
        let mode = request.mode();
        let mut run = Run::new(
            &request.user_id,
            request.project_id.clone(),
            mode,
            request.goal.clone(),
        );
        Span::current().record("run_id", tracing::field::display(run.id));

        self.sink.create_run(&run.to_record()).await?;
        info!(run_id = %run.id, "run created");

        let result = self.execute(&mut run, &request, &cancel).await;

        let failure = match result {
            Ok(output) => {
                run.finish(Some(output), None);
                info!(
                    steps = run.steps.len(),
                    credits = run.usage.credits,
                    "run succeeded"
                );
                None
            }
            Err(err) => {
                run.finish(None, Some(err.to_string()));
                warn!(steps = run.steps.len(), error = %err, "run failed");
                Some(err)
            }
        };

        if let Err(e) = self.sink.finalize_run(&run.to_record()).await {
            error!(error = %e, "could not persist final run state");
        }

        let graph = match mode {
            RunMode::Graph => request.graph.as_ref(),
            RunMode::Linear => None,
        };
        let summary = RunSummary::compose(&run, graph);

        Ok(RunOutcome {
            run,
            summary,
            failure,
        })
    }

    async fn execute(
        &self,
        run: &mut Run,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let quota = self.config.plans.get(request.plan);
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());

        let graph = request.graph.as_ref().filter(|g| !g.is_empty());
        if graph.is_none() && request.goal_text().is_none() {
            return Err(EngineError::EmptyRun);
        }

        // Validate before reserving anything so a bad graph never counts
        // against the user's concurrency.
        let compiled = match graph {
            Some(graph) => {
                let steps = compile(graph)?;
                check_step_limit(steps.len(), &quota)?;
                Some(steps)
            }
            None => None,
        };

        let _permit = self.quota.acquire(&run.user_id, &quota)?;
        run.start();
        self.sink.set_run_status(run.id, run.status).await?;

        match (compiled, request.goal_text()) {
            (Some(steps), _) => {
                info!(steps = steps.len(), "executing graph");
                let pending = steps
                    .into_iter()
                    .map(|s| PendingStep {
                        node_id: s.node_id,
                        tool: s.tool,
                        input: s.input,
                    })
                    .collect();
                self.execute_graph(run, pending, &model, &quota, cancel).await
            }
            (None, Some(goal)) => {
                let plan = self.plan(run, goal, &model, &quota, cancel).await?;
                check_step_limit(plan.steps.len(), &quota)?;
                info!(steps = plan.steps.len(), "executing linear plan");
                let pending = plan
                    .steps
                    .into_iter()
                    .enumerate()
                    .map(|(i, s)| PendingStep {
                        node_id: format!("step_{}", i + 1),
                        tool: s.tool,
                        input: s.input,
                    })
                    .collect();
                self.execute_linear(run, pending, &model, &quota, cancel).await
            }
            (None, None) => Err(EngineError::EmptyRun),
        }
    }

    /// Every step sees the outputs of all steps before it, by node id.
    async fn execute_graph(
        &self,
        run: &mut Run,
        steps: Vec<PendingStep>,
        model: &str,
        quota: &PlanQuota,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let mut bag = OutputsBag::new();
        let mut last = Value::Null;

        for (index, step) in steps.into_iter().enumerate() {
            let (request, response) = self
                .execute_step(run, index, &step, &bag, model, quota, cancel)
                .await?;
            if let Err(e) = bag.record(&step.node_id, request, Some(response.clone())) {
                warn!(error = %e, "ignoring repeated output");
            }
            last = response;
        }

        Ok(last)
    }

    /// Each step sees only the previous step's result, as `prev`.
    async fn execute_linear(
        &self,
        run: &mut Run,
        steps: Vec<PendingStep>,
        model: &str,
        quota: &PlanQuota,
        cancel: &CancellationToken,
    ) -> Result<Value, EngineError> {
        let mut bag = OutputsBag::new();
        let mut last = Value::Null;

        for (index, step) in steps.into_iter().enumerate() {
            let (request, response) = self
                .execute_step(run, index, &step, &bag, model, quota, cancel)
                .await?;
            bag = OutputsBag::single(PREV, request, Some(response.clone()));
            last = response;
        }

        Ok(last)
    }

    /// Ask the planner for a linear plan. Billed to the run, not recorded as
    /// a step.
    async fn plan(
        &self,
        run: &mut Run,
        goal: &str,
        model: &str,
        quota: &PlanQuota,
        cancel: &CancellationToken,
    ) -> Result<PlanOutput, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.quota.ensure_budget(&run.user_id, quota)?;

        let meter = Arc::new(StepMeter::new(
            &run.user_id,
            self.pricing.clone(),
            self.quota.clone(),
        ));
        let ctx = ToolContext::new(&run.user_id, run.project_id.clone(), model, meter.clone());

        let input = ToolInput::Plan(PlanInput {
            goal: goal.to_owned(),
        });
        let plan = match self.registry.call(&ctx, input).await {
            Ok(ToolOutput::Plan(plan)) => plan,
            Ok(_) => PlanOutput::single_llm(goal),
            Err(e) => {
                warn!(error = %e, "planner unavailable, falling back to a single llm step");
                PlanOutput::single_llm(goal)
            }
        };

        run.usage.add(meter.totals());
        Ok(plan)
    }

    /// Run one step: check limits, resolve its input, dispatch, persist.
    #[allow(clippy::too_many_arguments)]
    async fn execute_step(
        &self,
        run: &mut Run,
        index: usize,
        pending: &PendingStep,
        bag: &OutputsBag,
        model: &str,
        quota: &PlanQuota,
        cancel: &CancellationToken,
    ) -> Result<(Value, Value), EngineError> {
        if cancel.is_cancelled() {
            info!(index, "cancellation requested, stopping before step");
            return Err(EngineError::Cancelled);
        }
        self.quota.ensure_budget(&run.user_id, quota)?;

        let request = resolve_templates(&pending.input, bag);
        let mut step = Step::start(index, &pending.node_id, pending.tool, request.clone());
        self.sink.persist_step(&step.to_record(run.id)).await?;

        info!(index, node_id = %pending.node_id, tool = %pending.tool, "step started");

        let meter = Arc::new(StepMeter::new(
            &run.user_id,
            self.pricing.clone(),
            self.quota.clone(),
        ));
        let ctx = ToolContext::new(&run.user_id, run.project_id.clone(), model, meter.clone());

        let result = self.registry.dispatch(&ctx, pending.tool, request.clone()).await;
        let usage = meter.totals();
        run.usage.add(usage);

        match result {
            Ok(response) => {
                step.complete(response.clone(), usage);
                if let Err(source) = self.sink.persist_step(&step.to_record(run.id)).await {
                    error!(index, node_id = %pending.node_id, error = %source, "could not persist step result");
                    // A billed step always lands in the ledger.
                    step.fail(format!("could not persist step result: {source}"), usage);
                    if let Err(e) = self.sink.persist_step(&step.to_record(run.id)).await {
                        error!(index, error = %e, "could not persist failed step");
                    }
                    run.steps.push(step);
                    return Err(EngineError::Database(source));
                }
                info!(index, node_id = %pending.node_id, credits = usage.credits, "step done");
                run.steps.push(step);
                Ok((request, response))
            }
            Err(source) => {
                error!(index, node_id = %pending.node_id, error = %source, "step failed");
                step.fail(source.to_string(), usage);
                if let Err(e) = self.sink.persist_step(&step.to_record(run.id)).await {
                    error!(index, error = %e, "could not persist failed step");
                }
                run.steps.push(step);
                Err(EngineError::StepFailed {
                    index,
                    node_id: pending.node_id.clone(),
                    source,
                })
            }
        }
    }
}

fn check_step_limit(requested: usize, quota: &PlanQuota) -> Result<(), EngineError> {
    if requested > quota.max_steps_per_run {
        return Err(EngineError::StepLimitExceeded {
            requested,
            limit: quota.max_steps_per_run,
        });
    }
    Ok(())
}
