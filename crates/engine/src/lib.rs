//! `engine` crate: domain models, graph compilation, placeholder
//! resolution, pricing and quotas, and the run orchestrator.

pub mod config;
pub mod dag;
pub mod error;
pub mod meter;
pub mod models;
pub mod outputs;
pub mod pricing;
pub mod quota;
pub mod runner;
pub mod summary;
pub mod template;

pub use config::{ConfigError, EngineConfig};
pub use dag::{compile, topological_order};
pub use error::EngineError;
pub use models::{
    CompiledStep, Edge, Graph, Node, NodeData, Run, RunMode, RunStatus, Step, StepStatus, Usage,
};
pub use outputs::OutputsBag;
pub use pricing::{ModelRate, PlanQuota, PlanQuotas, PlanTier, PricingTable};
pub use quota::{QuotaTracker, RunPermit};
pub use runner::{RunOutcome, RunRequest, Runner, RunnerConfig};
pub use summary::RunSummary;
pub use template::{placeholders, resolve_templates};
