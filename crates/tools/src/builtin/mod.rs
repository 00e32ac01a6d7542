//! Built-in tool implementations.

pub mod llm;
pub mod operator_exec;
pub mod plan;
pub mod rag_search;
pub mod web_search;

pub use llm::LlmTool;
pub use operator_exec::OperatorExecTool;
pub use plan::PlanTool;
pub use rag_search::RagSearchTool;
pub use web_search::WebSearchTool;
