//! `tools` crate: the `Tool` trait, typed tool IO, the tool registry, and
//! the built-in tools (`plan`, `llm`, `web_search`, `operator_exec`,
//! `rag_search`).
//!
//! Every tool receives a [`ToolContext`] and reports its token usage through
//! [`ToolContext::bill`]. The engine crate dispatches execution through
//! [`ToolRegistry`].

pub mod builtin;
pub mod error;
pub mod http;
pub mod io;
pub mod mock;
pub mod name;
pub mod providers;
pub mod registry;
pub mod traits;
pub mod usage;

pub use error::ToolError;
pub use io::{ToolInput, ToolOutput};
pub use name::ToolName;
pub use providers::Providers;
pub use registry::ToolRegistry;
pub use traits::{BillingSink, Charge, Tool, ToolContext};
