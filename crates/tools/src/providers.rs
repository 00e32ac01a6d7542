//! External collaborators the built-in tools delegate to.
//!
//! The engine only depends on these traits; concrete HTTP-backed
//! implementations live in [`crate::http`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::http::{OpenAiCompletion, TavilySearch};
use crate::io::{OperatorExecOutput, Passage, SearchResult};
use crate::ToolError;

/// Text completion backend used by `plan` and `llm`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ToolError>;
}

/// Web search backend used by `web_search`.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        provider: Option<&str>,
    ) -> Result<Vec<SearchResult>, ToolError>;
}

/// Command execution backend used by `operator_exec`.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn exec(&self, cmd: &str) -> Result<OperatorExecOutput, ToolError>;
}

/// Passage retrieval backend used by `rag_search`.
#[async_trait]
pub trait PassageRetriever: Send + Sync {
    async fn retrieve(&self, question: &str) -> Result<Vec<Passage>, ToolError>;
}

// ---------------------------------------------------------------------------
// Stand-ins for collaborators that aren't configured
// ---------------------------------------------------------------------------

/// Completion/search backend that always fails with a "not configured" error.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

#[async_trait]
impl CompletionProvider for Unconfigured {
    async fn complete(&self, _model: &str, _prompt: &str) -> Result<String, ToolError> {
        Err(ToolError::provider("no completion provider configured"))
    }
}

#[async_trait]
impl SearchProvider for Unconfigured {
    async fn search(
        &self,
        _query: &str,
        _provider: Option<&str>,
    ) -> Result<Vec<SearchResult>, ToolError> {
        Err(ToolError::provider("no search provider configured"))
    }
}

/// Retriever with no index behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetriever;

#[async_trait]
impl PassageRetriever for NoRetriever {
    async fn retrieve(&self, _question: &str) -> Result<Vec<Passage>, ToolError> {
        Ok(Vec::new())
    }
}

/// Sandbox that refuses every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSandbox;

#[async_trait]
impl Sandbox for DisabledSandbox {
    async fn exec(&self, _cmd: &str) -> Result<OperatorExecOutput, ToolError> {
        Err(ToolError::provider("command execution is disabled"))
    }
}

/// Runs commands through `sh -c` on the local host.
///
/// Not an isolation boundary. Only enabled when `allow_local_exec` is set.
#[derive(Debug, Clone)]
pub struct LocalProcessSandbox {
    timeout: Duration,
}

impl LocalProcessSandbox {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Sandbox for LocalProcessSandbox {
    async fn exec(&self, cmd: &str) -> Result<OperatorExecOutput, ToolError> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                ToolError::provider(format!("command timed out after {:?}", self.timeout))
            })?
            .map_err(|e| ToolError::provider(format!("failed to spawn command: {e}")))?;

        Ok(OperatorExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            returncode: output.status.code().unwrap_or(-1),
        })
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Provider settings, usually read from the `[providers]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_completion_base_url")]
    pub completion_base_url: String,
    #[serde(default)]
    pub completion_api_key: Option<String>,
    #[serde(default)]
    pub search_api_key: Option<String>,
    #[serde(default)]
    pub allow_local_exec: bool,
    #[serde(default = "default_exec_timeout_secs")]
    pub exec_timeout_secs: u64,
}

fn default_completion_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_exec_timeout_secs() -> u64 {
    30
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            completion_base_url: default_completion_base_url(),
            completion_api_key: None,
            search_api_key: None,
            allow_local_exec: false,
            exec_timeout_secs: default_exec_timeout_secs(),
        }
    }
}

/// The full set of collaborators the built-in tools need.
#[derive(Clone)]
pub struct Providers {
    pub completion: Arc<dyn CompletionProvider>,
    pub search: Arc<dyn SearchProvider>,
    pub sandbox: Arc<dyn Sandbox>,
    pub retriever: Arc<dyn PassageRetriever>,
}

impl Providers {
    /// Build providers from settings; anything without credentials is left
    /// unconfigured rather than failing.
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        let completion: Arc<dyn CompletionProvider> = match usable_key(&settings.completion_api_key) {
            Some(key) => Arc::new(OpenAiCompletion::new(&settings.completion_base_url, key)),
            None => Arc::new(Unconfigured),
        };
        let search: Arc<dyn SearchProvider> = match usable_key(&settings.search_api_key) {
            Some(key) => Arc::new(TavilySearch::new(key)),
            None => Arc::new(Unconfigured),
        };
        let sandbox: Arc<dyn Sandbox> = if settings.allow_local_exec {
            Arc::new(LocalProcessSandbox::new(Duration::from_secs(
                settings.exec_timeout_secs,
            )))
        } else {
            Arc::new(DisabledSandbox)
        };

        Self {
            completion,
            search,
            sandbox,
            retriever: Arc::new(NoRetriever),
        }
    }
}

/// Blank keys and `${VAR}` references left unexpanded count as missing.
fn usable_key(key: &Option<String>) -> Option<&str> {
    key.as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty() && !k.starts_with("${"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_sandbox_refuses() {
        let err = DisabledSandbox.exec("echo hi").await.unwrap_err();
        assert!(matches!(err, ToolError::Provider(_)));
    }

    #[tokio::test]
    async fn no_retriever_returns_empty() {
        assert!(NoRetriever.retrieve("anything").await.unwrap().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_sandbox_captures_output_and_exit_code() {
        let sandbox = LocalProcessSandbox::new(Duration::from_secs(5));
        let out = sandbox.exec("echo out; echo err 1>&2; exit 3").await.unwrap();
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.returncode, 3);
    }

    #[test]
    fn settings_default_to_safe_values() {
        let settings = ProviderSettings::default();
        assert!(!settings.allow_local_exec);
        assert!(settings.completion_api_key.is_none());
    }

    #[test]
    fn unexpanded_keys_are_ignored() {
        assert_eq!(usable_key(&Some("${OPENAI_API_KEY}".into())), None);
        assert_eq!(usable_key(&Some("  ".into())), None);
        assert_eq!(usable_key(&Some("sk-1".into())), Some("sk-1"));
    }
}
