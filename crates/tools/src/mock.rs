//! Test doubles for tools, providers and billing.
//!
//! Useful in unit and integration tests where a real provider is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::io::{LlmOutput, OperatorExecOutput, Passage, SearchResult};
use crate::providers::{CompletionProvider, PassageRetriever, Sandbox, SearchProvider};
use crate::traits::mismatched;
use crate::{BillingSink, Charge, Tool, ToolContext, ToolError, ToolInput, ToolName, ToolOutput};

// ---------------------------------------------------------------------------
// MockTool
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockTool` at construction time.
pub enum MockBehaviour {
    /// Return a fixed output.
    Return(ToolOutput),
    /// `llm` only: answer with the prompt it was given.
    Echo,
    /// Fail with `ToolError::Failed`.
    Fail(String),
}

/// A mock tool that records every call and returns a programmer-specified
/// result.
pub struct MockTool {
    pub name: ToolName,
    pub behaviour: MockBehaviour,
    /// All inputs seen by this tool (in call order).
    pub calls: Arc<Mutex<Vec<ToolInput>>>,
    usage: Option<(u64, u64)>,
    delay: Option<Duration>,
}

impl MockTool {
    fn new(name: ToolName, behaviour: MockBehaviour) -> Self {
        Self {
            name,
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            usage: None,
            delay: None,
        }
    }

    /// A mock that always succeeds with `output`, registered under the
    /// output's tool name.
    pub fn returning(output: ToolOutput) -> Self {
        Self::new(output.tool(), MockBehaviour::Return(output))
    }

    /// An `llm` mock that echoes its prompt back as `text`.
    pub fn echoing() -> Self {
        Self::new(ToolName::Llm, MockBehaviour::Echo)
    }

    /// A mock that always fails.
    pub fn failing(name: ToolName, msg: impl Into<String>) -> Self {
        Self::new(name, MockBehaviour::Fail(msg.into()))
    }

    /// Bill this many tokens on every call, before succeeding or failing.
    pub fn with_usage(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.usage = Some((tokens_in, tokens_out));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> ToolName {
        self.name
    }

    async fn execute(&self, ctx: &ToolContext, input: ToolInput) -> Result<ToolOutput, ToolError> {
        self.calls.lock().unwrap().push(input.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((tokens_in, tokens_out)) = self.usage {
            ctx.bill(tokens_in, tokens_out, self.name.as_str(), None);
        }

        match &self.behaviour {
            MockBehaviour::Return(output) => Ok(output.clone()),
            MockBehaviour::Echo => match input {
                ToolInput::Llm(i) => Ok(ToolOutput::Llm(LlmOutput { text: i.prompt })),
                other => Err(mismatched(self.name, &other)),
            },
            MockBehaviour::Fail(msg) => Err(ToolError::failed(self.name, msg.clone())),
        }
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Completion provider with a canned reply. Records `(model, prompt)` pairs.
pub struct MockCompletion {
    reply: Result<String, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockCompletion {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_owned()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            reply: Err(msg.to_owned()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletion {
    async fn complete(&self, model: &str, prompt: &str) -> Result<String, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_owned(), prompt.to_owned()));
        self.reply.clone().map_err(ToolError::Provider)
    }
}

pub struct MockSearch {
    reply: Result<Vec<SearchResult>, String>,
}

impl MockSearch {
    pub fn returning(results: Vec<SearchResult>) -> Self {
        Self { reply: Ok(results) }
    }

    pub fn failing(msg: &str) -> Self {
        Self { reply: Err(msg.to_owned()) }
    }
}

#[async_trait]
impl SearchProvider for MockSearch {
    async fn search(
        &self,
        _query: &str,
        _provider: Option<&str>,
    ) -> Result<Vec<SearchResult>, ToolError> {
        self.reply.clone().map_err(ToolError::Provider)
    }
}

pub struct MockRetriever {
    reply: Result<Vec<Passage>, String>,
}

impl MockRetriever {
    pub fn returning(passages: Vec<Passage>) -> Self {
        Self { reply: Ok(passages) }
    }

    pub fn failing(msg: &str) -> Self {
        Self { reply: Err(msg.to_owned()) }
    }
}

#[async_trait]
impl PassageRetriever for MockRetriever {
    async fn retrieve(&self, _question: &str) -> Result<Vec<Passage>, ToolError> {
        self.reply.clone().map_err(ToolError::Provider)
    }
}

/// Sandbox that returns a fixed result for every command.
pub struct MockSandbox {
    pub output: OperatorExecOutput,
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn exec(&self, _cmd: &str) -> Result<OperatorExecOutput, ToolError> {
        Ok(self.output.clone())
    }
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

/// Billing sink that records every charge. Each charge costs one credit per
/// token.
#[derive(Default)]
pub struct RecordingBilling {
    charges: Mutex<Vec<Charge>>,
}

impl RecordingBilling {
    pub fn charges(&self) -> Vec<Charge> {
        self.charges.lock().unwrap().clone()
    }
}

impl BillingSink for RecordingBilling {
    fn bill(&self, charge: Charge) -> f64 {
        let credits = (charge.tokens_in + charge.tokens_out) as f64;
        self.charges.lock().unwrap().push(charge);
        credits
    }
}
