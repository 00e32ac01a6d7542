//! TOML configuration for the engine and the tools it wires up.
//!
//! ```toml
//! database_url = "${DATABASE_URL}"
//!
//! [runner]
//! default_model = "gpt-4o-mini"
//! tool_timeout_secs = 60
//!
//! [pricing.models.gpt-4o]
//! input_per_1k = 2.5
//! output_per_1k = 10.0
//!
//! [plans.free]
//! max_steps_per_run = 10
//! max_concurrent_runs = 1
//! daily_credits = 100.0
//!
//! [providers]
//! completion_api_key = "${OPENAI_API_KEY}"
//! ```
//!
//! `${VAR}` references are expanded from the environment before parsing;
//! unset variables are left as written.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use tools::providers::ProviderSettings;

use crate::pricing::{PlanQuotas, PricingTable};
use crate::runner::RunnerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerSection {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub pricing: PricingTable,
    #[serde(default)]
    pub plans: PlanQuotas,
    #[serde(default)]
    pub providers: ProviderSettings,
    /// Postgres connection string. Without it runs are kept in memory.
    #[serde(default)]
    pub database_url: Option<String>,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.runner.tool_timeout_secs)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            default_model: self.runner.default_model.clone(),
            plans: self.plans.clone(),
        }
    }

    /// A database URL that is still an unexpanded `${VAR}` counts as unset.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty() && !url.starts_with("${"))
    }
}

fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' || chars.peek() != Some(&'{') {
            result.push(c);
            continue;
        }
        chars.next();

        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }

        match std::env::var(&name) {
            Ok(value) if closed => result.push_str(&value),
            _ => {
                result.push_str("${");
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{ModelRate, PlanTier};

    #[test]
    fn empty_config_is_all_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.runner.default_model, "gpt-4o-mini");
        assert_eq!(config.tool_timeout(), Duration::from_secs(60));
        assert_eq!(config.plans, PlanQuotas::default());
        assert!(!config.providers.allow_local_exec);
        assert_eq!(config.database_url(), None);
    }

    #[test]
    fn sections_override_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            database_url = "postgres://localhost/agentflow"

            [runner]
            default_model = "claude-3-5-haiku"
            tool_timeout_secs = 5

            [pricing]
            default_rate = { input_per_1k = 0.5, output_per_1k = 0.5 }

            [plans.free]
            max_steps_per_run = 3
            max_concurrent_runs = 2
            daily_credits = 1.5

            [providers]
            allow_local_exec = true
            "#,
        )
        .unwrap();

        assert_eq!(config.tool_timeout(), Duration::from_secs(5));
        assert_eq!(config.pricing.default_rate, ModelRate::new(0.5, 0.5));
        assert!(config.pricing.models.contains_key("gpt-4o"));

        let runner = config.runner_config();
        assert_eq!(runner.default_model, "claude-3-5-haiku");
        assert_eq!(runner.plans.get(PlanTier::Free).max_steps_per_run, 3);
        assert_eq!(runner.plans.get(PlanTier::Pro).max_steps_per_run, 25);
        assert!(config.providers.allow_local_exec);
        assert_eq!(config.database_url(), Some("postgres://localhost/agentflow"));
    }

    #[test]
    fn expands_set_variables_and_keeps_unset_ones() {
        std::env::set_var("AGENTFLOW_TEST_KEY", "sk-test");
        let out = expand_env_vars(r#"a = "${AGENTFLOW_TEST_KEY}" b = "${AGENTFLOW_UNSET_VAR}""#);
        assert_eq!(out, r#"a = "sk-test" b = "${AGENTFLOW_UNSET_VAR}""#);
    }

    #[test]
    fn unexpanded_database_url_counts_as_unset() {
        let config =
            EngineConfig::from_toml_str(r#"database_url = "${AGENTFLOW_UNSET_DB_URL}""#).unwrap();
        assert_eq!(config.database_url(), None);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[runner\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = EngineConfig::load(Path::new("/nonexistent/agentflow.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
