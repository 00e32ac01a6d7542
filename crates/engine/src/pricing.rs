//! Static cost rates and plan quotas.
//!
//! Pure lookup and arithmetic. Loaded from the `[pricing]` and `[plans.*]`
//! config sections, with built-in defaults for anything not configured.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Credits per 1 000 tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelRate {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        tokens_in as f64 / 1000.0 * self.input_per_1k
            + tokens_out as f64 / 1000.0 * self.output_per_1k
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
    /// Keyed by model id or model id prefix (`gpt-4o` also prices
    /// `gpt-4o-2024-08-06`).
    #[serde(default = "default_models")]
    pub models: HashMap<String, ModelRate>,
    /// Used for models with no entry.
    #[serde(default = "default_rate")]
    pub default_rate: ModelRate,
    /// Added to every charge whose label matches, on top of token cost.
    #[serde(default = "default_flat_fees")]
    pub flat_fees: HashMap<String, f64>,
}

fn default_models() -> HashMap<String, ModelRate> {
    HashMap::from([
        ("gpt-4o-mini".to_owned(), ModelRate::new(0.15, 0.6)),
        ("gpt-4o".to_owned(), ModelRate::new(2.5, 10.0)),
        ("gpt-4.1".to_owned(), ModelRate::new(2.0, 8.0)),
        ("claude-3-5-haiku".to_owned(), ModelRate::new(0.8, 4.0)),
        ("claude-3-5-sonnet".to_owned(), ModelRate::new(3.0, 15.0)),
    ])
}

fn default_rate() -> ModelRate {
    ModelRate::new(1.0, 2.0)
}

fn default_flat_fees() -> HashMap<String, f64> {
    HashMap::from([
        ("web_search".to_owned(), 0.5),
        ("operator_exec".to_owned(), 0.25),
    ])
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            models: default_models(),
            default_rate: default_rate(),
            flat_fees: default_flat_fees(),
        }
    }
}

impl PricingTable {
    /// A table that prices every model at `rate` and charges no flat fees.
    pub fn uniform(rate: ModelRate) -> Self {
        Self {
            models: HashMap::new(),
            default_rate: rate,
            flat_fees: HashMap::new(),
        }
    }

    /// Exact match first, then the longest configured prefix.
    pub fn rate_for(&self, model: &str) -> ModelRate {
        if let Some(rate) = self.models.get(model) {
            return *rate;
        }
        self.models
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, rate)| *rate)
            .unwrap_or(self.default_rate)
    }

    pub fn credits_for(&self, model: &str, label: &str, tokens_in: u64, tokens_out: u64) -> f64 {
        let fee = self.flat_fees.get(label).copied().unwrap_or(0.0);
        self.rate_for(model).cost(tokens_in, tokens_out) + fee
    }
}

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Team,
}

impl PlanTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Team => "team",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "team" => Ok(Self::Team),
            other => Err(format!("unknown plan tier '{other}'")),
        }
    }
}

/// Limits attached to one plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanQuota {
    pub max_steps_per_run: usize,
    pub max_concurrent_runs: usize,
    pub daily_credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanQuotas {
    #[serde(default = "free_quota")]
    pub free: PlanQuota,
    #[serde(default = "pro_quota")]
    pub pro: PlanQuota,
    #[serde(default = "team_quota")]
    pub team: PlanQuota,
}

fn free_quota() -> PlanQuota {
    PlanQuota {
        max_steps_per_run: 10,
        max_concurrent_runs: 1,
        daily_credits: 100.0,
    }
}

fn pro_quota() -> PlanQuota {
    PlanQuota {
        max_steps_per_run: 25,
        max_concurrent_runs: 3,
        daily_credits: 2_000.0,
    }
}

fn team_quota() -> PlanQuota {
    PlanQuota {
        max_steps_per_run: 50,
        max_concurrent_runs: 10,
        daily_credits: 10_000.0,
    }
}

impl Default for PlanQuotas {
    fn default() -> Self {
        Self {
            free: free_quota(),
            pro: pro_quota(),
            team: team_quota(),
        }
    }
}

impl PlanQuotas {
    pub fn get(&self, tier: PlanTier) -> PlanQuota {
        match tier {
            PlanTier::Free => self.free,
            PlanTier::Pro => self.pro,
            PlanTier::Team => self.team,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn longest_prefix_wins() {
        let table = PricingTable::default();
        assert_eq!(table.rate_for("gpt-4o-mini-2024-07-18"), ModelRate::new(0.15, 0.6));
        assert_eq!(table.rate_for("gpt-4o-2024-08-06"), ModelRate::new(2.5, 10.0));
        assert_eq!(table.rate_for("some-local-model"), table.default_rate);
    }

    #[test]
    fn credits_include_flat_fee_for_label() {
        let table = PricingTable::default();
        // 2k in, 1k out on gpt-4o: 5.0 + 10.0
        assert!(approx(table.credits_for("gpt-4o", "llm", 2000, 1000), 15.0));
        // 40 query tokens plus the nominal search fee
        assert!(approx(
            table.credits_for("gpt-4o-mini", "web_search", 40, 0),
            0.04 * 0.15 + 0.5
        ));
    }

    #[test]
    fn uniform_table_ignores_model_and_label() {
        let table = PricingTable::uniform(ModelRate::new(1.0, 2.0));
        assert!(approx(table.credits_for("anything", "web_search", 1000, 1000), 3.0));
        assert_eq!(table.credits_for("m", "llm", 0, 0), 0.0);
    }

    #[test]
    fn plan_defaults_and_parsing() {
        let plans = PlanQuotas::default();
        assert_eq!(plans.get(PlanTier::Free).max_steps_per_run, 10);
        assert_eq!(plans.get(PlanTier::Team).max_concurrent_runs, 10);
        assert_eq!("Pro".parse::<PlanTier>(), Ok(PlanTier::Pro));
        assert!("enterprise".parse::<PlanTier>().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let table: PricingTable = toml::from_str(
            r#"
            [models.local-llama]
            input_per_1k = 0.0
            output_per_1k = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(table.rate_for("local-llama-3"), ModelRate::new(0.0, 0.0));
        assert_eq!(table.default_rate, ModelRate::new(1.0, 2.0));
        assert_eq!(table.flat_fees.get("web_search"), Some(&0.5));
    }
}
